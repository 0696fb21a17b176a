use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, OpenPlan, Request};
use crate::plan::{ItemKind, NewItem, OrderedItem, OrderedItemList, PlanListError};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn opt_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn items_json(list: &OrderedItemList) -> serde_json::Value {
    json!({ "items": list.items(), "selectedItemId": list.selected_id() })
}

fn plan_error(req: &Request, e: PlanListError) -> serde_json::Value {
    err(&req.id, e.code(), e.to_string(), None)
}

fn load_items(conn: &Connection, chapter_id: &str) -> Result<Vec<OrderedItem>, String> {
    let mut stmt = conn
        .prepare(
            "SELECT id, kind, title, source_id, planned_date \
             FROM plan_items WHERE chapter_id = ? ORDER BY sort_order, id",
        )
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([chapter_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, Option<String>>(4)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| e.to_string())?;

    let mut items = Vec::with_capacity(rows.len());
    for (id, kind, title, source_id, planned_date) in rows {
        let Some(kind) = ItemKind::parse(&kind) else {
            return Err(format!("plan item {} has unknown kind {}", id, kind));
        };
        items.push(OrderedItem {
            id,
            kind,
            title,
            source_id,
            planned_date,
            order: 0,
        });
    }
    Ok(items)
}

fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let chapter_id = match required_str(req, "chapterId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM chapters WHERE id = ?", [&chapter_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "chapter not found", None);
    }

    let items = match load_items(conn, &chapter_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e, None),
    };

    let list = OrderedItemList::from_items(items);
    let response = ok(&req.id, items_json(&list));
    state.session.plan = Some(OpenPlan { chapter_id, list });
    response
}

fn open_plan<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> Result<&'a mut OpenPlan, serde_json::Value> {
    state
        .session
        .plan
        .as_mut()
        .ok_or_else(|| err(&req.id, "no_plan_open", "open a chapter plan first", None))
}

fn handle_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let kind_raw = match required_str(req, "kind") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(kind) = ItemKind::parse(&kind_raw) else {
        return err(
            &req.id,
            "bad_params",
            format!(
                "kind must be sequence/activity/evaluation, got {}",
                kind_raw
            ),
            None,
        );
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let planned_date = opt_str(req, "plannedDate");
    if let Some(raw) = planned_date.as_deref() {
        if NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_err() {
            return err(
                &req.id,
                "bad_params",
                format!("plannedDate must be YYYY-MM-DD, got {}", raw),
                None,
            );
        }
    }
    let position = match req.params.get("position") {
        None | Some(serde_json::Value::Null) => None,
        Some(v) => match v.as_u64() {
            Some(n) => Some(n as usize),
            None => return err(&req.id, "bad_params", "position must be a non-negative integer", None),
        },
    };

    let new = NewItem {
        id: opt_str(req, "itemId"),
        kind,
        title,
        source_id: opt_str(req, "sourceId"),
        planned_date,
    };

    let plan = match open_plan(state, req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let item_id = plan.list.insert(new, position);
    ok(
        &req.id,
        json!({ "itemId": item_id, "items": plan.list.items() }),
    )
}

fn handle_remove(state: &mut AppState, req: &Request) -> serde_json::Value {
    let item_id = match required_str(req, "itemId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let plan = match open_plan(state, req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    match plan.list.remove(&item_id) {
        Ok(removed) => {
            let mut result = items_json(&plan.list);
            result["removed"] = json!(removed);
            ok(&req.id, result)
        }
        Err(e) => plan_error(req, e),
    }
}

fn handle_move(state: &mut AppState, req: &Request) -> serde_json::Value {
    let item_id = match required_str(req, "itemId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let direction = match required_str(req, "direction") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let plan = match open_plan(state, req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let moved = match direction.as_str() {
        "up" => plan.list.move_up(&item_id),
        "down" => plan.list.move_down(&item_id),
        other => {
            return err(
                &req.id,
                "bad_params",
                format!("direction must be up or down, got {}", other),
                None,
            )
        }
    };
    match moved {
        Ok(moved) => {
            let mut result = items_json(&plan.list);
            result["moved"] = json!(moved);
            ok(&req.id, result)
        }
        Err(e) => plan_error(req, e),
    }
}

fn handle_reorder(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id_order: Vec<String> = match req.params.get("itemIdOrder").and_then(|v| v.as_array()) {
        Some(arr) => {
            let mut out = Vec::with_capacity(arr.len());
            for v in arr {
                match v.as_str() {
                    Some(s) => out.push(s.to_string()),
                    None => {
                        return err(
                            &req.id,
                            "bad_params",
                            "itemIdOrder must be an array of item ids",
                            None,
                        )
                    }
                }
            }
            out
        }
        None => return err(&req.id, "bad_params", "missing itemIdOrder", None),
    };

    let plan = match open_plan(state, req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    match plan.list.reorder(&id_order) {
        Ok(()) => ok(&req.id, items_json(&plan.list)),
        Err(e) => plan_error(req, e),
    }
}

fn handle_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let item_id = opt_str(req, "itemId");
    let plan = match open_plan(state, req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    match plan.list.select(item_id.as_deref()) {
        Ok(()) => ok(&req.id, json!({ "selectedItemId": plan.list.selected_id() })),
        Err(e) => plan_error(req, e),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let plan = match open_plan(state, req) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let mut result = items_json(&plan.list);
    result["chapterId"] = json!(plan.chapter_id);
    ok(&req.id, result)
}

fn handle_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let AppState { db, session, .. } = state;
    let Some(conn) = db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(plan) = session.plan.as_ref() else {
        return err(&req.id, "no_plan_open", "open a chapter plan first", None);
    };
    let snapshot = session.selector.snapshot();
    let objective_ids_json = match serde_json::to_string(&snapshot.objective_ids) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "save_failed", e.to_string(), None),
    };
    let updated_at = chrono::Utc::now().to_rfc3339();

    let save = || -> Result<(), rusqlite::Error> {
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM plan_items WHERE chapter_id = ?",
            [&plan.chapter_id],
        )?;
        for item in plan.list.items() {
            tx.execute(
                "INSERT INTO plan_items(id, chapter_id, kind, title, source_id, planned_date, sort_order) \
                 VALUES(?, ?, ?, ?, ?, ?, ?)",
                params![
                    item.id,
                    plan.chapter_id,
                    item.kind.as_str(),
                    item.title,
                    item.source_id,
                    item.planned_date,
                    item.order
                ],
            )?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO chapter_plans\
             (chapter_id, level_id, track_id, unit_id, objective_ids_json, updated_at) \
             VALUES(?, ?, ?, ?, ?, ?)",
            params![
                plan.chapter_id,
                snapshot.level_id,
                snapshot.track_id,
                snapshot.unit_id,
                objective_ids_json,
                updated_at
            ],
        )?;
        tx.commit()
    };

    match save() {
        Ok(()) => ok(
            &req.id,
            json!({
                "chapterId": plan.chapter_id,
                "itemCount": plan.list.len(),
                "updatedAt": updated_at,
            }),
        ),
        Err(e) => err(&req.id, "save_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "plan.open" => Some(handle_open(state, req)),
        "plan.items.add" => Some(handle_add(state, req)),
        "plan.items.remove" => Some(handle_remove(state, req)),
        "plan.items.move" => Some(handle_move(state, req)),
        "plan.items.reorder" => Some(handle_reorder(state, req)),
        "plan.items.select" => Some(handle_select(state, req)),
        "plan.items.list" => Some(handle_list(state, req)),
        "plan.save" => Some(handle_save(state, req)),
        _ => None,
    }
}
