use crate::hierarchy::NodeKind;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// Table layout for one catalog rank. One parameterized handler covers all
/// four ranks instead of a copy per table.
struct RankTable {
    table: &'static str,
    parent_column: Option<&'static str>,
    child: Option<(&'static str, &'static str)>,
}

fn rank_table(kind: NodeKind) -> RankTable {
    match kind {
        NodeKind::Level => RankTable {
            table: "levels",
            parent_column: None,
            child: Some(("tracks", "level_id")),
        },
        NodeKind::Track => RankTable {
            table: "tracks",
            parent_column: Some("level_id"),
            child: Some(("units", "track_id")),
        },
        NodeKind::Unit => RankTable {
            table: "units",
            parent_column: Some("track_id"),
            child: Some(("chapters", "unit_id")),
        },
        NodeKind::Chapter => RankTable {
            table: "chapters",
            parent_column: Some("unit_id"),
            child: None,
        },
    }
}

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

fn required_kind(req: &Request) -> Result<NodeKind, serde_json::Value> {
    let raw = required_str(req, "kind")?;
    NodeKind::parse(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("kind must be one of level/track/unit/chapter, got {}", raw),
            None,
        )
    })
}

fn next_sort_order(conn: &Connection, rank: &RankTable, parent_id: Option<&str>) -> Result<i64, String> {
    let res = match (rank.parent_column, parent_id) {
        (Some(col), Some(parent)) => conn.query_row(
            &format!(
                "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM {} WHERE {} = ?",
                rank.table, col
            ),
            [parent],
            |r| r.get::<_, i64>(0),
        ),
        _ => conn.query_row(
            &format!("SELECT COALESCE(MAX(sort_order), -1) + 1 FROM {}", rank.table),
            [],
            |r| r.get::<_, i64>(0),
        ),
    };
    res.map_err(|e| e.to_string())
}

fn parent_exists(conn: &Connection, kind: NodeKind, parent_id: &str) -> Result<bool, String> {
    let parent_table = match kind {
        NodeKind::Track => "levels",
        NodeKind::Unit => "tracks",
        NodeKind::Chapter => "units",
        NodeKind::Level => return Ok(true),
    };
    conn.query_row(
        &format!("SELECT 1 FROM {} WHERE id = ?", parent_table),
        [parent_id],
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(|e| e.to_string())
}

fn handle_nodes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match required_kind(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rank = rank_table(kind);

    let parent_id = if rank.parent_column.is_some() {
        match required_str(req, "parentId") {
            Ok(v) => Some(v),
            Err(e) => return e,
        }
    } else {
        None
    };

    if let Some(parent) = parent_id.as_deref() {
        match parent_exists(conn, kind, parent) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", "parent node not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e, None),
        }
    }

    let sort_order = match next_sort_order(conn, &rank, parent_id.as_deref()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e, None),
    };

    let node_id = Uuid::new_v4().to_string();
    let result = match (rank.parent_column, parent_id.as_deref()) {
        (Some(col), Some(parent)) => conn.execute(
            &format!(
                "INSERT INTO {}(id, {}, name, sort_order) VALUES(?, ?, ?, ?)",
                rank.table, col
            ),
            params![node_id, parent, name, sort_order],
        ),
        _ => conn.execute(
            &format!(
                "INSERT INTO {}(id, name, sort_order) VALUES(?, ?, ?)",
                rank.table
            ),
            params![node_id, name, sort_order],
        ),
    };
    if let Err(e) = result {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": rank.table })),
        );
    }

    ok(&req.id, json!({ "nodeId": node_id, "name": name }))
}

fn handle_nodes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match required_kind(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rank = rank_table(kind);

    let rows = match rank.parent_column {
        Some(col) => {
            let parent_id = match required_str(req, "parentId") {
                Ok(v) => v,
                Err(e) => return e,
            };
            let sql = format!(
                "SELECT id, name, {} FROM {} WHERE {} = ? ORDER BY sort_order, id",
                col, rank.table, col
            );
            let mut stmt = match conn.prepare(&sql) {
                Ok(s) => s,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            stmt.query_map([&parent_id], |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                    "parentId": r.get::<_, String>(2)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        }
        None => {
            let mut stmt = match conn
                .prepare("SELECT id, name FROM levels ORDER BY sort_order, id")
            {
                Ok(s) => s,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            stmt.query_map([], |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        }
    };

    match rows {
        Ok(nodes) => ok(&req.id, json!({ "nodes": nodes })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_nodes_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match required_kind(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let node_id = match required_str(req, "nodeId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match req
        .params
        .get("patch")
        .and_then(|p| p.get("name"))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing patch.name", None),
    };
    let rank = rank_table(kind);

    match conn.execute(
        &format!("UPDATE {} SET name = ? WHERE id = ?", rank.table),
        params![name, node_id],
    ) {
        Ok(0) => err(&req.id, "not_found", "node not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_nodes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match required_kind(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let node_id = match required_str(req, "nodeId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rank = rank_table(kind);

    // Refuse to orphan descendants; the UI deletes bottom-up.
    if let Some((child_table, child_col)) = rank.child {
        let in_use: Option<i64> = match conn
            .query_row(
                &format!(
                    "SELECT 1 FROM {} WHERE {} = ? LIMIT 1",
                    child_table, child_col
                ),
                [&node_id],
                |r| r.get(0),
            )
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if in_use.is_some() {
            return err(
                &req.id,
                "node_in_use",
                "node still has children; delete them first",
                None,
            );
        }
    }
    if kind == NodeKind::Chapter {
        let in_use: Option<i64> = match conn
            .query_row(
                "SELECT 1 FROM objectives WHERE chapter_id = ? LIMIT 1",
                [&node_id],
                |r| r.get(0),
            )
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if in_use.is_some() {
            return err(
                &req.id,
                "node_in_use",
                "chapter still has objectives; delete them first",
                None,
            );
        }
    }

    match conn.execute(
        &format!("DELETE FROM {} WHERE id = ?", rank.table),
        [&node_id],
    ) {
        Ok(0) => err(&req.id, "not_found", "node not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_objectives_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let chapter_id = match required_str(req, "chapterId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let text = match required_str(req, "text") {
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

    let objective_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO objectives(id, chapter_id, text) VALUES(?, ?, ?)",
        params![objective_id, chapter_id, text],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "objectives" })),
        );
    }

    ok(&req.id, json!({ "objectiveId": objective_id }))
}

fn handle_objectives_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let chapter_id = match required_str(req, "chapterId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut stmt = match conn
        .prepare("SELECT id, text FROM objectives WHERE chapter_id = ? ORDER BY id")
    {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&chapter_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "text": r.get::<_, String>(1)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(objectives) => ok(&req.id, json!({ "objectives": objectives })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_objectives_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let objective_id = match required_str(req, "objectiveId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let text = match req
        .params
        .get("patch")
        .and_then(|p| p.get("text"))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    {
        Some(v) => v,
        None => return err(&req.id, "bad_params", "missing patch.text", None),
    };

    match conn.execute(
        "UPDATE objectives SET text = ? WHERE id = ?",
        params![text, objective_id],
    ) {
        Ok(0) => err(&req.id, "not_found", "objective not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_objectives_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let objective_id = match required_str(req, "objectiveId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match conn.execute("DELETE FROM objectives WHERE id = ?", [&objective_id]) {
        Ok(0) => err(&req.id, "not_found", "objective not found", None),
        Ok(_) => ok(&req.id, json!({ "ok": true })),
        Err(e) => err(&req.id, "db_delete_failed", e.to_string(), None),
    }
}

fn handle_masters_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let kind = match required_str(req, "kind") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if crate::plan::ItemKind::parse(&kind).is_none() {
        return err(
            &req.id,
            "bad_params",
            format!("kind must be sequence/activity/evaluation, got {}", kind),
            None,
        );
    }
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let master_id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();
    if let Err(e) = conn.execute(
        "INSERT INTO masters(id, kind, title, created_at) VALUES(?, ?, ?, ?)",
        params![master_id, kind, title, created_at],
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "masters" })),
        );
    }

    ok(&req.id, json!({ "masterId": master_id }))
}

fn handle_masters_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let rows = match req.params.get("kind").and_then(|v| v.as_str()) {
        Some(kind) => {
            let mut stmt = match conn.prepare(
                "SELECT id, kind, title FROM masters WHERE kind = ? ORDER BY title, id",
            ) {
                Ok(s) => s,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            stmt.query_map([kind], |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "kind": r.get::<_, String>(1)?,
                    "title": r.get::<_, String>(2)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        }
        None => {
            let mut stmt = match conn
                .prepare("SELECT id, kind, title FROM masters ORDER BY kind, title, id")
            {
                Ok(s) => s,
                Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
            };
            stmt.query_map([], |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "kind": r.get::<_, String>(1)?,
                    "title": r.get::<_, String>(2)?,
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        }
    };

    match rows {
        Ok(masters) => ok(&req.id, json!({ "masters": masters })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.nodes.create" => Some(handle_nodes_create(state, req)),
        "catalog.nodes.list" => Some(handle_nodes_list(state, req)),
        "catalog.nodes.update" => Some(handle_nodes_update(state, req)),
        "catalog.nodes.delete" => Some(handle_nodes_delete(state, req)),
        "catalog.objectives.create" => Some(handle_objectives_create(state, req)),
        "catalog.objectives.list" => Some(handle_objectives_list(state, req)),
        "catalog.objectives.update" => Some(handle_objectives_update(state, req)),
        "catalog.objectives.delete" => Some(handle_objectives_delete(state, req)),
        "catalog.masters.create" => Some(handle_masters_create(state, req)),
        "catalog.masters.list" => Some(handle_masters_list(state, req)),
        _ => None,
    }
}
