use crate::hierarchy::{
    CandidateList, CatalogNode, CatalogSource, FetchError, HierarchySelector, NodeKind, Objective,
    ObjectivesState,
};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

/// CatalogSource over the workspace database. Children come back in the
/// catalog's display order.
struct SqlCatalog<'a> {
    conn: &'a Connection,
}

impl CatalogSource for SqlCatalog<'_> {
    fn fetch_children(
        &self,
        kind: NodeKind,
        parent_id: &str,
    ) -> Result<Vec<CatalogNode>, FetchError> {
        let (table, parent_column) = match kind {
            NodeKind::Level => ("levels", "id"),
            NodeKind::Track => ("tracks", "level_id"),
            NodeKind::Unit => ("units", "track_id"),
            NodeKind::Chapter => ("chapters", "unit_id"),
        };
        let sql = format!(
            "SELECT id, name FROM {} WHERE {} = ? ORDER BY sort_order, id",
            table, parent_column
        );
        let mut stmt = self.conn.prepare(&sql).map_err(|e| FetchError(e.to_string()))?;
        let nodes = stmt
            .query_map([parent_id], |r| {
                Ok(CatalogNode {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    parent_id: parent_id.to_string(),
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(|e| FetchError(e.to_string()))?;
        Ok(nodes)
    }
}

fn fetch_objectives(conn: &Connection, chapter_id: &str) -> Result<Vec<Objective>, FetchError> {
    let mut stmt = conn
        .prepare("SELECT id, text FROM objectives WHERE chapter_id = ? ORDER BY id")
        .map_err(|e| FetchError(e.to_string()))?;
    stmt.query_map([chapter_id], |r| {
        Ok(Objective {
            id: r.get(0)?,
            text: r.get(1)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| FetchError(e.to_string()))
}

fn candidates_json(list: &CandidateList) -> serde_json::Value {
    json!({ "nodes": list.nodes, "error": list.error })
}

fn objectives_json(state: &ObjectivesState) -> serde_json::Value {
    match state {
        ObjectivesState::Idle => json!({ "state": "idle" }),
        ObjectivesState::Loading { chapter_id } => {
            json!({ "state": "loading", "chapterId": chapter_id })
        }
        ObjectivesState::Ready(objectives) => {
            json!({ "state": "ready", "objectives": objectives })
        }
        ObjectivesState::Failed {
            chapter_id,
            message,
        } => json!({ "state": "failed", "chapterId": chapter_id, "message": message }),
    }
}

fn selection_json(selector: &HierarchySelector) -> serde_json::Value {
    json!({
        "selection": selector.snapshot(),
        "tracks": candidates_json(&selector.tracks),
        "units": candidates_json(&selector.units),
        "chapters": candidates_json(&selector.chapters),
        "objectives": objectives_json(selector.objectives()),
    })
}

fn opt_id(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn handle_select_rank(state: &mut AppState, req: &Request, kind: NodeKind) -> serde_json::Value {
    let AppState { db, session, .. } = state;
    let Some(conn) = db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let selector = &mut session.selector;
    let catalog = SqlCatalog { conn };
    let id = opt_id(req, "nodeId");

    match kind {
        NodeKind::Level => selector.select_level(&catalog, id.as_deref()),
        NodeKind::Track => selector.select_track(&catalog, id.as_deref()),
        NodeKind::Unit => selector.select_unit(&catalog, id.as_deref()),
        NodeKind::Chapter => {
            if let Some(fetch) = selector.select_chapter(id.as_deref()) {
                let result = fetch_objectives(conn, &fetch.chapter_id);
                selector.complete_objectives(&fetch.chapter_id, result);
            }
        }
    }

    ok(&req.id, selection_json(selector))
}

fn handle_toggle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let objective_id = match req
        .params
        .get("objectiveId")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
    {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing objectiveId", None),
    };

    let selector = &mut state.session.selector;
    let changed = selector.toggle_objective(&objective_id);
    ok(
        &req.id,
        json!({
            "changed": changed,
            "selection": selector.snapshot(),
        }),
    )
}

fn handle_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, selection_json(&state.session.selector))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "selection.level" => Some(handle_select_rank(state, req, NodeKind::Level)),
        "selection.track" => Some(handle_select_rank(state, req, NodeKind::Track)),
        "selection.unit" => Some(handle_select_rank(state, req, NodeKind::Unit)),
        "selection.chapter" => Some(handle_select_rank(state, req, NodeKind::Chapter)),
        "selection.objectives.toggle" => Some(handle_toggle(state, req)),
        "selection.get" => Some(handle_get(state, req)),
        _ => None,
    }
}
