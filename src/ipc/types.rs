use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::hierarchy::HierarchySelector;
use crate::plan::OrderedItemList;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The chapter plan currently open for editing.
pub struct OpenPlan {
    pub chapter_id: String,
    pub list: OrderedItemList,
}

/// Per-connection planning session: one selector, at most one open plan.
/// Reset when the workspace changes.
#[derive(Default)]
pub struct Session {
    pub selector: HierarchySelector,
    pub plan: Option<OpenPlan>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Session,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            session: Session::default(),
        }
    }
}
