use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::session::Session;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Live view over one student's grade records. At most one exists at a time;
/// subscribing again cancels and replaces it.
#[derive(Debug, Clone)]
pub struct GradeWatch {
    pub id: String,
    pub student_id: String,
}

#[derive(Debug, Default)]
pub struct Watches {
    pub grades: Option<GradeWatch>,
    pub roster: Option<String>,
}

impl Watches {
    /// Dropped wholesale when the signed-in identity changes, so no update is
    /// ever delivered against a stale session.
    pub fn clear(&mut self) {
        self.grades = None;
        self.roster = None;
    }
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Option<Session>,
    pub watches: Watches,
    /// Event lines queued by the current request; the main loop writes them
    /// out right after the response.
    pub pending_events: Vec<serde_json::Value>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            db: None,
            session: None,
            watches: Watches::default(),
            pending_events: Vec::new(),
        }
    }

    pub fn take_events(&mut self) -> Vec<serde_json::Value> {
        std::mem::take(&mut self.pending_events)
    }
}
