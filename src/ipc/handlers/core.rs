use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::{auth, db, session};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            // The teacher's identity account is pre-provisioned; there is no
            // registration path for it.
            if let Err(e) = auth::ensure_teacher_account(&conn) {
                return err(&req.id, "db_open_failed", format!("{e:?}"), None);
            }

            // A stored session survives restarts. It is restored as-is, not
            // re-validated; data operations re-check authorization anyway.
            let restored = match session::restore(&conn) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to restore stored session");
                    None
                }
            };

            state.workspace = Some(path.clone());
            state.db = Some(conn);
            state.watches.clear();
            state.session = restored;

            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "principal": state.session.as_ref().map(|s| &s.principal),
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
