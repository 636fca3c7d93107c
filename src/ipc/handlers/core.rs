use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::session;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Open (or create) the workspace store and hydrate its persisted session.
/// Loaded datasets belong to the previous workspace and are dropped.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<()> {
    let conn = db::open_db(path)?;
    let restored = match session::hydrate(&conn) {
        Ok(s) => s,
        Err(e) => {
            // A damaged session row must not keep the workspace closed.
            warn!(code = %e.code, "session hydrate failed: {}", e.message);
            None
        }
    };
    for slot in state.datasets.values_mut() {
        slot.clear();
    }
    state.search.clear();
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    state.session = restored;
    info!(
        workspace = %path.to_string_lossy(),
        authenticated = state.session.is_some(),
        "workspace opened"
    );
    Ok(())
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "authenticated": state.session.is_some()
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

    match open_workspace(state, &path) {
        Ok(()) => ok(
            &req.id,
            json!({
                "workspacePath": path.to_string_lossy(),
                "session": state.session
            }),
        ),
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
