use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::records::DatasetKind;
use crate::session::{Session, SessionError};
use crate::view::ViewError;
use rusqlite::Connection;

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params.get(key).and_then(|v| v.as_str())
}

pub fn optional_seq(req: &Request) -> Result<Option<u64>, serde_json::Value> {
    match req.params.get("seq") {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_u64() {
            Some(s) if s > 0 => Ok(Some(s)),
            _ => Err(err(&req.id, "bad_params", "seq must be a positive integer", None)),
        },
    }
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn require_session<'a>(
    state: &'a AppState,
    req: &Request,
) -> Result<&'a Session, serde_json::Value> {
    db_conn(state, req)?;
    state
        .session
        .as_ref()
        .ok_or_else(|| err(&req.id, "not_authenticated", "log in first", None))
}

pub fn dataset_kind(req: &Request) -> Result<DatasetKind, serde_json::Value> {
    let raw = required_str(req, "dataset")?;
    DatasetKind::parse(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            "dataset must be one of: assessments, students",
            Some(serde_json::json!({ "dataset": raw })),
        )
    })
}

pub fn view_err(req: &Request, e: ViewError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, e.details)
}

pub fn session_err(req: &Request, e: SessionError) -> serde_json::Value {
    err(&req.id, &e.code, e.message, None)
}
