use crate::ipc::error::ok;
use crate::ipc::helpers::{db_conn, optional_str, required_str, session_err};
use crate::ipc::types::{AppState, Request};
use crate::session;
use serde_json::json;

fn handle_session_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let email = match required_str(req, "email") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let token = optional_str(req, "token");
    let role = optional_str(req, "role");
    match session::login(conn, &email, token, role) {
        Ok(s) => {
            let resp = ok(&req.id, json!({ "session": s }));
            state.session = Some(s);
            resp
        }
        Err(e) => session_err(req, e),
    }
}

fn handle_session_current(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(&req.id, json!({ "session": state.session }))
}

fn handle_session_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = session::logout(conn) {
        return session_err(req, e);
    }
    let was_logged_in = state.session.take().is_some();
    for slot in state.datasets.values_mut() {
        slot.clear();
    }
    state.search.clear();
    ok(&req.id, json!({ "loggedOut": was_logged_in }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.login" => Some(handle_session_login(state, req)),
        "session.current" => Some(handle_session_current(state, req)),
        "session.logout" => Some(handle_session_logout(state, req)),
        _ => None,
    }
}
