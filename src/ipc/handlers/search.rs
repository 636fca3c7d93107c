use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_seq, require_session, required_str};
use crate::ipc::types::{AppState, Request};
use crate::records::DatasetKind;
use crate::search::{self, SearchTicket, SEARCH_FAILED};
use crate::sequence::Acceptance;
use serde_json::json;
use tracing::{debug, warn};

fn state_json(state: &AppState, stale: bool) -> serde_json::Value {
    let mut body = json!(state.search.state());
    body["stale"] = json!(stale);
    body
}

fn handle_search_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let query = match req.params.get("query") {
        None => String::new(),
        Some(v) => match v.as_str() {
            Some(s) => s.to_string(),
            None => return err(&req.id, "bad_params", "query must be a string", None),
        },
    };
    let seq = match optional_seq(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let seq = match state.search.begin(&query, seq) {
        SearchTicket::Stale(s) => {
            debug!(seq = s, "stale search request");
            return ok(&req.id, json!({ "seq": s, "stale": true }));
        }
        SearchTicket::Skipped(s) => {
            debug!(seq = s, "query too short, results cleared");
            return ok(&req.id, state_json(state, false));
        }
        SearchTicket::Run(s) => s,
    };

    let outcome = match state.dataset(DatasetKind::Students) {
        Some(d) => search::quick_search(&d.records, &query).map_err(|e| {
            warn!(code = %e.code, "quick search failed: {}", e.message);
            SEARCH_FAILED.to_string()
        }),
        None => Err(SEARCH_FAILED.to_string()),
    };
    let acceptance = state.search.finish(seq, outcome);
    ok(&req.id, state_json(state, acceptance == Acceptance::Stale))
}

fn handle_search_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    state.search.clear();
    ok(&req.id, state_json(state, false))
}

fn handle_search_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    state.search.close();
    ok(&req.id, state_json(state, false))
}

fn handle_search_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let known = state
        .search
        .state()
        .results
        .iter()
        .any(|r| r.get("id").and_then(|v| v.as_str()) == Some(student_id.as_str()));
    if !known {
        return err(
            &req.id,
            "not_found",
            "student is not among the current search results",
            Some(json!({ "studentId": student_id })),
        );
    }
    state.search.clear();
    ok(&req.id, json!({ "studentId": student_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "search.students" => Some(handle_search_students(state, req)),
        "search.clear" => Some(handle_search_clear(state, req)),
        "search.close" => Some(handle_search_close(state, req)),
        "search.select" => Some(handle_search_select(state, req)),
        _ => None,
    }
}
