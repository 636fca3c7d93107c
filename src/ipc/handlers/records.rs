use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{dataset_kind, optional_seq, optional_str, require_session, required_str};
use crate::ipc::types::{AppState, Request};
use crate::records::{self, Dataset};
use crate::sequence::Acceptance;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

fn raw_rows(req: &Request) -> Result<Vec<serde_json::Value>, serde_json::Value> {
    if let Some(inline) = req.params.get("records") {
        return records::unwrap_rows(inline.clone())
            .map_err(|e| err(&req.id, "bad_params", format!("records: {e}"), None));
    }
    let Some(path) = optional_str(req, "path").map(PathBuf::from) else {
        return Err(err(&req.id, "bad_params", "missing records or path", None));
    };
    records::read_rows_file(&path).map_err(|e| {
        err(
            &req.id,
            "load_failed",
            format!("{e:#}"),
            Some(json!({ "path": path.to_string_lossy() })),
        )
    })
}

fn handle_records_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let kind = match dataset_kind(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let seq = match optional_seq(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let rows = match raw_rows(req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let normalized = records::normalize(kind, &rows);
    let count = normalized.records.len();
    let skipped = normalized.skipped;
    let dataset = Dataset::new(normalized.records);
    let fingerprint = dataset.fingerprint.clone();
    let loaded_at = dataset.loaded_at.clone();

    let slot = state.datasets.entry(kind).or_default();
    let (seq, acceptance) = match seq {
        Some(s) => (s, slot.offer(s, dataset)),
        None => {
            let s = slot.issue();
            (s, slot.resolve(s, dataset))
        }
    };
    let stale = acceptance == Acceptance::Stale;
    if stale {
        warn!(dataset = kind.as_str(), seq, latest = slot.seq(), "discarded stale load");
    } else {
        info!(dataset = kind.as_str(), seq, count, skipped, "dataset loaded");
    }

    ok(
        &req.id,
        json!({
            "dataset": kind.as_str(),
            "seq": seq,
            "stale": stale,
            "count": if stale { 0 } else { count },
            "skipped": skipped,
            "fingerprint": if stale { serde_json::Value::Null } else { json!(fingerprint) },
            "loadedAt": if stale { serde_json::Value::Null } else { json!(loaded_at) },
        }),
    )
}

fn handle_records_options(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let kind = match dataset_kind(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let field = match required_str(req, "field") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let schema = records::schema_for(kind);
    if schema.kind_of(&field).is_none() {
        return err(
            &req.id,
            "invalid_configuration",
            format!("unknown field: {}", field),
            Some(json!({ "allowed": schema.field_names() })),
        );
    }
    let values = state
        .dataset(kind)
        .map(|d| records::distinct_values(&d.records, &field))
        .unwrap_or_default();
    ok(&req.id, json!({ "dataset": kind.as_str(), "field": field, "values": values }))
}

fn handle_records_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let kind = match dataset_kind(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let cleared = match state.datasets.get_mut(&kind) {
        Some(slot) => {
            let had = slot.get().is_some();
            slot.clear();
            had
        }
        None => false,
    };
    ok(&req.id, json!({ "dataset": kind.as_str(), "cleared": cleared }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "records.load" => Some(handle_records_load(state, req)),
        "records.options" => Some(handle_records_options(state, req)),
        "records.clear" => Some(handle_records_clear(state, req)),
        _ => None,
    }
}
