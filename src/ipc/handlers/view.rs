use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{dataset_kind, require_session, view_err};
use crate::ipc::types::{AppState, Request};
use crate::records;
use crate::view::{
    self, FieldFilter, SortDir, SummaryBand, ViewControls, ViewSchema, DEFAULT_PAGE_SIZE,
};
use serde_json::json;
use tracing::debug;

const MAX_PAGE_SIZE: i64 = 500;

fn parse_search(v: Option<&serde_json::Value>) -> Result<String, String> {
    let Some(value) = v else {
        return Ok(String::new());
    };
    if value.is_null() {
        return Ok(String::new());
    }
    let Some(raw) = value.as_str() else {
        return Err("query.search must be string or null".to_string());
    };
    Ok(raw.to_string())
}

fn filter_entry(value: &serde_json::Value, label: &str) -> Result<FieldFilter, String> {
    let Some(obj) = value.as_object() else {
        return Err(format!("{} must be an object", label));
    };
    let Some(field) = obj.get("field").and_then(|v| v.as_str()) else {
        return Err(format!("{}.field must be a string", label));
    };
    let matched = match obj.get("value") {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(_) => return Err(format!("{}.value must be a string or number", label)),
    };
    Ok(FieldFilter {
        field: field.to_string(),
        value: matched,
    })
}

/// `filter` holds one condition, `filters` a list; both combine with AND.
fn parse_filters(
    single: Option<&serde_json::Value>,
    many: Option<&serde_json::Value>,
) -> Result<Vec<FieldFilter>, String> {
    let mut out = Vec::new();
    if let Some(value) = single.filter(|v| !v.is_null()) {
        out.push(filter_entry(value, "query.filter")?);
    }
    if let Some(value) = many.filter(|v| !v.is_null()) {
        let Some(items) = value.as_array() else {
            return Err("query.filters must be an array or null".to_string());
        };
        for (i, item) in items.iter().enumerate() {
            out.push(filter_entry(item, &format!("query.filters[{}]", i))?);
        }
    }
    Ok(out)
}

fn parse_sort_by(v: Option<&serde_json::Value>) -> Result<Option<String>, String> {
    let Some(value) = v else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let Some(raw) = value.as_str() else {
        return Err("query.sortBy must be a string".to_string());
    };
    Ok(Some(raw.to_string()))
}

fn parse_sort_dir(v: Option<&serde_json::Value>) -> Result<SortDir, String> {
    let Some(value) = v else {
        return Ok(SortDir::Asc);
    };
    let Some(raw) = value.as_str() else {
        return Err("query.sortDir must be a string".to_string());
    };
    SortDir::parse(raw).ok_or_else(|| "query.sortDir must be one of: asc, desc".to_string())
}

fn parse_page(v: Option<&serde_json::Value>) -> Result<usize, String> {
    let Some(value) = v else {
        return Ok(1);
    };
    let Some(page) = value.as_u64() else {
        return Err("query.page must be a positive integer".to_string());
    };
    if page == 0 {
        return Err("query.page must be >= 1".to_string());
    }
    Ok(page as usize)
}

/// Non-positive sizes pass through so the view model can reject them as a
/// configuration error. Oversized pages are capped at `MAX_PAGE_SIZE`.
fn parse_page_size(v: Option<&serde_json::Value>) -> Result<i64, String> {
    let Some(value) = v else {
        return Ok(DEFAULT_PAGE_SIZE);
    };
    let Some(size) = value.as_i64() else {
        return Err("query.pageSize must be an integer".to_string());
    };
    Ok(size.min(MAX_PAGE_SIZE))
}

fn parse_view_controls(req: &Request) -> Result<ViewControls, serde_json::Value> {
    let query = req
        .params
        .get("query")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();
    let bad = |msg: String| err(&req.id, "bad_params", msg, None);

    Ok(ViewControls {
        search_term: parse_search(query.get("search")).map_err(bad)?,
        filters: parse_filters(query.get("filter"), query.get("filters")).map_err(bad)?,
        sort_key: parse_sort_by(query.get("sortBy")).map_err(bad)?,
        sort_dir: parse_sort_dir(query.get("sortDir")).map_err(bad)?,
        page: parse_page(query.get("page")).map_err(bad)?,
        page_size: parse_page_size(query.get("pageSize")).map_err(bad)?,
    })
}

fn string_list(v: &serde_json::Value, key: &str) -> Result<Vec<String>, String> {
    let Some(items) = v.as_array() else {
        return Err(format!("schema.{} must be an array of strings", key));
    };
    items
        .iter()
        .map(|i| {
            i.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| format!("schema.{} must be an array of strings", key))
        })
        .collect()
}

/// Caller overrides on top of the dataset's built-in schema.
fn apply_schema_overrides(
    mut schema: ViewSchema,
    req: &Request,
) -> Result<ViewSchema, serde_json::Value> {
    let Some(overrides) = req.params.get("schema").filter(|v| !v.is_null()) else {
        return Ok(schema);
    };
    let bad = |msg: String| err(&req.id, "bad_params", msg, None);
    let Some(obj) = overrides.as_object() else {
        return Err(bad("schema must be an object".to_string()));
    };
    if let Some(v) = obj.get("searchable") {
        schema.searchable = string_list(v, "searchable").map_err(bad)?;
    }
    if let Some(v) = obj.get("defaultSortKey") {
        schema.default_sort_key = v
            .as_str()
            .ok_or_else(|| bad("schema.defaultSortKey must be a string".to_string()))?
            .to_string();
    }
    if let Some(v) = obj.get("summaryField") {
        schema.summary_field = v
            .as_str()
            .ok_or_else(|| bad("schema.summaryField must be a string".to_string()))?
            .to_string();
    }
    if let Some(v) = obj.get("bands") {
        schema.bands = serde_json::from_value::<Vec<SummaryBand>>(v.clone())
            .map_err(|e| bad(format!("schema.bands: {e}")))?;
    }
    Ok(schema)
}

fn handle_view_compute(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let kind = match dataset_kind(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let controls = match parse_view_controls(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let schema = match apply_schema_overrides(records::schema_for(kind), req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let rows = state
        .dataset(kind)
        .map(|d| d.records.as_slice())
        .unwrap_or(&[]);
    let result = match view::compute(rows, &schema, &controls) {
        Ok(v) => v,
        Err(e) => return view_err(req, e),
    };
    debug!(
        dataset = kind.as_str(),
        matched = result.total_matched,
        page = result.page,
        sort_dir = result.sort_dir.as_str(),
        "view computed"
    );

    let mut body = json!(result);
    body["dataset"] = json!(kind.as_str());
    body["fingerprint"] = json!(state.dataset(kind).map(|d| d.fingerprint.clone()));
    body["loadedAt"] = json!(state.dataset(kind).map(|d| d.loaded_at.clone()));
    ok(&req.id, body)
}

fn handle_view_schema(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_session(state, req) {
        return e;
    }
    let kind = match dataset_kind(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(&req.id, json!({ "dataset": kind.as_str(), "schema": records::schema_for(kind) }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "view.compute" => Some(handle_view_compute(state, req)),
        "view.schema" => Some(handle_view_schema(state, req)),
        _ => None,
    }
}
