use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// One row of tabular data, keyed by canonical field name.
pub type Record = serde_json::Map<String, Value>;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MIN_SEARCH_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Text,
    Categorical,
    Number,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

/// Named range of the summary field, `[at_least, below)`. A missing bound is
/// open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryBand {
    pub name: String,
    #[serde(default)]
    pub at_least: Option<f64>,
    #[serde(default)]
    pub below: Option<f64>,
}

impl SummaryBand {
    fn contains(&self, value: f64) -> bool {
        self.at_least.map_or(true, |lo| value >= lo) && self.below.map_or(true, |hi| value < hi)
    }
}

/// Caller-declared shape of a record set: which fields exist, which are
/// searched, what sorts by default and what the summary aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSchema {
    pub fields: Vec<FieldDef>,
    pub searchable: Vec<String>,
    pub default_sort_key: String,
    pub summary_field: String,
    #[serde(default)]
    pub bands: Vec<SummaryBand>,
}

impl ViewSchema {
    pub fn new(
        fields: &[(&str, FieldKind)],
        searchable: &[&str],
        default_sort_key: &str,
        summary_field: &str,
    ) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|(name, kind)| FieldDef {
                    name: name.to_string(),
                    kind: *kind,
                })
                .collect(),
            searchable: searchable.iter().map(|s| s.to_string()).collect(),
            default_sort_key: default_sort_key.to_string(),
            summary_field: summary_field.to_string(),
            bands: Vec::new(),
        }
    }

    pub fn with_band(mut self, name: &str, at_least: Option<f64>, below: Option<f64>) -> Self {
        self.bands.push(SummaryBand {
            name: name.to_string(),
            at_least,
            below,
        });
        self
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.kind)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn validate(&self) -> Result<(), ViewError> {
        for name in &self.searchable {
            if self.kind_of(name).is_none() {
                return Err(self.unknown_field("searchable", name));
            }
        }
        if self.kind_of(&self.default_sort_key).is_none() {
            return Err(self.unknown_field("defaultSortKey", &self.default_sort_key));
        }
        match self.kind_of(&self.summary_field) {
            Some(FieldKind::Number) => {}
            Some(_) => {
                return Err(ViewError::invalid_configuration(format!(
                    "summaryField must be a number field: {}",
                    self.summary_field
                )))
            }
            None => return Err(self.unknown_field("summaryField", &self.summary_field)),
        }
        for (i, band) in self.bands.iter().enumerate() {
            if band.name.trim().is_empty() {
                return Err(ViewError::invalid_configuration("band name must not be empty"));
            }
            if self.bands[..i].iter().any(|b| b.name == band.name) {
                return Err(ViewError::invalid_configuration(format!(
                    "duplicate band: {}",
                    band.name
                )));
            }
            if let (Some(lo), Some(hi)) = (band.at_least, band.below) {
                if lo >= hi {
                    return Err(ViewError::invalid_configuration(format!(
                        "band {} is empty: atLeast {} is not below {}",
                        band.name, lo, hi
                    ))
                    .with_details(serde_json::json!({ "band": band.name })));
                }
            }
        }
        Ok(())
    }

    fn unknown_field(&self, role: &str, name: &str) -> ViewError {
        ViewError::invalid_configuration(format!("unknown {} field: {}", role, name)).with_details(
            serde_json::json!({ "field": name, "allowed": self.field_names() }),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDir::Asc => "asc",
            SortDir::Desc => "desc",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("asc") {
            Some(SortDir::Asc)
        } else if raw.eq_ignore_ascii_case("desc") {
            Some(SortDir::Desc)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewControls {
    pub search_term: String,
    /// All must match.
    pub filters: Vec<FieldFilter>,
    /// Falls back to the schema's default sort key.
    pub sort_key: Option<String>,
    pub sort_dir: SortDir,
    pub page: usize,
    pub page_size: i64,
}

impl Default for ViewControls {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            filters: Vec::new(),
            sort_key: None,
            sort_dir: SortDir::Asc,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSummary {
    pub count: usize,
    pub average: i64,
    pub max: f64,
    pub min: f64,
    /// Matched records per schema band.
    pub bands: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewResult {
    pub visible_records: Vec<Record>,
    pub total_matched: usize,
    pub total_pages: usize,
    pub page: usize,
    pub page_size: usize,
    pub sort_key: String,
    pub sort_dir: SortDir,
    pub summary: ViewSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ViewError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::new("invalid_configuration", message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for ViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ViewError {}

/// Text form of a field; missing and null read as the empty string.
pub fn text_value(record: &Record, field: &str) -> String {
    match record.get(field) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Numeric form of a field; anything that does not parse reads as 0.
pub fn numeric_value(record: &Record, field: &str) -> f64 {
    match record.get(field) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_number(s).unwrap_or(0.0),
        _ => 0.0,
    }
}

pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Milliseconds since the Unix epoch; unparseable dates read as the epoch.
pub fn date_value(record: &Record, field: &str) -> i64 {
    match record.get(field) {
        Some(Value::String(s)) => parse_date(s)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or(0),
        Some(Value::Number(n)) => n.as_f64().map(|v| v as i64).unwrap_or(0),
        _ => 0,
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(trimmed, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Nearest integer with halves rounded up.
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Text(String),
    Number(f64),
    Date(i64),
}

impl SortValue {
    fn of(record: &Record, field: &str, kind: FieldKind) -> Self {
        match kind {
            FieldKind::Number => SortValue::Number(numeric_value(record, field)),
            FieldKind::Date => SortValue::Date(date_value(record, field)),
            FieldKind::Text | FieldKind::Categorical => {
                SortValue::Text(text_value(record, field).to_lowercase())
            }
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (SortValue::Number(a), SortValue::Number(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (SortValue::Date(a), SortValue::Date(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

fn matches_filter(record: &Record, filter: &FieldFilter, kind: FieldKind) -> bool {
    let raw = filter.value.trim();
    if raw.is_empty() {
        return true;
    }
    let needle = raw.to_lowercase();
    match kind {
        FieldKind::Text => text_value(record, &filter.field)
            .to_lowercase()
            .contains(&needle),
        FieldKind::Number => match parse_number(raw) {
            Some(v) => numeric_value(record, &filter.field) == v,
            None => false,
        },
        FieldKind::Date => match parse_date(raw) {
            Some(dt) => date_value(record, &filter.field) == dt.and_utc().timestamp_millis(),
            None => text_value(record, &filter.field).trim().to_lowercase() == needle,
        },
        FieldKind::Categorical => text_value(record, &filter.field).trim().to_lowercase() == needle,
    }
}

fn search_needle(term: &str) -> Option<String> {
    let trimmed = term.trim();
    if trimmed.chars().count() < MIN_SEARCH_LEN {
        return None;
    }
    Some(trimmed.to_lowercase())
}

fn summarize(records: &[&Record], schema: &ViewSchema) -> ViewSummary {
    let values: Vec<f64> = records
        .iter()
        .map(|r| numeric_value(r, &schema.summary_field))
        .collect();
    let bands = schema
        .bands
        .iter()
        .map(|b| (b.name.clone(), values.iter().filter(|v| b.contains(**v)).count()))
        .collect();
    if values.is_empty() {
        return ViewSummary {
            count: 0,
            average: 0,
            max: 0.0,
            min: 0.0,
            bands,
        };
    }
    let sum: f64 = values.iter().sum();
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    ViewSummary {
        count: values.len(),
        average: round_half_up(sum / values.len() as f64),
        max,
        min,
        bands,
    }
}

/// Filter, search, sort, summarize and paginate `records` in that order.
///
/// The input slice is only borrowed; the visible page is cloned out of it.
/// Missing or malformed field values never fail the call, they compare as the
/// zero value of their field kind.
pub fn compute(
    records: &[Record],
    schema: &ViewSchema,
    controls: &ViewControls,
) -> Result<ViewResult, ViewError> {
    schema.validate()?;
    if controls.page_size <= 0 {
        return Err(ViewError::invalid_configuration(format!(
            "pageSize must be positive, got {}",
            controls.page_size
        )));
    }
    let page_size = controls.page_size as usize;

    let sort_key = controls
        .sort_key
        .as_deref()
        .unwrap_or(schema.default_sort_key.as_str());
    let Some(sort_kind) = schema.kind_of(sort_key) else {
        return Err(schema.unknown_field("sort", sort_key));
    };
    let mut filters = Vec::with_capacity(controls.filters.len());
    for f in &controls.filters {
        match schema.kind_of(&f.field) {
            Some(kind) => filters.push((f, kind)),
            None => return Err(schema.unknown_field("filter", &f.field)),
        }
    }

    let mut matched: Vec<&Record> = records
        .iter()
        .filter(|r| filters.iter().all(|(f, kind)| matches_filter(r, f, *kind)))
        .collect();

    if let Some(needle) = search_needle(&controls.search_term) {
        matched.retain(|r| {
            schema
                .searchable
                .iter()
                .any(|field| text_value(r, field).to_lowercase().contains(&needle))
        });
    }

    let mut keyed: Vec<(SortValue, &Record)> = matched
        .into_iter()
        .map(|r| (SortValue::of(r, sort_key, sort_kind), r))
        .collect();
    keyed.sort_by(|a, b| {
        let ord = a.0.compare(&b.0);
        match controls.sort_dir {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        }
    });
    let sorted: Vec<&Record> = keyed.into_iter().map(|(_, r)| r).collect();

    let summary = summarize(&sorted, schema);

    let total_matched = sorted.len();
    let total_pages = total_matched.div_ceil(page_size);
    let page = controls.page.clamp(1, total_pages.max(1));
    let start = std::cmp::min((page - 1) * page_size, total_matched);
    let end = std::cmp::min(start + page_size, total_matched);
    let visible_records = sorted[start..end].iter().map(|r| (*r).clone()).collect();

    Ok(ViewResult {
        visible_records,
        total_matched,
        total_pages,
        page,
        page_size,
        sort_key: sort_key.to_string(),
        sort_dir: controls.sort_dir,
        summary,
    })
}
