use crate::view::{parse_date, parse_number, FieldKind, Record, ViewSchema};
use anyhow::{anyhow, Context};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    Assessments,
    Students,
}

impl DatasetKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "assessments" => Some(DatasetKind::Assessments),
            "students" => Some(DatasetKind::Students),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DatasetKind::Assessments => "assessments",
            DatasetKind::Students => "students",
        }
    }
}

/// A loaded record set, already in canonical shape.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub records: Vec<Record>,
    pub fingerprint: String,
    pub loaded_at: String,
}

impl Dataset {
    pub fn new(records: Vec<Record>) -> Self {
        let fingerprint = fingerprint(&records);
        Self {
            records,
            fingerprint,
            loaded_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub records: Vec<Record>,
    pub skipped: usize,
}

pub const TOP_PERFORMER_MIN: f64 = 85.0;
pub const NEEDS_ATTENTION_BELOW: f64 = 60.0;

pub fn schema_for(kind: DatasetKind) -> ViewSchema {
    match kind {
        DatasetKind::Assessments => ViewSchema::new(
            &[
                ("studentId", FieldKind::Text),
                ("studentName", FieldKind::Text),
                ("section", FieldKind::Categorical),
                ("subject", FieldKind::Text),
                ("assessmentName", FieldKind::Text),
                ("date", FieldKind::Date),
                ("score", FieldKind::Number),
                ("maxScore", FieldKind::Number),
                ("percentage", FieldKind::Number),
                ("grade", FieldKind::Categorical),
            ],
            &["assessmentName", "subject"],
            "date",
            "score",
        ),
        DatasetKind::Students => ViewSchema::new(
            &[
                ("id", FieldKind::Text),
                ("name", FieldKind::Text),
                ("year", FieldKind::Categorical),
                ("section", FieldKind::Categorical),
                ("email", FieldKind::Text),
                ("averagePercentage", FieldKind::Number),
                ("assessmentCount", FieldKind::Number),
                ("grade", FieldKind::Categorical),
            ],
            &["name", "id", "email"],
            "name",
            "averagePercentage",
        )
        .with_band("topPerformers", Some(TOP_PERFORMER_MIN), None)
        .with_band("needsAttention", None, Some(NEEDS_ATTENTION_BELOW)),
    }
}

/// Letter grade for a percentage on the 12-step scale.
pub fn letter_grade(percentage: f64) -> &'static str {
    const SCALE: [(f64, &str); 11] = [
        (97.0, "A+"),
        (93.0, "A"),
        (90.0, "A-"),
        (87.0, "B+"),
        (83.0, "B"),
        (80.0, "B-"),
        (77.0, "C+"),
        (73.0, "C"),
        (70.0, "C-"),
        (67.0, "D+"),
        (65.0, "D"),
    ];
    SCALE
        .iter()
        .find(|(min, _)| percentage >= *min)
        .map(|(_, g)| *g)
        .unwrap_or("F")
}

fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

fn pick<'a>(row: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|key| match row.get(*key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(v) => Some(v),
    })
}

fn pick_text(row: &Map<String, Value>, aliases: &[&str]) -> String {
    match pick(row, aliases) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn pick_number(row: &Map<String, Value>, aliases: &[&str]) -> Option<f64> {
    match pick(row, aliases)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn canonical_date(row: &Map<String, Value>, aliases: &[&str]) -> String {
    let raw = pick_text(row, aliases);
    match parse_date(&raw) {
        Some(dt) if dt.time() == chrono::NaiveTime::MIN => dt.format("%Y-%m-%d").to_string(),
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => raw,
    }
}

fn normalize_assessment(row: &Map<String, Value>) -> Record {
    let score = pick_number(row, &["score", "marks", "marks_obtained", "percentage"]).unwrap_or(0.0);
    let max_score = pick_number(row, &["maxScore", "max_score", "max_marks"]).unwrap_or(100.0);
    let percentage = pick_number(row, &["percentage"]).unwrap_or_else(|| {
        if max_score > 0.0 {
            round_off_1_decimal(100.0 * score / max_score)
        } else {
            0.0
        }
    });
    let grade = match pick_text(row, &["grade"]) {
        g if g.is_empty() => letter_grade(percentage).to_string(),
        g => g,
    };

    let mut out = Record::new();
    out.insert(
        "studentId".into(),
        json!(pick_text(row, &["studentId", "student_id", "id"])),
    );
    out.insert(
        "studentName".into(),
        json!(pick_text(row, &["studentName", "student_name", "name"])),
    );
    out.insert("section".into(), json!(pick_text(row, &["section", "class"])));
    out.insert(
        "subject".into(),
        json!(pick_text(row, &["subject", "subjectName", "subject_name"])),
    );
    out.insert(
        "assessmentName".into(),
        json!(pick_text(
            row,
            &["assessmentName", "assessment", "assessment_name"]
        )),
    );
    out.insert(
        "date".into(),
        json!(canonical_date(row, &["date", "assessmentDate", "assessment_date"])),
    );
    out.insert("score".into(), json!(score));
    out.insert("maxScore".into(), json!(max_score));
    out.insert("percentage".into(), json!(percentage));
    out.insert("grade".into(), json!(grade));
    out
}

fn normalize_student(row: &Map<String, Value>) -> Record {
    let summary = row
        .get("performance_summary")
        .or_else(|| row.get("performanceSummary"))
        .and_then(|v| v.as_object());
    let nested_number = |keys: &[&str]| summary.and_then(|s| pick_number(s, keys));

    let average = pick_number(row, &["averagePercentage", "average_percentage"])
        .or_else(|| nested_number(&["average_percentage", "averagePercentage"]))
        .unwrap_or(0.0);
    let count = pick_number(row, &["assessmentCount", "total_assessments"])
        .or_else(|| nested_number(&["total_assessments", "totalAssessments"]))
        .unwrap_or(0.0);
    let grade = match pick_text(row, &["grade"]) {
        g if g.is_empty() => letter_grade(average).to_string(),
        g => g,
    };

    let mut out = Record::new();
    out.insert(
        "id".into(),
        json!(pick_text(row, &["id", "studentId", "student_id"])),
    );
    out.insert(
        "name".into(),
        json!(pick_text(row, &["name", "studentName", "student_name", "full_name"])),
    );
    out.insert("year".into(), json!(pick_text(row, &["year", "grade_level"])));
    out.insert("section".into(), json!(pick_text(row, &["section", "class"])));
    out.insert("email".into(), json!(pick_text(row, &["email"])));
    out.insert("averagePercentage".into(), json!(average));
    out.insert("assessmentCount".into(), json!(count as i64));
    out.insert("grade".into(), json!(grade));
    out
}

/// Map raw rows onto the canonical schema of `kind`. Rows that are not JSON
/// objects are skipped and counted.
pub fn normalize(kind: DatasetKind, rows: &[Value]) -> Normalized {
    let mut out = Normalized::default();
    for row in rows {
        let Some(obj) = row.as_object() else {
            out.skipped += 1;
            continue;
        };
        out.records.push(match kind {
            DatasetKind::Assessments => normalize_assessment(obj),
            DatasetKind::Students => normalize_student(obj),
        });
    }
    out
}

/// Accepts a bare array, `{ "records": [...] }`, or the API envelope
/// `{ "success": true, "data": { "students": [...] } }`.
pub fn unwrap_rows(value: Value) -> anyhow::Result<Vec<Value>> {
    match value {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut obj) => {
            for key in ["records", "students", "assessments"] {
                if let Some(Value::Array(rows)) = obj.remove(key) {
                    return Ok(rows);
                }
            }
            if let Some(data) = obj.remove("data") {
                return unwrap_rows(data);
            }
            Err(anyhow!("no record array found in object"))
        }
        _ => Err(anyhow!("records must be an array")),
    }
}

pub fn read_json_file(path: &Path) -> anyhow::Result<Vec<Value>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("invalid JSON in {}", path.to_string_lossy()))?;
    unwrap_rows(value)
}

pub fn read_csv_file(path: &Path) -> anyhow::Result<Vec<Value>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    let headers = rdr.headers()?.clone();
    let mut rows = Vec::new();
    for rec in rdr.records() {
        let rec = rec.with_context(|| format!("bad CSV row in {}", path.to_string_lossy()))?;
        let mut obj = Map::new();
        for (h, v) in headers.iter().zip(rec.iter()) {
            obj.insert(h.to_string(), Value::String(v.to_string()));
        }
        rows.push(Value::Object(obj));
    }
    Ok(rows)
}

pub fn read_rows_file(path: &Path) -> anyhow::Result<Vec<Value>> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => read_csv_file(path),
        "json" => read_json_file(path),
        other => Err(anyhow!("unsupported file type: .{}", other)),
    }
}

pub fn fingerprint(records: &[Record]) -> String {
    let mut hasher = Sha256::new();
    for r in records {
        hasher.update(Value::Object(r.clone()).to_string().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Sorted distinct non-empty values of `field`, for filter dropdowns.
pub fn distinct_values(records: &[Record], field: &str) -> Vec<String> {
    records
        .iter()
        .map(|r| crate::view::text_value(r, field).trim().to_string())
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
