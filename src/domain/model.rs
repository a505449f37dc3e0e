use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// A claim row as returned by the CollaborateMD report. The report layout is
/// configured on the CollaborateMD side, so no field is guaranteed to exist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimRecord {
    pub data: Map<String, Value>,
}

impl ClaimRecord {
    pub fn new(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// Wraps any JSON value; non-object values are kept under `value`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(data) => Self { data },
            other => {
                let mut data = Map::new();
                data.insert("value".to_string(), other);
                Self { data }
            }
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// String or number rendered as text; null and empty strings are absent.
    pub fn get_string(&self, field: &str) -> Option<String> {
        match self.data.get(field)? {
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Normalized `YYYY-MM-DD`, see [`normalize_date`].
    pub fn get_date(&self, field: &str) -> Option<String> {
        self.data
            .get(field)
            .filter(|v| !is_blank(v))
            .and_then(normalize_date)
    }

    /// See [`parse_decimal`].
    pub fn get_decimal(&self, field: &str) -> Option<f64> {
        self.data.get(field).and_then(parse_decimal)
    }

    /// Point in time carried by a date-bearing field, for watermark checks.
    pub fn get_timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        match self.data.get(field)? {
            Value::String(s) if !s.is_empty() => parse_timestamp(s),
            _ => None,
        }
    }

    pub fn has_value(&self, field: &str) -> bool {
        self.data.get(field).is_some_and(|v| !is_blank(v))
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Accepts ISO-8601 with a time component, `MM/DD/YYYY` and `YYYY-MM-DD`.
/// Anything else is logged and treated as absent.
pub fn normalize_date(value: &Value) -> Option<String> {
    let Some(raw) = value.as_str() else {
        tracing::warn!("Unrecognized date value: {}", value);
        return None;
    };

    let date = if raw.contains('T') {
        parse_iso_datetime(raw).map(|(date, _)| date)
    } else if raw.contains('/') {
        NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok()
    } else if raw.contains('-') && raw.len() == 10 {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    } else {
        tracing::warn!("Unrecognized date format: {}", raw);
        return None;
    };

    if date.is_none() {
        tracing::warn!("Failed to parse date '{}'", raw);
    }
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

/// Same shapes as [`normalize_date`]; values without an offset are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.contains('T') {
        return parse_iso_datetime(raw).map(|(_, instant)| instant);
    }
    let date = if raw.contains('/') {
        NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok()?
    } else {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?
    };
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

// Calendar date as written (no timezone shift) plus the UTC instant.
fn parse_iso_datetime(raw: &str) -> Option<(NaiveDate, DateTime<Utc>)> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some((dt.date_naive(), dt.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some((naive.date(), naive.and_utc()));
        }
    }
    None
}

/// Any number, or a string that parses as one. Empty and missing values are
/// absent rather than zero; so are NaN and infinities.
pub fn parse_decimal(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Null => return None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => return None,
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Some(v),
        _ => {
            tracing::warn!("Failed to parse decimal '{}'", value);
            None
        }
    }
}

/// A claim shaped for the Salesforce `Claims__c` object. Only fields with a
/// value are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformedClaim {
    pub fields: Map<String, Value>,
}

impl TransformedClaim {
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_str())
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn set_opt<V: Into<Value>>(&mut self, field: &str, value: Option<V>) {
        if let Some(value) = value {
            self.set(field, value);
        }
    }

    /// Copy of the record without `field`, used for external-id PATCH bodies.
    pub fn without(&self, field: &str) -> Map<String, Value> {
        self.fields
            .iter()
            .filter(|(k, _)| k.as_str() != field)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Payor display name to Salesforce record id. Built once per run and never
/// mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayorLookup {
    entries: HashMap<String, String>,
}

impl PayorLookup {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    /// Merges `(name, id)` rows. Names carrying a `(#...)` suffix also register
    /// their bare name; a full name always wins over a truncated one.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut full = HashMap::new();
        let mut truncated = HashMap::new();

        for (name, id) in rows {
            if name.is_empty() || id.is_empty() {
                continue;
            }
            if let Some((bare, _)) = name.split_once("(#") {
                truncated.insert(bare.trim().to_string(), id.clone());
            }
            full.insert(name, id);
        }

        let mut entries = truncated;
        entries.extend(full);
        Self { entries }
    }

    /// `"{name} ({payer_id})"` first, then the bare name.
    pub fn resolve(&self, name: &str, payer_id: Option<&str>) -> Option<&str> {
        if name.is_empty() {
            return None;
        }
        if let Some(payer_id) = payer_id.filter(|p| !p.is_empty()) {
            if let Some(id) = self.entries.get(&format!("{} ({})", name, payer_id)) {
                return Some(id.as_str());
            }
        }
        self.entries.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
}

/// One row per sync id; overwritten on every successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub sync_id: String,
    pub last_sync_timestamp: DateTime<Utc>,
    pub last_sync_date: String,
    pub records_processed: usize,
    pub records_successful: usize,
    pub records_failed: usize,
    pub updated_at: DateTime<Utc>,
}

impl SyncState {
    pub fn new(sync_id: &str, timestamp: DateTime<Utc>, counts: SyncCounts) -> Self {
        Self {
            sync_id: sync_id.to_string(),
            last_sync_timestamp: timestamp,
            last_sync_date: timestamp.format("%Y-%m-%d").to_string(),
            records_processed: counts.processed,
            records_successful: counts.successful,
            records_failed: counts.failed,
            updated_at: Utc::now(),
        }
    }
}

/// Why a record (or a whole chunk of records) did not reach Salesforce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordError {
    Record {
        claim_id: Option<String>,
        error: String,
    },
    Chunk {
        batch: usize,
        error: String,
        records: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpsertSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<RecordError>,
}

impl UpsertSummary {
    pub fn counts(&self) -> SyncCounts {
        SyncCounts {
            processed: self.total,
            successful: self.successful,
            failed: self.failed,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64 * 100.0
        }
    }
}
