//! Data models shared by the store, the reconciler, the series builder and ingestion.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---

/// A single scalar observed by a sensor.
///
/// Nulls are never represented: an absent value is an absent map key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Bool(_) | FieldValue::Text(_) => None,
        }
    }

    /// Parse a raw text cell: blank is absent, numbers become numbers.
    pub fn from_cell(cell: &str) -> Option<FieldValue> {
        // ---
        let cell = cell.trim();
        if cell.is_empty() {
            return None;
        }
        match cell.parse::<f64>() {
            Ok(n) if n.is_finite() => Some(FieldValue::Number(n)),
            // NaN and inf cells are how exporters spell "no reading".
            Ok(_) => None,
            Err(_) => Some(FieldValue::Text(cell.to_string())),
        }
    }

    /// Convert an uploaded JSON scalar; `null`, arrays and objects are absent.
    pub fn from_json(value: &serde_json::Value) -> Option<FieldValue> {
        match value {
            serde_json::Value::Bool(b) => Some(FieldValue::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(FieldValue::Number),
            serde_json::Value::String(s) => Some(FieldValue::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// Live per-field summary kept for each sensor, updated on every accepted upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFieldMetadata {
    pub units: Option<String>,
    pub last_value: Option<FieldValue>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// All field summaries for one raw sensor name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorDocument {
    pub name: String,
    pub fields: BTreeMap<String, RawFieldMetadata>,
}

/// Partial update of one field summary. `None` keeps what is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMetadataUpdate {
    pub field: String,
    pub units: Option<String>,
    pub last_value: Option<FieldValue>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// One row of the static lookup table, keyed by `(current_name, current_field)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupEntry {
    pub current_name: String,
    pub current_field: String,
    pub new_name: Option<String>,
    pub new_field: Option<String>,
    pub units: Option<String>,
    pub new_units: Option<String>,
    pub keep: bool,
    pub location: Option<String>,
    /// Extra grouping columns (Project, Parameter, ...), verbatim.
    pub groups: BTreeMap<String, String>,
}

/// Reconciled, UI-facing view of one stored field.
///
/// `db_name`/`db_field` are the only keys used against storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalField {
    pub display_name: String,
    pub display_field: String,
    pub units: String,
    pub db_name: String,
    pub db_field: String,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_value: Option<FieldValue>,
    pub location: String,
    #[serde(skip)]
    pub groups: BTreeMap<String, String>,
}

impl CanonicalField {
    /// `"{display_field} ({units})"`, used for plot axes and CSV headers.
    pub fn label(&self) -> String {
        format!("{} ({})", self.display_field, self.units)
    }

    /// Cumulative outflow counters are the only fields worth zero-run smoothing.
    pub fn supports_smoothing(&self) -> bool {
        self.display_field.to_lowercase().starts_with("outflow")
    }
}

/// A reading ready to be persisted. Fields are sparse: absent values have no key.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub name: String,
    pub time: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldValue>,
    pub uploaded_by: Option<String>,
    pub upload_id: Uuid,
}

/// Store-side filter for one field of one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingQuery {
    pub name: String,
    pub field: String,
    /// `[start, end)` in UTC. `None` is unbounded.
    pub bounds: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// One projected `(time, value)` pair returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub time: DateTime<Utc>,
    pub value: FieldValue,
}

/// Query result ready for plotting or export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub label: String,
    pub points: Vec<SeriesPoint>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// One uploaded row after parsing, before dedup.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRow {
    pub time: DateTime<Utc>,
    pub values: BTreeMap<String, FieldValue>,
}

/// Everything uploaded for one sensor in one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBatch {
    pub sensor_id: String,
    pub rows: Vec<IngestRow>,
    /// Units announced by the upload, per raw field.
    pub units: BTreeMap<String, String>,
}
