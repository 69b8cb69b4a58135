//! Delta-Lake-shaped log event types (spec.md §3). Each is serialized as a
//! single-key NDJSON object: `{"protocol": {...}}`, `{"add": {...}}`, etc.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    pub min_reader_version: i32,
    pub min_writer_version: i32,
    #[serde(default)]
    pub reader_features: Vec<String>,
    #[serde(default)]
    pub writer_features: Vec<String>,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            min_reader_version: 1,
            min_writer_version: 2,
            reader_features: Vec::new(),
            writer_features: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Format {
    pub provider: String,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl Default for Format {
    fn default() -> Self {
        Self {
            provider: "parquet".to_string(),
            options: HashMap::new(),
        }
    }
}

/// Key under which the verbatim `CREATE TABLE` DDL is stashed inside
/// `MetaData::configuration`, so the table can be reconstructed empty in a
/// fresh engine session.
pub const CREATE_TABLE_CONFIG_KEY: &str = "duckpond.createTable";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    pub id: String,
    #[serde(default)]
    pub format: Format,
    pub schema_string: String,
    #[serde(default)]
    pub partition_columns: Vec<String>,
    pub created_time: i64,
    #[serde(default)]
    pub configuration: HashMap<String, String>,
}

impl MetaData {
    pub fn create_table_ddl(&self) -> Option<&str> {
        self.configuration.get(CREATE_TABLE_CONFIG_KEY).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Add {
    pub path: String,
    #[serde(default)]
    pub partition_values: HashMap<String, String>,
    pub size: i64,
    pub modification_time: i64,
    pub data_change: bool,
    /// JSON-encoded `{numRecords, stats:[{col_name,min,max,nullCount}]}`.
    pub stats: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remove {
    pub path: String,
    pub size: i64,
    pub modification_time: i64,
    pub data_change: bool,
    pub deletion_timestamp: i64,
    #[serde(default)]
    pub extended_file_metadata: bool,
    #[serde(default)]
    pub partition_values: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogEvent {
    #[serde(rename = "protocol")]
    Protocol(Protocol),
    #[serde(rename = "metaData")]
    MetaData(MetaData),
    #[serde(rename = "add")]
    Add(Add),
    #[serde(rename = "remove")]
    Remove(Remove),
}

/// Parse a newline-delimited JSON log body into its event stream,
/// preserving insertion order. Blank lines are skipped.
pub fn parse_events(body: &[u8]) -> Result<Vec<LogEvent>, serde_json::Error> {
    let text = String::from_utf8_lossy(body);
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(serde_json::from_str::<LogEvent>)
        .collect()
}

/// Serialize an event stream back into its NDJSON on-disk form.
pub fn serialize_events(events: &[LogEvent]) -> Vec<u8> {
    let mut out = Vec::new();
    for event in events {
        serde_json::to_writer(&mut out, event).expect("log events always serialize");
        out.push(b'\n');
    }
    out
}

/// Map an engine column type name to its Delta schema type, per the table
/// in spec.md §4.4.5.
pub fn engine_type_to_delta(engine_type: &str) -> String {
    match engine_type {
        "BIGINT" => "long".to_string(),
        "INTEGER" => "integer".to_string(),
        "VARCHAR" => "string".to_string(),
        "TIMESTAMP" => "timestamp_ntz".to_string(),
        "VARCHAR[]" => "array<string>".to_string(),
        other => other.to_lowercase(),
    }
}

/// The `MetaData` with the greatest insertion position — the schema in
/// force "now" (invariant I3).
pub fn metadata(events: &[LogEvent]) -> Option<&MetaData> {
    events.iter().rev().find_map(|e| match e {
        LogEvent::MetaData(m) => Some(m),
        _ => None,
    })
}

/// Live = {path ∈ Add} − {path ∈ Remove} (§4.4.6), in first-Add order.
pub fn live_adds(events: &[LogEvent]) -> Vec<&Add> {
    let removed: std::collections::HashSet<&str> = events
        .iter()
        .filter_map(|e| match e {
            LogEvent::Remove(r) => Some(r.path.as_str()),
            _ => None,
        })
        .collect();

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for e in events {
        if let LogEvent::Add(a) = e {
            if !removed.contains(a.path.as_str()) && seen.insert(a.path.as_str()) {
                out.push(a);
            }
        }
    }
    out
}

/// Tombstones whose retention window has elapsed as of `now_ms`.
pub fn reclaimable_removes(events: &[LogEvent], ttl_seconds: i64, now_ms: i64) -> Vec<&Remove> {
    let cutoff = now_ms - ttl_seconds * 1000;
    events
        .iter()
        .filter_map(|e| match e {
            LogEvent::Remove(r) if r.deletion_timestamp <= cutoff => Some(r),
            _ => None,
        })
        .collect()
}
