use chrono::{DateTime, Utc};
use logparser::{ContainerKind, Detection, EngineWarning, LogTypeSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stored next to the Arrow chunks as `meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    pub source_name: String,
    pub log_type: String,
    pub detection: Detection,
    pub container: ContainerKind,
    pub row_count: usize,
    pub raw_line_count: usize,
    pub chunk_count: usize,
    pub columns: Vec<ColumnMeta>,
    /// Range of the derived `datetime` column, absent when no row has one
    pub t_min: Option<DateTime<Utc>>,
    pub t_max: Option<DateTime<Utc>>,
    /// Rows per HTTP status class ("2xx", "4xx", ...)
    #[serde(default)]
    pub status_classes: BTreeMap<String, usize>,
    #[serde(default)]
    pub warnings: Vec<EngineWarning>,
}

impl TableMeta {
    pub fn skipped_lines(&self) -> usize {
        self.raw_line_count.saturating_sub(self.row_count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub log_type: String,
    pub detection: Detection,
    pub row_count: usize,
    pub raw_line_count: usize,
    pub warnings: Vec<EngineWarning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogTypesResponse {
    pub default_log_type: String,
    pub log_types: Vec<LogTypeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsPage {
    pub offset: usize,
    pub total: usize,
    pub records: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct TableQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RecordsQuery {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_page_size")]
    pub limit: usize,
}

fn default_page_size() -> usize {
    1_000
}
