use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;
use crate::container::ContainerKind;

/// A single scalar field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Only produced by the normalizer for the derived `datetime` column
    DateTime(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
            Value::DateTime(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<Option<String>> for Value {
    fn from(s: Option<String>) -> Self {
        s.map(Value::Str).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::Str(s),
            // nested structures stay as compact JSON text
            nested => Value::Str(nested.to_string()),
        }
    }
}

/// One parsed row. Columns keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    /// Set a field, replacing any previous value in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Ordered records plus the union of their columns in first-seen order.
///
/// Column completeness is not enforced: a column listed here may be absent
/// from any given record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedTable {
    columns: Vec<String>,
    records: Vec<Record>,
}

impl ParsedTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        for name in record.columns() {
            if !self.columns.iter().any(|c| c == name) {
                self.columns.push(name.to_string());
            }
        }
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    /// Values of one column, `None` where a record lacks it.
    pub fn column_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = Option<&'a Value>> {
        self.records.iter().map(move |r| r.get(name))
    }

    /// Append another table's records, keeping order.
    pub fn extend(&mut self, other: ParsedTable) {
        for record in other.records {
            self.push(record);
        }
    }

    pub(crate) fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    pub(crate) fn ensure_column(&mut self, name: &str) {
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
    }
}

impl FromIterator<Record> for ParsedTable {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut table = ParsedTable::new();
        for record in iter {
            table.push(record);
        }
        table
    }
}

impl<'a> IntoIterator for &'a ParsedTable {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Built-in log grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Browsing,
    Virus,
    Mail,
    Firewall,
    Auth,
    System,
    Application,
    Ids,
    Vpn,
    Syslog,
    Clf,
    Elf,
    Json,
    Xml,
    Csv,
}

impl LogType {
    pub const ALL: [LogType; 15] = [
        LogType::Browsing,
        LogType::Virus,
        LogType::Mail,
        LogType::Firewall,
        LogType::Auth,
        LogType::System,
        LogType::Application,
        LogType::Ids,
        LogType::Vpn,
        LogType::Syslog,
        LogType::Clf,
        LogType::Elf,
        LogType::Json,
        LogType::Xml,
        LogType::Csv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Browsing => "browsing",
            Self::Virus => "virus",
            Self::Mail => "mail",
            Self::Firewall => "firewall",
            Self::Auth => "auth",
            Self::System => "system",
            Self::Application => "application",
            Self::Ids => "ids",
            Self::Vpn => "vpn",
            Self::Syslog => "syslog",
            Self::Clf => "clf",
            Self::Elf => "elf",
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Csv => "csv",
        }
    }

    /// Grammars parsed by positional whitespace splitting.
    pub fn is_fixed_field(&self) -> bool {
        matches!(
            self,
            Self::Browsing
                | Self::Virus
                | Self::Mail
                | Self::Firewall
                | Self::Auth
                | Self::System
                | Self::Application
                | Self::Ids
                | Self::Vpn
        )
    }

    /// Grammars whose column names come from the data itself.
    pub fn is_self_describing(&self) -> bool {
        matches!(self, Self::Elf | Self::Json | Self::Xml | Self::Csv)
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError::UnknownLogType(s.to_string()))
    }
}

/// How the engine settled on a log type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detection {
    /// Named by the caller
    Declared,
    /// Implied by a structured document extension (.json, .xml, .csv)
    Document,
    /// Recognised from the sampled lines
    Content,
    /// Nothing matched; the configured default was used
    Default,
}

/// Recoverable problems reported alongside a parse result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineWarning {
    /// The detected container could not be decoded; the bytes were read as plain text.
    ContainerFallback { container: String, reason: String },
    /// The source could not be read at all.
    Unreadable { reason: String },
    /// Lines were decoded but none matched the grammar.
    NoRecordsMatched { log_type: String, lines: usize },
}

impl fmt::Display for EngineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContainerFallback { container, reason } => {
                write!(f, "could not decode {} container, read as plain text: {}", container, reason)
            }
            Self::Unreadable { reason } => write!(f, "source unreadable: {}", reason),
            Self::NoRecordsMatched { log_type, lines } => {
                write!(f, "none of {} lines matched the {} grammar", lines, log_type)
            }
        }
    }
}

/// Everything a caller needs to judge a parse: the table plus how it was produced.
#[derive(Debug, Clone, Serialize)]
pub struct ParseOutcome {
    pub table: ParsedTable,
    pub log_type: String,
    pub detection: Detection,
    pub container: ContainerKind,
    pub raw_line_count: usize,
    pub warnings: Vec<EngineWarning>,
}

impl ParseOutcome {
    /// Decoded lines that did not become a record.
    pub fn skipped_lines(&self) -> usize {
        self.raw_line_count.saturating_sub(self.table.len())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unknown log type: {0}")]
    UnknownLogType(String),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_insert_replaces_in_place() {
        let mut record = Record::new();
        record.insert("a", "1");
        record.insert("b", "2");
        record.insert("a", "3");

        assert_eq!(record.len(), 2);
        assert_eq!(record.get_str("a"), Some("3"));
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_table_columns_are_union_in_first_seen_order() {
        let mut table = ParsedTable::new();
        table.push([("x", Value::from("1"))].into_iter().collect());
        table.push([("y", Value::from("2")), ("x", Value::from("3"))].into_iter().collect());

        assert_eq!(table.columns(), &["x".to_string(), "y".to_string()]);
        assert_eq!(
            table.column_values("y").collect::<Vec<_>>(),
            vec![None, Some(&Value::from("2"))]
        );
    }

    #[test]
    fn test_log_type_from_str() {
        assert_eq!("CLF".parse::<LogType>().unwrap(), LogType::Clf);
        assert!(matches!(
            "proxy".parse::<LogType>(),
            Err(ParseError::UnknownLogType(name)) if name == "proxy"
        ));
    }

    #[test]
    fn test_json_value_conversion() {
        assert_eq!(Value::from(serde_json::json!(42)), Value::Int(42));
        assert_eq!(Value::from(serde_json::json!(1.5)), Value::Float(1.5));
        assert_eq!(Value::from(serde_json::json!(null)), Value::Null);
        assert_eq!(
            Value::from(serde_json::json!({"k": [1, 2]})),
            Value::Str(r#"{"k":[1,2]}"#.to_string())
        );
    }

    #[test]
    fn test_record_serializes_as_map() {
        let record: Record = [("host", Value::from("h1")), ("bytes", Value::Int(10))]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"host":"h1","bytes":10}"#);
    }
}
