//! Log type registry.
//!
//! Each entry describes one grammar: its positional columns, field separator,
//! timestamp pattern and description. The built-in table covers every grammar
//! the engine ships with; a TOML file can replace entries or add custom
//! separator-delimited types on top of it. The registry is validated once at
//! construction and never mutated afterwards.

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::LogType;

pub const DEFAULT_LOG_TYPE: &str = "browsing";
const DEFAULT_SEPARATOR: &str = " ";
const DEFAULT_DATETIME_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read registry file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid registry TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("default log type '{0}' is not defined")]
    UnknownDefault(String),
    #[error("log type '{0}' is positional but declares no columns")]
    MissingColumns(String),
    #[error("log type '{log_type}' has an invalid datetime format '{format}'")]
    InvalidDatetimeFormat { log_type: String, format: String },
}

/// One grammar descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogTypeSpec {
    /// Filled from the registry key.
    #[serde(default, skip_deserializing)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default = "default_datetime_format")]
    pub datetime_format: String,
    #[serde(default)]
    pub description: String,
    /// Coerced to numbers in addition to the conventional numeric columns.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub numeric_columns: Vec<String>,
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

fn default_datetime_format() -> String {
    DEFAULT_DATETIME_FORMAT.to_string()
}

impl LogTypeSpec {
    pub fn new(
        name: &str,
        columns: &[&str],
        datetime_format: &str,
        separator: &str,
        description: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            separator: separator.to_string(),
            datetime_format: datetime_format.to_string(),
            description: description.to_string(),
            numeric_columns: Vec::new(),
        }
    }

    /// The built-in grammar this spec selects, `None` for custom types.
    pub fn log_type(&self) -> Option<LogType> {
        self.name.parse().ok()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positional = self.log_type().map_or(true, |t| t.is_fixed_field());
        if positional && self.columns.is_empty() {
            return Err(ConfigError::MissingColumns(self.name.clone()));
        }
        if StrftimeItems::new(&self.datetime_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidDatetimeFormat {
                log_type: self.name.clone(),
                format: self.datetime_format.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    default_log_type: Option<String>,
    #[serde(default)]
    log_types: BTreeMap<String, LogTypeSpec>,
}

/// Read-only table of known grammars, keyed by name.
#[derive(Debug, Clone)]
pub struct LogTypeRegistry {
    specs: BTreeMap<String, LogTypeSpec>,
    default_log_type: String,
}

impl LogTypeRegistry {
    /// Registry containing only the built-in grammars.
    pub fn builtin() -> Self {
        let specs = builtin_specs()
            .into_iter()
            .map(|spec| (spec.name.clone(), spec))
            .collect();
        Self {
            specs,
            default_log_type: DEFAULT_LOG_TYPE.to_string(),
        }
    }

    /// Built-in registry overlaid with the entries of a TOML document.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let file: RegistryFile = toml::from_str(toml_str)?;
        let mut registry = Self::builtin();

        for (name, mut spec) in file.log_types {
            debug!("Registry entry from file: {}", name);
            spec.name = name.clone();
            registry.specs.insert(name, spec);
        }
        if let Some(default) = file.default_log_type {
            registry.default_log_type = default;
        }

        registry.validate()?;
        Ok(registry)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("Loading log type registry from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.specs.contains_key(&self.default_log_type) {
            return Err(ConfigError::UnknownDefault(self.default_log_type.clone()));
        }
        self.specs.values().try_for_each(LogTypeSpec::validate)
    }

    pub fn get(&self, name: &str) -> Option<&LogTypeSpec> {
        self.specs.get(name.trim())
    }

    pub fn default_log_type(&self) -> &str {
        &self.default_log_type
    }

    pub fn default_spec(&self) -> Result<&LogTypeSpec, ConfigError> {
        self.get(&self.default_log_type)
            .ok_or_else(|| ConfigError::UnknownDefault(self.default_log_type.clone()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogTypeSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl Default for LogTypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_specs() -> Vec<LogTypeSpec> {
    vec![
        LogTypeSpec::new(
            "browsing",
            &[
                "timestamp", "ip_address", "username", "url", "bandwidth",
                "status_code", "content_type", "category", "device_info",
            ],
            "%Y%m%d%H%M%S",
            " ",
            "Web browsing logs with URLs and HTTP status codes",
        ),
        LogTypeSpec::new(
            "virus",
            &[
                "timestamp", "ip_address", "username", "virus_name", "file_path",
                "action_taken", "scan_engine", "severity",
            ],
            "%Y%m%d%H%M%S",
            " ",
            "Antivirus detection logs with virus information",
        ),
        LogTypeSpec::new(
            "mail",
            &[
                "timestamp", "sender", "recipient", "subject", "size", "status",
                "attachment_count", "spam_score",
            ],
            "%Y%m%d%H%M%S",
            " ",
            "Email server logs with message details",
        ),
        LogTypeSpec::new(
            "firewall",
            &[
                "timestamp", "action", "protocol", "src_ip", "src_port", "dst_ip",
                "dst_port", "interface", "rule_id", "description",
            ],
            "%Y%m%d%H%M%S",
            " ",
            "Firewall logs with connection information",
        ),
        LogTypeSpec::new(
            "auth",
            &[
                "timestamp", "username", "source_ip", "service", "status",
                "auth_method", "details",
            ],
            "%Y%m%d%H%M%S",
            " ",
            "Authentication logs with login attempts",
        ),
        LogTypeSpec::new(
            "system",
            &["timestamp", "hostname", "service", "pid", "level", "message"],
            "%Y%m%d%H%M%S",
            " ",
            "System logs with service information",
        ),
        LogTypeSpec::new(
            "application",
            &[
                "timestamp", "app_name", "level", "component", "thread_id",
                "request_id", "message",
            ],
            "%Y%m%d%H%M%S",
            " ",
            "Application logs with debug information",
        ),
        LogTypeSpec::new(
            "ids",
            &[
                "timestamp", "alert_id", "severity", "category", "src_ip", "dst_ip",
                "protocol", "signature", "description",
            ],
            "%Y%m%d%H%M%S",
            " ",
            "Intrusion detection system logs",
        ),
        LogTypeSpec::new(
            "vpn",
            &[
                "timestamp", "username", "client_ip", "session_id", "event_type",
                "duration", "bytes_in", "bytes_out",
            ],
            "%Y%m%d%H%M%S",
            " ",
            "VPN connection logs with session details",
        ),
        LogTypeSpec::new(
            "syslog",
            &["timestamp", "hostname", "process", "pid", "message"],
            "%b %d %H:%M:%S",
            " ",
            "Standard syslog format logs",
        ),
        LogTypeSpec::new(
            "clf",
            &[
                "host", "ident", "authuser", "timestamp", "method", "path",
                "protocol", "status", "bytes_sent", "url",
            ],
            "%d/%b/%Y:%H:%M:%S %z",
            " ",
            "Common Log Format (CLF) web server logs",
        ),
        LogTypeSpec::new(
            "elf",
            &[],
            "%Y-%m-%d %H:%M:%S",
            " ",
            "Extended Log Format (ELF) web server logs",
        ),
        LogTypeSpec::new("json", &[], "%Y-%m-%d %H:%M:%S", "", "JSON structured logs"),
        LogTypeSpec::new("xml", &[], "%Y-%m-%d %H:%M:%S", "", "XML structured logs"),
        LogTypeSpec::new("csv", &[], "%Y-%m-%d %H:%M:%S", ",", "CSV structured logs"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_is_valid() {
        let registry = LogTypeRegistry::builtin();
        registry.validate().unwrap();

        assert_eq!(registry.len(), LogType::ALL.len());
        for log_type in LogType::ALL {
            let spec = registry.get(log_type.as_str()).unwrap();
            assert_eq!(spec.log_type(), Some(log_type));
        }
        assert_eq!(registry.default_spec().unwrap().name, "browsing");
    }

    #[test]
    fn test_fixed_field_column_counts() {
        let registry = LogTypeRegistry::builtin();
        let count = |name: &str| registry.get(name).unwrap().columns.len();

        assert_eq!(count("browsing"), 9);
        assert_eq!(count("virus"), 8);
        assert_eq!(count("mail"), 8);
        assert_eq!(count("firewall"), 10);
        assert_eq!(count("auth"), 7);
        assert_eq!(count("system"), 6);
        assert_eq!(count("application"), 7);
        assert_eq!(count("ids"), 9);
        assert_eq!(count("vpn"), 8);
    }

    #[test]
    fn test_toml_overlay_adds_custom_type() {
        let registry = LogTypeRegistry::from_toml_str(
            r#"
            default_log_type = "proxy"

            [log_types.proxy]
            columns = ["timestamp", "client", "url", "status_code"]
            separator = "|"
            datetime_format = "%Y-%m-%d %H:%M:%S"
            description = "Custom proxy log"
            numeric_columns = ["status_code"]
            "#,
        )
        .unwrap();

        let proxy = registry.get("proxy").unwrap();
        assert_eq!(proxy.log_type(), None);
        assert_eq!(proxy.separator, "|");
        assert_eq!(proxy.numeric_columns, vec!["status_code".to_string()]);
        assert_eq!(registry.default_log_type(), "proxy");
        assert!(registry.get("browsing").is_some());
    }

    #[test]
    fn test_unknown_default_is_rejected() {
        let err = LogTypeRegistry::from_toml_str(r#"default_log_type = "nope""#).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDefault(name) if name == "nope"));
    }

    #[test]
    fn test_custom_type_without_columns_is_rejected() {
        let err = LogTypeRegistry::from_toml_str(
            r#"
            [log_types.empty]
            description = "no columns"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingColumns(name) if name == "empty"));
    }

    #[test]
    fn test_invalid_datetime_format_is_rejected() {
        let err = LogTypeRegistry::from_toml_str(
            r#"
            [log_types.browsing]
            columns = ["timestamp", "url"]
            datetime_format = "%Y-%Q"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDatetimeFormat { .. }));
    }
}
