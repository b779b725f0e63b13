use crate::base_parser::{split_fields, FormatParser};
use crate::config::LogTypeSpec;
use crate::{LogType, ParsedTable, Record};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

// "2024-01-01 00:00:00 rest..." keeps date and time together as one timestamp
static LEADING_DATETIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)?)\s+(.*)$").unwrap()
});

/// Positional whitespace grammar shared by browsing, virus, mail, firewall,
/// auth, system, application, ids and vpn logs.
///
/// Every line is split into exactly `columns.len()` tokens, the last column
/// absorbing the rest of the line. Lines with fewer tokens are dropped.
/// When the first column is `timestamp` and the line opens with a
/// `YYYY-MM-DD HH:MM:SS` datetime, both halves form that one field, unless
/// that leaves the line short, in which case plain splitting applies.
pub struct FixedFieldParser {
    log_type: LogType,
}

impl FixedFieldParser {
    pub fn new(log_type: LogType) -> Self {
        Self { log_type }
    }
}

impl FormatParser for FixedFieldParser {
    fn name(&self) -> &'static str {
        self.log_type.as_str()
    }

    fn parse(&self, lines: &[String], spec: &LogTypeSpec) -> ParsedTable {
        let width = spec.columns.len();
        let mut table = ParsedTable::new();
        if width == 0 {
            return table;
        }

        let mut dropped = 0usize;
        for line in lines {
            let tokens = tokenize(line, &spec.columns);
            if tokens.len() < width {
                if !line.trim().is_empty() {
                    dropped += 1;
                }
                continue;
            }

            let mut record = Record::with_capacity(width);
            for (column, token) in spec.columns.iter().zip(tokens) {
                record.insert(column.as_str(), token);
            }
            table.push(record);
        }

        if dropped > 0 {
            debug!(
                "{} parser dropped {} lines with fewer than {} fields",
                self.name(),
                dropped,
                width
            );
        }
        table
    }
}

fn tokenize<'a>(line: &'a str, columns: &[String]) -> Vec<&'a str> {
    let width = columns.len();
    if width > 1 && columns[0] == "timestamp" {
        if let Some(caps) = LEADING_DATETIME.captures(line) {
            if let (Some(timestamp), Some(rest)) = (caps.get(1), caps.get(2)) {
                let mut tokens = Vec::with_capacity(width);
                tokens.push(timestamp.as_str());
                tokens.extend(split_fields(rest.as_str(), width - 1));
                if tokens.len() == width {
                    return tokens;
                }
            }
        }
    }
    split_fields(line, width)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogTypeRegistry;

    fn parse(log_type: LogType, lines: &[&str]) -> ParsedTable {
        let registry = LogTypeRegistry::builtin();
        let spec = registry.get(log_type.as_str()).unwrap();
        let lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        FixedFieldParser::new(log_type).parse(&lines, spec)
    }

    #[test]
    fn test_browsing_overflow_folds_into_last_column() {
        let table = parse(
            LogType::Browsing,
            &["2024-01-01 00:00:00 10.0.0.1 alice http://a.com/x?y=1 2048 200 text/html News Mozilla/5 extra tokens here"],
        );

        assert_eq!(table.len(), 1);
        let record = &table.records()[0];
        assert_eq!(record.len(), 9);
        assert_eq!(record.get_str("timestamp"), Some("2024-01-01 00:00:00"));
        assert_eq!(record.get_str("ip_address"), Some("10.0.0.1"));
        assert_eq!(record.get_str("category"), Some("News"));
        assert_eq!(record.get_str("device_info"), Some("Mozilla/5 extra tokens here"));
    }

    #[test]
    fn test_browsing_exact_fields() {
        let table = parse(
            LogType::Browsing,
            &["1704067200 192.168.1.10 bob https://example.com/page 5120 404 text/html Shopping Chrome/120"],
        );

        let record = &table.records()[0];
        assert_eq!(record.get_str("ip_address"), Some("192.168.1.10"));
        assert_eq!(record.get_str("url"), Some("https://example.com/page"));
        assert_eq!(record.get_str("status_code"), Some("404"));
        assert_eq!(record.get_str("device_info"), Some("Chrome/120"));
    }

    #[test]
    fn test_leading_datetime_with_exact_token_count_is_kept() {
        let table = parse(
            LogType::Browsing,
            &["2024-01-01 00:00:00 10.0.0.1 alice http://a.com 2048 200 text/html News"],
        );

        assert_eq!(table.len(), 1);
        let record = &table.records()[0];
        assert_eq!(record.len(), 9);
        assert_eq!(record.get_str("timestamp"), Some("2024-01-01"));
        assert_eq!(record.get_str("device_info"), Some("News"));
    }

    #[test]
    fn test_short_lines_are_dropped_not_padded() {
        let table = parse(LogType::Browsing, &["only three tokens", "", "   "]);
        assert!(table.is_empty());
    }

    #[test]
    fn test_mail_subject_in_middle_is_single_token() {
        let table = parse(
            LogType::Mail,
            &["20240101120000 a@x.com b@y.com Invoice 2048 delivered 1 0.5"],
        );
        let record = &table.records()[0];
        assert_eq!(record.get_str("subject"), Some("Invoice"));
        assert_eq!(record.get_str("spam_score"), Some("0.5"));
    }

    #[test]
    fn test_every_fixed_grammar_keeps_column_count() {
        let registry = LogTypeRegistry::builtin();
        let long_line = (0..20).map(|i| format!("t{}", i)).collect::<Vec<_>>().join(" ");

        for log_type in LogType::ALL.iter().filter(|t| t.is_fixed_field()) {
            let spec = registry.get(log_type.as_str()).unwrap();
            let table = FixedFieldParser::new(*log_type).parse(&[long_line.clone()], spec);
            assert_eq!(table.len(), 1, "{}", log_type);
            assert_eq!(table.records()[0].len(), spec.columns.len(), "{}", log_type);
        }
    }
}
