//! W3C Extended Log Format: column names come from `#Fields:` directives.

use crate::base_parser::FormatParser;
use crate::config::LogTypeSpec;
use crate::{ParsedTable, Record, Value};

const FIELDS_DIRECTIVE: &str = "#Fields:";

/// Data lines are whitespace-split and zipped against the most recent
/// `#Fields:` directive. Extra tokens are appended to the last field with a
/// space. Lines before the first directive and other `#` directives are ignored.
pub struct ElfParser;

impl FormatParser for ElfParser {
    fn name(&self) -> &'static str {
        "elf"
    }

    fn parse(&self, lines: &[String], _spec: &LogTypeSpec) -> ParsedTable {
        let mut table = ParsedTable::new();
        let mut fields: Vec<String> = Vec::new();

        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('#') {
                if let Some(directive) = line.strip_prefix(FIELDS_DIRECTIVE) {
                    fields = directive.split_whitespace().map(str::to_string).collect();
                }
                continue;
            }

            let Some(last) = fields.last() else {
                continue;
            };

            let mut record = Record::with_capacity(fields.len() + 1);
            for (i, part) in line.split_whitespace().enumerate() {
                match fields.get(i) {
                    Some(field) => record.insert(field.as_str(), part),
                    None => {
                        let folded = match record.get(last) {
                            Some(Value::Str(previous)) => format!("{} {}", previous, part),
                            _ => format!(" {}", part),
                        };
                        record.insert(last.as_str(), folded);
                    }
                }
            }

            if let Some(stem) = record.get("cs-uri-stem").cloned() {
                record.insert("url", stem);
            }
            table.push(record);
        }

        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogTypeRegistry;

    fn parse(raw: &[&str]) -> ParsedTable {
        let registry = LogTypeRegistry::builtin();
        let lines: Vec<String> = raw.iter().map(|l| l.to_string()).collect();
        ElfParser.parse(&lines, registry.get("elf").unwrap())
    }

    #[test]
    fn test_fields_directive_names_columns() {
        let table = parse(&[
            "#Software: Microsoft Internet Information Services 10.0",
            "#Version: 1.0",
            "#Fields: date time c-ip cs-method cs-uri-stem sc-status",
            "2024-01-01 00:00:01 10.0.0.5 GET /default.htm 200",
        ]);

        assert_eq!(table.len(), 1);
        let record = &table.records()[0];
        assert_eq!(record.get_str("date"), Some("2024-01-01"));
        assert_eq!(record.get_str("c-ip"), Some("10.0.0.5"));
        assert_eq!(record.get_str("sc-status"), Some("200"));
        assert_eq!(record.get_str("url"), Some("/default.htm"));
    }

    #[test]
    fn test_overflow_appends_to_last_field() {
        let table = parse(&["#Fields: date time cs(User-Agent)", "2024-01-01 10:00:00 Mozilla/5.0 (X11; Linux)"]);
        assert_eq!(
            table.records()[0].get_str("cs(User-Agent)"),
            Some("Mozilla/5.0 (X11; Linux)")
        );
    }

    #[test]
    fn test_lines_before_directive_are_skipped() {
        let table = parse(&["2024-01-01 00:00:01 orphan", "#Fields: a b", "1 2", "", "3"]);

        assert_eq!(table.len(), 2);
        assert!(!table.records()[0].contains("url"));
        assert_eq!(table.records()[1].get_str("a"), Some("3"));
        assert!(!table.records()[1].contains("b"));
    }

    #[test]
    fn test_later_directive_replaces_fields() {
        let table = parse(&["#Fields: a b", "1 2", "#Fields: x", "9"]);
        assert_eq!(table.records()[1].get_str("x"), Some("9"));
        assert_eq!(table.columns(), &["a".to_string(), "b".to_string(), "x".to_string()]);
    }
}
