use crate::base_parser::FormatParser;
use crate::config::LogTypeSpec;
use crate::{ParsedTable, Record, Value};

/// Terminal fallback for registry entries without a dedicated grammar.
///
/// Splits each line on the spec's separator (whitespace runs when the
/// separator is empty). Tokens past the last column are appended to it with a
/// single space; short lines keep the columns they have.
pub struct GenericParser;

impl FormatParser for GenericParser {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn parse(&self, lines: &[String], spec: &LogTypeSpec) -> ParsedTable {
        let columns = &spec.columns;
        let mut table = ParsedTable::new();
        let Some(last) = columns.last() else {
            return table;
        };

        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let tokens: Vec<&str> = if spec.separator.is_empty() {
                line.split_whitespace().collect()
            } else {
                line.split(spec.separator.as_str()).collect()
            };

            let mut record = Record::with_capacity(columns.len());
            for (i, token) in tokens.into_iter().enumerate() {
                match columns.get(i) {
                    Some(column) => record.insert(column.as_str(), token),
                    None => {
                        let folded = match record.get(last) {
                            Some(Value::Str(previous)) => format!("{} {}", previous, token),
                            _ => format!(" {}", token),
                        };
                        record.insert(last.as_str(), folded);
                    }
                }
            }

            if !record.is_empty() {
                table.push(record);
            }
        }

        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(separator: &str) -> LogTypeSpec {
        LogTypeSpec::new(
            "proxy",
            &["timestamp", "client", "message"],
            "%Y-%m-%d %H:%M:%S",
            separator,
            "test",
        )
    }

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_overflow_joins_with_space() {
        let table = GenericParser.parse(&lines(&["t1|c1|hello|world|again"]), &spec("|"));
        assert_eq!(table.records()[0].get_str("message"), Some("hello world again"));
    }

    #[test]
    fn test_short_rows_are_kept_partial() {
        let table = GenericParser.parse(&lines(&["t1|c1", "", "  "]), &spec("|"));
        assert_eq!(table.len(), 1);
        let record = &table.records()[0];
        assert_eq!(record.get_str("client"), Some("c1"));
        assert!(!record.contains("message"));
    }

    #[test]
    fn test_literal_separator_keeps_empty_tokens() {
        let table = GenericParser.parse(&lines(&["a  b c"]), &spec(" "));
        let record = &table.records()[0];
        assert_eq!(record.get_str("timestamp"), Some("a"));
        assert_eq!(record.get_str("client"), Some(""));
        assert_eq!(record.get_str("message"), Some("b c"));
    }

    #[test]
    fn test_empty_separator_splits_whitespace_runs() {
        let table = GenericParser.parse(&lines(&["a   b\tc d"]), &spec(""));
        assert_eq!(table.records()[0].get_str("message"), Some("c d"));
    }
}
