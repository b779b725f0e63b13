use crate::base_parser::FormatParser;
use crate::config::LogTypeSpec;
use crate::{ParsedTable, Record};
use csv::ReaderBuilder;
use tracing::warn;

/// CSV parser - the first record is the header, the rest are data rows
///
/// Short rows leave their trailing columns absent and values past the
/// header are dropped. Quoted fields follow RFC 4180.
pub struct CsvParser;

impl FormatParser for CsvParser {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn parse(&self, lines: &[String], spec: &LogTypeSpec) -> ParsedTable {
        let mut table = ParsedTable::new();
        let delimiter = match spec.separator.as_bytes() {
            [byte] => *byte,
            _ => b',',
        };

        let data = lines.join("\n");
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(data.as_bytes());

        let mut header: Option<Vec<String>> = None;
        for record_result in csv_reader.records() {
            let row = match record_result {
                Ok(row) => row,
                Err(e) => {
                    warn!("Skipping malformed CSV row: {}", e);
                    continue;
                }
            };

            let Some(columns) = header.as_ref() else {
                header = Some(row.iter().map(|h| h.trim().to_string()).collect());
                continue;
            };

            let record: Record = columns
                .iter()
                .zip(row.iter())
                .map(|(column, value)| (column.as_str(), value))
                .collect();
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
    use crate::config::LogTypeRegistry;

    fn parse(data: &str) -> ParsedTable {
        let registry = LogTypeRegistry::builtin();
        let lines: Vec<String> = data.lines().map(str::to_string).collect();
        CsvParser.parse(&lines, registry.get("csv").unwrap())
    }

    #[test]
    fn test_parse_basic_csv() {
        let table = parse(
            "timestamp,src_ip,action,bytes_sent\n\
             2024-01-01 00:00:00,10.0.0.1,allow,512\n\
             2024-01-01 00:00:01,10.0.0.2,\"deny, logged\",0",
        );

        assert_eq!(table.len(), 2);
        assert_eq!(table.records()[0].get_str("src_ip"), Some("10.0.0.1"));
        assert_eq!(table.records()[1].get_str("action"), Some("deny, logged"));
        assert_eq!(table.records()[1].get_str("bytes_sent"), Some("0"));
    }

    #[test]
    fn test_short_and_long_rows() {
        let table = parse("a,b,c\n1,2\n4,5,6,7");

        assert_eq!(table.len(), 2);
        assert!(!table.records()[0].contains("c"));
        assert_eq!(table.records()[1].get_str("c"), Some("6"));
        assert_eq!(table.columns().len(), 3);
    }

    #[test]
    fn test_header_only_is_empty() {
        assert!(parse("a,b,c").is_empty());
        assert!(parse("").is_empty());
    }
}
