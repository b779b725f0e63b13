use crate::base_parser::FormatParser;
use crate::config::LogTypeSpec;
use crate::{ParsedTable, Record, Value};
use tracing::debug;

/// JSON parser - one object per line
/// Example: {"timestamp": "...", "level": "info", "msg": "..."}
///
/// Lines that are not a JSON object are skipped. Records keep whatever keys
/// their object had, so the table's columns are the union over all lines.
pub struct JsonParser;

impl FormatParser for JsonParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, lines: &[String], _spec: &LogTypeSpec) -> ParsedTable {
        let mut table = ParsedTable::new();
        let mut skipped = 0usize;

        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<serde_json::Value>(line) {
                Ok(serde_json::Value::Object(object)) => {
                    let record: Record = object
                        .into_iter()
                        .map(|(key, value)| (key, Value::from(value)))
                        .collect();
                    table.push(record);
                }
                Ok(_) | Err(_) => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!("JSON parsing skipped {} lines that were not objects", skipped);
        }
        table
    }
}
