//! XML records, one element per line.
//!
//! Each child element of the line's outer element becomes a column named by
//! its local tag name. Text of deeper descendants is concatenated into the
//! child's value; a child with no text gives `Null`.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::base_parser::FormatParser;
use crate::config::LogTypeSpec;
use crate::{ParsedTable, Record, Value};

pub struct XmlParser;

impl FormatParser for XmlParser {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn parse(&self, lines: &[String], _spec: &LogTypeSpec) -> ParsedTable {
        lines
            .iter()
            .filter_map(|line| parse_element(line.trim()))
            .collect()
    }
}

fn parse_element(line: &str) -> Option<Record> {
    if !line.starts_with('<') {
        return None;
    }

    let mut reader = Reader::from_str(line);
    reader.config_mut().trim_text(true);

    let mut record = Record::new();
    let mut depth = 0usize;
    let mut child: Option<(String, String)> = None;

    loop {
        match reader.read_event().ok()? {
            Event::Start(e) => {
                depth += 1;
                if depth == 2 {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    child = Some((name, String::new()));
                }
            }
            Event::Empty(e) => {
                if depth == 1 {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    record.insert(name, Value::Null);
                }
            }
            Event::Text(t) => {
                if let Some((_, text)) = child.as_mut() {
                    text.push_str(&t.unescape().ok()?);
                }
            }
            Event::CData(c) => {
                if let Some((_, text)) = child.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                if depth == 2 {
                    if let Some((name, text)) = child.take() {
                        let value = if text.is_empty() {
                            Value::Null
                        } else {
                            Value::Str(text)
                        };
                        record.insert(name, value);
                    }
                }
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    break;
                }
            }
            Event::Eof => return None,
            _ => {}
        }
    }

    (!record.is_empty()).then_some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogTypeRegistry;

    fn parse(raw: &[&str]) -> ParsedTable {
        let registry = LogTypeRegistry::builtin();
        let lines: Vec<String> = raw.iter().map(|l| l.to_string()).collect();
        XmlParser.parse(&lines, registry.get("xml").unwrap())
    }

    #[test]
    fn test_children_become_columns() {
        let table = parse(&[
            "<event> <timestamp>2024-01-01 00:00:00</timestamp> <user>alice</user> <note/> </event>",
        ]);

        assert_eq!(table.len(), 1);
        let record = &table.records()[0];
        assert_eq!(record.get_str("timestamp"), Some("2024-01-01 00:00:00"));
        assert_eq!(record.get_str("user"), Some("alice"));
        assert_eq!(record.get("note"), Some(&Value::Null));
    }

    #[test]
    fn test_nested_text_and_entities() {
        let table = parse(&[
            "<e><msg>a &amp; b</msg><who><first>Jo</first><last>Do</last></who><empty></empty></e>",
        ]);
        let record = &table.records()[0];

        assert_eq!(record.get_str("msg"), Some("a & b"));
        assert_eq!(record.get_str("who"), Some("JoDo"));
        assert_eq!(record.get("empty"), Some(&Value::Null));
    }

    #[test]
    fn test_malformed_and_childless_lines_are_skipped() {
        let table = parse(&[
            "<event><user>alice</user>",
            "plain text",
            "<event>no children</event>",
            "<event/>",
            "<event><user>bob</user></event>",
        ]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.records()[0].get_str("user"), Some("bob"));
    }
}
