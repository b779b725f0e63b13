use crate::config::LogTypeSpec;
use crate::ParsedTable;

/// Base trait that every grammar implements
///
/// Parsers are pure: no I/O, no state between calls. A batch of lines can be
/// any sub-range of a file, so callers may feed large inputs in chunks.
pub trait FormatParser: Send + Sync {
    /// Returns the grammar name (e.g., "browsing", "clf", "json")
    fn name(&self) -> &'static str;

    /// Parse a batch of decoded lines. Lines the grammar rejects are skipped.
    fn parse(&self, lines: &[String], spec: &LogTypeSpec) -> ParsedTable;
}

/// Split on runs of whitespace into at most `max_fields` tokens.
///
/// Once `max_fields - 1` tokens are taken, the rest of the line (internal
/// whitespace intact) becomes the final token. Leading and trailing
/// whitespace is ignored.
pub fn split_fields(line: &str, max_fields: usize) -> Vec<&str> {
    let mut fields = Vec::with_capacity(max_fields);
    let mut rest = line.trim();

    while !rest.is_empty() {
        if fields.len() + 1 == max_fields {
            fields.push(rest);
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                fields.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            None => {
                fields.push(rest);
                break;
            }
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_fields_folds_remainder() {
        assert_eq!(
            split_fields("  a b   c  d e ", 3),
            vec!["a", "b", "c  d e"]
        );
    }

    #[test]
    fn test_split_fields_short_line() {
        assert_eq!(split_fields("a\tb", 5), vec!["a", "b"]);
        assert!(split_fields("   ", 5).is_empty());
    }

    #[test]
    fn test_split_fields_single_field_keeps_line() {
        assert_eq!(split_fields(" whole  line ", 1), vec!["whole  line"]);
    }
}
