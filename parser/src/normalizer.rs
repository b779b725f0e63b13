//! Typed scalars and the canonical `datetime` column.

use chrono::format::{parse, Parsed, StrftimeItems};
use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, Utc};
use tracing::debug;

use crate::config::LogTypeSpec;
use crate::{ParsedTable, Record, Value};

/// Columns coerced to numbers for every log type.
pub const NUMERIC_COLUMNS: [&str; 6] = [
    "bandwidth",
    "status_code",
    "size",
    "bytes_sent",
    "spam_score",
    "attachment_count",
];

pub const TIMESTAMP_COLUMN: &str = "timestamp";
pub const DATETIME_COLUMN: &str = "datetime";

const EPOCH_MIN: i64 = 1_000_000_000;
const EPOCH_MAX: i64 = 9_999_999_999;
const FALLBACK_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Coerce numeric columns and derive `datetime` from the raw timestamp.
///
/// Records are never dropped here. Values that cannot be coerced become
/// `Null`, and so does the `datetime` of a record whose timestamp does not
/// parse. Tables without a timestamp source get no `datetime` column.
pub fn normalize(mut table: ParsedTable, spec: &LogTypeSpec) -> ParsedTable {
    let numeric: Vec<&str> = NUMERIC_COLUMNS
        .iter()
        .copied()
        .chain(spec.numeric_columns.iter().map(String::as_str))
        .filter(|column| table.has_column(column))
        .collect();

    let derive_datetime = table.has_column(TIMESTAMP_COLUMN)
        || (table.has_column("date") && table.has_column("time"));
    let current_year = Utc::now().year();

    let mut unparsed = 0usize;
    for record in table.records_mut() {
        for column in &numeric {
            if let Some(value) = record.get_mut(column) {
                *value = coerce_numeric(value);
            }
        }

        if derive_datetime {
            let datetime = raw_timestamp(record)
                .and_then(|raw| parse_timestamp(&raw, &spec.datetime_format, current_year));
            if datetime.is_none() {
                unparsed += 1;
            }
            record.insert(DATETIME_COLUMN, datetime.map_or(Value::Null, Value::DateTime));
        }
    }

    if derive_datetime {
        table.ensure_column(DATETIME_COLUMN);
        if unparsed > 0 {
            debug!(
                "{} of {} timestamps did not parse with '{}'",
                unparsed,
                table.len(),
                spec.datetime_format
            );
        }
    }
    table
}

fn coerce_numeric(value: &Value) -> Value {
    match value {
        Value::Int(_) | Value::Float(_) => value.clone(),
        Value::Bool(b) => Value::Int(i64::from(*b)),
        Value::Str(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Value::Int(i)
            } else {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map_or(Value::Null, Value::Float)
            }
        }
        Value::Null | Value::DateTime(_) => Value::Null,
    }
}

enum RawTimestamp {
    Epoch(i64),
    Text(String),
}

fn raw_timestamp(record: &Record) -> Option<RawTimestamp> {
    match record.get(TIMESTAMP_COLUMN) {
        Some(Value::Int(i)) => Some(RawTimestamp::Epoch(*i)),
        Some(Value::Str(s)) => Some(RawTimestamp::Text(s.trim().to_string())),
        Some(Value::Float(_) | Value::Bool(_) | Value::Null | Value::DateTime(_)) => None,
        None => {
            let date = record.get_str("date")?;
            let time = record.get_str("time")?;
            Some(RawTimestamp::Text(format!("{} {}", date.trim(), time.trim())))
        }
    }
}

fn parse_timestamp(raw: &RawTimestamp, format: &str, current_year: i32) -> Option<DateTime<Utc>> {
    match raw {
        RawTimestamp::Epoch(secs) if (EPOCH_MIN..=EPOCH_MAX).contains(secs) => {
            DateTime::from_timestamp(*secs, 0)
        }
        RawTimestamp::Epoch(other) => parse_text(&other.to_string(), format, current_year),
        RawTimestamp::Text(text) if is_epoch_text(text) => {
            text.parse().ok().and_then(|secs| DateTime::from_timestamp(secs, 0))
        }
        RawTimestamp::Text(text) => parse_text(text, format, current_year),
    }
}

/// Exactly ten ASCII digits.
fn is_epoch_text(text: &str) -> bool {
    text.len() == 10 && text.bytes().all(|b| b.is_ascii_digit())
}

fn parse_text(text: &str, format: &str, current_year: i32) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    parse_with_format(text, format, current_year)
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, FALLBACK_DATETIME_FORMAT)
                .ok()
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

/// strptime-style parse. Missing year takes `current_year`, missing time is
/// midnight, and an offset (`%z`) is folded into UTC.
fn parse_with_format(text: &str, format: &str, current_year: i32) -> Option<DateTime<Utc>> {
    let mut parsed = Parsed::new();
    parse(&mut parsed, text, StrftimeItems::new(format)).ok()?;

    let date = match parsed.to_naive_date() {
        Ok(date) => date,
        Err(_) => {
            parsed.set_year(i64::from(current_year)).ok()?;
            parsed.to_naive_date().ok()?
        }
    };
    let time = parsed.to_naive_time().unwrap_or(NaiveTime::MIN);
    let naive = date.and_time(time);

    match parsed.to_fixed_offset() {
        Ok(offset) => naive
            .and_local_timezone(offset)
            .single()
            .map(|dt| dt.with_timezone(&Utc)),
        Err(_) => Some(naive.and_utc()),
    }
}

/// HTTP status class, e.g. `"404"` becomes `"4xx"`.
///
/// Consumers derive this on demand; the normalizer never adds it.
pub fn status_class(value: &Value) -> Option<String> {
    let code = match value {
        Value::Int(i) => *i,
        Value::Float(f) if f.fract() == 0.0 => *f as i64,
        Value::Str(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (100..=599)
        .contains(&code)
        .then(|| format!("{}xx", code / 100))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogTypeRegistry;
    use chrono::TimeZone;

    fn table(rows: &[&[(&str, &str)]]) -> ParsedTable {
        rows.iter()
            .map(|row| row.iter().map(|(k, v)| (*k, *v)).collect::<Record>())
            .collect()
    }

    fn spec(name: &str) -> LogTypeSpec {
        LogTypeRegistry::builtin().get(name).unwrap().clone()
    }

    fn new_year_2024() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_epoch_and_pattern_agree() {
        let normalized = normalize(
            table(&[&[("timestamp", "1704067200")], &[("timestamp", "20240101000000")]]),
            &spec("virus"),
        );

        let records = normalized.records();
        assert_eq!(records[0].get("datetime"), Some(&Value::DateTime(new_year_2024())));
        assert_eq!(records[1].get("datetime"), Some(&Value::DateTime(new_year_2024())));
    }

    #[test]
    fn test_integer_epoch_from_json() {
        let mut record = Record::new();
        record.insert("timestamp", 1704067200i64);
        let normalized = normalize(std::iter::once(record).collect(), &spec("json"));
        assert_eq!(
            normalized.records()[0].get("datetime"),
            Some(&Value::DateTime(new_year_2024()))
        );
    }

    #[test]
    fn test_clf_offset_converted_to_utc() {
        let normalized = normalize(
            table(&[&[("timestamp", "10/Oct/2023:13:55:36 -0700")]]),
            &spec("clf"),
        );
        assert_eq!(
            normalized.records()[0].get("datetime"),
            Some(&Value::DateTime(Utc.with_ymd_and_hms(2023, 10, 10, 20, 55, 36).unwrap()))
        );
    }

    #[test]
    fn test_syslog_takes_current_year() {
        let normalized = normalize(table(&[&[("timestamp", "Oct 11 22:14:15")]]), &spec("syslog"));
        let datetime = normalized.records()[0]
            .get("datetime")
            .and_then(Value::as_datetime)
            .unwrap();

        assert_eq!(datetime.year(), Utc::now().year());
        assert_eq!((datetime.month(), datetime.day()), (10, 11));
    }

    #[test]
    fn test_fallback_formats() {
        let normalized = normalize(
            table(&[
                &[("timestamp", "2024-01-01 00:00:00")],
                &[("timestamp", "2024-01-01T00:00:00Z")],
            ]),
            &spec("browsing"),
        );
        for record in normalized.records() {
            assert_eq!(record.get("datetime"), Some(&Value::DateTime(new_year_2024())));
        }
    }

    #[test]
    fn test_bad_timestamp_keeps_record() {
        let normalized = normalize(
            table(&[&[("timestamp", "yesterday"), ("status_code", "200")], &[("status_code", "404")]]),
            &spec("browsing"),
        );

        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized.records()[0].get("datetime"), Some(&Value::Null));
        assert_eq!(normalized.records()[1].get("datetime"), Some(&Value::Null));
        assert!(normalized.has_column("datetime"));
    }

    #[test]
    fn test_elf_date_and_time_are_joined() {
        let normalized = normalize(
            table(&[&[("date", "2024-01-01"), ("time", "00:00:00")]]),
            &spec("elf"),
        );
        assert_eq!(
            normalized.records()[0].get("datetime"),
            Some(&Value::DateTime(new_year_2024()))
        );
    }

    #[test]
    fn test_no_timestamp_source_no_datetime_column() {
        let normalized = normalize(table(&[&[("user", "alice")]]), &spec("json"));
        assert!(!normalized.has_column("datetime"));
    }

    #[test]
    fn test_numeric_coercion() {
        let normalized = normalize(
            table(&[&[
                ("bandwidth", "2048"),
                ("status_code", "-"),
                ("spam_score", "4.5"),
                ("username", "42"),
            ]]),
            &spec("browsing"),
        );
        let record = &normalized.records()[0];

        assert_eq!(record.get("bandwidth"), Some(&Value::Int(2048)));
        assert_eq!(record.get("status_code"), Some(&Value::Null));
        assert_eq!(record.get("spam_score"), Some(&Value::Float(4.5)));
        assert_eq!(record.get_str("username"), Some("42"));
    }

    #[test]
    fn test_spec_numeric_columns() {
        let mut spec = spec("browsing");
        spec.numeric_columns = vec!["latency".to_string()];
        let normalized = normalize(table(&[&[("latency", "12"), ("other", "12")]]), &spec);

        assert_eq!(normalized.records()[0].get("latency"), Some(&Value::Int(12)));
        assert_eq!(normalized.records()[0].get_str("other"), Some("12"));
    }

    #[test]
    fn test_status_class() {
        assert_eq!(status_class(&Value::from("404")), Some("4xx".to_string()));
        assert_eq!(status_class(&Value::Int(200)), Some("2xx".to_string()));
        assert_eq!(status_class(&Value::from("abc")), None);
        assert_eq!(status_class(&Value::Int(42)), None);
        assert_eq!(status_class(&Value::Null), None);
    }
}
