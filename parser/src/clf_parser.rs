//! Common Log Format (Apache/NCSA access logs).

use regex::Regex;
use std::sync::LazyLock;

use crate::base_parser::FormatParser;
use crate::config::LogTypeSpec;
use crate::{ParsedTable, Record};

// host ident authuser [date] "request" status bytes
static CLF_RECORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(\S+) (\S+) (\S+) \[([^\]]+)\] "([^"]*)" (\d+) (\d+)$"#).unwrap()
});

/// Stricter shape used for detection only: the request must have three parts
/// and the date must look like `10/Oct/2023:13:55:36 -0700`.
pub(crate) static CLF_SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\S+ \S+ \S+ \[\d+/\w+/\d+:\d+:\d+:\d+ [+-]\d+\] "\S+ \S+ \S+" \d+ \d+$"#)
        .unwrap()
});

pub struct ClfParser;

impl FormatParser for ClfParser {
    fn name(&self) -> &'static str {
        "clf"
    }

    fn parse(&self, lines: &[String], _spec: &LogTypeSpec) -> ParsedTable {
        lines
            .iter()
            .filter_map(|line| parse_line(line.trim()))
            .collect()
    }
}

fn parse_line(line: &str) -> Option<Record> {
    let caps = CLF_RECORD.captures(line)?;

    let mut request = caps[5].split_whitespace();
    let method = request.next().unwrap_or("");
    let path = request.next().unwrap_or("");
    let protocol = request.next().unwrap_or("");

    let mut record = Record::with_capacity(10);
    record.insert("host", &caps[1]);
    record.insert("ident", &caps[2]);
    record.insert("authuser", &caps[3]);
    record.insert("timestamp", &caps[4]);
    record.insert("method", method);
    record.insert("path", path);
    record.insert("protocol", protocol);
    record.insert("status", &caps[6]);
    record.insert("bytes_sent", &caps[7]);
    // same name as the browsing grammar's column
    record.insert("url", path);
    Some(record)
}
