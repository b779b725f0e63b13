//! BSD-style syslog lines: `Mon DD HH:MM:SS host process[pid]: message`.

use regex::Regex;
use std::sync::LazyLock;

use crate::base_parser::FormatParser;
use crate::config::LogTypeSpec;
use crate::{ParsedTable, Record};

pub(crate) static SYSLOG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w{3} [ 0-9]\d \d{2}:\d{2}:\d{2}) (\S+) (\S+)(?:\[(\d+)\])?: (.*)$").unwrap()
});

// the greedy process group can swallow "[pid]"; split it back out
static PROCESS_PID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)\[(\d+)\]$").unwrap());

pub struct SyslogParser;

impl FormatParser for SyslogParser {
    fn name(&self) -> &'static str {
        "syslog"
    }

    fn parse(&self, lines: &[String], _spec: &LogTypeSpec) -> ParsedTable {
        lines
            .iter()
            .filter_map(|line| parse_line(line.trim()))
            .collect()
    }
}

fn parse_line(line: &str) -> Option<Record> {
    let caps = SYSLOG_LINE.captures(line)?;
    let mut process = caps.get(3)?.as_str();
    let mut pid = caps.get(4).map_or("", |m| m.as_str());

    if pid.is_empty() {
        if let Some(split) = PROCESS_PID.captures(process) {
            if let (Some(name), Some(id)) = (split.get(1), split.get(2)) {
                process = name.as_str();
                pid = id.as_str();
            }
        }
    }

    let mut record = Record::with_capacity(5);
    record.insert("timestamp", &caps[1]);
    record.insert("hostname", &caps[2]);
    record.insert("process", process);
    record.insert("pid", pid);
    record.insert("message", &caps[5]);
    Some(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogTypeRegistry;

    fn parse(raw: &[&str]) -> ParsedTable {
        let registry = LogTypeRegistry::builtin();
        let lines: Vec<String> = raw.iter().map(|l| l.to_string()).collect();
        SyslogParser.parse(&lines, registry.get("syslog").unwrap())
    }

    #[test]
    fn test_parse_with_pid() {
        let table = parse(&["Oct 11 22:14:15 mymachine sshd[4721]: Accepted password for alice"]);
        let record = &table.records()[0];

        assert_eq!(record.get_str("timestamp"), Some("Oct 11 22:14:15"));
        assert_eq!(record.get_str("hostname"), Some("mymachine"));
        assert_eq!(record.get_str("process"), Some("sshd"));
        assert_eq!(record.get_str("pid"), Some("4721"));
        assert_eq!(record.get_str("message"), Some("Accepted password for alice"));
    }

    #[test]
    fn test_parse_without_pid_and_padded_day() {
        let table = parse(&["Jan  5 01:02:03 host1 kernel: eth0: link up"]);
        let record = &table.records()[0];

        assert_eq!(record.get_str("timestamp"), Some("Jan  5 01:02:03"));
        assert_eq!(record.get_str("process"), Some("kernel"));
        assert_eq!(record.get_str("pid"), Some(""));
        assert_eq!(record.get_str("message"), Some("eth0: link up"));
    }

    #[test]
    fn test_non_matching_lines_are_skipped() {
        let table = parse(&[
            "not syslog at all",
            "<134>Jan 15 12:00:01 edge1 myapp: prefixed priority",
            "Feb 29 23:59:59 h cron[1]: ok",
        ]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.records()[0].get_str("process"), Some("cron"));
    }
}
