//! Content-based log type detection.
//!
//! Structured grammars are recognised from the first sampled line only. Free
//! text falls through to keyword rules evaluated line by line, rules in
//! priority order inside each line; the first hit decides.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;
use tracing::debug;

use crate::clf_parser::CLF_SIGNATURE;
use crate::LogType;

pub const SAMPLE_SIZE: usize = 10;

const ELF_DIRECTIVE: &str = "#Fields:";

// prefix only: the message part is not required to detect syslog
static SYSLOG_SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w{3} [ 0-9]\d \d{2}:\d{2}:\d{2} \S+ \S+(\[\d+\])?:").unwrap()
});

static URL_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://|www\.|\.(com|org|net|edu|gov)").unwrap());

static HTTP_STATUS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[1-5][0-9]{2}\b").unwrap());

struct KeywordRule {
    log_type: LogType,
    pattern: Regex,
}

fn keyword_rule(log_type: LogType, pattern: &str) -> KeywordRule {
    let pattern = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap();
    KeywordRule { log_type, pattern }
}

// checked after the browsing URL + status pair
static KEYWORD_RULES: LazyLock<Vec<KeywordRule>> = LazyLock::new(|| {
    vec![
        keyword_rule(LogType::Virus, r"virus|malware|trojan|infected|quarantine"),
        keyword_rule(LogType::Mail, r"@|sender|recipient|subject|spam|mail"),
        keyword_rule(
            LogType::Firewall,
            r"firewall|allow|deny|block|accept|drop|src|dst|port",
        ),
        keyword_rule(
            LogType::Auth,
            r"login|logout|auth|failed|success|user|password|session",
        ),
        keyword_rule(
            LogType::System,
            r"system|kernel|daemon|cron|service|start|stop|restart",
        ),
        keyword_rule(
            LogType::Application,
            r"error|warning|info|debug|trace|exception|stack",
        ),
        keyword_rule(
            LogType::Ids,
            r"intrusion|detection|prevention|alert|signature|attack",
        ),
        keyword_rule(LogType::Vpn, r"vpn|tunnel|connect|disconnect|remote|client"),
    ]
});

/// The first [`SAMPLE_SIZE`] non-blank lines.
pub fn sample(lines: &[String]) -> Vec<&str> {
    lines
        .iter()
        .map(String::as_str)
        .filter(|line| !line.trim().is_empty())
        .take(SAMPLE_SIZE)
        .collect()
}

/// Detect a grammar from sampled lines. `None` when nothing matched.
pub fn classify_content(sample: &[&str]) -> Option<LogType> {
    let first = sample.first()?.trim();

    if let Some(structured) = classify_structured(first) {
        debug!("First sample line matches the {} signature", structured);
        return Some(structured);
    }

    let detected = sample.iter().find_map(|line| classify_keywords(line));
    if let Some(log_type) = detected {
        debug!("Keyword rules matched {}", log_type);
    }
    detected
}

fn classify_structured(first: &str) -> Option<LogType> {
    if (first.starts_with('{') || first.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(first).is_ok()
    {
        return Some(LogType::Json);
    }
    if CLF_SIGNATURE.is_match(first) {
        return Some(LogType::Clf);
    }
    if first.starts_with(ELF_DIRECTIVE) {
        return Some(LogType::Elf);
    }
    if SYSLOG_SIGNATURE.is_match(first) {
        return Some(LogType::Syslog);
    }
    None
}

fn classify_keywords(line: &str) -> Option<LogType> {
    if URL_HINT.is_match(line) && HTTP_STATUS.is_match(line) {
        return Some(LogType::Browsing);
    }
    KEYWORD_RULES
        .iter()
        .find(|rule| rule.pattern.is_match(line))
        .map(|rule| rule.log_type)
}
