//! Central grammar table
//!
//! Every built-in [`LogType`] maps to exactly one parser here. The match is
//! exhaustive, so adding a variant to `LogType` fails to compile until its
//! parser is wired in.
//!
//! To add a new grammar:
//! 1. Create the parser file (e.g., `w3c_parser.rs`) implementing `FormatParser`
//! 2. Export it in lib.rs
//! 3. Add the `LogType` variant and its arm in `parser_for()` below

use crate::base_parser::FormatParser;
use crate::{
    ClfParser, CsvParser, ElfParser, FixedFieldParser, JsonParser, LogType, SyslogParser,
    XmlParser,
};
use tracing::info;

/// The parser for one built-in grammar.
pub fn parser_for(log_type: LogType) -> Box<dyn FormatParser> {
    match log_type {
        LogType::Browsing
        | LogType::Virus
        | LogType::Mail
        | LogType::Firewall
        | LogType::Auth
        | LogType::System
        | LogType::Application
        | LogType::Ids
        | LogType::Vpn => Box::new(FixedFieldParser::new(log_type)),
        LogType::Syslog => Box::new(SyslogParser),
        LogType::Clf => Box::new(ClfParser),
        LogType::Elf => Box::new(ElfParser),
        LogType::Json => Box::new(JsonParser),
        LogType::Xml => Box::new(XmlParser),
        LogType::Csv => Box::new(CsvParser),
    }
}

/// One parser per built-in grammar, in [`LogType::ALL`] order.
pub fn all_parsers() -> Vec<(LogType, Box<dyn FormatParser>)> {
    info!("Initializing parser collection");

    LogType::ALL
        .iter()
        .map(|&log_type| (log_type, parser_for(log_type)))
        .collect()
}
