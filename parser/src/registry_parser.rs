use crate::base_parser::FormatParser;
use crate::config::LogTypeSpec;
use crate::generic_parser::GenericParser;
use crate::parsers::all_parsers;
use crate::LogType;
use std::collections::HashMap;
use tracing::{debug, info};

/// ParserRegistry - dispatch table from grammar to parser
///
/// Built once; lookups never allocate. Specs that do not name a built-in
/// grammar (custom registry entries) resolve to the generic
/// separator-split parser.
///
/// ## Adding a New Parser
///
/// Only `parsers.rs` needs to change. See there for instructions.
pub struct ParserRegistry {
    parsers: HashMap<LogType, Box<dyn FormatParser>>,
    generic: GenericParser,
}

impl ParserRegistry {
    /// Create a new registry with all parsers from the central table
    pub fn new() -> Self {
        info!("Initializing ParserRegistry");
        let parsers: HashMap<_, _> = all_parsers().into_iter().collect();

        info!(
            "Registered {} parsers: {}",
            parsers.len(),
            LogType::ALL
                .iter()
                .map(LogType::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );

        Self {
            parsers,
            generic: GenericParser,
        }
    }

    /// Get parser for a built-in grammar
    pub fn get_parser(&self, log_type: LogType) -> &dyn FormatParser {
        match self.parsers.get(&log_type) {
            Some(parser) => parser.as_ref(),
            None => &self.generic,
        }
    }

    /// Get parser for a registry entry
    pub fn parser_for_spec(&self, spec: &LogTypeSpec) -> &dyn FormatParser {
        let parser = match spec.log_type() {
            Some(log_type) => self.get_parser(log_type),
            None => &self.generic,
        };
        debug!("Selected parser '{}' for log type '{}'", parser.name(), spec.name);
        parser
    }

    /// Parse a batch of lines with the grammar the spec selects
    pub fn parse(&self, lines: &[String], spec: &LogTypeSpec) -> crate::ParsedTable {
        self.parser_for_spec(spec).parse(lines, spec)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
