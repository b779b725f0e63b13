//! The end-to-end pipeline: sniff, decode, resolve the log type, parse,
//! normalize.

use std::io::Read;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classifier::{classify_content, sample};
use crate::config::{ConfigError, LogTypeRegistry, LogTypeSpec};
use crate::container::{sniff, Container, RawSource};
use crate::decoder::{decode, Decoded};
use crate::normalizer::normalize;
use crate::registry_parser::ParserRegistry;
use crate::{Detection, EngineWarning, ParseError, ParseOutcome, ParsedTable};

/// Stateless apart from its read-only tables; one instance can serve
/// concurrent parses from many threads.
pub struct LogEngine {
    registry: Arc<LogTypeRegistry>,
    parsers: ParserRegistry,
}

impl LogEngine {
    pub fn new(registry: LogTypeRegistry) -> Result<Self, ConfigError> {
        Self::with_shared_registry(Arc::new(registry))
    }

    pub fn with_shared_registry(registry: Arc<LogTypeRegistry>) -> Result<Self, ConfigError> {
        registry.validate()?;
        info!(
            "Log engine ready with {} log types, default '{}'",
            registry.len(),
            registry.default_log_type()
        );
        Ok(Self {
            registry,
            parsers: ParserRegistry::new(),
        })
    }

    /// Engine over the built-in grammars only.
    pub fn builtin() -> Self {
        Self {
            registry: Arc::new(LogTypeRegistry::builtin()),
            parsers: ParserRegistry::new(),
        }
    }

    pub fn registry(&self) -> &LogTypeRegistry {
        &self.registry
    }

    /// Parse one source end to end.
    ///
    /// Only an unknown `declared` type is an error. Unreadable or corrupt
    /// input produces an outcome with warnings and a possibly empty table.
    pub fn parse(
        &self,
        source: &RawSource,
        declared: Option<&str>,
    ) -> Result<ParseOutcome, ParseError> {
        let declared_spec = declared.map(|name| self.lookup(name)).transpose()?;

        let container = sniff(source);
        info!("Parsing {} as {} container", source.name(), container.kind);

        let Decoded { lines, warnings } = decode(source, &container);
        self.finish(lines, warnings, &container, declared_spec)
    }

    /// Parse from any reader, buffering it under `name`.
    ///
    /// A read error keeps whatever bytes arrived before it and is reported
    /// as an `Unreadable` warning.
    pub fn parse_reader<R: Read>(
        &self,
        name: &str,
        mut reader: R,
        declared: Option<&str>,
    ) -> Result<ParseOutcome, ParseError> {
        let mut bytes = Vec::new();
        let read_warning = reader.read_to_end(&mut bytes).err().map(|e| {
            warn!("Reading {} failed after {} bytes: {}", name, bytes.len(), e);
            EngineWarning::Unreadable {
                reason: e.to_string(),
            }
        });

        let mut outcome = self.parse(&RawSource::buffer(name, bytes), declared)?;
        if let Some(warning) = read_warning {
            outcome.warnings.insert(0, warning);
        }
        Ok(outcome)
    }

    /// Parse and normalize an already decoded batch with a named log type.
    ///
    /// Batches of one file may be fed in any split; concatenating the results
    /// keeps input order.
    pub fn parse_lines(&self, lines: &[String], log_type: &str) -> Result<ParsedTable, ParseError> {
        let spec = self.lookup(log_type)?;
        Ok(normalize(self.parsers.parse(lines, spec), spec))
    }

    fn lookup(&self, name: &str) -> Result<&LogTypeSpec, ParseError> {
        self.registry
            .get(name)
            .or_else(|| self.registry.get(&name.trim().to_ascii_lowercase()))
            .ok_or_else(|| ParseError::UnknownLogType(name.to_string()))
    }

    fn finish(
        &self,
        lines: Vec<String>,
        mut warnings: Vec<EngineWarning>,
        container: &Container,
        declared: Option<&LogTypeSpec>,
    ) -> Result<ParseOutcome, ParseError> {
        let (spec, detection) = self.resolve(&lines, container, declared)?;
        info!("Resolved log type '{}' ({:?})", spec.name, detection);

        let raw_line_count = lines.iter().filter(|l| !l.trim().is_empty()).count();
        let table = normalize(self.parsers.parse(&lines, spec), spec);

        if table.is_empty() && raw_line_count > 0 {
            warn!("No records matched the {} grammar in {} lines", spec.name, raw_line_count);
            warnings.push(EngineWarning::NoRecordsMatched {
                log_type: spec.name.clone(),
                lines: raw_line_count,
            });
        }

        info!(
            "Parsed {} records from {} lines ({} skipped)",
            table.len(),
            raw_line_count,
            raw_line_count.saturating_sub(table.len())
        );

        Ok(ParseOutcome {
            table,
            log_type: spec.name.clone(),
            detection,
            container: container.kind,
            raw_line_count,
            warnings,
        })
    }

    /// Declared type, then document hint, then content, then the default.
    fn resolve<'a>(
        &'a self,
        lines: &[String],
        container: &Container,
        declared: Option<&'a LogTypeSpec>,
    ) -> Result<(&'a LogTypeSpec, Detection), ParseError> {
        if let Some(spec) = declared {
            return Ok((spec, Detection::Declared));
        }

        if let Some(hint) = container.document {
            if let Some(spec) = self.registry.get(hint.log_type().as_str()) {
                return Ok((spec, Detection::Document));
            }
        }

        let sampled = sample(lines);
        debug!("Classifying from {} sample lines", sampled.len());
        if let Some(log_type) = classify_content(&sampled) {
            if let Some(spec) = self.registry.get(log_type.as_str()) {
                return Ok((spec, Detection::Content));
            }
        }

        Ok((self.registry.default_spec()?, Detection::Default))
    }
}

impl Default for LogEngine {
    fn default() -> Self {
        Self::builtin()
    }
}
