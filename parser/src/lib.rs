// Log format detection and parsing engine
// Pipeline: container sniffing -> decoding -> type resolution -> grammar -> normalizer

pub mod types;
pub mod config;
pub mod container;
pub mod decoder;
pub mod classifier;
pub mod normalizer;
pub mod base_parser;
pub mod parsers;
pub mod registry_parser;
pub mod engine;

// Individual grammar implementations
pub mod fixed_parser;
pub mod syslog_parser;
pub mod clf_parser;
pub mod elf_parser;
pub mod json_parser;
pub mod xml_parser;
pub mod csv_parser;
pub mod generic_parser;

// Re-export main types
pub use types::*;
pub use config::{ConfigError, LogTypeRegistry, LogTypeSpec, DEFAULT_LOG_TYPE};
pub use container::{sniff, Container, ContainerKind, DocumentHint, RawSource};
pub use decoder::{decode, Decoded};
pub use classifier::{classify_content, SAMPLE_SIZE};
pub use normalizer::{normalize, status_class};
pub use base_parser::FormatParser;
pub use registry_parser::ParserRegistry;
pub use engine::LogEngine;

// Re-export parsers
pub use fixed_parser::FixedFieldParser;
pub use syslog_parser::SyslogParser;
pub use clf_parser::ClfParser;
pub use elf_parser::ElfParser;
pub use json_parser::JsonParser;
pub use xml_parser::XmlParser;
pub use csv_parser::CsvParser;
pub use generic_parser::GenericParser;
