//! Turn a classified source into decoded text lines.
//!
//! Decoding is lenient everywhere: invalid UTF-8 is replaced, a container that
//! fails to decode is re-read as plain text, and an unreadable source yields no
//! lines. Problems are reported as [`EngineWarning`]s, never as errors.
//! Line terminators (`\n`, `\r\n`) are always stripped.

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Read};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::container::{Container, ContainerKind, DocumentHint, RawSource};
use crate::types::EngineWarning;

#[derive(Debug, thiserror::Error)]
enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive has no file members")]
    EmptyArchive,
    #[error("malformed XML document: {0}")]
    Xml(String),
}

/// Decoded lines plus anything that went wrong on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub lines: Vec<String>,
    pub warnings: Vec<EngineWarning>,
}

pub fn decode(source: &RawSource, container: &Container) -> Decoded {
    let mut warnings = Vec::new();

    let bytes = match read_container(source, container.kind) {
        Ok(bytes) => bytes,
        Err(e) if is_compressed(container.kind) => {
            warn!(
                "Failed to decode {} container of {}: {}, falling back to plain text",
                container.kind,
                source.name(),
                e
            );
            warnings.push(EngineWarning::ContainerFallback {
                container: container.kind.to_string(),
                reason: e.to_string(),
            });
            match source.read_all() {
                Ok(bytes) => bytes.into_owned(),
                Err(e) => return unreadable(source, e.to_string(), warnings),
            }
        }
        Err(e) => return unreadable(source, e.to_string(), warnings),
    };

    let text = String::from_utf8_lossy(&bytes);
    let lines = match container.document {
        Some(DocumentHint::Json) => split_json_document(&text).unwrap_or_else(|| {
            debug!("Not a single JSON document, reading as JSON lines");
            split_lines(&text)
        }),
        Some(DocumentHint::Xml) => match split_xml_document(&text) {
            Ok(Some(lines)) => lines,
            Ok(None) => {
                debug!("Not a single-rooted XML document, reading one element per line");
                split_lines(&text)
            }
            Err(e) => {
                warn!("Failed to read XML document {}: {}", source.name(), e);
                warnings.push(EngineWarning::ContainerFallback {
                    container: "xml".to_string(),
                    reason: e.to_string(),
                });
                split_lines(&text)
            }
        },
        Some(DocumentHint::Csv) | None => split_lines(&text),
    };

    debug!("Decoded {} lines from {}", lines.len(), source.name());
    Decoded { lines, warnings }
}

fn is_compressed(kind: ContainerKind) -> bool {
    matches!(kind, ContainerKind::Gzip | ContainerKind::Bz2 | ContainerKind::Zip)
}

fn unreadable(source: &RawSource, reason: String, mut warnings: Vec<EngineWarning>) -> Decoded {
    warn!("Could not read {}: {}", source.name(), reason);
    warnings.push(EngineWarning::Unreadable { reason });
    Decoded {
        lines: Vec::new(),
        warnings,
    }
}

fn read_container(source: &RawSource, kind: ContainerKind) -> Result<Vec<u8>, DecodeError> {
    let mut bytes = Vec::new();
    match kind {
        ContainerKind::Gzip => {
            MultiGzDecoder::new(source.open()?).read_to_end(&mut bytes)?;
        }
        ContainerKind::Bz2 => {
            MultiBzDecoder::new(source.open()?).read_to_end(&mut bytes)?;
        }
        ContainerKind::Zip => {
            let raw = source.read_all()?;
            let mut archive = ZipArchive::new(Cursor::new(raw.as_ref()))?;
            // first member by name, directories excluded
            let first = archive
                .file_names()
                .filter(|name| !name.ends_with('/'))
                .min()
                .map(str::to_string)
                .ok_or(DecodeError::EmptyArchive)?;
            debug!("Reading zip member '{}'", first);
            archive.by_name(&first)?.read_to_end(&mut bytes)?;
        }
        ContainerKind::Binary | ContainerKind::Plain => {
            bytes = source.read_all()?.into_owned();
        }
    }
    Ok(bytes)
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

/// A whole-file JSON value: arrays give one line per element.
fn split_json_document(text: &str) -> Option<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    Some(match value {
        serde_json::Value::Array(items) => items.iter().map(|item| item.to_string()).collect(),
        other => vec![other.to_string()],
    })
}

/// One line per element directly under the document root.
///
/// `None` when the text is not a single-rooted document (several top-level
/// elements or text outside the root), which is read line by line instead.
fn split_xml_document(text: &str) -> Result<Option<Vec<String>>, DecodeError> {
    let mut reader = Reader::from_str(text);
    let mut lines = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut roots = 0usize;

    loop {
        let position = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(_)) => {
                if depth == 0 {
                    roots += 1;
                    if roots > 1 {
                        return Ok(None);
                    }
                }
                if depth == 1 {
                    start = position;
                }
                depth += 1;
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    let end = reader.buffer_position() as usize;
                    if let Some(element) = text.get(start..end) {
                        lines.push(fold_whitespace(element));
                    }
                }
            }
            Ok(Event::Empty(_)) if depth == 1 => {
                let end = reader.buffer_position() as usize;
                if let Some(element) = text.get(position..end) {
                    lines.push(fold_whitespace(element));
                }
            }
            Ok(Event::Empty(_)) if depth == 0 => {
                roots += 1;
                if roots > 1 {
                    return Ok(None);
                }
            }
            Ok(Event::Text(content)) if depth == 0 => {
                if !content.iter().all(u8::is_ascii_whitespace) {
                    return Ok(None);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(DecodeError::Xml(e.to_string())),
        }
    }

    if depth != 0 {
        return Err(DecodeError::Xml("unclosed element at end of document".to_string()));
    }
    Ok(Some(lines))
}

fn fold_whitespace(element: &str) -> String {
    element
        .lines()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
