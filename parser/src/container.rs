//! Container sniffing: decide how the raw bytes are wrapped before any line is read.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::types::LogType;

/// Bytes inspected for magic signatures and the text/binary check.
pub const HEADER_LEN: usize = 8;

const GZIP_MAGIC: &[u8] = b"\x1f\x8b";
const BZIP2_MAGIC: &[u8] = b"BZh";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Where the bytes come from. Lives for one parse call.
#[derive(Debug, Clone)]
pub enum RawSource {
    Path(PathBuf),
    Buffer { name: String, bytes: Vec<u8> },
}

impl RawSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        RawSource::Path(path.into())
    }

    pub fn buffer(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        RawSource::Buffer {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn name(&self) -> Cow<'_, str> {
        match self {
            RawSource::Path(path) => path.to_string_lossy(),
            RawSource::Buffer { name, .. } => Cow::Borrowed(name),
        }
    }

    /// Lowercased extensions of the name, outermost first (`a.json.gz` gives `["gz", "json"]`).
    fn extensions(&self) -> Vec<String> {
        let name = self.name();
        let mut path = Path::new(name.as_ref());
        let mut extensions = Vec::new();
        while let Some(ext) = path.extension() {
            extensions.push(ext.to_string_lossy().to_ascii_lowercase());
            match path.file_stem() {
                Some(stem) => path = Path::new(stem),
                None => break,
            }
            if extensions.len() == 2 {
                break;
            }
        }
        extensions
    }

    pub fn open(&self) -> io::Result<Box<dyn Read + '_>> {
        match self {
            RawSource::Path(path) => Ok(Box::new(File::open(path)?)),
            RawSource::Buffer { bytes, .. } => Ok(Box::new(Cursor::new(bytes.as_slice()))),
        }
    }

    pub fn read_all(&self) -> io::Result<Cow<'_, [u8]>> {
        match self {
            RawSource::Path(path) => std::fs::read(path).map(Cow::Owned),
            RawSource::Buffer { bytes, .. } => Ok(Cow::Borrowed(bytes)),
        }
    }

    fn header(&self, len: usize) -> io::Result<Vec<u8>> {
        let mut header = Vec::with_capacity(len);
        self.open()?.take(len as u64).read_to_end(&mut header)?;
        Ok(header)
    }
}

/// Outer byte-level envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Plain,
    Gzip,
    Bz2,
    Zip,
    Binary,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Gzip => "gzip",
            Self::Bz2 => "bz2",
            Self::Zip => "zip",
            Self::Binary => "binary",
        }
    }
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured document flagged by the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentHint {
    Json,
    Xml,
    Csv,
}

impl DocumentHint {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "json" => Some(Self::Json),
            "xml" => Some(Self::Xml),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    pub fn log_type(&self) -> LogType {
        match self {
            Self::Json => LogType::Json,
            Self::Xml => LogType::Xml,
            Self::Csv => LogType::Csv,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub kind: ContainerKind,
    pub document: Option<DocumentHint>,
}

impl Container {
    pub fn new(kind: ContainerKind) -> Self {
        Self {
            kind,
            document: None,
        }
    }
}

fn kind_from_extension(ext: &str) -> Option<ContainerKind> {
    match ext {
        "gz" | "gzip" => Some(ContainerKind::Gzip),
        "bz2" | "bzip2" => Some(ContainerKind::Bz2),
        "zip" => Some(ContainerKind::Zip),
        _ => None,
    }
}

/// Classify the container of a source. Never fails: I/O errors degrade to plain.
pub fn sniff(source: &RawSource) -> Container {
    let extensions = source.extensions();

    if let Some(outer) = extensions.first() {
        if let Some(kind) = kind_from_extension(outer) {
            // a.json.gz still carries the document hint of the inner name
            let document = match kind {
                ContainerKind::Gzip | ContainerKind::Bz2 => extensions
                    .get(1)
                    .and_then(|inner| DocumentHint::from_extension(inner)),
                _ => None,
            };
            debug!("Container {} from extension '.{}'", kind, outer);
            return Container { kind, document };
        }
        if let Some(document) = DocumentHint::from_extension(outer) {
            debug!("Structured document {:?} from extension '.{}'", document, outer);
            return Container {
                kind: ContainerKind::Plain,
                document: Some(document),
            };
        }
    }

    match source.header(HEADER_LEN) {
        Ok(header) => Container::new(sniff_bytes(&header)),
        Err(e) => {
            debug!("Could not read header of {}: {}", source.name(), e);
            Container::new(ContainerKind::Plain)
        }
    }
}

/// Classify from leading bytes alone: magic signatures, then the text/binary check.
pub fn sniff_bytes(header: &[u8]) -> ContainerKind {
    if header.starts_with(GZIP_MAGIC) {
        ContainerKind::Gzip
    } else if header.starts_with(BZIP2_MAGIC) {
        ContainerKind::Bz2
    } else if header.starts_with(ZIP_MAGIC) {
        ContainerKind::Zip
    } else if header.iter().take(HEADER_LEN).any(|b| !is_text_byte(*b)) {
        ContainerKind::Binary
    } else {
        ContainerKind::Plain
    }
}

fn is_text_byte(byte: u8) -> bool {
    matches!(byte, 7 | 8 | 9 | 10 | 12 | 13 | 27 | 0x20..=0x7e | 0x80..=0xff)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_wins_over_content() {
        let source = RawSource::buffer("access.log.gz", b"plain text".to_vec());
        assert_eq!(sniff(&source).kind, ContainerKind::Gzip);

        let source = RawSource::buffer("ARCHIVE.ZIP", Vec::new());
        assert_eq!(sniff(&source).kind, ContainerKind::Zip);

        let source = RawSource::buffer("x.bzip2", Vec::new());
        assert_eq!(sniff(&source).kind, ContainerKind::Bz2);
    }

    #[test]
    fn test_structured_document_extensions() {
        let source = RawSource::buffer("events.json", b"[]".to_vec());
        let container = sniff(&source);
        assert_eq!(container.kind, ContainerKind::Plain);
        assert_eq!(container.document, Some(DocumentHint::Json));

        let source = RawSource::buffer("events.xml.gz", Vec::new());
        let container = sniff(&source);
        assert_eq!(container.kind, ContainerKind::Gzip);
        assert_eq!(container.document, Some(DocumentHint::Xml));
    }

    #[test]
    fn test_magic_bytes() {
        assert_eq!(sniff_bytes(b"\x1f\x8b\x08\x00\x00\x00\x00\x00"), ContainerKind::Gzip);
        assert_eq!(sniff_bytes(b"BZh91AY&"), ContainerKind::Bz2);
        assert_eq!(sniff_bytes(b"PK\x03\x04\x14\x00"), ContainerKind::Zip);

        let source = RawSource::buffer("upload", b"\x1f\x8b\x08\x00rest".to_vec());
        assert_eq!(sniff(&source).kind, ContainerKind::Gzip);
    }

    #[test]
    fn test_text_binary_heuristic() {
        assert_eq!(sniff_bytes(b"17040672"), ContainerKind::Plain);
        assert_eq!(sniff_bytes(b"caf\xc3\xa9\t\r\n"), ContainerKind::Plain);
        assert_eq!(sniff_bytes(b"ab\x00cd"), ContainerKind::Binary);
        assert_eq!(sniff_bytes(b"ab\x7fcd"), ContainerKind::Binary);
        assert_eq!(sniff_bytes(b""), ContainerKind::Plain);
    }

    #[test]
    fn test_unreadable_path_is_plain() {
        let source = RawSource::path("/definitely/not/here.log");
        assert_eq!(sniff(&source).kind, ContainerKind::Plain);
    }
}
