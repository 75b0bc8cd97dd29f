//! MetaImage text header parsing and serialization.
//!
//! A header is a sequence of `Key = Value` lines. Parsing stops right after an
//! `ElementDataFile = LOCAL` line (the payload follows byte-for-byte), or
//! switches to path accumulation after `ElementDataFile = LIST`.

use super::metadata::Metadata;
use super::tags::Tag;
use super::value::{decode, DataFile, TagValue};
use crate::error::Result;
use std::io::BufRead;
use std::path::PathBuf;

/// Result of parsing a header.
#[derive(Debug, Clone)]
pub(crate) struct ParsedHeader {
    /// Typed metadata, including `ElementDataFile` when present.
    pub metadata: Metadata,
    /// Bytes consumed, i.e. the offset of a `LOCAL` payload.
    pub byte_len: u64,
}

/// Parse a header from a buffered reader.
pub(crate) fn parse_header<R: BufRead>(mut reader: R) -> Result<ParsedHeader> {
    let mut metadata = Metadata::new();
    let mut byte_len = 0u64;
    let mut list: Option<Vec<PathBuf>> = None;
    let mut raw = Vec::with_capacity(128);
    let mut lines = 0usize;

    loop {
        raw.clear();
        let n = reader.read_until(b'\n', &mut raw)?;
        if n == 0 {
            break;
        }
        byte_len += n as u64;
        lines += 1;

        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();

        if let Some(paths) = list.as_mut() {
            if !line.is_empty() {
                paths.push(PathBuf::from(line));
            }
            continue;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            tracing::warn!(line = lines, text = %line, "skipping header line without '='");
            continue;
        };
        let (key, value) = (key.trim(), value.trim());

        let Some(tag) = Tag::lookup(key) else {
            if let Err(e) = metadata.set_extension(key, value) {
                tracing::warn!(line = lines, error = %e, "skipping header line");
            }
            continue;
        };

        match decode(tag, value)? {
            TagValue::DataFile(DataFile::Local) => {
                metadata.put(tag, TagValue::DataFile(DataFile::Local));
                break;
            }
            TagValue::DataFile(DataFile::List(_)) => list = Some(Vec::new()),
            decoded => metadata.put(tag, decoded),
        }
    }

    if let Some(paths) = list {
        metadata.put(Tag::ElementDataFile, TagValue::DataFile(DataFile::List(paths)));
    }

    tracing::debug!(lines, byte_len, tags = metadata.len(), "parsed MetaImage header");
    Ok(ParsedHeader { metadata, byte_len })
}

/// Serialize metadata as header text.
///
/// Recognized tags are written in table order, then extensions, then
/// `ElementDataFile` as the final entry.
pub(crate) fn serialize_header(metadata: &Metadata) -> String {
    let mut text = String::with_capacity(512);
    let mut push = |key: &str, value: &str| {
        text.push_str(key);
        text.push_str(" = ");
        text.push_str(value);
        text.push('\n');
    };

    for (tag, value) in metadata.iter() {
        if tag != Tag::ElementDataFile {
            push(tag.name(), &value.encode());
        }
    }
    for (key, value) in metadata.extensions() {
        push(key, value);
    }
    if let Some(value) = metadata.get(Tag::ElementDataFile) {
        push(Tag::ElementDataFile.name(), &value.encode());
    }
    text
}
