//! Node metadata files (`.mpk`).
//!
//! A metadata file is a MessagePack map from attribute name to raw bytes,
//! the same attributes the storage driver would otherwise keep in extended
//! attributes.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_bytes::ByteBuf;
use thiserror::Error;

use crate::grammar::BLOB_ID_ATTR;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed metadata: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("metadata encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("attribute {0} is not set")]
    MissingAttribute(String),

    #[error("attribute {name} is not a number: {value}")]
    InvalidNumber { name: String, value: String },
}

impl MetadataError {
    /// The metadata file itself is absent
    pub fn is_missing(&self) -> bool {
        matches!(self, MetadataError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, MetadataError>;

/// Decoded attributes, ordered by name
pub type Attributes = BTreeMap<String, ByteBuf>;

pub fn decode(bytes: &[u8]) -> Result<Attributes> {
    Ok(rmp_serde::from_slice(bytes)?)
}

pub fn encode(attributes: &Attributes) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec(attributes)?)
}

/// Read and decode a metadata file
pub fn read(path: &Path) -> Result<Attributes> {
    let bytes = fs::read(path)?;
    decode(&bytes)
}

pub fn write(path: &Path, attributes: &Attributes) -> Result<()> {
    fs::write(path, encode(attributes)?)?;
    Ok(())
}

/// The blob owned by a node. Absent or empty means no blob.
pub fn blob_id(attributes: &Attributes) -> Option<String> {
    attributes
        .get(BLOB_ID_ATTR)
        .filter(|v| !v.is_empty())
        .map(|v| String::from_utf8_lossy(v).into_owned())
}

/// Shortcut for [`read`] + [`blob_id`].
pub fn read_blob_id(path: &Path) -> Result<Option<String>> {
    Ok(blob_id(&read(path)?))
}

/// A decimal attribute such as a size. `None` when the attribute is absent.
pub fn number(attributes: &Attributes, name: &str) -> Result<Option<u64>> {
    let Some(raw) = attributes.get(name) else {
        return Ok(None);
    };
    let text = String::from_utf8_lossy(raw).trim().to_string();
    match text.parse() {
        Ok(n) => Ok(Some(n)),
        Err(_) => Err(MetadataError::InvalidNumber {
            name: name.to_string(),
            value: text,
        }),
    }
}

/// Render an attribute value for humans.
///
/// Printable ASCII goes in double quotes. Anything containing another byte
/// is binary and becomes `0s<base64>`.
pub fn render_value(value: &[u8]) -> String {
    if value.iter().all(|b| (32..127).contains(b)) {
        // All bytes are ASCII, so this never replaces anything.
        format!("\"{}\"", String::from_utf8_lossy(value))
    } else {
        format!("0s{}", STANDARD.encode(value))
    }
}

/// Build an attribute map from string pairs
pub fn attributes<'a, I>(pairs: I) -> Attributes
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), ByteBuf::from(v.to_vec())))
        .collect()
}
