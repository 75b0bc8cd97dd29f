//! Error types for MetaImage reading and writing.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the MetaImage codec.
///
/// Every error is fatal to the call that produced it; nothing is retried.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `ElementType` code (or array element kind) outside the supported set.
    #[error("unsupported element type: '{0}'")]
    UnsupportedElementType(String),

    /// More than one variant of position or orientation is present.
    #[error("ambiguous definition of {0}")]
    AmbiguousDefinition(&'static str),

    /// Options or tags that cannot be honored together.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Slice indices that are not strictly increasing or out of range.
    #[error("invalid slice selection: {0}")]
    InvalidSliceSelection(String),

    /// A tag required by another tag is absent.
    #[error("missing required tag: {0}")]
    MissingRequiredTag(&'static str),

    /// Number of data files disagrees with the slice axis extent.
    #[error("data file count mismatch: expected {expected}, got {actual}")]
    FileCountMismatch {
        /// Extent of the slowest-varying dimension.
        expected: usize,
        /// Number of data files supplied.
        actual: usize,
    },

    /// Tag name not present in the tag table (strict writes only).
    #[error("unrecognized tag: '{0}'")]
    UnrecognizedTag(String),

    /// Text or value that does not coerce to the tag's category.
    #[error("invalid value for {tag}: '{value}'")]
    InvalidTagValue {
        /// Canonical (or verbatim) tag name.
        tag: String,
        /// Offending value as text.
        value: String,
    },

    /// `set_transform` on metadata that already carries the given definition.
    #[error("{0} is already defined in metadata")]
    AlreadyDefined(&'static str),

    /// Transform tags or matrices with unusable shapes.
    #[error("invalid affine: {0}")]
    InvalidAffine(String),

    /// Deflate stream could not be decoded.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// Deflate stream could not be encoded.
    #[error("compression failed: {0}")]
    Compression(String),

    /// Payload byte count disagrees with the declared extents.
    #[error("payload size mismatch: expected {expected} bytes, got {actual}")]
    PayloadSize {
        /// Bytes implied by the header.
        expected: u64,
        /// Bytes actually assembled.
        actual: u64,
    },

    /// Array shape inconsistent with the header or the requested layout.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Typed access requested with a different element kind than stored.
    #[error("data type mismatch: image holds {actual}, requested {expected}")]
    DataTypeMismatch {
        /// Requested element kind.
        expected: &'static str,
        /// Stored element kind.
        actual: &'static str,
    },

    /// Zero-copy view over a mapping whose offset breaks element alignment.
    #[error("mapped payload at offset {offset} is not aligned for {type_name}")]
    MisalignedMapping {
        /// Byte offset of the payload within the file.
        offset: u64,
        /// Element type name.
        type_name: &'static str,
    },
}

impl Error {
    pub(crate) fn invalid_value(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidTagValue {
            tag: tag.into(),
            value: value.into(),
        }
    }
}
