//! MetaImage tag vocabulary and element type codes.
//!
//! The tag table is closed: every recognized header key is a [`Tag`] variant,
//! declared in canonical output order. Lookup is case-insensitive and resolves
//! to the canonical spelling.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Value category of a tag, deciding how its text is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Free text.
    Text,
    /// Unsigned integer.
    Integer,
    /// `TRUE` / `FALSE`.
    Boolean,
    /// Single float.
    Float,
    /// Whitespace-separated floats.
    FloatVector,
    /// Whitespace-separated unsigned integers.
    IntegerVector,
    /// Square float matrix.
    FloatMatrix,
    /// `MET_*` element type code.
    ElementType,
    /// `LOCAL`, `LIST`, a path, or a numbered file pattern.
    DataFile,
}

macro_rules! tag_table {
    ($($variant:ident => ($name:literal, $category:ident)),+ $(,)?) => {
        /// Recognized MetaImage header tags, in canonical output order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Tag {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant,
            )+
        }

        impl Tag {
            /// Every tag in canonical order.
            pub const ALL: &'static [Tag] = &[$(Tag::$variant),+];

            /// Canonical spelling as written in headers.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Tag::$variant => $name,)+
                }
            }

            /// Value category of this tag.
            pub const fn category(self) -> Category {
                match self {
                    $(Tag::$variant => Category::$category,)+
                }
            }
        }
    };
}

tag_table! {
    Comment => ("Comment", Text),
    ObjectType => ("ObjectType", Text),
    ObjectSubType => ("ObjectSubType", Text),
    TransformType => ("TransformType", Text),
    NDims => ("NDims", Integer),
    Name => ("Name", Text),
    Id => ("ID", Integer),
    ParentId => ("ParentID", Integer),
    CompressedData => ("CompressedData", Boolean),
    CompressedDataSize => ("CompressedDataSize", Integer),
    BinaryData => ("BinaryData", Boolean),
    BinaryDataByteOrderMsb => ("BinaryDataByteOrderMSB", Boolean),
    ElementByteOrderMsb => ("ElementByteOrderMSB", Boolean),
    Color => ("Color", FloatVector),
    Position => ("Position", FloatVector),
    Offset => ("Offset", FloatVector),
    Origin => ("Origin", FloatVector),
    Orientation => ("Orientation", FloatMatrix),
    Rotation => ("Rotation", FloatMatrix),
    TransformMatrix => ("TransformMatrix", FloatMatrix),
    CenterOfRotation => ("CenterOfRotation", FloatVector),
    AnatomicalOrientation => ("AnatomicalOrientation", Text),
    ElementSpacing => ("ElementSpacing", FloatVector),
    DimSize => ("DimSize", IntegerVector),
    HeaderSize => ("HeaderSize", Integer),
    HeaderSizePerSlice => ("HeaderSizePerSlice", Integer),
    Modality => ("Modality", Text),
    SequenceId => ("SequenceID", IntegerVector),
    ElementMin => ("ElementMin", Float),
    ElementMax => ("ElementMax", Float),
    ElementNumberOfChannels => ("ElementNumberOfChannels", Integer),
    ElementSize => ("ElementSize", FloatVector),
    ElementType => ("ElementType", ElementType),
    ElementDataFile => ("ElementDataFile", DataFile),
}

static TAG_LOOKUP: LazyLock<HashMap<String, Tag>> = LazyLock::new(|| {
    Tag::ALL
        .iter()
        .map(|&tag| (tag.name().to_ascii_uppercase(), tag))
        .collect()
});

impl Tag {
    /// Position-like tags; at most one may be present.
    pub const POSITION: [Tag; 3] = [Tag::Position, Tag::Offset, Tag::Origin];

    /// Orientation-like tags; at most one may be present.
    pub const ORIENTATION: [Tag; 3] = [Tag::Orientation, Tag::Rotation, Tag::TransformMatrix];

    /// Resolve a header key, ignoring case and surrounding whitespace.
    pub fn lookup(key: &str) -> Option<Tag> {
        TAG_LOOKUP.get(&key.trim().to_ascii_uppercase()).copied()
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Scalar kind stored in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// `MET_CHAR`
    Int8,
    /// `MET_UCHAR`
    UInt8,
    /// `MET_SHORT`
    Int16,
    /// `MET_USHORT`
    UInt16,
    /// `MET_INT`
    Int32,
    /// `MET_UINT`
    UInt32,
    /// `MET_LONG`
    Int64,
    /// `MET_ULONG`
    UInt64,
    /// `MET_FLOAT`
    Float32,
    /// `MET_DOUBLE`
    Float64,
}

impl ElementType {
    /// Every supported element type.
    pub const ALL: [ElementType; 10] = [
        Self::Int8,
        Self::UInt8,
        Self::Int16,
        Self::UInt16,
        Self::Int32,
        Self::UInt32,
        Self::Int64,
        Self::UInt64,
        Self::Float32,
        Self::Float64,
    ];

    /// Parse a `MET_*` code (case-insensitive).
    pub fn from_code(code: &str) -> Result<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "MET_CHAR" => Ok(Self::Int8),
            "MET_UCHAR" => Ok(Self::UInt8),
            "MET_SHORT" => Ok(Self::Int16),
            "MET_USHORT" => Ok(Self::UInt16),
            "MET_INT" => Ok(Self::Int32),
            "MET_UINT" => Ok(Self::UInt32),
            "MET_LONG" | "MET_LONG_LONG" => Ok(Self::Int64),
            "MET_ULONG" | "MET_ULONG_LONG" => Ok(Self::UInt64),
            "MET_FLOAT" => Ok(Self::Float32),
            "MET_DOUBLE" => Ok(Self::Float64),
            _ => Err(Error::UnsupportedElementType(code.trim().to_string())),
        }
    }

    /// Canonical `MET_*` code written to headers.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Int8 => "MET_CHAR",
            Self::UInt8 => "MET_UCHAR",
            Self::Int16 => "MET_SHORT",
            Self::UInt16 => "MET_USHORT",
            Self::Int32 => "MET_INT",
            Self::UInt32 => "MET_UINT",
            Self::Int64 => "MET_LONG",
            Self::UInt64 => "MET_ULONG",
            Self::Float32 => "MET_FLOAT",
            Self::Float64 => "MET_DOUBLE",
        }
    }

    /// Size of each element in bytes.
    pub const fn byte_size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    /// Rust type name of the in-memory representation.
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Int8 => "i8",
            Self::UInt8 => "u8",
            Self::Int16 => "i16",
            Self::UInt16 => "u16",
            Self::Int32 => "i32",
            Self::UInt32 => "u32",
            Self::Int64 => "i64",
            Self::UInt64 => "u64",
            Self::Float32 => "f32",
            Self::Float64 => "f64",
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for ElementType {
    type Err = Error;

    /// Accepts either a `MET_*` code or a Rust type name (`u8`, `float32`, ...).
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "i8" | "int8" => Ok(Self::Int8),
            "u8" | "uint8" => Ok(Self::UInt8),
            "i16" | "int16" => Ok(Self::Int16),
            "u16" | "uint16" => Ok(Self::UInt16),
            "i32" | "int32" => Ok(Self::Int32),
            "u32" | "uint32" => Ok(Self::UInt32),
            "i64" | "int64" => Ok(Self::Int64),
            "u64" | "uint64" => Ok(Self::UInt64),
            "f32" | "float32" => Ok(Self::Float32),
            "f64" | "float64" => Ok(Self::Float64),
            _ => Self::from_code(s),
        }
    }
}
