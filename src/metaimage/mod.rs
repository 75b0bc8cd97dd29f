//! MetaImage (`.mha` / `.mhd`) format support.
//!
//! A MetaImage is a plain-text `Key = Value` header followed by a raw or
//! zlib-compressed payload. The payload is either appended to the header
//! (`.mha`, `ElementDataFile = LOCAL`), stored in one sibling file, or split
//! one slice per file across an explicit list or a numbered pattern.

pub(crate) mod header;
pub(crate) mod image;
pub mod io;
pub(crate) mod metadata;
pub(crate) mod payload;
pub(crate) mod tags;
pub(crate) mod value;

pub use image::{ImageData, MappedImage, MetaElement, Volume};
pub use io::{read, read_header, read_with, write, ReadOptions, WriteOptions};
pub use metadata::Metadata;
pub use tags::{Category, ElementType, Tag};
pub use value::{coerce, decode, DataFile, FilePattern, Matrix, TagValue};
