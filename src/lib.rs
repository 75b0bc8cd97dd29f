//! # metaimage
//!
//! Reader and writer for MetaImage volumetric images (`.mha` / `.mhd`).
//!
//! ## Features
//!
//! - Typed metadata keyed by a closed tag table, with case-insensitive lookup
//! - Embedded, single-file and per-slice multi-file payloads
//! - Slice-selective reads that coalesce seeks across unselected slices
//! - zlib-compressed payloads via libdeflate
//! - Copy-on-write memory mapping for uncompressed native-order payloads
//! - Affine transform helpers over the position and orientation tags
//!
//! ## Quick Start
//!
//! ```no_run
//! use metaimage::{ImageData, ReadOptions, WriteOptions};
//! use ndarray::ArrayD;
//!
//! let image = ImageData::from(ArrayD::<i16>::zeros(vec![4, 3, 2]));
//! metaimage::write("scan.mhd", Some(&image), &WriteOptions::new())?;
//!
//! let options = ReadOptions::new().slices([1, 3]);
//! let (volume, metadata) = metaimage::read_with("scan.mhd", &options)?;
//! assert_eq!(volume.unwrap().shape(), &[2, 3, 2]);
//! assert_eq!(metadata.dim_size(), Some(&[2u64, 3, 4][..]));
//! # Ok::<(), metaimage::Error>(())
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod metaimage;
pub mod transforms;

pub use error::{Error, Result};
pub use metaimage::{
    read, read_header, read_with, write, DataFile, ElementType, FilePattern, ImageData,
    MappedImage, MetaElement, Metadata, ReadOptions, Tag, TagValue, Volume, WriteOptions,
};
pub use transforms::{get_transform, set_transform, OrientationKey, PositionKey};
