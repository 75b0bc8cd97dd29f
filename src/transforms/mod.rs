//! Spatial transforms stored in MetaImage headers.

pub mod affine;

pub use affine::{get_transform, set_transform, OrientationKey, PositionKey};
