//! Conversion between header tags and a 4x4 affine matrix.
//!
//! The affine is `T(position) · T(center) · R · T(-center)`, where the
//! position comes from whichever of `Position`, `Offset` or `Origin` is set
//! and the rotation from whichever of `Orientation`, `Rotation` or
//! `TransformMatrix` is set.

use crate::error::{Error, Result};
use crate::metaimage::{Matrix, Metadata, Tag};

/// Tag that receives the translation in [`set_transform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionKey {
    /// `Position`
    #[default]
    Position,
    /// `Offset`
    Offset,
    /// `Origin`
    Origin,
}

impl PositionKey {
    /// Header tag for this key.
    pub const fn tag(self) -> Tag {
        match self {
            Self::Position => Tag::Position,
            Self::Offset => Tag::Offset,
            Self::Origin => Tag::Origin,
        }
    }
}

/// Tag that receives the rotation in [`set_transform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrientationKey {
    /// `Orientation`
    #[default]
    Orientation,
    /// `Rotation`
    Rotation,
    /// `TransformMatrix`
    TransformMatrix,
}

impl OrientationKey {
    /// Header tag for this key.
    pub const fn tag(self) -> Tag {
        match self {
            Self::Orientation => Tag::Orientation,
            Self::Rotation => Tag::Rotation,
            Self::TransformMatrix => Tag::TransformMatrix,
        }
    }
}

const IDENTITY: [[f64; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// The single present tag among `candidates`, if any.
fn single(
    metadata: &Metadata,
    candidates: &[Tag; 3],
    what: &'static str,
) -> Result<Option<Tag>> {
    let mut present = candidates.iter().copied().filter(|&tag| metadata.contains(tag));
    let first = present.next();
    if present.next().is_some() {
        return Err(Error::AmbiguousDefinition(what));
    }
    Ok(first)
}

fn vector3(metadata: &Metadata, tag: Tag) -> Result<[f64; 3]> {
    let values = metadata
        .get(tag)
        .and_then(|value| value.as_floats())
        .ok_or_else(|| Error::InvalidAffine(format!("{tag} is not a float vector")))?;
    <[f64; 3]>::try_from(values).map_err(|_| {
        Error::InvalidAffine(format!("{tag} has {} values, expected 3", values.len()))
    })
}

fn matrix3(matrix: &Matrix, tag: Tag) -> Result<[[f64; 3]; 3]> {
    if matrix.order() != 3 {
        return Err(Error::InvalidAffine(format!(
            "{tag} is {0}x{0}, expected 3x3",
            matrix.order()
        )));
    }
    let mut rows = [[0.0; 3]; 3];
    for (r, row) in rows.iter_mut().enumerate() {
        for (c, value) in row.iter_mut().enumerate() {
            *value = matrix.get(r, c);
        }
    }
    Ok(rows)
}

/// Build the 4x4 affine described by the metadata.
///
/// Missing tags default to zero translation, identity rotation and a zero
/// center of rotation. Fails with [`Error::AmbiguousDefinition`] when more
/// than one position-like or orientation-like tag is present.
pub fn get_transform(metadata: &Metadata) -> Result<[[f64; 4]; 4]> {
    let position = match single(metadata, &Tag::POSITION, "position")? {
        Some(tag) => vector3(metadata, tag)?,
        None => [0.0; 3],
    };
    let rotation = match single(metadata, &Tag::ORIENTATION, "orientation")? {
        Some(tag) => {
            let matrix = metadata
                .matrix(tag)
                .ok_or_else(|| Error::InvalidAffine(format!("{tag} is not a matrix")))?;
            matrix3(matrix, tag)?
        }
        None => [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };
    let center = if metadata.contains(Tag::CenterOfRotation) {
        vector3(metadata, Tag::CenterOfRotation)?
    } else {
        [0.0; 3]
    };

    let mut affine = IDENTITY;
    for i in 0..3 {
        let rotated_center: f64 = (0..3).map(|j| rotation[i][j] * center[j]).sum();
        affine[i][..3].copy_from_slice(&rotation[i]);
        affine[i][3] = position[i] + center[i] - rotated_center;
    }
    Ok(affine)
}

/// Store `affine` as a translation, a rotation and a zero center of rotation.
///
/// Fails with [`Error::AlreadyDefined`] if any position-like or
/// orientation-like tag is already present, and with [`Error::InvalidAffine`]
/// if the bottom row is not `[0, 0, 0, 1]`.
pub fn set_transform(
    metadata: &mut Metadata,
    affine: &[[f64; 4]; 4],
    position: PositionKey,
    orientation: OrientationKey,
) -> Result<()> {
    if Tag::POSITION.iter().any(|&tag| metadata.contains(tag)) {
        return Err(Error::AlreadyDefined("position"));
    }
    if Tag::ORIENTATION.iter().any(|&tag| metadata.contains(tag)) {
        return Err(Error::AlreadyDefined("orientation"));
    }
    if affine[3] != IDENTITY[3] {
        return Err(Error::InvalidAffine(format!(
            "bottom row {:?} is not [0, 0, 0, 1]",
            affine[3]
        )));
    }

    let translation = vec![affine[0][3], affine[1][3], affine[2][3]];
    let rotation = Matrix::from_rows([
        [affine[0][0], affine[0][1], affine[0][2]],
        [affine[1][0], affine[1][1], affine[1][2]],
        [affine[2][0], affine[2][1], affine[2][2]],
    ]);
    metadata.insert(position.tag(), translation)?;
    metadata.insert(orientation.tag(), rotation)?;
    metadata.insert(Tag::CenterOfRotation, vec![0.0; 3])?;
    Ok(())
}
