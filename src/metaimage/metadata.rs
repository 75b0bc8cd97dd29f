//! Ordered, typed metadata mapping.

use super::tags::{ElementType, Tag};
use super::value::{breaks_line, coerce, DataFile, Matrix, TagValue};
use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Typed MetaImage metadata.
///
/// Recognized tags are keyed by [`Tag`] and iterate in canonical table order.
/// Unrecognized keys are kept verbatim as text extensions, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    tags: BTreeMap<Tag, TagValue>,
    extensions: Vec<(String, String)>,
}

impl Metadata {
    /// Empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a recognized tag, coercing the value into the tag's category.
    pub fn insert(&mut self, tag: Tag, value: impl Into<TagValue>) -> Result<Option<TagValue>> {
        let value = coerce(tag, value.into())?;
        Ok(self.tags.insert(tag, value))
    }

    /// Set a tag by name, matched case-insensitively.
    ///
    /// Unmatched names become text extensions unless `strict` is set, in which
    /// case they fail with [`Error::UnrecognizedTag`].
    pub fn set(&mut self, key: &str, value: impl Into<TagValue>, strict: bool) -> Result<()> {
        match Tag::lookup(key) {
            Some(tag) => {
                self.insert(tag, value)?;
            }
            None if strict => return Err(Error::UnrecognizedTag(key.trim().to_string())),
            None => self.set_extension(key.trim(), value.into().encode())?,
        }
        Ok(())
    }

    /// Store an unrecognized key verbatim, replacing an earlier value.
    ///
    /// Keys must be non-empty and free of `=`; neither side may hold a line
    /// break.
    pub fn set_extension(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        let key = key.into();
        let value = value.into();
        if key.trim().is_empty() || key.contains('=') || breaks_line(&key) || breaks_line(&value) {
            return Err(Error::invalid_value(key, value));
        }
        match self.extensions.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.extensions.push((key, value)),
        }
        Ok(())
    }

    /// Value of a recognized tag.
    pub fn get(&self, tag: Tag) -> Option<&TagValue> {
        self.tags.get(&tag)
    }

    /// Value of a recognized tag, or the text of an extension, by name.
    pub fn get_by_name(&self, key: &str) -> Option<TagValue> {
        match Tag::lookup(key) {
            Some(tag) => self.get(tag).cloned(),
            None => self.extension(key).map(|v| TagValue::Text(v.to_string())),
        }
    }

    /// Text of an extension tag (exact key match).
    pub fn extension(&self, key: &str) -> Option<&str> {
        self.extensions
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether a recognized tag is present.
    pub fn contains(&self, tag: Tag) -> bool {
        self.tags.contains_key(&tag)
    }

    /// Remove a recognized tag.
    pub fn remove(&mut self, tag: Tag) -> Option<TagValue> {
        self.tags.remove(&tag)
    }

    /// Recognized tags in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Tag, &TagValue)> {
        self.tags.iter().map(|(tag, value)| (*tag, value))
    }

    /// Extension tags in insertion order.
    pub fn extensions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.extensions.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of recognized plus extension tags.
    pub fn len(&self) -> usize {
        self.tags.len() + self.extensions.len()
    }

    /// True when no tags are set.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn put(&mut self, tag: Tag, value: TagValue) {
        self.tags.insert(tag, value);
    }

    pub(crate) fn integer(&self, tag: Tag) -> Option<u64> {
        self.get(tag).and_then(TagValue::as_integer)
    }

    fn flag(&self, tag: Tag) -> bool {
        self.get(tag).and_then(TagValue::as_bool).unwrap_or(false)
    }

    /// `NDims`.
    pub fn ndims(&self) -> Option<u64> {
        self.integer(Tag::NDims)
    }

    /// `DimSize`, fastest-varying dimension first.
    pub fn dim_size(&self) -> Option<&[u64]> {
        self.get(Tag::DimSize).and_then(TagValue::as_integers)
    }

    /// `ElementSpacing`.
    pub fn element_spacing(&self) -> Option<&[f64]> {
        self.get(Tag::ElementSpacing).and_then(TagValue::as_floats)
    }

    /// `ElementType`.
    pub fn element_type(&self) -> Option<ElementType> {
        self.get(Tag::ElementType).and_then(TagValue::as_element_type)
    }

    /// `ElementNumberOfChannels`, when greater than one.
    pub fn channels(&self) -> Option<u64> {
        self.integer(Tag::ElementNumberOfChannels).filter(|&n| n > 1)
    }

    /// `CompressedData`.
    pub fn is_compressed(&self) -> bool {
        self.flag(Tag::CompressedData)
    }

    /// Either byte-order tag requests most-significant-byte first.
    pub fn is_big_endian(&self) -> bool {
        self.flag(Tag::BinaryDataByteOrderMsb) || self.flag(Tag::ElementByteOrderMsb)
    }

    /// `ElementDataFile`.
    pub fn data_file(&self) -> Option<&DataFile> {
        self.get(Tag::ElementDataFile).and_then(TagValue::as_data_file)
    }

    /// Orientation-like matrix (whichever variant is present).
    pub fn matrix(&self, tag: Tag) -> Option<&Matrix> {
        self.get(tag).and_then(TagValue::as_matrix)
    }
}
