//! MetaImage read and write entry points.
//!
//! Every call builds its own metadata and holds file handles only for its own
//! duration. All option and tag combinations are checked before any payload
//! byte is read or written.

use super::header::{parse_header, serialize_header};
use super::image::{ImageData, Volume};
use super::metadata::Metadata;
use super::payload::{self, Encoding, Layout, Source};
use super::tags::{ElementType, Tag};
use super::value::{DataFile, TagValue};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Options for [`read_with`].
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Slices of the slowest axis to read; `None` reads all of them and an
    /// empty list reads metadata only.
    pub slices: Option<Vec<usize>>,
    /// Map the payload instead of reading it.
    pub memmap: bool,
}

impl ReadOptions {
    /// Read everything into memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read only these slices (strictly increasing).
    pub fn slices(mut self, slices: impl IntoIterator<Item = usize>) -> Self {
        self.slices = Some(slices.into_iter().collect());
        self
    }

    /// Skip the payload entirely.
    pub fn metadata_only(mut self) -> Self {
        self.slices = Some(Vec::new());
        self
    }

    /// Memory-map the payload (single uncompressed native-order file only).
    pub fn memmap(mut self, memmap: bool) -> Self {
        self.memmap = memmap;
        self
    }
}

/// Options for [`write`].
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Tag overrides applied over the defaults, in order.
    pub overrides: Vec<(String, TagValue)>,
    /// Reject tag names outside the tag table.
    pub strict: bool,
}

impl WriteOptions {
    /// No overrides, unknown tags pass through.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override a tag. The key is matched case-insensitively; the value may
    /// be typed or header text.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.overrides.push((key.into(), value.into()));
        self
    }

    /// Fail with [`Error::UnrecognizedTag`] on unknown keys.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Read a whole image.
///
/// # Example
///
/// ```no_run
/// let (volume, metadata) = metaimage::read("brain.mha")?;
/// println!("{:?} {:?}", volume.map(|v| v.shape().to_vec()), metadata.dim_size());
/// # Ok::<(), metaimage::Error>(())
/// ```
pub fn read<P: AsRef<Path>>(path: P) -> Result<(Option<Volume>, Metadata)> {
    read_with(path, &ReadOptions::default())
}

/// Parse only the header, keeping `ElementDataFile`.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<Metadata> {
    let file = File::open(path.as_ref())?;
    Ok(parse_header(BufReader::new(file))?.metadata)
}

/// Read an image with slice selection or memory mapping.
///
/// Returns no volume for an empty slice selection. The returned metadata
/// omits `ElementDataFile`.
pub fn read_with<P: AsRef<Path>>(
    path: P,
    options: &ReadOptions,
) -> Result<(Option<Volume>, Metadata)> {
    let path = path.as_ref();
    let parsed = parse_header(BufReader::new(File::open(path)?))?;
    let mut metadata = parsed.metadata;
    let data_file = metadata.remove(Tag::ElementDataFile);

    if options.memmap && options.slices.is_some() {
        return Err(Error::UnsupportedConfiguration(
            "slice selection is not supported with memmap".to_string(),
        ));
    }
    if options.slices.as_ref().is_some_and(Vec::is_empty) {
        tracing::debug!(path = %path.display(), "metadata-only read");
        return Ok((None, metadata));
    }

    let data_file = data_file
        .as_ref()
        .and_then(TagValue::as_data_file)
        .ok_or(Error::MissingRequiredTag("ElementDataFile"))?;
    let layout = Layout::from_metadata(&metadata)?;

    let files = data_file.file_count();
    if files > 1 && files != layout.slices() as u64 {
        return Err(file_count_mismatch(layout.slices(), files));
    }

    let base = path.parent().unwrap_or(Path::new(""));
    let (paths, local_offset) = match data_file {
        DataFile::Local => (vec![path.to_path_buf()], parsed.byte_len),
        other => (
            other
                .file_names()
                .into_iter()
                .map(|name| base.join(name))
                .collect::<Vec<PathBuf>>(),
            0,
        ),
    };
    check_read(&layout, paths.len(), options)?;

    let sources: Vec<Source<'_>> = paths
        .iter()
        .map(|path| Source {
            path,
            offset: local_offset + layout.header_size,
        })
        .collect();
    tracing::debug!(
        path = %path.display(),
        files = sources.len(),
        shape = ?layout.shape,
        element_type = %layout.element_type,
        "reading MetaImage"
    );

    if options.memmap {
        let mapped = payload::map_payload(&sources[0], &layout)?;
        return Ok((Some(Volume::Mapped(mapped)), metadata));
    }

    let data = payload::read_buffered(&sources, &layout, options.slices.as_deref())?;
    Ok((Some(Volume::Loaded(data)), metadata))
}

fn file_count_mismatch(expected: usize, files: u64) -> Error {
    Error::FileCountMismatch {
        expected,
        actual: usize::try_from(files).unwrap_or(usize::MAX),
    }
}

fn unsupported(what: &str) -> Error {
    Error::UnsupportedConfiguration(what.to_string())
}

fn check_read(layout: &Layout, files: usize, options: &ReadOptions) -> Result<()> {
    if options.memmap {
        if layout.needs_swap() {
            return Err(unsupported("byte order swap is not supported with memmap"));
        }
        if layout.compressed.is_some() {
            return Err(unsupported("CompressedData is not supported with memmap"));
        }
        if layout.slice_header.is_some() {
            return Err(unsupported("HeaderSizePerSlice is not supported with memmap"));
        }
        if files != 1 {
            return Err(unsupported("only a single ElementDataFile is supported with memmap"));
        }
    }

    if layout.compressed == Some(None) {
        return Err(Error::MissingRequiredTag("CompressedDataSize"));
    }
    if layout.compressed.is_some() && layout.slice_header.is_some() {
        return Err(unsupported("HeaderSizePerSlice is not supported with compressed data"));
    }

    let extent = layout.slices();
    if files == 0 || (files != 1 && files != extent) {
        return Err(Error::FileCountMismatch {
            expected: extent,
            actual: files,
        });
    }

    if let Some(slices) = &options.slices {
        check_selection(slices, extent)?;
        if files == 1 && layout.compressed.is_some() && slices.len() != extent {
            return Err(unsupported(
                "slice selection is not supported with a single compressed data file",
            ));
        }
    }
    Ok(())
}

fn check_selection(slices: &[usize], extent: usize) -> Result<()> {
    if let Some(pair) = slices.windows(2).find(|pair| pair[1] <= pair[0]) {
        return Err(Error::InvalidSliceSelection(format!(
            "slices must be strictly increasing, got {} after {}",
            pair[1], pair[0]
        )));
    }
    match slices.last() {
        Some(&last) if last >= extent => Err(Error::InvalidSliceSelection(format!(
            "slice {last} is outside [0, {extent})"
        ))),
        _ => Ok(()),
    }
}

/// Write a header, and the payload when `image` is given.
///
/// Returns the metadata actually written, including `ElementDataFile` and
/// `CompressedDataSize`. A failed write may leave a header without its
/// payload.
///
/// # Example
///
/// ```no_run
/// use metaimage::{ImageData, WriteOptions};
/// use ndarray::ArrayD;
///
/// let image = ImageData::from(ArrayD::<f32>::zeros(vec![4, 64, 64]));
/// let options = WriteOptions::new()
///     .tag("ElementSpacing", vec![0.5, 0.5, 2.0])
///     .tag("CompressedData", true);
/// metaimage::write("volume.mhd", Some(&image), &options)?;
/// # Ok::<(), metaimage::Error>(())
/// ```
pub fn write<P: AsRef<Path>>(
    path: P,
    image: Option<&ImageData>,
    options: &WriteOptions,
) -> Result<Metadata> {
    let path = path.as_ref();
    let mut metadata = build_metadata(path, image, options)?;
    let data_file = metadata
        .data_file()
        .cloned()
        .ok_or(Error::MissingRequiredTag("ElementDataFile"))?;

    let Some(image) = image else {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(serialize_header(&metadata).as_bytes())?;
        writer.flush()?;
        tracing::debug!(path = %path.display(), "wrote header only");
        return Ok(metadata);
    };

    let encoding = Encoding {
        element_type: metadata
            .element_type()
            .ok_or(Error::MissingRequiredTag("ElementType"))?,
        big_endian: metadata.is_big_endian(),
        compress: metadata.is_compressed(),
        header_size: metadata.integer(Tag::HeaderSize).unwrap_or(0),
        slice_header: metadata.integer(Tag::HeaderSizePerSlice),
    };
    if encoding.compress && encoding.slice_header.is_some() {
        return Err(unsupported("HeaderSizePerSlice is not supported with compressed data"));
    }

    let extent = image.shape().first().copied().unwrap_or(1);
    let units = match &data_file {
        DataFile::Local | DataFile::Single(_) => {
            vec![payload::encode_unit(image, extent, &encoding)?]
        }
        multi => {
            let files = multi.file_count();
            if image.ndim() == 0 || files != extent as u64 {
                return Err(file_count_mismatch(extent, files));
            }
            (0..extent)
                .map(|i| payload::encode_unit(&image.outer_slice(i), 1, &encoding))
                .collect::<Result<Vec<_>>>()?
        }
    };
    if encoding.compress {
        let total = units.iter().map(|unit| unit.len() as u64).sum();
        metadata.put(Tag::CompressedDataSize, TagValue::Integer(total));
    }

    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(serialize_header(&metadata).as_bytes())?;
    if data_file == DataFile::Local {
        payload::write_unit(&mut writer, &units[0], &encoding)?;
    }
    writer.flush()?;

    if data_file != DataFile::Local {
        let base = path.parent().unwrap_or(Path::new(""));
        for (name, unit) in data_file.file_names().iter().zip(&units) {
            let target = base.join(name);
            let mut out = BufWriter::new(File::create(&target)?);
            payload::write_unit(&mut out, unit, &encoding)?;
            out.flush()?;
            tracing::trace!(path = %target.display(), bytes = unit.len(), "wrote data file");
        }
    }

    tracing::debug!(
        path = %path.display(),
        shape = ?image.shape(),
        element_type = %encoding.element_type,
        files = units.len(),
        compressed = encoding.compress,
        "wrote MetaImage"
    );
    Ok(metadata)
}

fn build_metadata(
    path: &Path,
    image: Option<&ImageData>,
    options: &WriteOptions,
) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    metadata.put(Tag::ObjectType, TagValue::Text("Image".to_string()));
    metadata.put(Tag::BinaryData, TagValue::Boolean(true));
    metadata.put(Tag::BinaryDataByteOrderMsb, TagValue::Boolean(false));

    match image {
        Some(image) => {
            let ndim = image.ndim();
            metadata.put(Tag::NDims, TagValue::Integer(ndim as u64));
            metadata.put(Tag::ElementSpacing, TagValue::FloatVector(vec![1.0; ndim]));
            metadata.put(
                Tag::DimSize,
                TagValue::IntegerVector(image.shape().iter().rev().map(|&d| d as u64).collect()),
            );
            metadata.put(Tag::ElementType, TagValue::ElementType(image.element_type()));
        }
        None => {
            metadata.put(Tag::NDims, TagValue::Integer(3));
            metadata.put(Tag::ElementSpacing, TagValue::FloatVector(vec![1.0; 3]));
            metadata.put(Tag::DimSize, TagValue::IntegerVector(vec![0; 3]));
            metadata.put(Tag::ElementType, TagValue::ElementType(ElementType::Float64));
        }
    }

    for (key, value) in &options.overrides {
        metadata.set(key, value.clone(), options.strict)?;
    }

    if metadata.data_file().is_none() {
        let data_file = default_data_file(path, metadata.is_compressed());
        metadata.put(Tag::ElementDataFile, TagValue::DataFile(data_file));
    }
    collapse_channels(&mut metadata);
    Ok(metadata)
}

fn default_data_file(path: &Path, compressed: bool) -> DataFile {
    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mha"))
    {
        return DataFile::Local;
    }
    let raw = path.with_extension(if compressed { "zraw" } else { "raw" });
    DataFile::Single(PathBuf::from(raw.file_name().unwrap_or_default()))
}

/// Drop the channel extent (first `DimSize` entry) from the declared geometry.
fn collapse_channels(metadata: &mut Metadata) {
    if metadata.channels().is_none() {
        return;
    }
    let (Some(ndims), Some(dims)) = (metadata.ndims(), metadata.dim_size()) else {
        return;
    };
    if dims.is_empty() || dims.len() as u64 != ndims {
        return;
    }
    let dims = dims[1..].to_vec();
    let ndims = ndims - 1;

    if let Some(spacing) = metadata.element_spacing() {
        if spacing.len() as u64 > ndims {
            let kept = spacing[spacing.len() - ndims as usize..].to_vec();
            metadata.put(Tag::ElementSpacing, TagValue::FloatVector(kept));
        }
    }
    metadata.put(Tag::DimSize, TagValue::IntegerVector(dims));
    metadata.put(Tag::NDims, TagValue::Integer(ndims));
}
