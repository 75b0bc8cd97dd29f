//! Binary payload extraction and emission.
//!
//! Buffered reads walk the slowest axis one slice at a time and turn the
//! selection into a short list of coalesced read and skip spans, so a sparse
//! selection costs one seek per gap rather than one per slice.

use super::image::{ImageData, MappedImage};
use super::metadata::Metadata;
use super::tags::{ElementType, Tag};
use crate::error::{Error, Result};
use flate2::bufread::ZlibDecoder;
use libdeflater::{CompressionLvl, Compressor, DecompressionError, Decompressor};
use memmap2::MmapOptions;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Largest single read the planner emits.
pub(crate) const READ_LIMIT: u64 = isize::MAX as u64;

/// Largest single relative seek the planner emits.
pub(crate) const SKIP_LIMIT: u64 = i64::MAX as u64;

/// zlib level used for compressed payloads.
const COMPRESSION_LEVEL: i32 = 2;

const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Upper bound on the deflate expansion ratio.
const MAX_DEFLATE_RATIO: usize = 1032;

/// One step of a buffered payload read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Span {
    /// Append this many bytes to the output.
    Read(u64),
    /// Seek forward this many bytes.
    Skip(u64),
}

/// Accumulates pending reads and skips, flushing on every switch of kind.
#[derive(Debug)]
pub(crate) struct SpanPlanner {
    read: u64,
    skip: u64,
    read_limit: u64,
    skip_limit: u64,
    spans: Vec<Span>,
}

impl SpanPlanner {
    pub(crate) fn new(read_limit: u64, skip_limit: u64) -> Self {
        Self {
            read: 0,
            skip: 0,
            read_limit: read_limit.max(1),
            skip_limit: skip_limit.max(1),
            spans: Vec::new(),
        }
    }

    fn flush_read(&mut self) {
        if self.read > 0 {
            self.spans.push(Span::Read(self.read));
            self.read = 0;
        }
    }

    fn flush_skip(&mut self) {
        if self.skip > 0 {
            self.spans.push(Span::Skip(self.skip));
            self.skip = 0;
        }
    }

    /// Queue `bytes` of payload to keep.
    pub(crate) fn keep(&mut self, mut bytes: u64) {
        if bytes == 0 {
            return;
        }
        self.flush_skip();
        while bytes > 0 {
            if self.read == self.read_limit {
                self.flush_read();
            }
            let take = bytes.min(self.read_limit - self.read);
            self.read += take;
            bytes -= take;
        }
    }

    /// Queue `bytes` to step over.
    pub(crate) fn skip(&mut self, mut bytes: u64) {
        if bytes == 0 {
            return;
        }
        self.flush_read();
        while bytes > 0 {
            if self.skip == self.skip_limit {
                self.flush_skip();
            }
            let take = bytes.min(self.skip_limit - self.skip);
            self.skip += take;
            bytes -= take;
        }
    }

    /// Final span list. A trailing skip is dropped since nothing follows it.
    pub(crate) fn finish(mut self) -> Vec<Span> {
        self.flush_read();
        self.spans
    }
}

/// Plan the spans that read the slices listed in `selection`.
///
/// `selection` is strictly increasing. Every slice is `increment` bytes and
/// is preceded by `slice_header` bytes when present. Runs of adjacent slices
/// without per-slice headers are planned as one read.
pub(crate) fn plan_spans(
    selection: impl IntoIterator<Item = usize>,
    increment: u64,
    slice_header: Option<u64>,
    read_limit: u64,
    skip_limit: u64,
) -> Result<Vec<Span>> {
    let header = slice_header.filter(|&h| h > 0);
    let stride = increment
        .checked_add(header.unwrap_or(0))
        .ok_or_else(|| Error::ShapeMismatch("slice stride overflows u64".to_string()))?;
    let overflow = || Error::ShapeMismatch("payload offset overflows u64".to_string());

    let mut planner = SpanPlanner::new(read_limit, skip_limit);
    let mut next = 0usize;
    let mut run = 0u64;
    for index in selection {
        let gap = index.saturating_sub(next) as u64;
        if gap > 0 {
            planner.keep(run.checked_mul(increment).ok_or_else(overflow)?);
            run = 0;
            planner.skip(gap.checked_mul(stride).ok_or_else(overflow)?);
        }
        match header {
            Some(h) => {
                planner.skip(h);
                planner.keep(increment);
            }
            None => run += 1,
        }
        next = index + 1;
    }
    planner.keep(run.checked_mul(increment).ok_or_else(overflow)?);
    Ok(planner.finish())
}

/// Bytes a span list consumes from its start, and how many of them it keeps
/// when only `available` bytes exist.
fn span_extent(spans: &[Span], available: u64) -> (u64, u64) {
    let mut position = 0u64;
    let mut kept = 0u64;
    for span in spans {
        match *span {
            Span::Read(n) => {
                kept += n.min(available.saturating_sub(position));
                position = position.saturating_add(n);
            }
            Span::Skip(n) => position = position.saturating_add(n),
        }
    }
    (position, kept)
}

/// Run a span list against `reader`, appending kept bytes to `out`.
///
/// A short file stops the read early; the caller's size check reports it.
fn execute_spans<R: Read + Seek>(
    reader: &mut BufReader<R>,
    spans: &[Span],
    out: &mut Vec<u8>,
) -> Result<()> {
    for span in spans {
        match *span {
            Span::Read(n) => {
                let got = reader.by_ref().take(n).read_to_end(out)? as u64;
                if got < n {
                    tracing::debug!(wanted = n, got, "payload file ended early");
                    break;
                }
            }
            Span::Skip(n) => {
                let offset = i64::try_from(n).map_err(|_| {
                    Error::UnsupportedConfiguration(format!("seek of {n} bytes exceeds i64"))
                })?;
                reader.seek_relative(offset)?;
            }
        }
        tracing::trace!(?span, "flushed payload span");
    }
    Ok(())
}

/// Payload geometry and encoding derived from a parsed header.
#[derive(Debug, Clone)]
pub(crate) struct Layout {
    pub element_type: ElementType,
    /// Full in-memory shape, channel axis included.
    pub shape: Vec<usize>,
    pub big_endian: bool,
    /// `CompressedDataSize` when `CompressedData` is set.
    pub compressed: Option<Option<u64>>,
    /// `HeaderSize`.
    pub header_size: u64,
    /// `HeaderSizePerSlice`.
    pub slice_header: Option<u64>,
}

impl Layout {
    pub(crate) fn from_metadata(metadata: &Metadata) -> Result<Self> {
        let element_type = metadata
            .element_type()
            .ok_or(Error::MissingRequiredTag("ElementType"))?;
        let dims = metadata
            .dim_size()
            .ok_or(Error::MissingRequiredTag("DimSize"))?;
        if dims.is_empty() {
            return Err(Error::ShapeMismatch("DimSize has no entries".to_string()));
        }

        let mut shape = dims
            .iter()
            .rev()
            .map(|&d| usize::try_from(d))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::ShapeMismatch(format!("DimSize {dims:?} exceeds usize")))?;
        if let Some(channels) = metadata.channels() {
            shape.push(usize::try_from(channels).map_err(|_| {
                Error::ShapeMismatch(format!("{channels} channels exceeds usize"))
            })?);
        }

        Ok(Self {
            element_type,
            shape,
            big_endian: metadata.is_big_endian(),
            compressed: metadata
                .is_compressed()
                .then(|| metadata.integer(Tag::CompressedDataSize)),
            header_size: metadata.integer(Tag::HeaderSize).unwrap_or(0),
            slice_header: metadata.integer(Tag::HeaderSizePerSlice),
        })
    }

    /// Extent of the slowest axis.
    pub(crate) fn slices(&self) -> usize {
        self.shape[0]
    }

    /// Bytes per slice of the slowest axis.
    pub(crate) fn increment(&self) -> Result<u64> {
        self.shape[1..]
            .iter()
            .try_fold(self.element_type.byte_size() as u64, |acc, &d| {
                acc.checked_mul(d as u64)
            })
            .ok_or_else(|| Error::ShapeMismatch(format!("shape {:?} overflows u64", self.shape)))
    }

    /// Whether the file byte order differs from the host's.
    pub(crate) fn needs_swap(&self) -> bool {
        self.big_endian != cfg!(target_endian = "big")
    }

    fn decode(&self, bytes: &[u8], slices: usize) -> Result<ImageData> {
        let mut shape = self.shape.clone();
        shape[0] = slices;
        ImageData::from_bytes(bytes, self.element_type, &shape, self.big_endian)
    }
}

/// One data file and the byte offset its payload starts at.
#[derive(Debug, Clone)]
pub(crate) struct Source<'a> {
    pub path: &'a Path,
    pub offset: u64,
}

fn open_at(source: &Source<'_>) -> Result<BufReader<File>> {
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, File::open(source.path)?);
    if source.offset > 0 {
        reader.seek(SeekFrom::Start(source.offset))?;
    }
    Ok(reader)
}

/// Payload bytes present in `source` past its offset.
fn available(source: &Source<'_>) -> Result<u64> {
    Ok(std::fs::metadata(source.path)?
        .len()
        .saturating_sub(source.offset))
}

/// Buffered read of the selected slices, or of all of them for `None`.
///
/// With a single source every slice lives in it; otherwise source `i` holds
/// slice `i` and only the selected sources are opened. Uncompressed sources
/// are checked against their file length before the output is allocated.
pub(crate) fn read_buffered(
    sources: &[Source<'_>],
    layout: &Layout,
    selection: Option<&[usize]>,
) -> Result<ImageData> {
    let count = selection.map_or(layout.slices(), <[usize]>::len);
    let increment = layout.increment()?;
    let expected = increment
        .checked_mul(count as u64)
        .ok_or_else(|| Error::ShapeMismatch("selected payload overflows u64".to_string()))?;
    let capacity = usize::try_from(expected).map_err(|_| Error::PayloadSize {
        expected,
        actual: 0,
    })?;
    let short = |actual: u64| Error::PayloadSize { expected, actual };

    let bytes = match (sources, layout.compressed) {
        ([source], Some(size)) => {
            let size = size.ok_or(Error::MissingRequiredTag("CompressedDataSize"))?;
            inflate_from(&mut open_at(source)?, size, capacity)?
        }
        ([source], None) => {
            let header = layout.slice_header.unwrap_or(0);
            let stride = increment
                .checked_add(header)
                .ok_or_else(|| Error::ShapeMismatch("slice stride overflows u64".to_string()))?;
            let end = match selection {
                Some(selection) => selection.last().map_or(0, |&last| last + 1),
                None => layout.slices(),
            };
            let available = available(source)?;
            if (end as u64).checked_mul(stride).map_or(true, |needed| needed > available) {
                // Plan only the slices that can start inside the file.
                let limit = available / stride.max(1) + 1;
                let fits = |index: &usize| (*index as u64) < limit;
                let spans = match selection {
                    Some(selection) => plan_spans(
                        selection.iter().copied().take_while(fits),
                        increment,
                        layout.slice_header,
                        READ_LIMIT,
                        SKIP_LIMIT,
                    )?,
                    None => plan_spans(
                        (0..end).take_while(fits),
                        increment,
                        layout.slice_header,
                        READ_LIMIT,
                        SKIP_LIMIT,
                    )?,
                };
                return Err(short(span_extent(&spans, available).1));
            }

            let spans = match selection {
                Some(selection) => plan_spans(
                    selection.iter().copied(),
                    increment,
                    layout.slice_header,
                    READ_LIMIT,
                    SKIP_LIMIT,
                )?,
                None if header == 0 => {
                    let mut planner = SpanPlanner::new(READ_LIMIT, SKIP_LIMIT);
                    planner.keep(expected);
                    planner.finish()
                }
                None => plan_spans(0..end, increment, layout.slice_header, READ_LIMIT, SKIP_LIMIT)?,
            };
            tracing::debug!(path = %source.path.display(), spans = spans.len(), "reading payload");
            let mut bytes = Vec::with_capacity(capacity);
            execute_spans(&mut open_at(source)?, &spans, &mut bytes)?;
            bytes
        }
        (_, compressed) => {
            let all: Vec<usize>;
            let selection = match selection {
                Some(selection) => selection,
                None => {
                    all = (0..sources.len()).collect();
                    all.as_slice()
                }
            };
            let per_file = usize::try_from(increment).map_err(|_| Error::PayloadSize {
                expected: increment,
                actual: 0,
            })?;
            let spans = plan_spans([0], increment, layout.slice_header, READ_LIMIT, SKIP_LIMIT)?;

            let mut bytes = Vec::new();
            match compressed {
                Some(size) => {
                    let size = size.ok_or(Error::MissingRequiredTag("CompressedDataSize"))?;
                    for &index in selection {
                        let source = &sources[index];
                        tracing::trace!(
                            slice = index,
                            path = %source.path.display(),
                            "inflating slice file"
                        );
                        let mut reader = open_at(source)?;
                        bytes.extend_from_slice(&inflate_from(&mut reader, size, per_file)?);
                    }
                }
                None => {
                    let mut readable = 0u64;
                    for &index in selection {
                        readable += span_extent(&spans, available(&sources[index])?).1;
                    }
                    if readable != expected {
                        return Err(short(readable));
                    }
                    bytes.reserve_exact(capacity);
                    for &index in selection {
                        let source = &sources[index];
                        tracing::trace!(
                            slice = index,
                            path = %source.path.display(),
                            "reading slice file"
                        );
                        execute_spans(&mut open_at(source)?, &spans, &mut bytes)?;
                    }
                }
            }
            bytes
        }
    };

    if bytes.len() as u64 != expected {
        return Err(short(bytes.len() as u64));
    }
    layout.decode(&bytes, count)
}

/// Read up to `size` compressed bytes and inflate them.
fn inflate_from<R: Read>(reader: &mut R, size: u64, expected: usize) -> Result<Vec<u8>> {
    let mut compressed = Vec::new();
    reader.take(size).read_to_end(&mut compressed)?;
    let inflated = inflate(&compressed, expected)?;
    tracing::debug!(compressed = compressed.len(), inflated = inflated.len(), "inflated payload");
    Ok(inflated)
}

/// Inflate a zlib stream whose decoded size is expected to be `expected`.
///
/// The first buffer is capped at what deflate can expand `compressed` to.
/// Falls back to streaming when the stream decodes to more than that so the
/// size check downstream can report the real length.
pub(crate) fn inflate(compressed: &[u8], expected: usize) -> Result<Vec<u8>> {
    let bound = expected.min(compressed.len().saturating_mul(MAX_DEFLATE_RATIO));
    let mut output = vec![0u8; bound];
    match Decompressor::new().zlib_decompress(compressed, &mut output) {
        Ok(written) => {
            output.truncate(written);
            Ok(output)
        }
        Err(DecompressionError::InsufficientSpace) => {
            let mut output = Vec::with_capacity(bound);
            ZlibDecoder::new(compressed)
                .read_to_end(&mut output)
                .map_err(|e| Error::Decompression(format!("zlib stream decode failed: {e}")))?;
            Ok(output)
        }
        Err(e) => Err(Error::Decompression(e.to_string())),
    }
}

/// Deflate `raw` into a zlib stream.
pub(crate) fn deflate(raw: &[u8]) -> Result<Vec<u8>> {
    let level = CompressionLvl::new(COMPRESSION_LEVEL)
        .map_err(|e| Error::Compression(format!("{e:?}")))?;
    let mut compressor = Compressor::new(level);
    let mut compressed = vec![0u8; compressor.zlib_compress_bound(raw.len())];
    let written = compressor
        .zlib_compress(raw, &mut compressed)
        .map_err(|e| Error::Compression(format!("{e:?}")))?;
    compressed.truncate(written);
    Ok(compressed)
}

/// Copy-on-write mapping of a whole uncompressed payload.
#[allow(unsafe_code)]
pub(crate) fn map_payload(source: &Source<'_>, layout: &Layout) -> Result<MappedImage> {
    let file = File::open(source.path)?;
    let expected = layout
        .increment()?
        .checked_mul(layout.slices() as u64)
        .ok_or_else(|| Error::ShapeMismatch("payload overflows u64".to_string()))?;
    let available = file.metadata()?.len().saturating_sub(source.offset);
    if available < expected {
        return Err(Error::PayloadSize {
            expected,
            actual: available,
        });
    }

    let map = if expected == 0 {
        None
    } else {
        let len = usize::try_from(expected).map_err(|_| Error::PayloadSize {
            expected,
            actual: available,
        })?;
        // SAFETY: the mapping is private (copy-on-write), so writes through it
        // never reach the file. Concurrent external modification of the file
        // can change unwritten pages, which is a data race on the contents
        // only and is the caller's responsibility.
        Some(unsafe {
            MmapOptions::new()
                .offset(source.offset)
                .len(len)
                .map_copy(&file)?
        })
    };
    tracing::debug!(
        path = %source.path.display(),
        offset = source.offset,
        len = expected,
        "mapped payload"
    );
    Ok(MappedImage::new(
        map,
        layout.element_type,
        layout.shape.clone(),
        source.offset,
    ))
}

/// How one output unit is written.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Encoding {
    pub element_type: ElementType,
    pub big_endian: bool,
    pub compress: bool,
    /// `HeaderSize` padding at the start of each file.
    pub header_size: u64,
    /// `HeaderSizePerSlice` padding before each slice.
    pub slice_header: Option<u64>,
}

/// Serialize one output unit (the whole array or one slice of it) holding
/// `slices` slices of the slowest axis.
pub(crate) fn encode_unit(
    data: &ImageData,
    slices: usize,
    encoding: &Encoding,
) -> Result<Vec<u8>> {
    let raw = data.cast(encoding.element_type).to_bytes(encoding.big_endian);
    if encoding.compress {
        let compressed = deflate(&raw)?;
        tracing::debug!(raw = raw.len(), compressed = compressed.len(), "deflated payload");
        return Ok(compressed);
    }
    let Some(slice_header) = encoding.slice_header else {
        return Ok(raw);
    };

    let pad = usize::try_from(slice_header).map_err(|_| {
        Error::UnsupportedConfiguration(format!("HeaderSizePerSlice {slice_header} exceeds usize"))
    })?;
    let stride = if slices == 0 { 0 } else { raw.len() / slices };
    let mut padded = Vec::with_capacity(raw.len() + pad * slices);
    for slice in raw.chunks(stride.max(1)).take(slices) {
        padded.resize(padded.len() + pad, 0);
        padded.extend_from_slice(slice);
    }
    if stride == 0 {
        padded.resize(pad * slices, 0);
    }
    Ok(padded)
}

/// Write `HeaderSize` padding followed by an encoded unit.
pub(crate) fn write_unit<W: Write>(writer: &mut W, unit: &[u8], encoding: &Encoding) -> Result<()> {
    std::io::copy(&mut std::io::repeat(0).take(encoding.header_size), writer)?;
    writer.write_all(unit)?;
    Ok(())
}
