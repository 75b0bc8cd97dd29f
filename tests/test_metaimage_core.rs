//! End-to-end tests for MetaImage reading and writing.
//!
//! Covers round-trips across element types and layouts, the payload
//! variants (embedded, sibling, per-slice lists and patterns, compressed,
//! padded), memory mapping, and the configuration errors.

use metaimage::{
    get_transform, read, read_header, read_with, set_transform, write, DataFile, ElementType,
    Error, FilePattern, ImageData, MetaElement, Metadata, OrientationKey, PositionKey,
    ReadOptions, Tag, TagValue, Volume, WriteOptions,
};
use ndarray::{ArrayD, Axis, IxDyn};
use num_traits::AsPrimitive;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// Deterministic test volume with values cycling through 0..100.
fn ramp<T>(shape: &[usize]) -> ArrayD<T>
where
    T: MetaElement,
    u8: AsPrimitive<T>,
{
    let n: usize = shape.iter().product();
    let values = (0..n).map(|i| ((i % 100) as u8).as_()).collect();
    ArrayD::from_shape_vec(IxDyn(shape), values).unwrap()
}

fn loaded(volume: Option<Volume>) -> ImageData {
    volume.expect("volume").into_image_data().unwrap()
}

fn write_text(path: &Path, text: &str) {
    fs::write(path, text).unwrap();
}

fn roundtrip<T>(suffix: &str)
where
    T: MetaElement + std::fmt::Debug + PartialEq,
    u8: AsPrimitive<T>,
{
    let dir = tempdir().unwrap();
    for shape in [&[5, 7][..], &[4, 3, 2][..], &[2, 3, 4, 5][..]] {
        let image = ImageData::from(ramp::<T>(shape));
        let path = dir.path().join(format!("image{}.{suffix}", shape.len()));
        let written = write(&path, Some(&image), &WriteOptions::new()).unwrap();
        assert_eq!(written.element_type(), Some(T::ELEMENT_TYPE));

        let (volume, meta) = read(&path).unwrap();
        assert_eq!(loaded(volume), image, "{suffix} {shape:?}");
        assert_eq!(meta.ndims(), Some(shape.len() as u64));
        assert!(!meta.contains(Tag::ElementDataFile));
    }
}

#[test]
fn test_roundtrip_all_element_types() {
    for suffix in ["mha", "mhd"] {
        roundtrip::<i8>(suffix);
        roundtrip::<u8>(suffix);
        roundtrip::<i16>(suffix);
        roundtrip::<u16>(suffix);
        roundtrip::<i32>(suffix);
        roundtrip::<u32>(suffix);
        roundtrip::<i64>(suffix);
        roundtrip::<u64>(suffix);
        roundtrip::<f32>(suffix);
        roundtrip::<f64>(suffix);
    }
}

#[test]
fn test_mhd_writes_sibling_raw() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.mhd");
    let image = ImageData::from(ramp::<f64>(&[4, 3, 2]));
    write(&path, Some(&image), &WriteOptions::new()).unwrap();

    let raw = dir.path().join("test.raw");
    assert_eq!(fs::metadata(&raw).unwrap().len(), 4 * 3 * 2 * 8);

    let header = fs::read_to_string(&path).unwrap();
    assert!(header.contains("DimSize = 2 3 4\n"));
    assert!(header.contains("ElementType = MET_DOUBLE\n"));
    assert!(header.ends_with("ElementDataFile = test.raw\n"));
}

#[test]
fn test_compressed_roundtrip() {
    let dir = tempdir().unwrap();
    let image = ImageData::from(ramp::<i16>(&[6, 16, 16]));
    let options = WriteOptions::new().tag("CompressedData", true);

    for name in ["packed.mha", "packed.mhd"] {
        let path = dir.path().join(name);
        let written = write(&path, Some(&image), &options).unwrap();
        let size = written.get(Tag::CompressedDataSize).and_then(TagValue::as_integer);
        assert!(size.is_some_and(|s| s > 0 && s < 6 * 16 * 16 * 2));

        let (volume, meta) = read(&path).unwrap();
        assert_eq!(loaded(volume), image);
        assert!(meta.is_compressed());
    }
    assert!(dir.path().join("packed.zraw").exists());
}

#[test]
fn test_compressed_multi_file_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("stack.mhd");
    let image = ImageData::from(ramp::<u16>(&[3, 8, 8]));
    let files = DataFile::List(vec!["z0.zraw".into(), "z1.zraw".into(), "z2.zraw".into()]);
    let options = WriteOptions::new()
        .tag("CompressedData", true)
        .tag("ElementDataFile", files);
    write(&path, Some(&image), &options).unwrap();

    let (volume, _) = read_with(&path, &ReadOptions::new().slices([0, 2])).unwrap();
    let expected = image.as_array::<u16>().unwrap().select(Axis(0), &[0, 2]);
    assert_eq!(loaded(volume), ImageData::from(expected));
}

#[cfg(target_endian = "little")]
#[test]
fn test_memmap_matches_buffered() {
    let dir = tempdir().unwrap();
    let image = ImageData::from(ramp::<u16>(&[4, 5, 6]));

    for name in ["mapped.mhd", "mapped.mha"] {
        let path = dir.path().join(name);
        write(&path, Some(&image), &WriteOptions::new()).unwrap();

        let (volume, _) = read_with(&path, &ReadOptions::new().memmap(true)).unwrap();
        let volume = volume.unwrap();
        let mapped = volume.as_mapped().expect("mapped volume");
        assert_eq!(mapped.shape(), &[4, 5, 6]);
        assert_eq!(mapped.to_image_data().unwrap(), image);
    }

    let (volume, _) =
        read_with(dir.path().join("mapped.mhd"), &ReadOptions::new().memmap(true)).unwrap();
    let mut volume = volume.unwrap();
    let Volume::Mapped(mapped) = &mut volume else {
        panic!("expected a mapped volume");
    };
    let view = mapped.view::<u16>().unwrap();
    assert_eq!(view, image.as_array::<u16>().unwrap().view());
    assert!(matches!(
        mapped.view::<f32>(),
        Err(Error::DataTypeMismatch { .. })
    ));

    // Copy-on-write: edits never reach the file.
    mapped.view_mut::<u16>().unwrap()[[0, 0, 0]] = 999;
    let (reread, _) = read(dir.path().join("mapped.mhd")).unwrap();
    assert_eq!(loaded(reread), image);
}

#[test]
fn test_slice_selection() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("slices.mha");
    let image = ImageData::from(ramp::<i32>(&[4, 3, 5]));
    write(&path, Some(&image), &WriteOptions::new()).unwrap();

    let (volume, _) = read_with(&path, &ReadOptions::new().slices([1, 3])).unwrap();
    let selected = loaded(volume);
    assert_eq!(selected.shape(), &[2, 3, 5]);
    let expected = image.as_array::<i32>().unwrap().select(Axis(0), &[1, 3]);
    assert_eq!(selected, ImageData::from(expected));
}

#[test]
fn test_metadata_only_read() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("meta.mhd");
    let image = ImageData::from(ramp::<f32>(&[2, 3, 4]));
    write(&path, Some(&image), &WriteOptions::new().tag("Modality", "MET_MOD_CT")).unwrap();
    fs::remove_file(dir.path().join("meta.raw")).unwrap();

    let (volume, meta) = read_with(&path, &ReadOptions::new().metadata_only()).unwrap();
    assert!(volume.is_none());
    assert_eq!(meta.dim_size(), Some(&[4u64, 3, 2][..]));
    assert_eq!(meta.element_type(), Some(ElementType::Float32));
    assert_eq!(
        meta.get(Tag::Modality),
        Some(&TagValue::Text("MET_MOD_CT".to_string()))
    );
}

#[test]
fn test_channel_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rgb.mha");
    let image = ImageData::from(ramp::<u8>(&[2, 4, 5, 3]));
    let options = WriteOptions::new().tag("ElementNumberOfChannels", 3u64);
    let written = write(&path, Some(&image), &options).unwrap();
    assert_eq!(written.ndims(), Some(3));
    assert_eq!(written.dim_size(), Some(&[5u64, 4, 2][..]));

    let (volume, meta) = read(&path).unwrap();
    assert_eq!(meta.ndims(), Some(3));
    assert_eq!(loaded(volume), image);
}

#[test]
fn test_list_files_read_only_selected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("listed.mhd");
    let image = ImageData::from(ramp::<f32>(&[4, 2, 3]));
    let names: Vec<PathBuf> = (0..4).map(|i| format!("part{i}.raw").into()).collect();
    let options = WriteOptions::new().tag("ElementDataFile", DataFile::List(names));
    write(&path, Some(&image), &options).unwrap();

    let header = fs::read_to_string(&path).unwrap();
    assert!(header.ends_with("ElementDataFile = LIST\npart0.raw\npart1.raw\npart2.raw\npart3.raw\n"));

    let (volume, _) = read(&path).unwrap();
    assert_eq!(loaded(volume), image);

    // Unselected slice files are never opened.
    fs::remove_file(dir.path().join("part0.raw")).unwrap();
    let (volume, _) = read_with(&path, &ReadOptions::new().slices([1, 2])).unwrap();
    let expected = image.as_array::<f32>().unwrap().select(Axis(0), &[1, 2]);
    assert_eq!(loaded(volume), ImageData::from(expected));
}

#[test]
fn test_pattern_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pattern.mhd");
    let image = ImageData::from(ramp::<u16>(&[3, 4, 4]));
    let pattern = FilePattern::new("slice%03d.raw", 1, 3, 1).unwrap();
    let options = WriteOptions::new().tag("ElementDataFile", DataFile::Pattern(pattern));
    write(&path, Some(&image), &options).unwrap();

    for name in ["slice001.raw", "slice002.raw", "slice003.raw"] {
        assert_eq!(fs::metadata(dir.path().join(name)).unwrap().len(), 4 * 4 * 2);
    }
    let header = read_header(&path).unwrap();
    assert!(matches!(header.data_file(), Some(DataFile::Pattern(_))));

    let (volume, _) = read(&path).unwrap();
    assert_eq!(loaded(volume), image);
}

#[test]
fn test_big_endian_payload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("msb.mhd");
    let image = ImageData::from(ramp::<i32>(&[2, 2, 2]).mapv(|v| v + 0x0102_0300));
    let options = WriteOptions::new().tag("BinaryDataByteOrderMSB", true);
    write(&path, Some(&image), &options).unwrap();

    let raw = fs::read(dir.path().join("msb.raw")).unwrap();
    assert_eq!(&raw[..4], &[0x01, 0x02, 0x03, 0x00]);

    let (volume, meta) = read(&path).unwrap();
    assert!(meta.is_big_endian());
    assert_eq!(loaded(volume), image);

    #[cfg(target_endian = "little")]
    assert!(matches!(
        read_with(&path, &ReadOptions::new().memmap(true)),
        Err(Error::UnsupportedConfiguration(_))
    ));
}

#[test]
fn test_header_padding() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("padded.mhd");
    let image = ImageData::from(ramp::<u8>(&[4, 3, 3]));
    let options = WriteOptions::new()
        .tag("HeaderSize", 32u64)
        .tag("HeaderSizePerSlice", 5u64);
    write(&path, Some(&image), &options).unwrap();
    assert_eq!(
        fs::metadata(dir.path().join("padded.raw")).unwrap().len(),
        32 + 4 * (5 + 9)
    );

    let (volume, _) = read(&path).unwrap();
    assert_eq!(loaded(volume), image);

    let (volume, _) = read_with(&path, &ReadOptions::new().slices([0, 3])).unwrap();
    let expected = image.as_array::<u8>().unwrap().select(Axis(0), &[0, 3]);
    assert_eq!(loaded(volume), ImageData::from(expected));

    assert!(matches!(
        read_with(&path, &ReadOptions::new().memmap(true)),
        Err(Error::UnsupportedConfiguration(_))
    ));
}

#[test]
fn test_hand_written_header() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("legacy.mhd");
    write_text(
        &path,
        "# exported by a scanner\n\
         objecttype = Image\n\
         NDIMS = 2\n\
         DimSize = 3 2\n\
         elementtype = MET_LONG_LONG\n\
         AcquisitionDate = 20240101\n\
         ElementDataFile = legacy.raw\n",
    );
    let values: Vec<u8> = (0..6i64).flat_map(|v| v.to_le_bytes()).collect();
    fs::write(dir.path().join("legacy.raw"), values).unwrap();

    let (volume, meta) = read(&path).unwrap();
    let array = loaded(volume).into_array::<i64>().unwrap();
    assert_eq!(array.shape(), &[2, 3]);
    assert_eq!(array[[1, 2]], 5);
    assert_eq!(meta.get_by_name("OBJECTTYPE"), Some(TagValue::Text("Image".into())));
    assert_eq!(meta.extension("AcquisitionDate"), Some("20240101"));
}

#[test]
fn test_extension_tags_written_before_data_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ext.mha");
    let image = ImageData::from(ramp::<u8>(&[2, 2]));
    let options = WriteOptions::new()
        .tag("Scanner", "ACME 3T")
        .tag("elementspacing", "0.5 2");
    write(&path, Some(&image), &options).unwrap();

    let header = read_header(&path).unwrap();
    assert_eq!(header.extension("Scanner"), Some("ACME 3T"));
    assert_eq!(header.element_spacing(), Some(&[0.5, 2.0][..]));
    assert_eq!(header.data_file(), Some(&DataFile::Local));

    let text = fs::read(&path).unwrap();
    let text = String::from_utf8_lossy(&text);
    let scanner = text.find("Scanner = ACME 3T").unwrap();
    let data_file = text.find("ElementDataFile = LOCAL").unwrap();
    assert!(scanner < data_file);
}

#[test]
fn test_header_only_write() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.mhd");
    let written = write(&path, None, &WriteOptions::new()).unwrap();
    assert_eq!(written.dim_size(), Some(&[0u64, 0, 0][..]));
    assert!(!dir.path().join("empty.raw").exists());

    let header = read_header(&path).unwrap();
    assert_eq!(header.element_type(), Some(ElementType::Float64));
    assert_eq!(header.data_file(), Some(&DataFile::Single("empty.raw".into())));
}

#[test]
fn test_transform_through_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("oriented.mha");
    let (s, c) = 0.3f64.sin_cos();
    let affine = [
        [c, 0.0, s, 12.5],
        [0.0, 1.0, 0.0, -3.0],
        [-s, 0.0, c, 40.0],
        [0.0, 0.0, 0.0, 1.0],
    ];
    let mut tags = Metadata::new();
    set_transform(&mut tags, &affine, PositionKey::Offset, OrientationKey::TransformMatrix)
        .unwrap();

    let options = tags
        .iter()
        .fold(WriteOptions::new(), |options, (tag, value)| {
            options.tag(tag.name(), value.clone())
        });
    let image = ImageData::from(ramp::<u8>(&[2, 2, 2]));
    write(&path, Some(&image), &options).unwrap();

    let (_, meta) = read(&path).unwrap();
    let restored = get_transform(&meta).unwrap();
    for (row, expected) in restored.iter().zip(&affine) {
        for (x, y) in row.iter().zip(expected) {
            assert!((x - y).abs() < 1e-12);
        }
    }
}

#[test]
fn test_compressed_slice_selection_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("z.mha");
    let image = ImageData::from(ramp::<u8>(&[4, 2, 2]));
    write(&path, Some(&image), &WriteOptions::new().tag("CompressedData", true)).unwrap();

    let err = read_with(&path, &ReadOptions::new().slices([1])).unwrap_err();
    assert!(matches!(err, Error::UnsupportedConfiguration(_)));
    let err = read_with(&path, &ReadOptions::new().memmap(true)).unwrap_err();
    assert!(matches!(err, Error::UnsupportedConfiguration(_)));

    // Selecting every slice is the same as reading everything.
    let (volume, _) = read_with(&path, &ReadOptions::new().slices(0..4)).unwrap();
    assert_eq!(loaded(volume), image);
}

#[test]
fn test_memmap_with_slices_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("m.mha");
    write(&path, Some(&ImageData::from(ramp::<u8>(&[2, 2]))), &WriteOptions::new()).unwrap();
    let options = ReadOptions::new().slices([0]).memmap(true);
    assert!(matches!(
        read_with(&path, &options),
        Err(Error::UnsupportedConfiguration(_))
    ));
}

#[test]
fn test_invalid_slice_selection() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("s.mha");
    write(&path, Some(&ImageData::from(ramp::<u8>(&[3, 2]))), &WriteOptions::new()).unwrap();

    for slices in [vec![2, 1], vec![0, 0], vec![3]] {
        let err = read_with(&path, &ReadOptions::new().slices(slices)).unwrap_err();
        assert!(matches!(err, Error::InvalidSliceSelection(_)), "{err}");
    }
}

#[test]
fn test_missing_compressed_data_size() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.mhd");
    write_text(
        &path,
        "NDims = 1\nDimSize = 4\nElementType = MET_UCHAR\nCompressedData = True\n\
         ElementDataFile = broken.zraw\n",
    );
    let err = read(&path).unwrap_err();
    assert!(matches!(err, Error::MissingRequiredTag("CompressedDataSize")));
}

#[test]
fn test_per_slice_header_with_compression_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.mhd");
    write_text(
        &path,
        "NDims = 1\nDimSize = 4\nElementType = MET_UCHAR\nCompressedData = TRUE\n\
         CompressedDataSize = 10\nHeaderSizePerSlice = 4\nElementDataFile = bad.zraw\n",
    );
    assert!(matches!(
        read(&path),
        Err(Error::UnsupportedConfiguration(_))
    ));

    let image = ImageData::from(ramp::<u8>(&[2, 2]));
    let options = WriteOptions::new()
        .tag("CompressedData", true)
        .tag("HeaderSizePerSlice", 4u64);
    assert!(matches!(
        write(dir.path().join("bad2.mhd"), Some(&image), &options),
        Err(Error::UnsupportedConfiguration(_))
    ));
}

#[test]
fn test_file_count_mismatch() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("count.mhd");
    write_text(
        &path,
        "NDims = 2\nDimSize = 2 4\nElementType = MET_UCHAR\n\
         ElementDataFile = LIST\na.raw\nb.raw\nc.raw\n",
    );
    assert!(matches!(
        read(&path),
        Err(Error::FileCountMismatch {
            expected: 4,
            actual: 3
        })
    ));

    let image = ImageData::from(ramp::<u8>(&[4, 2]));
    let options =
        WriteOptions::new().tag("ElementDataFile", DataFile::List(vec!["a.raw".into()]));
    assert!(matches!(
        write(dir.path().join("w.mhd"), Some(&image), &options),
        Err(Error::FileCountMismatch { .. })
    ));
}

#[test]
fn test_unsupported_element_type() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("half.mhd");
    write_text(
        &path,
        "NDims = 1\nDimSize = 4\nElementType = MET_HALF\nElementDataFile = h.raw\n",
    );
    let err = read(&path).unwrap_err();
    assert!(matches!(err, Error::UnsupportedElementType(ref code) if code == "MET_HALF"));

    let options = WriteOptions::new().tag("ElementType", "MET_COMPLEX");
    assert!(matches!(
        write(dir.path().join("c.mha"), None, &options),
        Err(Error::UnsupportedElementType(_))
    ));
}

#[test]
fn test_truncated_payload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("short.mhd");
    write_text(
        &path,
        "NDims = 1\nDimSize = 8\nElementType = MET_SHORT\nElementDataFile = short.raw\n",
    );
    fs::write(dir.path().join("short.raw"), [0u8; 10]).unwrap();

    assert!(matches!(
        read(&path),
        Err(Error::PayloadSize {
            expected: 16,
            actual: 10
        })
    ));
}

#[test]
fn test_element_type_override_casts() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cast.mha");
    let image = ImageData::from(ramp::<u8>(&[3, 3]));
    let options = WriteOptions::new().tag("ElementType", ElementType::Float32);
    write(&path, Some(&image), &options).unwrap();

    let (volume, meta) = read(&path).unwrap();
    assert_eq!(meta.element_type(), Some(ElementType::Float32));
    assert_eq!(loaded(volume), image.cast(ElementType::Float32));
}

#[test]
fn test_oversized_dimensions_with_short_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("huge.mhd");
    write_text(
        &path,
        "NDims = 3\nDimSize = 100000 100000 1000\nElementType = MET_DOUBLE\n\
         ElementDataFile = huge.raw\n",
    );
    fs::write(dir.path().join("huge.raw"), [0u8; 16]).unwrap();

    // 100000 * 100000 * 1000 doubles.
    let expected = 80_000_000_000_000;
    assert!(matches!(
        read(&path),
        Err(Error::PayloadSize { expected: e, actual: 16 }) if e == expected
    ));
    assert!(matches!(
        read_with(&path, &ReadOptions::new().slices([999])),
        Err(Error::PayloadSize { actual: 0, .. })
    ));
}

#[test]
fn test_oversized_dimensions_compressed() {
    use flate2::{write::ZlibEncoder, Compression};
    use std::io::Write as _;

    let dir = tempdir().unwrap();
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&[7u8; 16]).unwrap();
    let compressed = encoder.finish().unwrap();
    fs::write(dir.path().join("huge.zraw"), &compressed).unwrap();

    let path = dir.path().join("huge.mhd");
    write_text(
        &path,
        &format!(
            "NDims = 3\nDimSize = 100000 100000 1000\nElementType = MET_DOUBLE\n\
             CompressedData = True\nCompressedDataSize = {}\nElementDataFile = huge.zraw\n",
            compressed.len()
        ),
    );
    assert!(matches!(
        read(&path),
        Err(Error::PayloadSize { actual: 16, .. })
    ));
}

#[test]
fn test_oversized_dimensions_list_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("huge.mhd");
    write_text(
        &path,
        "NDims = 3\nDimSize = 100000 100000 2\nElementType = MET_DOUBLE\n\
         ElementDataFile = LIST\na.raw\nb.raw\n",
    );
    fs::write(dir.path().join("a.raw"), [0u8; 16]).unwrap();
    fs::write(dir.path().join("b.raw"), [0u8; 16]).unwrap();

    assert!(matches!(
        read(&path),
        Err(Error::PayloadSize {
            expected: 160_000_000_000,
            actual: 32
        })
    ));
}

#[test]
fn test_pattern_longer_than_slice_extent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("many.mhd");
    write_text(
        &path,
        "NDims = 2\nDimSize = 2 4\nElementType = MET_UCHAR\n\
         ElementDataFile = s%d.raw 0 9223372036854775806\n",
    );
    assert!(matches!(
        read(&path),
        Err(Error::FileCountMismatch { expected: 4, .. })
    ));

    let image = ImageData::from(ramp::<u8>(&[4, 2]));
    let options = WriteOptions::new().tag("ElementDataFile", "w%d.raw 0 9223372036854775806");
    assert!(matches!(
        write(dir.path().join("w.mhd"), Some(&image), &options),
        Err(Error::FileCountMismatch { expected: 4, .. })
    ));
}

#[test]
fn test_line_breaks_in_tags_rejected() {
    let dir = tempdir().unwrap();
    let image = ImageData::from(ramp::<u8>(&[2, 2]));

    let path = dir.path().join("comment.mha");
    let options = WriteOptions::new().tag("Comment", "scan\nElementDataFile = LOCAL");
    assert!(matches!(
        write(&path, Some(&image), &options),
        Err(Error::InvalidTagValue { ref tag, .. }) if tag == "Comment"
    ));
    assert!(!path.exists());

    let path = dir.path().join("extension.mha");
    let options = WriteOptions::new().tag("Scanner", "ACME\r\nNDims = 9");
    assert!(matches!(
        write(&path, Some(&image), &options),
        Err(Error::InvalidTagValue { .. })
    ));
    assert!(!path.exists());
}
