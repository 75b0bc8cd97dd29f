//! In-memory and memory-mapped MetaImage voxel data.
//!
//! Arrays use C order with the header's `DimSize` reversed, so the file's
//! fastest-varying dimension is the last axis. A channel axis, when present,
//! is appended after it.

use super::tags::ElementType;
use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use memmap2::MmapMut;
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Axis, IxDyn};
use num_traits::AsPrimitive;

/// Scalar types that can be stored in a MetaImage payload.
pub trait MetaElement:
    bytemuck::Pod
    + Default
    + AsPrimitive<i8>
    + AsPrimitive<u8>
    + AsPrimitive<i16>
    + AsPrimitive<u16>
    + AsPrimitive<i32>
    + AsPrimitive<u32>
    + AsPrimitive<i64>
    + AsPrimitive<u64>
    + AsPrimitive<f32>
    + AsPrimitive<f64>
{
    /// Matching `ElementType`.
    const ELEMENT_TYPE: ElementType;

    /// Decode `src` (exactly `dst.len()` elements) with byte order `E`.
    fn decode_into<E: ByteOrder>(src: &[u8], dst: &mut [Self]);

    /// Encode `src` into `dst` (exactly `src.len()` elements) with byte order `E`.
    fn encode_into<E: ByteOrder>(src: &[Self], dst: &mut [u8]);

    /// Wrap a typed array.
    fn wrap(array: ArrayD<Self>) -> ImageData;

    /// Borrow the typed array if `data` holds this element type.
    fn peek(data: &ImageData) -> Option<&ArrayD<Self>>;

    /// Take the typed array if `data` holds this element type.
    fn take(data: ImageData) -> std::result::Result<ArrayD<Self>, ImageData>;
}

macro_rules! image_data {
    ($($variant:ident($ty:ty)),+ $(,)?) => {
        /// Voxel data for any supported element type.
        #[derive(Debug, Clone, PartialEq)]
        pub enum ImageData {
            $(
                #[doc = concat!("`", stringify!($ty), "` voxels.")]
                $variant(ArrayD<$ty>),
            )+
        }

        impl ImageData {
            /// Element type of the stored voxels.
            pub fn element_type(&self) -> ElementType {
                match self {
                    $(ImageData::$variant(_) => ElementType::$variant,)+
                }
            }
        }

        fn cast_to<S: MetaElement>(array: &ArrayD<S>, target: ElementType) -> ImageData {
            match target {
                $(ElementType::$variant => {
                    ImageData::$variant(array.mapv(<S as AsPrimitive<$ty>>::as_))
                })+
            }
        }

        fn decode_as(
            bytes: &[u8],
            element_type: ElementType,
            shape: &[usize],
            big_endian: bool,
        ) -> Result<ImageData> {
            match element_type {
                $(ElementType::$variant => {
                    decode_array::<$ty>(bytes, shape, big_endian).map(ImageData::$variant)
                })+
            }
        }
    };
}

image_data! {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
}

macro_rules! with_array {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            ImageData::Int8($arr) => $body,
            ImageData::UInt8($arr) => $body,
            ImageData::Int16($arr) => $body,
            ImageData::UInt16($arr) => $body,
            ImageData::Int32($arr) => $body,
            ImageData::UInt32($arr) => $body,
            ImageData::Int64($arr) => $body,
            ImageData::UInt64($arr) => $body,
            ImageData::Float32($arr) => $body,
            ImageData::Float64($arr) => $body,
        }
    };
}

macro_rules! map_array {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            ImageData::Int8($arr) => ImageData::Int8($body),
            ImageData::UInt8($arr) => ImageData::UInt8($body),
            ImageData::Int16($arr) => ImageData::Int16($body),
            ImageData::UInt16($arr) => ImageData::UInt16($body),
            ImageData::Int32($arr) => ImageData::Int32($body),
            ImageData::UInt32($arr) => ImageData::UInt32($body),
            ImageData::Int64($arr) => ImageData::Int64($body),
            ImageData::UInt64($arr) => ImageData::UInt64($body),
            ImageData::Float32($arr) => ImageData::Float32($body),
            ImageData::Float64($arr) => ImageData::Float64($body),
        }
    };
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident, |$src:ident, $dst:ident| $decode:expr, |$esrc:ident, $edst:ident| $encode:expr) => {
        impl MetaElement for $ty {
            const ELEMENT_TYPE: ElementType = ElementType::$variant;

            fn decode_into<E: ByteOrder>($src: &[u8], $dst: &mut [Self]) {
                $decode
            }

            fn encode_into<E: ByteOrder>($esrc: &[Self], $edst: &mut [u8]) {
                $encode
            }

            fn wrap(array: ArrayD<Self>) -> ImageData {
                ImageData::$variant(array)
            }

            fn peek(data: &ImageData) -> Option<&ArrayD<Self>> {
                match data {
                    ImageData::$variant(array) => Some(array),
                    _ => None,
                }
            }

            fn take(data: ImageData) -> std::result::Result<ArrayD<Self>, ImageData> {
                match data {
                    ImageData::$variant(array) => Ok(array),
                    other => Err(other),
                }
            }
        }
    };
    ($ty:ty, $variant:ident, $read:ident, $write:ident) => {
        impl_element!(
            $ty,
            $variant,
            |src, dst| E::$read(src, dst),
            |src, dst| E::$write(src, dst)
        );
    };
}

impl_element!(
    u8,
    UInt8,
    |src, dst| dst.copy_from_slice(src),
    |src, dst| dst.copy_from_slice(src)
);
impl_element!(
    i8,
    Int8,
    |src, dst| dst.copy_from_slice(bytemuck::cast_slice(src)),
    |src, dst| dst.copy_from_slice(bytemuck::cast_slice(src))
);
impl_element!(i16, Int16, read_i16_into, write_i16_into);
impl_element!(u16, UInt16, read_u16_into, write_u16_into);
impl_element!(i32, Int32, read_i32_into, write_i32_into);
impl_element!(u32, UInt32, read_u32_into, write_u32_into);
impl_element!(i64, Int64, read_i64_into, write_i64_into);
impl_element!(u64, UInt64, read_u64_into, write_u64_into);
impl_element!(f32, Float32, read_f32_into, write_f32_into);
impl_element!(f64, Float64, read_f64_into, write_f64_into);

fn decode_array<T: MetaElement>(
    bytes: &[u8],
    shape: &[usize],
    big_endian: bool,
) -> Result<ArrayD<T>> {
    let size = std::mem::size_of::<T>();
    if bytes.len() % size != 0 {
        return Err(Error::ShapeMismatch(format!(
            "{} bytes is not a whole number of {}-byte elements",
            bytes.len(),
            size
        )));
    }
    let mut values = vec![T::default(); bytes.len() / size];
    if big_endian {
        T::decode_into::<BigEndian>(bytes, &mut values);
    } else {
        T::decode_into::<LittleEndian>(bytes, &mut values);
    }
    ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|e| {
        Error::ShapeMismatch(format!("cannot reshape payload to {shape:?}: {e}"))
    })
}

fn encode_array<T: MetaElement>(array: &ArrayD<T>, big_endian: bool) -> Vec<u8> {
    let owned;
    let values = match array.as_slice() {
        Some(values) => values,
        None => {
            owned = array.iter().copied().collect::<Vec<_>>();
            &owned[..]
        }
    };
    let mut bytes = vec![0u8; std::mem::size_of_val(values)];
    if big_endian {
        T::encode_into::<BigEndian>(values, &mut bytes);
    } else {
        T::encode_into::<LittleEndian>(values, &mut bytes);
    }
    bytes
}

impl ImageData {
    /// Wrap a typed array.
    pub fn from_array<T: MetaElement>(array: ArrayD<T>) -> Self {
        T::wrap(array)
    }

    /// Array shape (C order).
    pub fn shape(&self) -> &[usize] {
        with_array!(self, array => array.shape())
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Total voxel count.
    pub fn len(&self) -> usize {
        with_array!(self, array => array.len())
    }

    /// True when the array holds no voxels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow as a typed array.
    pub fn as_array<T: MetaElement>(&self) -> Option<&ArrayD<T>> {
        T::peek(self)
    }

    /// Convert into a typed array, failing if the element type differs.
    pub fn into_array<T: MetaElement>(self) -> Result<ArrayD<T>> {
        T::take(self).map_err(|other| Error::DataTypeMismatch {
            expected: T::ELEMENT_TYPE.type_name(),
            actual: other.element_type().type_name(),
        })
    }

    /// Numeric cast (`as` semantics) to another element type.
    pub fn cast(&self, target: ElementType) -> ImageData {
        if target == self.element_type() {
            return self.clone();
        }
        with_array!(self, array => cast_to(array, target))
    }

    /// Sub-array at `index` along the first (slowest) axis.
    pub(crate) fn outer_slice(&self, index: usize) -> ImageData {
        map_array!(self, array => array.index_axis(Axis(0), index).to_owned())
    }

    /// Raw payload bytes in C order.
    pub(crate) fn to_bytes(&self, big_endian: bool) -> Vec<u8> {
        with_array!(self, array => encode_array(array, big_endian))
    }

    /// Decode raw payload bytes.
    pub(crate) fn from_bytes(
        bytes: &[u8],
        element_type: ElementType,
        shape: &[usize],
        big_endian: bool,
    ) -> Result<ImageData> {
        decode_as(bytes, element_type, shape, big_endian)
    }
}

impl<T: MetaElement> From<ArrayD<T>> for ImageData {
    fn from(array: ArrayD<T>) -> Self {
        T::wrap(array)
    }
}

/// Copy-on-write memory mapping of an uncompressed, native-order payload.
///
/// Writes through [`MappedImage::view_mut`] stay private to the mapping and
/// never reach the file.
#[derive(Debug)]
pub struct MappedImage {
    map: Option<MmapMut>,
    element_type: ElementType,
    shape: Vec<usize>,
    offset: u64,
}

impl MappedImage {
    pub(crate) fn new(
        map: Option<MmapMut>,
        element_type: ElementType,
        shape: Vec<usize>,
        offset: u64,
    ) -> Self {
        Self {
            map,
            element_type,
            shape,
            offset,
        }
    }

    /// Element type of the mapped voxels.
    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// Array shape (C order).
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Byte offset of the payload within its file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Mapped payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    fn check_type<T: MetaElement>(&self) -> Result<()> {
        if T::ELEMENT_TYPE != self.element_type {
            return Err(Error::DataTypeMismatch {
                expected: T::ELEMENT_TYPE.type_name(),
                actual: self.element_type.type_name(),
            });
        }
        Ok(())
    }

    fn misaligned<T: MetaElement>(&self) -> Error {
        Error::MisalignedMapping {
            offset: self.offset,
            type_name: T::ELEMENT_TYPE.type_name(),
        }
    }

    /// Zero-copy typed view.
    pub fn view<T: MetaElement>(&self) -> Result<ArrayViewD<'_, T>> {
        self.check_type::<T>()?;
        let values: &[T] =
            bytemuck::try_cast_slice(self.as_bytes()).map_err(|_| self.misaligned::<T>())?;
        ArrayViewD::from_shape(IxDyn(&self.shape), values)
            .map_err(|e| Error::ShapeMismatch(e.to_string()))
    }

    /// Zero-copy mutable typed view (copy-on-write).
    pub fn view_mut<T: MetaElement>(&mut self) -> Result<ArrayViewMutD<'_, T>> {
        self.check_type::<T>()?;
        let misaligned = self.misaligned::<T>();
        let bytes: &mut [u8] = match self.map.as_deref_mut() {
            Some(bytes) => bytes,
            None => &mut [],
        };
        let values: &mut [T] = bytemuck::try_cast_slice_mut(bytes).map_err(|_| misaligned)?;
        ArrayViewMutD::from_shape(IxDyn(&self.shape), values)
            .map_err(|e| Error::ShapeMismatch(e.to_string()))
    }

    /// Copy the mapped voxels into an owned array.
    pub fn to_image_data(&self) -> Result<ImageData> {
        ImageData::from_bytes(
            self.as_bytes(),
            self.element_type,
            &self.shape,
            cfg!(target_endian = "big"),
        )
    }
}

/// Voxel data returned by a read: buffered or memory-mapped.
#[derive(Debug)]
pub enum Volume {
    /// Owned, decoded array.
    Loaded(ImageData),
    /// Memory-mapped payload.
    Mapped(MappedImage),
}

impl Volume {
    /// Array shape (C order).
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Loaded(data) => data.shape(),
            Self::Mapped(map) => map.shape(),
        }
    }

    /// Element type of the voxels.
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Loaded(data) => data.element_type(),
            Self::Mapped(map) => map.element_type(),
        }
    }

    /// Owned array, copying out of a mapping if needed.
    pub fn into_image_data(self) -> Result<ImageData> {
        match self {
            Self::Loaded(data) => Ok(data),
            Self::Mapped(map) => map.to_image_data(),
        }
    }

    /// The buffered array, if this volume is not mapped.
    pub fn as_loaded(&self) -> Option<&ImageData> {
        match self {
            Self::Loaded(data) => Some(data),
            Self::Mapped(_) => None,
        }
    }

    /// The mapping, if this volume is mapped.
    pub fn as_mapped(&self) -> Option<&MappedImage> {
        match self {
            Self::Loaded(_) => None,
            Self::Mapped(map) => Some(map),
        }
    }
}
