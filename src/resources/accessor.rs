//! Accessors, buffer views and raw buffers.
//!
//! An [`Accessor`] is a typed, strided window over the bytes of a [`Buffer`].
//! The first time a consumer asks for its contents the bytes are decoded
//! into an [`AccessorData`] (one `Vec` of the native component type) and
//! cached inside the accessor; a second cache holds the float-converted view
//! used by animation sampling and bounds computation. Both caches are filled
//! at most once for the lifetime of the document.

use std::cell::OnceCell;

use crate::errors::{KilnError, Result};

// ============================================================================
// Layout Enums
// ============================================================================

/// Scalar type of a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    U32,
    F32,
}

impl ComponentType {
    /// Maps the numeric glTF / GL enum (`5120..=5126`).
    #[must_use]
    pub fn from_gl(code: u32) -> Option<Self> {
        match code {
            5120 => Some(Self::I8),
            5121 => Some(Self::U8),
            5122 => Some(Self::I16),
            5123 => Some(Self::U16),
            5125 => Some(Self::U32),
            5126 => Some(Self::F32),
            _ => None,
        }
    }

    /// Size of one component in bytes.
    #[inline]
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::U32 | Self::F32 => 4,
        }
    }
}

/// Arity of one accessor element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl ElementType {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SCALAR" => Some(Self::Scalar),
            "VEC2" => Some(Self::Vec2),
            "VEC3" => Some(Self::Vec3),
            "VEC4" => Some(Self::Vec4),
            "MAT2" => Some(Self::Mat2),
            "MAT3" => Some(Self::Mat3),
            "MAT4" => Some(Self::Mat4),
            _ => None,
        }
    }

    /// Number of components per element.
    #[inline]
    #[must_use]
    pub fn components(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }
}

// ============================================================================
// Raw storage
// ============================================================================

/// A blob of binary data, already resolved by the loader.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    pub name: Option<String>,
    pub data: Vec<u8>,
}

impl Buffer {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { name: None, data }
    }
}

/// A contiguous slice of a [`Buffer`].
#[derive(Debug, Clone, Default)]
pub struct BufferView {
    pub buffer: usize,
    pub byte_offset: usize,
    pub byte_length: usize,
    /// Distance between the starts of consecutive elements. `None` means tightly packed.
    pub byte_stride: Option<usize>,
}

/// Sparse substitution applied on top of the dense accessor contents.
#[derive(Debug, Clone)]
pub struct SparseAccessor {
    pub count: usize,
    pub indices_view: usize,
    pub indices_byte_offset: usize,
    pub indices_component_type: ComponentType,
    pub values_view: usize,
    pub values_byte_offset: usize,
}

// ============================================================================
// Decoded data
// ============================================================================

/// Accessor contents decoded into their native component type.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessorData {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl AccessorData {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::I8(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw little-endian bytes, tightly packed, ready for upload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::I8(v) => bytemuck::cast_slice(v),
            Self::U8(v) => v,
            Self::I16(v) => bytemuck::cast_slice(v),
            Self::U16(v) => bytemuck::cast_slice(v),
            Self::U32(v) => bytemuck::cast_slice(v),
            Self::F32(v) => bytemuck::cast_slice(v),
        }
    }

    /// Converts every component to `f32`, optionally applying the glTF
    /// normalized-integer mapping.
    #[must_use]
    pub fn to_f32(&self, normalized: bool) -> Vec<f32> {
        match self {
            Self::I8(v) => v.iter().map(|&c| c.to_f32(normalized)).collect(),
            Self::U8(v) => v.iter().map(|&c| c.to_f32(normalized)).collect(),
            Self::I16(v) => v.iter().map(|&c| c.to_f32(normalized)).collect(),
            Self::U16(v) => v.iter().map(|&c| c.to_f32(normalized)).collect(),
            Self::U32(v) => v.iter().map(|&c| c.to_f32(normalized)).collect(),
            Self::F32(v) => v.clone(),
        }
    }

    /// Reads component `i` as an index value (for index buffers and joints).
    #[must_use]
    pub fn index_at(&self, i: usize) -> Option<u32> {
        match self {
            Self::U8(v) => v.get(i).map(|&x| u32::from(x)),
            Self::U16(v) => v.get(i).map(|&x| u32::from(x)),
            Self::U32(v) => v.get(i).copied(),
            _ => None,
        }
    }
}

trait Component: Copy + Default {
    const SIZE: usize;
    fn read_le(bytes: &[u8]) -> Self;
    fn to_f32(self, normalized: bool) -> f32;
}

macro_rules! impl_component {
    ($ty:ty, $norm:expr) => {
        impl Component for $ty {
            const SIZE: usize = std::mem::size_of::<$ty>();

            #[inline]
            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..Self::SIZE]);
                <$ty>::from_le_bytes(raw)
            }

            #[inline]
            fn to_f32(self, normalized: bool) -> f32 {
                let norm: fn($ty) -> f32 = $norm;
                if normalized { norm(self) } else { self as f32 }
            }
        }
    };
}

impl_component!(i8, |c| (f32::from(c) / 127.0).max(-1.0));
impl_component!(u8, |c| f32::from(c) / 255.0);
impl_component!(i16, |c| (f32::from(c) / 32767.0).max(-1.0));
impl_component!(u16, |c| f32::from(c) / 65535.0);
impl_component!(u32, |c| (f64::from(c) / f64::from(u32::MAX)) as f32);
impl_component!(f32, |c| c);

// ============================================================================
// Accessor
// ============================================================================

/// Typed view over buffer bytes describing one attribute / animation stream.
#[derive(Debug, Clone)]
pub struct Accessor {
    pub name: Option<String>,
    /// `None` means the accessor is all zeros (optionally patched by `sparse`).
    pub buffer_view: Option<usize>,
    pub byte_offset: usize,
    pub component_type: ComponentType,
    pub element_type: ElementType,
    pub count: usize,
    pub normalized: bool,
    pub min: Option<Vec<f32>>,
    pub max: Option<Vec<f32>>,
    pub sparse: Option<SparseAccessor>,

    typed: OnceCell<AccessorData>,
    floats: OnceCell<Vec<f32>>,
}

impl Accessor {
    #[must_use]
    pub fn new(
        buffer_view: Option<usize>,
        component_type: ComponentType,
        element_type: ElementType,
        count: usize,
    ) -> Self {
        Self {
            name: None,
            buffer_view,
            byte_offset: 0,
            component_type,
            element_type,
            count,
            normalized: false,
            min: None,
            max: None,
            sparse: None,
            typed: OnceCell::new(),
            floats: OnceCell::new(),
        }
    }

    /// Size of a single tightly packed element in bytes.
    #[inline]
    #[must_use]
    pub fn element_size(&self) -> usize {
        self.component_type.size() * self.element_type.components()
    }

    /// Total number of components (`count * arity`).
    #[inline]
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.count * self.element_type.components()
    }

    /// Whether the typed view has already been materialized.
    #[must_use]
    pub fn is_materialized(&self) -> bool {
        self.typed.get().is_some()
    }

    fn typed_view(
        &self,
        index: usize,
        views: &[BufferView],
        buffers: &[Buffer],
    ) -> Result<&AccessorData> {
        if let Some(data) = self.typed.get() {
            return Ok(data);
        }
        let data = self.materialize(index, views, buffers)?;
        Ok(self.typed.get_or_init(|| data))
    }

    fn float_view(&self, index: usize, views: &[BufferView], buffers: &[Buffer]) -> Result<&[f32]> {
        if let Some(data) = self.floats.get() {
            return Ok(data);
        }
        let floats = self.typed_view(index, views, buffers)?.to_f32(self.normalized);
        Ok(self.floats.get_or_init(|| floats))
    }

    fn materialize(
        &self,
        index: usize,
        views: &[BufferView],
        buffers: &[Buffer],
    ) -> Result<AccessorData> {
        let mut data = match self.component_type {
            ComponentType::I8 => AccessorData::I8(self.read_dense(index, views, buffers)?),
            ComponentType::U8 => AccessorData::U8(self.read_dense(index, views, buffers)?),
            ComponentType::I16 => AccessorData::I16(self.read_dense(index, views, buffers)?),
            ComponentType::U16 => AccessorData::U16(self.read_dense(index, views, buffers)?),
            ComponentType::U32 => AccessorData::U32(self.read_dense(index, views, buffers)?),
            ComponentType::F32 => AccessorData::F32(self.read_dense(index, views, buffers)?),
        };

        if let Some(sparse) = &self.sparse {
            self.apply_sparse(index, sparse, &mut data, views, buffers)?;
        }

        Ok(data)
    }

    fn read_dense<T: Component>(
        &self,
        index: usize,
        views: &[BufferView],
        buffers: &[Buffer],
    ) -> Result<Vec<T>> {
        let components = self.element_type.components();
        let Some(view_index) = self.buffer_view else {
            return Ok(vec![T::default(); self.count * components]);
        };

        let (bytes, stride) = resolve_view(index, view_index, views, buffers)?;
        let stride = stride.unwrap_or(self.element_size());
        read_strided(index, bytes, self.byte_offset, stride, self.count, components)
    }

    fn apply_sparse(
        &self,
        index: usize,
        sparse: &SparseAccessor,
        data: &mut AccessorData,
        views: &[BufferView],
        buffers: &[Buffer],
    ) -> Result<()> {
        let components = self.element_type.components();
        let (index_bytes, _) = resolve_view(index, sparse.indices_view, views, buffers)?;
        let targets: Vec<u32> = match sparse.indices_component_type {
            ComponentType::U8 => read_strided::<u8>(index, index_bytes, sparse.indices_byte_offset, 1, sparse.count, 1)?
                .into_iter()
                .map(u32::from)
                .collect(),
            ComponentType::U16 => read_strided::<u16>(index, index_bytes, sparse.indices_byte_offset, 2, sparse.count, 1)?
                .into_iter()
                .map(u32::from)
                .collect(),
            ComponentType::U32 => read_strided::<u32>(index, index_bytes, sparse.indices_byte_offset, 4, sparse.count, 1)?,
            other => {
                return Err(KilnError::InvalidAccessor {
                    accessor: index,
                    reason: format!("sparse indices cannot use {other:?}"),
                });
            }
        };

        let (value_bytes, _) = resolve_view(index, sparse.values_view, views, buffers)?;
        let element_size = self.element_size();

        macro_rules! patch {
            ($dense:expr) => {{
                let values = read_strided(
                    index,
                    value_bytes,
                    sparse.values_byte_offset,
                    element_size,
                    sparse.count,
                    components,
                )?;
                for (slot, &target) in targets.iter().enumerate() {
                    let dst = target as usize * components;
                    if dst + components > $dense.len() {
                        return Err(KilnError::InvalidAccessor {
                            accessor: index,
                            reason: format!("sparse index {target} exceeds count {}", self.count),
                        });
                    }
                    $dense[dst..dst + components]
                        .copy_from_slice(&values[slot * components..(slot + 1) * components]);
                }
            }};
        }

        match data {
            AccessorData::I8(dense) => patch!(dense),
            AccessorData::U8(dense) => patch!(dense),
            AccessorData::I16(dense) => patch!(dense),
            AccessorData::U16(dense) => patch!(dense),
            AccessorData::U32(dense) => patch!(dense),
            AccessorData::F32(dense) => patch!(dense),
        }
        Ok(())
    }
}

fn resolve_view<'a>(
    accessor: usize,
    view_index: usize,
    views: &[BufferView],
    buffers: &'a [Buffer],
) -> Result<(&'a [u8], Option<usize>)> {
    let view = views
        .get(view_index)
        .ok_or_else(|| KilnError::out_of_bounds(format!("accessor {accessor} buffer view"), view_index))?;
    let buffer = buffers
        .get(view.buffer)
        .ok_or_else(|| KilnError::out_of_bounds(format!("buffer view {view_index} buffer"), view.buffer))?;
    let end = view.byte_offset + view.byte_length;
    let bytes = buffer.data.get(view.byte_offset..end).ok_or_else(|| KilnError::InvalidAccessor {
        accessor,
        reason: format!(
            "buffer view {view_index} spans {}..{end} but buffer has {} bytes",
            view.byte_offset,
            buffer.data.len()
        ),
    })?;
    Ok((bytes, view.byte_stride))
}

fn read_strided<T: Component>(
    accessor: usize,
    bytes: &[u8],
    offset: usize,
    stride: usize,
    count: usize,
    components: usize,
) -> Result<Vec<T>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let last_end = offset + (count - 1) * stride + components * T::SIZE;
    if last_end > bytes.len() {
        return Err(KilnError::InvalidAccessor {
            accessor,
            reason: format!("needs {last_end} bytes, view has {}", bytes.len()),
        });
    }

    let mut out = Vec::with_capacity(count * components);
    for element in 0..count {
        let base = offset + element * stride;
        for c in 0..components {
            let at = base + c * T::SIZE;
            out.push(T::read_le(&bytes[at..at + T::SIZE]));
        }
    }
    Ok(out)
}

// ============================================================================
// AccessorReader
// ============================================================================

/// Borrowed view over the three tables needed to decode accessors.
///
/// Constructed from disjoint document fields so callers can keep a mutable
/// borrow of the node table alive at the same time.
#[derive(Clone, Copy)]
pub struct AccessorReader<'a> {
    pub accessors: &'a [Accessor],
    pub views: &'a [BufferView],
    pub buffers: &'a [Buffer],
}

impl<'a> AccessorReader<'a> {
    #[must_use]
    pub fn new(accessors: &'a [Accessor], views: &'a [BufferView], buffers: &'a [Buffer]) -> Self {
        Self {
            accessors,
            views,
            buffers,
        }
    }

    pub fn accessor(&self, index: usize) -> Result<&'a Accessor> {
        self.accessors
            .get(index)
            .ok_or_else(|| KilnError::out_of_bounds("accessor", index))
    }

    /// Decoded native-typed contents, materialized once.
    pub fn data(&self, index: usize) -> Result<&'a AccessorData> {
        self.accessor(index)?.typed_view(index, self.views, self.buffers)
    }

    /// Float contents with normalized integers mapped into `[-1, 1]` / `[0, 1]`.
    pub fn floats(&self, index: usize) -> Result<&'a [f32]> {
        self.accessor(index)?.float_view(index, self.views, self.buffers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader_fixture() -> (Vec<Accessor>, Vec<BufferView>, Vec<Buffer>) {
        // two interleaved vec2<f32> streams: a0 b0 a1 b1
        let floats: [f32; 8] = [1.0, 2.0, 10.0, 20.0, 3.0, 4.0, 30.0, 40.0];
        let buffers = vec![Buffer::new(bytemuck::cast_slice(&floats).to_vec())];
        let views = vec![BufferView {
            buffer: 0,
            byte_offset: 0,
            byte_length: 32,
            byte_stride: Some(16),
        }];
        let a = Accessor::new(Some(0), ComponentType::F32, ElementType::Vec2, 2);
        let mut b = Accessor::new(Some(0), ComponentType::F32, ElementType::Vec2, 2);
        b.byte_offset = 8;
        (vec![a, b], views, buffers)
    }

    #[test]
    fn strided_views_deinterleave() {
        let (accessors, views, buffers) = reader_fixture();
        let reader = AccessorReader::new(&accessors, &views, &buffers);

        assert_eq!(reader.floats(0).unwrap(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(reader.floats(1).unwrap(), &[10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn typed_view_is_cached() {
        let (accessors, views, buffers) = reader_fixture();
        let reader = AccessorReader::new(&accessors, &views, &buffers);

        assert!(!accessors[0].is_materialized());
        let first = reader.data(0).unwrap() as *const AccessorData;
        let second = reader.data(0).unwrap() as *const AccessorData;
        assert!(accessors[0].is_materialized());
        assert_eq!(first, second);
    }

    #[test]
    fn normalized_integers_map_to_unit_range() {
        let shorts: [i16; 2] = [32767, -32768];
        let buffers = vec![Buffer::new(bytemuck::cast_slice(&shorts).to_vec())];
        let views = vec![BufferView {
            buffer: 0,
            byte_offset: 0,
            byte_length: 4,
            byte_stride: None,
        }];
        let mut accessor = Accessor::new(Some(0), ComponentType::I16, ElementType::Scalar, 2);
        accessor.normalized = true;
        let accessors = vec![accessor];
        let reader = AccessorReader::new(&accessors, &views, &buffers);

        assert_eq!(reader.floats(0).unwrap(), &[1.0, -1.0]);
    }

    #[test]
    fn sparse_substitution_patches_dense_data() {
        let dense: [f32; 3] = [0.0, 0.0, 0.0];
        let indices: [u16; 1] = [2];
        let values: [f32; 1] = [7.5];
        let mut bytes = bytemuck::cast_slice(&dense).to_vec();
        bytes.extend_from_slice(bytemuck::cast_slice(&indices));
        bytes.extend_from_slice(&[0, 0]);
        bytes.extend_from_slice(bytemuck::cast_slice(&values));
        let buffers = vec![Buffer::new(bytes)];
        let views = vec![
            BufferView { buffer: 0, byte_offset: 0, byte_length: 12, byte_stride: None },
            BufferView { buffer: 0, byte_offset: 12, byte_length: 2, byte_stride: None },
            BufferView { buffer: 0, byte_offset: 16, byte_length: 4, byte_stride: None },
        ];
        let mut accessor = Accessor::new(Some(0), ComponentType::F32, ElementType::Scalar, 3);
        accessor.sparse = Some(SparseAccessor {
            count: 1,
            indices_view: 1,
            indices_byte_offset: 0,
            indices_component_type: ComponentType::U16,
            values_view: 2,
            values_byte_offset: 0,
        });
        let accessors = vec![accessor];
        let reader = AccessorReader::new(&accessors, &views, &buffers);

        assert_eq!(reader.floats(0).unwrap(), &[0.0, 0.0, 7.5]);
    }

    #[test]
    fn out_of_range_view_is_an_error() {
        let buffers = vec![Buffer::new(vec![0; 4])];
        let views = vec![BufferView { buffer: 0, byte_offset: 0, byte_length: 4, byte_stride: None }];
        let accessors = vec![Accessor::new(Some(0), ComponentType::F32, ElementType::Vec3, 1)];
        let reader = AccessorReader::new(&accessors, &views, &buffers);

        assert!(matches!(
            reader.data(0),
            Err(KilnError::InvalidAccessor { accessor: 0, .. })
        ));
    }
}
