//! Materialized tensor storage.

use crate::error::{ForgeError, ForgeResult};
use crate::tensor::precision::saturate_u8;
use crate::tensor::{Precision, StorageKind, TensorDesc};

/// Typed element buffer. The element width is fixed by the precision that
/// created it: 4-byte floats, 2-byte words or bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    F32(Vec<f32>),
    I16(Vec<i16>),
    U8(Vec<u8>),
}

impl Default for Storage {
    fn default() -> Self {
        Storage::F32(Vec::new())
    }
}

impl Storage {
    /// Zero-filled storage of `len` elements of the given kind.
    pub fn zeroed(kind: StorageKind, len: usize) -> Self {
        match kind {
            StorageKind::F32 => Storage::F32(vec![0.0; len]),
            StorageKind::I16 => Storage::I16(vec![0; len]),
            StorageKind::U8 => Storage::U8(vec![0; len]),
        }
    }

    pub fn kind(&self) -> StorageKind {
        match self {
            Storage::F32(_) => StorageKind::F32,
            Storage::I16(_) => StorageKind::I16,
            Storage::U8(_) => StorageKind::U8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Storage::F32(v) => v.len(),
            Storage::I16(v) => v.len(),
            Storage::U8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_size(&self) -> usize {
        self.kind().element_size()
    }

    pub fn byte_size(&self) -> usize {
        self.len() * self.element_size()
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            Storage::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32_mut(&mut self) -> Option<&mut [f32]> {
        match self {
            Storage::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<&[i16]> {
        match self {
            Storage::I16(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match self {
            Storage::U8(v) => Some(v),
            _ => None,
        }
    }

    /// Element `index` decoded to f32 under `precision`.
    #[inline]
    pub fn get_f32(&self, index: usize, precision: Precision) -> f32 {
        match self {
            Storage::F32(v) => v[index],
            Storage::I16(v) => precision.decode_i16(v[index]),
            Storage::U8(v) => v[index] as f32,
        }
    }

    /// Encode `value` under `precision` into element `index`.
    #[inline]
    pub fn set_f32(&mut self, index: usize, value: f32, precision: Precision) {
        match self {
            Storage::F32(v) => v[index] = value,
            Storage::I16(v) => v[index] = precision.encode_i16(value),
            Storage::U8(v) => v[index] = saturate_u8(value),
        }
    }

    /// Same-kind element copy. Returns false when kinds or lengths differ.
    pub fn copy_from(&mut self, src: &Storage) -> bool {
        match (self, src) {
            (Storage::F32(d), Storage::F32(s)) if d.len() == s.len() => d.copy_from_slice(s),
            (Storage::I16(d), Storage::I16(s)) if d.len() == s.len() => d.copy_from_slice(s),
            (Storage::U8(d), Storage::U8(s)) if d.len() == s.len() => d.copy_from_slice(s),
            _ => return false,
        }
        true
    }
}

/// Storage sized to a [`TensorDesc`]. Owned by whoever creates it.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    desc: TensorDesc,
    storage: Storage,
}

/// Materialize zeroed storage for `desc`, resolving `Any` layout first.
pub fn create_blob(desc: &TensorDesc) -> ForgeResult<Blob> {
    let desc = desc.resolve();
    let kind = desc.precision.storage_kind().ok_or_else(|| {
        ForgeError::UnspecifiedPrecision(format!("blob of dims {:?}", desc.dims))
    })?;
    let storage = Storage::zeroed(kind, desc.element_count());
    Ok(Blob { desc, storage })
}

impl Blob {
    pub fn new(desc: &TensorDesc) -> ForgeResult<Self> {
        create_blob(desc)
    }

    /// Blob holding `values` encoded under the descriptor's precision.
    /// Values are taken in memory order of the resolved layout.
    pub fn from_f32(desc: &TensorDesc, values: &[f32]) -> ForgeResult<Self> {
        let mut blob = create_blob(desc)?;
        blob.write_f32(values)?;
        Ok(blob)
    }

    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }

    pub fn precision(&self) -> Precision {
        self.desc.precision
    }

    pub fn dims(&self) -> &[usize] {
        &self.desc.dims
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn element_size(&self) -> usize {
        self.storage.element_size()
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut Storage {
        &mut self.storage
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        self.storage.as_f32()
    }

    pub fn as_f32_mut(&mut self) -> Option<&mut [f32]> {
        self.storage.as_f32_mut()
    }

    /// All elements decoded to f32, in memory order.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        (0..self.len())
            .map(|i| self.storage.get_f32(i, self.desc.precision))
            .collect()
    }

    /// Overwrite all elements from f32 values, in memory order.
    pub fn write_f32(&mut self, values: &[f32]) -> ForgeResult<()> {
        if values.len() != self.len() {
            return Err(ForgeError::ShapeMismatch {
                name: format!("blob {}", self.desc),
                expected: self.len(),
                actual: values.len(),
            });
        }
        let precision = self.desc.precision;
        for (i, &v) in values.iter().enumerate() {
            self.storage.set_f32(i, v, precision);
        }
        Ok(())
    }
}
