//! Numeric precision of tensor storage.

use half::f16;
use serde::Serialize;

/// Element type and width of a tensor's storage.
///
/// `Unspecified` is a transient state; it must be resolved before any
/// storage is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Precision {
    #[default]
    Unspecified,
    FP32,
    FP16,
    I16,
    /// Signed 8.8 fixed point
    Q78,
    U8,
}

/// Physical element type backing a precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StorageKind {
    F32,
    I16,
    U8,
}

impl StorageKind {
    pub fn element_size(self) -> usize {
        match self {
            StorageKind::F32 => 4,
            StorageKind::I16 => 2,
            StorageKind::U8 => 1,
        }
    }
}

impl Precision {
    pub fn is_specified(self) -> bool {
        self != Precision::Unspecified
    }

    /// Storage class selected by this precision, `None` while unspecified.
    pub fn storage_kind(self) -> Option<StorageKind> {
        match self {
            Precision::FP32 => Some(StorageKind::F32),
            Precision::FP16 | Precision::I16 | Precision::Q78 => Some(StorageKind::I16),
            Precision::U8 => Some(StorageKind::U8),
            Precision::Unspecified => None,
        }
    }

    /// Size of one element in bytes, `None` while unspecified.
    pub fn element_size(self) -> Option<usize> {
        self.storage_kind().map(StorageKind::element_size)
    }

    pub fn name(self) -> &'static str {
        match self {
            Precision::Unspecified => "UNSPECIFIED",
            Precision::FP32 => "FP32",
            Precision::FP16 => "FP16",
            Precision::I16 => "I16",
            Precision::Q78 => "Q78",
            Precision::U8 => "U8",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "FP32" | "F32" => Some(Precision::FP32),
            "FP16" | "F16" => Some(Precision::FP16),
            "I16" => Some(Precision::I16),
            "Q78" => Some(Precision::Q78),
            "U8" => Some(Precision::U8),
            "UNSPECIFIED" => Some(Precision::Unspecified),
            _ => None,
        }
    }

    /// Encode an f32 value into a 2-byte element of this precision.
    pub fn encode_i16(self, value: f32) -> i16 {
        match self {
            Precision::FP16 => f16::from_f32(value).to_bits() as i16,
            Precision::Q78 => saturate_i16(value * 256.0),
            _ => saturate_i16(value),
        }
    }

    /// Decode a 2-byte element of this precision into f32.
    pub fn decode_i16(self, raw: i16) -> f32 {
        match self {
            Precision::FP16 => f16::from_bits(raw as u16).to_f32(),
            Precision::Q78 => raw as f32 / 256.0,
            _ => raw as f32,
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

fn saturate_i16(value: f32) -> i16 {
    value.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

pub(crate) fn saturate_u8(value: f32) -> u8 {
    value.round().clamp(0.0, u8::MAX as f32) as u8
}
