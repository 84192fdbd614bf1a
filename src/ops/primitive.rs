//! Primitive descriptors: the (layout, precision) combinations an operator
//! can execute under, one config per port.

use serde::Serialize;

use crate::tensor::{Layout, Precision, TensorDesc};

/// Format of one input or output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PortConfig {
    pub layout: Layout,
    pub precision: Precision,
}

impl PortConfig {
    pub fn new(layout: Layout, precision: Precision) -> Self {
        Self { layout, precision }
    }

    pub fn of(desc: &TensorDesc) -> Self {
        Self::new(desc.layout, desc.precision)
    }

    /// Whether data in `other`'s format can be used by this port without
    /// conversion. `Any` layout and unspecified precision accept anything.
    pub fn agrees_with(&self, other: &PortConfig) -> bool {
        let layout_ok =
            self.layout.is_any() || other.layout.is_any() || self.layout == other.layout;
        let precision_ok = !self.precision.is_specified()
            || !other.precision.is_specified()
            || self.precision == other.precision;
        layout_ok && precision_ok
    }
}

/// Implementation family, also the tie-break priority (first wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ImplType {
    Native,
    Reference,
    Unknown,
}

impl ImplType {
    pub fn name(self) -> &'static str {
        match self {
            ImplType::Native => "native",
            ImplType::Reference => "ref",
            ImplType::Unknown => "unknown",
        }
    }
}

/// One executable combination of port formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimitiveDesc {
    pub impl_type: ImplType,
    pub inputs: Vec<PortConfig>,
    pub outputs: Vec<PortConfig>,
}

impl PrimitiveDesc {
    pub fn new(impl_type: ImplType, inputs: Vec<PortConfig>, outputs: Vec<PortConfig>) -> Self {
        Self {
            impl_type,
            inputs,
            outputs,
        }
    }

    /// Same config on every input and output port.
    pub fn uniform(impl_type: ImplType, port: PortConfig, inputs: usize, outputs: usize) -> Self {
        Self::new(impl_type, vec![port; inputs], vec![port; outputs])
    }

    /// Label reported in profiling records, e.g. `ref_FP32`.
    pub fn exec_type(&self) -> String {
        let precision = self
            .outputs
            .first()
            .or_else(|| self.inputs.first())
            .map(|p| p.precision)
            .unwrap_or_default();
        format!("{}_{}", self.impl_type.name(), precision)
    }
}
