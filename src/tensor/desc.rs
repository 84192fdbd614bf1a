//! Tensor descriptors.

use serde::Serialize;

use crate::tensor::{layout::Strides, Layout, Precision};

pub fn element_count(dims: &[usize]) -> usize {
    dims.iter().copied().product()
}

/// Shape, layout tag and precision of a tensor.
///
/// `dims` are in outer-to-inner logical order regardless of `layout`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct TensorDesc {
    pub precision: Precision,
    pub layout: Layout,
    pub dims: Vec<usize>,
}

impl TensorDesc {
    pub fn new(precision: Precision, dims: Vec<usize>, layout: Layout) -> Self {
        Self {
            precision,
            layout,
            dims,
        }
    }

    /// Descriptor without dims, as declared before shape inference.
    pub fn unshaped(precision: Precision, layout: Layout) -> Self {
        Self::new(precision, Vec::new(), layout)
    }

    /// Replace `Any` with the default dense layout for the rank.
    pub fn resolve(&self) -> TensorDesc {
        let mut resolved = self.clone();
        if resolved.layout.is_any() {
            resolved.layout = Layout::default_for_rank(resolved.dims.len());
        }
        resolved
    }

    pub fn is_resolved(&self) -> bool {
        self.precision.is_specified() && !self.layout.is_any()
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn element_count(&self) -> usize {
        element_count(&self.dims)
    }

    /// Bytes needed to store the tensor, `None` while precision is unset.
    pub fn byte_size(&self) -> Option<usize> {
        self.precision
            .element_size()
            .map(|size| self.element_count().saturating_mul(size))
    }

    /// Element strides per logical axis under the resolved layout.
    pub fn strides(&self) -> Strides {
        self.resolve().layout.strides(&self.dims)
    }

    /// Same logical tensor and memory image, ignoring layout tags that
    /// produce identical strides (e.g. `Any` vs its default).
    pub fn same_storage(&self, other: &TensorDesc) -> bool {
        self.precision == other.precision
            && self.dims == other.dims
            && self.strides() == other.strides()
    }
}

impl std::fmt::Display for TensorDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}{:?}", self.precision, self.layout, self.dims)
    }
}
