//! Named tensor declarations produced by the network loader.
//!
//! A [`Data`] keeps two views of the same tensor: the [`TensorDesc`] with
//! dims in caller (outer-to-inner) order, and a legacy view that caches
//! precision, layout and the dims reversed (inner-to-outer). Both views are
//! written together; reads check that they still agree.

use crate::error::{ForgeError, ForgeResult};
use crate::tensor::{create_blob, Blob, Layout, Precision, TensorDesc};

#[derive(Debug, Clone, PartialEq)]
pub struct Data {
    name: String,
    desc: TensorDesc,
    /// Legacy precision cache, `Unspecified` when not set
    precision: Precision,
    /// Legacy layout cache, `Any` when not set
    layout: Layout,
    /// Legacy dims view, inner-to-outer
    reversed_dims: Vec<usize>,
}

impl Data {
    /// Declaration without dims.
    pub fn new(name: impl Into<String>, precision: Precision, layout: Layout) -> Self {
        Self {
            name: name.into(),
            desc: TensorDesc::unshaped(precision, layout),
            precision,
            layout,
            reversed_dims: Vec::new(),
        }
    }

    /// Declaration with dims given in outer-to-inner order.
    pub fn with_dims(
        name: impl Into<String>,
        dims: Vec<usize>,
        precision: Precision,
        layout: Layout,
    ) -> Self {
        let reversed_dims = dims.iter().rev().copied().collect();
        Self {
            name: name.into(),
            desc: TensorDesc::new(precision, dims, layout),
            precision,
            layout,
            reversed_dims,
        }
    }

    pub fn from_desc(name: impl Into<String>, desc: TensorDesc) -> Self {
        let reversed_dims = desc.dims.iter().rev().copied().collect();
        Self {
            name: name.into(),
            precision: desc.precision,
            layout: desc.layout,
            reversed_dims,
            desc,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Own cached precision when set, else the descriptor's.
    pub fn precision(&self) -> Precision {
        if self.precision.is_specified() {
            return self.precision;
        }
        self.desc.precision
    }

    /// Own cached layout when set, else the descriptor's.
    pub fn layout(&self) -> Layout {
        if !self.layout.is_any() {
            return self.layout;
        }
        self.desc.layout
    }

    pub fn set_precision(&mut self, precision: Precision) {
        self.precision = precision;
        self.desc.precision = precision;
    }

    pub fn set_layout(&mut self, layout: Layout) {
        self.layout = layout;
        self.desc.layout = layout;
    }

    /// Rewrite both dims views from outer-to-inner `dims`.
    pub fn set_dims(&mut self, dims: Vec<usize>) {
        self.reversed_dims = dims.iter().rev().copied().collect();
        self.desc.dims = dims;
    }

    /// Change the outermost dim only; no-op when there are no dims.
    pub fn set_batch_size(&mut self, batch: usize) {
        if self.reversed_dims.is_empty() {
            self.reversed_dims = self.desc.dims.iter().rev().copied().collect();
        }
        let Some(outermost) = self.reversed_dims.last_mut() else {
            return;
        };
        *outermost = batch;
        self.desc.dims = self.reversed_dims.iter().rev().copied().collect();
    }

    /// Dims in outer-to-inner order, checked against the reversed view.
    pub fn dims(&self) -> ForgeResult<&[usize]> {
        let agree = self.desc.dims.len() == self.reversed_dims.len()
            && self
                .desc
                .dims
                .iter()
                .zip(self.reversed_dims.iter().rev())
                .all(|(a, b)| a == b);
        if !agree {
            return Err(self.inconsistent(format!(
                "dims {:?} disagree with reversed view {:?}",
                self.desc.dims, self.reversed_dims
            )));
        }
        Ok(&self.desc.dims)
    }

    /// Dims in inner-to-outer order.
    pub fn reversed_dims(&self) -> &[usize] {
        &self.reversed_dims
    }

    pub fn is_initialized(&self) -> bool {
        !self.reversed_dims.is_empty() || !self.desc.dims.is_empty()
    }

    /// Fail when the descriptor lost state the legacy view still holds.
    pub fn validate(&self) -> ForgeResult<()> {
        if self.desc.dims.is_empty() && !self.reversed_dims.is_empty() {
            return Err(self.inconsistent("descriptor dims are empty".to_string()));
        }
        if self.desc.layout.is_any() && !self.layout.is_any() {
            return Err(self.inconsistent(format!(
                "descriptor layout is ANY but legacy layout is {}",
                self.layout
            )));
        }
        if !self.desc.precision.is_specified() && self.precision.is_specified() {
            return Err(self.inconsistent(format!(
                "descriptor precision is unset but legacy precision is {}",
                self.precision
            )));
        }
        Ok(())
    }

    /// Validated descriptor.
    pub fn tensor_desc(&self) -> ForgeResult<&TensorDesc> {
        self.validate()?;
        Ok(&self.desc)
    }

    /// Descriptor with precision and layout taken through the two-level
    /// lookup and dims checked against the reversed view.
    pub fn effective_desc(&self) -> ForgeResult<TensorDesc> {
        self.validate()?;
        let dims = self.dims()?.to_vec();
        Ok(TensorDesc::new(self.precision(), dims, self.layout()))
    }

    /// Raw access to the descriptor. Bypasses the legacy fields.
    pub fn descriptor_mut(&mut self) -> &mut TensorDesc {
        &mut self.desc
    }

    pub fn create_blob(&self) -> ForgeResult<Blob> {
        let desc = self.effective_desc()?;
        if !desc.precision.is_specified() {
            return Err(ForgeError::UnspecifiedPrecision(format!(
                "tensor '{}'",
                self.name
            )));
        }
        create_blob(&desc)
    }

    fn inconsistent(&self, reason: String) -> ForgeError {
        ForgeError::InconsistentDescriptor {
            name: self.name.clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_dims_stores_reversed_view() {
        let data = Data::with_dims("x", vec![1, 3, 224, 224], Precision::FP32, Layout::NCHW);
        assert_eq!(data.dims().unwrap(), &[1, 3, 224, 224]);
        assert_eq!(data.reversed_dims(), &[224, 224, 3, 1]);
    }

    #[test]
    fn test_set_batch_size_touches_outermost_only() {
        let mut data = Data::with_dims("x", vec![1, 3, 8, 8], Precision::FP32, Layout::NCHW);
        data.set_batch_size(4);
        assert_eq!(data.dims().unwrap(), &[4, 3, 8, 8]);
        assert_eq!(data.reversed_dims(), &[8, 8, 3, 4]);
    }

    #[test]
    fn test_set_batch_size_empty_is_noop() {
        let mut data = Data::new("x", Precision::FP32, Layout::Any);
        data.set_batch_size(8);
        assert!(data.dims().unwrap().is_empty());
        assert!(!data.is_initialized());
    }

    #[test]
    fn test_own_fields_take_priority() {
        let mut data = Data::with_dims("x", vec![2, 2], Precision::FP32, Layout::NC);
        data.descriptor_mut().precision = Precision::U8;
        data.descriptor_mut().layout = Layout::Plain;
        assert_eq!(data.precision(), Precision::FP32);
        assert_eq!(data.layout(), Layout::NC);
    }

    #[test]
    fn test_fallback_to_descriptor() {
        let mut data = Data::new("x", Precision::Unspecified, Layout::Any);
        data.descriptor_mut().precision = Precision::FP16;
        data.descriptor_mut().layout = Layout::NHWC;
        assert_eq!(data.precision(), Precision::FP16);
        assert_eq!(data.layout(), Layout::NHWC);
        assert!(data.validate().is_ok());
    }

    #[test]
    fn test_validate_detects_lost_descriptor_state() {
        let mut data = Data::with_dims("x", vec![2, 2], Precision::FP32, Layout::NC);
        data.descriptor_mut().layout = Layout::Any;
        assert!(matches!(
            data.validate(),
            Err(ForgeError::InconsistentDescriptor { .. })
        ));

        let mut data = Data::with_dims("x", vec![2, 2], Precision::FP32, Layout::NC);
        data.descriptor_mut().precision = Precision::Unspecified;
        assert!(data.tensor_desc().is_err());

        let mut data = Data::with_dims("x", vec![2, 2], Precision::FP32, Layout::NC);
        data.descriptor_mut().dims.clear();
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_divergent_dims_fail_on_read() {
        let mut data = Data::with_dims("x", vec![1, 3], Precision::FP32, Layout::NC);
        data.descriptor_mut().dims = vec![1, 4];
        assert!(matches!(
            data.dims(),
            Err(ForgeError::InconsistentDescriptor { .. })
        ));
    }

    #[test]
    fn test_create_blob_unset_precision() {
        let data = Data::with_dims("x", vec![3], Precision::Unspecified, Layout::C);
        assert!(matches!(
            data.create_blob(),
            Err(ForgeError::UnspecifiedPrecision(_))
        ));
    }
}
