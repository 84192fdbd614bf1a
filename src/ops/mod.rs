//! Operator interface and built-in CPU operators.
//!
//! An [`Operator`] is created from a network layer by the [`NodeFactory`].
//! During compilation it lists the formats it supports and, once a format is
//! selected, creates a [`Kernel`] that the graph executes on every inference
//! pass. Kernels are stateless between calls: everything they read or write
//! lives in the buffers handed to [`Kernel::execute`].

use std::fmt;

use crate::config::GraphConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::tensor::{Storage, TensorDesc};

pub mod copy;
pub mod eltwise;
pub mod factory;
pub mod input;
pub mod output;
pub mod primitive;
pub mod relu;
pub mod reorder;
pub mod roi_pooling;
pub mod scale_shift;

pub use factory::{NodeFactory, OperatorCtor};
pub use primitive::{ImplType, PortConfig, PrimitiveDesc};

/// Operator kinds known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Input,
    Output,
    ScaleShift,
    ReLU,
    Eltwise,
    ROIPooling,
    Copy,
    Reorder,
    Unknown(String),
}

impl OperatorKind {
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "Input" => OperatorKind::Input,
            "Output" => OperatorKind::Output,
            "ScaleShift" => OperatorKind::ScaleShift,
            "ReLU" => OperatorKind::ReLU,
            "Eltwise" => OperatorKind::Eltwise,
            "ROIPooling" => OperatorKind::ROIPooling,
            "Copy" => OperatorKind::Copy,
            "Reorder" => OperatorKind::Reorder,
            other => OperatorKind::Unknown(other.to_string()),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            OperatorKind::Input => "Input",
            OperatorKind::Output => "Output",
            OperatorKind::ScaleShift => "ScaleShift",
            OperatorKind::ReLU => "ReLU",
            OperatorKind::Eltwise => "Eltwise",
            OperatorKind::ROIPooling => "ROIPooling",
            OperatorKind::Copy => "Copy",
            OperatorKind::Reorder => "Reorder",
            OperatorKind::Unknown(name) => name,
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Declared tensors seen by an operator while it enumerates formats.
#[derive(Debug, Clone, Copy)]
pub struct OpContext<'a> {
    pub node: &'a str,
    pub inputs: &'a [TensorDesc],
    pub outputs: &'a [TensorDesc],
}

/// Finalized tensors and configuration seen when a kernel is created.
#[derive(Debug, Clone, Copy)]
pub struct KernelContext<'a> {
    pub node: &'a str,
    pub inputs: &'a [TensorDesc],
    pub outputs: &'a [TensorDesc],
    pub config: &'a GraphConfig,
}

/// Operator-kind specific behaviour of a graph node.
pub trait Operator: Send + Sync + fmt::Debug {
    fn kind(&self) -> OperatorKind;

    /// Supported primitives in priority order, most specific first.
    fn supported_primitives(&self, ctx: &OpContext<'_>) -> ForgeResult<Vec<PrimitiveDesc>>;

    /// Instantiate the kernel for the selected primitive.
    fn create_kernel(
        &self,
        selected: &PrimitiveDesc,
        ctx: &KernelContext<'_>,
    ) -> ForgeResult<Box<dyn Kernel>>;
}

/// Executable kernel bound to a node.
///
/// `execute` must not allocate and writes only `outputs`.
pub trait Kernel: Send + Sync + fmt::Debug {
    fn execute(&self, inputs: &[&Storage], outputs: &mut [Storage]) -> ForgeResult<()>;
}

/// Kernel that does nothing; storage is filled or read by the graph.
#[derive(Debug, Default)]
pub struct NoopKernel;

impl Kernel for NoopKernel {
    fn execute(&self, _inputs: &[&Storage], _outputs: &mut [Storage]) -> ForgeResult<()> {
        Ok(())
    }
}

pub(crate) fn unsupported(node: &str, reason: impl Into<String>) -> ForgeError {
    ForgeError::UnsupportedFormat {
        node: node.to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn f32_input<'s>(node: &str, storage: &'s Storage) -> ForgeResult<&'s [f32]> {
    storage
        .as_f32()
        .ok_or_else(|| crate::internal_error!("node '{}' expected FP32 input storage", node))
}

pub(crate) fn f32_output<'s>(node: &str, storage: &'s mut Storage) -> ForgeResult<&'s mut [f32]> {
    storage
        .as_f32_mut()
        .ok_or_else(|| crate::internal_error!("node '{}' expected FP32 output storage", node))
}

/// Declared output dims must equal the first input's dims.
pub(crate) fn ensure_same_dims(ctx: &OpContext<'_>) -> ForgeResult<()> {
    let Some(input) = ctx.inputs.first() else {
        return Ok(());
    };
    for (port, output) in ctx.outputs.iter().enumerate() {
        if output.dims != input.dims {
            return Err(unsupported(
                ctx.node,
                format!(
                    "output {} dims {:?} differ from input dims {:?}",
                    port, output.dims, input.dims
                ),
            ));
        }
    }
    Ok(())
}

/// Compute precision for FP32-only operators: declared outputs must be FP32
/// or left unspecified.
pub(crate) fn ensure_fp32_outputs(ctx: &OpContext<'_>) -> ForgeResult<()> {
    use crate::tensor::Precision;
    for (port, output) in ctx.outputs.iter().enumerate() {
        if output.precision.is_specified() && output.precision != Precision::FP32 {
            return Err(unsupported(
                ctx.node,
                format!("output {} declared {}, only FP32 is computed", port, output.precision),
            ));
        }
    }
    Ok(())
}

/// Candidates shared by shape-preserving FP32 operators: the native dense
/// layouts for the rank, then a reference kernel accepting any layout.
pub(crate) fn elementwise_candidates(inputs: usize, rank: usize) -> Vec<PrimitiveDesc> {
    use crate::tensor::{Layout, Precision};

    let native: &[Layout] = if rank == 4 {
        &[Layout::NCHW, Layout::NHWC]
    } else {
        &[]
    };
    let mut candidates: Vec<PrimitiveDesc> = native
        .iter()
        .map(|&layout| {
            PrimitiveDesc::uniform(
                ImplType::Native,
                PortConfig::new(layout, Precision::FP32),
                inputs,
                1,
            )
        })
        .collect();
    if rank != 4 {
        candidates.push(PrimitiveDesc::uniform(
            ImplType::Native,
            PortConfig::new(Layout::default_for_rank(rank), Precision::FP32),
            inputs,
            1,
        ));
    }
    candidates.push(PrimitiveDesc::uniform(
        ImplType::Reference,
        PortConfig::new(crate::tensor::Layout::Any, Precision::FP32),
        inputs,
        1,
    ));
    candidates
}

/// For every memory position of `dst`, the memory position of the same
/// logical element in `src`. `None` when both share strides.
pub(crate) fn offset_map(src: &TensorDesc, dst: &TensorDesc) -> Option<Vec<usize>> {
    let src_strides = src.strides();
    let dst_strides = dst.strides();
    if src_strides == dst_strides {
        return None;
    }
    let dims = &dst.dims;
    let count = dst.element_count();
    let mut map = vec![0; count];
    let mut index: smallvec::SmallVec<[usize; 6]> = smallvec::SmallVec::from_elem(0, dims.len());
    for _ in 0..count {
        let src_offset: usize = index.iter().zip(&src_strides).map(|(i, s)| i * s).sum();
        let dst_offset: usize = index.iter().zip(&dst_strides).map(|(i, s)| i * s).sum();
        map[dst_offset] = src_offset;
        for axis in (0..dims.len()).rev() {
            index[axis] += 1;
            if index[axis] < dims[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    Some(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{Layout, Precision};

    #[test]
    fn test_elementwise_candidates_order() {
        let pds = elementwise_candidates(1, 4);
        let layouts: Vec<Layout> = pds.iter().map(|pd| pd.outputs[0].layout).collect();
        assert_eq!(layouts, vec![Layout::NCHW, Layout::NHWC, Layout::Any]);
        assert_eq!(pds[2].impl_type, ImplType::Reference);

        let pds = elementwise_candidates(2, 1);
        assert_eq!(pds[0].inputs.len(), 2);
        assert_eq!(pds[0].outputs[0].layout, Layout::C);
    }

    #[test]
    fn test_offset_map() {
        let nchw = TensorDesc::new(Precision::FP32, vec![1, 2, 1, 2], Layout::NCHW);
        let nhwc = nchw.clone().with_layout(Layout::NHWC);
        assert!(offset_map(&nchw, &nchw.clone().with_layout(Layout::Any)).is_none());
        // NHWC position 1 holds (c=1, w=0), which NCHW stores at 2
        assert_eq!(offset_map(&nchw, &nhwc).unwrap(), vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_kind_names_round_trip() {
        for name in ["Input", "Output", "ScaleShift", "ReLU", "Eltwise", "ROIPooling", "Copy"] {
            assert_eq!(OperatorKind::from_type_name(name).type_name(), name);
        }
        assert_eq!(
            OperatorKind::from_type_name("Convolution"),
            OperatorKind::Unknown("Convolution".to_string())
        );
    }
}
