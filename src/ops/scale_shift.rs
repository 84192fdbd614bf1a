//! Per-channel affine transform: `y = x * w[c] + b[c]`.
//!
//! `weights` and `biases` are optional layer blobs (at least one must be
//! present). A blob holding a single value is broadcast over all channels.

use rayon::prelude::*;

use crate::error::ForgeResult;
use crate::graph::network::Layer;
use crate::ops::factory::expect_ports;
use crate::ops::{
    elementwise_candidates, ensure_fp32_outputs, ensure_same_dims, f32_input, f32_output,
    offset_map, Kernel, KernelContext, OpContext, Operator, OperatorKind, PrimitiveDesc,
};
use crate::param_error;
use crate::tensor::Storage;

/// Element count above which the kernel splits work across the pool.
const PARALLEL_THRESHOLD: usize = 1 << 14;

#[derive(Debug)]
pub struct ScaleShiftOp {
    name: String,
    weights: Option<Vec<f32>>,
    biases: Option<Vec<f32>>,
}

impl ScaleShiftOp {
    pub fn new(name: impl Into<String>, weights: Option<Vec<f32>>, biases: Option<Vec<f32>>) -> Self {
        Self {
            name: name.into(),
            weights,
            biases,
        }
    }

    pub fn from_layer(layer: &Layer) -> ForgeResult<Box<dyn Operator>> {
        expect_ports(layer, 1..=1, 1)?;
        let weights = layer.blob("weights").map(|b| b.to_f32_vec());
        let biases = layer.blob("biases").map(|b| b.to_f32_vec());
        if weights.is_none() && biases.is_none() {
            return Err(param_error!(layer.name, "weights", "neither weights nor biases given"));
        }
        for (param, values) in [("weights", &weights), ("biases", &biases)] {
            if values.as_ref().is_some_and(|v| v.is_empty()) {
                return Err(param_error!(layer.name, param, "blob is empty"));
            }
        }
        Ok(Box::new(ScaleShiftOp::new(layer.name.clone(), weights, biases)))
    }

    /// Expand a parameter blob to one value per channel.
    fn per_channel(&self, param: &str, values: Option<&Vec<f32>>, fill: f32, channels: usize) -> ForgeResult<Vec<f32>> {
        match values {
            None => Ok(vec![fill; channels]),
            Some(v) if v.len() == 1 => Ok(vec![v[0]; channels]),
            Some(v) if v.len() == channels => Ok(v.clone()),
            Some(v) => Err(param_error!(
                self.name,
                param,
                "{} values for {} channels",
                v.len(),
                channels
            )),
        }
    }
}

impl Operator for ScaleShiftOp {
    fn kind(&self) -> OperatorKind {
        OperatorKind::ScaleShift
    }

    fn supported_primitives(&self, ctx: &OpContext<'_>) -> ForgeResult<Vec<PrimitiveDesc>> {
        ensure_same_dims(ctx)?;
        ensure_fp32_outputs(ctx)?;
        let rank = ctx.inputs.first().map(|d| d.rank()).unwrap_or(0);
        Ok(elementwise_candidates(1, rank))
    }

    fn create_kernel(
        &self,
        _selected: &PrimitiveDesc,
        ctx: &KernelContext<'_>,
    ) -> ForgeResult<Box<dyn Kernel>> {
        let (input, output) = match (ctx.inputs.first(), ctx.outputs.first()) {
            (Some(i), Some(o)) => (i, o),
            _ => return Err(crate::internal_error!("scale shift '{}' is not connected", ctx.node)),
        };
        let output = output.resolve();
        let (channels, channel_stride) = match output.layout.channel_axis(output.rank()) {
            Some(axis) => (output.dims[axis], output.strides()[axis]),
            None => (1, 1),
        };
        Ok(Box::new(ScaleShiftKernel {
            node: ctx.node.to_string(),
            weights: self.per_channel("weights", self.weights.as_ref(), 1.0, channels)?,
            biases: self.per_channel("biases", self.biases.as_ref(), 0.0, channels)?,
            channel_stride,
            gather: offset_map(input, &output),
        }))
    }
}

#[derive(Debug)]
struct ScaleShiftKernel {
    node: String,
    weights: Vec<f32>,
    biases: Vec<f32>,
    channel_stride: usize,
    gather: Option<Vec<usize>>,
}

impl ScaleShiftKernel {
    #[inline]
    fn apply(&self, pos: usize, x: f32) -> f32 {
        let c = (pos / self.channel_stride) % self.weights.len();
        x * self.weights[c] + self.biases[c]
    }
}

impl Kernel for ScaleShiftKernel {
    fn execute(&self, inputs: &[&Storage], outputs: &mut [Storage]) -> ForgeResult<()> {
        let src = f32_input(&self.node, inputs[0])?;
        let dst = f32_output(&self.node, &mut outputs[0])?;
        let read = |pos: usize| match &self.gather {
            None => src[pos],
            Some(map) => src[map[pos]],
        };
        if dst.len() >= PARALLEL_THRESHOLD {
            dst.par_iter_mut()
                .enumerate()
                .for_each(|(pos, d)| *d = self.apply(pos, read(pos)));
        } else {
            for (pos, d) in dst.iter_mut().enumerate() {
                *d = self.apply(pos, read(pos));
            }
        }
        Ok(())
    }
}
