//! Rectified linear unit with optional leaky slope.

use crate::error::ForgeResult;
use crate::graph::network::Layer;
use crate::ops::factory::expect_ports;
use crate::ops::{
    elementwise_candidates, ensure_fp32_outputs, ensure_same_dims, f32_input, f32_output,
    offset_map, Kernel, KernelContext, OpContext, Operator, OperatorKind, PrimitiveDesc,
};
use crate::tensor::Storage;

#[derive(Debug)]
pub struct ReluOp {
    negative_slope: f32,
}

impl ReluOp {
    pub fn new(negative_slope: f32) -> Self {
        Self { negative_slope }
    }

    pub fn from_layer(layer: &Layer) -> ForgeResult<Box<dyn Operator>> {
        expect_ports(layer, 1..=1, 1)?;
        let negative_slope = layer.param_or("negative_slope", 0.0f32)?;
        Ok(Box::new(ReluOp::new(negative_slope)))
    }
}

impl Operator for ReluOp {
    fn kind(&self) -> OperatorKind {
        OperatorKind::ReLU
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
            _ => return Err(crate::internal_error!("relu '{}' is not connected", ctx.node)),
        };
        Ok(Box::new(ReluKernel {
            node: ctx.node.to_string(),
            negative_slope: self.negative_slope,
            gather: offset_map(input, output),
        }))
    }
}

#[derive(Debug)]
struct ReluKernel {
    node: String,
    negative_slope: f32,
    gather: Option<Vec<usize>>,
}

impl Kernel for ReluKernel {
    fn execute(&self, inputs: &[&Storage], outputs: &mut [Storage]) -> ForgeResult<()> {
        let src = f32_input(&self.node, inputs[0])?;
        let dst = f32_output(&self.node, &mut outputs[0])?;
        let slope = self.negative_slope;
        let apply = |x: f32| if x > 0.0 { x } else { x * slope };
        match &self.gather {
            None => {
                for (d, &s) in dst.iter_mut().zip(src) {
                    *d = apply(s);
                }
            }
            Some(map) => {
                for (d, &offset) in dst.iter_mut().zip(map) {
                    *d = apply(src[offset]);
                }
            }
        }
        Ok(())
    }
}
