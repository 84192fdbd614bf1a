//! Layout/precision conversion node inserted by the compiler between a
//! producer and the consumers that selected a different format.

use crate::error::ForgeResult;
use crate::ops::{
    ImplType, Kernel, KernelContext, OpContext, Operator, OperatorKind, PortConfig, PrimitiveDesc,
};
use crate::tensor::{reorder::reorder, Storage, TensorDesc};

#[derive(Debug)]
pub struct ReorderOp {
    src: PortConfig,
    dst: PortConfig,
}

impl ReorderOp {
    pub fn new(src: PortConfig, dst: PortConfig) -> Self {
        Self { src, dst }
    }

    pub fn target(&self) -> PortConfig {
        self.dst
    }
}

impl Operator for ReorderOp {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Reorder
    }

    fn supported_primitives(&self, _ctx: &OpContext<'_>) -> ForgeResult<Vec<PrimitiveDesc>> {
        Ok(vec![PrimitiveDesc::new(
            ImplType::Reference,
            vec![self.src],
            vec![self.dst],
        )])
    }

    fn create_kernel(
        &self,
        _selected: &PrimitiveDesc,
        ctx: &KernelContext<'_>,
    ) -> ForgeResult<Box<dyn Kernel>> {
        match (ctx.inputs.first(), ctx.outputs.first()) {
            (Some(src), Some(dst)) => Ok(Box::new(ReorderKernel {
                src: src.resolve(),
                dst: dst.resolve(),
            })),
            _ => Err(crate::internal_error!("reorder '{}' is not connected", ctx.node)),
        }
    }
}

#[derive(Debug)]
struct ReorderKernel {
    src: TensorDesc,
    dst: TensorDesc,
}

impl Kernel for ReorderKernel {
    fn execute(&self, inputs: &[&Storage], outputs: &mut [Storage]) -> ForgeResult<()> {
        reorder(inputs[0], &self.src, &mut outputs[0], &self.dst)
    }
}
