//! Graph input: storage is filled by the exchange, the kernel is a no-op.

use crate::error::{ForgeError, ForgeResult};
use crate::graph::network::Layer;
use crate::ops::factory::expect_ports;
use crate::ops::{
    ImplType, Kernel, KernelContext, NoopKernel, OpContext, Operator, OperatorKind, PortConfig,
    PrimitiveDesc,
};

#[derive(Debug, Default)]
pub struct InputOp;

impl InputOp {
    pub fn from_layer(layer: &Layer) -> ForgeResult<Box<dyn Operator>> {
        expect_ports(layer, 0..=0, 1)?;
        Ok(Box::new(InputOp))
    }
}

impl Operator for InputOp {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Input
    }

    fn supported_primitives(&self, ctx: &OpContext<'_>) -> ForgeResult<Vec<PrimitiveDesc>> {
        let declared = ctx
            .outputs
            .first()
            .ok_or_else(|| crate::internal_error!("input '{}' has no output", ctx.node))?;
        if !declared.precision.is_specified() {
            return Err(ForgeError::UnspecifiedPrecision(format!("input '{}'", ctx.node)));
        }
        Ok(vec![PrimitiveDesc::new(
            ImplType::Unknown,
            Vec::new(),
            vec![PortConfig::of(declared)],
        )])
    }

    fn create_kernel(
        &self,
        _selected: &PrimitiveDesc,
        _ctx: &KernelContext<'_>,
    ) -> ForgeResult<Box<dyn Kernel>> {
        Ok(Box::new(NoopKernel))
    }
}
