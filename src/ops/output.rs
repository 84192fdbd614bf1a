//! Graph output sink. Accepts any layout; the exchange reads the storage.

use crate::error::ForgeResult;
use crate::graph::network::Layer;
use crate::ops::factory::expect_ports;
use crate::ops::{
    ImplType, Kernel, KernelContext, NoopKernel, OpContext, Operator, OperatorKind, PortConfig,
    PrimitiveDesc,
};
use crate::tensor::Layout;

#[derive(Debug, Default)]
pub struct OutputOp;

impl OutputOp {
    pub fn from_layer(layer: &Layer) -> ForgeResult<Box<dyn Operator>> {
        expect_ports(layer, 1..=1, 0)?;
        Ok(Box::new(OutputOp))
    }
}

impl Operator for OutputOp {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Output
    }

    fn supported_primitives(&self, ctx: &OpContext<'_>) -> ForgeResult<Vec<PrimitiveDesc>> {
        let precision = ctx.inputs.first().map(|d| d.precision).unwrap_or_default();
        Ok(vec![PrimitiveDesc::new(
            ImplType::Unknown,
            vec![PortConfig::new(Layout::Any, precision)],
            Vec::new(),
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
