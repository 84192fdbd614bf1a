//! `Copy` is a structural marker in network descriptions. It takes part in
//! format selection like any pass-through operator but has no kernel.

use crate::error::{ForgeError, ForgeResult};
use crate::graph::network::Layer;
use crate::ops::factory::expect_ports;
use crate::ops::{
    ImplType, Kernel, KernelContext, OpContext, Operator, OperatorKind, PortConfig, PrimitiveDesc,
};
use crate::tensor::Layout;

#[derive(Debug, Default)]
pub struct CopyOp;

impl CopyOp {
    pub fn from_layer(layer: &Layer) -> ForgeResult<Box<dyn Operator>> {
        expect_ports(layer, 1..=1, 1)?;
        Ok(Box::new(CopyOp))
    }
}

impl Operator for CopyOp {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Copy
    }

    fn supported_primitives(&self, ctx: &OpContext<'_>) -> ForgeResult<Vec<PrimitiveDesc>> {
        let precision = ctx.inputs.first().map(|d| d.precision).unwrap_or_default();
        Ok(vec![PrimitiveDesc::uniform(
            ImplType::Unknown,
            PortConfig::new(Layout::Any, precision),
            1,
            1,
        )])
    }

    fn create_kernel(
        &self,
        _selected: &PrimitiveDesc,
        ctx: &KernelContext<'_>,
    ) -> ForgeResult<Box<dyn Kernel>> {
        Err(ForgeError::UnimplementedOperator {
            node: ctx.node.to_string(),
            kind: OperatorKind::Copy.to_string(),
        })
    }
}
