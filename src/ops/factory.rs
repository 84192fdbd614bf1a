//! Operator construction table.

use std::collections::HashMap;

use crate::error::{ForgeError, ForgeResult};
use crate::graph::network::Layer;
use crate::ops::{
    copy::CopyOp, eltwise::EltwiseOp, input::InputOp, output::OutputOp, relu::ReluOp,
    roi_pooling::RoiPoolingOp, scale_shift::ScaleShiftOp, Operator, OperatorKind,
};

/// Builds an operator from its layer declaration.
pub type OperatorCtor = fn(&Layer) -> ForgeResult<Box<dyn Operator>>;

/// Maps operator kinds to constructors.
///
/// Built once and handed to the graph; callers extend it with
/// [`NodeFactory::register`] before building.
#[derive(Debug, Clone, Default)]
pub struct NodeFactory {
    ctors: HashMap<OperatorKind, OperatorCtor>,
}

impl NodeFactory {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding every operator shipped with the crate.
    pub fn with_builtin() -> Self {
        let mut factory = Self::new();
        factory.register(OperatorKind::Input, InputOp::from_layer);
        factory.register(OperatorKind::Output, OutputOp::from_layer);
        factory.register(OperatorKind::ScaleShift, ScaleShiftOp::from_layer);
        factory.register(OperatorKind::ReLU, ReluOp::from_layer);
        factory.register(OperatorKind::Eltwise, EltwiseOp::from_layer);
        factory.register(OperatorKind::ROIPooling, RoiPoolingOp::from_layer);
        factory.register(OperatorKind::Copy, CopyOp::from_layer);
        factory
    }

    /// Add or replace the constructor for `kind`.
    pub fn register(&mut self, kind: OperatorKind, ctor: OperatorCtor) -> &mut Self {
        self.ctors.insert(kind, ctor);
        self
    }

    pub fn supports(&self, kind: &OperatorKind) -> bool {
        self.ctors.contains_key(kind)
    }

    pub fn create(&self, layer: &Layer) -> ForgeResult<Box<dyn Operator>> {
        let kind = OperatorKind::from_type_name(&layer.kind);
        let ctor = self
            .ctors
            .get(&kind)
            .ok_or_else(|| ForgeError::UnimplementedOperator {
                node: layer.name.clone(),
                kind: layer.kind.clone(),
            })?;
        ctor(layer)
    }
}

/// Check the number of consumed and produced tensors of a layer.
pub(crate) fn expect_ports(
    layer: &Layer,
    inputs: std::ops::RangeInclusive<usize>,
    outputs: usize,
) -> ForgeResult<()> {
    if !inputs.contains(&layer.inputs.len()) {
        return Err(ForgeError::InvalidNetwork(format!(
            "{} layer '{}' takes {:?} inputs, got {}",
            layer.kind,
            layer.name,
            inputs,
            layer.inputs.len()
        )));
    }
    if layer.outputs.len() != outputs {
        return Err(ForgeError::InvalidNetwork(format!(
            "{} layer '{}' produces {} outputs, got {}",
            layer.kind,
            layer.name,
            outputs,
            layer.outputs.len()
        )));
    }
    Ok(())
}
