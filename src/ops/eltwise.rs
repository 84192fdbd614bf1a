//! Element-wise combination of two or more equally shaped tensors.

use std::str::FromStr;

use thiserror::Error;

use crate::error::ForgeResult;
use crate::graph::network::Layer;
use crate::ops::factory::expect_ports;
use crate::ops::{
    elementwise_candidates, ensure_fp32_outputs, f32_input, f32_output, offset_map, unsupported,
    Kernel, KernelContext, OpContext, Operator, OperatorKind, PrimitiveDesc,
};
use crate::param_error;
use crate::tensor::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EltwiseOperation {
    Sum,
    Prod,
    Max,
}

/// Text that names no [`EltwiseOperation`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown eltwise operation '{0}'")]
pub struct UnknownEltwiseOperation(pub String);

impl FromStr for EltwiseOperation {
    type Err = UnknownEltwiseOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(EltwiseOperation::Sum),
            "prod" | "mul" => Ok(EltwiseOperation::Prod),
            "max" => Ok(EltwiseOperation::Max),
            _ => Err(UnknownEltwiseOperation(s.to_string())),
        }
    }
}

#[derive(Debug)]
pub struct EltwiseOp {
    operation: EltwiseOperation,
    /// Per-input scale, `sum` only
    coeffs: Option<Vec<f32>>,
}

impl EltwiseOp {
    pub fn new(operation: EltwiseOperation) -> Self {
        Self {
            operation,
            coeffs: None,
        }
    }

    pub fn from_layer(layer: &Layer) -> ForgeResult<Box<dyn Operator>> {
        expect_ports(layer, 2..=usize::MAX, 1)?;
        let operation = match layer.param("operation") {
            None => EltwiseOperation::Sum,
            Some(raw) => raw
                .parse()
                .map_err(|e| param_error!(layer.name, "operation", "{}", e))?,
        };
        let coeffs = match layer.param("coeff") {
            None => None,
            Some(raw) => {
                if operation != EltwiseOperation::Sum {
                    return Err(param_error!(layer.name, "coeff", "only valid with sum"));
                }
                let parsed = raw
                    .split(',')
                    .map(|v| v.trim().parse::<f32>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| param_error!(layer.name, "coeff", "cannot parse {:?}", raw))?;
                if parsed.len() != layer.inputs.len() {
                    return Err(param_error!(
                        layer.name,
                        "coeff",
                        "{} values for {} inputs",
                        parsed.len(),
                        layer.inputs.len()
                    ));
                }
                Some(parsed)
            }
        };
        Ok(Box::new(EltwiseOp { operation, coeffs }))
    }
}

impl Operator for EltwiseOp {
    fn kind(&self) -> OperatorKind {
        OperatorKind::Eltwise
    }

    fn supported_primitives(&self, ctx: &OpContext<'_>) -> ForgeResult<Vec<PrimitiveDesc>> {
        let first = ctx
            .inputs
            .first()
            .ok_or_else(|| unsupported(ctx.node, "no inputs"))?;
        for (port, desc) in ctx.inputs.iter().enumerate().skip(1) {
            if desc.dims != first.dims {
                return Err(unsupported(
                    ctx.node,
                    format!("input {} dims {:?} differ from {:?}", port, desc.dims, first.dims),
                ));
            }
        }
        super::ensure_same_dims(ctx)?;
        ensure_fp32_outputs(ctx)?;
        Ok(elementwise_candidates(ctx.inputs.len(), first.rank()))
    }

    fn create_kernel(
        &self,
        _selected: &PrimitiveDesc,
        ctx: &KernelContext<'_>,
    ) -> ForgeResult<Box<dyn Kernel>> {
        let output = ctx
            .outputs
            .first()
            .ok_or_else(|| crate::internal_error!("eltwise '{}' has no output", ctx.node))?;
        Ok(Box::new(EltwiseKernel {
            node: ctx.node.to_string(),
            operation: self.operation,
            coeffs: self.coeffs.clone(),
            gathers: ctx.inputs.iter().map(|i| offset_map(i, output)).collect(),
        }))
    }
}

#[derive(Debug)]
struct EltwiseKernel {
    node: String,
    operation: EltwiseOperation,
    coeffs: Option<Vec<f32>>,
    gathers: Vec<Option<Vec<usize>>>,
}

impl Kernel for EltwiseKernel {
    fn execute(&self, inputs: &[&Storage], outputs: &mut [Storage]) -> ForgeResult<()> {
        let dst = f32_output(&self.node, &mut outputs[0])?;
        for (port, (storage, gather)) in inputs.iter().zip(&self.gathers).enumerate() {
            let src = f32_input(&self.node, storage)?;
            let coeff = self.coeffs.as_ref().map_or(1.0, |c| c[port]);
            for (pos, d) in dst.iter_mut().enumerate() {
                let x = match gather {
                    None => src[pos],
                    Some(map) => src[map[pos]],
                };
                *d = if port == 0 {
                    x * coeff
                } else {
                    match self.operation {
                        EltwiseOperation::Sum => *d + x * coeff,
                        EltwiseOperation::Prod => *d * x,
                        EltwiseOperation::Max => d.max(x),
                    }
                };
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::error::ForgeError;
    use crate::tensor::{Data, Layout, Precision, TensorDesc};

    fn run(layer: Layer, a: Vec<f32>, b: Vec<f32>) -> Vec<f32> {
        let op = EltwiseOp::from_layer(&layer).unwrap();
        let desc = TensorDesc::new(Precision::FP32, vec![a.len()], Layout::C);
        let descs = [desc.clone(), desc.clone()];
        let out_descs = [desc];
        let config = GraphConfig::default();
        let ctx = KernelContext {
            node: "elt",
            inputs: &descs,
            outputs: &out_descs,
            config: &config,
        };
        let pd = elementwise_candidates(2, 1).remove(0);
        let kernel = op.create_kernel(&pd, &ctx).unwrap();
        let a = Storage::F32(a);
        let b = Storage::F32(b);
        let mut out = [Storage::F32(vec![0.0; a.len()])];
        kernel.execute(&[&a, &b], &mut out).unwrap();
        out[0].as_f32().unwrap().to_vec()
    }

    fn layer(operation: &str) -> Layer {
        Layer::new("elt", "Eltwise")
            .with_input("a")
            .with_input("b")
            .with_param("operation", operation)
            .with_output(Data::with_dims("y", vec![3], Precision::FP32, Layout::C))
    }

    #[test]
    fn test_operations() {
        let a = vec![1.0, -2.0, 3.0];
        let b = vec![4.0, 5.0, -6.0];
        assert_eq!(run(layer("sum"), a.clone(), b.clone()), vec![5.0, 3.0, -3.0]);
        assert_eq!(run(layer("prod"), a.clone(), b.clone()), vec![4.0, -10.0, -18.0]);
        assert_eq!(run(layer("max"), a, b), vec![4.0, 5.0, 3.0]);
    }

    #[test]
    fn test_sum_coefficients() {
        let layer = layer("sum").with_param("coeff", "1,-1");
        assert_eq!(run(layer, vec![5.0, 5.0], vec![2.0, 7.0]), vec![3.0, -2.0]);
    }

    #[test]
    fn test_parse_operation() {
        assert_eq!("Sum".parse::<EltwiseOperation>(), Ok(EltwiseOperation::Sum));
        assert_eq!(" mul ".parse::<EltwiseOperation>(), Ok(EltwiseOperation::Prod));
        let err = "pow".parse::<EltwiseOperation>().unwrap_err();
        assert_eq!(err, UnknownEltwiseOperation("pow".to_string()));
        assert_eq!(err.to_string(), "unknown eltwise operation 'pow'");
    }

    #[test]
    fn test_bad_params() {
        match EltwiseOp::from_layer(&layer("pow")) {
            Err(ForgeError::InvalidParameter { param, reason, .. }) => {
                assert_eq!(param, "operation");
                assert!(reason.contains("pow"));
            }
            other => panic!("expected InvalidParameter, got {:?}", other.map(|_| ())),
        }
        assert!(EltwiseOp::from_layer(&layer("max").with_param("coeff", "1,1")).is_err());
        assert!(EltwiseOp::from_layer(&layer("sum").with_param("coeff", "1")).is_err());
    }

    #[test]
    fn test_single_input_rejected() {
        let layer = Layer::new("elt", "Eltwise")
            .with_input("a")
            .with_output(Data::with_dims("y", vec![3], Precision::FP32, Layout::C));
        assert!(matches!(
            EltwiseOp::from_layer(&layer),
            Err(ForgeError::InvalidNetwork(_))
        ));
    }
}
