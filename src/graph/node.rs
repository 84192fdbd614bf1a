//! Graph nodes: one operator instance plus its compile-time state.
//!
//! A node moves through `Unbound -> FormatsEnumerated -> FormatSelected ->
//! KernelBound`; calling a step out of order is an internal error.

use std::fmt;

use serde::Serialize;
use smallvec::SmallVec;

use crate::error::{ForgeError, ForgeResult};
use crate::graph::edge::EdgeId;
use crate::ops::{
    Kernel, KernelContext, OpContext, Operator, OperatorKind, PortConfig, PrimitiveDesc,
};
use crate::tensor::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum NodeState {
    Unbound,
    FormatsEnumerated,
    FormatSelected,
    KernelBound,
}

/// Formats already chosen around a node, per port.
///
/// `inputs[p]` is the producer's output config for input port `p`;
/// `outputs[p]` holds the known configs of consumers of output port `p`.
#[derive(Debug, Clone, Default)]
pub struct NeighbourFormats {
    pub inputs: Vec<Option<PortConfig>>,
    pub outputs: Vec<Vec<PortConfig>>,
}

impl NeighbourFormats {
    /// Number of ports of `candidate` that agree with a known neighbour.
    pub fn score(&self, candidate: &PrimitiveDesc) -> usize {
        let inputs = candidate
            .inputs
            .iter()
            .zip(&self.inputs)
            .filter(|(port, neighbour)| neighbour.is_some_and(|n| port.agrees_with(&n)))
            .count();
        let outputs: usize = candidate
            .outputs
            .iter()
            .zip(&self.outputs)
            .map(|(port, known)| known.iter().filter(|n| port.agrees_with(n)).count())
            .sum();
        inputs + outputs
    }
}

pub struct Node {
    pub(crate) name: String,
    pub(crate) operator: Box<dyn Operator>,
    /// Input edges by port
    pub(crate) inputs: SmallVec<[EdgeId; 4]>,
    /// Output edges by port
    pub(crate) outputs: SmallVec<[EdgeId; 2]>,
    supported: Vec<PrimitiveDesc>,
    selected: Option<usize>,
    kernel: Option<Box<dyn Kernel>>,
    state: NodeState,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.operator.kind())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("selected", &self.selected_primitive())
            .field("state", &self.state)
            .finish()
    }
}

impl Node {
    pub(crate) fn new(name: impl Into<String>, operator: Box<dyn Operator>) -> Self {
        Self {
            name: name.into(),
            operator,
            inputs: SmallVec::new(),
            outputs: SmallVec::new(),
            supported: Vec::new(),
            selected: None,
            kernel: None,
            state: NodeState::Unbound,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> OperatorKind {
        self.operator.kind()
    }

    pub fn inputs(&self) -> &[EdgeId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[EdgeId] {
        &self.outputs
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn supported_primitives(&self) -> &[PrimitiveDesc] {
        &self.supported
    }

    pub fn selected_primitive(&self) -> Option<&PrimitiveDesc> {
        self.selected.and_then(|i| self.supported.get(i))
    }

    /// Implementation label of the selected primitive, e.g. `ref_FP32`.
    pub fn exec_type(&self) -> String {
        self.selected_primitive()
            .map(PrimitiveDesc::exec_type)
            .unwrap_or_else(|| "undef".to_string())
    }

    fn expect_state(&self, expected: NodeState, step: &str) -> ForgeResult<()> {
        if self.state != expected {
            return Err(crate::internal_error!(
                "node '{}': {} requires state {:?}, found {:?}",
                self.name,
                step,
                expected,
                self.state
            ));
        }
        Ok(())
    }

    /// Ask the operator which formats it can execute under.
    pub fn enumerate_supported_formats(&mut self, ctx: &OpContext<'_>) -> ForgeResult<()> {
        self.expect_state(NodeState::Unbound, "enumerate_supported_formats")?;
        let supported = self.operator.supported_primitives(ctx)?;
        if supported.is_empty() {
            return Err(ForgeError::UnsupportedFormat {
                node: self.name.clone(),
                reason: "operator offers no format".to_string(),
            });
        }
        for pd in &supported {
            if pd.inputs.len() != self.inputs.len() || pd.outputs.len() != self.outputs.len() {
                return Err(crate::internal_error!(
                    "node '{}': primitive has {}/{} ports, node has {}/{}",
                    self.name,
                    pd.inputs.len(),
                    pd.outputs.len(),
                    self.inputs.len(),
                    self.outputs.len()
                ));
            }
        }
        self.supported = supported;
        self.state = NodeState::FormatsEnumerated;
        Ok(())
    }

    /// Pick the candidate agreeing with the most neighbour ports. Ties go
    /// to the candidate listed first.
    pub fn select_format(&mut self, neighbours: &NeighbourFormats) -> ForgeResult<&PrimitiveDesc> {
        self.expect_state(NodeState::FormatsEnumerated, "select_format")?;
        let mut best = 0;
        let mut best_score = None;
        for (i, candidate) in self.supported.iter().enumerate() {
            let score = neighbours.score(candidate);
            if best_score.map_or(true, |s| score > s) {
                best = i;
                best_score = Some(score);
            }
        }
        self.selected = Some(best);
        self.state = NodeState::FormatSelected;
        tracing::trace!(
            node = %self.name,
            exec_type = %self.supported[best].exec_type(),
            "format selected"
        );
        Ok(&self.supported[best])
    }

    /// Instantiate the kernel for the selected primitive.
    pub fn bind_kernel(&mut self, ctx: &KernelContext<'_>) -> ForgeResult<()> {
        self.expect_state(NodeState::FormatSelected, "bind_kernel")?;
        let selected = self
            .selected_primitive()
            .ok_or_else(|| crate::internal_error!("node '{}' has no selection", self.name))?;
        self.kernel = Some(self.operator.create_kernel(selected, ctx)?);
        self.state = NodeState::KernelBound;
        Ok(())
    }

    /// Run the bound kernel over already-allocated storage.
    pub fn execute(&self, inputs: &[&Storage], outputs: &mut [Storage]) -> ForgeResult<()> {
        let kernel = self.kernel.as_ref().ok_or_else(|| {
            crate::internal_error!("node '{}' executed without a kernel", self.name)
        })?;
        kernel.execute(inputs, outputs)
    }
}
