//! Immutable result of compiling a network.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::GraphConfig;
use crate::graph::edge::{Edge, EdgeId};
use crate::graph::mean::MeanImage;
use crate::graph::node::{Node, NodeId};
use crate::memory::{BufferId, MemoryPlan, PlanStats};
use crate::tensor::TensorDesc;

/// A network output exposed through the exchange.
#[derive(Debug, Clone)]
pub struct OutputBinding {
    pub name: String,
    pub edge: EdgeId,
    /// Format handed to callers, may differ from the edge's
    pub desc: TensorDesc,
}

/// Nodes with bound kernels, their execution order and the memory plan.
///
/// Shared read-only between the graph and every [`InferRequest`]; nothing
/// in here changes while inference runs.
///
/// [`InferRequest`]: crate::graph::InferRequest
pub struct CompiledGraph {
    pub(crate) name: String,
    pub(crate) nodes: Vec<Node>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) order: Vec<NodeId>,
    pub(crate) inputs: BTreeMap<String, EdgeId>,
    pub(crate) outputs: Vec<OutputBinding>,
    pub(crate) means: BTreeMap<String, MeanImage>,
    pub(crate) plan: MemoryPlan,
    pub(crate) config: GraphConfig,
    pub(crate) thread_pool: Option<rayon::ThreadPool>,
    pub(crate) perf_count: bool,
}

impl fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("outputs", &self.outputs.iter().map(|o| &o.name).collect::<Vec<_>>())
            .field("mean_images", &self.means.keys().collect::<Vec<_>>())
            .field("threads", &self.thread_pool.as_ref().map(|p| p.current_num_threads()))
            .finish()
    }
}

impl CompiledGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0]
    }

    pub fn find_node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    /// Mean subtracted from `input` on push, if the network declared one.
    pub fn mean_image(&self, input: &str) -> Option<&MeanImage> {
        self.means.get(input)
    }

    pub fn execution_order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn memory_stats(&self) -> PlanStats {
        self.plan.stats()
    }

    pub fn memory_plan(&self) -> &MemoryPlan {
        &self.plan
    }

    pub fn buffer_of(&self, edge: EdgeId) -> BufferId {
        self.plan.buffer_of(edge.0)
    }

    /// Finalized descriptor of every graph input, by input name.
    pub fn input_info(&self) -> BTreeMap<String, TensorDesc> {
        self.inputs
            .iter()
            .map(|(name, edge)| (name.clone(), self.edges[edge.0].desc.clone()))
            .collect()
    }

    /// Exchange descriptor of every graph output, by data name.
    pub fn output_info(&self) -> BTreeMap<String, TensorDesc> {
        self.outputs
            .iter()
            .map(|o| (o.name.clone(), o.desc.clone()))
            .collect()
    }

    pub(crate) fn input_edge(&self, name: &str) -> Option<EdgeId> {
        self.inputs.get(name).copied()
    }

    pub(crate) fn output_binding(&self, name: &str) -> Option<&OutputBinding> {
        self.outputs.iter().find(|o| o.name == name)
    }
}
