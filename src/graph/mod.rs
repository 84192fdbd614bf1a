//! Dataflow graph: construction, compilation and execution.
//!
//! [`Graph`] is the user-facing orchestrator. `build` turns a [`Network`]
//! into an immutable [`CompiledGraph`] and a default [`InferRequest`];
//! further requests over the same compiled plan come from
//! [`Graph::create_infer_request`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::config::GraphConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::memory::PlanStats;
use crate::ops::NodeFactory;
use crate::profiling::ProfileInfo;
use crate::tensor::{Blob, TensorDesc};

pub mod compiled;
pub mod compiler;
pub mod edge;
pub mod mean;
pub mod network;
pub mod node;
pub mod request;
pub mod sort;

pub use compiled::{CompiledGraph, OutputBinding};
pub use edge::{Edge, EdgeId, EdgeStatus};
pub use mean::MeanImage;
pub use network::{Layer, Network};
pub use node::{NeighbourFormats, Node, NodeId, NodeState};
pub use request::InferRequest;

fn not_ready() -> ForgeError {
    ForgeError::GraphNotReady("no network has been built".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum GraphStatus {
    #[default]
    NotReady,
    Ready,
}

/// Compile-once, infer-many execution graph.
#[derive(Debug)]
pub struct Graph {
    config: GraphConfig,
    factory: Arc<NodeFactory>,
    compiled: Option<Arc<CompiledGraph>>,
    request: Option<InferRequest>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Graph with the built-in operators and an empty configuration.
    pub fn new() -> Self {
        Self::with_factory(NodeFactory::with_builtin())
    }

    pub fn with_factory(factory: NodeFactory) -> Self {
        Self {
            config: GraphConfig::default(),
            factory: Arc::new(factory),
            compiled: None,
            request: None,
        }
    }

    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    /// Build and compile `network`. A ready graph is reset first; on error
    /// the graph is left not ready.
    pub fn build(&mut self, network: &Network) -> ForgeResult<()> {
        if self.is_ready() {
            self.reset();
        }
        let compiled = Arc::new(compiler::compile(network, &self.factory, &self.config)?);
        self.request = Some(InferRequest::new(Arc::clone(&compiled)));
        self.compiled = Some(compiled);
        Ok(())
    }

    /// Drop the compiled plan and all working memory.
    pub fn reset(&mut self) {
        if let Some(compiled) = self.compiled.take() {
            tracing::debug!("reset graph '{}'", compiled.name());
        }
        self.request = None;
    }

    pub fn status(&self) -> GraphStatus {
        if self.compiled.is_some() {
            GraphStatus::Ready
        } else {
            GraphStatus::NotReady
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status() == GraphStatus::Ready
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Replace the configuration used by the next `build`.
    pub fn set_config(&mut self, config: GraphConfig) {
        self.config = config;
    }

    pub fn compiled(&self) -> ForgeResult<&Arc<CompiledGraph>> {
        self.compiled.as_ref().ok_or_else(not_ready)
    }

    fn request_mut(&mut self) -> ForgeResult<&mut InferRequest> {
        self.request.as_mut().ok_or_else(not_ready)
    }

    fn request(&self) -> ForgeResult<&InferRequest> {
        self.request.as_ref().ok_or_else(not_ready)
    }

    /// New request with its own memory over the current compiled plan.
    pub fn create_infer_request(&self) -> ForgeResult<InferRequest> {
        Ok(InferRequest::new(Arc::clone(self.compiled()?)))
    }

    pub fn push_input(&mut self, name: &str, blob: &Blob) -> ForgeResult<()> {
        self.request_mut()?.push_input(name, blob)
    }

    pub fn infer(&mut self) -> ForgeResult<()> {
        self.request_mut()?.infer()
    }

    pub fn pull_outputs(&self) -> ForgeResult<BTreeMap<String, Blob>> {
        self.request()?.pull_outputs()
    }

    pub fn pull_output_into(&self, name: &str, blob: &mut Blob) -> ForgeResult<()> {
        self.request()?.pull_output_into(name, blob)
    }

    /// Per-node records of the most recent `infer`.
    pub fn perf_counters(&self) -> ForgeResult<BTreeMap<String, ProfileInfo>> {
        Ok(self.request()?.perf_counters().clone())
    }

    pub fn input_info(&self) -> ForgeResult<BTreeMap<String, TensorDesc>> {
        Ok(self.compiled()?.input_info())
    }

    pub fn output_info(&self) -> ForgeResult<BTreeMap<String, TensorDesc>> {
        Ok(self.compiled()?.output_info())
    }

    pub fn nodes(&self) -> &[Node] {
        self.compiled.as_deref().map(CompiledGraph::nodes).unwrap_or_default()
    }

    pub fn edges(&self) -> &[Edge] {
        self.compiled.as_deref().map(CompiledGraph::edges).unwrap_or_default()
    }

    pub fn execution_order(&self) -> &[NodeId] {
        self.compiled
            .as_deref()
            .map(CompiledGraph::execution_order)
            .unwrap_or_default()
    }

    pub fn memory_stats(&self) -> Option<PlanStats> {
        self.compiled.as_deref().map(CompiledGraph::memory_stats)
    }
}
