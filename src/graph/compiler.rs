//! Network to [`CompiledGraph`] pipeline.
//!
//! Stages, each of which aborts the whole compilation on error:
//!
//! 1. parse layers into nodes and resolve data names into edges
//! 2. topological sort
//! 3. format enumeration for every node
//! 4. format selection in topological order
//! 5. edge finalization, inserting reorder nodes where formats disagree,
//!    followed by a re-sort
//! 6. memory planning
//! 7. kernel binding

use std::collections::{BTreeMap, HashMap, HashSet};

use smallvec::SmallVec;

use crate::config::GraphConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::graph::compiled::{CompiledGraph, OutputBinding};
use crate::graph::edge::{Edge, EdgeId, EdgeStatus};
use crate::graph::mean::MeanImage;
use crate::graph::network::Network;
use crate::graph::node::{NeighbourFormats, Node, NodeId};
use crate::graph::sort::{positions, topological_order};
use crate::memory::{BufferRequest, MemoryPlanner};
use crate::ops::output::OutputOp;
use crate::ops::reorder::ReorderOp;
use crate::ops::{KernelContext, NodeFactory, OpContext, OperatorKind, PortConfig};
use crate::profiling::ScopedTimer;
use crate::tensor::{Layout, TensorDesc};

/// Compile `network` with the operators of `factory`.
pub fn compile(
    network: &Network,
    factory: &NodeFactory,
    config: &GraphConfig,
) -> ForgeResult<CompiledGraph> {
    let _timer = ScopedTimer::new(format!("compile '{}'", network.name));
    let mut builder = Builder::default();

    builder.parse(network, factory)?;
    tracing::debug!(
        nodes = builder.nodes.len(),
        edges = builder.edges.len(),
        "parsed network '{}'",
        network.name
    );

    let order = topological_order(&builder.nodes, &builder.edges)?;
    builder.enumerate_formats(&order)?;
    builder.select_formats(&order)?;
    tracing::debug!("formats selected for {} nodes", order.len());

    let reorders = builder.finalize_edges()?;
    let order = topological_order(&builder.nodes, &builder.edges)?;
    tracing::debug!(reorders, "edges finalized");
    builder.prepare_mean_images(network)?;

    let plan = {
        let _timer = ScopedTimer::new("memory plan");
        builder.plan_memory(&order)?
    };
    builder.bind_kernels(&order, config)?;

    let thread_pool = build_thread_pool(config);
    let stats = plan.stats();
    tracing::info!(
        nodes = builder.nodes.len(),
        edges = builder.edges.len(),
        reorders,
        threads = thread_pool.as_ref().map(|p| p.current_num_threads()),
        "compiled '{}': {}",
        network.name,
        stats
    );

    Ok(CompiledGraph {
        name: network.name.clone(),
        nodes: builder.nodes,
        edges: builder.edges,
        order,
        inputs: builder.inputs,
        outputs: builder.outputs,
        means: builder.means,
        plan,
        config: config.clone(),
        thread_pool,
        perf_count: config.perf_count(),
    })
}

fn build_thread_pool(config: &GraphConfig) -> Option<rayon::ThreadPool> {
    let threads = config.threads()?;
    match rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("cpuforge-{}", i))
        .build()
    {
        Ok(pool) => Some(pool),
        Err(e) => {
            tracing::warn!("falling back to the global pool: {}", e);
            None
        }
    }
}

#[derive(Default)]
struct Builder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    names: HashSet<String>,
    inputs: BTreeMap<String, EdgeId>,
    outputs: Vec<OutputBinding>,
    means: BTreeMap<String, MeanImage>,
}

impl Builder {
    fn add_node(&mut self, node: Node) -> ForgeResult<NodeId> {
        if !self.names.insert(node.name.clone()) {
            return Err(ForgeError::InvalidNetwork(format!(
                "duplicate node name '{}'",
                node.name
            )));
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        Ok(id)
    }

    /// Name not taken by any node yet, derived from `base`.
    fn unique_name(&self, base: String) -> String {
        if !self.names.contains(&base) {
            return base;
        }
        (1..)
            .map(|i| format!("{}_{}", base, i))
            .find(|n| !self.names.contains(n))
            .unwrap_or(base)
    }

    fn descs(&self, ids: &[EdgeId]) -> SmallVec<[TensorDesc; 4]> {
        ids.iter().map(|e| self.edges[e.0].desc.clone()).collect()
    }

    fn parse(&mut self, network: &Network, factory: &NodeFactory) -> ForgeResult<()> {
        let mut data_edges: HashMap<&str, EdgeId> = HashMap::new();
        let mut layer_nodes = Vec::with_capacity(network.layers.len());

        for layer in &network.layers {
            let operator = factory.create(layer)?;
            let is_input = operator.kind() == OperatorKind::Input;
            let mut node = Node::new(layer.name.clone(), operator);
            let id = NodeId(self.nodes.len());

            for (port, data) in layer.outputs.iter().enumerate() {
                if !data.is_initialized() {
                    return Err(ForgeError::InvalidNetwork(format!(
                        "data '{}' of layer '{}' has no dims",
                        data.name(),
                        layer.name
                    )));
                }
                let edge_id = EdgeId(self.edges.len());
                if data_edges.insert(data.name(), edge_id).is_some() {
                    return Err(ForgeError::InvalidNetwork(format!(
                        "data '{}' is produced more than once",
                        data.name()
                    )));
                }
                let mut edge = Edge::new(data.name(), id, port, data.effective_desc()?);
                if is_input {
                    edge.pinned = true;
                    self.inputs.insert(layer.name.clone(), edge_id);
                }
                self.edges.push(edge);
                node.outputs.push(edge_id);
            }
            layer_nodes.push(self.add_node(node)?);
        }

        for (layer, &node) in network.layers.iter().zip(&layer_nodes) {
            for (port, data) in layer.inputs.iter().enumerate() {
                let edge = *data_edges.get(data.as_str()).ok_or_else(|| {
                    ForgeError::InvalidNetwork(format!(
                        "layer '{}' consumes unknown data '{}'",
                        layer.name, data
                    ))
                })?;
                self.edges[edge.0].consumers.push((node, port));
                self.nodes[node.0].inputs.push(edge);
            }
        }

        if network.outputs.is_empty() {
            return Err(ForgeError::InvalidNetwork(format!(
                "network '{}' declares no outputs",
                network.name
            )));
        }
        for name in &network.outputs {
            let edge = *data_edges.get(name.as_str()).ok_or_else(|| {
                ForgeError::InvalidNetwork(format!("output '{}' is not produced by any layer", name))
            })?;
            let mut node = Node::new(format!("out_{}", name), Box::new(OutputOp));
            node.inputs.push(edge);
            let id = self.add_node(node)?;
            let edge_ref = &mut self.edges[edge.0];
            edge_ref.consumers.push((id, 0));
            edge_ref.pinned = true;
            self.outputs.push(OutputBinding {
                name: name.clone(),
                edge,
                desc: edge_ref.desc.clone(),
            });
        }
        Ok(())
    }

    /// Validate every mean image against its finalized input edge.
    fn prepare_mean_images(&mut self, network: &Network) -> ForgeResult<()> {
        for (input, blob) in &network.mean_images {
            let edge = *self.inputs.get(input).ok_or_else(|| {
                ForgeError::InvalidNetwork(format!("mean image for unknown input '{}'", input))
            })?;
            let mean = MeanImage::new(input, blob, &self.edges[edge.0].desc)?;
            tracing::debug!(input = %input, values = mean.len(), "mean image prepared");
            self.means.insert(input.clone(), mean);
        }
        Ok(())
    }

    fn enumerate_formats(&mut self, order: &[NodeId]) -> ForgeResult<()> {
        for &id in order {
            let inputs = self.descs(&self.nodes[id.0].inputs);
            let outputs = self.descs(&self.nodes[id.0].outputs);
            let node = &mut self.nodes[id.0];
            let name = node.name.clone();
            node.enumerate_supported_formats(&OpContext {
                node: &name,
                inputs: &inputs,
                outputs: &outputs,
            })?;
        }
        Ok(())
    }

    fn neighbours(&self, id: NodeId) -> NeighbourFormats {
        let node = &self.nodes[id.0];
        let inputs = node
            .inputs
            .iter()
            .map(|e| {
                let edge = &self.edges[e.0];
                self.nodes[edge.producer.0]
                    .selected_primitive()
                    .and_then(|pd| pd.outputs.get(edge.producer_port).copied())
            })
            .collect();
        let outputs = node
            .outputs
            .iter()
            .map(|e| {
                let edge = &self.edges[e.0];
                let mut known: Vec<PortConfig> = edge
                    .consumers
                    .iter()
                    .filter_map(|&(n, port)| {
                        self.nodes[n.0]
                            .selected_primitive()
                            .and_then(|pd| pd.inputs.get(port).copied())
                    })
                    .collect();
                if !edge.desc.layout.is_any() {
                    known.push(PortConfig::of(&edge.desc));
                }
                known
            })
            .collect();
        NeighbourFormats { inputs, outputs }
    }

    fn select_formats(&mut self, order: &[NodeId]) -> ForgeResult<()> {
        for &id in order {
            let neighbours = self.neighbours(id);
            self.nodes[id.0].select_format(&neighbours)?;
        }
        Ok(())
    }

    fn selected_input(&self, node: NodeId, port: usize) -> ForgeResult<PortConfig> {
        let node = &self.nodes[node.0];
        node.selected_primitive()
            .and_then(|pd| pd.inputs.get(port).copied())
            .ok_or_else(|| crate::internal_error!("node '{}' has no format for input {}", node.name, port))
    }

    /// Fix every edge's descriptor and insert reorders. Returns the number
    /// of reorder nodes added.
    fn finalize_edges(&mut self) -> ForgeResult<usize> {
        let declared_edges = self.edges.len();
        let mut reorders = 0;

        for index in 0..declared_edges {
            let edge = &self.edges[index];
            let producer = &self.nodes[edge.producer.0];
            let produced = producer
                .selected_primitive()
                .and_then(|pd| pd.outputs.get(edge.producer_port).copied())
                .ok_or_else(|| crate::internal_error!("node '{}' has no output format", producer.name))?;
            let consumers: SmallVec<[(NodeId, usize, PortConfig); 2]> = edge
                .consumers
                .iter()
                .map(|&(n, p)| Ok((n, p, self.selected_input(n, p)?)))
                .collect::<ForgeResult<_>>()?;

            let declared = &edge.desc;
            let rank = declared.rank();
            let precision = [produced.precision, declared.precision]
                .into_iter()
                .chain(consumers.iter().map(|c| c.2.precision))
                .find(|p| p.is_specified())
                .ok_or_else(|| ForgeError::UnspecifiedPrecision(format!("edge '{}'", edge.name)))?;
            if !produced.layout.is_any() && !produced.layout.fits_rank(rank) {
                return Err(ForgeError::UnsupportedFormat {
                    node: producer.name.clone(),
                    reason: format!("layout {} cannot hold {:?}", produced.layout, declared.dims),
                });
            }
            let layout = std::iter::once(produced.layout)
                .chain(consumers.iter().map(|c| c.2.layout))
                .chain(std::iter::once(declared.layout))
                .find(|l| !l.is_any() && l.fits_rank(rank))
                .unwrap_or_else(|| Layout::default_for_rank(rank));

            let desc = TensorDesc::new(precision, declared.dims.clone(), layout);
            let actual = PortConfig::of(&desc);

            let mut targets: Vec<(PortConfig, SmallVec<[(NodeId, usize); 2]>)> = Vec::new();
            for &(node, port, wanted) in &consumers {
                if wanted.agrees_with(&actual) {
                    continue;
                }
                let target = PortConfig::new(
                    if wanted.layout.is_any() { layout } else { wanted.layout },
                    if wanted.precision.is_specified() { wanted.precision } else { precision },
                );
                if !target.layout.fits_rank(rank) {
                    return Err(ForgeError::UnsupportedFormat {
                        node: self.nodes[node.0].name.clone(),
                        reason: format!("layout {} cannot hold {:?}", target.layout, desc.dims),
                    });
                }
                match targets.iter_mut().find(|(t, _)| *t == target) {
                    Some((_, links)) => links.push((node, port)),
                    None => targets.push((target, SmallVec::from_elem((node, port), 1))),
                }
            }

            self.edges[index].desc = desc;
            for (target, links) in targets {
                self.insert_reorder(EdgeId(index), target, &links)?;
                reorders += 1;
            }
        }
        Ok(reorders)
    }

    /// Route `links` (consumer ports of `source`) through a new reorder node
    /// producing `target`.
    fn insert_reorder(
        &mut self,
        source: EdgeId,
        target: PortConfig,
        links: &[(NodeId, usize)],
    ) -> ForgeResult<()> {
        let src_desc = self.edges[source.0].desc.clone();
        let dst_desc = TensorDesc::new(target.precision, src_desc.dims.clone(), target.layout);
        let name = self.unique_name(format!(
            "{}_reorder_{}_{}",
            self.edges[source.0].name, target.layout, target.precision
        ));

        let mut node = Node::new(
            name.clone(),
            Box::new(ReorderOp::new(PortConfig::of(&src_desc), target)),
        );
        let node_id = NodeId(self.nodes.len());
        let edge_id = EdgeId(self.edges.len());
        node.inputs.push(source);
        node.outputs.push(edge_id);
        node.enumerate_supported_formats(&OpContext {
            node: &name,
            inputs: std::slice::from_ref(&src_desc),
            outputs: std::slice::from_ref(&dst_desc),
        })?;
        node.select_format(&NeighbourFormats::default())?;

        let mut edge = Edge::new(name, node_id, 0, dst_desc);
        for &(consumer, port) in links {
            edge.consumers.push((consumer, port));
            self.nodes[consumer.0].inputs[port] = edge_id;
            self.edges[source.0].replace_consumer((consumer, port), (node_id, 0));
        }
        self.add_node(node)?;
        self.edges.push(edge);
        Ok(())
    }

    fn plan_memory(&mut self, order: &[NodeId]) -> ForgeResult<crate::memory::MemoryPlan> {
        let positions = positions(order, self.nodes.len());
        let requests = self
            .edges
            .iter()
            .map(|edge| {
                let kind = edge.desc.precision.storage_kind().ok_or_else(|| {
                    ForgeError::UnspecifiedPrecision(format!("edge '{}'", edge.name))
                })?;
                let start = positions[edge.producer.0];
                let end = edge
                    .consumers
                    .iter()
                    .map(|(n, _)| positions[n.0])
                    .max()
                    .unwrap_or(start);
                let request = BufferRequest::new(kind, edge.desc.element_count(), start, end);
                Ok(if edge.pinned { request.pinned() } else { request })
            })
            .collect::<ForgeResult<Vec<_>>>()?;

        let plan = MemoryPlanner::new().plan(&requests);
        for (index, edge) in self.edges.iter_mut().enumerate() {
            edge.status = match plan.shares_with(index) {
                Some(owner) => EdgeStatus::SharesWith(EdgeId(owner)),
                None => EdgeStatus::Allocated(plan.buffer_of(index)),
            };
        }
        Ok(plan)
    }

    fn bind_kernels(&mut self, order: &[NodeId], config: &GraphConfig) -> ForgeResult<()> {
        for &id in order {
            let inputs = self.descs(&self.nodes[id.0].inputs);
            let outputs = self.descs(&self.nodes[id.0].outputs);
            let node = &mut self.nodes[id.0];
            let name = node.name.clone();
            node.bind_kernel(&KernelContext {
                node: &name,
                inputs: &inputs,
                outputs: &outputs,
                config,
            })?;
        }

        for output in &mut self.outputs {
            let edge = &self.edges[output.edge.0].desc;
            let declared = &output.desc;
            let precision = if declared.precision.is_specified() {
                declared.precision
            } else {
                edge.precision
            };
            let layout = if !declared.layout.is_any() && declared.layout.fits_rank(edge.rank()) {
                declared.layout
            } else {
                Layout::default_for_rank(edge.rank())
            };
            output.desc = TensorDesc::new(precision, edge.dims.clone(), layout);
        }
        Ok(())
    }
}
