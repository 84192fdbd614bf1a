//! Execution context over a shared compiled graph.

use std::collections::BTreeMap;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{ForgeError, ForgeResult};
use crate::graph::compiled::CompiledGraph;
use crate::graph::edge::EdgeId;
use crate::memory::MemoryPool;
use crate::profiling::{ExecStatus, KernelTimer, ProfileInfo};
use crate::tensor::{reorder::reorder, Blob, Storage, TensorDesc};

/// Working memory for one stream of inference calls.
///
/// Every request owns its buffers, so requests over the same
/// [`CompiledGraph`] can run on different threads at once.
#[derive(Debug)]
pub struct InferRequest {
    graph: Arc<CompiledGraph>,
    pool: MemoryPool,
    perf: BTreeMap<String, ProfileInfo>,
}

impl InferRequest {
    pub fn new(graph: Arc<CompiledGraph>) -> Self {
        let pool = MemoryPool::from_plan(&graph.plan);
        tracing::debug!(
            buffers = pool.len(),
            bytes = pool.byte_size(),
            "infer request for '{}'",
            graph.name
        );
        let perf = graph
            .order
            .iter()
            .enumerate()
            .map(|(index, &id)| {
                let node = graph.node(id);
                (
                    node.name.clone(),
                    ProfileInfo::new(node.kind().type_name(), node.exec_type(), index),
                )
            })
            .collect();
        Self { graph, pool, perf }
    }

    pub fn graph(&self) -> &Arc<CompiledGraph> {
        &self.graph
    }

    pub fn input_info(&self) -> BTreeMap<String, TensorDesc> {
        self.graph.input_info()
    }

    pub fn output_info(&self) -> BTreeMap<String, TensorDesc> {
        self.graph.output_info()
    }

    /// Copy `blob` into the named input, converting format if needed and
    /// subtracting the input's mean image.
    pub fn push_input(&mut self, name: &str, blob: &Blob) -> ForgeResult<()> {
        let edge = self
            .graph
            .input_edge(name)
            .ok_or_else(|| ForgeError::UnknownInput(name.to_string()))?;
        let dst_desc = &self.graph.edge(edge).desc;
        let expected = dst_desc.element_count();
        if blob.len() != expected {
            return Err(ForgeError::ShapeMismatch {
                name: name.to_string(),
                expected,
                actual: blob.len(),
            });
        }

        // Same element count but other dims: read the blob as dense data
        // of the input's dims.
        let src_desc = if blob.dims() == dst_desc.dims.as_slice() {
            blob.desc().clone()
        } else {
            TensorDesc::new(blob.precision(), dst_desc.dims.clone(), crate::tensor::Layout::Any).resolve()
        };
        let dst = self.pool.get_mut(self.graph.buffer_of(edge))?;
        let copied = src_desc.precision == dst_desc.precision
            && src_desc.strides() == dst_desc.strides()
            && dst.copy_from(blob.storage());
        if !copied {
            reorder(blob.storage(), &src_desc, dst, dst_desc)?;
        }

        if let Some(mean) = self.graph.means.get(name) {
            let data = dst.as_f32_mut().ok_or_else(|| {
                crate::internal_error!("input '{}' with a mean image is not FP32", name)
            })?;
            mean.subtract(data);
        }
        Ok(())
    }

    /// Run every node once in execution order.
    pub fn infer(&mut self) -> ForgeResult<()> {
        let graph = Arc::clone(&self.graph);
        match &graph.thread_pool {
            Some(pool) => pool.install(|| self.run(&graph)),
            None => self.run(&graph),
        }
    }

    fn run(&mut self, graph: &CompiledGraph) -> ForgeResult<()> {
        for info in self.perf.values_mut() {
            info.status = ExecStatus::NotRun;
            info.real_time = 0;
        }

        let mut timer = graph.perf_count.then(|| KernelTimer::for_kernel(graph.name.as_str()));
        for &id in &graph.order {
            let node = graph.node(id);
            let elapsed = self.run_node(
                graph,
                node.inputs(),
                node.outputs(),
                timer.as_mut(),
                |inputs, outputs| node.execute(inputs, outputs),
            )?;
            if let Some(info) = self.perf.get_mut(&node.name) {
                info.status = ExecStatus::Executed;
                info.real_time = elapsed;
            }
        }
        Ok(())
    }

    /// Lend the node its buffers, run `exec`, and give the output buffers
    /// back to the pool whether or not it failed. Returns the kernel time
    /// in microseconds when timing is on.
    fn run_node<F>(
        &mut self,
        graph: &CompiledGraph,
        inputs: &[EdgeId],
        outputs: &[EdgeId],
        mut timer: Option<&mut KernelTimer>,
        exec: F,
    ) -> ForgeResult<u64>
    where
        F: FnOnce(&[&Storage], &mut [Storage]) -> ForgeResult<()>,
    {
        let out_ids: SmallVec<[_; 2]> = outputs.iter().map(|&e| graph.buffer_of(e)).collect();
        let mut taken: SmallVec<[Storage; 2]> = SmallVec::with_capacity(out_ids.len());
        for &id in &out_ids {
            match self.pool.take(id) {
                Ok(storage) => taken.push(storage),
                Err(e) => {
                    self.give_back(&out_ids, taken)?;
                    return Err(e);
                }
            }
        }

        let result = {
            let refs: ForgeResult<SmallVec<[&Storage; 4]>> = inputs
                .iter()
                .map(|&e| self.pool.get(graph.buffer_of(e)))
                .collect();
            refs.and_then(|refs| {
                if let Some(t) = timer.as_mut() {
                    t.start();
                }
                let r = exec(&refs, &mut taken);
                if let Some(t) = timer.as_mut() {
                    t.stop();
                }
                r
            })
        };
        self.give_back(&out_ids, taken)?;
        result?;
        Ok(timer.map_or(0, |t| t.elapsed_us()))
    }

    fn give_back(
        &mut self,
        ids: &[crate::memory::BufferId],
        taken: SmallVec<[Storage; 2]>,
    ) -> ForgeResult<()> {
        for (&id, storage) in ids.iter().zip(taken) {
            self.pool.restore(id, storage)?;
        }
        Ok(())
    }

    /// Copy every output into a fresh blob, keyed by output name.
    pub fn pull_outputs(&self) -> ForgeResult<BTreeMap<String, Blob>> {
        let mut blobs = BTreeMap::new();
        for output in &self.graph.outputs {
            let mut blob = Blob::new(&output.desc)?;
            self.copy_output(output.edge, &mut blob)?;
            blobs.insert(output.name.clone(), blob);
        }
        Ok(blobs)
    }

    /// Copy the named output into a caller blob with matching element count.
    pub fn pull_output_into(&self, name: &str, blob: &mut Blob) -> ForgeResult<()> {
        let output = self
            .graph
            .output_binding(name)
            .ok_or_else(|| ForgeError::UnknownOutput(name.to_string()))?;
        self.copy_output(output.edge, blob)
    }

    fn copy_output(&self, edge: EdgeId, blob: &mut Blob) -> ForgeResult<()> {
        let src_desc = &self.graph.edge(edge).desc;
        let expected = src_desc.element_count();
        if blob.len() != expected {
            return Err(ForgeError::ShapeMismatch {
                name: self.graph.edge(edge).name.clone(),
                expected,
                actual: blob.len(),
            });
        }
        let dst_desc = if blob.dims() == src_desc.dims.as_slice() {
            blob.desc().clone()
        } else {
            TensorDesc::new(blob.precision(), src_desc.dims.clone(), crate::tensor::Layout::Any).resolve()
        };
        let src = self.pool.get(self.graph.buffer_of(edge))?;
        reorder(src, src_desc, blob.storage_mut(), &dst_desc)
    }

    /// Per-node records of the last `infer`. Every node reads `NotRun`
    /// before the first call.
    pub fn perf_counters(&self) -> &BTreeMap<String, ProfileInfo> {
        &self.perf
    }
}
