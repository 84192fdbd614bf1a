//! Materialized buffers of a memory plan.

use crate::error::ForgeResult;
use crate::memory::planner::{BufferId, MemoryPlan};
use crate::tensor::Storage;

/// One [`Storage`] per planned buffer, allocated up front.
///
/// Nodes borrow their input buffers immutably and temporarily take their
/// output buffers out of the pool; the plan guarantees a node never reads
/// and writes the same buffer.
#[derive(Debug, Default)]
pub struct MemoryPool {
    buffers: Vec<Storage>,
}

impl MemoryPool {
    pub fn from_plan(plan: &MemoryPlan) -> Self {
        Self {
            buffers: plan
                .buffers()
                .iter()
                .map(|spec| Storage::zeroed(spec.kind, spec.len))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn byte_size(&self) -> usize {
        self.buffers.iter().map(Storage::byte_size).sum()
    }

    pub fn get(&self, id: BufferId) -> ForgeResult<&Storage> {
        self.buffers
            .get(id.0)
            .ok_or_else(|| crate::internal_error!("buffer {} out of range", id.0))
    }

    pub fn get_mut(&mut self, id: BufferId) -> ForgeResult<&mut Storage> {
        self.buffers
            .get_mut(id.0)
            .ok_or_else(|| crate::internal_error!("buffer {} out of range", id.0))
    }

    /// Move a buffer out, leaving an empty placeholder.
    pub fn take(&mut self, id: BufferId) -> ForgeResult<Storage> {
        Ok(std::mem::take(self.get_mut(id)?))
    }

    /// Put back a buffer obtained from [`MemoryPool::take`].
    pub fn restore(&mut self, id: BufferId, storage: Storage) -> ForgeResult<()> {
        *self.get_mut(id)? = storage;
        Ok(())
    }
}
