//! Lifetime-based buffer planning.
//!
//! Each request describes one tensor: its storage kind and element count,
//! and the span of execution positions during which it must stay intact.
//! Requests are visited by start position; a buffer whose holder's span
//! ended strictly before the visited start is returned to a free pool
//! keyed by `(kind, len)` and may be handed to the next request with the
//! same key. Pinned requests never give or take a buffer.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::tensor::StorageKind;

/// Index of a planned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BufferId(pub usize);

/// Storage needed by one tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRequest {
    pub kind: StorageKind,
    pub len: usize,
    /// Execution position of the producer
    pub start: usize,
    /// Execution position of the last consumer, or `start` if none
    pub end: usize,
    /// Graph inputs and outputs
    pub pinned: bool,
}

impl BufferRequest {
    pub fn new(kind: StorageKind, len: usize, start: usize, end: usize) -> Self {
        Self {
            kind,
            len,
            start,
            end: end.max(start),
            pinned: false,
        }
    }

    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    pub fn byte_size(&self) -> usize {
        self.len * self.kind.element_size()
    }
}

/// Shape of a planned buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferSpec {
    pub kind: StorageKind,
    pub len: usize,
}

impl BufferSpec {
    pub fn byte_size(&self) -> usize {
        self.len * self.kind.element_size()
    }
}

/// Buffer assignment for every request, in request order.
#[derive(Debug, Clone, Default)]
pub struct MemoryPlan {
    buffers: Vec<BufferSpec>,
    assignments: Vec<BufferId>,
    /// First request that received each buffer
    owners: Vec<usize>,
    stats: PlanStats,
}

impl MemoryPlan {
    pub fn buffers(&self) -> &[BufferSpec] {
        &self.buffers
    }

    pub fn buffer_of(&self, request: usize) -> BufferId {
        self.assignments[request]
    }

    /// Earlier request whose buffer `request` reuses, if any.
    pub fn shares_with(&self, request: usize) -> Option<usize> {
        let owner = self.owners[self.assignments[request].0];
        (owner != request).then_some(owner)
    }

    pub fn stats(&self) -> PlanStats {
        self.stats
    }
}

/// Summary of a memory plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PlanStats {
    /// Distinct buffers allocated
    pub buffers: usize,
    /// Requests served by an earlier request's buffer
    pub shared: usize,
    /// Bytes actually allocated
    pub planned_bytes: usize,
    /// Bytes that one buffer per request would need
    pub requested_bytes: usize,
}

impl PlanStats {
    pub fn saved_bytes(&self) -> usize {
        self.requested_bytes.saturating_sub(self.planned_bytes)
    }

    pub fn reuse_percent(&self) -> f64 {
        if self.requested_bytes == 0 {
            return 0.0;
        }
        self.saved_bytes() as f64 / self.requested_bytes as f64 * 100.0
    }
}

impl fmt::Display for PlanStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PlanStats: buffers={}, shared={}, planned={}KB, requested={}KB, saved={}%",
            self.buffers,
            self.shared,
            self.planned_bytes / 1024,
            self.requested_bytes / 1024,
            self.reuse_percent() as u32
        )
    }
}

#[derive(Debug, Default)]
pub struct MemoryPlanner {
    /// Free buffers indexed by (kind, element count)
    free_pools: HashMap<(StorageKind, usize), Vec<BufferId>>,
}

impl MemoryPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(mut self, requests: &[BufferRequest]) -> MemoryPlan {
        let mut order: Vec<usize> = (0..requests.len()).collect();
        order.sort_by_key(|&i| (requests[i].start, i));

        let mut plan = MemoryPlan {
            assignments: vec![BufferId(0); requests.len()],
            ..Default::default()
        };
        // (buffer, end position) of reusable buffers still held
        let mut held: Vec<(BufferId, usize)> = Vec::new();

        for &idx in &order {
            let request = &requests[idx];
            plan.stats.requested_bytes += request.byte_size();

            held.retain(|&(buffer, end)| {
                if end < request.start {
                    let spec = plan.buffers[buffer.0];
                    self.free_pools
                        .entry((spec.kind, spec.len))
                        .or_default()
                        .push(buffer);
                    false
                } else {
                    true
                }
            });

            let reused = if request.pinned {
                None
            } else {
                self.free_pools
                    .get_mut(&(request.kind, request.len))
                    .and_then(Vec::pop)
            };

            let buffer = match reused {
                Some(buffer) => {
                    plan.stats.shared += 1;
                    buffer
                }
                None => {
                    let buffer = BufferId(plan.buffers.len());
                    let spec = BufferSpec {
                        kind: request.kind,
                        len: request.len,
                    };
                    plan.stats.planned_bytes += spec.byte_size();
                    plan.buffers.push(spec);
                    plan.owners.push(idx);
                    buffer
                }
            };
            plan.assignments[idx] = buffer;
            if !request.pinned {
                held.push((buffer, request.end));
            }
        }

        plan.stats.buffers = plan.buffers.len();
        plan
    }
}
