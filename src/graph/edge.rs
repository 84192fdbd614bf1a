//! Dataflow edges: one producer port feeding one or more consumer ports.

use serde::Serialize;
use smallvec::SmallVec;

use crate::graph::node::NodeId;
use crate::memory::BufferId;
use crate::tensor::TensorDesc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EdgeId(pub usize);

/// Allocation state of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum EdgeStatus {
    #[default]
    Unallocated,
    /// Owns a freshly planned buffer
    Allocated(BufferId),
    /// Reuses the buffer first allocated for another edge
    SharesWith(EdgeId),
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub(crate) name: String,
    pub(crate) producer: NodeId,
    pub(crate) producer_port: usize,
    pub(crate) consumers: SmallVec<[(NodeId, usize); 2]>,
    /// Declared descriptor until compilation finalizes it
    pub(crate) desc: TensorDesc,
    pub(crate) status: EdgeStatus,
    /// Graph inputs and outputs keep a private buffer
    pub(crate) pinned: bool,
}

impl Edge {
    pub(crate) fn new(name: impl Into<String>, producer: NodeId, producer_port: usize, desc: TensorDesc) -> Self {
        Self {
            name: name.into(),
            producer,
            producer_port,
            consumers: SmallVec::new(),
            desc,
            status: EdgeStatus::Unallocated,
            pinned: false,
        }
    }

    /// Name of the data this edge carries.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn producer(&self) -> NodeId {
        self.producer
    }

    pub fn producer_port(&self) -> usize {
        self.producer_port
    }

    /// Consuming `(node, input port)` pairs.
    pub fn consumers(&self) -> &[(NodeId, usize)] {
        &self.consumers
    }

    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }

    pub fn status(&self) -> EdgeStatus {
        self.status
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub(crate) fn replace_consumer(&mut self, old: (NodeId, usize), new: (NodeId, usize)) {
        self.consumers.retain(|c| *c != old);
        if !self.consumers.contains(&new) {
            self.consumers.push(new);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{Layout, Precision};

    #[test]
    fn test_replace_consumer_deduplicates() {
        let desc = TensorDesc::new(Precision::FP32, vec![2], Layout::C);
        let mut edge = Edge::new("x", NodeId(0), 0, desc);
        edge.consumers.push((NodeId(1), 0));
        edge.consumers.push((NodeId(2), 1));

        edge.replace_consumer((NodeId(1), 0), (NodeId(3), 0));
        edge.replace_consumer((NodeId(2), 1), (NodeId(3), 0));
        assert_eq!(edge.consumers(), &[(NodeId(3), 0)]);
        assert_eq!(edge.status(), EdgeStatus::Unallocated);
    }
}
