//! cpuforge - CPU Inference Runtime
//!
//! Compiles a static network description into a dataflow graph of
//! operator nodes, picks a memory format and kernel per node, plans
//! buffer reuse, and then runs repeated inference passes over the
//! compiled plan.

#![allow(clippy::needless_range_loop)] // Index loops mirror tensor math
#![allow(clippy::new_without_default)]

pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod memory;
pub mod ops;
pub mod profiling;
pub mod tensor;

pub use config::GraphConfig;
pub use error::{ErrorCategory, ForgeError, ForgeResult};
pub use graph::{
    CompiledGraph, Edge, EdgeId, EdgeStatus, Graph, GraphStatus, InferRequest, Layer, Network,
    Node, NodeId, NodeState,
};
pub use memory::{MemoryPlanner, PlanStats};
pub use ops::{NodeFactory, OperatorKind, PortConfig};
pub use profiling::{ExecStatus, KernelTimer, ProfileInfo, ScopedTimer};
pub use tensor::{Blob, Data, Layout, Precision, TensorDesc};
