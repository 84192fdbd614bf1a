//! Tensor memory planning
//!
//! Compilation assigns every edge a buffer through [`MemoryPlanner`]:
//! edges whose lifetimes do not overlap and that need identical storage
//! share one buffer. Each inference request then materializes the plan once
//! as a [`MemoryPool`] and never allocates again while executing.

pub mod planner;
pub mod pool;

pub use planner::{BufferId, BufferRequest, BufferSpec, MemoryPlan, MemoryPlanner, PlanStats};
pub use pool::MemoryPool;
