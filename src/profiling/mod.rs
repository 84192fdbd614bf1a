//! Profiling infrastructure
//!
//! - [`kernel_timer`] - wall-clock timers for node kernels and compile stages
//! - [`perf`] - per-node records returned by `Graph::perf_counters`

pub mod kernel_timer;
pub mod perf;

pub use kernel_timer::{KernelTimer, ScopedTimer};
pub use perf::{ExecStatus, ProfileInfo};
