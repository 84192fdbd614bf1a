//! Per-node performance records.

use std::fmt;

use serde::Serialize;

/// Whether a node ran during the last inference pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ExecStatus {
    #[default]
    NotRun,
    Executed,
}

/// Timing record for one node of the most recent `infer` call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ProfileInfo {
    pub status: ExecStatus,
    /// Wall-clock kernel time in microseconds, zero when timing is off
    pub real_time: u64,
    /// Kernel implementation, e.g. `native_FP32`
    pub exec_type: String,
    /// Operator type name
    pub layer_type: String,
    /// Position in the execution order
    pub execution_index: usize,
}

impl ProfileInfo {
    pub fn new(layer_type: impl Into<String>, exec_type: impl Into<String>, execution_index: usize) -> Self {
        Self {
            status: ExecStatus::NotRun,
            real_time: 0,
            exec_type: exec_type.into(),
            layer_type: layer_type.into(),
            execution_index,
        }
    }

    pub fn is_executed(&self) -> bool {
        self.status == ExecStatus::Executed
    }
}

impl fmt::Display for ProfileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} ({}) {:?} {}us",
            self.execution_index, self.layer_type, self.exec_type, self.status, self.real_time
        )
    }
}
