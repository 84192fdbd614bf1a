//! Unified error handling for cpuforge
//!
//! Every fallible operation in the crate returns [`ForgeResult`]. Errors are
//! grouped into categories so callers can tell a malformed network apart from
//! a misuse of the API or an internal bug:
//! - User errors (bad exchange names, calling `infer` too early)
//! - Model errors (malformed network description, unsupported operators)
//! - Internal errors (broken invariants, bugs)

use std::fmt;

pub use thiserror;

/// Unified error type for cpuforge
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    // ========== Descriptor Errors ==========
    /// Precision was never resolved before materializing storage
    #[error("precision is not set for {0}")]
    UnspecifiedPrecision(String),

    /// The two views of a tensor declaration disagree
    #[error("inconsistent tensor descriptor for '{name}': {reason}")]
    InconsistentDescriptor { name: String, reason: String },

    /// Storage size does not match a descriptor
    #[error("shape mismatch for '{name}': expected {expected} elements, got {actual}")]
    ShapeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    // ========== Network / Compilation Errors ==========
    /// The network description is malformed
    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    /// Layer parameter or weight blob is missing or malformed
    #[error("invalid parameter '{param}' on layer '{layer}': {reason}")]
    InvalidParameter {
        layer: String,
        param: String,
        reason: String,
    },

    /// Topological sort met a node already on the active path
    #[error("graph contains a cycle through node '{0}'")]
    CyclicGraph(String),

    /// No kernel exists for this operator kind
    #[error("operator '{kind}' of node '{node}' is not implemented")]
    UnimplementedOperator { node: String, kind: String },

    /// The operator cannot execute under the declared tensors
    #[error("node '{node}' supports no format for the declared tensors: {reason}")]
    UnsupportedFormat { node: String, reason: String },

    // ========== Call-time Errors ==========
    /// `push_input` was given an undeclared name
    #[error("unknown input '{0}'")]
    UnknownInput(String),

    /// An output lookup used an undeclared name
    #[error("unknown output '{0}'")]
    UnknownOutput(String),

    /// The graph has not been built successfully
    #[error("graph is not ready: {0}")]
    GraphNotReady(String),

    // ========== Internal Errors ==========
    /// Internal error (indicates a bug)
    #[error("internal error: {0}")]
    Internal(String),
}

impl ForgeError {
    /// Categorize the error for handling decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            ForgeError::UnknownInput(_)
            | ForgeError::UnknownOutput(_)
            | ForgeError::GraphNotReady(_)
            | ForgeError::ShapeMismatch { .. } => ErrorCategory::User,

            ForgeError::UnspecifiedPrecision(_)
            | ForgeError::InconsistentDescriptor { .. }
            | ForgeError::InvalidNetwork(_)
            | ForgeError::InvalidParameter { .. }
            | ForgeError::CyclicGraph(_)
            | ForgeError::UnimplementedOperator { .. }
            | ForgeError::UnsupportedFormat { .. } => ErrorCategory::Model,

            ForgeError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Check if this is a user-facing error (actionable by users)
    pub fn is_user_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::User)
    }

    /// Check if this is an internal error (indicates a bug)
    pub fn is_internal_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Internal)
    }
}

/// Error category for handling decisions
///
/// - User: the caller misused the API, fix the call
/// - Model: the network description cannot be compiled
/// - Internal: log and report as bug
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// User error - invalid call or exchange data
    User,
    /// Model error - network description problem
    Model,
    /// Internal error - indicates a bug
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::User => write!(f, "User"),
            ErrorCategory::Model => write!(f, "Model"),
            ErrorCategory::Internal => write!(f, "Internal"),
        }
    }
}

/// Helper type alias for Results using ForgeError
pub type ForgeResult<T> = std::result::Result<T, ForgeError>;

/// Create an internal error with context
///
/// # Examples
/// ```ignore
/// return Err(internal_error!("node {} selected twice", name));
/// ```
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::error::ForgeError::Internal($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::ForgeError::Internal(format!($fmt, $($arg)*))
    };
}

/// Create an invalid-parameter error for a layer
#[macro_export]
macro_rules! param_error {
    ($layer:expr, $param:expr, $fmt:expr $(, $arg:expr)* $(,)?) => {
        $crate::error::ForgeError::InvalidParameter {
            layer: $layer.to_string(),
            param: $param.to_string(),
            reason: format!($fmt $(, $arg)*),
        }
    };
}
