//! Error types for the action pipeline and capability dispatch layers.

use std::path::PathBuf;

/// Result type alias for pipeline and capability operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or running actions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Pipeline Construction Errors
    // =========================================================================
    /// A middleware specification could not be resolved to something callable.
    #[error("invalid middleware '{spec}': {reason}")]
    InvalidMiddleware { spec: String, reason: String },

    /// The action identifier is not registered and not directly runnable.
    #[error("invalid action: '{0}' is not a registered action")]
    InvalidAction(String),

    // =========================================================================
    // Capability Errors
    // =========================================================================
    /// No capability host candidate matched during autodetection.
    #[error("no {kind} implementation detected")]
    CapabilityHostNotDetected { kind: String },

    /// An explicitly requested capability host does not exist.
    #[error("requested capability host '{value}' is not registered")]
    CapabilityHostExplicitNotDetected { value: String },

    /// No level of the host chain implements the capability.
    #[error("capability '{cap}' not found for host '{host}'")]
    CapabilityNotFound { cap: String, host: String },

    /// The capability is registered but the implementation does not provide it.
    #[error("capability '{cap}' is registered for host '{host}' but is not implemented")]
    CapabilityInvalid { cap: String, host: String },

    /// The parent links of a capability host form a cycle.
    #[error("capability host '{name}' has a cyclic parent chain")]
    CapabilityHostCycle { name: String },

    /// Capability dispatch was attempted before detection.
    #[error("capability host has not been detected")]
    CapabilityHostNotInitialized,

    // =========================================================================
    // Locking Errors
    // =========================================================================
    /// The lock is held by another action.
    #[error("resource '{name}' is locked by another running action")]
    Locked { name: String },

    /// The lock file could not be created or locked.
    #[error("failed to lock {path}: {reason}")]
    LockFailed { path: PathBuf, reason: String },

    // =========================================================================
    // Execution Errors
    // =========================================================================
    /// The action was interrupted and unwound cooperatively.
    #[error("action interrupted")]
    Interrupted,

    /// A middleware failed.
    #[error("action '{action}' failed: {reason}")]
    ActionFailed { action: String, reason: String },

    /// One or more jobs of a batch run failed.
    #[error("{} batch job(s) failed: {}", failures.len(), failures.join("; "))]
    Batch { failures: Vec<String> },

    // =========================================================================
    // Driver Errors
    // =========================================================================
    /// The VM driver reported a failure.
    #[error("driver operation '{operation}' failed: {reason}")]
    Driver { operation: String, reason: String },

    /// Operation not supported by this driver or UI.
    #[error("operation not supported: {0}")]
    NotSupported(String),

    // =========================================================================
    // I/O and Configuration Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if this error is a cooperative interruption.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Shorthand for a middleware failure.
    pub fn action_failed(action: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ActionFailed {
            action: action.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
