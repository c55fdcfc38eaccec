//! Propagated bridge faults

/// Result type for bridge operations that can fail immediately
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Faults that abort the current bridge operation.
///
/// Everything else is recoverable and goes to the diagnostics queue instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Handle is null, stale, or does not address the required capability
    #[error("Bad handle: {0}")]
    BadHandle(String),

    /// Access to a protected heap location
    #[error("Security violation: {0}")]
    Security(String),
}

impl BridgeError {
    /// Shorthand for a `BadHandle` fault
    pub fn bad_handle(msg: impl Into<String>) -> Self {
        BridgeError::BadHandle(msg.into())
    }

    /// Shorthand for a `Security` fault
    pub fn security(msg: impl Into<String>) -> Self {
        BridgeError::Security(msg.into())
    }

    /// Check if this is a bad-handle fault
    pub fn is_bad_handle(&self) -> bool {
        matches!(self, BridgeError::BadHandle(_))
    }

    /// Check if this is a security fault
    pub fn is_security(&self) -> bool {
        matches!(self, BridgeError::Security(_))
    }
}
