//! Recoverable fault records
//!
//! A `DiagnosticReport` is what the engine queues when it detects a fault it
//! can route around. Native code polls for them through the `Environment`.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::handle::Handle;

/// Severity levels used by the engine. Higher is more severe.
pub mod severity {
    /// Informational, the call produced its normal result
    pub const NOTICE: u32 = 0;
    /// Degraded result (default value substituted)
    pub const WARNING: u32 = 1;
    /// Operation was skipped
    pub const ERROR: u32 = 2;
    /// Callee faulted while running
    pub const CRITICAL: u32 = 3;
}

/// Underlying fault attached to a report
pub type Cause = Arc<dyn Error + Send + Sync + 'static>;

/// Immutable record of a recoverable fault.
#[derive(Clone)]
pub struct DiagnosticReport {
    module: Handle,
    function: Handle,
    caused_by_native: bool,
    severity: u32,
    cause: Option<Cause>,
    message: String,
}

impl DiagnosticReport {
    /// Create a report. `module` and `function` must be non-null.
    pub fn new(
        module: Handle,
        function: Handle,
        caused_by_native: bool,
        severity: u32,
        message: impl Into<String>,
    ) -> Self {
        debug_assert!(!module.is_null(), "diagnostic module handle is null");
        debug_assert!(!function.is_null(), "diagnostic function handle is null");
        Self {
            module,
            function,
            caused_by_native,
            severity,
            cause: None,
            message: message.into(),
        }
    }

    /// Attach the underlying fault
    pub fn with_cause(mut self, cause: Cause) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Module the fault occurred in. Never null.
    pub fn module(&self) -> Handle {
        self.module
    }

    /// Function the fault occurred in. Never null.
    pub fn function(&self) -> Handle {
        self.function
    }

    /// Whether native code (rather than a script or the VM) produced the fault
    pub fn caused_by_native(&self) -> bool {
        self.caused_by_native
    }

    /// Severity, higher is worse
    pub fn severity(&self) -> u32 {
        self.severity
    }

    /// Underlying fault, if there was one
    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    /// Message, empty if none was given
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Field-wise equality. `cause` compares by identity.
    pub fn same_as(&self, other: &DiagnosticReport) -> bool {
        let same_cause = match (&self.cause, &other.cause) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        self.module == other.module
            && self.function == other.function
            && self.caused_by_native == other.caused_by_native
            && self.severity == other.severity
            && self.message == other.message
            && same_cause
    }
}

impl fmt::Debug for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticReport")
            .field("module", &self.module)
            .field("function", &self.function)
            .field("caused_by_native", &self.caused_by_native)
            .field("severity", &self.severity)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[severity {}] {}", self.severity, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {})", cause)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    fn report() -> DiagnosticReport {
        DiagnosticReport::new(
            Handle::from_parts(1, 1),
            Handle::from_parts(2, 1),
            true,
            severity::WARNING,
            "mismatch",
        )
    }

    #[test]
    fn test_accessors() {
        let r = report();
        assert_eq!(r.module(), Handle::from_parts(1, 1));
        assert_eq!(r.function(), Handle::from_parts(2, 1));
        assert!(r.caused_by_native());
        assert_eq!(r.severity(), severity::WARNING);
        assert!(r.cause().is_none());
        assert_eq!(r.message(), "mismatch");
    }

    #[test]
    fn test_clone_is_same() {
        let r = report().with_cause(Arc::new(Boom));
        let c = r.clone();
        assert!(r.same_as(&c));
    }

    #[test]
    fn test_display_includes_cause() {
        let r = report().with_cause(Arc::new(Boom));
        assert_eq!(r.to_string(), "[severity 1] mismatch (caused by: boom)");
    }

    #[test]
    fn test_empty_message() {
        let r = DiagnosticReport::new(
            Handle::from_parts(1, 1),
            Handle::from_parts(1, 2),
            false,
            severity::NOTICE,
            "",
        );
        assert_eq!(r.message(), "");
    }
}
