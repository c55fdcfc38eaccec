//! Default constants for bridge configuration.

use nib_sdk::severity;

/// Default budget of heap slots across all live blocks (1M slots).
pub const DEFAULT_MAX_HEAP_SLOTS: usize = 1 << 20;

/// Default number of reports kept per module before the oldest is dropped.
pub const DEFAULT_MAX_DIAGNOSTICS: usize = 256;

/// Default severity for reports generated by the bridge itself.
pub const DEFAULT_SEVERITY: u32 = severity::WARNING;

/// Name of the synthetic function that owns a module's top-level code.
///
/// Every module gets one so reports raised outside any named function still
/// carry a non-null function handle.
pub const MODULE_INIT_FUNCTION: &str = "<init>";
