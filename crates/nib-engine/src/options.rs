//! Bridge configuration, optionally loaded from TOML.

use serde::Deserialize;

use crate::defaults::{
    DEFAULT_MAX_DIAGNOSTICS, DEFAULT_MAX_HEAP_SLOTS, DEFAULT_SEVERITY,
};

/// Errors raised while parsing options
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    /// Malformed TOML or a field of the wrong type
    #[error("Invalid bridge options: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field parsed but is out of range
    #[error("Invalid bridge option `{field}`: {reason}")]
    Invalid {
        /// Field name
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Options for creating a `Vm`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeOptions {
    /// Total slots allowed across live heap blocks
    pub max_heap_slots: usize,

    /// Reports kept per module before the oldest is dropped
    pub max_diagnostics: usize,

    /// Mirror every queued report to `tracing` at warn level
    pub log_diagnostics: bool,

    /// Severity for reports generated by the bridge itself
    pub default_severity: u32,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            max_heap_slots: DEFAULT_MAX_HEAP_SLOTS,
            max_diagnostics: DEFAULT_MAX_DIAGNOSTICS,
            log_diagnostics: true,
            default_severity: DEFAULT_SEVERITY,
        }
    }
}

impl BridgeOptions {
    /// Parse from a flat TOML table. Missing keys keep their defaults.
    ///
    /// ```toml
    /// max_heap_slots = 4096
    /// log_diagnostics = false
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, OptionsError> {
        let options: BridgeOptions = toml::from_str(source)?;
        options.validate()?;
        Ok(options)
    }

    fn validate(&self) -> Result<(), OptionsError> {
        if self.max_diagnostics == 0 {
            return Err(OptionsError::Invalid {
                field: "max_diagnostics",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
