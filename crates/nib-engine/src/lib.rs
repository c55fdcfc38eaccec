//! NIB Engine
//!
//! The VM side of the native interface bridge:
//! - **Handles**: generation-checked handle table (`handles` module)
//! - **Coercion**: strict/permissive scalar access (`coerce` module)
//! - **Dispatch**: unified call protocol and interrupts (`dispatch` module)
//! - **Heap**: handle-addressed blocks with slot protection (`heap` module)
//! - **Diagnostics**: per-module report queues (`diagnostics` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use nib_engine::{Vm, nib_sdk::{create_native, Environment, FunctionMap}};
//!
//! let vm = Vm::new();
//! let loader = |map: &mut dyn FunctionMap| {
//!     map.insert("answer", create_native(0, |env, _| env.new_int(42)));
//! };
//! let module = vm.load_library("demo", &loader)?;
//! let env = vm.module_environment(module)?;
//! let answer = env.get_function("answer").unwrap();
//! assert_eq!(env.call_int_function_a(answer, &[])?, 42);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub use nib_sdk;

// ============================================================================
// Core Modules
// ============================================================================

mod coerce;
pub mod defaults;
mod diagnostics;
pub mod dispatch;
pub mod environment;
mod handles;
pub mod heap;
pub mod loader;
pub mod options;
pub mod value;
pub mod vm;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatch::CallFault;
pub use environment::EngineEnvironment;
pub use heap::{Block, HeapStats, Protection};
pub use loader::{FunctionRegistrar, FunctionTable, LoadError};
pub use options::{BridgeOptions, OptionsError};
pub use value::{FunctionBody, ScriptError, ScriptFn, VmValue};
pub use vm::Vm;
