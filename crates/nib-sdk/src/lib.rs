//! NIB SDK - contract types for native libraries
//!
//! A native library compiles against this crate only. It receives a
//! `&dyn Environment` on every call and talks to the VM exclusively through
//! opaque [`Handle`]s.
//!
//! # Example
//!
//! ```ignore
//! use nib_sdk::{create_native, Environment, FunctionMap, Handle, NativeLoader};
//!
//! struct MathLib;
//!
//! impl NativeLoader for MathLib {
//!     fn inject_methods(&self, functions: &mut dyn FunctionMap) {
//!         functions.insert("add", create_native(2, |env, args| {
//!             let a = args[0].as_int().unwrap_or(0);
//!             let b = args[1].as_int().unwrap_or(0);
//!             env.new_int(a.wrapping_add(b))
//!         }));
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod diagnostic;
pub mod environment;
pub mod error;
pub mod function;
pub mod handle;
pub mod interrupt;
pub mod types;
pub mod value;

pub use diagnostic::{severity, Cause, DiagnosticReport};
pub use environment::{Environment, EnvironmentExt, IntoNativeArgs};
pub use error::{BridgeError, BridgeResult};
pub use function::{create_native, FunctionMap, NativeFn, NativeFunction, NativeLoader};
pub use handle::Handle;
pub use interrupt::{InterruptHandler, InterruptResult, NoopInterruptHandler, Opcode};
pub use types::{Function, NativeBlock};
pub use value::{NativeArg, ReturnShape, ReturnValue};
