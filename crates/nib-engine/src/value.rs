//! VM-internal value model
//!
//! `VmValue` is what the interpreter passes around: scalars by value, and
//! modules, functions and heap blocks by reference (`Ref`). The objects a
//! handle can address live in the handle table as [`Object`]s.

use std::fmt;
use std::sync::Arc;

use nib_sdk::{Handle, NativeFunction};
use rustc_hash::FxHashMap;

use crate::heap::Block;

/// A VM value as seen by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmValue {
    /// Absence of a value
    Null,
    /// 8-bit integer
    Byte(i8),
    /// 16-bit integer
    Short(i16),
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// UTF-8 string
    String(String),
    /// Reference to a module, function or heap block
    Ref(Handle),
}

impl VmValue {
    /// Get type name for diagnostics
    pub const fn type_name(&self) -> &'static str {
        match self {
            VmValue::Null => "null",
            VmValue::Byte(_) => "byte",
            VmValue::Short(_) => "short",
            VmValue::Int(_) => "int",
            VmValue::Long(_) => "long",
            VmValue::String(_) => "string",
            VmValue::Ref(_) => "reference",
        }
    }

    /// Check if this is one of the four integer widths
    pub const fn is_number(&self) -> bool {
        matches!(
            self,
            VmValue::Byte(_) | VmValue::Short(_) | VmValue::Int(_) | VmValue::Long(_)
        )
    }

    /// Widen any integer to i64
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            VmValue::Byte(v) => Some(*v as i64),
            VmValue::Short(v) => Some(*v as i64),
            VmValue::Int(v) => Some(*v as i64),
            VmValue::Long(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i32> for VmValue {
    fn from(v: i32) -> Self {
        VmValue::Int(v)
    }
}

impl From<i64> for VmValue {
    fn from(v: i64) -> Self {
        VmValue::Long(v)
    }
}

impl From<&str> for VmValue {
    fn from(v: &str) -> Self {
        VmValue::String(v.to_string())
    }
}

impl From<String> for VmValue {
    fn from(v: String) -> Self {
        VmValue::String(v)
    }
}

// ============================================================================
// Script functions
// ============================================================================

/// Fault raised by a script function body
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    /// Script threw or trapped
    #[error("Script trapped: {0}")]
    Trap(String),

    /// Script received an argument of the wrong type
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },
}

/// Body of a bytecode function, supplied by the interpreter.
pub type ScriptFn =
    Arc<dyn Fn(&[VmValue]) -> Result<Option<VmValue>, ScriptError> + Send + Sync>;

/// What runs when a function is called
#[derive(Clone)]
pub enum FunctionBody {
    /// Registered by a native library
    Native(NativeFunction),
    /// Executed by the interpreter
    Script(ScriptFn),
}

impl fmt::Debug for FunctionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionBody::Native(n) => write!(f, "Native(argc={})", n.argc()),
            FunctionBody::Script(_) => write!(f, "Script"),
        }
    }
}

// ============================================================================
// Table objects
// ============================================================================

/// A loaded module
#[derive(Debug, Clone)]
pub(crate) struct ModuleObject {
    pub(crate) name: String,
    /// Function name → function handle
    pub(crate) functions: FxHashMap<String, Handle>,
    /// Synthetic function owning top-level code
    pub(crate) init: Handle,
}

/// A function inside a module
#[derive(Debug, Clone)]
pub(crate) struct FunctionObject {
    pub(crate) name: String,
    /// Owning module
    pub(crate) module: Handle,
    /// Declared arity
    pub(crate) argc: usize,
    pub(crate) body: FunctionBody,
}

/// Everything a handle can address
#[derive(Debug)]
pub(crate) enum Object {
    /// Scalar value, never `VmValue::Ref` or `VmValue::Null`
    Value(VmValue),
    Module(ModuleObject),
    Function(FunctionObject),
    Block(Block),
}

impl Object {
    pub(crate) const fn kind(&self) -> &'static str {
        match self {
            Object::Value(v) => v.type_name(),
            Object::Module(_) => "module",
            Object::Function(_) => "function",
            Object::Block(_) => "block",
        }
    }

    /// Whether this object lives until explicitly freed rather than with the
    /// environment that minted it
    pub(crate) const fn is_reference(&self) -> bool {
        !matches!(self, Object::Value(_))
    }
}
