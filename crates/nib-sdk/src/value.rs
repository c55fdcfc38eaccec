//! Boundary value types
//!
//! `NativeArg` is the closed set of host representations a native library
//! may hand to the bridge. `ReturnShape` / `ReturnValue` describe what a
//! caller wants back from a call.

use crate::handle::Handle;

/// Host-native argument value, one variant per supported primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeArg {
    /// 8-bit signed integer
    Byte(i8),
    /// 16-bit signed integer
    Short(i16),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// UTF-8 string
    String(String),
    /// Opaque VM value
    Handle(Handle),
}

impl NativeArg {
    /// Get type name for diagnostics
    pub const fn type_name(&self) -> &'static str {
        match self {
            NativeArg::Byte(_) => "byte",
            NativeArg::Short(_) => "short",
            NativeArg::Int(_) => "int",
            NativeArg::Long(_) => "long",
            NativeArg::String(_) => "string",
            NativeArg::Handle(_) => "handle",
        }
    }

    /// Extract an i32 if this is an `Int`
    pub fn as_int(&self) -> Option<i32> {
        match self {
            NativeArg::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract a string slice if this is a `String`
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeArg::String(s) => Some(s),
            _ => None,
        }
    }

    /// Extract the handle if this is a `Handle`
    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            NativeArg::Handle(h) => Some(*h),
            _ => None,
        }
    }
}

impl From<i8> for NativeArg {
    fn from(v: i8) -> Self {
        NativeArg::Byte(v)
    }
}

impl From<i16> for NativeArg {
    fn from(v: i16) -> Self {
        NativeArg::Short(v)
    }
}

impl From<i32> for NativeArg {
    fn from(v: i32) -> Self {
        NativeArg::Int(v)
    }
}

impl From<i64> for NativeArg {
    fn from(v: i64) -> Self {
        NativeArg::Long(v)
    }
}

impl From<String> for NativeArg {
    fn from(v: String) -> Self {
        NativeArg::String(v)
    }
}

impl From<&str> for NativeArg {
    fn from(v: &str) -> Self {
        NativeArg::String(v.to_string())
    }
}

impl From<Handle> for NativeArg {
    fn from(v: Handle) -> Self {
        NativeArg::Handle(v)
    }
}

/// Return representation requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnShape {
    /// Discard the result
    Void,
    /// 8-bit integer
    Byte,
    /// 16-bit integer
    Short,
    /// 32-bit integer
    Int,
    /// 64-bit integer
    Long,
    /// UTF-8 string
    String,
    /// Opaque handle to whatever the callee produced
    Handle,
}

impl ReturnShape {
    /// Shape name used in diagnostic messages
    pub const fn name(&self) -> &'static str {
        match self {
            ReturnShape::Void => "void",
            ReturnShape::Byte => "byte",
            ReturnShape::Short => "short",
            ReturnShape::Int => "int",
            ReturnShape::Long => "long",
            ReturnShape::String => "string",
            ReturnShape::Handle => "handle",
        }
    }
}

/// Result of a call, already coerced to the requested `ReturnShape`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnValue {
    /// No value
    Void,
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
    /// Opaque handle (may be null)
    Handle(Handle),
}

impl ReturnValue {
    /// The value a degraded call yields for `shape`: zero, empty, or null.
    pub fn default_for(shape: ReturnShape) -> Self {
        match shape {
            ReturnShape::Void => ReturnValue::Void,
            ReturnShape::Byte => ReturnValue::Byte(0),
            ReturnShape::Short => ReturnValue::Short(0),
            ReturnShape::Int => ReturnValue::Int(0),
            ReturnShape::Long => ReturnValue::Long(0),
            ReturnShape::String => ReturnValue::String(String::new()),
            ReturnShape::Handle => ReturnValue::Handle(Handle::NULL),
        }
    }

    /// Shape this value satisfies
    pub const fn shape(&self) -> ReturnShape {
        match self {
            ReturnValue::Void => ReturnShape::Void,
            ReturnValue::Byte(_) => ReturnShape::Byte,
            ReturnValue::Short(_) => ReturnShape::Short,
            ReturnValue::Int(_) => ReturnShape::Int,
            ReturnValue::Long(_) => ReturnShape::Long,
            ReturnValue::String(_) => ReturnShape::String,
            ReturnValue::Handle(_) => ReturnShape::Handle,
        }
    }

    /// Byte payload, or 0
    pub fn into_byte(self) -> i8 {
        match self {
            ReturnValue::Byte(v) => v,
            _ => 0,
        }
    }

    /// Short payload, or 0
    pub fn into_short(self) -> i16 {
        match self {
            ReturnValue::Short(v) => v,
            _ => 0,
        }
    }

    /// Int payload, or 0
    pub fn into_int(self) -> i32 {
        match self {
            ReturnValue::Int(v) => v,
            _ => 0,
        }
    }

    /// Long payload, or 0
    pub fn into_long(self) -> i64 {
        match self {
            ReturnValue::Long(v) => v,
            _ => 0,
        }
    }

    /// String payload, or empty
    pub fn into_string(self) -> String {
        match self {
            ReturnValue::String(v) => v,
            _ => String::new(),
        }
    }

    /// Handle payload, or null
    pub fn into_handle(self) -> Handle {
        match self {
            ReturnValue::Handle(v) => v,
            _ => Handle::NULL,
        }
    }
}
