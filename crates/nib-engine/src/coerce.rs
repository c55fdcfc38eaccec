//! Value coercion layer
//!
//! Converts between boundary types (`NativeArg`, `ReturnValue`, `Handle`)
//! and `VmValue`. Numeric accessors come in two modes:
//!
//! - strict: the value must be exactly the requested width
//! - permissive: any integer width is accepted and cast with `as`
//!   (truncating on narrowing, sign-extending on widening)
//!
//! Anything non-numeric fails in both modes.

use nib_sdk::{BridgeError, BridgeResult, Handle, NativeArg, ReturnShape, ReturnValue};

use crate::value::{Object, VmValue};
use crate::vm::VmState;

/// Integer width requested by an accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Width {
    Byte,
    Short,
    Int,
    Long,
}

impl Width {
    const fn name(self) -> &'static str {
        match self {
            Width::Byte => "byte",
            Width::Short => "short",
            Width::Int => "int",
            Width::Long => "long",
        }
    }

    const fn matches(self, value: &VmValue) -> bool {
        matches!(
            (self, value),
            (Width::Byte, VmValue::Byte(_))
                | (Width::Short, VmValue::Short(_))
                | (Width::Int, VmValue::Int(_))
                | (Width::Long, VmValue::Long(_))
        )
    }
}

impl VmState {
    fn scalar(&self, handle: Handle, wanted: &str) -> BridgeResult<&VmValue> {
        match self.table.get(handle) {
            Some(Object::Value(value)) => Ok(value),
            Some(other) => Err(BridgeError::bad_handle(format!(
                "{:?} addresses a {}, expected {}",
                handle,
                other.kind(),
                wanted
            ))),
            None => Err(BridgeError::bad_handle(format!(
                "{:?} is null or stale, expected {}",
                handle, wanted
            ))),
        }
    }

    /// Read an integer as i64 after the strict/permissive check. The caller
    /// narrows with `as`.
    pub(crate) fn get_number(&self, handle: Handle, width: Width, strict: bool) -> BridgeResult<i64> {
        let value = self.scalar(handle, width.name())?;
        if strict && !width.matches(value) {
            return Err(BridgeError::bad_handle(format!(
                "{:?} holds a {}, strict access expected {}",
                handle,
                value.type_name(),
                width.name()
            )));
        }
        value.as_i64().ok_or_else(|| {
            BridgeError::bad_handle(format!(
                "{:?} holds a {}, expected a number",
                handle,
                value.type_name()
            ))
        })
    }

    pub(crate) fn get_string(&self, handle: Handle) -> BridgeResult<String> {
        match self.scalar(handle, "string")? {
            VmValue::String(s) => Ok(s.clone()),
            other => Err(BridgeError::bad_handle(format!(
                "{:?} holds a {}, expected string",
                handle,
                other.type_name()
            ))),
        }
    }

    /// Total predicate over whatever `handle` addresses
    pub(crate) fn test(&self, handle: Handle, predicate: impl FnOnce(&Object) -> bool) -> bool {
        self.table.get(handle).is_some_and(predicate)
    }

    /// Snapshot of what `handle` addresses as a `VmValue`.
    ///
    /// Null maps to `VmValue::Null`, references to `VmValue::Ref`. `None`
    /// means the handle is stale or forged.
    pub(crate) fn value_of(&self, handle: Handle) -> Option<VmValue> {
        if handle.is_null() {
            return Some(VmValue::Null);
        }
        match self.table.get(handle)? {
            Object::Value(value) => Some(value.clone()),
            _ => Some(VmValue::Ref(handle)),
        }
    }

    /// Coerce a native argument into a VM value
    pub(crate) fn arg_to_value(&self, arg: &NativeArg) -> BridgeResult<VmValue> {
        Ok(match arg {
            NativeArg::Byte(v) => VmValue::Byte(*v),
            NativeArg::Short(v) => VmValue::Short(*v),
            NativeArg::Int(v) => VmValue::Int(*v),
            NativeArg::Long(v) => VmValue::Long(*v),
            NativeArg::String(s) => VmValue::String(s.clone()),
            NativeArg::Handle(h) => self.value_of(*h).ok_or_else(|| {
                BridgeError::bad_handle(format!("argument {:?} is stale", h))
            })?,
        })
    }

    /// Store a VM value and hand out a handle for it.
    ///
    /// References come back as the handle they already are; scalars get a
    /// fresh slot.
    pub(crate) fn mint(&mut self, value: VmValue) -> Handle {
        match value {
            VmValue::Null => Handle::NULL,
            VmValue::Ref(handle) => handle,
            scalar => self.table.insert(Object::Value(scalar)),
        }
    }
}

/// Convert a VM value into the argument form native code receives
pub(crate) fn value_to_arg(value: &VmValue) -> NativeArg {
    match value {
        VmValue::Null => NativeArg::Handle(Handle::NULL),
        VmValue::Byte(v) => NativeArg::Byte(*v),
        VmValue::Short(v) => NativeArg::Short(*v),
        VmValue::Int(v) => NativeArg::Int(*v),
        VmValue::Long(v) => NativeArg::Long(*v),
        VmValue::String(s) => NativeArg::String(s.clone()),
        VmValue::Ref(h) => NativeArg::Handle(*h),
    }
}

/// Match a callee's result against a value shape.
///
/// Exact representation only; `None` means mismatch. `ReturnShape::Handle`
/// is not a value shape and is handled by the dispatcher.
pub(crate) fn coerce_return(value: Option<&VmValue>, shape: ReturnShape) -> Option<ReturnValue> {
    match (shape, value) {
        (ReturnShape::Void, _) => Some(ReturnValue::Void),
        (ReturnShape::Byte, Some(VmValue::Byte(v))) => Some(ReturnValue::Byte(*v)),
        (ReturnShape::Short, Some(VmValue::Short(v))) => Some(ReturnValue::Short(*v)),
        (ReturnShape::Int, Some(VmValue::Int(v))) => Some(ReturnValue::Int(*v)),
        (ReturnShape::Long, Some(VmValue::Long(v))) => Some(ReturnValue::Long(*v)),
        (ReturnShape::String, Some(VmValue::String(s))) => Some(ReturnValue::String(s.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::BridgeOptions;

    fn state() -> VmState {
        VmState::new(BridgeOptions::default())
    }

    #[test]
    fn test_strict_requires_exact_width() {
        let mut s = state();
        let h = s.mint(VmValue::Short(7));
        assert_eq!(s.get_number(h, Width::Short, true).unwrap(), 7);
        assert!(s.get_number(h, Width::Int, true).unwrap_err().is_bad_handle());
        assert!(s.get_number(h, Width::Byte, true).is_err());
    }

    #[test]
    fn test_permissive_widens_and_truncates() {
        let mut s = state();
        let h = s.mint(VmValue::Long(0x1_0000_0102));
        let v = s.get_number(h, Width::Byte, false).unwrap();
        assert_eq!(v as i8, 0x02);
        assert_eq!(s.get_number(h, Width::Short, false).unwrap() as i16, 0x0102);

        let b = s.mint(VmValue::Byte(-3));
        assert_eq!(s.get_number(b, Width::Long, false).unwrap(), -3);
    }

    #[test]
    fn test_non_numeric_fails_both_modes() {
        let mut s = state();
        let h = s.mint(VmValue::String("12".into()));
        assert!(s.get_number(h, Width::Int, false).is_err());
        assert!(s.get_number(h, Width::Int, true).is_err());
        assert!(s.get_number(Handle::NULL, Width::Int, false).is_err());
    }

    #[test]
    fn test_string_access() {
        let mut s = state();
        let h = s.mint(VmValue::String("hello".into()));
        assert_eq!(s.get_string(h).unwrap(), "hello");
        let n = s.mint(VmValue::Int(1));
        assert!(s.get_string(n).unwrap_err().is_bad_handle());
    }

    #[test]
    fn test_mint_passes_references_through() {
        let mut s = state();
        let r = Handle::from_parts(3, 1);
        assert_eq!(s.mint(VmValue::Ref(r)), r);
        assert_eq!(s.mint(VmValue::Null), Handle::NULL);
    }

    #[test]
    fn test_stale_argument_rejected() {
        let mut s = state();
        let h = s.mint(VmValue::Int(1));
        s.table.remove(h);
        assert!(s.arg_to_value(&NativeArg::Handle(h)).is_err());
        assert_eq!(
            s.arg_to_value(&NativeArg::Handle(Handle::NULL)).unwrap(),
            VmValue::Null
        );
    }

    #[test]
    fn test_coerce_return_exact_only() {
        let int = VmValue::Int(4);
        assert_eq!(coerce_return(Some(&int), ReturnShape::Int), Some(ReturnValue::Int(4)));
        assert_eq!(coerce_return(Some(&int), ReturnShape::Long), None);
        assert_eq!(coerce_return(None, ReturnShape::String), None);
        assert_eq!(coerce_return(None, ReturnShape::Void), Some(ReturnValue::Void));
    }
}
