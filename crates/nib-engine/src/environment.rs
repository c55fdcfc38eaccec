//! Engine implementation of the `Environment` facade
//!
//! `EngineEnvironment` binds a `Vm` to the module and function that are
//! running, which is where reports land and which module
//! `get_function(name)` searches. Scalar handles minted through an
//! environment are local to it and released when it drops.

use std::cell::RefCell;

use nib_sdk::{
    BridgeError, BridgeResult, DiagnosticReport, Environment, Handle, NativeArg, Opcode,
    ReturnShape, ReturnValue,
};

use crate::coerce::Width;
use crate::diagnostics::CallSite;
use crate::value::{Object, VmValue};
use crate::vm::{Vm, VmState};

/// Engine's concrete implementation of `Environment`.
pub struct EngineEnvironment<'vm> {
    pub(crate) vm: &'vm Vm,
    pub(crate) module: Handle,
    pub(crate) function: Handle,
    locals: RefCell<Vec<Handle>>,
}

impl<'vm> EngineEnvironment<'vm> {
    pub(crate) fn new(vm: &'vm Vm, module: Handle, function: Handle) -> Self {
        Self {
            vm,
            module,
            function,
            locals: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn site(&self) -> CallSite {
        CallSite {
            module: self.module,
            function: self.function,
        }
    }

    /// Function this environment is bound to
    pub fn function(&self) -> Handle {
        self.function
    }

    /// Number of scalar handles owned by this environment
    pub fn local_count(&self) -> usize {
        self.locals.borrow().len()
    }

    /// Mint a handle under an already-held lock and record scalars as locals
    pub(crate) fn mint_in(&self, state: &mut VmState, value: VmValue) -> Handle {
        let scalar = !matches!(value, VmValue::Null | VmValue::Ref(_));
        let handle = state.mint(value);
        if scalar {
            self.locals.borrow_mut().push(handle);
        }
        handle
    }

    fn mint(&self, value: VmValue) -> Handle {
        let mut state = self.vm.state.lock();
        self.mint_in(&mut state, value)
    }

    fn number(&self, handle: Handle, width: Width, strict: bool) -> BridgeResult<i64> {
        self.vm.state.lock().get_number(handle, width, strict)
    }

    fn test(&self, handle: Handle, predicate: impl FnOnce(&Object) -> bool) -> bool {
        self.vm.state.lock().test(handle, predicate)
    }
}

impl Drop for EngineEnvironment<'_> {
    fn drop(&mut self) {
        let locals = std::mem::take(self.locals.get_mut());
        if locals.is_empty() {
            return;
        }
        let mut state = self.vm.state.lock();
        let released = locals.into_iter().filter(|h| state.release(*h)).count();
        tracing::debug!(target: "nib", function = ?self.function, released, "released local handles");
    }
}

impl Environment for EngineEnvironment<'_> {
    // ========================================================================
    // Modules & Diagnostics
    // ========================================================================

    fn get_module(&self, name: &str) -> Option<Handle> {
        self.vm.get_module(name)
    }

    fn current_module(&self) -> Handle {
        self.module
    }

    fn preview_latest_error(&self) -> Option<DiagnosticReport> {
        self.vm.state.lock().diagnostics.peek_latest(self.module)
    }

    fn get_latest_error(&self) -> Option<DiagnosticReport> {
        self.vm.state.lock().diagnostics.pop_latest(self.module)
    }

    fn get_all_errors(&self) -> Vec<DiagnosticReport> {
        self.vm.state.lock().diagnostics.drain(self.module)
    }

    // ========================================================================
    // Value Reading
    // ========================================================================

    fn get_byte(&self, handle: Handle, strict: bool) -> BridgeResult<i8> {
        self.number(handle, Width::Byte, strict).map(|v| v as i8)
    }

    fn get_short(&self, handle: Handle, strict: bool) -> BridgeResult<i16> {
        self.number(handle, Width::Short, strict).map(|v| v as i16)
    }

    fn get_int(&self, handle: Handle, strict: bool) -> BridgeResult<i32> {
        self.number(handle, Width::Int, strict).map(|v| v as i32)
    }

    fn get_long(&self, handle: Handle, strict: bool) -> BridgeResult<i64> {
        self.number(handle, Width::Long, strict)
    }

    fn get_string(&self, handle: Handle) -> BridgeResult<String> {
        self.vm.state.lock().get_string(handle)
    }

    // ========================================================================
    // Value Creation
    // ========================================================================

    fn new_byte(&self, value: i8) -> Handle {
        self.mint(VmValue::Byte(value))
    }

    fn new_short(&self, value: i16) -> Handle {
        self.mint(VmValue::Short(value))
    }

    fn new_int(&self, value: i32) -> Handle {
        self.mint(VmValue::Int(value))
    }

    fn new_long(&self, value: i64) -> Handle {
        self.mint(VmValue::Long(value))
    }

    fn new_string(&self, value: &str) -> Handle {
        self.mint(VmValue::String(value.to_string()))
    }

    // ========================================================================
    // Predicates
    // ========================================================================

    fn is_byte(&self, handle: Handle) -> bool {
        self.test(handle, |o| matches!(o, Object::Value(VmValue::Byte(_))))
    }

    fn is_short(&self, handle: Handle) -> bool {
        self.test(handle, |o| matches!(o, Object::Value(VmValue::Short(_))))
    }

    fn is_int(&self, handle: Handle) -> bool {
        self.test(handle, |o| matches!(o, Object::Value(VmValue::Int(_))))
    }

    fn is_long(&self, handle: Handle) -> bool {
        self.test(handle, |o| matches!(o, Object::Value(VmValue::Long(_))))
    }

    fn is_number(&self, handle: Handle) -> bool {
        self.test(handle, |o| matches!(o, Object::Value(v) if v.is_number()))
    }

    fn is_string(&self, handle: Handle) -> bool {
        self.test(handle, |o| matches!(o, Object::Value(VmValue::String(_))))
    }

    fn is_module(&self, handle: Handle) -> bool {
        self.test(handle, |o| matches!(o, Object::Module(_)))
    }

    fn is_function(&self, handle: Handle) -> bool {
        self.test(handle, |o| matches!(o, Object::Function(_)))
    }

    fn is_block(&self, handle: Handle) -> bool {
        self.test(handle, |o| matches!(o, Object::Block(_)))
    }

    // ========================================================================
    // Function Resolution
    // ========================================================================

    fn get_function(&self, name: &str) -> Option<Handle> {
        // The bound module is live for as long as the VM is.
        self.get_function_in(self.module, name).ok().flatten()
    }

    fn get_function_in(&self, module: Handle, name: &str) -> BridgeResult<Option<Handle>> {
        let state = self.vm.state.lock();
        match state.table.get(module) {
            Some(Object::Module(m)) => Ok(m.functions.get(name).copied()),
            Some(other) => Err(BridgeError::bad_handle(format!(
                "{:?} addresses a {}, expected module",
                module,
                other.kind()
            ))),
            None => Err(BridgeError::bad_handle(format!(
                "{:?} is null or stale, expected module",
                module
            ))),
        }
    }

    // ========================================================================
    // Function Execution
    // ========================================================================

    fn call_function(
        &self,
        function: Handle,
        shape: ReturnShape,
        args: &[NativeArg],
    ) -> BridgeResult<ReturnValue> {
        self.vm.call_from(self, function, shape, args)
    }

    fn call_interrupt_function(&self, id: u16, opcode: Opcode, args: &[NativeArg]) -> Handle {
        self.vm.interrupt(self, id, opcode, args)
    }

    // ========================================================================
    // Managed Heap
    // ========================================================================

    fn alloc(&self, size: usize) -> Option<Handle> {
        self.vm.state.lock().alloc(self.site(), size)
    }

    fn re_alloc(&self, handle: Handle, new_size: usize) -> Option<Handle> {
        self.vm.state.lock().re_alloc(self.site(), handle, new_size)
    }

    fn free(&self, handle: Handle) {
        self.vm.state.lock().free(self.site(), handle)
    }

    fn block_size(&self, handle: Handle) -> BridgeResult<usize> {
        self.vm.state.lock().block_size(handle)
    }

    fn read(&self, handle: Handle, offset: usize) -> BridgeResult<Handle> {
        let mut state = self.vm.state.lock();
        let value = state.read(handle, offset)?;
        Ok(match value {
            Some(value) => self.mint_in(&mut state, value),
            None => Handle::NULL,
        })
    }

    fn write(&self, handle: Handle, offset: usize, value: Handle) -> BridgeResult<()> {
        self.vm.state.lock().write(handle, offset, value)
    }
}

impl std::fmt::Debug for EngineEnvironment<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineEnvironment")
            .field("module", &self.module)
            .field("function", &self.function)
            .field("locals", &self.locals.borrow().len())
            .finish()
    }
}
