//! The VM side of the bridge
//!
//! `Vm` owns every piece of shared state native code can reach: the handle
//! table, module registry, diagnostics queues and heap accounting. All of it
//! sits behind one lock that is held only for the duration of a single
//! bridge operation, never while a callee body runs, so native and script
//! functions may call back into the VM freely.

use std::sync::Arc;

use nib_sdk::{BridgeError, BridgeResult, DiagnosticReport, Handle, InterruptHandler};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::Value as JsonValue;

use crate::diagnostics::{CallSite, DiagnosticsStore};
use crate::environment::EngineEnvironment;
use crate::handles::HandleTable;
use crate::heap::{HeapStats, Protection};
use crate::options::BridgeOptions;
use crate::value::{Object, VmValue};

/// State guarded by the VM lock
pub(crate) struct VmState {
    pub(crate) options: BridgeOptions,
    pub(crate) table: HandleTable,
    pub(crate) modules: FxHashMap<String, Handle>,
    pub(crate) diagnostics: DiagnosticsStore,
    pub(crate) heap: HeapStats,
}

impl VmState {
    pub(crate) fn new(options: BridgeOptions) -> Self {
        let diagnostics = DiagnosticsStore::new(options.max_diagnostics, options.log_diagnostics);
        Self {
            options,
            table: HandleTable::new(),
            modules: FxHashMap::default(),
            diagnostics,
            heap: HeapStats::default(),
        }
    }

    /// Queue a report raised at `site` into the site's module queue
    pub(crate) fn report(
        &mut self,
        site: CallSite,
        caused_by_native: bool,
        severity: u32,
        message: String,
    ) {
        let report =
            DiagnosticReport::new(site.module, site.function, caused_by_native, severity, message);
        self.diagnostics.push(site.module, report);
    }

    /// Drop a scalar handle. References are never released this way.
    pub(crate) fn release(&mut self, handle: Handle) -> bool {
        if self.test(handle, |o| !o.is_reference()) {
            self.table.remove(handle).is_some()
        } else {
            false
        }
    }
}

/// A virtual machine instance as seen by the bridge.
pub struct Vm {
    pub(crate) state: Mutex<VmState>,
    pub(crate) interrupts: RwLock<Vec<Arc<dyn InterruptHandler>>>,
}

impl Vm {
    /// Create a VM with default options
    pub fn new() -> Self {
        Self::with_options(BridgeOptions::default())
    }

    /// Create a VM with specific options
    pub fn with_options(options: BridgeOptions) -> Self {
        Self {
            state: Mutex::new(VmState::new(options)),
            interrupts: RwLock::new(Vec::new()),
        }
    }

    /// Get a copy of the active options
    pub fn options(&self) -> BridgeOptions {
        self.state.lock().options.clone()
    }

    /// Add an interrupt handler. Handlers are tried in registration order.
    pub fn register_interrupt_handler(&self, handler: Arc<dyn InterruptHandler>) {
        self.interrupts.write().push(handler);
    }

    /// Find a module by exact name
    pub fn get_module(&self, name: &str) -> Option<Handle> {
        self.state.lock().modules.get(name).copied()
    }

    /// Find a function by module and function name
    pub fn get_function(&self, module: &str, name: &str) -> Option<Handle> {
        let state = self.state.lock();
        let module = state.modules.get(module)?;
        match state.table.get(*module)? {
            Object::Module(m) => m.functions.get(name).copied(),
            _ => None,
        }
    }

    /// An environment bound to `function` and its module.
    ///
    /// Scalar handles minted through it live until it is dropped.
    pub fn environment(&self, function: Handle) -> BridgeResult<EngineEnvironment<'_>> {
        let module = self.function_module(function)?;
        Ok(EngineEnvironment::new(self, module, function))
    }

    /// An environment bound to `module`'s top-level code
    pub fn module_environment(&self, module: Handle) -> BridgeResult<EngineEnvironment<'_>> {
        let init = {
            let state = self.state.lock();
            match state.table.get(module) {
                Some(Object::Module(m)) => m.init,
                _ => {
                    return Err(BridgeError::bad_handle(format!(
                        "{:?} is not a module",
                        module
                    )))
                }
            }
        };
        Ok(EngineEnvironment::new(self, module, init))
    }

    pub(crate) fn function_module(&self, function: Handle) -> BridgeResult<Handle> {
        match self.state.lock().table.get(function) {
            Some(Object::Function(f)) => Ok(f.module),
            _ => Err(BridgeError::bad_handle(format!(
                "{:?} is not a function",
                function
            ))),
        }
    }

    /// Set the protection flags of one heap slot
    pub fn protect(&self, block: Handle, offset: usize, protection: Protection) -> BridgeResult<()> {
        self.state.lock().protect(block, offset, protection)
    }

    /// What `handle` currently addresses, or `None` if it is stale.
    ///
    /// Null yields `Some(VmValue::Null)`.
    pub fn value(&self, handle: Handle) -> Option<VmValue> {
        self.state.lock().value_of(handle)
    }

    /// Release a scalar handle before its environment drops.
    ///
    /// Returns `false` for stale handles and for references.
    pub fn release(&self, handle: Handle) -> bool {
        self.state.lock().release(handle)
    }

    /// Check if `handle` is live
    pub fn is_live(&self, handle: Handle) -> bool {
        self.state.lock().table.contains(handle)
    }

    /// Number of live handles of every kind
    pub fn live_handles(&self) -> usize {
        self.state.lock().table.len()
    }

    /// Heap usage counters
    pub fn heap_stats(&self) -> HeapStats {
        self.state.lock().heap
    }

    /// Number of reports queued for `module`
    pub fn pending_diagnostics(&self, module: Handle) -> usize {
        self.state.lock().diagnostics.len(module)
    }

    /// JSON dump of `module`'s diagnostics queue, oldest first. Does not
    /// consume the reports.
    pub fn diagnostics_json(&self, module: Handle) -> JsonValue {
        self.state.lock().diagnostics.to_json(module)
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Vm")
            .field("modules", &state.modules.len())
            .field("live_handles", &state.table.len())
            .field("heap", &state.heap)
            .finish()
    }
}
