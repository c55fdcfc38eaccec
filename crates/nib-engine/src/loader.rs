//! Module and function loading
//!
//! Native libraries register through [`FunctionRegistrar`], the engine's
//! write-only [`FunctionMap`]. Script functions are defined directly by the
//! interpreter with [`Vm::define_script_function`].

use std::sync::Arc;

use nib_sdk::{BridgeError, FunctionMap, Handle, NativeFunction, NativeLoader};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::defaults::MODULE_INIT_FUNCTION;
use crate::value::{
    FunctionBody, FunctionObject, ModuleObject, Object, ScriptError, ScriptFn, VmValue,
};
use crate::vm::{Vm, VmState};

/// Errors that can occur while defining modules and functions
#[derive(Debug, Error)]
pub enum LoadError {
    /// A module with this name already exists
    #[error("Duplicate module: {0}")]
    DuplicateModule(String),

    /// The module already defines a function with this name
    #[error("Duplicate function: {name} in {module}")]
    DuplicateFunction {
        /// Module name
        module: String,
        /// Function name
        name: String,
    },

    /// Empty or reserved name
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    /// A handle passed to the loader was not usable
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('<')
}

/// Write-only function map handed to [`NativeLoader::inject_methods`].
///
/// Keeps the first registration of each name and rejects invalid names.
#[derive(Debug, Default)]
pub struct FunctionRegistrar {
    library: String,
    seen: FxHashSet<String>,
    entries: Vec<(String, NativeFunction)>,
    rejected: usize,
}

impl FunctionRegistrar {
    /// Create an empty registrar for `library`
    pub fn new(library: impl Into<String>) -> Self {
        Self {
            library: library.into(),
            ..Self::default()
        }
    }

    /// Number of rejected insertions
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Freeze the registrations into a lookup table
    pub fn finish(self) -> FunctionTable {
        let index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
        FunctionTable {
            entries: self.entries,
            index,
        }
    }
}

impl FunctionMap for FunctionRegistrar {
    fn insert(&mut self, name: &str, function: NativeFunction) -> bool {
        if !valid_name(name) {
            tracing::warn!(target: "nib", library = %self.library, name, "rejected invalid native function name");
            self.rejected += 1;
            return false;
        }
        if !self.seen.insert(name.to_string()) {
            tracing::warn!(target: "nib", library = %self.library, name, "duplicate native function ignored");
            self.rejected += 1;
            return false;
        }
        self.entries.push((name.to_string(), function));
        true
    }
}

/// Immutable table of a library's native functions, in registration order
#[derive(Debug, Default)]
pub struct FunctionTable {
    entries: Vec<(String, NativeFunction)>,
    index: FxHashMap<String, usize>,
}

impl FunctionTable {
    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&NativeFunction> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    /// Number of functions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Function names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    fn into_entries(self) -> Vec<(String, NativeFunction)> {
        self.entries
    }
}

// ============================================================================
// Registry mutation
// ============================================================================

impl VmState {
    fn create_module(&mut self, name: &str) -> Handle {
        let module = self.table.insert(Object::Module(ModuleObject {
            name: name.to_string(),
            functions: FxHashMap::default(),
            init: Handle::NULL,
        }));
        let body: ScriptFn =
            Arc::new(|_args: &[VmValue]| -> Result<Option<VmValue>, ScriptError> { Ok(None) });
        let init = self.table.insert(Object::Function(FunctionObject {
            name: MODULE_INIT_FUNCTION.to_string(),
            module,
            argc: 0,
            body: FunctionBody::Script(body),
        }));
        if let Some(Object::Module(m)) = self.table.get_mut(module) {
            m.init = init;
        }
        self.modules.insert(name.to_string(), module);
        module
    }

    fn module_mut(&mut self, module: Handle) -> Result<&mut ModuleObject, LoadError> {
        match self.table.get_mut(module) {
            Some(Object::Module(m)) => Ok(m),
            _ => Err(BridgeError::bad_handle(format!("{:?} is not a module", module)).into()),
        }
    }

    fn add_function(&mut self, module: Handle, name: &str, argc: usize, body: FunctionBody) -> Handle {
        let function = self.table.insert(Object::Function(FunctionObject {
            name: name.to_string(),
            module,
            argc,
            body,
        }));
        if let Ok(m) = self.module_mut(module) {
            m.functions.insert(name.to_string(), function);
        }
        function
    }
}

impl Vm {
    /// Create an empty module, including its `<init>` function.
    pub fn define_module(&self, name: &str) -> Result<Handle, LoadError> {
        if !valid_name(name) {
            return Err(LoadError::InvalidName(name.to_string()));
        }
        let mut state = self.state.lock();
        if state.modules.contains_key(name) {
            return Err(LoadError::DuplicateModule(name.to_string()));
        }
        let module = state.create_module(name);
        tracing::debug!(target: "nib", module = name, handle = ?module, "module defined");
        Ok(module)
    }

    /// Define a script function in `module`
    pub fn define_script_function(
        &self,
        module: Handle,
        name: &str,
        argc: usize,
        body: impl Fn(&[VmValue]) -> Result<Option<VmValue>, ScriptError> + Send + Sync + 'static,
    ) -> Result<Handle, LoadError> {
        if !valid_name(name) {
            return Err(LoadError::InvalidName(name.to_string()));
        }
        let mut state = self.state.lock();
        let m = state.module_mut(module)?;
        if m.functions.contains_key(name) {
            return Err(LoadError::DuplicateFunction {
                module: m.name.clone(),
                name: name.to_string(),
            });
        }
        Ok(state.add_function(module, name, argc, FunctionBody::Script(Arc::new(body))))
    }

    /// Run `loader` and attach its functions to `module_name`, creating the
    /// module if needed.
    ///
    /// Nothing is attached if any name collides with an existing function.
    pub fn load_library(
        &self,
        module_name: &str,
        loader: &dyn NativeLoader,
    ) -> Result<Handle, LoadError> {
        if !valid_name(module_name) {
            return Err(LoadError::InvalidName(module_name.to_string()));
        }

        let mut registrar = FunctionRegistrar::new(module_name);
        loader.inject_methods(&mut registrar);
        let rejected = registrar.rejected();
        let table = registrar.finish();

        let mut state = self.state.lock();
        let existing = state.modules.get(module_name).copied();
        let module = match existing {
            Some(module) => {
                let m = state.module_mut(module)?;
                if let Some(name) = table.names().find(|n| m.functions.contains_key(*n)) {
                    return Err(LoadError::DuplicateFunction {
                        module: module_name.to_string(),
                        name: name.to_string(),
                    });
                }
                module
            }
            None => state.create_module(module_name),
        };

        let count = table.len();
        for (name, native) in table.into_entries() {
            let argc = native.argc();
            state.add_function(module, &name, argc, FunctionBody::Native(native));
        }
        tracing::debug!(target: "nib", module = module_name, functions = count, rejected, "native library loaded");
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nib_sdk::create_native;

    fn noop(argc: usize) -> NativeFunction {
        create_native(argc, |_env, _args| Handle::NULL)
    }

    #[test]
    fn test_registrar_keeps_first_registration() {
        let mut registrar = FunctionRegistrar::new("lib");
        assert!(registrar.insert("f", noop(1)));
        assert!(!registrar.insert("f", noop(2)));
        let table = registrar.finish();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("f").map(NativeFunction::argc), Some(1));
    }

    #[test]
    fn test_registrar_rejects_reserved_names() {
        let mut registrar = FunctionRegistrar::new("lib");
        assert!(!registrar.insert("", noop(0)));
        assert!(!registrar.insert("<init>", noop(0)));
        assert_eq!(registrar.rejected(), 2);
        assert!(registrar.finish().is_empty());
    }

    #[test]
    fn test_table_preserves_order() {
        let mut registrar = FunctionRegistrar::new("lib");
        registrar.insert("b", noop(0));
        registrar.insert("a", noop(0));
        let table = registrar.finish();
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn test_define_module_twice_fails() {
        let vm = Vm::new();
        vm.define_module("m").unwrap();
        assert!(matches!(vm.define_module("m"), Err(LoadError::DuplicateModule(_))));
        assert!(matches!(vm.define_module(""), Err(LoadError::InvalidName(_))));
    }

    #[test]
    fn test_module_has_init_function() {
        let vm = Vm::new();
        let m = vm.define_module("m").unwrap();
        let env = vm.module_environment(m).unwrap();
        assert!(!env.function().is_null());
        assert_eq!(vm.function_module(env.function()).unwrap(), m);
    }

    #[test]
    fn test_load_library_conflict_is_atomic() {
        let vm = Vm::new();
        let m = vm.define_module("m").unwrap();
        vm.define_script_function(m, "taken", 0, |_| Ok(None)).unwrap();

        let loader = |map: &mut dyn FunctionMap| {
            map.insert("fresh", noop(0));
            map.insert("taken", noop(0));
        };
        let err = vm.load_library("m", &loader).unwrap_err();
        assert!(matches!(err, LoadError::DuplicateFunction { .. }));
        assert!(vm.get_function("m", "fresh").is_none());
    }

    #[test]
    fn test_define_script_function_on_non_module() {
        let vm = Vm::new();
        let m = vm.define_module("m").unwrap();
        let f = vm.define_script_function(m, "f", 0, |_| Ok(None)).unwrap();
        let err = vm.define_script_function(f, "g", 0, |_| Ok(None)).unwrap_err();
        assert!(matches!(err, LoadError::Bridge(e) if e.is_bad_handle()));
    }
}
