//! Native function registration
//!
//! A native library exposes one [`NativeLoader`]. The engine calls
//! [`NativeLoader::inject_methods`] once at load time with a write-only
//! [`FunctionMap`]; the library inserts its functions and can neither read
//! them back nor see what its siblings registered.

use std::fmt;
use std::sync::Arc;

use crate::environment::Environment;
use crate::handle::Handle;
use crate::value::NativeArg;

/// Native function body: `(env, args) -> result handle` (null for none).
pub type NativeFn = Arc<dyn Fn(&dyn Environment, &[NativeArg]) -> Handle + Send + Sync>;

/// Native function descriptor: arity plus body.
///
/// The VM collects exactly `argc` arguments before invoking the body.
#[derive(Clone)]
pub struct NativeFunction {
    argc: usize,
    body: NativeFn,
}

impl NativeFunction {
    /// Create a native function
    pub fn new(
        argc: usize,
        body: impl Fn(&dyn Environment, &[NativeArg]) -> Handle + Send + Sync + 'static,
    ) -> Self {
        Self {
            argc,
            body: Arc::new(body),
        }
    }

    /// Number of arguments the function takes
    pub fn argc(&self) -> usize {
        self.argc
    }

    /// Run the body. Prefer calling through `Environment`, which checks
    /// arity and scopes handles.
    pub fn call(&self, env: &dyn Environment, args: &[NativeArg]) -> Handle {
        (self.body)(env, args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("argc", &self.argc)
            .finish_non_exhaustive()
    }
}

/// Shorthand for [`NativeFunction::new`]
pub fn create_native(
    argc: usize,
    body: impl Fn(&dyn Environment, &[NativeArg]) -> Handle + Send + Sync + 'static,
) -> NativeFunction {
    NativeFunction::new(argc, body)
}

/// Append-only name → function map supplied by the host loader.
///
/// No lookup or removal.
pub trait FunctionMap {
    /// Register `function` under `name`.
    ///
    /// Returns `false` (and keeps the first registration) if `name` is
    /// already taken or is not a valid function name.
    fn insert(&mut self, name: &str, function: NativeFunction) -> bool;
}

/// Entry point a native library implements.
pub trait NativeLoader {
    /// Called once by the host loader when it is ready to receive functions
    fn inject_methods(&self, functions: &mut dyn FunctionMap);
}

impl<F> NativeLoader for F
where
    F: Fn(&mut dyn FunctionMap),
{
    fn inject_methods(&self, functions: &mut dyn FunctionMap) {
        self(functions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<(String, usize)>);

    impl FunctionMap for Recorder {
        fn insert(&mut self, name: &str, function: NativeFunction) -> bool {
            self.0.push((name.to_string(), function.argc()));
            true
        }
    }

    #[test]
    fn test_closure_loader() {
        let loader = |map: &mut dyn FunctionMap| {
            map.insert("noop", create_native(0, |_env, _args| Handle::NULL));
            map.insert("pair", create_native(2, |_env, _args| Handle::NULL));
        };
        let mut recorder = Recorder::default();
        loader.inject_methods(&mut recorder);
        assert_eq!(
            recorder.0,
            vec![("noop".to_string(), 0), ("pair".to_string(), 2)]
        );
    }

    #[test]
    fn test_debug_hides_body() {
        let f = create_native(3, |_env, _args| Handle::NULL);
        assert_eq!(format!("{:?}", f), "NativeFunction { argc: 3, .. }");
    }
}
