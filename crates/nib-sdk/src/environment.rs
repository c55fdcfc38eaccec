//! Environment trait: the capability object handed to native code
//!
//! Defines every operation a native library may perform on the VM. The
//! engine provides the concrete implementation (`EngineEnvironment`); native
//! libraries only ever see `&dyn Environment`.
//!
//! Calls come in three argument forms per return shape. The slice (`_a`)
//! and owned-vector (`_l`) forms live on the trait; the positional form is
//! on [`EnvironmentExt`]. All of them funnel into
//! [`Environment::call_function`].

use crate::diagnostic::DiagnosticReport;
use crate::error::BridgeResult;
use crate::handle::Handle;
use crate::interrupt::Opcode;
use crate::value::{NativeArg, ReturnShape, ReturnValue};

/// Abstract VM access for native functions.
///
/// Faults fall in two tiers. Operations returning `BridgeResult` fail
/// immediately on a bad handle or a protection violation. Everything else
/// degrades to a default value and queues a [`DiagnosticReport`], which the
/// caller can poll with [`get_latest_error`](Environment::get_latest_error).
pub trait Environment {
    // ========================================================================
    // Modules & Diagnostics
    // ========================================================================

    /// Find a module by exact name
    fn get_module(&self, name: &str) -> Option<Handle>;

    /// The module owning the calling native function. Never null.
    fn current_module(&self) -> Handle;

    /// Most recent report, left in place
    fn preview_latest_error(&self) -> Option<DiagnosticReport>;

    /// Most recent report, removed from the queue
    fn get_latest_error(&self) -> Option<DiagnosticReport>;

    /// Every queued report, oldest first. Empties the queue.
    fn get_all_errors(&self) -> Vec<DiagnosticReport>;

    // ========================================================================
    // Value Reading
    // ========================================================================

    /// Read a byte. `strict` requires an exact byte value.
    fn get_byte(&self, handle: Handle, strict: bool) -> BridgeResult<i8>;

    /// Read a short. `strict` requires an exact short value.
    fn get_short(&self, handle: Handle, strict: bool) -> BridgeResult<i16>;

    /// Read an int. `strict` requires an exact int value.
    fn get_int(&self, handle: Handle, strict: bool) -> BridgeResult<i32>;

    /// Read a long. `strict` requires an exact long value.
    fn get_long(&self, handle: Handle, strict: bool) -> BridgeResult<i64>;

    /// Read string data
    fn get_string(&self, handle: Handle) -> BridgeResult<String>;

    // ========================================================================
    // Value Creation
    // ========================================================================

    /// Mint a byte value
    fn new_byte(&self, value: i8) -> Handle;

    /// Mint a short value
    fn new_short(&self, value: i16) -> Handle;

    /// Mint an int value
    fn new_int(&self, value: i32) -> Handle;

    /// Mint a long value
    fn new_long(&self, value: i64) -> Handle;

    /// Mint a string value
    fn new_string(&self, value: &str) -> Handle;

    // ========================================================================
    // Predicates
    // ========================================================================

    /// Check if handle addresses a byte
    fn is_byte(&self, handle: Handle) -> bool;

    /// Check if handle addresses a short
    fn is_short(&self, handle: Handle) -> bool;

    /// Check if handle addresses an int
    fn is_int(&self, handle: Handle) -> bool;

    /// Check if handle addresses a long
    fn is_long(&self, handle: Handle) -> bool;

    /// Check if handle addresses any numeric value
    fn is_number(&self, handle: Handle) -> bool;

    /// Check if handle addresses a string
    fn is_string(&self, handle: Handle) -> bool;

    /// Check if handle addresses a module
    fn is_module(&self, handle: Handle) -> bool;

    /// Check if handle addresses a function
    fn is_function(&self, handle: Handle) -> bool;

    /// Check if handle addresses a heap block
    fn is_block(&self, handle: Handle) -> bool;

    // ========================================================================
    // Function Resolution
    // ========================================================================

    /// Find a function in the calling module
    fn get_function(&self, name: &str) -> Option<Handle>;

    /// Find a function in `module`. Fails if `module` is not a module.
    fn get_function_in(&self, module: Handle, name: &str) -> BridgeResult<Option<Handle>>;

    // ========================================================================
    // Function Execution
    // ========================================================================

    /// Call `function` and coerce its result to `shape` (synchronous).
    ///
    /// Fails only if `function` is not a callable. A result that does not
    /// fit `shape` yields the shape's default and queues a report.
    fn call_function(
        &self,
        function: Handle,
        shape: ReturnShape,
        args: &[NativeArg],
    ) -> BridgeResult<ReturnValue>;

    /// Invoke a VM built-in by raw id and sub-opcode
    fn call_interrupt_function(&self, id: u16, opcode: Opcode, args: &[NativeArg]) -> Handle;

    /// Call, discarding the result
    fn call_void_function_a(&self, function: Handle, args: &[NativeArg]) -> BridgeResult<()> {
        self.call_function(function, ReturnShape::Void, args).map(|_| ())
    }

    /// Call, expecting a byte
    fn call_byte_function_a(&self, function: Handle, args: &[NativeArg]) -> BridgeResult<i8> {
        self.call_function(function, ReturnShape::Byte, args)
            .map(ReturnValue::into_byte)
    }

    /// Call, expecting a short
    fn call_short_function_a(&self, function: Handle, args: &[NativeArg]) -> BridgeResult<i16> {
        self.call_function(function, ReturnShape::Short, args)
            .map(ReturnValue::into_short)
    }

    /// Call, expecting an int
    fn call_int_function_a(&self, function: Handle, args: &[NativeArg]) -> BridgeResult<i32> {
        self.call_function(function, ReturnShape::Int, args)
            .map(ReturnValue::into_int)
    }

    /// Call, expecting a long
    fn call_long_function_a(&self, function: Handle, args: &[NativeArg]) -> BridgeResult<i64> {
        self.call_function(function, ReturnShape::Long, args)
            .map(ReturnValue::into_long)
    }

    /// Call, expecting a string
    fn call_string_function_a(&self, function: Handle, args: &[NativeArg]) -> BridgeResult<String> {
        self.call_function(function, ReturnShape::String, args)
            .map(ReturnValue::into_string)
    }

    /// Call, returning a handle to whatever the callee produced
    fn call_handle_function_a(&self, function: Handle, args: &[NativeArg]) -> BridgeResult<Handle> {
        self.call_function(function, ReturnShape::Handle, args)
            .map(ReturnValue::into_handle)
    }

    /// Call with an owned argument list, discarding the result
    fn call_void_function_l(&self, function: Handle, args: Vec<NativeArg>) -> BridgeResult<()> {
        self.call_void_function_a(function, &args)
    }

    /// Call with an owned argument list, expecting a byte
    fn call_byte_function_l(&self, function: Handle, args: Vec<NativeArg>) -> BridgeResult<i8> {
        self.call_byte_function_a(function, &args)
    }

    /// Call with an owned argument list, expecting a short
    fn call_short_function_l(&self, function: Handle, args: Vec<NativeArg>) -> BridgeResult<i16> {
        self.call_short_function_a(function, &args)
    }

    /// Call with an owned argument list, expecting an int
    fn call_int_function_l(&self, function: Handle, args: Vec<NativeArg>) -> BridgeResult<i32> {
        self.call_int_function_a(function, &args)
    }

    /// Call with an owned argument list, expecting a long
    fn call_long_function_l(&self, function: Handle, args: Vec<NativeArg>) -> BridgeResult<i64> {
        self.call_long_function_a(function, &args)
    }

    /// Call with an owned argument list, expecting a string
    fn call_string_function_l(
        &self,
        function: Handle,
        args: Vec<NativeArg>,
    ) -> BridgeResult<String> {
        self.call_string_function_a(function, &args)
    }

    /// Call with an owned argument list, returning a handle
    fn call_handle_function_l(
        &self,
        function: Handle,
        args: Vec<NativeArg>,
    ) -> BridgeResult<Handle> {
        self.call_handle_function_a(function, &args)
    }

    // ========================================================================
    // Managed Heap
    // ========================================================================

    /// Reserve `size` slots. `None` if the allocation failed.
    fn alloc(&self, size: usize) -> Option<Handle>;

    /// Resize a block. Null handle allocates, zero size frees.
    fn re_alloc(&self, handle: Handle, new_size: usize) -> Option<Handle>;

    /// Release a block and invalidate its handle
    fn free(&self, handle: Handle);

    /// Number of slots in a block
    fn block_size(&self, handle: Handle) -> BridgeResult<usize>;

    /// Read the value at `offset`
    fn read(&self, handle: Handle, offset: usize) -> BridgeResult<Handle>;

    /// Store `value` at `offset`
    fn write(&self, handle: Handle, offset: usize, value: Handle) -> BridgeResult<()>;
}

// ============================================================================
// Positional arguments
// ============================================================================

/// Anything that flattens into an ordered argument sequence.
pub trait IntoNativeArgs {
    /// Flatten into arguments, in order
    fn into_native_args(self) -> Vec<NativeArg>;
}

impl IntoNativeArgs for () {
    fn into_native_args(self) -> Vec<NativeArg> {
        Vec::new()
    }
}

impl IntoNativeArgs for Vec<NativeArg> {
    fn into_native_args(self) -> Vec<NativeArg> {
        self
    }
}

impl IntoNativeArgs for &[NativeArg] {
    fn into_native_args(self) -> Vec<NativeArg> {
        self.to_vec()
    }
}

impl<const N: usize> IntoNativeArgs for [NativeArg; N] {
    fn into_native_args(self) -> Vec<NativeArg> {
        self.into_iter().collect()
    }
}

macro_rules! impl_into_native_args_for_tuple {
    ($($name:ident),+) => {
        impl<$($name: Into<NativeArg>),+> IntoNativeArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_native_args(self) -> Vec<NativeArg> {
                let ($($name,)+) = self;
                vec![$($name.into()),+]
            }
        }
    };
}

impl_into_native_args_for_tuple!(A);
impl_into_native_args_for_tuple!(A, B);
impl_into_native_args_for_tuple!(A, B, C);
impl_into_native_args_for_tuple!(A, B, C, D);
impl_into_native_args_for_tuple!(A, B, C, D, E);
impl_into_native_args_for_tuple!(A, B, C, D, E, F);

/// Positional-argument call forms.
///
/// Blanket-implemented for every `Environment`, including
/// `dyn Environment`, so `env.call_int_function(f, (1, "x"))` works inside
/// native functions.
pub trait EnvironmentExt: Environment {
    /// Call, discarding the result
    fn call_void_function(&self, function: Handle, args: impl IntoNativeArgs) -> BridgeResult<()> {
        self.call_void_function_a(function, &args.into_native_args())
    }

    /// Call, expecting a byte
    fn call_byte_function(&self, function: Handle, args: impl IntoNativeArgs) -> BridgeResult<i8> {
        self.call_byte_function_a(function, &args.into_native_args())
    }

    /// Call, expecting a short
    fn call_short_function(
        &self,
        function: Handle,
        args: impl IntoNativeArgs,
    ) -> BridgeResult<i16> {
        self.call_short_function_a(function, &args.into_native_args())
    }

    /// Call, expecting an int
    fn call_int_function(&self, function: Handle, args: impl IntoNativeArgs) -> BridgeResult<i32> {
        self.call_int_function_a(function, &args.into_native_args())
    }

    /// Call, expecting a long
    fn call_long_function(&self, function: Handle, args: impl IntoNativeArgs) -> BridgeResult<i64> {
        self.call_long_function_a(function, &args.into_native_args())
    }

    /// Call, expecting a string
    fn call_string_function(
        &self,
        function: Handle,
        args: impl IntoNativeArgs,
    ) -> BridgeResult<String> {
        self.call_string_function_a(function, &args.into_native_args())
    }

    /// Call, returning a handle
    fn call_handle_function(
        &self,
        function: Handle,
        args: impl IntoNativeArgs,
    ) -> BridgeResult<Handle> {
        self.call_handle_function_a(function, &args.into_native_args())
    }
}

impl<E: Environment + ?Sized> EnvironmentExt for E {}
