//! Wrapper types for common handle patterns
//!
//! These types provide ergonomic access to VM functions and heap blocks,
//! all through the `Environment` trait.

use std::fmt;

use crate::environment::{Environment, IntoNativeArgs};
use crate::error::{BridgeError, BridgeResult};
use crate::handle::Handle;
use crate::value::NativeArg;

// ============================================================================
// Function
// ============================================================================

/// A resolved VM function bound to an environment.
pub struct Function<'a> {
    handle: Handle,
    env: &'a dyn Environment,
}

impl<'a> Function<'a> {
    /// Look up a function in the calling module. Returns `None` if absent.
    pub fn lookup(env: &'a dyn Environment, name: &str) -> Option<Self> {
        env.get_function(name).map(|handle| Self { handle, env })
    }

    /// Wrap a handle. Returns error if it is not a function.
    pub fn wrap(env: &'a dyn Environment, handle: Handle) -> BridgeResult<Self> {
        if !env.is_function(handle) {
            return Err(BridgeError::bad_handle(format!(
                "{:?} is not a function",
                handle
            )));
        }
        Ok(Self { handle, env })
    }

    /// Call with positional arguments, discarding the result
    pub fn call(&self, args: impl IntoNativeArgs) -> BridgeResult<()> {
        self.env
            .call_void_function_a(self.handle, &args.into_native_args())
    }

    /// Call with an argument slice, discarding the result
    pub fn call_a(&self, args: &[NativeArg]) -> BridgeResult<()> {
        self.env.call_void_function_a(self.handle, args)
    }

    /// Call with an owned argument list, discarding the result
    pub fn call_l(&self, args: Vec<NativeArg>) -> BridgeResult<()> {
        self.env.call_void_function_l(self.handle, args)
    }

    /// Call, expecting an int
    pub fn call_int(&self, args: impl IntoNativeArgs) -> BridgeResult<i32> {
        self.env
            .call_int_function_a(self.handle, &args.into_native_args())
    }

    /// Call, expecting a string
    pub fn call_string(&self, args: impl IntoNativeArgs) -> BridgeResult<String> {
        self.env
            .call_string_function_a(self.handle, &args.into_native_args())
    }

    /// Call, returning a handle
    pub fn call_handle(&self, args: impl IntoNativeArgs) -> BridgeResult<Handle> {
        self.env
            .call_handle_function_a(self.handle, &args.into_native_args())
    }

    /// Get the underlying handle
    pub fn handle(&self) -> Handle {
        self.handle
    }
}

impl fmt::Debug for Function<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Function").field(&self.handle).finish()
    }
}

// ============================================================================
// NativeBlock
// ============================================================================

/// A managed heap block with offset-addressed access.
///
/// The block is not freed on drop; call [`NativeBlock::free`].
pub struct NativeBlock<'a> {
    handle: Handle,
    env: &'a dyn Environment,
}

impl<'a> NativeBlock<'a> {
    /// Allocate a new block. Returns `None` if the allocation failed.
    pub fn alloc(env: &'a dyn Environment, size: usize) -> Option<Self> {
        env.alloc(size).map(|handle| Self { handle, env })
    }

    /// Wrap a handle. Returns error if it is not a heap block.
    pub fn wrap(env: &'a dyn Environment, handle: Handle) -> BridgeResult<Self> {
        if !env.is_block(handle) {
            return Err(BridgeError::bad_handle(format!(
                "{:?} is not a heap block",
                handle
            )));
        }
        Ok(Self { handle, env })
    }

    /// Number of slots
    pub fn len(&self) -> BridgeResult<usize> {
        self.env.block_size(self.handle)
    }

    /// Check if the block has no slots
    pub fn is_empty(&self) -> BridgeResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Read slot `offset`
    pub fn get(&self, offset: usize) -> BridgeResult<Handle> {
        self.env.read(self.handle, offset)
    }

    /// Read slot `offset` as an int (permissive)
    pub fn get_int(&self, offset: usize) -> BridgeResult<i32> {
        self.env.get_int(self.get(offset)?, false)
    }

    /// Read slot `offset` as a string
    pub fn get_string(&self, offset: usize) -> BridgeResult<String> {
        self.env.get_string(self.get(offset)?)
    }

    /// Write slot `offset`
    pub fn set(&self, offset: usize, value: Handle) -> BridgeResult<()> {
        self.env.write(self.handle, offset, value)
    }

    /// Resize to a non-zero size, keeping the handle.
    ///
    /// On failure the block is handed back unchanged. A zero size is refused;
    /// use [`NativeBlock::free`] to release the block.
    pub fn resize(self, new_size: usize) -> Result<Self, Self> {
        if new_size == 0 {
            return Err(self);
        }
        match self.env.re_alloc(self.handle, new_size) {
            Some(handle) => Ok(Self {
                handle,
                env: self.env,
            }),
            None => Err(self),
        }
    }

    /// Release the block
    pub fn free(self) {
        self.env.free(self.handle)
    }

    /// Get the underlying handle
    pub fn handle(&self) -> Handle {
        self.handle
    }
}

impl fmt::Debug for NativeBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NativeBlock").field(&self.handle).finish()
    }
}
