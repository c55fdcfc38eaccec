//! Interrupt (trap) calls
//!
//! An interrupt is a VM built-in identified by a raw numeric id plus a
//! three-byte sub-opcode, the same pair the interpreter decodes from
//! bytecode. Handlers are registered with the engine and tried in order.

use crate::environment::Environment;
use crate::handle::Handle;
use crate::value::NativeArg;

/// Three-byte interrupt sub-opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Opcode(pub [u8; 3]);

impl Opcode {
    /// Build from three raw bytes
    pub const fn new(a: u8, b: u8, c: u8) -> Self {
        Opcode([a, b, c])
    }

    /// Raw bytes
    pub const fn bytes(&self) -> [u8; 3] {
        self.0
    }

    /// Pack into the low 24 bits of a u32 (big-endian byte order)
    pub const fn packed(&self) -> u32 {
        ((self.0[0] as u32) << 16) | ((self.0[1] as u32) << 8) | self.0[2] as u32
    }
}

impl From<[u8; 3]> for Opcode {
    fn from(bytes: [u8; 3]) -> Self {
        Opcode(bytes)
    }
}

/// Result of an interrupt handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterruptResult {
    /// Interrupt handled, produced a value (null for none)
    Value(Handle),
    /// Interrupt id not recognized by this handler
    Unhandled,
    /// Interrupt recognized but failed
    Error(String),
}

impl InterruptResult {
    /// Handled with no value
    #[inline]
    pub fn void() -> Self {
        Self::Value(Handle::NULL)
    }
}

/// Trait for VM built-ins reachable through `call_interrupt_function`.
///
/// Returns `InterruptResult::Unhandled` if the id is not recognized, so the
/// engine can try the next registered handler.
pub trait InterruptHandler: Send + Sync {
    /// Handle an interrupt
    fn handle(
        &self,
        env: &dyn Environment,
        id: u16,
        opcode: Opcode,
        args: &[NativeArg],
    ) -> InterruptResult;
}

/// A no-op handler that returns `Unhandled` for all interrupts
pub struct NoopInterruptHandler;

impl InterruptHandler for NoopInterruptHandler {
    fn handle(
        &self,
        _env: &dyn Environment,
        _id: u16,
        _opcode: Opcode,
        _args: &[NativeArg],
    ) -> InterruptResult {
        InterruptResult::Unhandled
    }
}
