//! Opaque, generation-counted references to VM values
//!
//! A handle never exposes the layout of the value it names. The engine mints
//! handles from a slot table; native code can only copy, compare and pass
//! them back.
//!
//! # Encoding
//!
//! ```text
//! bits 63..32  slot index
//! bits 31..0   slot generation (live generations start at 1)
//! 0x0          null handle
//! ```
//!
//! Because a live generation is never 0, no live handle has the null bit
//! pattern. A freed slot bumps its generation, so stale copies of the old
//! handle no longer match and are rejected by every lookup.

/// Opaque reference to a VM-resident value.
///
/// Handles are non-owning. The VM decides when the referenced value dies;
/// every bridge operation re-validates the handle it is given.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Handle(u64);

const INDEX_SHIFT: u64 = 32;
const GENERATION_MASK: u64 = 0x0000_0000_FFFF_FFFF;

impl Handle {
    /// The null handle ("no value" / "not found").
    pub const NULL: Handle = Handle(0);

    /// Build a handle from a slot index and generation (engine use only).
    ///
    /// `generation` must be non-zero for a live handle.
    #[doc(hidden)]
    #[inline]
    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self(((index as u64) << INDEX_SHIFT) | generation as u64)
    }

    /// Create from raw bits
    #[inline(always)]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Get raw bits
    #[inline(always)]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Check if this is the null handle
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Slot index inside the engine's handle table
    #[inline]
    pub const fn index(&self) -> u32 {
        (self.0 >> INDEX_SHIFT) as u32
    }

    /// Slot generation the handle was minted with
    #[inline]
    pub const fn generation(&self) -> u32 {
        (self.0 & GENERATION_MASK) as u32
    }

    /// `None` for the null handle, `Some(self)` otherwise
    #[inline]
    pub const fn non_null(self) -> Option<Handle> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::NULL
    }
}

impl From<Option<Handle>> for Handle {
    fn from(h: Option<Handle>) -> Self {
        h.unwrap_or(Handle::NULL)
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "Handle::NULL")
        } else {
            write!(f, "Handle({}v{})", self.index(), self.generation())
        }
    }
}
