//! Managed heap accessor
//!
//! Blocks are handle-addressed arrays of slots. Every access is bounds
//! checked against the block's current size and then checked against the
//! slot's protection flags before any value moves.
//!
//! Scalars are stored by value; modules, functions and other blocks are
//! stored as references and re-validated whenever they are used.

use std::fmt;
use std::ops::BitOr;

use nib_sdk::{BridgeError, BridgeResult, Handle};

use crate::diagnostics::CallSite;
use crate::value::{Object, VmValue};
use crate::vm::VmState;

/// Per-slot access protection
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Protection(u8);

impl Protection {
    /// Unrestricted
    pub const NONE: Protection = Protection(0);
    /// Reads fault
    pub const READ: Protection = Protection(0b01);
    /// Writes fault
    pub const WRITE: Protection = Protection(0b10);
    /// Reads and writes fault
    pub const ALL: Protection = Protection(0b11);

    /// Check if every flag in `other` is set
    pub const fn contains(&self, other: Protection) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl BitOr for Protection {
    type Output = Protection;

    fn bitor(self, rhs: Protection) -> Protection {
        Protection(self.0 | rhs.0)
    }
}

impl fmt::Debug for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Protection::NONE => write!(f, "Protection::NONE"),
            Protection::READ => write!(f, "Protection::READ"),
            Protection::WRITE => write!(f, "Protection::WRITE"),
            _ => write!(f, "Protection::ALL"),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct HeapSlot {
    value: Option<VmValue>,
    protection: Protection,
}

/// A managed heap block
#[derive(Debug, Clone, Default)]
pub struct Block {
    slots: Vec<HeapSlot>,
}

impl Block {
    /// Create a block of `size` empty, unprotected slots
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![HeapSlot::default(); size],
        }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the block has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Grow or shrink, keeping the first `min(old, new)` slots
    fn resize(&mut self, new_size: usize) {
        self.slots.resize_with(new_size, HeapSlot::default);
    }

    fn slot(&self, handle: Handle, offset: usize) -> BridgeResult<&HeapSlot> {
        let len = self.slots.len();
        self.slots
            .get(offset)
            .ok_or_else(|| out_of_bounds(handle, offset, len))
    }

    fn slot_mut(&mut self, handle: Handle, offset: usize) -> BridgeResult<&mut HeapSlot> {
        let len = self.slots.len();
        self.slots
            .get_mut(offset)
            .ok_or_else(|| out_of_bounds(handle, offset, len))
    }
}

fn out_of_bounds(handle: Handle, offset: usize, len: usize) -> BridgeError {
    BridgeError::bad_handle(format!(
        "offset {} out of bounds for {:?} (len={})",
        offset, handle, len
    ))
}

/// Heap usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Blocks currently allocated
    pub live_blocks: usize,
    /// Slots across all live blocks
    pub used_slots: usize,
}

// ============================================================================
// Heap operations
// ============================================================================

impl VmState {
    fn block(&self, handle: Handle) -> BridgeResult<&Block> {
        match self.table.get(handle) {
            Some(Object::Block(block)) => Ok(block),
            Some(other) => Err(BridgeError::bad_handle(format!(
                "{:?} addresses a {}, not a heap block",
                handle,
                other.kind()
            ))),
            None => Err(BridgeError::bad_handle(format!(
                "{:?} is null or stale, expected a heap block",
                handle
            ))),
        }
    }

    fn block_mut(&mut self, handle: Handle) -> BridgeResult<&mut Block> {
        match self.table.get_mut(handle) {
            Some(Object::Block(block)) => Ok(block),
            Some(other) => Err(BridgeError::bad_handle(format!(
                "{:?} addresses a {}, not a heap block",
                handle,
                other.kind()
            ))),
            None => Err(BridgeError::bad_handle(format!(
                "{:?} is null or stale, expected a heap block",
                handle
            ))),
        }
    }

    fn heap_budget_allows(&self, extra: usize) -> bool {
        self.heap
            .used_slots
            .checked_add(extra)
            .is_some_and(|total| total <= self.options.max_heap_slots)
    }

    pub(crate) fn alloc(&mut self, site: CallSite, size: usize) -> Option<Handle> {
        if !self.heap_budget_allows(size) {
            let message = format!(
                "allocation of {} slots exceeds heap budget ({}/{} used)",
                size, self.heap.used_slots, self.options.max_heap_slots
            );
            self.report(site, true, nib_sdk::severity::ERROR, message);
            return None;
        }
        let handle = self.table.insert(Object::Block(Block::new(size)));
        self.heap.live_blocks += 1;
        self.heap.used_slots += size;
        tracing::debug!(target: "nib", block = ?handle, size, "heap alloc");
        Some(handle)
    }

    pub(crate) fn re_alloc(
        &mut self,
        site: CallSite,
        handle: Handle,
        new_size: usize,
    ) -> Option<Handle> {
        if handle.is_null() {
            if new_size == 0 {
                return None;
            }
            return self.alloc(site, new_size);
        }
        if new_size == 0 {
            self.free(site, handle);
            return None;
        }

        let old_size = match self.block(handle) {
            Ok(block) => block.len(),
            Err(err) => {
                self.report(site, true, self.options.default_severity, format!("re_alloc: {}", err));
                return None;
            }
        };
        if new_size > old_size && !self.heap_budget_allows(new_size - old_size) {
            let message = format!(
                "resize of {:?} to {} slots exceeds heap budget ({}/{} used)",
                handle, new_size, self.heap.used_slots, self.options.max_heap_slots
            );
            self.report(site, true, nib_sdk::severity::ERROR, message);
            return None;
        }

        if let Ok(block) = self.block_mut(handle) {
            block.resize(new_size);
        }
        self.heap.used_slots = self.heap.used_slots - old_size + new_size;
        tracing::debug!(target: "nib", block = ?handle, old_size, new_size, "heap resize");
        Some(handle)
    }

    pub(crate) fn free(&mut self, site: CallSite, handle: Handle) {
        let size = match self.block(handle) {
            Ok(block) => block.len(),
            Err(err) => {
                self.report(site, true, self.options.default_severity, format!("free: {}", err));
                return;
            }
        };
        self.table.remove(handle);
        self.heap.live_blocks -= 1;
        self.heap.used_slots -= size;
        tracing::debug!(target: "nib", block = ?handle, size, "heap free");
    }

    pub(crate) fn block_size(&self, handle: Handle) -> BridgeResult<usize> {
        self.block(handle).map(Block::len)
    }

    /// Value stored at `offset`; `None` for an empty slot
    pub(crate) fn read(&self, handle: Handle, offset: usize) -> BridgeResult<Option<VmValue>> {
        let slot = self.block(handle)?.slot(handle, offset)?;
        if slot.protection.contains(Protection::READ) {
            return Err(BridgeError::security(format!(
                "read of protected offset {} in {:?}",
                offset, handle
            )));
        }
        Ok(slot.value.clone())
    }

    /// Store `value` at `offset`. A null `value` clears the slot.
    pub(crate) fn write(&mut self, handle: Handle, offset: usize, value: Handle) -> BridgeResult<()> {
        let stored = match self.value_of(value) {
            Some(VmValue::Null) => None,
            Some(v) => Some(v),
            None => {
                return Err(BridgeError::bad_handle(format!(
                    "cannot store stale {:?}",
                    value
                )))
            }
        };
        let slot = self.block_mut(handle)?.slot_mut(handle, offset)?;
        if slot.protection.contains(Protection::WRITE) {
            return Err(BridgeError::security(format!(
                "write to protected offset {} in {:?}",
                offset, handle
            )));
        }
        slot.value = stored;
        Ok(())
    }

    pub(crate) fn protect(
        &mut self,
        handle: Handle,
        offset: usize,
        protection: Protection,
    ) -> BridgeResult<()> {
        let slot = self.block_mut(handle)?.slot_mut(handle, offset)?;
        slot.protection = protection;
        Ok(())
    }
}
