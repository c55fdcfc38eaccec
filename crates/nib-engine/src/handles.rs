//! Generation-counted handle table
//!
//! Objects live in a `Vec` of slots. A handle stores the slot index and the
//! slot generation at the time it was minted, so lookups stay O(1) and a
//! handle to a freed slot is detected instead of aliasing whatever reuses
//! the slot later.

use nib_sdk::Handle;

use crate::value::Object;

#[derive(Debug)]
struct Slot {
    generation: u32,
    object: Option<Object>,
}

/// Slot table backing every live handle.
#[derive(Debug, Default)]
pub(crate) struct HandleTable {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    live: usize,
}

impl HandleTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Store `object` and mint a handle for it.
    pub(crate) fn insert(&mut self, object: Object) -> Handle {
        let idx = match self.free_list.pop() {
            Some(idx) => idx,
            None => {
                let idx = u32::try_from(self.slots.len()).expect("handle table exhausted");
                self.slots.push(Slot {
                    generation: 1,
                    object: None,
                });
                idx
            }
        };

        let slot = &mut self.slots[idx as usize];
        debug_assert!(slot.object.is_none(), "free list returned an occupied slot");
        slot.object = Some(object);
        self.live += 1;
        Handle::from_parts(idx, slot.generation)
    }

    fn validate(&self, handle: Handle) -> Option<usize> {
        if handle.is_null() {
            return None;
        }
        let idx = handle.index() as usize;
        let slot = self.slots.get(idx)?;
        if slot.generation != handle.generation() || slot.object.is_none() {
            return None;
        }
        Some(idx)
    }

    pub(crate) fn get(&self, handle: Handle) -> Option<&Object> {
        let idx = self.validate(handle)?;
        self.slots[idx].object.as_ref()
    }

    pub(crate) fn get_mut(&mut self, handle: Handle) -> Option<&mut Object> {
        let idx = self.validate(handle)?;
        self.slots[idx].object.as_mut()
    }

    pub(crate) fn contains(&self, handle: Handle) -> bool {
        self.validate(handle).is_some()
    }

    /// Drop the object behind `handle` and invalidate every copy of it.
    ///
    /// A slot whose generation would overflow is retired instead of being
    /// returned to the free list, so a handle bit pattern is never minted
    /// twice.
    pub(crate) fn remove(&mut self, handle: Handle) -> Option<Object> {
        let idx = self.validate(handle)?;
        let slot = &mut self.slots[idx];
        let object = slot.object.take();
        self.live -= 1;
        match slot.generation.checked_add(1) {
            Some(next) => {
                slot.generation = next;
                self.free_list.push(idx as u32);
            }
            None => {
                tracing::debug!(target: "nib", slot = idx, "retiring exhausted handle slot");
            }
        }
        object
    }

    /// Number of live objects
    pub(crate) fn len(&self) -> usize {
        self.live
    }
}
