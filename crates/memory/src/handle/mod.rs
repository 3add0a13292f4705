//! Indirection layer that keeps references valid across relocation.
//!
//! A [`HandleTable`] is a fixed-size array of slots, each holding the
//! current address of one live allocation. Callers never store raw
//! addresses; they hold a [`HandlePtr`] naming a slot, and every resolution
//! re-reads the slot. When the compacting allocator moves a block it
//! rewrites the slot, and every outstanding `HandlePtr` transparently
//! follows.
//!
//! Free slots are threaded into an intrusive free list of slot indices,
//! mirroring the pool allocator's chunk list. Slot 0 is reserved as the
//! invalid sentinel and doubles as the list terminator, so a `HandlePtr`
//! with index 0 is always null.

mod ptr;

pub use ptr::HandlePtr;

use core::cell::Cell;

use crate::error::{AllocResult, MemoryError};

/// The reserved never-allocated slot index.
pub const INVALID_HANDLE: u32 = 0;

/// Fixed-size table of address slots with an intrusive free list.
pub struct HandleTable {
    /// Live slots hold an address; free slots hold the next free index.
    slots: Box<[Cell<usize>]>,
    /// Head of the free index list, 0 when exhausted.
    free_head: Cell<u32>,
    live: Cell<usize>,
}

impl HandleTable {
    /// Creates a table with `capacity` slots.
    ///
    /// Slot 0 is the sentinel, so the table can hand out `capacity - 1`
    /// handles.
    ///
    /// # Panics
    ///
    /// Panics if `capacity < 2`; a table that cannot hand out a single
    /// handle is a configuration bug.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity >= 2,
            "handle table needs at least one usable slot besides the sentinel"
        );
        assert!(
            u32::try_from(capacity).is_ok(),
            "handle table capacity must fit u32 indices"
        );

        // Thread slot i -> i + 1, with the last slot terminating at 0.
        let slots: Box<[Cell<usize>]> = (0..capacity)
            .map(|i| {
                let next = if i + 1 < capacity { i + 1 } else { 0 };
                Cell::new(next)
            })
            .collect();

        Self {
            slots,
            free_head: Cell::new(1),
            live: Cell::new(0),
        }
    }

    /// Total slot count, sentinel included.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of handles currently live.
    #[inline]
    pub fn live_handles(&self) -> usize {
        self.live.get()
    }

    /// Pops a free slot index.
    pub fn acquire(&self) -> AllocResult<u32> {
        let handle = self.free_head.get();
        if handle == INVALID_HANDLE {
            return Err(MemoryError::handles_exhausted(self.slots.len()));
        }
        let next = self.slots[handle as usize].get() as u32;
        self.free_head.set(next);
        self.live.set(self.live.get() + 1);
        Ok(handle)
    }

    /// Returns `handle` to the free list.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is the sentinel or out of range. Releasing a
    /// handle twice corrupts the free list and is not detected here; the
    /// compacting allocator invalidates its [`HandlePtr`]s precisely to
    /// keep that from happening.
    pub fn release(&self, handle: u32) {
        assert!(
            handle != INVALID_HANDLE && (handle as usize) < self.slots.len(),
            "handle {handle} is outside the table"
        );
        self.slots[handle as usize].set(self.free_head.get() as usize);
        self.free_head.set(handle);
        self.live.set(self.live.get() - 1);
    }

    /// Reads the address stored in `handle`'s slot.
    ///
    /// Unchecked by design: reading a freed slot returns free-list
    /// bookkeeping, not an address. Callers go through [`HandlePtr`], whose
    /// owner invalidates it on release.
    #[inline]
    pub fn get(&self, handle: u32) -> usize {
        self.slots[handle as usize].get()
    }

    /// Stores `addr` in `handle`'s slot, retargeting every outstanding
    /// [`HandlePtr`] for this handle without changing the handle's
    /// identity.
    #[inline]
    pub fn set(&self, handle: u32, addr: usize) {
        self.slots[handle as usize].set(addr);
    }
}

impl core::fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandleTable")
            .field("capacity", &self.slots.len())
            .field("live", &self.live.get())
            .finish()
    }
}
