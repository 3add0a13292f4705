//! Compacting allocator: a free-list allocator behind a handle table.
//!
//! A [`CompactingAllocator`] composes a [`FreeListAllocator`], a
//! [`HandleTable`], and an address-sorted list of live-block descriptors.
//! Callers receive [`HandlePtr`]s instead of raw addresses, which lets
//! [`CompactingAllocator::defragment`] relocate live blocks downward,
//! squeezing out the gaps deallocation leaves behind, while every
//! outstanding pointer keeps resolving correctly. Compaction converges to a
//! single free chunk at the tail of the region.
//!
//! Relocation is type-blind at the call site: each allocation binds a
//! monomorphized relocation function into its descriptor (see
//! [`descriptor`]), so the compactor never needs to know what it is moving.

mod descriptor;

use descriptor::{LiveBlock, drop_values, relocate_bytes, relocate_values};

use core::alloc::Layout;
use core::cell::RefCell;
use core::mem;
use core::ptr::NonNull;
use std::sync::Arc;

use super::freelist::{BlockHeader, FreeListAllocator, HEADER_SIZE};
use super::{AllocResult, Allocator};
use crate::core::types::align_up;
use crate::error::MemoryError;
use crate::handle::{HandlePtr, HandleTable};
use crate::stats::{AllocationStats, FragmentationStats, StatsSnapshot};

#[cfg(feature = "logging")]
use tracing::{debug, error, trace};

/// Free-list allocator with handle indirection and defragmentation.
pub struct CompactingAllocator<'p> {
    inner: FreeListAllocator<'p>,
    table: HandleTable,
    /// Live-block descriptors, sorted by each block's current address
    /// (resolved through the handle table).
    blocks: RefCell<Vec<LiveBlock>>,
}

impl<'p> CompactingAllocator<'p> {
    /// Creates a compacting allocator over `capacity` bytes from `parent`,
    /// with room for `handle_capacity - 1` live allocations (slot 0 of the
    /// handle table is the reserved sentinel).
    pub fn new(
        capacity: usize,
        handle_capacity: usize,
        parent: &'p dyn Allocator,
    ) -> AllocResult<Self> {
        if handle_capacity < 2 {
            return Err(MemoryError::invalid_config(
                "compacting allocator needs at least one usable handle slot",
            ));
        }

        let inner = FreeListAllocator::new(capacity, parent)?;

        #[cfg(feature = "logging")]
        debug!(capacity, handle_capacity, "compacting allocator created");

        Ok(Self {
            inner,
            table: HandleTable::new(handle_capacity),
            blocks: RefCell::new(Vec::new()),
        })
    }

    /// Allocates and constructs one `T`, returning a relocatable pointer.
    pub fn alloc_value<T>(&self, value: T) -> AllocResult<HandlePtr<'_, T>> {
        let ptr = self.allocate_block::<T>(Layout::new::<T>(), 1)?;
        let typed = ptr.resolve().expect("freshly allocated");
        // SAFETY: allocate_block returned aligned storage for one T.
        unsafe { typed.as_ptr().write(value) };
        Ok(ptr)
    }

    /// Allocates and constructs `count` elements of `T`, initializing each
    /// with `init(index)`. The pointer resolves to the first element.
    pub fn alloc_array<T>(
        &self,
        count: usize,
        mut init: impl FnMut(usize) -> T,
    ) -> AllocResult<HandlePtr<'_, T>> {
        let layout = Layout::array::<T>(count)
            .map_err(|_| MemoryError::invalid_config("array layout overflows"))?;
        let ptr = self.allocate_block::<T>(layout, count)?;
        let typed = ptr.resolve().expect("freshly allocated").as_ptr();
        for i in 0..count {
            // SAFETY: storage for `count` elements was just reserved.
            unsafe { typed.add(i).write(init(i)) };
        }
        Ok(ptr)
    }

    /// Allocates an untyped block. The relocation thunk bound to it is a
    /// plain byte copy.
    pub fn allocate_raw(&self, layout: Layout) -> AllocResult<HandlePtr<'_, u8>> {
        // SAFETY: delegated allocation; layout validity forwarded.
        let raw = unsafe { self.inner.allocate(layout)? };
        let addr = raw.cast::<u8>().as_ptr() as usize;

        let handle = match self.table.acquire() {
            Ok(handle) => handle,
            Err(err) => {
                // SAFETY: raw was just allocated by inner with layout.
                unsafe { self.inner.deallocate(raw.cast(), layout) };
                return Err(err);
            }
        };
        self.table.set(handle, addr);
        self.insert_descriptor(LiveBlock {
            handle,
            data_size: layout.size(),
            count: layout.size(),
            align: layout.align(),
            relocate: relocate_bytes,
            drop_fn: None,
        });
        Ok(HandlePtr::new(&self.table, handle))
    }

    /// Destroys the referenced block and invalidates `ptr` in place, so a
    /// stale copy resolves to null instead of dangling.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` is null (already deallocated, or never allocated).
    pub fn deallocate<T>(&self, ptr: &mut HandlePtr<'_, T>) {
        assert!(!ptr.is_null(), "deallocating a null HandlePtr");
        let handle = ptr.handle();
        let addr = self.table.get(handle);

        let mut blocks = self.blocks.borrow_mut();
        let idx = blocks
            .iter()
            .position(|block| block.handle == handle)
            .expect("no live block for handle");
        let block = blocks.remove(idx);
        drop(blocks);

        if let Some(drop_fn) = block.drop_fn {
            // SAFETY: the descriptor records exactly the elements that were
            // constructed at this address.
            unsafe { drop_fn(addr as *mut u8, block.count) };
        }

        let layout = Layout::from_size_align(block.data_size, block.align)
            .expect("descriptor layout was valid at allocation");
        // SAFETY: addr is the block's current user address; the inner
        // allocator reclaims it via its own header.
        unsafe {
            self.inner
                .deallocate(NonNull::new_unchecked(addr as *mut u8), layout);
        }

        self.table.release(handle);
        ptr.invalidate();
    }

    /// Whether a call to [`CompactingAllocator::defragment_once`] would
    /// move anything: true iff the free list has more than one entry, or
    /// its single entry is not already the tail of the region.
    pub fn can_be_defragmented(&self) -> bool {
        match self.inner.free_chunk_count() {
            0 => false,
            1 => {
                let only = self.inner.lowest_free().expect("count is 1");
                only.end() != self.inner.region_end()
            }
            _ => true,
        }
    }

    /// Performs one relocation step: moves the first live block above the
    /// lowest free chunk down into it. Returns whether anything moved.
    pub fn defragment_once(&self) -> bool {
        if !self.can_be_defragmented() {
            return false;
        }

        let chunk = self.inner.lowest_free().expect("checked above");

        // First descriptor whose current address is above the chunk. The
        // coalesced free list guarantees that block starts exactly at the
        // chunk's end.
        let blocks = self.blocks.borrow();
        let idx = blocks.partition_point(|block| self.table.get(block.handle) <= chunk.addr);
        let Some(block) = blocks.get(idx) else {
            debug_assert!(false, "fragmented region with no block above the gap");
            return false;
        };
        let (handle, data_size, count, align, relocate) = (
            block.handle,
            block.data_size,
            block.count,
            block.align,
            block.relocate,
        );
        drop(blocks);

        let src_user = self.table.get(handle);
        // SAFETY: src_user was returned by the inner allocator, which keeps
        // a header below every live user address.
        let header = unsafe { BlockHeader::read(src_user as *const u8) };
        let src_start = src_user - header.padding as usize;
        let old_span = header.size as usize;
        debug_assert_eq!(chunk.end(), src_start, "free chunk must touch the block");

        // Re-align the payload at the new block start. dst_user can never
        // exceed src_user: the target starts lower and src_user itself is
        // an aligned candidate.
        let dst_user = align_up(chunk.addr + HEADER_SIZE, align);
        debug_assert!(dst_user <= src_user);

        if dst_user != src_user {
            // SAFETY: source holds `count` live elements; destination is
            // inside the chunk + block span owned by this allocator.
            // Overlap is fine; the bound thunks move via ptr::copy.
            unsafe { relocate(src_user as *mut u8, dst_user as *mut u8, count) };
        }

        let new_span = (dst_user - chunk.addr) + data_size;
        // SAFETY: dst_user sits HEADER_SIZE past the block's new start.
        unsafe {
            BlockHeader::write(dst_user as *mut u8, (dst_user - chunk.addr) as u8, new_span as u32);
        }
        // Every outstanding HandlePtr now resolves to the moved block.
        self.table.set(handle, dst_user);

        if new_span != old_span {
            self.inner.stats_handle().record_resize(old_span, new_span);
        }

        // The vacated source span becomes the free chunk's new position,
        // merged with its former right neighbor if they now touch.
        let old_end = src_start + old_span;
        let vacated = chunk.addr + new_span;
        self.inner.pop_lowest_free();
        if old_end > vacated {
            // Wipe the stale bytes so the freed span reads like any other
            // freed span.
            // SAFETY: [vacated, old_end) no longer belongs to any block.
            unsafe { (vacated as *mut u8).write_bytes(0, old_end - vacated) };
            self.inner.insert_free_span(vacated, old_end - vacated);
        }

        #[cfg(feature = "logging")]
        trace!(handle, src_user, dst_user, "relocated block");

        true
    }

    /// Relocates until no fragmentation remains, converging to one free
    /// chunk at the tail of the region. Returns the number of blocks moved
    /// (zero when the region is already compact).
    pub fn defragment(&self) -> usize {
        let mut moved = 0;
        while self.defragment_once() {
            moved += 1;
        }
        moved
    }

    /// Number of live allocations.
    pub fn live_blocks(&self) -> usize {
        self.blocks.borrow().len()
    }

    /// Number of entries in the inner free list.
    pub fn free_chunk_count(&self) -> usize {
        self.inner.free_chunk_count()
    }

    /// Fragmentation metrics of the inner free list.
    pub fn fragmentation(&self) -> FragmentationStats {
        self.inner.fragmentation()
    }

    /// Point-in-time counters for diagnostics.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats()
    }

    /// Shared counter handle for the process-wide tracking registry.
    pub fn stats_handle(&self) -> Arc<AllocationStats> {
        self.inner.stats_handle()
    }

    /// Allocates storage, acquires a handle, and records the descriptor for
    /// a typed block. Construction happens at the caller after this
    /// returns, so a handle-acquisition failure has nothing to destroy.
    fn allocate_block<T>(&self, layout: Layout, count: usize) -> AllocResult<HandlePtr<'_, T>> {
        // SAFETY: delegated allocation; layout validity forwarded.
        let raw = unsafe { self.inner.allocate(layout)? };
        let addr = raw.cast::<u8>().as_ptr() as usize;

        let handle = match self.table.acquire() {
            Ok(handle) => handle,
            Err(err) => {
                // SAFETY: raw was just allocated by inner with layout; no
                // values were constructed yet.
                unsafe { self.inner.deallocate(raw.cast(), layout) };
                return Err(err);
            }
        };
        self.table.set(handle, addr);
        self.insert_descriptor(LiveBlock {
            handle,
            data_size: layout.size(),
            count,
            align: layout.align(),
            relocate: relocate_values::<T>,
            drop_fn: if mem::needs_drop::<T>() {
                Some(drop_values::<T>)
            } else {
                None
            },
        });
        Ok(HandlePtr::new(&self.table, handle))
    }

    /// Inserts a descriptor keeping the list sorted by current address.
    fn insert_descriptor(&self, block: LiveBlock) {
        let addr = self.table.get(block.handle);
        let mut blocks = self.blocks.borrow_mut();
        let idx = blocks.partition_point(|other| self.table.get(other.handle) < addr);
        blocks.insert(idx, block);
    }
}

impl Drop for CompactingAllocator<'_> {
    fn drop(&mut self) {
        let live = self.blocks.borrow().len();
        if live != 0 {
            #[cfg(feature = "logging")]
            error!(live, "compacting allocator dropped with live blocks");
            debug_assert_eq!(live, 0, "compacting allocator dropped with live blocks");
        }
    }
}

impl core::fmt::Debug for CompactingAllocator<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CompactingAllocator")
            .field("capacity", &self.inner.capacity())
            .field("live_blocks", &self.blocks.borrow().len())
            .field("free_chunks", &self.inner.free_chunk_count())
            .finish()
    }
}
