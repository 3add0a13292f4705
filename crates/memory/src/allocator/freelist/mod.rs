//! General-purpose free-list allocator.
//!
//! The [`FreeListAllocator`] manages a single [`Region`] through an ordered
//! list of free chunks and an inline [`BlockHeader`] in front of every live
//! block. The list is kept sorted by ascending address, entries never
//! overlap, and touching entries are merged the moment they appear. The
//! list therefore never contains adjacent-but-unmerged chunks: coalescing
//! is a structural invariant rather than a maintenance pass.
//!
//! Allocation is first-fit: O(n) over the free list, traded for guaranteed
//! coalescing and zero external bookkeeping per block.

mod header;

pub(crate) use header::{BlockHeader, HEADER_SIZE};

use core::alloc::Layout;
use core::cell::RefCell;
use core::ptr::NonNull;
use std::sync::Arc;

use super::{AllocResult, Allocator, Region, TypedAllocator};
use crate::core::types::{align_up, alignment::MAX_ALIGN};
use crate::error::MemoryError;
use crate::stats::{AllocationStats, FragmentationStats, StatsSnapshot};

#[cfg(feature = "logging")]
use tracing::debug;

/// A contiguous span of reclaimed memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FreeChunk {
    pub(crate) addr: usize,
    pub(crate) size: usize,
}

impl FreeChunk {
    #[inline]
    pub(crate) fn end(&self) -> usize {
        self.addr + self.size
    }
}

/// Configuration for the free-list allocator
#[derive(Debug, Clone, Default)]
pub struct FreeListConfig {
    /// Fill pattern byte for newly allocated blocks (for debugging).
    ///
    /// Freed blocks are always zeroed (that is what makes a double free
    /// detectable), so only the allocation side is configurable.
    pub alloc_pattern: Option<u8>,
}

impl FreeListConfig {
    /// Debug configuration - poison fresh allocations
    #[must_use]
    pub fn debug() -> Self {
        Self {
            alloc_pattern: Some(0xBB),
        }
    }
}

/// First-fit allocator with a sorted, self-coalescing free list.
pub struct FreeListAllocator<'p> {
    region: Region<'p>,
    /// Free chunks sorted by ascending address; no overlaps, no touching
    /// neighbors.
    free: RefCell<Vec<FreeChunk>>,
    config: FreeListConfig,
    stats: Arc<AllocationStats>,
}

impl<'p> FreeListAllocator<'p> {
    /// Creates an allocator over `capacity` bytes from `parent`.
    pub fn new(capacity: usize, parent: &'p dyn Allocator) -> AllocResult<Self> {
        Self::with_config(capacity, FreeListConfig::default(), parent)
    }

    /// Creates an allocator with an explicit [`FreeListConfig`].
    pub fn with_config(
        capacity: usize,
        config: FreeListConfig,
        parent: &'p dyn Allocator,
    ) -> AllocResult<Self> {
        if capacity <= HEADER_SIZE {
            return Err(MemoryError::invalid_config(
                "free-list capacity must exceed the block header size",
            ));
        }
        let layout = Layout::from_size_align(capacity, MAX_ALIGN)
            .map_err(|_| MemoryError::invalid_config("invalid free-list region layout"))?;
        let region = Region::new(parent, layout)?;

        let whole = FreeChunk {
            addr: region.start(),
            size: region.size(),
        };

        #[cfg(feature = "logging")]
        debug!(capacity, "free-list allocator created");

        Ok(Self {
            region,
            free: RefCell::new(vec![whole]),
            config,
            stats: Arc::new(AllocationStats::new()),
        })
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.region.size()
    }

    /// Number of entries in the free list.
    pub fn free_chunk_count(&self) -> usize {
        self.free.borrow().len()
    }

    /// Size of the largest free chunk.
    pub fn largest_free(&self) -> usize {
        self.free
            .borrow()
            .iter()
            .map(|chunk| chunk.size)
            .max()
            .unwrap_or(0)
    }

    /// Fragmentation metrics over the current free list.
    pub fn fragmentation(&self) -> FragmentationStats {
        let free = self.free.borrow();
        let total: usize = free.iter().map(|chunk| chunk.size).sum();
        let largest = free.iter().map(|chunk| chunk.size).max().unwrap_or(0);
        FragmentationStats::calculate(total, largest, free.len())
    }

    /// Point-in-time counters for diagnostics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Shared counter handle for the process-wide tracking registry.
    pub fn stats_handle(&self) -> Arc<AllocationStats> {
        Arc::clone(&self.stats)
    }

    /// Inserts `[addr, addr + size)` into the free list, merging with a
    /// touching left and/or right neighbor so the sorted/coalesced
    /// invariant holds on exit.
    pub(crate) fn insert_free_span(&self, addr: usize, size: usize) {
        debug_assert!(size > 0);
        debug_assert!(addr >= self.region.start() && addr + size <= self.region.end());

        let mut free = self.free.borrow_mut();
        let idx = free.partition_point(|chunk| chunk.addr < addr);

        debug_assert!(idx == 0 || free[idx - 1].end() <= addr, "overlapping free");
        debug_assert!(idx == free.len() || addr + size <= free[idx].addr, "overlapping free");

        let touches_left = idx > 0 && free[idx - 1].end() == addr;
        let touches_right = idx < free.len() && addr + size == free[idx].addr;

        match (touches_left, touches_right) {
            (true, true) => {
                let right_size = free[idx].size;
                free[idx - 1].size += size + right_size;
                free.remove(idx);
            }
            (true, false) => free[idx - 1].size += size,
            (false, true) => {
                free[idx].addr = addr;
                free[idx].size += size;
            }
            (false, false) => free.insert(idx, FreeChunk { addr, size }),
        }
    }

    /// The lowest-address free chunk, if any. Used by compaction.
    pub(crate) fn lowest_free(&self) -> Option<FreeChunk> {
        self.free.borrow().first().copied()
    }

    /// Removes and returns the lowest-address free chunk. Used by
    /// compaction, which re-inserts the vacated span afterwards.
    pub(crate) fn pop_lowest_free(&self) -> FreeChunk {
        self.free.borrow_mut().remove(0)
    }

    #[inline]
    pub(crate) fn region_end(&self) -> usize {
        self.region.end()
    }
}

// SAFETY: returned blocks are exclusive sub-spans of the region; headers
// sit outside the span handed to the caller, and reclamation goes through
// the coalescing free list only.
unsafe impl Allocator for FreeListAllocator<'_> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        // The single validated alignment cap (Layout already guarantees a
        // power of two).
        if layout.align() > MAX_ALIGN {
            return Err(MemoryError::invalid_alignment(layout.align(), MAX_ALIGN));
        }
        // Reserved spans are stored in a fixed-width u32 header field.
        let max_size = u32::MAX as usize - MAX_ALIGN - HEADER_SIZE;
        if layout.size() > max_size {
            return Err(MemoryError::allocation_too_large(layout.size(), max_size));
        }

        let mut free = self.free.borrow_mut();

        // First fit: the earliest chunk able to host header + padding +
        // payload wins.
        for idx in 0..free.len() {
            let chunk = free[idx];
            let user = align_up(chunk.addr + HEADER_SIZE, layout.align());
            let end = user + layout.size();
            if end > chunk.end() {
                continue;
            }

            let reserved = end - chunk.addr;
            // SAFETY: [chunk.addr, end) is free memory inside the region;
            // user sits at least HEADER_SIZE past chunk.addr.
            unsafe {
                BlockHeader::write(user as *mut u8, (user - chunk.addr) as u8, reserved as u32);
            }

            // Shrink the chosen chunk from its front; drop it when empty.
            if reserved == chunk.size {
                free.remove(idx);
            } else {
                free[idx].addr = chunk.addr + reserved;
                free[idx].size = chunk.size - reserved;
            }
            drop(free);

            if let Some(pattern) = self.config.alloc_pattern {
                // SAFETY: [user, end) is the caller's payload span.
                unsafe { (user as *mut u8).write_bytes(pattern, layout.size()) };
            }

            self.stats.record_allocation(reserved);

            // SAFETY: user is non-zero because it lies inside the region.
            let ptr = unsafe { NonNull::new_unchecked(user as *mut u8) };
            return Ok(NonNull::slice_from_raw_parts(ptr, layout.size()));
        }

        let largest = free.iter().map(|chunk| chunk.size).max().unwrap_or(0);
        drop(free);
        Err(MemoryError::region_exhausted(layout.size(), largest))
    }

    /// Reclaims a block. The layout parameter is ignored: the inline header
    /// is the source of truth for the block's span.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
        let user = ptr.as_ptr() as usize;
        assert!(
            self.region.contains(user),
            "free-list deallocate: pointer {user:#x} is outside the region"
        );

        // SAFETY: per contract ptr was returned by allocate, which wrote a
        // header below it.
        let header = unsafe { BlockHeader::read(ptr.as_ptr()) };
        // A freed block is zeroed below, header included, which makes the
        // second free of the same address land here.
        assert!(
            header.size != 0,
            "free-list deallocate: zeroed header at {user:#x} (double free?)"
        );

        let start = user - header.padding as usize;
        let span = header.size as usize;
        assert!(
            start >= self.region.start() && start + span <= self.region.end(),
            "free-list deallocate: corrupt header at {user:#x}"
        );

        // SAFETY: [start, start + span) is the block being reclaimed.
        unsafe { (start as *mut u8).write_bytes(0, span) };

        self.stats.record_deallocation(span);
        self.insert_free_span(start, span);
    }
}

impl TypedAllocator for FreeListAllocator<'_> {}

impl Drop for FreeListAllocator<'_> {
    fn drop(&mut self) {
        if self.stats.in_use_bytes() != 0 {
            #[cfg(feature = "logging")]
            tracing::error!(
                in_use = self.stats.in_use_bytes(),
                "free-list allocator dropped with live blocks"
            );
            debug_assert_eq!(self.stats.in_use_bytes(), 0);
        }
    }
}

impl core::fmt::Debug for FreeListAllocator<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FreeListAllocator")
            .field("capacity", &self.region.size())
            .field("free_chunks", &self.free.borrow().len())
            .finish()
    }
}
