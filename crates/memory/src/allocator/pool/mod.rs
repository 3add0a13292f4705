//! Fixed-chunk-size freelist allocator.
//!
//! A [`PoolAllocator`] carves one [`Region`] into `capacity` chunks of
//! identical size and threads a singly linked free list *through the free
//! chunks themselves*: the first pointer-width bytes of a free chunk hold
//! the address of the next free chunk, terminated by zero. Allocation and
//! deallocation are both O(1) and the pool can never fragment.
//!
//! Freed chunks are reused LIFO: deallocating a chunk and allocating again
//! returns the same address.

mod config;

pub use config::PoolConfig;

use core::alloc::Layout;
use core::cell::Cell;
use core::mem;
use core::ptr::NonNull;
use std::sync::Arc;

use super::{AllocResult, Allocator, Region, TypedAllocator};
use crate::core::types::{align_up, alignment::MAX_ALIGN};
use crate::error::MemoryError;
use crate::stats::{AllocationStats, StatsSnapshot};

#[cfg(feature = "logging")]
use tracing::{debug, error, warn};

/// Fixed-chunk-size freelist allocator over a single region.
pub struct PoolAllocator<'p> {
    region: Region<'p>,
    /// Address of the first free chunk, 0 when the pool is exhausted.
    free_head: Cell<usize>,
    /// Chunk stride in bytes (requested size rounded up to the chunk
    /// alignment and pointer width).
    chunk_size: usize,
    chunk_align: usize,
    capacity: usize,
    live: Cell<usize>,
    config: PoolConfig,
    stats: Arc<AllocationStats>,
}

impl<'p> PoolAllocator<'p> {
    /// Creates a pool of `capacity` chunks of `chunk_size` bytes, aligned
    /// to `chunk_align`, backed by a region from `parent`.
    pub fn new(
        chunk_size: usize,
        chunk_align: usize,
        capacity: usize,
        parent: &'p dyn Allocator,
    ) -> AllocResult<Self> {
        Self::with_config(chunk_size, chunk_align, capacity, PoolConfig::default(), parent)
    }

    /// Creates a pool with an explicit [`PoolConfig`].
    pub fn with_config(
        chunk_size: usize,
        chunk_align: usize,
        capacity: usize,
        config: PoolConfig,
        parent: &'p dyn Allocator,
    ) -> AllocResult<Self> {
        if capacity == 0 {
            return Err(MemoryError::invalid_config("pool capacity must be non-zero"));
        }
        if chunk_size < mem::size_of::<usize>() {
            // The free list lives inside free chunks, so a chunk must be
            // able to hold one pointer.
            return Err(MemoryError::invalid_config(
                "pool chunk size must be at least one pointer width",
            ));
        }
        if !chunk_align.is_power_of_two() || chunk_align > MAX_ALIGN {
            return Err(MemoryError::invalid_alignment(chunk_align, MAX_ALIGN));
        }

        let align = chunk_align.max(mem::align_of::<usize>());
        let stride = align_up(chunk_size, align);
        let total = stride
            .checked_mul(capacity)
            .ok_or_else(|| MemoryError::invalid_config("pool size overflows usize"))?;
        let layout = Layout::from_size_align(total, align)
            .map_err(|_| MemoryError::invalid_config("invalid pool region layout"))?;

        let region = Region::new(parent, layout)?;

        let pool = Self {
            region,
            free_head: Cell::new(0),
            chunk_size: stride,
            chunk_align: align,
            capacity,
            live: Cell::new(0),
            config,
            stats: Arc::new(AllocationStats::new()),
        };
        pool.thread_free_list();

        #[cfg(feature = "logging")]
        debug!(
            chunk_size = pool.chunk_size,
            capacity, "pool allocator created"
        );

        Ok(pool)
    }

    /// Links every chunk into the free list, first chunk at the head.
    fn thread_free_list(&self) {
        let start = self.region.start();
        for i in 0..self.capacity {
            let chunk = start + i * self.chunk_size;
            let next = if i + 1 < self.capacity {
                start + (i + 1) * self.chunk_size
            } else {
                0
            };
            // SAFETY: chunk is inside the region and aligned to at least
            // align_of::<usize>() by construction.
            unsafe { (chunk as *mut usize).write(next) };
        }
        self.free_head.set(start);
    }

    /// Total number of chunks.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Effective chunk stride in bytes.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks currently handed out.
    #[inline]
    pub fn live_chunks(&self) -> usize {
        self.live.get()
    }

    /// Number of chunks on the free list.
    #[inline]
    pub fn free_chunks(&self) -> usize {
        self.capacity - self.live.get()
    }

    /// Point-in-time counters for diagnostics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Shared counter handle for the process-wide tracking registry.
    pub fn stats_handle(&self) -> Arc<AllocationStats> {
        Arc::clone(&self.stats)
    }

    /// Whether `value` reads as the address of a chunk in this pool.
    ///
    /// Used by the double-free heuristic: a live chunk was filled at
    /// allocation time, so its first word should never look like a chunk
    /// address. The known false negative (a freed chunk at the free-list
    /// tail stores 0) is accepted rather than worked around.
    fn looks_like_chunk_address(&self, value: usize) -> bool {
        value != 0
            && self.region.contains(value)
            && (value - self.region.start()) % self.chunk_size == 0
    }
}

// SAFETY: chunks handed out are exclusive, properly aligned, and stay valid
// until deallocated; the free list only ever threads through chunks the
// caller no longer holds.
unsafe impl Allocator for PoolAllocator<'_> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        if layout.size() > self.chunk_size {
            return Err(MemoryError::chunk_too_large(layout.size(), self.chunk_size));
        }
        // Satisfiable only by accident: the chunk grid is aligned to
        // chunk_align, not to the caller's stricter request. Non-fatal.
        #[cfg(feature = "logging")]
        if layout.align() > self.chunk_align {
            warn!(
                requested = layout.align(),
                chunk_align = self.chunk_align,
                "pool chunk alignment below requested alignment"
            );
        }

        let chunk = self.free_head.get();
        if chunk == 0 {
            return Err(MemoryError::pool_exhausted(self.capacity));
        }

        // SAFETY: chunk came off the free list, so it is a valid free chunk
        // whose first word is the next free chunk address.
        let next = unsafe { (chunk as *const usize).read() };
        self.free_head.set(next);

        // Wipe the stale free-list pointer (and everything else) so a later
        // read can never mistake leftover link words for live data.
        let fill = self.config.alloc_pattern.unwrap_or(0);
        // SAFETY: the chunk is chunk_size bytes inside the region.
        unsafe { (chunk as *mut u8).write_bytes(fill, self.chunk_size) };

        self.live.set(self.live.get() + 1);
        self.stats.record_allocation(self.chunk_size);

        // SAFETY: chunk is non-zero (checked above).
        let ptr = unsafe { NonNull::new_unchecked(chunk as *mut u8) };
        Ok(NonNull::slice_from_raw_parts(ptr, self.chunk_size))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
        let addr = ptr.as_ptr() as usize;
        assert!(
            self.region.contains(addr),
            "pool deallocate: pointer {addr:#x} is outside the pool region"
        );
        assert!(
            (addr - self.region.start()) % self.chunk_size == 0,
            "pool deallocate: pointer {addr:#x} is not a chunk boundary"
        );

        // SAFETY: addr is a chunk boundary inside the region, valid for a
        // usize read.
        let first_word = unsafe { (addr as *const usize).read() };
        assert!(
            !self.looks_like_chunk_address(first_word),
            "pool deallocate: chunk {addr:#x} already looks free (double free?)"
        );

        if let Some(pattern) = self.config.dealloc_pattern {
            // SAFETY: the chunk is chunk_size bytes inside the region.
            unsafe { (addr as *mut u8).write_bytes(pattern, self.chunk_size) };
        }

        // Push onto the free list head; the next allocation reuses this
        // chunk first (LIFO).
        // SAFETY: the chunk is no longer owned by the caller.
        unsafe { (addr as *mut usize).write(self.free_head.get()) };
        self.free_head.set(addr);

        self.live.set(self.live.get() - 1);
        self.stats.record_deallocation(self.chunk_size);
    }
}

impl TypedAllocator for PoolAllocator<'_> {}

impl Drop for PoolAllocator<'_> {
    fn drop(&mut self) {
        if self.live.get() != 0 {
            #[cfg(feature = "logging")]
            error!(
                live = self.live.get(),
                capacity = self.capacity,
                "pool allocator dropped with live chunks"
            );
            debug_assert!(
                self.live.get() == 0,
                "pool allocator dropped with {} live chunks",
                self.live.get()
            );
        }
    }
}

impl core::fmt::Debug for PoolAllocator<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("chunk_size", &self.chunk_size)
            .field("capacity", &self.capacity)
            .field("live", &self.live.get())
            .finish()
    }
}
