//! LIFO bump allocator with marker-scoped release.
//!
//! A [`StackAllocator`] bumps a head offset through its [`Region`] and never
//! releases individual allocations: callers capture a [`StackMarker`] and
//! later call [`StackAllocator::clear_to_marker`], which destroys everything
//! allocated after the marker in reverse allocation order and rewinds the
//! head. This is the per-frame / per-scope scratch allocator of the engine.
//!
//! Values that need dropping are recorded in a type-erased finalizer list;
//! trivially destructible values cost nothing beyond the bump.

mod config;
mod marker;

pub use config::StackConfig;
pub use marker::StackMarker;

use core::alloc::Layout;
use core::cell::{Cell, RefCell};
use core::mem;
use core::ptr::NonNull;
use std::sync::Arc;

use super::{AllocResult, Allocator, Region};
use crate::core::types::{align_up, alignment::MAX_ALIGN};
use crate::error::MemoryError;
use crate::stats::{AllocationStats, StatsSnapshot};

#[cfg(feature = "logging")]
use tracing::{debug, error};

/// Type-erased destructor record for one allocation.
struct Finalizer {
    addr: *mut u8,
    count: usize,
    drop_fn: unsafe fn(*mut u8, usize),
}

/// Drops `count` elements of `T` starting at `ptr`.
///
/// Monomorphized per element type and stored as a plain fn pointer in the
/// finalizer list, so the list itself stays type-blind.
unsafe fn drop_in_place_array<T>(ptr: *mut u8, count: usize) {
    let ptr = ptr.cast::<T>();
    for i in 0..count {
        // SAFETY: caller guarantees ptr points at `count` live elements.
        unsafe { core::ptr::drop_in_place(ptr.add(i)) };
    }
}

/// Bump allocator with LIFO-scoped destruction via markers.
pub struct StackAllocator<'p> {
    region: Region<'p>,
    /// Bump head as an offset from the region start.
    head: Cell<usize>,
    finalizers: RefCell<Vec<Finalizer>>,
    config: StackConfig,
    stats: Arc<AllocationStats>,
}

impl<'p> StackAllocator<'p> {
    /// Creates a stack allocator over `capacity` bytes from `parent`.
    pub fn new(capacity: usize, parent: &'p dyn Allocator) -> AllocResult<Self> {
        Self::with_config(capacity, StackConfig::default(), parent)
    }

    /// Creates a stack allocator with an explicit [`StackConfig`].
    pub fn with_config(
        capacity: usize,
        config: StackConfig,
        parent: &'p dyn Allocator,
    ) -> AllocResult<Self> {
        if capacity == 0 {
            return Err(MemoryError::invalid_config(
                "stack capacity must be non-zero",
            ));
        }
        let layout = Layout::from_size_align(capacity, MAX_ALIGN)
            .map_err(|_| MemoryError::invalid_config("invalid stack region layout"))?;
        let region = Region::new(parent, layout)?;

        #[cfg(feature = "logging")]
        debug!(capacity, "stack allocator created");

        Ok(Self {
            region,
            head: Cell::new(0),
            finalizers: RefCell::new(Vec::new()),
            config,
            stats: Arc::new(AllocationStats::new()),
        })
    }

    /// Bytes currently in use.
    #[inline]
    pub fn used(&self) -> usize {
        self.head.get()
    }

    /// Bytes still available at the top of the stack.
    #[inline]
    pub fn available(&self) -> usize {
        self.region.size() - self.head.get()
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.region.size()
    }

    /// Point-in-time counters for diagnostics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Shared counter handle for the process-wide tracking registry.
    pub fn stats_handle(&self) -> Arc<AllocationStats> {
        Arc::clone(&self.stats)
    }

    /// Captures the current head and finalizer watermark.
    #[must_use]
    pub fn marker(&self) -> StackMarker {
        StackMarker {
            position: self.head.get(),
            finalizers: self.finalizers.borrow().len(),
        }
    }

    /// Allocates and constructs one `T` on the stack.
    ///
    /// The value is destroyed by the `clear*` call that rewinds past it, in
    /// reverse allocation order. The returned pointer must not be used after
    /// that point.
    pub fn alloc_value<T>(&self, value: T) -> AllocResult<NonNull<T>> {
        let ptr = self.bump(Layout::new::<T>())?.cast::<T>();
        // SAFETY: bump returned properly aligned storage for a T.
        unsafe { ptr.as_ptr().write(value) };
        self.record_finalizer::<T>(ptr.cast(), 1);
        Ok(ptr)
    }

    /// Allocates and constructs `count` elements of `T`, initializing each
    /// with `init(index)`. Returns a pointer to the first element.
    pub fn alloc_array<T>(
        &self,
        count: usize,
        mut init: impl FnMut(usize) -> T,
    ) -> AllocResult<NonNull<T>> {
        let layout = Layout::array::<T>(count)
            .map_err(|_| MemoryError::invalid_config("stack array layout overflows"))?;
        let ptr = self.bump(layout)?.cast::<T>();
        for i in 0..count {
            // SAFETY: bump returned storage for `count` elements.
            unsafe { ptr.as_ptr().add(i).write(init(i)) };
        }
        self.record_finalizer::<T>(ptr.cast(), count);
        Ok(ptr)
    }

    /// Rewinds the head to `marker`, destroying everything allocated after
    /// it in reverse allocation order.
    ///
    /// # Panics
    ///
    /// Panics if `marker` lies above the current head: markers are strictly
    /// LIFO-scoped, and clearing to a marker taken after memory that has
    /// already been released is a programming error.
    pub fn clear_to_marker(&self, marker: StackMarker) {
        assert!(
            marker.position <= self.head.get(),
            "stack marker at offset {} is above the current head {}",
            marker.position,
            self.head.get()
        );
        let mut finalizers = self.finalizers.borrow_mut();
        assert!(
            marker.finalizers <= finalizers.len(),
            "stack marker finalizer watermark is stale"
        );

        // Most-recently-allocated first.
        while finalizers.len() > marker.finalizers {
            let finalizer = finalizers.pop().expect("length checked above");
            // SAFETY: the recorded values are still live; nothing between
            // their construction and this rewind could have destroyed them.
            unsafe { (finalizer.drop_fn)(finalizer.addr, finalizer.count) };
        }
        drop(finalizers);

        let released = self.head.get() - marker.position;
        if released > 0 {
            if let Some(pattern) = self.config.dealloc_pattern {
                // SAFETY: [marker.position, head) is inside the region.
                unsafe {
                    (self.region.base().as_ptr().add(marker.position))
                        .write_bytes(pattern, released);
                }
            }
            self.stats.record_deallocation(released);
        }
        self.head.set(marker.position);
    }

    /// Destroys everything and rewinds to the base of the stack.
    pub fn clear(&self) {
        self.clear_to_marker(StackMarker::BASE);
    }

    /// Aligns the head, reserves `layout.size()` bytes, and returns the
    /// start of the reservation.
    fn bump(&self, layout: Layout) -> AllocResult<NonNull<u8>> {
        if layout.align() > MAX_ALIGN {
            return Err(MemoryError::invalid_alignment(layout.align(), MAX_ALIGN));
        }

        let start = self.region.start();
        let aligned = align_up(start + self.head.get(), layout.align()) - start;
        let new_head = aligned
            .checked_add(layout.size())
            .ok_or_else(|| MemoryError::stack_exhausted(layout.size(), self.available()))?;
        if new_head > self.region.size() {
            return Err(MemoryError::stack_exhausted(layout.size(), self.available()));
        }

        // Charge the padding to this allocation so used()/stats stay in
        // sync with the head.
        self.stats.record_allocation(new_head - self.head.get());
        self.head.set(new_head);

        // SAFETY: start + aligned is inside the region and non-null.
        Ok(unsafe { NonNull::new_unchecked((start + aligned) as *mut u8) })
    }

    fn record_finalizer<T>(&self, addr: NonNull<u8>, count: usize) {
        if mem::needs_drop::<T>() {
            self.finalizers.borrow_mut().push(Finalizer {
                addr: addr.as_ptr(),
                count,
                drop_fn: drop_in_place_array::<T>,
            });
        }
    }
}

// SAFETY: bump reservations are exclusive, aligned, and valid until the
// head is rewound past them; `deallocate` is intentionally a no-op because
// release is marker-scoped.
unsafe impl Allocator for StackAllocator<'_> {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        let ptr = self.bump(layout)?;
        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
        // Individual deallocation does not exist on a stack allocator;
        // memory is reclaimed by clear()/clear_to_marker().
    }
}

impl Drop for StackAllocator<'_> {
    fn drop(&mut self) {
        self.clear();
        // Bulk release means allocation/deallocation *counts* never pair up
        // here; the byte counter is the leak signal.
        if self.stats.in_use_bytes() != 0 {
            #[cfg(feature = "logging")]
            error!(
                in_use = self.stats.in_use_bytes(),
                "stack allocator byte counter non-zero at drop"
            );
            debug_assert_eq!(self.stats.in_use_bytes(), 0);
        }
    }
}

impl core::fmt::Debug for StackAllocator<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StackAllocator")
            .field("capacity", &self.region.size())
            .field("used", &self.head.get())
            .field("finalizers", &self.finalizers.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::SystemAllocator;
    use std::rc::Rc;

    fn test_stack(capacity: usize) -> StackAllocator<'static> {
        StackAllocator::new(capacity, SystemAllocator::global()).unwrap()
    }

    /// Records its tag into the shared log when dropped.
    struct DropLog {
        tag: u32,
        log: Rc<RefCell<Vec<u32>>>,
    }

    impl Drop for DropLog {
        fn drop(&mut self) {
            self.log.borrow_mut().push(self.tag);
        }
    }

    #[test]
    fn bump_and_exhaustion() {
        let stack = test_stack(64);

        let a = stack.alloc_value(1u64).unwrap();
        let b = stack.alloc_value(2u64).unwrap();
        assert!(b.as_ptr() > a.as_ptr());
        assert_eq!(stack.used(), 16);

        assert!(matches!(
            stack.alloc_array::<u64>(100, |_| 0),
            Err(MemoryError::StackExhausted { .. })
        ));
    }

    #[test]
    fn alignment_is_respected() {
        let stack = test_stack(256);

        let _ = stack.alloc_value(1u8).unwrap();
        let aligned = stack.alloc_value(0u128).unwrap();
        assert_eq!(aligned.as_ptr() as usize % mem::align_of::<u128>(), 0);
    }

    #[test]
    fn clear_rewinds_head() {
        let stack = test_stack(128);
        let first = stack.alloc_value(7u32).unwrap();
        stack.clear();
        assert_eq!(stack.used(), 0);

        // Same address comes back after the rewind.
        let second = stack.alloc_value(8u32).unwrap();
        assert_eq!(first, second);
        stack.clear();
    }

    #[test]
    fn destructors_run_in_reverse_order() {
        let stack = test_stack(512);
        let log = Rc::new(RefCell::new(Vec::new()));

        let m0 = stack.marker();
        let _a = stack
            .alloc_value(DropLog {
                tag: 1,
                log: Rc::clone(&log),
            })
            .unwrap();

        let m1 = stack.marker();
        let _b = stack
            .alloc_value(DropLog {
                tag: 2,
                log: Rc::clone(&log),
            })
            .unwrap();
        let _c = stack
            .alloc_value(DropLog {
                tag: 3,
                log: Rc::clone(&log),
            })
            .unwrap();

        stack.clear_to_marker(m1);
        assert_eq!(*log.borrow(), vec![3, 2]);

        stack.clear_to_marker(m0);
        assert_eq!(*log.borrow(), vec![3, 2, 1]);
    }

    #[test]
    fn array_elements_drop_once_each() {
        let stack = test_stack(512);
        let log = Rc::new(RefCell::new(Vec::new()));

        let marker = stack.marker();
        stack
            .alloc_array(3, |i| DropLog {
                tag: i as u32,
                log: Rc::clone(&log),
            })
            .unwrap();
        stack.clear_to_marker(marker);

        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn trivial_types_record_no_finalizer() {
        let stack = test_stack(128);
        let _ = stack.alloc_value(42u64).unwrap();
        assert_eq!(stack.finalizers.borrow().len(), 0);
        stack.clear();
    }

    #[test]
    #[should_panic(expected = "above the current head")]
    fn stale_marker_panics() {
        let stack = test_stack(128);
        let _ = stack.alloc_value(1u64).unwrap();
        let marker = stack.marker();
        stack.clear();
        stack.clear_to_marker(marker);
    }

    #[test]
    fn drop_runs_pending_finalizers() {
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let stack = test_stack(128);
            let _ = stack
                .alloc_value(DropLog {
                    tag: 9,
                    log: Rc::clone(&log),
                })
                .unwrap();
        }
        assert_eq!(*log.borrow(), vec![9]);
    }
}
