//! Live-block descriptors and type-erased relocation.
//!
//! The compacting allocator must move blocks without knowing their element
//! type. At allocation time it binds a monomorphized relocation function
//! (and, for types that need it, a destructor) to the block's descriptor;
//! at compaction time it calls through the plain fn pointer. The descriptor
//! list is the only per-block bookkeeping the compactor keeps; everything
//! else lives in the inner allocator's headers and the handle table.

use core::ptr;

/// Bookkeeping for one live block, sorted by the block's current address
/// (looked up through the handle table, never cached here).
pub(crate) struct LiveBlock {
    /// Handle-table slot holding the block's current user address.
    pub handle: u32,
    /// Payload size in bytes (excluding header and padding).
    pub data_size: usize,
    /// Element count for typed blocks; byte count for raw blocks.
    pub count: usize,
    /// Element alignment, re-applied when the block is placed at a new
    /// address.
    pub align: usize,
    /// Moves `count` elements from the old to the new user address.
    pub relocate: unsafe fn(src: *mut u8, dst: *mut u8, count: usize),
    /// Drops the block's contents on deallocation; `None` for raw blocks
    /// and types without drop glue.
    pub drop_fn: Option<unsafe fn(ptr: *mut u8, count: usize)>,
}

/// Moves `count` values of `T` to `dst`.
///
/// Rust values are moved by bitwise copy, so one overlap-safe `ptr::copy`
/// covers every `T`; compaction always moves blocks downward, which makes
/// overlapping source/destination the common case, not the exception.
///
/// # Safety
///
/// `src` must point at `count` live `T`s, `dst` at storage for `count` `T`s
/// aligned to `align_of::<T>()`. After the call the values live at `dst`
/// and must no longer be used through `src`.
pub(crate) unsafe fn relocate_values<T>(src: *mut u8, dst: *mut u8, count: usize) {
    debug_assert_eq!(dst as usize % core::mem::align_of::<T>(), 0);
    // SAFETY: preconditions forwarded from the caller; ptr::copy permits
    // overlap.
    unsafe { ptr::copy(src.cast::<T>(), dst.cast::<T>(), count) };
}

/// Moves `count` raw bytes to `dst`. Bound to untyped allocations.
///
/// # Safety
///
/// `src` and `dst` must each be valid for `count` bytes.
pub(crate) unsafe fn relocate_bytes(src: *mut u8, dst: *mut u8, count: usize) {
    // SAFETY: preconditions forwarded from the caller.
    unsafe { ptr::copy(src, dst, count) };
}

/// Drops `count` values of `T` in place.
///
/// # Safety
///
/// `raw` must point at `count` live `T`s that are never used again.
pub(crate) unsafe fn drop_values<T>(raw: *mut u8, count: usize) {
    let typed = raw.cast::<T>();
    for i in 0..count {
        // SAFETY: caller guarantees the elements are live.
        unsafe { ptr::drop_in_place(typed.add(i)) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relocate_handles_overlap() {
        let mut buffer: [u64; 4] = [1, 2, 3, 0];
        let base = buffer.as_mut_ptr().cast::<u8>();

        // Move three elements one slot up so destination overlaps source.
        unsafe { relocate_values::<u64>(base, base.add(8), 3) };
        assert_eq!(&buffer[1..], &[1, 2, 3]);
    }

    #[test]
    fn drop_values_runs_each_destructor() {
        use std::cell::Cell;
        use std::rc::Rc;

        struct Counted(Rc<Cell<u32>>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let hits = Rc::new(Cell::new(0));
        let mut values = [
            core::mem::ManuallyDrop::new(Counted(Rc::clone(&hits))),
            core::mem::ManuallyDrop::new(Counted(Rc::clone(&hits))),
        ];

        unsafe { drop_values::<Counted>(values.as_mut_ptr().cast(), 2) };
        assert_eq!(hits.get(), 2);
    }
}
