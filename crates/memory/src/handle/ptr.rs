//! Relocatable pointer backed by a handle table.

use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

use super::{HandleTable, INVALID_HANDLE};

/// A relocatable reference to a block owned by a compacting allocator.
///
/// A `HandlePtr` names a [`HandleTable`] slot rather than an address.
/// Resolution performs a fresh table lookup, so the pointer stays valid
/// across any number of compactions, until its allocation is released,
/// which invalidates the pointer in place.
///
/// `HandlePtr` does not own memory and is freely copyable; copies of an
/// invalidated pointer dangle, exactly like copies of a raw pointer.
pub struct HandlePtr<'t, T> {
    table: Option<&'t HandleTable>,
    index: u32,
    _marker: PhantomData<*mut T>,
}

impl<'t, T> HandlePtr<'t, T> {
    pub(crate) fn new(table: &'t HandleTable, index: u32) -> Self {
        debug_assert_ne!(index, INVALID_HANDLE);
        Self {
            table: Some(table),
            index,
            _marker: PhantomData,
        }
    }

    /// The null pointer: resolves to nothing.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            table: None,
            index: INVALID_HANDLE,
            _marker: PhantomData,
        }
    }

    /// Whether this pointer refers to a handle at all.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.table.is_none() || self.index == INVALID_HANDLE
    }

    /// The handle slot this pointer names.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> u32 {
        self.index
    }

    /// Re-reads the table and returns the block's current address.
    ///
    /// Returns `None` for a null (or invalidated) pointer. The address is
    /// the block's location *right now*; a later compaction may move it,
    /// which is why callers should resolve late and never cache.
    #[must_use]
    pub fn resolve(&self) -> Option<NonNull<T>> {
        let table = self.table?;
        if self.index == INVALID_HANDLE {
            return None;
        }
        NonNull::new(table.get(self.index) as *mut T)
    }

    /// Borrows the referenced value.
    ///
    /// # Safety
    ///
    /// The pointer must not be null, the allocation must still be live, and
    /// no compaction may run while the returned borrow exists.
    #[must_use]
    pub unsafe fn as_ref(&self) -> &T {
        // SAFETY: caller guarantees the handle resolves to a live, typed
        // allocation.
        unsafe { self.resolve().expect("null HandlePtr").as_ref() }
    }

    /// Mutably borrows the referenced value.
    ///
    /// # Safety
    ///
    /// Same as [`HandlePtr::as_ref`], plus the usual exclusivity rules for
    /// `&mut`.
    #[must_use]
    pub unsafe fn as_mut(&mut self) -> &mut T {
        // SAFETY: caller guarantees exclusive access to a live allocation.
        unsafe { self.resolve().expect("null HandlePtr").as_mut() }
    }

    /// Clears the pointer so later use is caught as a null resolve instead
    /// of a dangling dereference.
    pub(crate) fn invalidate(&mut self) {
        self.table = None;
        self.index = INVALID_HANDLE;
    }
}

impl<T> Clone for HandlePtr<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for HandlePtr<'_, T> {}

impl<T> Default for HandlePtr<'_, T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for HandlePtr<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "HandlePtr(null)")
        } else {
            write!(f, "HandlePtr(handle = {})", self.index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_pointer_resolves_to_none() {
        let ptr: HandlePtr<'_, u32> = HandlePtr::null();
        assert!(ptr.is_null());
        assert!(ptr.resolve().is_none());
    }

    #[test]
    fn resolution_follows_the_table() {
        let table = HandleTable::new(4);
        let handle = table.acquire().unwrap();

        let mut value_a = 5u32;
        let mut value_b = 9u32;

        table.set(handle, core::ptr::from_mut(&mut value_a) as usize);
        let ptr: HandlePtr<'_, u32> = HandlePtr::new(&table, handle);
        assert_eq!(unsafe { *ptr.as_ref() }, 5);

        // Retargeting the slot moves every outstanding pointer.
        table.set(handle, core::ptr::from_mut(&mut value_b) as usize);
        assert_eq!(unsafe { *ptr.as_ref() }, 9);

        table.release(handle);
    }

    #[test]
    fn invalidation_clears_the_pointer() {
        let table = HandleTable::new(4);
        let handle = table.acquire().unwrap();
        table.set(handle, 0x1000);

        let mut ptr: HandlePtr<'_, u8> = HandlePtr::new(&table, handle);
        assert!(!ptr.is_null());

        ptr.invalidate();
        assert!(ptr.is_null());
        assert!(ptr.resolve().is_none());

        table.release(handle);
    }
}
