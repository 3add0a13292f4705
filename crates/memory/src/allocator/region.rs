//! Backing storage for region allocators.
//!
//! A [`Region`] is a raw byte buffer obtained exactly once from a parent
//! [`Allocator`] at construction and returned to it on drop. It is never
//! resized. Every region allocator keeps the invariant that all of its
//! internal state (chunks, free lists, bump heads) references addresses
//! inside `[start, end)`.

use core::alloc::Layout;
use core::ptr::NonNull;

use super::{AllocResult, Allocator};

/// A fixed-size raw byte buffer exclusively owned by one allocator.
pub struct Region<'p> {
    base: NonNull<u8>,
    layout: Layout,
    parent: &'p dyn Allocator,
}

impl<'p> Region<'p> {
    /// Request a buffer for `layout` from `parent`.
    pub fn new(parent: &'p dyn Allocator, layout: Layout) -> AllocResult<Self> {
        // SAFETY: layout is validated by the caller to have non-zero size;
        // the returned buffer is owned by this Region until drop.
        let base = unsafe { parent.allocate(layout)? }.cast::<u8>();
        Ok(Self {
            base,
            layout,
            parent,
        })
    }

    /// First address of the buffer.
    #[inline]
    #[must_use]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    /// First address as an integer, for address arithmetic.
    #[inline]
    #[must_use]
    pub fn start(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// One past the last address.
    #[inline]
    #[must_use]
    pub fn end(&self) -> usize {
        self.start() + self.layout.size()
    }

    /// Buffer size in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Whether `addr` lies within `[start, end)`.
    #[inline]
    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.start() && addr < self.end()
    }
}

impl Drop for Region<'_> {
    fn drop(&mut self) {
        // SAFETY: base was allocated from parent with self.layout and is
        // released exactly once, here.
        unsafe { self.parent.deallocate(self.base, self.layout) };
    }
}

impl core::fmt::Debug for Region<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Region")
            .field("start", &format_args!("{:#x}", self.start()))
            .field("size", &self.layout.size())
            .finish()
    }
}
