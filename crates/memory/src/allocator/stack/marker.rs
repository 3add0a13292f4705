//! Stack marker for position tracking

/// Marker representing a position in the stack allocator
///
/// Can be used to reset the allocator to this position, destroying and
/// deallocating everything allocated after the marker was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackMarker {
    /// Byte offset of the bump head when the marker was taken.
    pub(super) position: usize,
    /// Length of the finalizer list when the marker was taken.
    pub(super) finalizers: usize,
}

impl StackMarker {
    /// Marker for an empty stack (the allocator's base).
    pub(super) const BASE: Self = Self {
        position: 0,
        finalizers: 0,
    };
}
