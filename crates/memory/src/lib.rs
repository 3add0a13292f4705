//! # kestrel-memory
//!
//! Region allocators for the Kestrel engine runtime.
//!
//! Engine subsystems never talk to the process allocator directly; they
//! draw from a tree of region allocators seeded by a single
//! [`SystemAllocator`](allocator::SystemAllocator):
//!
//! - [`PoolAllocator`](allocator::PoolAllocator): fixed-chunk freelist,
//!   O(1) alloc/free, zero fragmentation. Particles, commands, messages.
//! - [`StackAllocator`](allocator::StackAllocator): bump allocation with
//!   marker-scoped release. Per-frame and per-scope scratch data.
//! - [`FreeListAllocator`](allocator::FreeListAllocator): general-purpose
//!   first-fit allocator with a sorted, self-coalescing free list.
//! - [`CompactingAllocator`](allocator::CompactingAllocator): a free-list
//!   allocator behind a [`HandleTable`](handle::HandleTable); live blocks
//!   relocate during [`defragment`](allocator::CompactingAllocator::defragment)
//!   while every [`HandlePtr`](handle::HandlePtr) keeps resolving.
//!
//! Every allocator implements the same [`Allocator`](allocator::Allocator)
//! contract, which doubles as the parent protocol: any allocator can source
//! another allocator's backing [`Region`](allocator::Region).
//!
//! ## Quick Start
//!
//! ```rust
//! use kestrel_memory::allocator::{PoolAllocator, SystemAllocator, TypedAllocator};
//!
//! # fn main() -> kestrel_memory::MemoryResult<()> {
//! let pool = PoolAllocator::new(64, 8, 1024, SystemAllocator::global())?;
//!
//! unsafe {
//!     let value = pool.alloc_value([0u32; 4])?;
//!     pool.dealloc_value(value);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Threading
//!
//! The allocators are single-threaded by design; interior mutability is
//! `Cell`/`RefCell`, never a lock. Only the [`stats`] counters are atomic,
//! so the process-wide tracking registry can read them from the shutdown
//! leak reporter.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(clippy::all)]
#![warn(clippy::perf)]
#![warn(rust_2018_idioms)]
// This crate is the engine's pointer-arithmetic layer; the workspace-wide
// unsafe_code warning is opted out here.
#![allow(unsafe_code)]
// Explicit lifetimes are clearer in allocator signatures even when elidable
#![allow(clippy::elidable_lifetime_names)]
// Cast truncation/sign-loss in address math is reviewed per-site
#![allow(clippy::cast_possible_truncation)]

// Error types
pub mod error;

// Core modules
pub mod allocator;
pub mod core;
pub mod handle;
pub mod stats;

// Re-export core types for convenience
pub use crate::error::{MemoryError, MemoryResult};

// Public API exports
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::allocator::{
        AllocError, AllocResult, Allocator, CompactingAllocator, FreeListAllocator, PoolAllocator,
        Region, StackAllocator, StackMarker, SystemAllocator, TypedAllocator,
    };
    pub use crate::core::types::align_up;
    pub use crate::error::{MemoryError, MemoryResult};
    pub use crate::handle::{HandlePtr, HandleTable};
    pub use crate::stats::{AllocationStats, FragmentationStats, StatsSnapshot};
}
