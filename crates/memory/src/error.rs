//! Standalone error types for kestrel-memory
//!
//! Uses thiserror for clean, idiomatic Rust error definitions.

use thiserror::Error;

#[cfg(feature = "logging")]
use tracing::{error, warn};

// ============================================================================
// Main Error Types
// ============================================================================

/// Memory management errors
#[must_use = "errors should be handled"]
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum MemoryError {
    // --- Allocation Errors ---
    #[error("Memory allocation failed: {size} bytes with {align} byte alignment")]
    AllocationFailed { size: usize, align: usize },

    #[error("Invalid alignment: {alignment} (must be a power of two, at most {max})")]
    InvalidAlignment { alignment: usize, max: usize },

    #[error("Allocation exceeds maximum size: {size} bytes (max: {max_size})")]
    ExceedsMaxSize { size: usize, max_size: usize },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // --- Pool Errors ---
    #[error("Pool allocator exhausted (capacity: {capacity} chunks)")]
    PoolExhausted { capacity: usize },

    #[error("Requested {requested} bytes exceeds pool chunk size ({chunk_size})")]
    ChunkTooLarge { requested: usize, chunk_size: usize },

    // --- Stack Errors ---
    #[error("Stack allocator exhausted: requested {requested} bytes, available {available}")]
    StackExhausted { requested: usize, available: usize },

    // --- Free-list Errors ---
    #[error("Region exhausted: no free chunk fits {requested} bytes (largest: {largest_free})")]
    RegionExhausted {
        requested: usize,
        largest_free: usize,
    },

    // --- Handle Errors ---
    #[error("Handle table exhausted (capacity: {capacity} slots)")]
    HandlesExhausted { capacity: usize },
}

impl MemoryError {
    /// Get error code for categorization
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AllocationFailed { .. } => "MEM:ALLOC:FAILED",
            Self::InvalidAlignment { .. } => "MEM:ALLOC:ALIGN",
            Self::ExceedsMaxSize { .. } => "MEM:ALLOC:MAX",
            Self::InvalidConfig { .. } => "MEM:CONFIG:INVALID",
            Self::PoolExhausted { .. } => "MEM:POOL:EXHAUSTED",
            Self::ChunkTooLarge { .. } => "MEM:POOL:CHUNK",
            Self::StackExhausted { .. } => "MEM:STACK:EXHAUSTED",
            Self::RegionExhausted { .. } => "MEM:FREELIST:EXHAUSTED",
            Self::HandlesExhausted { .. } => "MEM:HANDLE:EXHAUSTED",
        }
    }

    // ========================================================================
    // Convenience Constructors
    // ========================================================================

    /// Create allocation failed error
    pub fn allocation_failed(size: usize, align: usize) -> Self {
        #[cfg(feature = "logging")]
        error!(size, align, "memory allocation failed");

        Self::AllocationFailed { size, align }
    }

    /// Create invalid alignment error
    pub fn invalid_alignment(alignment: usize, max: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(alignment, max, "unsupported alignment requested");

        Self::InvalidAlignment { alignment, max }
    }

    /// Create allocation too large error
    #[must_use]
    pub fn allocation_too_large(size: usize, max_size: usize) -> Self {
        Self::ExceedsMaxSize { size, max_size }
    }

    /// Create invalid config error
    pub fn invalid_config(reason: &str) -> Self {
        Self::InvalidConfig {
            reason: reason.to_string(),
        }
    }

    /// Create pool exhausted error
    pub fn pool_exhausted(capacity: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(capacity, "pool allocator exhausted");

        Self::PoolExhausted { capacity }
    }

    /// Create chunk too large error
    #[must_use]
    pub fn chunk_too_large(requested: usize, chunk_size: usize) -> Self {
        Self::ChunkTooLarge {
            requested,
            chunk_size,
        }
    }

    /// Create stack exhausted error
    pub fn stack_exhausted(requested: usize, available: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(requested, available, "stack allocator exhausted");

        Self::StackExhausted {
            requested,
            available,
        }
    }

    /// Create region exhausted error
    pub fn region_exhausted(requested: usize, largest_free: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(
            requested,
            largest_free, "free-list allocator cannot satisfy request"
        );

        Self::RegionExhausted {
            requested,
            largest_free,
        }
    }

    /// Create handle table exhausted error
    pub fn handles_exhausted(capacity: usize) -> Self {
        #[cfg(feature = "logging")]
        warn!(capacity, "handle table exhausted");

        Self::HandlesExhausted { capacity }
    }

    /// Check if this is an invalid alignment error
    #[must_use]
    pub fn is_invalid_alignment(&self) -> bool {
        matches!(self, Self::InvalidAlignment { .. })
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result type for memory operations
pub type MemoryResult<T> = core::result::Result<T, MemoryError>;

/// Type aliases used throughout the allocator module
pub type AllocError = MemoryError;
pub type AllocResult<T> = MemoryResult<T>;

// ============================================================================
// Tests
// ============================================================================
