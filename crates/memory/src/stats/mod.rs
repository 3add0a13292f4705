//! Allocation counters for leak diagnostics.
//!
//! Every allocator owns an [`AllocationStats`] instance and updates it on
//! each allocation and deallocation. The counters are atomic so a shared
//! handle can be handed to the process-wide [`tracking`] registry and read
//! by the shutdown leak reporter without touching the (single-threaded)
//! allocator itself.

pub mod tracking;

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// Atomic allocation counters owned by a single allocator.
#[derive(Debug, Default)]
pub struct AllocationStats {
    /// Cumulative bytes handed out over the allocator's lifetime.
    allocated_bytes: AtomicU64,
    /// Cumulative bytes returned.
    freed_bytes: AtomicU64,
    /// Bytes currently outstanding.
    in_use_bytes: AtomicU64,
    /// Number of successful allocations.
    allocations: AtomicU64,
    /// Number of deallocations.
    deallocations: AtomicU64,
}

impl AllocationStats {
    /// Creates a zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful allocation of `size` bytes.
    pub fn record_allocation(&self, size: usize) {
        self.allocated_bytes
            .fetch_add(size as u64, Ordering::AcqRel);
        self.in_use_bytes.fetch_add(size as u64, Ordering::AcqRel);
        self.allocations.fetch_add(1, Ordering::AcqRel);
    }

    /// Record an in-place resize of a live block from `old_size` to
    /// `new_size` bytes without changing the operation counts.
    ///
    /// Used by compaction: relocating a block can change its reserved span
    /// (alignment padding differs at the new placement), and the byte
    /// counters must keep matching what the eventual deallocation returns.
    pub fn record_resize(&self, old_size: usize, new_size: usize) {
        if new_size > old_size {
            let grew = (new_size - old_size) as u64;
            self.allocated_bytes.fetch_add(grew, Ordering::AcqRel);
            self.in_use_bytes.fetch_add(grew, Ordering::AcqRel);
        } else {
            let shrank = (old_size - new_size) as u64;
            self.freed_bytes.fetch_add(shrank, Ordering::AcqRel);
            self.in_use_bytes.fetch_sub(shrank, Ordering::AcqRel);
        }
    }

    /// Record a deallocation of `size` bytes.
    pub fn record_deallocation(&self, size: usize) {
        self.freed_bytes.fetch_add(size as u64, Ordering::AcqRel);
        self.in_use_bytes.fetch_sub(size as u64, Ordering::AcqRel);
        self.deallocations.fetch_add(1, Ordering::AcqRel);
    }

    /// Bytes currently outstanding.
    pub fn in_use_bytes(&self) -> u64 {
        self.in_use_bytes.load(Ordering::Acquire)
    }

    /// Take a consistent point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            allocated_bytes: self.allocated_bytes.load(Ordering::Acquire),
            freed_bytes: self.freed_bytes.load(Ordering::Acquire),
            in_use_bytes: self.in_use_bytes.load(Ordering::Acquire),
            allocations: self.allocations.load(Ordering::Acquire),
            deallocations: self.deallocations.load(Ordering::Acquire),
        }
    }

    /// True when every allocation has been matched by a deallocation.
    pub fn is_balanced(&self) -> bool {
        let snap = self.snapshot();
        snap.in_use_bytes == 0 && snap.allocations == snap.deallocations
    }
}

/// Read-only copy of an allocator's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Cumulative bytes handed out.
    pub allocated_bytes: u64,
    /// Cumulative bytes returned.
    pub freed_bytes: u64,
    /// Bytes currently outstanding.
    pub in_use_bytes: u64,
    /// Number of successful allocations.
    pub allocations: u64,
    /// Number of deallocations.
    pub deallocations: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes in use ({} allocated / {} freed, {} allocs / {} deallocs)",
            self.in_use_bytes,
            self.allocated_bytes,
            self.freed_bytes,
            self.allocations,
            self.deallocations
        )
    }
}

// ============================================================================
// Fragmentation Statistics
// ============================================================================

/// Fragmentation statistics for free-list memory analysis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FragmentationStats {
    /// Total free memory across all fragments (bytes)
    pub total_free: usize,

    /// Size of the largest contiguous free block (bytes)
    pub largest_block: usize,

    /// Number of distinct free fragments
    pub fragment_count: usize,

    /// External fragmentation ratio (0-100)
    ///
    /// Calculated as: `100 * (1 - largest_block / total_free)`
    /// High values indicate poor memory utilization.
    pub fragmentation_percent: u8,
}

impl FragmentationStats {
    /// Calculate fragmentation percentage from free space metrics
    pub fn calculate(total_free: usize, largest_block: usize, fragment_count: usize) -> Self {
        let fragmentation_percent = if total_free > 0 {
            let ratio = 1.0 - (largest_block as f64 / total_free as f64);
            (ratio * 100.0).clamp(0.0, 100.0) as u8
        } else {
            0
        };

        Self {
            total_free,
            largest_block,
            fragment_count,
            fragmentation_percent,
        }
    }

    /// Check if fragmentation is concerning (>50%)
    #[inline]
    pub fn is_fragmented(&self) -> bool {
        self.fragmentation_percent > 50
    }
}

impl fmt::Display for FragmentationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FragmentationStats {{ total_free: {} bytes, largest_block: {} bytes, \
             fragments: {}, fragmentation: {}% }}",
            self.total_free, self.largest_block, self.fragment_count, self.fragmentation_percent
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_round_trip() {
        let stats = AllocationStats::new();

        stats.record_allocation(128);
        stats.record_allocation(64);
        assert_eq!(stats.in_use_bytes(), 192);

        stats.record_deallocation(128);
        let snap = stats.snapshot();
        assert_eq!(snap.allocated_bytes, 192);
        assert_eq!(snap.freed_bytes, 128);
        assert_eq!(snap.in_use_bytes, 64);
        assert_eq!(snap.allocations, 2);
        assert_eq!(snap.deallocations, 1);
        assert!(!stats.is_balanced());

        stats.record_deallocation(64);
        assert!(stats.is_balanced());
    }

    #[test]
    fn fragmentation_calculation() {
        let stats = FragmentationStats::calculate(1000, 500, 5);
        assert_eq!(stats.fragmentation_percent, 50);
        assert!(!stats.is_fragmented()); // Exactly 50%, not >50%

        let stats = FragmentationStats::calculate(1000, 100, 10);
        assert_eq!(stats.fragmentation_percent, 90);
        assert!(stats.is_fragmented());
    }

    #[test]
    fn zero_fragmentation() {
        let stats = FragmentationStats::default();
        assert_eq!(stats.fragmentation_percent, 0);
        assert!(!stats.is_fragmented());
    }
}
