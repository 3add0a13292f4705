//! Process-wide allocation tracking facade.
//!
//! Allocators register their [`AllocationStats`] handle under a name; the
//! engine's shutdown path calls [`report`] (or [`leaked`]) to aggregate the
//! counters of every live allocator for leak reporting. Registration is
//! optional: an unregistered allocator still tracks its own counters, it
//! just doesn't show up in the process-wide report.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::{AllocationStats, StatsSnapshot};

/// Unique identifier for a registered allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackerId(u64);

struct TrackerEntry {
    id: TrackerId,
    name: String,
    stats: Arc<AllocationStats>,
}

/// One allocator's line in the shutdown report.
#[derive(Debug, Clone)]
pub struct TrackerReport {
    /// Name the allocator registered under.
    pub name: String,
    /// Counters at report time.
    pub snapshot: StatsSnapshot,
}

fn registry() -> &'static RwLock<Vec<TrackerEntry>> {
    static REGISTRY: OnceLock<RwLock<Vec<TrackerEntry>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Vec::new()))
}

/// Register an allocator's counters under `name`.
///
/// IDs are generated atomically and are unique within the process.
pub fn register(name: impl Into<String>, stats: Arc<AllocationStats>) -> TrackerId {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    let id = TrackerId(COUNTER.fetch_add(1, Ordering::Relaxed));

    registry().write().push(TrackerEntry {
        id,
        name: name.into(),
        stats,
    });
    id
}

/// Remove an allocator from the registry.
///
/// Unregistering an unknown id is a no-op; allocators typically unregister
/// from their `Drop` impl, which must not panic.
pub fn unregister(id: TrackerId) {
    registry().write().retain(|entry| entry.id != id);
}

/// Snapshot every registered allocator's counters.
pub fn report() -> Vec<TrackerReport> {
    registry()
        .read()
        .iter()
        .map(|entry| TrackerReport {
            name: entry.name.clone(),
            snapshot: entry.stats.snapshot(),
        })
        .collect()
}

/// Snapshot only the allocators with outstanding memory.
///
/// An empty result at shutdown means every allocator returned all of its
/// memory.
pub fn leaked() -> Vec<TrackerReport> {
    report()
        .into_iter()
        .filter(|r| r.snapshot.in_use_bytes != 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_report_unregister() {
        let stats = Arc::new(AllocationStats::new());
        stats.record_allocation(64);

        let id = register("test-pool", Arc::clone(&stats));

        let found = report().into_iter().find(|r| r.name == "test-pool");
        assert_eq!(found.expect("registered").snapshot.in_use_bytes, 64);

        assert!(leaked().iter().any(|r| r.name == "test-pool"));

        stats.record_deallocation(64);
        assert!(!leaked().iter().any(|r| r.name == "test-pool"));

        unregister(id);
        assert!(!report().iter().any(|r| r.name == "test-pool"));
    }

    #[test]
    fn unregister_unknown_id_is_noop() {
        unregister(TrackerId(u64::MAX));
    }
}
