//! Cross-allocator scenarios exercised through the public API only.

use std::alloc::Layout;

use kestrel_memory::MemoryError;
use kestrel_memory::prelude::*;
use kestrel_memory::stats::tracking;
use pretty_assertions::assert_eq;

/// The canonical pool scenario: a 1024-byte parent region, a pool of four
/// 32-byte chunks carved from it, exactly four allocations before
/// exhaustion, and LIFO reuse of a freed chunk.
#[test]
fn pool_over_freelist_region() {
    let parent = FreeListAllocator::new(1024, SystemAllocator::global()).unwrap();
    {
        let pool = PoolAllocator::new(32, 8, 4, &parent).unwrap();
        let layout = Layout::from_size_align(32, 8).unwrap();

        let mut objects = Vec::new();
        for _ in 0..4 {
            objects.push(unsafe { pool.allocate(layout).expect("within capacity") });
        }

        // A fifth allocation must fail; the pool never grows.
        assert!(matches!(
            unsafe { pool.allocate(layout) },
            Err(MemoryError::PoolExhausted { capacity: 4 })
        ));

        // Free the second object and allocate again: the new object must
        // occupy the freed chunk's address.
        let second = objects[1];
        unsafe { pool.deallocate(second.cast(), layout) };
        let reused = unsafe { pool.allocate(layout).unwrap() };
        assert_eq!(reused.cast::<u8>(), second.cast::<u8>());

        objects[1] = reused;
        for object in objects {
            unsafe { pool.deallocate(object.cast(), layout) };
        }
        assert!(pool.stats_handle().is_balanced());
    }
    // The pool returned its region: the parent is whole again.
    assert_eq!(parent.free_chunk_count(), 1);
    assert!(parent.stats_handle().is_balanced());
}

/// A stack allocator drawing its region from a free-list parent, with
/// marker-scoped release of droppable values.
#[test]
fn stack_over_freelist_region() {
    let parent = FreeListAllocator::new(4096, SystemAllocator::global()).unwrap();
    {
        let stack = StackAllocator::new(1024, &parent).unwrap();

        let frame = stack.marker();
        let names = stack.alloc_array(3, |i| format!("entity-{i}")).unwrap();
        assert_eq!(unsafe { names.as_ref() }.as_str(), "entity-0");

        stack.clear_to_marker(frame);
        assert_eq!(stack.used(), 0);
    }
    assert!(parent.stats_handle().is_balanced());
}

/// Compaction visible end to end: fragment, defragment, verify through the
/// handle pointers, and confirm convergence is stable.
#[test]
fn compaction_round_trip() {
    let arena = CompactingAllocator::new(2048, 64, SystemAllocator::global()).unwrap();

    let mut ptrs: Vec<HandlePtr<'_, u64>> = (0..10)
        .map(|i| arena.alloc_value(i as u64 * 11).unwrap())
        .collect();

    // Free three interior blocks to open gaps.
    for idx in [7, 4, 1] {
        let mut ptr = ptrs.remove(idx);
        arena.deallocate(&mut ptr);
    }
    assert!(arena.fragmentation().fragment_count > 1);

    let moved = arena.defragment();
    assert!(moved > 0);
    assert_eq!(arena.free_chunk_count(), 1);
    assert_eq!(arena.defragment(), 0);

    let expected = [0u64, 22, 33, 55, 66, 88, 99];
    for (ptr, want) in ptrs.iter().zip(expected) {
        assert_eq!(unsafe { *ptr.as_ref() }, want);
    }

    for ptr in &mut ptrs {
        arena.deallocate(ptr);
    }
    assert!(arena.stats_handle().is_balanced());
}

/// The process-wide tracking facade sees live allocators and goes quiet
/// once they return their memory.
#[test]
fn tracking_registry_reports_leaks() {
    let pool = PoolAllocator::new(64, 8, 8, SystemAllocator::global()).unwrap();
    let id = tracking::register("scenario-pool", pool.stats_handle());

    let layout = Layout::from_size_align(64, 8).unwrap();
    let ptr = unsafe { pool.allocate(layout).unwrap() };

    let leak = tracking::leaked()
        .into_iter()
        .find(|report| report.name == "scenario-pool")
        .expect("live allocator must appear in the leak report");
    assert_eq!(leak.snapshot.in_use_bytes, 64);

    unsafe { pool.deallocate(ptr.cast(), layout) };
    assert!(
        !tracking::leaked()
            .iter()
            .any(|report| report.name == "scenario-pool")
    );

    tracking::unregister(id);
}
