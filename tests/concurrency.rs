use page_arena::{ArenaConfig, PageArena};
use std::sync::Arc;
use std::thread;

const PAGE: usize = 4096;
const NUM_PAGES: u32 = 256;

fn small_arena() -> PageArena {
    PageArena::with_config(ArenaConfig::new(NUM_PAGES as usize * PAGE).with_page_size(PAGE)).unwrap()
}

#[test]
fn test_parallel_alloc_free_conserves_pages() {
    let arena = Arc::new(small_arena());

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let arena = Arc::clone(&arena);
            thread::spawn(move || {
                let mut live = Vec::new();
                for round in 0..500usize {
                    let size = ((worker + round) % 4 + 1) * PAGE - 1;
                    if let Ok(allocation) = arena.allocate(size) {
                        live.push(allocation);
                    }
                    if live.len() > 4 || round % 3 == 0 {
                        if let Some(allocation) = live.pop() {
                            unsafe { arena.free_allocation(allocation).unwrap() };
                        }
                    }
                }
                for allocation in live {
                    unsafe { arena.free_allocation(allocation).unwrap() };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(arena.stats(), (NUM_PAGES, NUM_PAGES));
    assert_eq!(arena.free_runs().len(), 1);
    arena.check_invariants().unwrap();
}

#[test]
fn test_concurrent_allocations_never_overlap() {
    let arena = small_arena();

    let mut ranges: Vec<(u32, u32)> = thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let mut mine = Vec::new();
                    while let Ok(allocation) = arena.allocate(2 * PAGE) {
                        mine.push((allocation.first_page, allocation.pages));
                    }
                    mine
                })
            })
            .collect();
        workers.into_iter().flat_map(|w| w.join().unwrap()).collect()
    });

    // Every page handed out exactly once
    ranges.sort_unstable();
    assert_eq!(ranges.len(), NUM_PAGES as usize / 2);
    for pair in ranges.windows(2) {
        assert!(pair[0].0 + pair[0].1 <= pair[1].0);
    }
    assert_eq!(arena.stats(), (0, 0));
}

#[test]
fn test_blocks_across_scoped_threads() {
    let arena = small_arena();

    thread::scope(|scope| {
        for fill in 1..=4u8 {
            let arena = &arena;
            scope.spawn(move || {
                for _ in 0..100 {
                    let mut block = arena.alloc_block(3 * PAGE).unwrap();
                    block.as_mut_slice().fill(fill);
                    assert!(block.as_slice().iter().all(|&b| b == fill));
                }
            });
        }
    });

    assert_eq!(arena.stats(), (NUM_PAGES, NUM_PAGES));
    arena.check_invariants().unwrap();
}

#[test]
fn test_concurrent_double_free_rejected_once() {
    let arena = Arc::new(small_arena());
    let allocation = arena.allocate(PAGE).unwrap();

    let results: Vec<bool> = (0..4)
        .map(|_| {
            let arena = Arc::clone(&arena);
            thread::spawn(move || unsafe { arena.free_allocation(allocation).is_ok() })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(arena.stats(), (NUM_PAGES, NUM_PAGES));
}
