use bestfit_alloc::{FreeError, Heap, HeapPtr, Offset, Report, ToyHeap};

use rand::seq::SliceRandom;
use rand::{RngCore, SeedableRng};
use test_env_log::test;

fn new_heap(region_size: usize) -> Heap<ToyHeap> {
    let mut heap = Heap::new(ToyHeap::default());
    heap.initialize(region_size).expect("toy heap has room");
    heap
}

fn assert_valid(heap: &Heap<ToyHeap>) {
    let (validity, stats) = heap.stats();
    log::info!("Validity: {:?}, Stats: {:?}", validity, stats);
    assert!(validity.is_valid(), "{:?}\n{}", validity, heap.dump());
}

// (allocated, size) for each block, in address order.
fn shape(report: &Report) -> Vec<(bool, usize)> {
    report.blocks.iter().map(|b| (b.allocated, b.size)).collect()
}

fn alloc(heap: &mut Heap<ToyHeap>, size: usize) -> HeapPtr {
    heap.allocate(size)
        .unwrap_or_else(|| panic!("allocate({}) failed:\n{}", size, heap.dump()))
}

#[test]
fn test_end_to_end() {
    let mut heap = new_heap(4096);
    let initial = heap.dump();
    assert_eq!(shape(&initial), vec![(false, 4096)]);

    let p = alloc(&mut heap, 100);
    assert_eq!(p.offset() % 8, 0);
    let report = heap.dump();
    log::info!("after allocate(100):\n{}", report);
    assert_eq!(shape(&report), vec![(true, 104), (false, 4096 - 104)]);
    assert_eq!(report.busy_bytes, 104);
    assert_eq!(report.total_bytes(), 4096);
    assert_valid(&heap);

    heap.deallocate(p).unwrap();
    assert_eq!(heap.dump(), initial);
    assert_valid(&heap);
}

// Free blocks of 16, 32 and 64 bytes, kept apart by 8 byte busy blocks, and
// a large free tail. Returns the pointers of the 16, 32 and 64 byte blocks.
fn fragmented_heap() -> (Heap<ToyHeap>, [HeapPtr; 3]) {
    let mut heap = new_heap(4096);
    let a = alloc(&mut heap, 12);
    let _g1 = alloc(&mut heap, 4);
    let b = alloc(&mut heap, 28);
    let _g2 = alloc(&mut heap, 4);
    let c = alloc(&mut heap, 60);
    let _g3 = alloc(&mut heap, 4);
    for &p in &[a, b, c] {
        heap.deallocate(p).unwrap();
    }
    assert_eq!(
        shape(&heap.dump()),
        vec![
            (false, 16),
            (true, 8),
            (false, 32),
            (true, 8),
            (false, 64),
            (true, 8),
            (false, 4096 - 136),
        ]
    );
    assert_valid(&heap);
    (heap, [a, b, c])
}

#[test]
fn test_best_fit_picks_smallest_block() {
    let (mut heap, [_, b, _]) = fragmented_heap();

    // 20 bytes plus header needs 24: the 16 block is too small, 32 is best.
    let p = alloc(&mut heap, 20);
    assert_eq!(p, b);
    let report = heap.dump();
    assert_eq!(report.blocks[2].size, 24);
    assert!(report.blocks[2].allocated);
    assert_eq!(report.blocks[3].size, 8);
    assert!(!report.blocks[3].allocated);
    assert!(report.blocks[3].prev_allocated);
    assert_valid(&heap);
}

#[test]
fn test_best_fit_ties_go_to_lowest_address() {
    let mut heap = new_heap(4096);
    let a = alloc(&mut heap, 28);
    let _g1 = alloc(&mut heap, 4);
    let b = alloc(&mut heap, 28);
    let _g2 = alloc(&mut heap, 4);
    heap.deallocate(b).unwrap();
    heap.deallocate(a).unwrap();

    assert_eq!(alloc(&mut heap, 12), a);
    assert_valid(&heap);
}

#[test]
fn test_split_threshold() {
    // Block sizes are multiples of 8, so a remainder below MIN_BLOCK_SIZE is
    // always 0: an exact fit, taken whole.
    let (mut heap, [_, b, _]) = fragmented_heap();
    let before = heap.dump().blocks.len();
    assert_eq!(alloc(&mut heap, 28), b);
    let report = heap.dump();
    assert_eq!(report.blocks.len(), before);
    assert_eq!(report.blocks[2].size, 32);
    assert!(report.blocks[2].allocated);
    assert!(report.blocks[3].prev_allocated);
    assert_valid(&heap);

    // A remainder of exactly MIN_BLOCK_SIZE is split off.
    let (mut heap, [_, b, _]) = fragmented_heap();
    assert_eq!(alloc(&mut heap, 20), b);
    let report = heap.dump();
    assert_eq!(report.blocks.len(), before + 1);
    assert_eq!(report.blocks[3].size, bestfit_alloc::MIN_BLOCK_SIZE);
    assert_valid(&heap);
}

#[test]
fn test_minimum_free_block_is_usable() {
    let (mut heap, [_, b, _]) = fragmented_heap();
    alloc(&mut heap, 20);
    // An 8 byte free block holds up to 4 bytes of payload.
    let tiny = alloc(&mut heap, 4);
    assert_eq!(tiny, HeapPtr::from_offset(b.offset() + 24));
    assert_valid(&heap);
}

#[test]
fn test_coalesce_with_free_predecessor() {
    let mut heap = new_heap(4096);
    let a = alloc(&mut heap, 20);
    let b = alloc(&mut heap, 20);
    let _c = alloc(&mut heap, 20);

    heap.deallocate(a).unwrap();
    heap.deallocate(b).unwrap();
    let report = heap.dump();
    assert_eq!(
        shape(&report),
        vec![(false, 48), (true, 24), (false, 4096 - 72)]
    );
    // The successor now follows a free block.
    assert!(!report.blocks[1].prev_allocated);
    assert_valid(&heap);
}

#[test]
fn test_coalesce_three_in_any_order() {
    let orders = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];
    for order in &orders {
        let mut heap = new_heap(4096);
        let _before = alloc(&mut heap, 4);
        let blocks = [alloc(&mut heap, 12), alloc(&mut heap, 28), alloc(&mut heap, 60)];
        let _after = alloc(&mut heap, 4);

        for &i in order {
            heap.deallocate(blocks[i]).unwrap();
            assert_valid(&heap);
        }

        let report = heap.dump();
        log::info!("order {:?}:\n{}", order, report);
        assert_eq!(
            shape(&report),
            vec![(true, 8), (false, 16 + 32 + 64), (true, 8), (false, 4096 - 128)],
            "order {:?}",
            order
        );
        assert_eq!(report.blocks[1].start, Offset(12));
    }
}

#[test]
fn test_coalesce_with_both_neighbours_reaches_tail() {
    let mut heap = new_heap(4096);
    let a = alloc(&mut heap, 100);
    let b = alloc(&mut heap, 100);
    heap.deallocate(a).unwrap();
    // b sits between the free a and the free tail.
    heap.deallocate(b).unwrap();
    assert_eq!(shape(&heap.dump()), vec![(false, 4096)]);
    assert_valid(&heap);
}

#[test]
fn test_double_free_leaves_state_unchanged() {
    let mut heap = new_heap(4096);
    let a = alloc(&mut heap, 50);
    let _b = alloc(&mut heap, 50);
    heap.deallocate(a).unwrap();
    let after_first = heap.dump();

    assert_eq!(
        heap.deallocate(a),
        Err(FreeError::DoubleFreeOrCorrupted(a.offset()))
    );
    assert_eq!(heap.dump(), after_first);
    assert_valid(&heap);
}

#[test]
fn test_stale_pointer_into_merged_block() {
    let mut heap = new_heap(4096);
    let a = alloc(&mut heap, 20);
    let b = alloc(&mut heap, 20);
    let _c = alloc(&mut heap, 20);
    heap.deallocate(a).unwrap();
    heap.deallocate(b).unwrap();

    // b's old header lies inside the merged block, and must read as free.
    assert_eq!(
        heap.deallocate(b),
        Err(FreeError::DoubleFreeOrCorrupted(b.offset()))
    );
    assert_valid(&heap);
}

#[test]
fn test_exhaustion_does_not_mutate() {
    let mut heap = new_heap(4096);
    alloc(&mut heap, 2000);
    alloc(&mut heap, 2000);
    let before = heap.dump();
    assert_eq!(before.free_bytes, 4096 - 2 * 2008);

    assert_eq!(heap.allocate(100), None);
    assert_eq!(heap.dump(), before);
    assert_valid(&heap);
}

#[test]
fn test_fill_then_free_in_random_order() {
    let seed: u64 = rand::thread_rng().next_u64();
    log::info!("Using seed {}", seed);
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    let mut heap = new_heap(3 * 4096);
    let initial = heap.dump();
    let mut pointers = Vec::new();
    let mut size = 1;
    while let Some(p) = heap.allocate(size) {
        assert_eq!(p.offset() % 8, 0, "pointer {} is misaligned", p);
        pointers.push(p);
        size = size % 300 + 7;
    }
    assert!(pointers.len() > 10);
    assert_valid(&heap);

    pointers.shuffle(&mut rng);
    for p in pointers {
        heap.deallocate(p).unwrap();
        assert_valid(&heap);
    }
    assert_eq!(heap.dump(), initial);
}

#[test]
fn test_independent_heaps() {
    let mut first = new_heap(4096);
    let mut second = new_heap(4096);
    let p = alloc(&mut first, 64);
    let q = alloc(&mut second, 64);
    assert_eq!(p, q);

    first.deallocate(p).unwrap();
    assert_eq!(second.dump().busy_bytes, 72);
    second.deallocate(q).unwrap();
}

#[test]
fn test_system_source_heap() {
    let mut heap = Heap::with_region(600 * 1024).expect("600 KiB should be available");
    assert_eq!(heap.capacity(), 600 * 1024);
    let p = heap.allocate(513).unwrap();
    assert!(heap.payload(p).unwrap().iter().all(|&b| b == 0));
    heap.deallocate(p).unwrap();
    assert_eq!(heap.dump().blocks.len(), 1);
}
