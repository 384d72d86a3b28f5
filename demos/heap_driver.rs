//! Drives a heap with random allocations and frees across a handful of
//! pointer slots, dumping the block list before and after.
//!
//! A failed allocation is counted and the run goes on; a failed free, or a
//! second free that is *not* rejected, stops the run.

use bestfit_alloc::{Heap, HeapPtr};

use rand::distributions::{Distribution, Uniform};
use rand::{RngCore, SeedableRng};

const ITERATIONS: usize = 1_000_000;
const REGION_SIZE: usize = 600 * 1024;
const MAX_PTRS: usize = 10;
const MAX_ALLOC_SIZE: usize = 513;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.contains(&"--help".to_owned()) {
        println!("USAGE: {} [ITERATIONS] [REGION_SIZE] [SEED]", args[0]);
        return;
    }
    let iterations: usize = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(ITERATIONS);
    let region_size: usize = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(REGION_SIZE);
    let seed: u64 = args
        .get(3)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| rand::thread_rng().next_u64());

    env_logger::init();
    log::info!("Using seed {}", seed);
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    let mut heap = match Heap::with_region(region_size) {
        Ok(heap) => heap,
        Err(err) => {
            eprintln!("ERROR: {}", err);
            std::process::exit(1);
        }
    };

    let slots = Uniform::new(0, MAX_PTRS);
    let sizes = Uniform::new_inclusive(1, MAX_ALLOC_SIZE);
    let mut pointers = [HeapPtr::NULL; MAX_PTRS];
    let (mut allocs, mut frees, mut alloc_errors) = (0usize, 0usize, 0usize);

    println!("{}", heap.dump());

    for j in 0..iterations {
        let i = slots.sample(&mut rng);
        let size = sizes.sample(&mut rng);

        if pointers[i].is_null() {
            match heap.allocate(size) {
                Some(p) => {
                    pointers[i] = p;
                    allocs += 1;
                }
                None => alloc_errors += 1,
            }
        } else {
            if let Err(err) = heap.deallocate(pointers[i]) {
                println!("Error in freeing: {}", err);
                break;
            }
            if heap.deallocate(pointers[i]).is_ok() {
                println!("Double free of {} was not caught", pointers[i]);
                break;
            }
            pointers[i] = HeapPtr::NULL;
            frees += 1;
        }

        if j % 100_000 == 0 {
            println!(
                "Iteration # {}; allocs = {}, frees = {}, allocerrors = {}",
                j, allocs, frees, alloc_errors
            );
        }
    }

    println!("{}", heap.dump());

    for p in pointers.iter_mut().filter(|p| !p.is_null()) {
        if let Err(err) = heap.deallocate(*p) {
            println!("Error in freeing: {}", err);
            break;
        }
        *p = HeapPtr::NULL;
    }

    println!("{}", heap.dump());
    let (validity, stats) = heap.stats();
    println!("    Validity: {:?}", validity);
    println!("    Stats:    {:?}", stats);
    assert!(validity.is_valid());
}
