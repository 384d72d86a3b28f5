#![cfg_attr(not(test), no_std)]

//! A best-fit, boundary-tag memory allocator over a single fixed-size arena.
//!
//! A [`Heap`](allocators/struct.Heap.html) reserves its arena once, from a
//! [`RegionSource`](source/trait.RegionSource.html), and then hands out and
//! takes back pieces of it, much like `malloc` and `free`:
//!
//! ```
//! use bestfit_alloc::{FreeError, Heap};
//!
//! let mut heap = Heap::with_region(4096).expect("4 KiB should be available");
//! let p = heap.allocate(100).expect("an empty heap has room");
//! heap.payload_mut(p).unwrap()[..5].copy_from_slice(b"hello");
//!
//! heap.deallocate(p).unwrap();
//! assert_eq!(heap.deallocate(p), Err(FreeError::DoubleFreeOrCorrupted(p.offset())));
//! println!("{}", heap.dump());
//! ```
//!
//! ## Layout
//!
//! The arena is an implicit list of blocks, each starting with a 4-byte
//! header: the block size (a multiple of 8) with two status bits packed into
//! its low bits, "this block is allocated" and "the previous block is
//! allocated". Free blocks end with a footer holding their size again, which
//! lets a block being freed find a free predecessor without a scan.
//!
//! ```text
//!  0    4                                                   len-4  len
//!  | pad | hdr | payload ... | hdr | free ...    | ftr | ... | sentinel |
//!        ^-- first block           ^-- free block
//! ```
//!
//! Allocation is best fit over one linear scan; leftover space of at least
//! `MIN_BLOCK_SIZE` is split off as a new free block. Deallocation merges the
//! freed block with free neighbours on both sides right away, so no two free
//! blocks are ever adjacent.
//!
//! A `Heap` is not thread-safe, and never grows.

extern crate alloc;

pub mod allocators;
mod arena;
pub mod blocklist;
pub mod error;
pub mod header;
pub mod report;
pub mod source;

pub use crate::allocators::{Heap, HeapPtr};
pub use crate::arena::Offset;
pub use crate::blocklist::{Stats, Validity};
pub use crate::error::{FreeError, InitError};
pub use crate::header::{MAX_PAYLOAD, MIN_BLOCK_SIZE, PAGE_SIZE};
pub use crate::report::{BlockInfo, Report};
pub use crate::source::{RegionSource, SystemSource, ToyHeap};
