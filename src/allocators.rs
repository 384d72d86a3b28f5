//! The heap allocator.
//!
//! ## Basic Types
//!
//! ### [`Heap`](struct.Heap.html)
//!
//! A `Heap` is a single-threaded, non-thread-safe manager of one fixed-size
//! arena, handing out and taking back variably-sized blocks of it. It does no
//! locking of its own: callers that share one between threads must wrap it in
//! a mutex.
//!
//! ### [`HeapPtr`](struct.HeapPtr.html)
//!
//! A `HeapPtr` is what `allocate` returns: the byte offset of a payload from
//! the base of the arena. It is only meaningful for the heap that produced
//! it, and is always a multiple of 8.

use core::fmt;

use crate::arena::{Arena, Offset};
use crate::blocklist::{Block, BlockList, Stats, Validity};
use crate::error::{FreeError, InitError};
use crate::header::{
    block_size_for, round_up, BlockHeader, ALIGNMENT, ARENA_OVERHEAD, HEADER_SIZE,
    MAX_PAYLOAD, MAX_REGION_SIZE, MIN_BLOCK_SIZE, PAGE_SIZE,
};
use crate::report::{BlockInfo, Report};
use crate::source::{RegionSource, SystemSource};

/// A pointer to a payload inside a [`Heap`](struct.Heap.html), expressed as an
/// offset from the start of its arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeapPtr(usize);

impl HeapPtr {
    /// Offset 0 holds the alignment pad, so no payload ever lives there.
    pub const NULL: HeapPtr = HeapPtr(0);

    pub const fn from_offset(offset: usize) -> Self {
        HeapPtr(offset)
    }

    pub const fn offset(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for HeapPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// A best-fit allocator over one arena, reserved once from a
/// [`RegionSource`](../source/trait.RegionSource.html).
///
/// Every block starts with a 4-byte header holding its size and two status
/// bits (this block allocated, previous block allocated). Free blocks also
/// end with a footer repeating their size, so a block being freed can find a
/// free predecessor and merge with it in constant time. Adjacent free blocks
/// are always merged, so there are never two in a row.
pub struct Heap<S = SystemSource> {
    source: S,
    arena: Option<Arena>,
}

impl<S: RegionSource + Default> Default for Heap<S> {
    fn default() -> Self {
        Heap::new(S::default())
    }
}

impl Heap<SystemSource> {
    /// Create a heap backed by the global allocator and initialize it with
    /// `region_size` usable bytes (rounded up to a whole page).
    pub fn with_region(region_size: usize) -> Result<Self, InitError> {
        let mut heap = Heap::new(SystemSource::new());
        heap.initialize(region_size)?;
        Ok(heap)
    }
}

impl<S: RegionSource> Heap<S> {
    /// Create an uninitialized `Heap`. Nothing is reserved until
    /// [`initialize`](#method.initialize) is called.
    pub fn new(source: S) -> Self {
        Heap {
            source,
            arena: None,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn is_initialized(&self) -> bool {
        self.arena.is_some()
    }

    /// Usable bytes in the arena: the rounded region size, headers and
    /// footers included. Zero before initialization.
    pub fn capacity(&self) -> usize {
        self.arena
            .as_ref()
            .map_or(0, |arena| arena.len() - ARENA_OVERHEAD)
    }

    /// A view of the blocks, if initialized.
    pub fn blocks(&self) -> Option<BlockList<'_>> {
        self.arena.as_ref().map(BlockList::new)
    }

    /// Reserve the arena and lay it out as one big free block.
    ///
    /// `region_size` is rounded up to a multiple of `PAGE_SIZE`; 8 more bytes
    /// are reserved for the alignment pad and the end sentinel. This may only
    /// succeed once per heap.
    pub fn initialize(&mut self, region_size: usize) -> Result<(), InitError> {
        if self.arena.is_some() {
            return Err(InitError::AlreadyInitialized);
        }
        if region_size == 0 || region_size > MAX_REGION_SIZE {
            return Err(InitError::InvalidSize(region_size));
        }

        let rounded = round_up(region_size, PAGE_SIZE);
        let total = rounded + ARENA_OVERHEAD;
        let bytes = match self.source.reserve(total) {
            Ok(bytes) if bytes.len() == total => bytes,
            Ok(bytes) => {
                log::warn!(
                    "region source returned {} bytes, {} were requested",
                    bytes.len(),
                    total
                );
                return Err(InitError::ReserveFailed { size: total });
            }
            Err(err) => {
                log::warn!("region source failed to reserve {} bytes: {:?}", total, err);
                return Err(InitError::ReserveFailed { size: total });
            }
        };

        let mut arena = Arena::new(bytes);
        let first = arena.first_block();
        // There is no real block before the first one; the pad stands in as
        // an allocated one.
        arena.set_header(first, BlockHeader::free(rounded as u32, true));
        arena.write_footer(first, rounded);
        let sentinel = arena.sentinel();
        arena.set_header(sentinel, BlockHeader::sentinel(false));

        log::debug!(
            "Initialized heap with {} usable bytes ({} requested)",
            rounded,
            region_size
        );
        self.arena = Some(arena);
        Ok(())
    }

    /// Allocate a block with room for `size` bytes, using the smallest free
    /// block that fits.
    ///
    /// Returns `None` if `size` is 0 or above `MAX_PAYLOAD`, if the heap is
    /// not initialized, or if no free block is big enough. The payload is not
    /// zeroed.
    pub fn allocate(&mut self, size: usize) -> Option<HeapPtr> {
        if size == 0 || size > MAX_PAYLOAD {
            log::debug!("allocate({}): size out of range", size);
            return None;
        }
        let arena = self.arena.as_mut()?;
        let needed = block_size_for(size);

        let best = match BlockList::new(arena).best_fit(needed) {
            Some(block) => block,
            None => {
                log::debug!("allocate({}): no free block of {} bytes", size, needed);
                return None;
            }
        };

        let prev_allocated = best.header.prev_allocated;
        let remainder = best.size() - needed;
        if remainder < MIN_BLOCK_SIZE {
            // Too little would be left over to make a block of it, so the
            // caller gets all of it.
            arena.set_header(
                best.offset,
                BlockHeader::allocated(best.header.size, prev_allocated),
            );
            arena.set_prev_allocated(best.end(), true);
        } else {
            arena.set_header(
                best.offset,
                BlockHeader::allocated(needed as u32, prev_allocated),
            );
            let tail = best.offset.forward(needed);
            arena.set_header(tail, BlockHeader::free(remainder as u32, true));
            arena.write_footer(tail, remainder);
        }

        let ptr = HeapPtr(best.payload().get());
        log::debug!(
            "allocate({}): {} from block at {} of {} bytes (remainder {})",
            size,
            ptr,
            best.offset,
            best.size(),
            remainder
        );
        Some(ptr)
    }

    /// Free a block returned by [`allocate`](#method.allocate), merging it
    /// with any free neighbours.
    ///
    /// Nothing is written unless every check passes. Note that a pointer into
    /// the middle of a payload may happen to land on bytes that look like an
    /// allocated header; like any boundary-tag allocator, this one cannot tell.
    pub fn deallocate(&mut self, ptr: HeapPtr) -> Result<(), FreeError> {
        let block = self.live_block(ptr)?;
        let bad = FreeError::DoubleFreeOrCorrupted(ptr.0);
        let arena = self.arena.as_mut().ok_or(bad)?;
        let sentinel = arena.sentinel();

        // The sentinel reads as allocated, so it is never merged.
        let next_offset = block.end();
        let next = arena.header(next_offset).ok_or(bad)?;
        let next_free = !next.allocated;
        if next_free
            && (!BlockHeader::is_plausible_size(next.size())
                || next_offset.forward(next.size()) > sentinel)
        {
            return Err(bad);
        }

        let prev = if block.header.prev_allocated {
            None
        } else {
            let prev_size = arena.footer_before(block.offset).ok_or(bad)?;
            let prev_offset = block
                .offset
                .back(prev_size)
                .filter(|&at| at >= arena.first_block())
                .ok_or(bad)?;
            let prev_header = arena.header(prev_offset).ok_or(bad)?;
            if prev_header.allocated
                || prev_header.size() != prev_size
                || !BlockHeader::is_plausible_size(prev_size)
            {
                return Err(bad);
            }
            Some(Block {
                offset: prev_offset,
                header: prev_header,
            })
        };

        match (prev, next_free) {
            (None, false) => {
                log::trace!("  deallocate {}: no free neighbours", ptr);
                arena.set_header(block.offset, BlockHeader::free(block.header.size, true));
                arena.write_footer(block.offset, block.size());
                arena.set_prev_allocated(next_offset, false);
            }
            (Some(prev), false) => {
                log::trace!("  deallocate {}: merging into previous block", ptr);
                let merged = prev.size() + block.size();
                arena.set_header(
                    prev.offset,
                    BlockHeader::free(merged as u32, prev.header.prev_allocated),
                );
                arena.write_footer(prev.offset, merged);
                // The old header now sits inside a free block; make sure a
                // stale pointer to it is seen as freed.
                arena.set_header(block.offset, BlockHeader::free(block.header.size, false));
                arena.set_prev_allocated(next_offset, false);
            }
            (None, true) => {
                log::trace!("  deallocate {}: absorbing next block", ptr);
                let merged = block.size() + next.size();
                arena.set_header(block.offset, BlockHeader::free(merged as u32, true));
                arena.write_footer(block.offset, merged);
            }
            (Some(prev), true) => {
                log::trace!("  deallocate {}: merging both neighbours", ptr);
                let merged = prev.size() + block.size() + next.size();
                arena.set_header(
                    prev.offset,
                    BlockHeader::free(merged as u32, prev.header.prev_allocated),
                );
                arena.write_footer(prev.offset, merged);
                arena.set_header(block.offset, BlockHeader::free(block.header.size, false));
            }
        }

        log::debug!("deallocate {}: freed {} bytes", ptr, block.size());
        Ok(())
    }

    /// The usable bytes of a live allocation.
    pub fn payload(&self, ptr: HeapPtr) -> Option<&[u8]> {
        let block = self.live_block(ptr).ok()?;
        self.arena
            .as_ref()?
            .bytes(block.payload().get()..block.end().get())
    }

    /// The usable bytes of a live allocation, mutably.
    pub fn payload_mut(&mut self, ptr: HeapPtr) -> Option<&mut [u8]> {
        let block = self.live_block(ptr).ok()?;
        self.arena
            .as_mut()?
            .bytes_mut(block.payload().get()..block.end().get())
    }

    /// List every block in address order, with busy and free totals.
    ///
    /// With debug assertions on, this panics if it finds a stale
    /// `prev_allocated` bit, a footer that disagrees with its header, or a
    /// header that cannot be followed. It never reads outside the arena.
    pub fn dump(&self) -> Report {
        let mut report = Report::default();
        let arena = match self.arena.as_ref() {
            Some(arena) => arena,
            None => return report,
        };

        let mut previous_allocated = true;
        for (i, item) in BlockList::new(arena).iter().enumerate() {
            let block = match item {
                Ok(block) => block,
                Err(corrupt) => {
                    debug_assert!(false, "dump: corrupt header at {}", corrupt.offset);
                    report.truncated = true;
                    break;
                }
            };

            debug_assert_eq!(
                block.header.prev_allocated, previous_allocated,
                "dump: stale prev_allocated bit on block at {}",
                block.offset
            );
            if block.is_free() {
                debug_assert_eq!(
                    arena.footer(block.offset, block.size()),
                    Some(block.size()),
                    "dump: footer mismatch on block at {}",
                    block.offset
                );
                report.free_bytes += block.size();
            } else {
                report.busy_bytes += block.size();
            }

            report.blocks.push(BlockInfo {
                index: i + 1,
                allocated: block.header.allocated,
                prev_allocated: block.header.prev_allocated,
                start: block.offset,
                end: Offset(block.end().get() - 1),
                size: block.size(),
            });
            previous_allocated = block.header.allocated;
        }

        report
    }

    /// Get statistics on this heap, and verify validity of its blocks.
    pub fn stats(&self) -> (Validity, Stats) {
        self.blocks().map(|list| list.stats()).unwrap_or_default()
    }

    // The pointer checks shared by `deallocate` and payload access. Returns
    // the allocated block `ptr` points into.
    fn live_block(&self, ptr: HeapPtr) -> Result<Block, FreeError> {
        if ptr.is_null() {
            return Err(FreeError::NullPointer);
        }
        if ptr.0 % ALIGNMENT != 0 {
            return Err(FreeError::Misaligned(ptr.0));
        }

        let bad = FreeError::DoubleFreeOrCorrupted(ptr.0);
        let arena = self.arena.as_ref().ok_or(bad)?;
        let offset = Offset(ptr.0).back(HEADER_SIZE).ok_or(bad)?;
        if offset < arena.first_block() || offset >= arena.sentinel() {
            return Err(bad);
        }

        let header = arena.header(offset).ok_or(bad)?;
        if !header.allocated {
            return Err(bad);
        }
        let block = Block { offset, header };
        if !BlockHeader::is_plausible_size(block.size()) || block.end() > arena.sentinel() {
            return Err(bad);
        }
        Ok(block)
    }
}

impl<S> fmt::Debug for Heap<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap").field("arena", &self.arena).finish()
    }
}
