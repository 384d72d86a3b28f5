use core::fmt;

use crate::arena::{Arena, Offset};
use crate::header::{BlockHeader, ALIGNMENT, ARENA_OVERHEAD, HEADER_SIZE};

/// A block found while walking the arena: where it starts, and its header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub offset: Offset,
    pub header: BlockHeader,
}

impl Block {
    /// The size of the block, in bytes.
    pub fn size(&self) -> usize {
        self.header.size()
    }

    /// One past the last byte of this block; also where the next header is.
    pub fn end(&self) -> Offset {
        self.offset.forward(self.size())
    }

    /// Where the caller's bytes start, if this block is allocated.
    pub fn payload(&self) -> Offset {
        self.offset.forward(HEADER_SIZE)
    }

    pub fn is_free(&self) -> bool {
        !self.header.allocated
    }
}

/// A header that could not be part of a well-formed chain: unreadable, of an
/// impossible size, or reaching past the end sentinel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CorruptBlock {
    pub offset: Offset,
    pub raw: Option<u32>,
}

/// A `BlockList` is a read-only view of the implicit list of blocks in an
/// arena.
///
/// There are no links: each block's header holds its size, so the next block
/// starts where this one ends. The list starts right after the alignment pad
/// and ends at the end sentinel.
///
/// It maintains a few invariants, which [`stats`](#method.stats) checks:
///
/// - Blocks are contiguous, and together with the pad and the sentinel they
///   cover the whole arena.
/// - Every size is a multiple of 8 and at least `MIN_BLOCK_SIZE`.
/// - No two adjacent blocks are free (those are merged on deallocation).
/// - Each `prev_allocated` bit matches the block before it.
/// - Each free block ends with a footer equal to its size.
pub struct BlockList<'arena> {
    arena: &'arena Arena,
}

/// Walks the blocks in address order.
///
/// Yields `Err` once, and then stops, if it meets a header it cannot trust;
/// it never reads outside the arena.
pub struct BlockIter<'arena> {
    arena: &'arena Arena,
    next: Option<Offset>,
}

impl<'arena> Iterator for BlockIter<'arena> {
    type Item = Result<Block, CorruptBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.next.take()?;
        let sentinel = self.arena.sentinel();
        if offset == sentinel {
            return None;
        }

        let raw = self.arena.read_word(offset);
        let header = match raw {
            Some(raw) => BlockHeader::decode(raw),
            None => return Some(Err(CorruptBlock { offset, raw })),
        };
        let end = offset.get().checked_add(header.size());
        match end {
            Some(end)
                if BlockHeader::is_plausible_size(header.size()) && end <= sentinel.get() => {}
            _ => return Some(Err(CorruptBlock { offset, raw })),
        }

        let block = Block { offset, header };
        self.next = Some(block.end());
        Some(Ok(block))
    }
}

impl<'arena> IntoIterator for &BlockList<'arena> {
    type Item = Result<Block, CorruptBlock>;
    type IntoIter = BlockIter<'arena>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for BlockList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockList(")?;
        let mut start = true;
        for block in self {
            if !start {
                write!(f, ", ")?;
            } else {
                start = false;
            }
            match block {
                Ok(b) if b.is_free() => write!(f, "Free({}, {})", b.offset, b.size())?,
                Ok(b) => write!(f, "Busy({}, {})", b.offset, b.size())?,
                Err(c) => write!(f, "Corrupt({}, {:?})", c.offset, c.raw)?,
            }
        }

        write!(f, ")")
    }
}

/// Validity contains a representation of all invalid states found in a
/// BlockList.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Validity {
    /// Number of free blocks directly following another free block. These
    /// should have been coalesced.
    pub adjacent_free: usize,
    /// Number of headers (sentinel included) whose `prev_allocated` bit does
    /// not match the block before them.
    pub prev_mismatches: usize,
    /// Number of free blocks whose footer disagrees with their header.
    pub footer_mismatches: usize,
    /// Number of blocks whose payload is not 8-byte aligned.
    pub misaligned: usize,
    /// Number of times the walk hit a header it could not follow, or found no
    /// sentinel at the end.
    ///
    /// This likely indicates corruption, and means the other counts only
    /// cover the blocks before it.
    pub corrupt: usize,
    /// Set when the blocks, pad and sentinel do not add up to the arena length.
    pub size_mismatch: bool,
}

impl Validity {
    /// Returns a boolean - a simple check if all cases are 0
    pub fn is_valid(&self) -> bool {
        self.adjacent_free == 0
            && self.prev_mismatches == 0
            && self.footer_mismatches == 0
            && self.misaligned == 0
            && self.corrupt == 0
            && !self.size_mismatch
    }
}

impl From<Validity> for bool {
    fn from(v: Validity) -> bool {
        v.is_valid()
    }
}

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    /// Number of blocks, not counting the sentinel.
    pub blocks: usize,
    pub free_blocks: usize,
    pub busy_bytes: usize,
    pub free_bytes: usize,
    pub largest_free: usize,
}

impl<'arena> BlockList<'arena> {
    pub fn new(arena: &'arena Arena) -> Self {
        BlockList { arena }
    }

    pub fn iter(&self) -> BlockIter<'arena> {
        BlockIter {
            arena: self.arena,
            next: Some(self.arena.first_block()),
        }
    }

    /// The smallest free block of at least `needed` bytes, the lowest address
    /// winning ties. The walk stops early on an exact fit.
    pub fn best_fit(&self, needed: usize) -> Option<Block> {
        let mut best: Option<Block> = None;
        for item in self.iter() {
            let block = match item {
                Ok(block) => block,
                Err(corrupt) => {
                    log::warn!("best_fit: stopping at corrupt header {:?}", corrupt);
                    break;
                }
            };
            if !block.is_free() || block.size() < needed {
                continue;
            }
            if best.map_or(true, |b| block.size() < b.size()) {
                log::trace!(
                    "  best_fit({}): candidate at {} size {}",
                    needed,
                    block.offset,
                    block.size()
                );
                best = Some(block);
                if block.size() == needed {
                    break;
                }
            }
        }
        best
    }

    /// Walk the whole list, checking its invariants and tallying its contents.
    pub fn stats(&self) -> (Validity, Stats) {
        let mut validity: Validity = Default::default();
        let mut stats: Stats = Default::default();

        // The pad in front of the first block counts as allocated.
        let mut previous_allocated = true;
        let mut covered = 0;

        for item in self.iter() {
            let block = match item {
                Ok(block) => block,
                Err(_) => {
                    validity.corrupt += 1;
                    return (validity, stats);
                }
            };

            if block.header.prev_allocated != previous_allocated {
                validity.prev_mismatches += 1;
            }
            if block.payload().get() % ALIGNMENT != 0 {
                validity.misaligned += 1;
            }

            if block.is_free() {
                if !previous_allocated {
                    validity.adjacent_free += 1;
                }
                if self.arena.footer(block.offset, block.size()) != Some(block.size()) {
                    validity.footer_mismatches += 1;
                }
                stats.free_blocks += 1;
                stats.free_bytes += block.size();
                stats.largest_free = stats.largest_free.max(block.size());
            } else {
                stats.busy_bytes += block.size();
            }

            stats.blocks += 1;
            covered += block.size();
            previous_allocated = block.header.allocated;
        }

        match self.arena.header(self.arena.sentinel()) {
            Some(sentinel) if sentinel.is_sentinel() && sentinel.allocated => {
                if sentinel.prev_allocated != previous_allocated {
                    validity.prev_mismatches += 1;
                }
            }
            _ => validity.corrupt += 1,
        }

        validity.size_mismatch = covered + ARENA_OVERHEAD != self.arena.len();

        (validity, stats)
    }
}
