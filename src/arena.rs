//! The arena: an owned, fixed-length byte buffer, addressed by byte offsets.
//!
//! All reads of headers and footers go through [`Arena::read_word`], which is
//! bounds-checked and returns `None` rather than reading outside the buffer.
//! Writes are only issued after the caller has validated the offsets, and use
//! slice indexing, so a broken invariant panics instead of corrupting memory.

use alloc::boxed::Box;
use core::fmt;
use core::ops::Range;

use crate::header::{BlockHeader, FOOTER_SIZE, HEADER_SIZE};

/// A byte offset from the start of an arena.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset(pub usize);

impl Offset {
    pub const fn get(self) -> usize {
        self.0
    }

    pub fn forward(self, bytes: usize) -> Offset {
        Offset(self.0 + bytes)
    }

    pub fn back(self, bytes: usize) -> Option<Offset> {
        self.0.checked_sub(bytes).map(Offset)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

pub struct Arena {
    bytes: Box<[u8]>,
}

impl Arena {
    /// Wrap a freshly reserved region. The caller lays out the blocks.
    pub fn new(bytes: Box<[u8]>) -> Self {
        Arena { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// The first block sits just past the alignment pad.
    pub fn first_block(&self) -> Offset {
        Offset(HEADER_SIZE)
    }

    /// The end sentinel occupies the last header-sized slot of the arena.
    pub fn sentinel(&self) -> Offset {
        Offset(self.bytes.len() - HEADER_SIZE)
    }

    /// Read a 4-byte word, or `None` if it would fall outside the arena.
    pub fn read_word(&self, at: Offset) -> Option<u32> {
        let end = at.0.checked_add(4)?;
        let slice = self.bytes.get(at.0..end)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(slice);
        Some(u32::from_ne_bytes(word))
    }

    pub fn write_word(&mut self, at: Offset, value: u32) {
        self.bytes[at.0..at.0 + 4].copy_from_slice(&value.to_ne_bytes());
    }

    pub fn header(&self, at: Offset) -> Option<BlockHeader> {
        self.read_word(at).map(BlockHeader::decode)
    }

    pub fn set_header(&mut self, at: Offset, header: BlockHeader) {
        self.write_word(at, header.encode());
    }

    /// Flip only the `prev_allocated` bit of the header at `at`.
    pub fn set_prev_allocated(&mut self, at: Offset, prev_allocated: bool) {
        if let Some(mut header) = self.header(at) {
            header.prev_allocated = prev_allocated;
            self.set_header(at, header);
        }
    }

    /// Write the footer of a free block starting at `block` of `size` bytes.
    pub fn write_footer(&mut self, block: Offset, size: usize) {
        self.write_word(block.forward(size - FOOTER_SIZE), size as u32);
    }

    /// The footer of a free block of `size` bytes starting at `block`.
    pub fn footer(&self, block: Offset, size: usize) -> Option<usize> {
        let at = block.forward(size).back(FOOTER_SIZE)?;
        self.read_word(at).map(|w| w as usize)
    }

    /// The footer that sits immediately before `block`, i.e. the size of the
    /// preceding block if that block is free.
    pub fn footer_before(&self, block: Offset) -> Option<usize> {
        let at = block.back(FOOTER_SIZE)?;
        self.read_word(at).map(|w| w as usize)
    }

    pub fn bytes(&self, range: Range<usize>) -> Option<&[u8]> {
        self.bytes.get(range)
    }

    pub fn bytes_mut(&mut self, range: Range<usize>) -> Option<&mut [u8]> {
        self.bytes.get_mut(range)
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena").field("len", &self.len()).finish()
    }
}
