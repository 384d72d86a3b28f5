use static_assertions::const_assert;

/// All blocks start 4 bytes past a multiple of this, so that payloads are
/// aligned to it.
pub const ALIGNMENT: usize = 8;

/// Bytes used by a block header.
pub const HEADER_SIZE: usize = 4;

/// Bytes used by the footer at the end of a free block.
pub const FOOTER_SIZE: usize = 4;

/// The smallest block we will ever create: a free block needs room for both
/// its header and its footer.
pub const MIN_BLOCK_SIZE: usize = 8;

/// Region sizes passed to `initialize` are rounded up to a multiple of this.
pub const PAGE_SIZE: usize = 4096;

/// Extra bytes reserved on top of the rounded region: a 4-byte pad in front
/// of the first block (for payload alignment) and the 4-byte end sentinel.
pub const ARENA_OVERHEAD: usize = HEADER_SIZE + HEADER_SIZE;

/// The largest payload `allocate` will accept.
pub const MAX_PAYLOAD: usize = PAGE_SIZE - ALIGNMENT;

/// The largest region `initialize` will accept. Block sizes are stored in
/// 32 bits, so this keeps every size well clear of overflow.
pub const MAX_REGION_SIZE: usize = 1 << 30;

const_assert!(MIN_BLOCK_SIZE >= HEADER_SIZE + FOOTER_SIZE);
const_assert!(MIN_BLOCK_SIZE % ALIGNMENT == 0);
const_assert!(PAGE_SIZE % ALIGNMENT == 0);
const_assert!(MAX_REGION_SIZE % PAGE_SIZE == 0);
const_assert!(MAX_REGION_SIZE + ARENA_OVERHEAD <= u32::MAX as usize);
const_assert!(MAX_PAYLOAD + HEADER_SIZE <= PAGE_SIZE);

const ALLOCATED_BIT: u32 = 0b01;
const PREV_ALLOCATED_BIT: u32 = 0b10;
const STATUS_MASK: u32 = ALLOCATED_BIT | PREV_ALLOCATED_BIT;

/// The decoded contents of a block header.
///
/// In the arena, a header is a single `u32`: sizes are always multiples of 8,
/// so the two lowest bits are free to hold the status flags. That packing is
/// confined to [`encode`](#method.encode) and [`decode`](#method.decode); the
/// rest of the crate only ever sees this struct.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    /// Total size of the block in bytes, header (and footer) included.
    pub size: u32,
    /// Whether the block is handed out to a caller.
    pub allocated: bool,
    /// Whether the physically preceding block is allocated.
    pub prev_allocated: bool,
}

impl BlockHeader {
    pub const fn free(size: u32, prev_allocated: bool) -> Self {
        BlockHeader {
            size,
            allocated: false,
            prev_allocated,
        }
    }

    pub const fn allocated(size: u32, prev_allocated: bool) -> Self {
        BlockHeader {
            size,
            allocated: true,
            prev_allocated,
        }
    }

    /// The end sentinel: always allocated, size zero.
    pub const fn sentinel(prev_allocated: bool) -> Self {
        BlockHeader::allocated(0, prev_allocated)
    }

    pub fn is_sentinel(&self) -> bool {
        self.size == 0
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }

    pub fn encode(self) -> u32 {
        let mut raw = self.size & !STATUS_MASK;
        if self.allocated {
            raw |= ALLOCATED_BIT;
        }
        if self.prev_allocated {
            raw |= PREV_ALLOCATED_BIT;
        }
        raw
    }

    pub fn decode(raw: u32) -> Self {
        BlockHeader {
            size: raw & !STATUS_MASK,
            allocated: raw & ALLOCATED_BIT != 0,
            prev_allocated: raw & PREV_ALLOCATED_BIT != 0,
        }
    }

    /// Whether `size` is one a block could legitimately have.
    pub fn is_plausible_size(size: usize) -> bool {
        size >= MIN_BLOCK_SIZE && size % ALIGNMENT == 0
    }
}

/// Round `value` up to the nearest multiple of `increment`.
pub fn round_up(value: usize, increment: usize) -> usize {
    if value == 0 {
        return 0;
    }
    increment * ((value - 1) / increment + 1)
}

/// The block size needed to hold a payload of `size` bytes.
pub fn block_size_for(size: usize) -> usize {
    round_up(size + HEADER_SIZE, ALIGNMENT)
}
