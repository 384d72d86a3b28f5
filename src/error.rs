//! Errors reported by [`Heap`](../allocators/struct.Heap.html).
//!
//! Running out of memory is not an error: `allocate` returns `None`.

use thiserror::Error;

/// Errors from `Heap::initialize`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// The region size was zero, or larger than `MAX_REGION_SIZE`.
    #[error("requested region size {0} is not usable")]
    InvalidSize(usize),

    /// The heap already owns an arena.
    #[error("heap has already been initialized")]
    AlreadyInitialized,

    /// The region source could not supply the arena.
    #[error("could not reserve {size} bytes for the arena")]
    ReserveFailed {
        /// Bytes requested from the source, overhead included.
        size: usize,
    },
}

/// Errors from `Heap::deallocate`, checked in this order.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeError {
    #[error("cannot free a null pointer")]
    NullPointer,

    #[error("pointer {0:#x} is not 8-byte aligned")]
    Misaligned(usize),

    /// The block at this pointer is not allocated. This is reported alike for
    /// a second free, a pointer this heap never handed out, and a header that
    /// has been overwritten; the header bits cannot tell them apart.
    #[error("pointer {0:#x} is not a live allocation (double free or corrupted heap)")]
    DoubleFreeOrCorrupted(usize),
}
