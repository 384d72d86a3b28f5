//! Region sources hand the heap its arena, once, at initialization.
//!
//! ### [`SystemSource`](struct.SystemSource.html)
//!
//! Reserves the arena from the global allocator, failing gracefully instead
//! of aborting when memory is short.
//!
//! ### [`ToyHeap`](struct.ToyHeap.html)
//!
//! `ToyHeap` pretends to be a small machine with a fixed memory budget. It is
//! mainly useful for testing: it can be exhausted on purpose, and it fills
//! what it hands out with a poison byte.

use alloc::boxed::Box;
use alloc::collections::TryReserveError;
use alloc::vec::Vec;

/// A provider of raw byte ranges.
pub trait RegionSource {
    type Err: core::fmt::Debug;

    /// Reserve exactly `size` bytes. The returned memory is owned by the
    /// caller from then on.
    fn reserve(&mut self, size: usize) -> Result<Box<[u8]>, Self::Err>;
}

/// Reserves zero-filled memory from the global allocator.
#[derive(Default, Debug)]
pub struct SystemSource {
    // Just for tracking, not really needed
    reservations: usize,
}

impl SystemSource {
    pub const fn new() -> Self {
        SystemSource { reservations: 0 }
    }

    pub fn reservations(&self) -> usize {
        self.reservations
    }
}

impl RegionSource for SystemSource {
    type Err = TryReserveError;

    fn reserve(&mut self, size: usize) -> Result<Box<[u8]>, TryReserveError> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(size)?;
        bytes.resize(size, 0);
        self.reservations += 1;
        Ok(bytes.into_boxed_slice())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToyHeapOverflowError {
    pub requested: usize,
    pub remaining: usize,
}

/// A pretend machine with `budget` bytes of memory in total.
#[derive(Debug)]
pub struct ToyHeap {
    pub budget: usize,
    pub used: usize,
    pub poison: u8,
}

impl ToyHeap {
    pub const DEFAULT_POISON: u8 = 0xA5;

    pub fn new(budget: usize) -> Self {
        ToyHeap {
            budget,
            used: 0,
            poison: Self::DEFAULT_POISON,
        }
    }
}

impl Default for ToyHeap {
    fn default() -> Self {
        ToyHeap::new(256 * 1024)
    }
}

impl RegionSource for ToyHeap {
    type Err = ToyHeapOverflowError;

    fn reserve(&mut self, size: usize) -> Result<Box<[u8]>, ToyHeapOverflowError> {
        let remaining = self.budget.saturating_sub(self.used);
        if size > remaining {
            return Err(ToyHeapOverflowError {
                requested: size,
                remaining,
            });
        }
        self.used += size;
        Ok(alloc::vec![self.poison; size].into_boxed_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_env_log::test;

    #[test]
    fn test_toy_heap_budget() {
        let mut toy = ToyHeap::new(100);
        let region = toy.reserve(60).expect("60 of 100 bytes fits");
        assert_eq!(region.len(), 60);
        assert!(region.iter().all(|&b| b == ToyHeap::DEFAULT_POISON));

        let err = toy.reserve(60).unwrap_err();
        assert_eq!(
            err,
            ToyHeapOverflowError {
                requested: 60,
                remaining: 40
            }
        );
        assert_eq!(toy.used, 60);
    }

    #[test]
    fn test_system_source_zero_fills() {
        let mut source = SystemSource::new();
        let region = source.reserve(128).expect("128 bytes should be available");
        assert_eq!(region.len(), 128);
        assert!(region.iter().all(|&b| b == 0));
        assert_eq!(source.reservations(), 1);
    }
}
