use alloc::vec::Vec;
use core::fmt;

use crate::arena::Offset;

/// One row of a [`Report`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// 1-based position in address order.
    pub index: usize,
    pub allocated: bool,
    pub prev_allocated: bool,
    /// Offset of the header.
    pub start: Offset,
    /// Offset of the last byte of the block.
    pub end: Offset,
    pub size: usize,
}

/// A snapshot of every block in a heap, as produced by `Heap::dump`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub blocks: Vec<BlockInfo>,
    pub busy_bytes: usize,
    pub free_bytes: usize,
    /// Set if the walk stopped at a header it could not follow.
    pub truncated: bool,
}

impl Report {
    pub fn total_bytes(&self) -> usize {
        self.busy_bytes + self.free_bytes
    }

    pub fn free_blocks(&self) -> impl Iterator<Item = &BlockInfo> {
        self.blocks.iter().filter(|b| !b.allocated)
    }

    pub fn busy_blocks(&self) -> impl Iterator<Item = &BlockInfo> {
        self.blocks.iter().filter(|b| b.allocated)
    }
}

fn status(allocated: bool) -> &'static str {
    if allocated {
        "Busy"
    } else {
        "Free"
    }
}

const RULE: &str = "-------------------------------------------------------------------";
const STARS: &str = "*******************************************************************";

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", STARS)?;
        writeln!(f, "No.\tStatus\tPrev\tt_Begin\t\tt_End\t\tt_Size")?;
        writeln!(f, "{}", RULE)?;
        for block in &self.blocks {
            writeln!(
                f,
                "{}\t{}\t{}\t{}\t{}\t{}",
                block.index,
                status(block.allocated),
                status(block.prev_allocated),
                block.start,
                block.end,
                block.size,
            )?;
        }
        if self.truncated {
            writeln!(f, "(block list truncated at a corrupt header)")?;
        }
        writeln!(f, "{}", RULE)?;
        writeln!(f, "{}", STARS)?;
        writeln!(f, "Total busy size = {}", self.busy_bytes)?;
        writeln!(f, "Total free size = {}", self.free_bytes)?;
        writeln!(f, "Total size = {}", self.total_bytes())?;
        write!(f, "{}", STARS)
    }
}
