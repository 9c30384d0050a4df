//! usage statistics
use std::fmt;

use super::{Backing, FlatFs};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FsStats {
    /// block reads since initialization
    pub block_reads: u64,
    /// block writes since initialization
    pub block_writes: u64,
    pub blocks_used: usize,
    pub blocks_free: usize,
    pub inodes_used: usize,
    pub inodes_free: usize,
}

impl fmt::Display for FsStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "block reads: {}", self.block_reads)?;
        writeln!(f, "block writes: {}", self.block_writes)?;
        writeln!(
            f,
            "blocks: {} used, {} free",
            self.blocks_used, self.blocks_free
        )?;
        writeln!(
            f,
            "inodes: {} used, {} free",
            self.inodes_used, self.inodes_free
        )
    }
}

impl<B: Backing> FlatFs<B> {
    pub fn stats(&self) -> FsStats {
        let counters = self.store.counters();
        FsStats {
            block_reads: counters.reads,
            block_writes: counters.writes,
            blocks_used: self.allocator.used_blocks(),
            blocks_free: self.allocator.free_blocks(),
            inodes_used: self.allocator.used_inodes(),
            inodes_free: self.allocator.free_inodes(),
        }
    }

    /// print [stats](Self::stats) to standard output
    pub fn print_stats(&self) {
        print!("{}", self.stats());
    }
}
