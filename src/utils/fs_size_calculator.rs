//! This module contains functions to calculate the size of different fs components
//!
//! All sizes are counted in blocks of [BLOCK_SIZE] bytes.

use serde::{Deserialize, Serialize};

use crate::fs::{FsError, FsResult, BLOCKS_PER_INODE, BLOCK_SIZE, INODES_PER_BLOCK};

/// how many bits one bitmap block can hold
pub const BITS_PER_BLOCK: u32 = BLOCK_SIZE * 8;

/// calculate needed bitmap size in blocks
/// # Arguments
/// - `element_count`: the number of elements tracked by the bitmap
/// # Example
/// ```
/// use flatfs::utils::fs_size_calculator::bitmap_blocks;
/// assert_eq!(bitmap_blocks(1), 1);
/// assert_eq!(bitmap_blocks(4096), 1);
/// assert_eq!(bitmap_blocks(4097), 2);
/// ```
pub const fn bitmap_blocks(element_count: u32) -> u32 {
    element_count.div_ceil(BITS_PER_BLOCK)
}

/// calculate needed Inode Table size in blocks
/// # Example
/// ```
/// use flatfs::utils::fs_size_calculator::inode_table_blocks;
/// assert_eq!(inode_table_blocks(16), 8);
/// assert_eq!(inode_table_blocks(17), 9);
/// ```
pub const fn inode_table_blocks(inode_count: u32) -> u32 {
    inode_count.div_ceil(INODES_PER_BLOCK)
}

/// the inode count used when the caller does not choose one:
/// one slot per [BLOCKS_PER_INODE] blocks, at least one table block,
/// rounded up to fill the last table block
pub fn default_inode_count(block_count: u32) -> u32 {
    let wanted = (block_count / BLOCKS_PER_INODE).max(INODES_PER_BLOCK);
    wanted.div_ceil(INODES_PER_BLOCK) * INODES_PER_BLOCK
}

/// where every region of an image lives
///
/// the regions are laid out back to back:
/// superblock, block bitmap, inode bitmap, inode table, data
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Geometry {
    pub block_count: u32,
    pub inode_count: u32,
    pub block_bitmap_start: u32,
    pub block_bitmap_blocks: u32,
    pub inode_bitmap_start: u32,
    pub inode_bitmap_blocks: u32,
    pub inode_table_start: u32,
    pub inode_table_blocks: u32,
    pub first_data_block: u32,
}

impl Geometry {
    /// compute the layout of an image of `block_count` blocks holding `inode_count` inodes
    pub fn new(block_count: u32, inode_count: u32) -> FsResult<Self> {
        if inode_count == 0 {
            return Err(FsError::InvalidArgument(
                "an image needs at least one inode for the root".into(),
            ));
        }
        // fd and inode ids are kept well inside i32
        if inode_count > i32::MAX as u32 {
            return Err(FsError::InvalidArgument(format!(
                "inode count {inode_count} is too large"
            )));
        }
        let block_bitmap_start = 1;
        let block_bitmap_blocks = bitmap_blocks(block_count);
        let inode_bitmap_start = block_bitmap_start + block_bitmap_blocks;
        let inode_bitmap_blocks = bitmap_blocks(inode_count);
        let inode_table_start = inode_bitmap_start + inode_bitmap_blocks;
        let inode_table_blocks = inode_table_blocks(inode_count);
        let first_data_block = inode_table_start
            .checked_add(inode_table_blocks)
            .ok_or_else(|| FsError::InvalidArgument("geometry overflows".into()))?;

        // metadata plus at least one data block
        if block_count <= first_data_block {
            return Err(FsError::InvalidArgument(format!(
                "{block_count} blocks can't hold {first_data_block} metadata blocks and any data"
            )));
        }
        Ok(Self {
            block_count,
            inode_count,
            block_bitmap_start,
            block_bitmap_blocks,
            inode_bitmap_start,
            inode_bitmap_blocks,
            inode_table_start,
            inode_table_blocks,
            first_data_block,
        })
    }

    /// blocks taken by the superblock, both bitmaps and the inode table
    pub const fn metadata_blocks(&self) -> u32 {
        self.first_data_block
    }

    pub const fn data_blocks(&self) -> u32 {
        self.block_count - self.first_data_block
    }

    /// image size in bytes
    pub const fn image_size(&self) -> u64 {
        self.block_count as u64 * BLOCK_SIZE as u64
    }

    /// (table block, byte offset inside it) of an inode slot
    pub const fn inode_position(&self, id: u32) -> (u32, usize) {
        (
            self.inode_table_start + id / INODES_PER_BLOCK,
            ((id % INODES_PER_BLOCK) * crate::fs::INODE_SIZE) as usize,
        )
    }
}
