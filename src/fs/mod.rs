//! our flat, block-addressed filesystem
pub mod allocator;
pub mod block_store;
pub mod directory;
pub mod error;
pub mod filekind;
pub mod fs_layout;
pub mod handle;
pub mod inode;
pub mod path;
pub mod stats;
pub mod superblock;
mod fs_api_impl;
pub use allocator::*;
pub use block_store::*;
pub use error::*;
pub use filekind::*;
pub use fs_layout::*;
pub use handle::*;
pub use inode::*;
pub use path::split_path;
pub use stats::*;
pub use superblock::*;

const FS_MAGIC: u32 = 0x1324a;
pub const BLOCK_SIZE: u32 = 512;
pub const ROOT_INODE: u32 = 0;
pub const INODE_SIZE: u32 = 256;
pub const INODES_PER_BLOCK: u32 = BLOCK_SIZE / INODE_SIZE;
pub const DIRECT_POINTERS: u8 = 12;
pub const POINTERS_PER_BLOCK: u32 = BLOCK_SIZE / std::mem::size_of::<u32>() as u32;
pub const MAX_FILE_BLOCKS: u32 = DIRECT_POINTERS as u32 + POINTERS_PER_BLOCK;
pub const MAX_FILE_SIZE: u64 = MAX_FILE_BLOCKS as u64 * BLOCK_SIZE as u64;
pub const MAX_NAME_LEN: usize = 64;
/// one inode slot is provisioned for every this many blocks unless told otherwise
pub const BLOCKS_PER_INODE: u32 = 4;

pub type InodeId = u32;
pub type BlockId = u32;
