use bitvec::prelude::*;
use log::error;

use crate::utils::fs_size_calculator::{Geometry, BITS_PER_BLOCK};

use super::{block_buf, Backing, BlockId, BlockStore, FsError, FsResult, InodeId, BLOCK_SIZE};

/// one on-disk bitmap and the region it is persisted to
#[derive(Debug, Default)]
pub struct Bitmap {
    bits: BitVec<u8, Lsb0>,
    /// first block of the bitmap region
    start: BlockId,
    next_free: Option<usize>,
}

impl Bitmap {
    pub fn new(bits: BitVec<u8, Lsb0>, start: BlockId) -> Self {
        let mut bitmap = Bitmap {
            bits,
            start,
            next_free: None,
        };
        bitmap.next_free = bitmap.first_free();
        bitmap
    }

    /// read `len` bits from the `blocks` blocks starting at `start`
    pub fn load<B: Backing>(
        store: &BlockStore<B>,
        start: BlockId,
        blocks: u32,
        len: u32,
    ) -> FsResult<Self> {
        let mut raw = Vec::with_capacity((blocks * BLOCK_SIZE) as usize);
        let mut buf = block_buf();
        for block in start..start + blocks {
            store.read_block(block, &mut buf)?;
            raw.extend_from_slice(&buf);
        }
        let mut bits = BitVec::<u8, Lsb0>::from_vec(raw);
        bits.truncate(len as usize);
        Ok(Self::new(bits, start))
    }

    /// write every block of the bitmap region
    pub fn store_all<B: Backing>(&self, store: &mut BlockStore<B>) -> FsResult<()> {
        let blocks = (self.bits.len() as u32).div_ceil(BITS_PER_BLOCK);
        for block in 0..blocks {
            self.persist_block(store, block)?;
        }
        Ok(())
    }

    /// write the bitmap block holding bit `i`
    fn persist_bit<B: Backing>(&self, store: &mut BlockStore<B>, i: usize) -> FsResult<()> {
        self.persist_block(store, i as u32 / BITS_PER_BLOCK)
    }

    fn persist_block<B: Backing>(&self, store: &mut BlockStore<B>, block: u32) -> FsResult<()> {
        let raw = self.bits.as_raw_slice();
        let from = (block * BLOCK_SIZE) as usize;
        let to = raw.len().min(from + BLOCK_SIZE as usize);
        let mut buf = block_buf();
        buf[..to - from].copy_from_slice(&raw[from..to]);
        store.write_block(self.start + block, &buf)
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// check if entry `i` is in use
    pub fn is_used(&self, i: usize) -> bool {
        self.bits.get(i).as_deref().copied().unwrap_or(false)
    }

    pub fn free_count(&self) -> usize {
        self.bits.count_zeros()
    }

    pub fn used_count(&self) -> usize {
        self.bits.count_ones()
    }

    /// mark `i` used without persisting, for format time
    pub(crate) fn occupy(&mut self, i: usize) {
        self.bits.set(i, true);
        if self.next_free == Some(i) {
            self.next_free = self.first_free();
        }
    }

    /// take the first free entry and persist the change
    pub fn allocate<B: Backing>(&mut self, store: &mut BlockStore<B>) -> FsResult<usize> {
        let index = self.next_free.ok_or(FsError::NoSpace)?;
        self.bits.set(index, true);
        if let Err(e) = self.persist_bit(store, index) {
            self.bits.set(index, false);
            return Err(e);
        }
        self.next_free = self.first_free();
        Ok(index)
    }

    /// release entry `i` and persist the change
    ///
    /// releasing a free entry only logs, the bitmap is left untouched
    pub fn release<B: Backing>(&mut self, store: &mut BlockStore<B>, i: usize) -> FsResult<()> {
        if !self.is_used(i) {
            error!(
                "bitmap at block {}: entry {i} released while already free",
                self.start
            );
            return Ok(());
        }
        self.bits.set(i, false);
        self.persist_bit(store, i)?;
        self.next_free = Some(self.next_free.map_or(i, |next| next.min(i)));
        Ok(())
    }

    fn first_free(&self) -> Option<usize> {
        self.bits.first_zero()
    }
}

/// grants and reclaims data blocks and inode slots
#[derive(Debug, Default)]
pub struct Allocator {
    pub(crate) blocks: Bitmap,
    pub(crate) inodes: Bitmap,
    /// blocks below this index hold metadata and are never handed out or freed
    first_data_block: BlockId,
}

impl Allocator {
    /// empty bitmaps for a fresh image, with the metadata footprint already marked used
    pub fn format(geometry: &Geometry) -> Self {
        let mut blocks = Bitmap::new(
            BitVec::repeat(false, geometry.block_count as usize),
            geometry.block_bitmap_start,
        );
        for block in 0..geometry.metadata_blocks() {
            blocks.occupy(block as usize);
        }
        let inodes = Bitmap::new(
            BitVec::repeat(false, geometry.inode_count as usize),
            geometry.inode_bitmap_start,
        );
        Self {
            blocks,
            inodes,
            first_data_block: geometry.first_data_block,
        }
    }

    pub fn load<B: Backing>(store: &BlockStore<B>, geometry: &Geometry) -> FsResult<Self> {
        let blocks = Bitmap::load(
            store,
            geometry.block_bitmap_start,
            geometry.block_bitmap_blocks,
            geometry.block_count,
        )?;
        let inodes = Bitmap::load(
            store,
            geometry.inode_bitmap_start,
            geometry.inode_bitmap_blocks,
            geometry.inode_count,
        )?;
        let allocator = Self {
            blocks,
            inodes,
            first_data_block: geometry.first_data_block,
        };
        if let Some(block) = (0..geometry.first_data_block).find(|b| !allocator.has_block(*b)) {
            return Err(FsError::Corrupted(format!(
                "metadata block {block} is marked free in the block bitmap"
            )));
        }
        Ok(allocator)
    }

    pub fn store_all<B: Backing>(&self, store: &mut BlockStore<B>) -> FsResult<()> {
        self.blocks.store_all(store)?;
        self.inodes.store_all(store)
    }

    pub fn allocate_block<B: Backing>(&mut self, store: &mut BlockStore<B>) -> FsResult<BlockId> {
        self.blocks.allocate(store).map(|i| i as BlockId)
    }

    pub fn free_block<B: Backing>(&mut self, store: &mut BlockStore<B>, block: BlockId) -> FsResult<()> {
        if block < self.first_data_block || block as usize >= self.blocks.len() {
            error!("refusing to free block {block}, it is not a data block");
            return Ok(());
        }
        self.blocks.release(store, block as usize)
    }

    pub fn allocate_inode<B: Backing>(&mut self, store: &mut BlockStore<B>) -> FsResult<InodeId> {
        self.inodes.allocate(store).map(|i| i as InodeId)
    }

    pub fn free_inode<B: Backing>(&mut self, store: &mut BlockStore<B>, id: InodeId) -> FsResult<()> {
        if id as usize >= self.inodes.len() {
            error!("refusing to free inode {id}, it is out of range");
            return Ok(());
        }
        self.inodes.release(store, id as usize)
    }

    pub fn has_block(&self, block: BlockId) -> bool {
        self.blocks.is_used(block as usize)
    }

    pub fn has_inode(&self, id: InodeId) -> bool {
        self.inodes.is_used(id as usize)
    }

    pub fn free_blocks(&self) -> usize {
        self.blocks.free_count()
    }

    pub fn used_blocks(&self) -> usize {
        self.blocks.used_count()
    }

    pub fn free_inodes(&self) -> usize {
        self.inodes.free_count()
    }

    pub fn used_inodes(&self) -> usize {
        self.inodes.used_count()
    }
}
