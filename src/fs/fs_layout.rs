//! what does our filesystem look like in the memory

use crate::{
    mkfs::MkfsOptions,
    utils::{fs_size_calculator::Geometry, traits::SerializeAndDigest},
};

use super::{
    block_buf, superblock::SuperBlock, Allocator, Backing, BlockId, BlockStore, FileKind, FsError,
    FsResult, HandleTable, Inode, InodeId, BLOCK_SIZE, DIRECT_POINTERS, INODE_SIZE,
    MAX_FILE_BLOCKS, ROOT_INODE,
};
use log::{debug, error, info};
use memmap2::MmapMut;
use smallvec::SmallVec;
use std::path::Path;

const DIRECT_POINTERS_U64: u64 = DIRECT_POINTERS as u64;
const BLOCK_SIZE_U64: u64 = BLOCK_SIZE as u64;
const POINTER_SIZE: usize = std::mem::size_of::<BlockId>();

/// it has the following layout:
/// - superblock
/// - block bitmap
/// - inode bitmap
/// - inode table
/// - data blocks
#[derive(Debug)]
pub struct FlatFs<B: Backing = MmapMut> {
    /// the superblock of this filesystem
    superblock: SuperBlock,
    /// free-space bookkeeping for blocks and inode slots
    pub(crate) allocator: Allocator,
    /// the image every block goes through
    pub(crate) store: BlockStore<B>,
    /// handles handed out by `open`
    pub(crate) handles: HandleTable,
}

impl FlatFs<MmapMut> {
    /// open the image at `image_path`, or create and format it when missing
    ///
    /// an existing image must hold exactly `block_count` blocks
    pub fn initialize<P>(image_path: P, block_count: u32) -> FsResult<Self>
    where
        P: AsRef<Path>,
    {
        Self::initialize_with(image_path, &MkfsOptions::new(block_count))
    }

    pub fn initialize_with<P>(image_path: P, options: &MkfsOptions) -> FsResult<Self>
    where
        P: AsRef<Path>,
    {
        let image_path = image_path.as_ref();
        if image_path.exists() {
            info!("opening image {}", image_path.display());
            let store = BlockStore::open(image_path)?;
            Self::mount(store, options.block_count)
        } else {
            info!(
                "creating image {} with {} blocks",
                image_path.display(),
                options.block_count
            );
            let geometry = options.geometry()?;
            Self::format_new_image(image_path, options.block_count, geometry)
        }
    }

    /// create the image file and format it, removing the file again if
    /// formatting fails so the next attempt starts from scratch
    fn format_new_image(image_path: &Path, block_count: u32, geometry: Geometry) -> FsResult<Self> {
        let store = BlockStore::create(image_path, block_count)?;
        Self::format(store, geometry).map_err(|e| {
            if let Err(remove) = std::fs::remove_file(image_path) {
                error!(
                    "cannot remove half formatted image {}: {remove}",
                    image_path.display()
                );
            }
            e
        })
    }
}

impl FlatFs<Vec<u8>> {
    /// a formatted filesystem that only lives in memory
    pub fn in_memory(options: &MkfsOptions) -> FsResult<Self> {
        let geometry = options.geometry()?;
        Self::format(BlockStore::in_memory(options.block_count), geometry)
    }
}

impl<B: Backing> FlatFs<B> {
    /// write a fresh superblock, empty bitmaps and the root directory
    pub fn format(mut store: BlockStore<B>, geometry: Geometry) -> FsResult<Self> {
        if store.block_count() != geometry.block_count {
            return Err(FsError::InvalidArgument(format!(
                "store holds {} blocks, geometry wants {}",
                store.block_count(),
                geometry.block_count
            )));
        }
        let mut superblock = SuperBlock::new(geometry);
        superblock.update_last_mounted_at();
        let mut block = block_buf();
        superblock.serialize_into_slot(&mut block)?;
        store.write_block(0, &block)?;

        let allocator = Allocator::format(&geometry);
        allocator.store_all(&mut store)?;

        let mut fs = FlatFs {
            superblock,
            allocator,
            store,
            handles: HandleTable::default(),
        };
        fs.create_root()?;
        fs.store.reset_counters();
        info!(
            "formatted {} blocks: {} metadata, {} data, {} inodes",
            geometry.block_count,
            geometry.metadata_blocks(),
            geometry.data_blocks(),
            geometry.inode_count
        );
        Ok(fs)
    }

    /// restore the filesystem state recorded in `store`
    ///
    /// `block_count` is what the caller expects the image to hold
    pub fn mount(mut store: BlockStore<B>, block_count: u32) -> FsResult<Self> {
        let mut block = block_buf();
        store.read_block(0, &mut block)?;
        let (mut superblock, _) = SuperBlock::deserialize(&block)?;
        superblock.validate(store.block_count(), block_count)?;

        let allocator = Allocator::load(&store, &superblock.geometry)?;
        if !allocator.has_inode(superblock.root_inode) {
            return Err(FsError::Corrupted("root inode is not allocated".into()));
        }

        superblock.update_last_mounted_at();
        superblock.serialize_into_slot(&mut block)?;
        store.write_block(0, &block)?;
        store.reset_counters();
        info!(
            "mounted image of {} blocks, {} free",
            block_count,
            allocator.free_blocks()
        );
        Ok(FlatFs {
            superblock,
            allocator,
            store,
            handles: HandleTable::default(),
        })
    }

    /// create root directory "/"
    fn create_root(&mut self) -> FsResult<()> {
        let index = self.allocator.allocate_inode(&mut self.store)?;
        if index != ROOT_INODE {
            return Err(FsError::Corrupted(format!(
                "root inode index must be {ROOT_INODE}, not {index}"
            )));
        }
        let mut root = Inode::new(index, FileKind::Directory, "");
        self.save_inode(&mut root)
    }

    #[inline]
    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.superblock.geometry
    }

    #[inline]
    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    #[inline]
    pub fn root_inode(&self) -> InodeId {
        self.superblock.root_inode
    }
}

/// [Inode] operations
impl<B: Backing> FlatFs<B> {
    pub fn find_inode(&self, index: InodeId) -> FsResult<Inode> {
        if index >= self.geometry().inode_count || !self.allocator.has_inode(index) {
            return Err(FsError::NotFound(format!("inode {index}")));
        }
        let (block_index, offset) = self.geometry().inode_position(index);
        let mut block = block_buf();
        self.store.read_block(block_index, &mut block)?;
        let (inode, _) = Inode::deserialize(&block[offset..offset + INODE_SIZE as usize])?;
        if inode.inode_number != index {
            return Err(FsError::Corrupted(format!(
                "slot {index} holds inode {}",
                inode.inode_number
            )));
        }
        Ok(inode)
    }

    pub(crate) fn save_inode(&mut self, inode: &mut Inode) -> FsResult<()> {
        let (block_index, offset) = self.geometry().inode_position(inode.inode_number);
        let mut block = block_buf();
        self.store.read_block(block_index, &mut block)?;
        inode.serialize_into_slot(&mut block[offset..offset + INODE_SIZE as usize])?;
        self.store.write_block(block_index, &block)
    }

    /// take a free slot and persist a new, empty inode in it
    pub(crate) fn new_inode(&mut self, kind: FileKind, name: &str) -> FsResult<Inode> {
        let index = self.allocator.allocate_inode(&mut self.store)?;
        let mut inode = Inode::new(index, kind, name);
        if let Err(e) = self.save_inode(&mut inode) {
            self.allocator.free_inode(&mut self.store, index)?;
            return Err(e);
        }
        debug!("allocated inode {index} ({kind}) for {name:?}");
        Ok(inode)
    }

    /// give back every block of `inode` and then its slot
    pub(crate) fn release_inode(&mut self, inode: &Inode) -> FsResult<()> {
        let blocks = self.file_blocks(inode)?;
        for block in &blocks {
            self.allocator.free_block(&mut self.store, *block)?;
        }
        self.allocator
            .free_inode(&mut self.store, inode.inode_number)?;
        debug!(
            "released inode {} and {} blocks",
            inode.inode_number,
            blocks.len()
        );
        Ok(())
    }

    /// every block held by `inode`: data blocks, then the indirect block itself
    pub fn file_blocks(&self, inode: &Inode) -> FsResult<SmallVec<[BlockId; 16]>> {
        let mut blocks: SmallVec<[BlockId; 16]> = inode.direct_blocks().collect();
        if inode.indirect_block != 0 {
            blocks.extend(self.read_indirect_block(inode.indirect_block)?);
            blocks.push(inode.indirect_block);
        }
        Ok(blocks)
    }
}

/// data block operations
impl<B: Backing> FlatFs<B> {
    /// the block holding the `index`-th block of a file, if allocated
    pub(crate) fn find_data_block(&self, inode: &Inode, index: u64) -> FsResult<Option<BlockId>> {
        if index < DIRECT_POINTERS_U64 {
            Ok(inode.find_direct_block(index as usize))
        } else if index < MAX_FILE_BLOCKS as u64 {
            if inode.indirect_block == 0 {
                return Ok(None);
            }
            let pointer =
                self.read_pointer(inode.indirect_block, (index - DIRECT_POINTERS_U64) as usize)?;
            Ok(Some(pointer).filter(|b| *b != 0))
        } else {
            Ok(None)
        }
    }

    /// like [find_data_block](Self::find_data_block) but allocates what is missing
    ///
    /// returns the block and whether it was allocated by this call;
    /// `inode` is updated in memory only, the caller saves it
    pub(crate) fn map_data_block(
        &mut self,
        inode: &mut Inode,
        index: u64,
    ) -> FsResult<(BlockId, bool)> {
        if index >= MAX_FILE_BLOCKS as u64 {
            debug!("inode {} reached its maximum size", inode.inode_number);
            return Err(FsError::NoSpace);
        }
        if let Some(block) = self.find_data_block(inode, index)? {
            return Ok((block, false));
        }

        if index < DIRECT_POINTERS_U64 {
            let block = self.allocator.allocate_block(&mut self.store)?;
            inode.add_block(block, index as usize)?;
            return Ok((block, true));
        }

        // direct slots are full, go through the indirect block
        let mut fresh_indirect = false;
        if inode.indirect_block == 0 {
            let indirect = self.allocator.allocate_block(&mut self.store)?;
            if let Err(e) = self.store.write_block(indirect, &block_buf()) {
                self.allocator.free_block(&mut self.store, indirect)?;
                return Err(e);
            }
            inode.indirect_block = indirect;
            inode.block_count += 1;
            fresh_indirect = true;
        }

        let block = match self.allocator.allocate_block(&mut self.store) {
            Ok(block) => block,
            Err(e) => {
                if fresh_indirect {
                    // an indirect block without pointers must not stay recorded
                    self.allocator
                        .free_block(&mut self.store, inode.indirect_block)?;
                    inode.indirect_block = 0;
                    inode.block_count -= 1;
                }
                return Err(e);
            }
        };
        self.write_pointer(
            inode.indirect_block,
            (index - DIRECT_POINTERS_U64) as usize,
            block,
        )?;
        inode.block_count += 1;
        Ok((block, true))
    }

    fn read_pointer(&self, indirect: BlockId, slot: usize) -> FsResult<BlockId> {
        let mut block = block_buf();
        self.store.read_block(indirect, &mut block)?;
        let at = slot * POINTER_SIZE;
        let mut raw = [0u8; POINTER_SIZE];
        raw.copy_from_slice(&block[at..at + POINTER_SIZE]);
        Ok(BlockId::from_le_bytes(raw))
    }

    fn write_pointer(&mut self, indirect: BlockId, slot: usize, pointer: BlockId) -> FsResult<()> {
        let mut block = block_buf();
        self.store.read_block(indirect, &mut block)?;
        let at = slot * POINTER_SIZE;
        block[at..at + POINTER_SIZE].copy_from_slice(&pointer.to_le_bytes());
        self.store.write_block(indirect, &block)
    }

    /// allocated pointers of an indirect block
    fn read_indirect_block(&self, indirect: BlockId) -> FsResult<Vec<BlockId>> {
        let mut block = block_buf();
        self.store.read_block(indirect, &mut block)?;
        Ok(block
            .chunks_exact(POINTER_SIZE)
            .map(|raw| BlockId::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            .filter(|b| *b != 0)
            .collect())
    }
}

/// read and write data in the filesystem
impl<B: Backing> FlatFs<B> {
    /// read up to `buf.len()` bytes of `inode` starting at `offset`
    ///
    /// unallocated blocks inside the file read as zeros
    pub(crate) fn read_at(&self, inode: &Inode, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let should_read = (buf.len() as u64).min(inode.file_size.saturating_sub(offset)) as usize;
        let mut total_read = 0;
        let mut block = block_buf();
        while total_read < should_read {
            let pos = offset + total_read as u64;
            let offset_in_block = (pos % BLOCK_SIZE_U64) as usize;
            let len = (BLOCK_SIZE as usize - offset_in_block).min(should_read - total_read);
            let dest = &mut buf[total_read..total_read + len];
            match self.find_data_block(inode, pos / BLOCK_SIZE_U64)? {
                Some(block_index) => {
                    self.store.read_block(block_index, &mut block)?;
                    dest.copy_from_slice(&block[offset_in_block..offset_in_block + len]);
                }
                // a hole
                None => dest.fill(0),
            }
            total_read += len;
        }
        Ok(total_read)
    }

    /// write `data` into `inode` starting at `offset`, growing the file as needed
    ///
    /// when space runs out part way the bytes already written are kept and
    /// counted; the call only fails if nothing at all could be written.
    /// `inode` is saved in every case
    pub(crate) fn write_at(
        &mut self,
        inode: &mut Inode,
        offset: u64,
        data: &[u8],
    ) -> FsResult<usize> {
        let mut total_wrote = 0;
        let mut failure = None;
        let mut block = block_buf();
        while total_wrote < data.len() {
            let pos = offset + total_wrote as u64;
            let offset_in_block = (pos % BLOCK_SIZE_U64) as usize;
            let len = (BLOCK_SIZE as usize - offset_in_block).min(data.len() - total_wrote);
            let chunk = &data[total_wrote..total_wrote + len];

            let (block_index, fresh) = match self.map_data_block(inode, pos / BLOCK_SIZE_U64) {
                Ok(mapped) => mapped,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            if fresh {
                // a new block may hold anything a freed file left behind
                block.fill(0);
            } else if len < BLOCK_SIZE as usize {
                if let Err(e) = self.store.read_block(block_index, &mut block) {
                    failure = Some(e);
                    break;
                }
            }
            block[offset_in_block..offset_in_block + len].copy_from_slice(chunk);
            if let Err(e) = self.store.write_block(block_index, &block) {
                failure = Some(e);
                break;
            }
            total_wrote += len;
        }

        if total_wrote > 0 {
            inode.adjust_size(offset + total_wrote as u64);
        }
        self.save_inode(inode)?;
        match failure {
            Some(e) if total_wrote == 0 => Err(e),
            Some(e) => {
                debug!(
                    "short write to inode {}: {total_wrote} of {} bytes ({e})",
                    inode.inode_number,
                    data.len()
                );
                Ok(total_wrote)
            }
            None => Ok(total_wrote),
        }
    }
}
