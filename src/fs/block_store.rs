//! raw block access to the backing image
use std::{cell::Cell, fs::OpenOptions, path::Path};

use log::trace;
use memmap2::MmapMut;

use super::{BlockId, FsError, FsResult, BLOCK_SIZE};

const BLOCK_SIZE_USIZE: usize = BLOCK_SIZE as usize;

/// a fixed-length, byte-addressable store an image can live in
pub trait Backing: AsRef<[u8]> + AsMut<[u8]> {
    /// make `len` bytes starting at `offset` durable
    fn sync_range(&mut self, _offset: usize, _len: usize) -> std::io::Result<()> {
        Ok(())
    }
}

impl Backing for MmapMut {
    fn sync_range(&mut self, offset: usize, len: usize) -> std::io::Result<()> {
        self.flush_range(offset, len)
    }
}

/// in-memory images, nothing to sync
impl Backing for Vec<u8> {}

/// block reads and writes since the store was (re)initialized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoCounters {
    pub reads: u64,
    pub writes: u64,
}

/// a block-sized, zeroed buffer
pub fn block_buf() -> Vec<u8> {
    vec![0u8; BLOCK_SIZE_USIZE]
}

#[derive(Debug)]
pub struct BlockStore<B: Backing = MmapMut> {
    inner: B,
    block_count: u32,
    reads: Cell<u64>,
    writes: Cell<u64>,
}

impl BlockStore<MmapMut> {
    /// create a zero-filled image of exactly `block_count` blocks
    ///
    /// fails if something already exists at `path`
    pub fn create<P>(path: P, block_count: u32) -> FsResult<Self>
    where
        P: AsRef<Path>,
    {
        if block_count == 0 {
            return Err(FsError::InvalidArgument("an image needs blocks".into()));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path.as_ref())?;
        // all blocks read as zero after `set_len`
        file.set_len(block_count as u64 * BLOCK_SIZE as u64)?;
        // Safety
        // the image is owned by this process for the lifetime of the mapping,
        // nothing else truncates it underneath us
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self::with_backing(mmap, block_count))
    }

    /// map an existing image
    pub fn open<P>(path: P) -> FsResult<Self>
    where
        P: AsRef<Path>,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        let len = file.metadata()?.len();
        if len == 0 || len % BLOCK_SIZE as u64 != 0 {
            return Err(FsError::Corrupted(format!(
                "image length {len} is not a positive multiple of {BLOCK_SIZE}"
            )));
        }
        let block_count = u32::try_from(len / BLOCK_SIZE as u64)
            .map_err(|_| FsError::Corrupted(format!("image length {len} is too large")))?;
        // Safety: see `create`
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self::with_backing(mmap, block_count))
    }
}

impl BlockStore<Vec<u8>> {
    /// a zero-filled image that only lives in memory
    pub fn in_memory(block_count: u32) -> Self {
        Self::with_backing(
            vec![0u8; block_count as usize * BLOCK_SIZE_USIZE],
            block_count,
        )
    }
}

impl<B: Backing> BlockStore<B> {
    pub fn with_backing(inner: B, block_count: u32) -> Self {
        Self {
            inner,
            block_count,
            reads: Cell::new(0),
            writes: Cell::new(0),
        }
    }

    pub const fn block_count(&self) -> u32 {
        self.block_count
    }

    #[inline]
    fn range(&self, index: BlockId) -> FsResult<std::ops::Range<usize>> {
        if index >= self.block_count {
            return Err(FsError::InvalidArgument(format!(
                "block {index} is out of range (image has {} blocks)",
                self.block_count
            )));
        }
        let start = index as usize * BLOCK_SIZE_USIZE;
        Ok(start..start + BLOCK_SIZE_USIZE)
    }

    /// copy block `index` into `buf`
    pub fn read_block(&self, index: BlockId, buf: &mut [u8]) -> FsResult<()> {
        let range = self.range(index)?;
        if buf.len() != BLOCK_SIZE_USIZE {
            return Err(FsError::InvalidArgument(format!(
                "read buffer holds {} bytes, a block is {BLOCK_SIZE}",
                buf.len()
            )));
        }
        trace!("read block {index}");
        buf.copy_from_slice(&self.inner.as_ref()[range]);
        self.reads.set(self.reads.get() + 1);
        Ok(())
    }

    /// overwrite block `index` with `data` and sync it before returning
    pub fn write_block(&mut self, index: BlockId, data: &[u8]) -> FsResult<()> {
        let range = self.range(index)?;
        if data.len() != BLOCK_SIZE_USIZE {
            return Err(FsError::InvalidArgument(format!(
                "write buffer holds {} bytes, a block is {BLOCK_SIZE}",
                data.len()
            )));
        }
        trace!("write block {index}");
        let offset = range.start;
        self.inner.as_mut()[range].copy_from_slice(data);
        self.inner.sync_range(offset, BLOCK_SIZE_USIZE)?;
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    pub fn counters(&self) -> IoCounters {
        IoCounters {
            reads: self.reads.get(),
            writes: self.writes.get(),
        }
    }

    pub fn reset_counters(&self) {
        self.reads.set(0);
        self.writes.set(0);
    }

    /// get underlying buffer
    pub fn into_inner(self) -> B {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_and_counters() {
        let mut store = BlockStore::in_memory(4);
        let mut data = block_buf();
        data[0] = 7;
        data[511] = 9;
        store.write_block(3, &data).unwrap();

        let mut buf = block_buf();
        store.read_block(3, &mut buf).unwrap();
        assert_eq!(buf, data);
        store.read_block(0, &mut buf).unwrap();
        assert!(buf.iter().all(|b| *b == 0));

        assert_eq!(store.counters(), IoCounters { reads: 2, writes: 1 });
        store.reset_counters();
        assert_eq!(store.counters(), IoCounters::default());
    }

    #[test]
    fn test_out_of_range_blocks_are_rejected() {
        let mut store = BlockStore::in_memory(4);
        let mut buf = block_buf();
        assert!(matches!(
            store.read_block(4, &mut buf),
            Err(FsError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.write_block(100, &buf),
            Err(FsError::InvalidArgument(_))
        ));
        // failed calls are not counted
        assert_eq!(store.counters(), IoCounters::default());
    }

    #[test]
    fn test_create_and_reopen_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.img");
        {
            let mut store = BlockStore::create(&path, 8).unwrap();
            let data = vec![0xabu8; 512];
            store.write_block(5, &data).unwrap();
        }
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8 * 512);
        // an existing file is never clobbered by `create`
        assert!(BlockStore::create(&path, 8).is_err());

        let store = BlockStore::open(&path).unwrap();
        assert_eq!(store.block_count(), 8);
        let mut buf = block_buf();
        store.read_block(5, &mut buf).unwrap();
        assert!(buf.iter().all(|b| *b == 0xab));
    }

    #[test]
    fn test_open_rejects_ragged_images() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragged.img");
        std::fs::write(&path, vec![0u8; 700]).unwrap();
        assert!(matches!(
            BlockStore::open(&path),
            Err(FsError::Corrupted(_))
        ));
    }
}
