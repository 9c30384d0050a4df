use serde::{Deserialize, Serialize};

use crate::utils::{
    digest,
    fs_size_calculator::Geometry,
    time_util::{self, *},
    traits::{DigestInSelf, SerializeAndDigest},
};

use super::{FsError, FsResult, InodeId, BLOCK_SIZE, FS_MAGIC, ROOT_INODE};

/// The superblock of this filesystem, always block 0
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SuperBlock {
    /// magic number
    pub magic: u32,
    /// data block size
    pub block_size: u32,
    /// where the bitmaps, the inode table and the data region live
    pub geometry: Geometry,
    pub root_inode: InodeId,
    pub created_at: TimeDurationStruct,
    pub last_mounted_at: Option<TimeDurationStruct>,
    /// to verify the integrity of this superblock
    /// intend to use a fast secure hash function,like [blake3]
    pub digest: [u8; 32],
}
impl SuperBlock {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            magic: FS_MAGIC,
            block_size: BLOCK_SIZE,
            geometry,
            root_inode: ROOT_INODE,
            created_at: time_util::now(),
            last_mounted_at: None,
            digest: [0u8; 32],
        }
    }

    pub fn update_last_mounted_at(&mut self) {
        self.last_mounted_at = Some(time_util::now());
    }

    /// check a freshly loaded superblock against the image it came from
    pub fn validate(&self, image_blocks: u32, requested_blocks: u32) -> FsResult<()> {
        if self.magic != FS_MAGIC {
            return Err(FsError::Corrupted(format!(
                "bad magic {:#x}, not a flatfs image",
                self.magic
            )));
        }
        if self.block_size != BLOCK_SIZE {
            return Err(FsError::Corrupted(format!(
                "block size {} is not supported",
                self.block_size
            )));
        }
        let recorded = self.geometry.block_count;
        if recorded != image_blocks {
            return Err(FsError::Corrupted(format!(
                "superblock records {recorded} blocks, the image holds {image_blocks}"
            )));
        }
        if recorded != requested_blocks {
            return Err(FsError::Corrupted(format!(
                "image has {recorded} blocks, {requested_blocks} were requested"
            )));
        }
        let expected = Geometry::new(recorded, self.geometry.inode_count)
            .map_err(|e| FsError::Corrupted(e.to_string()))?;
        if expected != self.geometry {
            return Err(FsError::Corrupted(format!(
                "inconsistent geometry {:?}",
                self.geometry
            )));
        }
        if self.root_inode >= self.geometry.inode_count {
            return Err(FsError::Corrupted(format!(
                "root inode {} is out of range",
                self.root_inode
            )));
        }
        Ok(())
    }
}

impl DigestInSelf for SuperBlock {
    fn digest(&mut self) -> FsResult<()> {
        self.digest = [0u8; 32];
        self.digest = digest::digest(self)?;
        Ok(())
    }

    fn verify_digest(&mut self) -> FsResult<bool> {
        // get digest from itself
        let digest = self.digest;
        // clear the digest from struct
        self.digest = [0u8; 32];
        // calulate the digest
        let digest2 = digest::digest(self)?;
        // store the digest back
        self.digest = digest;
        Ok(digest == digest2)
    }
}

impl SerializeAndDigest for SuperBlock {}
