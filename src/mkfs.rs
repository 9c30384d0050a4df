//! create our filesystem
use crate::{
    fs::{FlatFs, FsResult, BLOCK_SIZE},
    utils::fs_size_calculator::{self, Geometry},
};
use anyhow::anyhow;
use byte_unit::Byte;
use std::path::Path;

/// how a fresh image is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MkfsOptions {
    /// total blocks of the image, metadata included
    pub block_count: u32,
    /// inode slots, derived from `block_count` when `None`
    pub inode_count: Option<u32>,
}

impl MkfsOptions {
    pub fn new(block_count: u32) -> Self {
        Self {
            block_count,
            inode_count: None,
        }
    }

    pub fn with_inode_count(mut self, inode_count: u32) -> Self {
        self.inode_count = Some(inode_count);
        self
    }

    pub fn geometry(&self) -> FsResult<Geometry> {
        let inode_count = self
            .inode_count
            .unwrap_or_else(|| fs_size_calculator::default_inode_count(self.block_count));
        Geometry::new(self.block_count, inode_count)
    }
}

/// create a new filesystem image at `image_file_path`
/// # Params
/// - `image_file_path`: the path of the image file, must not exist yet
/// - `options`: block and inode counts
///
/// # Return
/// the geometry that was written
pub fn mkfs<P>(image_file_path: P, options: &MkfsOptions) -> anyhow::Result<Geometry>
where
    P: AsRef<Path>,
{
    let image_file_path = image_file_path.as_ref();
    if image_file_path.exists() {
        return Err(anyhow!(
            "{} already exists, refusing to overwrite it",
            image_file_path.display()
        ));
    }
    // check the geometry before anything touches the disk
    options.geometry().map_err(|e| {
        anyhow!(
            "{e}; {} blocks of {} need room for the metadata",
            options.block_count,
            Byte::from_bytes(BLOCK_SIZE as u128).get_appropriate_unit(true)
        )
    })?;
    let fs = FlatFs::initialize_with(image_file_path, options)?;
    Ok(*fs.geometry())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{FileKind, ROOT_INODE};

    #[test]
    fn test_mkfs() {
        let dir = tempfile::tempdir().unwrap();
        let tmp_file = dir.path().join("new_fs.img");
        let options = MkfsOptions::new(1024).with_inode_count(100);

        let geometry = mkfs(&tmp_file, &options).unwrap();
        assert_eq!(geometry.inode_count, 100);
        assert_eq!(
            std::fs::metadata(&tmp_file).unwrap().len(),
            1024 * BLOCK_SIZE as u64
        );

        let fs = FlatFs::initialize(&tmp_file, 1024).unwrap();
        // test if root inode "/" is created correctly
        let inode = fs.find_inode(ROOT_INODE).unwrap();
        assert_eq!(inode.file_kind, FileKind::Directory);
        assert_eq!(inode.first_child, None);

        // test if superblock is created correctly
        let superblock = fs.superblock();
        assert_eq!(superblock.geometry, geometry);
        assert!(superblock.last_mounted_at.is_some());
        assert_eq!(fs.allocator().free_inodes(), 99);
        assert_eq!(
            fs.allocator().free_blocks() as u32,
            1024 - geometry.metadata_blocks()
        );
    }

    #[test]
    fn test_mkfs_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let tmp_file = dir.path().join("taken.img");
        std::fs::write(&tmp_file, b"precious").unwrap();
        assert!(mkfs(&tmp_file, &MkfsOptions::new(64)).is_err());
        assert_eq!(std::fs::read(&tmp_file).unwrap(), b"precious");
    }

    #[test]
    fn test_mkfs_rejects_tiny_images() {
        let dir = tempfile::tempdir().unwrap();
        let tmp_file = dir.path().join("tiny.img");
        assert!(mkfs(&tmp_file, &MkfsOptions::new(3)).is_err());
        assert!(!tmp_file.exists());
    }
}
