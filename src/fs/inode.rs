use serde::{Deserialize, Serialize};

use crate::utils::{
    self,
    traits::{DigestInSelf, SerializeAndDigest},
};

use super::{
    filekind::FileKind, BlockId, FsError, FsResult, InodeId, DIRECT_POINTERS,
    INODE_SIZE, MAX_NAME_LEN,
};

/// one record of the inode table
///
/// a directory has no data blocks of its own: its children form a
/// singly-linked list threaded through `first_child` and `next_sibling`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Inode {
    pub inode_number: InodeId,
    pub file_kind: FileKind,
    pub name: String,
    /// bytes, always zero for directories
    pub file_size: u64,
    /// blocks held by this inode, the indirect block included
    pub block_count: u32,
    /// `0` marks an unallocated pointer, block 0 is the superblock
    pub direct_blocks: [BlockId; DIRECT_POINTERS as usize],
    pub indirect_block: BlockId,
    pub first_child: Option<InodeId>,
    pub next_sibling: Option<InodeId>,
    pub digest: [u8; 32],
}

/// This block is about digest and verify digest
impl DigestInSelf for Inode {
    fn digest(&mut self) -> FsResult<()> {
        self.digest = [0u8; 32];
        self.digest = utils::digest::digest(&self)?;
        Ok(())
    }

    fn verify_digest(&mut self) -> FsResult<bool> {
        let current_digest = self.digest;
        self.digest = [0u8; 32];
        let ok = current_digest == utils::digest::digest(&self)?;
        self.digest = current_digest;
        Ok(ok)
    }
}
// This block is about serialization and deserialization
impl SerializeAndDigest for Inode {}

impl Inode {
    pub fn new(index: InodeId, file_kind: impl Into<FileKind>, name: impl Into<String>) -> Self {
        Inode {
            inode_number: index,
            file_kind: file_kind.into(),
            name: name.into(),
            // don't calculate digest and other fields now
            ..Inode::default()
        }
    }

    pub fn is_regular_file(&self) -> bool {
        self.file_kind == FileKind::RegularFile
    }

    pub fn is_dir(&self) -> bool {
        self.file_kind == FileKind::Directory
    }
}

/// This block is about the block pointers of a file
impl Inode {
    /// allocated direct blocks, in file order
    pub fn direct_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.direct_blocks.iter().copied().filter(|x| *x != 0)
    }

    pub fn find_direct_block(&self, index: usize) -> Option<BlockId> {
        self.direct_blocks.get(index).copied().filter(|x| *x != 0)
    }

    pub fn add_block(&mut self, block: BlockId, index: usize) -> FsResult<()> {
        let slot = self
            .direct_blocks
            .get_mut(index)
            .ok_or_else(|| FsError::InvalidArgument(format!("no direct pointer {index}")))?;
        *slot = block;
        self.block_count += 1;
        Ok(())
    }

    /// grow the file to at least `len` bytes
    pub fn adjust_size(&mut self, len: u64) {
        self.file_size = self.file_size.max(len);
    }
}

/// the metadata handed to callers by `stat` and friends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stat {
    pub inode_number: InodeId,
    pub kind: FileKind,
    pub size: u64,
    /// blocks held, the indirect block included
    pub blocks: u32,
    /// name inside the parent directory, empty for the root
    pub name: String,
}

impl From<&Inode> for Stat {
    fn from(inode: &Inode) -> Self {
        Stat {
            inode_number: inode.inode_number,
            kind: inode.file_kind,
            size: inode.file_size,
            blocks: inode.block_count,
            name: inode.name.clone(),
        }
    }
}

/// check that `name` can be stored as one directory entry
pub fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(FsError::InvalidArgument(format!("invalid name {name:?}")));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(FsError::InvalidArgument(format!(
            "name {name:?} contains a separator or NUL"
        )));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FsError::InvalidArgument(format!(
            "name is {} bytes, the limit is {MAX_NAME_LEN}",
            name.len()
        )));
    }
    Ok(())
}

impl Inode {
    /// Get the size of the largest possible inode on disk
    /// #Example
    /// ```
    /// use flatfs::{Inode, INODE_SIZE};
    /// assert!(Inode::max_inode_size_in_disk() <= INODE_SIZE as usize);
    /// ```
    pub fn max_inode_size_in_disk() -> usize {
        let mut inode = Inode::new(u32::MAX, FileKind::Directory, "x".repeat(MAX_NAME_LEN));
        inode.first_child = Some(u32::MAX);
        inode.next_sibling = Some(u32::MAX);
        let mut slot = [0u8; INODE_SIZE as usize];
        inode
            .serialize_into_slot(&mut slot)
            .unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inode_fits_in_slot() {
        assert!(Inode::max_inode_size_in_disk() <= INODE_SIZE as usize);
    }

    #[test]
    fn test_inode_slot_serialization() {
        let mut inode = Inode::new(5, FileKind::RegularFile, "notes.txt");
        inode.file_size = 1000;
        inode.add_block(42, 0).unwrap();
        inode.add_block(43, 1).unwrap();
        inode.next_sibling = Some(2);

        let mut slot = [0xffu8; INODE_SIZE as usize];
        let used = inode.serialize_into_slot(&mut slot).unwrap();
        assert!(slot[used..].iter().all(|b| *b == 0));

        let (decoded, _) = <Inode as SerializeAndDigest>::deserialize(&slot).unwrap();
        assert_eq!(decoded, inode);
        assert_eq!(decoded.direct_blocks().collect::<Vec<_>>(), vec![42, 43]);
        assert_eq!(decoded.block_count, 2);
    }

    #[test]
    fn test_tampered_inode_is_rejected() {
        let mut inode = Inode::new(1, FileKind::Directory, "docs");
        let mut slot = [0u8; INODE_SIZE as usize];
        inode.serialize_into_slot(&mut slot).unwrap();
        // the name bytes start after id(4) + kind(4) + length(8)
        slot[16] = b'D';
        assert!(matches!(
            <Inode as SerializeAndDigest>::deserialize(&slot),
            Err(FsError::Corrupted(_))
        ));
    }

    #[test]
    fn test_find_direct_block() {
        let mut inode = Inode::new(1, FileKind::RegularFile, "a");
        assert_eq!(inode.find_direct_block(0), None);
        inode.add_block(17, 3).unwrap();
        assert_eq!(inode.find_direct_block(3), Some(17));
        assert_eq!(inode.find_direct_block(12), None);
        assert!(inode.add_block(18, 12).is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("a.txt").is_ok());
        assert!(validate_name(&"n".repeat(MAX_NAME_LEN)).is_ok());
        assert!(validate_name(&"n".repeat(MAX_NAME_LEN + 1)).is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("..").is_err());
    }

    #[test]
    fn test_stat_from_inode() {
        let mut inode = Inode::new(9, FileKind::RegularFile, "f");
        inode.file_size = 3;
        let stat = Stat::from(&inode);
        assert_eq!(stat.inode_number, 9);
        assert_eq!(stat.kind, FileKind::RegularFile);
        assert_eq!(stat.size, 3);
        assert_eq!(stat.name, "f");
    }
}
