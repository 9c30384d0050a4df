//! the directory index
//!
//! Directories own no data blocks. The children of a directory form a
//! singly-linked list: the directory's `first_child` points at the most
//! recently inserted child and every child points at the next older one
//! through `next_sibling`.
use log::debug;

use super::{Backing, FlatFs, FsError, FsResult, Inode, InodeId};

impl<B: Backing> FlatFs<B> {
    pub fn first_child(&self, dir: &Inode) -> Option<InodeId> {
        dir.first_child
    }

    pub fn next_sibling(&self, inode: &Inode) -> Option<InodeId> {
        inode.next_sibling
    }

    /// load every child of `dir`, most recent first
    pub fn children(&self, dir: &Inode) -> FsResult<Vec<Inode>> {
        let mut children = Vec::new();
        let mut next = self.first_child(dir);
        while let Some(id) = next {
            let child = self.find_inode(id)?;
            next = self.next_sibling(&child);
            children.push(child);
        }
        Ok(children)
    }

    /// look `name` up among the children of `dir`
    pub fn find_child(&self, dir: &Inode, name: &str) -> FsResult<Option<Inode>> {
        if !dir.is_dir() {
            return Err(FsError::NotADirectory(dir.name.clone()));
        }
        let mut next = self.first_child(dir);
        while let Some(id) = next {
            let child = self.find_inode(id)?;
            if child.name == name {
                return Ok(Some(child));
            }
            next = self.next_sibling(&child);
        }
        Ok(None)
    }

    /// prepend `child` to the children of `parent` and persist both
    pub(crate) fn insert_child(&mut self, parent: &mut Inode, child: &mut Inode) -> FsResult<()> {
        child.next_sibling = parent.first_child;
        self.save_inode(child)?;
        parent.first_child = Some(child.inode_number);
        self.save_inode(parent)?;
        debug!(
            "linked inode {} under inode {}",
            child.inode_number, parent.inode_number
        );
        Ok(())
    }

    /// unlink `target` from the children of `parent`
    ///
    /// the chain is walked from the head to find the predecessor
    pub(crate) fn remove_child(&mut self, parent: &mut Inode, target: &Inode) -> FsResult<()> {
        if parent.first_child == Some(target.inode_number) {
            parent.first_child = target.next_sibling;
            return self.save_inode(parent);
        }

        let mut next = self.first_child(parent);
        while let Some(id) = next {
            let mut sibling = self.find_inode(id)?;
            if sibling.next_sibling == Some(target.inode_number) {
                sibling.next_sibling = target.next_sibling;
                return self.save_inode(&mut sibling);
            }
            next = self.next_sibling(&sibling);
        }
        Err(FsError::Corrupted(format!(
            "inode {} is not a child of inode {}",
            target.inode_number, parent.inode_number
        )))
    }
}

#[cfg(test)]
mod tests {
    use crate::{mkfs::MkfsOptions, FileKind, FlatFs, ROOT_INODE};

    fn fs_with_children(names: &[&str]) -> FlatFs<Vec<u8>> {
        let mut fs = FlatFs::in_memory(&MkfsOptions::new(64)).unwrap();
        for name in names {
            let mut root = fs.find_inode(ROOT_INODE).unwrap();
            let mut child = fs.new_inode(FileKind::RegularFile, name).unwrap();
            fs.insert_child(&mut root, &mut child).unwrap();
        }
        fs
    }

    fn child_names(fs: &FlatFs<Vec<u8>>) -> Vec<String> {
        let root = fs.find_inode(ROOT_INODE).unwrap();
        fs.children(&root)
            .unwrap()
            .into_iter()
            .map(|child| child.name)
            .collect()
    }

    #[test]
    fn test_insert_prepends() {
        let fs = fs_with_children(&["a", "b", "c"]);
        assert_eq!(child_names(&fs), ["c", "b", "a"]);
    }

    #[test]
    fn test_find_child() {
        let fs = fs_with_children(&["a", "b"]);
        let root = fs.find_inode(ROOT_INODE).unwrap();
        assert_eq!(fs.find_child(&root, "a").unwrap().unwrap().name, "a");
        assert!(fs.find_child(&root, "z").unwrap().is_none());

        let file = fs.find_child(&root, "b").unwrap().unwrap();
        assert!(fs.find_child(&file, "x").is_err());
    }

    #[test]
    fn test_remove_head_middle_and_tail() {
        let mut fs = fs_with_children(&["a", "b", "c", "d"]);
        for (name, left) in [
            ("d", vec!["c", "b", "a"]),
            ("b", vec!["c", "a"]),
            ("a", vec!["c"]),
            ("c", vec![]),
        ] {
            let mut root = fs.find_inode(ROOT_INODE).unwrap();
            let target = fs.find_child(&root, name).unwrap().unwrap();
            fs.remove_child(&mut root, &target).unwrap();
            assert_eq!(child_names(&fs), left);
        }
        let root = fs.find_inode(ROOT_INODE).unwrap();
        assert_eq!(root.first_child, None);
    }

    #[test]
    fn test_remove_stranger_is_an_error() {
        let mut fs = fs_with_children(&["a"]);
        let stranger = fs.new_inode(FileKind::RegularFile, "s").unwrap();
        let mut root = fs.find_inode(ROOT_INODE).unwrap();
        assert!(fs.remove_child(&mut root, &stranger).is_err());
        assert_eq!(child_names(&fs), ["a"]);
    }
}
