//! walk paths from the root directory
//!
//! A path is a sequence of components, `[]` being the root itself.
use log::debug;

use super::{
    validate_name, Backing, FileKind, FlatFs, FsError, FsResult, Inode, Stat, ROOT_INODE,
};

/// split a slash separated path into components, `"/a//b/"` gives `["a", "b"]`
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|component| !component.is_empty())
        .map(String::from)
        .collect()
}

fn display_path<S: AsRef<str>>(components: &[S]) -> String {
    let mut path = String::new();
    for component in components {
        path.push('/');
        path.push_str(component.as_ref());
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

impl<B: Backing> FlatFs<B> {
    /// the inode `components` leads to
    pub fn resolve<S: AsRef<str>>(&self, components: &[S]) -> FsResult<Inode> {
        let mut current = self.find_inode(ROOT_INODE)?;
        for (depth, component) in components.iter().enumerate() {
            let name = component.as_ref();
            validate_name(name)?;
            if !current.is_dir() {
                return Err(FsError::NotADirectory(display_path(&components[..depth])));
            }
            current = self
                .find_child(&current, name)?
                .ok_or_else(|| FsError::NotFound(display_path(&components[..=depth])))?;
        }
        Ok(current)
    }

    /// the directory holding the last component, and that component
    fn resolve_parent<'a, S: AsRef<str>>(&self, components: &'a [S]) -> FsResult<(Inode, &'a str)> {
        let Some((last, parents)) = components.split_last() else {
            return Err(FsError::InvalidArgument("the root has no parent".into()));
        };
        let name = last.as_ref();
        validate_name(name)?;
        let parent = self.resolve(parents)?;
        if !parent.is_dir() {
            return Err(FsError::NotADirectory(display_path(parents)));
        }
        Ok((parent, name))
    }

    /// create an empty file or directory at `components`
    pub fn create<S: AsRef<str>>(&mut self, components: &[S], is_dir: bool) -> FsResult<Stat> {
        if components.is_empty() {
            return Err(FsError::AlreadyExists("/".into()));
        }
        let (mut parent, name) = self.resolve_parent(components)?;
        if self.find_child(&parent, name)?.is_some() {
            return Err(FsError::AlreadyExists(display_path(components)));
        }

        let kind = if is_dir {
            FileKind::Directory
        } else {
            FileKind::RegularFile
        };
        let mut inode = self.new_inode(kind, name)?;
        if let Err(e) = self.insert_child(&mut parent, &mut inode) {
            self.allocator
                .free_inode(&mut self.store, inode.inode_number)?;
            return Err(e);
        }
        debug!(
            "created {kind} {} as inode {}",
            display_path(components),
            inode.inode_number
        );
        Ok(Stat::from(&inode))
    }

    /// remove the file or empty directory at `components`
    pub fn unlink<S: AsRef<str>>(&mut self, components: &[S]) -> FsResult<()> {
        if components.is_empty() {
            return Err(FsError::InvalidArgument("cannot unlink the root".into()));
        }
        let (mut parent, name) = self.resolve_parent(components)?;
        let target = self
            .find_child(&parent, name)?
            .ok_or_else(|| FsError::NotFound(display_path(components)))?;
        if target.is_dir() && target.first_child.is_some() {
            return Err(FsError::NotEmpty(display_path(components)));
        }

        self.remove_child(&mut parent, &target)?;
        let closed = self.handles.invalidate_inode(target.inode_number);
        self.release_inode(&target)?;
        debug!(
            "unlinked {} (inode {}), {closed} handles closed",
            display_path(components),
            target.inode_number
        );
        Ok(())
    }
}
