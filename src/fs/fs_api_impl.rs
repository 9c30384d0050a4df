//! handle based operations
use log::debug;

use super::{Backing, Fd, FlatFs, FsError, FsResult, Inode, Stat};

impl<B: Backing> FlatFs<B> {
    /// open the file or directory at `components`, the cursor starts at zero
    pub fn open<S: AsRef<str>>(&mut self, components: &[S]) -> FsResult<Fd> {
        let inode = self.resolve(components)?;
        let fd = self.handles.open(inode.inode_number)?;
        debug!("opened inode {} as fd {fd}", inode.inode_number);
        Ok(fd)
    }

    pub fn close(&mut self, fd: Fd) -> FsResult<()> {
        let file = self.handles.close(fd)?;
        debug!("closed fd {fd} of inode {}", file.inode);
        Ok(())
    }

    /// move the cursor of `fd`, past the end of the file is allowed
    pub fn seek(&mut self, fd: Fd, offset: u64) -> FsResult<()> {
        self.handles.get_mut(fd)?.cursor = offset;
        Ok(())
    }

    /// the inode `fd` is bound to
    fn inode_of(&self, fd: Fd) -> FsResult<Inode> {
        let file = self.handles.get(fd)?;
        self.find_inode(file.inode)
    }

    fn regular_file_of(&self, fd: Fd) -> FsResult<Inode> {
        let inode = self.inode_of(fd)?;
        if !inode.is_regular_file() {
            return Err(FsError::InvalidArgument(format!(
                "fd {fd} is a directory"
            )));
        }
        Ok(inode)
    }

    /// read from the cursor of `fd` into `buf`, returns 0 at the end of the file
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> FsResult<usize> {
        let inode = self.regular_file_of(fd)?;
        let cursor = self.handles.get(fd)?.cursor;
        let read = self.read_at(&inode, cursor, buf)?;
        self.handles.get_mut(fd)?.cursor = cursor + read as u64;
        debug!(
            "read {read} bytes of inode {} at {cursor}",
            inode.inode_number
        );
        Ok(read)
    }

    /// write `data` at the cursor of `fd`
    ///
    /// a short count means space ran out part way
    pub fn write(&mut self, fd: Fd, data: &[u8]) -> FsResult<usize> {
        let mut inode = self.regular_file_of(fd)?;
        if data.is_empty() {
            return Ok(0);
        }
        let cursor = self.handles.get(fd)?.cursor;
        let wrote = self.write_at(&mut inode, cursor, data)?;
        self.handles.get_mut(fd)?.cursor = cursor + wrote as u64;
        debug!(
            "wrote {wrote} bytes to inode {} at {cursor}",
            inode.inode_number
        );
        Ok(wrote)
    }

    pub fn stat<S: AsRef<str>>(&self, components: &[S]) -> FsResult<Stat> {
        self.resolve(components).map(|inode| Stat::from(&inode))
    }

    pub fn fstat(&self, fd: Fd) -> FsResult<Stat> {
        self.inode_of(fd).map(|inode| Stat::from(&inode))
    }

    /// the most recently created child of the directory `fd` is bound to
    pub fn stat_child(&self, fd: Fd) -> FsResult<Stat> {
        let dir = self.inode_of(fd)?;
        if !dir.is_dir() {
            return Err(FsError::NotADirectory(dir.name));
        }
        let child = self
            .first_child(&dir)
            .ok_or_else(|| FsError::NotFound(format!("children of inode {}", dir.inode_number)))?;
        self.find_inode(child).map(|inode| Stat::from(&inode))
    }

    /// the sibling following the inode `fd` is bound to
    pub fn stat_next(&self, fd: Fd) -> FsResult<Stat> {
        let inode = self.inode_of(fd)?;
        let next = self
            .next_sibling(&inode)
            .ok_or_else(|| FsError::NotFound(format!("sibling of inode {}", inode.inode_number)))?;
        self.find_inode(next).map(|inode| Stat::from(&inode))
    }
}
