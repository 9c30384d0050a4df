//! a C-style call surface over [FlatFs]
//!
//! Every call reports success as `bool`, or as a non-negative value with
//! `-1` for failure. The reason of a failure goes to the log.
use std::path::Path;

use log::warn;

use crate::fs::{Fd, FlatFs, FsError, FsResult, Stat};

#[derive(Debug, Default)]
pub struct Vfs {
    fs: Option<FlatFs>,
}

fn report<T>(call: &str, result: FsResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{call} failed ({:?}): {e}", e.kind());
            None
        }
    }
}

impl Vfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// the engine behind this surface, once [init](Self::init) succeeded
    pub fn fs(&self) -> Option<&FlatFs> {
        self.fs.as_ref()
    }

    fn with_fs<T>(&self, call: &str, f: impl FnOnce(&FlatFs) -> FsResult<T>) -> Option<T> {
        let result = match &self.fs {
            Some(fs) => f(fs),
            None => Err(FsError::InvalidArgument("not initialized".into())),
        };
        report(call, result)
    }

    fn with_fs_mut<T>(
        &mut self,
        call: &str,
        f: impl FnOnce(&mut FlatFs) -> FsResult<T>,
    ) -> Option<T> {
        let result = match &mut self.fs {
            Some(fs) => f(fs),
            None => Err(FsError::InvalidArgument("not initialized".into())),
        };
        report(call, result)
    }

    /// open the image at `path`, creating and formatting it when missing
    pub fn init<P: AsRef<Path>>(&mut self, path: P, size: u32) -> bool {
        match report("init", FlatFs::initialize(path, size)) {
            Some(fs) => {
                self.fs = Some(fs);
                true
            }
            None => false,
        }
    }

    pub fn creat(&mut self, path: &[&str], dir: bool) -> bool {
        self.with_fs_mut("creat", |fs| fs.create(path, dir))
            .is_some()
    }

    pub fn open(&mut self, path: &[&str]) -> i32 {
        self.with_fs_mut("open", |fs| fs.open(path))
            .map_or(-1, Fd::as_raw)
    }

    pub fn unlink(&mut self, path: &[&str]) -> bool {
        self.with_fs_mut("unlink", |fs| fs.unlink(path)).is_some()
    }

    pub fn stat(&self, path: &[&str], out: &mut Stat) -> bool {
        self.with_fs("stat", |fs| fs.stat(path))
            .map(|stat| *out = stat)
            .is_some()
    }

    pub fn fstat(&self, fd: i32, out: &mut Stat) -> bool {
        self.with_fs("fstat", |fs| fs.fstat(Fd::from_raw(fd)))
            .map(|stat| *out = stat)
            .is_some()
    }

    pub fn close(&mut self, fd: i32) -> bool {
        self.with_fs_mut("close", |fs| fs.close(Fd::from_raw(fd)))
            .is_some()
    }

    pub fn seek(&mut self, fd: i32, offset: u64) -> bool {
        self.with_fs_mut("seek", |fs| fs.seek(Fd::from_raw(fd), offset))
            .is_some()
    }

    /// read at most `len` bytes into `buf`, `len` is capped to `buf.len()`
    pub fn read(&mut self, fd: i32, buf: &mut [u8], len: usize) -> isize {
        let len = len.min(buf.len());
        self.with_fs_mut("read", |fs| fs.read(Fd::from_raw(fd), &mut buf[..len]))
            .map_or(-1, |read| read as isize)
    }

    /// write at most `len` bytes of `buf`, `len` is capped to `buf.len()`
    pub fn write(&mut self, fd: i32, buf: &[u8], len: usize) -> isize {
        let len = len.min(buf.len());
        self.with_fs_mut("write", |fs| fs.write(Fd::from_raw(fd), &buf[..len]))
            .map_or(-1, |wrote| wrote as isize)
    }

    pub fn stat_next(&self, fd: i32, out: &mut Stat) -> bool {
        self.with_fs("stat_next", |fs| fs.stat_next(Fd::from_raw(fd)))
            .map(|stat| *out = stat)
            .is_some()
    }

    pub fn stat_child(&self, fd: i32, out: &mut Stat) -> bool {
        self.with_fs("stat_child", |fs| fs.stat_child(Fd::from_raw(fd)))
            .map(|stat| *out = stat)
            .is_some()
    }

    /// print usage statistics to standard output
    pub fn pstats(&self) {
        match &self.fs {
            Some(fs) => fs.print_stats(),
            None => warn!("pstats failed: not initialized"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileKind;

    #[test]
    fn test_calls_before_init_fail() {
        let mut vfs = Vfs::new();
        let mut stat = Stat::default();
        assert!(!vfs.creat(&["a"], false));
        assert_eq!(vfs.open(&["a"]), -1);
        assert!(!vfs.stat(&[], &mut stat));
        assert_eq!(vfs.read(0, &mut [0u8; 4], 4), -1);
        assert!(!vfs.close(0));
        vfs.pstats();
    }

    #[test]
    fn test_sentinels() {
        let dir = tempfile::tempdir().unwrap();
        let mut vfs = Vfs::new();
        assert!(vfs.init(dir.path().join("disk.img"), 64));
        assert!(vfs.creat(&["f"], false));
        assert!(!vfs.creat(&["f"], false));
        assert_eq!(vfs.open(&["missing"]), -1);

        let fd = vfs.open(&["f"]);
        assert!(fd >= 0);
        assert_eq!(vfs.write(fd, b"hello world", 5), 5);
        let mut stat = Stat::default();
        assert!(vfs.fstat(fd, &mut stat));
        assert_eq!(stat.size, 5);
        assert_eq!(stat.kind, FileKind::RegularFile);

        assert!(vfs.seek(fd, 0));
        let mut buf = [0u8; 16];
        assert_eq!(vfs.read(fd, &mut buf, 16), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(vfs.read(fd, &mut buf, 16), 0);

        assert!(vfs.close(fd));
        assert!(!vfs.close(fd));
        assert_eq!(vfs.write(fd, b"x", 1), -1);
        assert!(vfs.unlink(&["f"]));
        assert!(!vfs.stat(&["f"], &mut stat));
    }

    #[test]
    fn test_directory_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let mut vfs = Vfs::new();
        assert!(vfs.fs().is_none());
        assert!(vfs.init(dir.path().join("disk.img"), 64));
        assert!(vfs.creat(&["d"], true));
        assert!(vfs.creat(&["d", "A"], false));
        assert!(vfs.creat(&["d", "B"], false));

        let mut stat = Stat::default();
        let d = vfs.open(&["d"]);
        assert!(vfs.stat_child(d, &mut stat));
        assert_eq!(stat.name, "B");
        assert!(vfs.close(d));

        let b = vfs.open(&["d", "B"]);
        assert!(vfs.stat_next(b, &mut stat));
        assert_eq!(stat.name, "A");
        assert!(vfs.close(b));

        let a = vfs.open(&["d", "A"]);
        assert!(!vfs.stat_next(a, &mut stat));
        // a failed call leaves the output untouched
        assert_eq!(stat.name, "A");
        assert!(!vfs.stat_child(a, &mut stat));
        assert_eq!(vfs.fs().unwrap().stats().inodes_used, 4);
    }

    #[test]
    fn test_init_rejects_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("disk.img");
        assert!(Vfs::new().init(&image, 64));
        assert!(!Vfs::new().init(&image, 65));
        assert!(Vfs::new().init(&image, 64));
    }
}
