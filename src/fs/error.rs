//! errors of the filesystem engine
//!
//! Every failure of an engine call is one [FsError]. The kinds a caller
//! can observe are fixed by [ErrorKind]; several variants share a kind
//! (a corrupted image and a failed `mmap` are both [ErrorKind::IoError]).
use thiserror::Error;

/// the error kinds observable by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    NotADirectory,
    NotEmpty,
    BadFd,
    NoSpace,
    IoError,
    InvalidArgument,
}

#[derive(Debug, Error)]
pub enum FsError {
    /// a path component or a directory child is missing
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// a non-terminal path component, or the target of a directory
    /// operation, is a regular file
    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// the handle is not open (never opened, closed, or invalidated by unlink)
    #[error("bad file descriptor: {0}")]
    BadFd(i32),

    /// no free block or inode slot, or the file reached its maximum size
    #[error("no space left on device")]
    NoSpace,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// on-disk metadata failed validation
    #[error("corrupted image: {0}")]
    Corrupted(String),

    /// a record could not be encoded into or decoded from its slot
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl FsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::NotADirectory(_) => ErrorKind::NotADirectory,
            Self::NotEmpty(_) => ErrorKind::NotEmpty,
            Self::BadFd(_) => ErrorKind::BadFd,
            Self::NoSpace => ErrorKind::NoSpace,
            Self::Io(_) | Self::Corrupted(_) | Self::Codec(_) => ErrorKind::IoError,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    /// map to the closest POSIX errno
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::AlreadyExists(_) => libc::EEXIST,
            Self::NotADirectory(_) => libc::ENOTDIR,
            Self::NotEmpty(_) => libc::ENOTEMPTY,
            Self::BadFd(_) => libc::EBADF,
            Self::NoSpace => libc::ENOSPC,
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::Corrupted(_) | Self::Codec(_) => libc::EIO,
            Self::InvalidArgument(_) => libc::EINVAL,
        }
    }
}

impl From<bincode::error::EncodeError> for FsError {
    fn from(err: bincode::error::EncodeError) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for FsError {
    fn from(err: bincode::error::DecodeError) -> Self {
        Self::Codec(err.to_string())
    }
}

pub type FsResult<T> = std::result::Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_errno() {
        assert_eq!(FsError::NoSpace.kind(), ErrorKind::NoSpace);
        assert_eq!(FsError::NoSpace.to_errno(), libc::ENOSPC);
        assert_eq!(FsError::BadFd(3).to_errno(), libc::EBADF);
        assert_eq!(
            FsError::Corrupted("bad magic".into()).kind(),
            ErrorKind::IoError
        );
        let io = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(FsError::from(io).to_errno(), libc::EACCES);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            FsError::NotEmpty("/docs".into()).to_string(),
            "directory not empty: /docs"
        );
        assert_eq!(FsError::BadFd(7).to_string(), "bad file descriptor: 7");
    }
}
