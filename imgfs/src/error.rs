//! The engine's error taxonomy.
//!
//! Every public operation in this crate returns [`Result<T>`], a thin
//! alias over [`Error`]. There is no panicking path for expected
//! conditions: host I/O failures, malformed on-disk structures and
//! resource exhaustion are all ordinary `Err` values, the way the rest
//! of this workspace's binaries propagate `io::Result` with `?` rather
//! than `unwrap`.

use std::io;

/// Convenience alias for a result carrying an engine [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Kinds of failure the engine can report, mirroring a Unix errno
/// taxonomy without depending on a particular OS target.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Any failure from the underlying host I/O (opening, reading or
    /// writing a block image file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A transient buffer could not be allocated.
    #[error("out of memory")]
    NoMemory,
    /// No space for the requested allocation, or a request exceeding the
    /// direct-block budget of an inode.
    #[error("no space left")]
    Full,
    /// A lookup (path component, directory entry) found nothing.
    #[error("not found")]
    NotFound,
    /// Expected a directory, found something else.
    #[error("not a directory")]
    NotDir,
    /// Expected a regular file, found a directory.
    #[error("is a directory")]
    IsDir,
    /// A directory entry with that name already exists.
    #[error("entry exists")]
    Exists,
    /// A directory is not empty and cannot be removed.
    #[error("directory not empty")]
    NotEmpty,
    /// `rename` was asked to move an entry across parent directories.
    #[error("cross-device link")]
    CrossDevice,
    /// The superblock's magic number did not match.
    #[error("bad magic number")]
    BadMagic,
    /// The superblock's `block_size` field was not the expected constant.
    #[error("bad block size")]
    BadBlockSize,
    /// A block image's pixel dimensions were not 1000x1000.
    #[error("bad image dimensions")]
    BadDimensions,
    /// The consistency checker's depth-first walk exceeded its cycle
    /// guard.
    #[error("reference loop detected")]
    Loop,
    /// A malformed argument, such as an empty name or a zero block
    /// count where one is not legal.
    #[error("invalid argument")]
    Invalid,
    /// A byte length exceeds a block's 125,000-byte capacity.
    #[error("length exceeds block capacity")]
    BadLen,
}

impl Error {
    /// Maps this error onto the `libc` errno constant the `mount` bridge
    /// should hand back to the kernel for the corresponding FUSE
    /// callback.
    pub fn as_errno(&self) -> libc::c_int {
        match self {
            Error::Io(_) => libc::EIO,
            Error::NoMemory => libc::ENOMEM,
            Error::Full => libc::ENOSPC,
            Error::NotFound => libc::ENOENT,
            Error::NotDir => libc::ENOTDIR,
            Error::IsDir => libc::EISDIR,
            Error::Exists => libc::EEXIST,
            Error::NotEmpty => libc::ENOTEMPTY,
            Error::CrossDevice => libc::EXDEV,
            Error::BadMagic | Error::BadBlockSize | Error::BadDimensions => libc::EIO,
            Error::Loop => libc::ELOOP,
            Error::Invalid => libc::EINVAL,
            Error::BadLen => libc::EFBIG,
        }
    }
}
