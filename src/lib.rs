//! nanofs — a tiny POSIX-like filesystem persisted in a single 1 MiB image.
//!
//! The image is a fixed 1,048,576-byte file divided into 256 blocks of
//! 4096 bytes:
//!
//! ```text
//! +--------------------+
//! | Block 0            |  block bitmap (32 B) + inode bitmap (16 B)
//! +--------------------+
//! | Block 1            |  inode table: 128 records x 32 B
//! +--------------------+
//! | Blocks 2..255      |  data blocks
//! +--------------------+
//! ```
//!
//! [`NanoFs`] owns the memory-mapped image and exposes a path-indexed
//! operation surface: stat, read, write, truncate, mknod, mkdir, unlink,
//! rmdir, link, rename, chmod, set_time, list. Underneath sit four layers,
//! composed strictly top-down:
//!
//! - the [`path`] resolver, which walks absolute paths from the root inode;
//! - the [`directory`] layer, which packs fixed 64-byte name/inode entries
//!   into a directory inode's data blocks;
//! - the [`inode`] table in block 1, with a direct + single-indirect
//!   block-pointer scheme;
//! - the [`bitmap`] allocator over block 0, which hands out the 254
//!   general-purpose data blocks.
//!
//! The crate is single-threaded by design: every operation runs to
//! completion on the calling thread, and durability is whatever the host's
//! virtual-memory subsystem flushes from the mapping. There is no journal
//! and no sync API.
//!
//! ```no_run
//! use nanofs::NanoFs;
//!
//! let mut fs = NanoFs::open("fs.img")?;
//! fs.mkdir("/notes", 0o755)?;
//! fs.mknod("/notes/today", 0o100644)?;
//! fs.write("/notes/today", b"hello, world", 0)?;
//! # Ok::<(), nanofs::FsError>(())
//! ```

macro_rules! const_assert {
    ($($tt:tt)*) => {
        const _: () = assert!($($tt)*);
    };
}

pub mod bitmap;
pub mod directory;
pub mod disk_layout;
pub mod fs;
pub mod image;
pub mod inode;
pub mod path;
pub mod types;

pub use fs::{Metadata, NanoFs};

use thiserror::Error;

/// Errors surfaced by filesystem operations.
///
/// Every operation either completes or returns one of these; nothing is
/// retried inside the core. Each variant corresponds to one POSIX error
/// number, and [`FsError::errno`] performs the mapping for bridges that
/// must hand a negated errno back to the host kernel.
#[derive(Debug, Error)]
pub enum FsError {
    /// No such file or directory. (ENOENT)
    #[error("no such file or directory")]
    NotFound,
    /// File exists. (EEXIST)
    #[error("file exists")]
    Exists,
    /// Data blocks or inodes are exhausted. (ENOSPC)
    #[error("no space left on image")]
    NoSpace,
    /// A non-directory was named where a directory is required. (ENOTDIR)
    #[error("not a directory")]
    NotADirectory,
    /// Directory not empty. (ENOTEMPTY)
    #[error("directory not empty")]
    NotEmpty,
    /// A directory entry name of 48 bytes or more. (ENAMETOOLONG)
    #[error("name too long")]
    NameTooLong,
    /// Invalid argument, e.g. a relative path or an empty name. (EINVAL)
    #[error("invalid argument")]
    InvalidArgument,
    /// The backing image could not be opened, sized, or mapped. (EIO)
    #[error("image error: {0}")]
    Image(#[from] std::io::Error),
}

impl FsError {
    /// Returns the negated POSIX error number for this error.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => -libc::ENOENT,
            FsError::Exists => -libc::EEXIST,
            FsError::NoSpace => -libc::ENOSPC,
            FsError::NotADirectory => -libc::ENOTDIR,
            FsError::NotEmpty => -libc::ENOTEMPTY,
            FsError::NameTooLong => -libc::ENAMETOOLONG,
            FsError::InvalidArgument => -libc::EINVAL,
            FsError::Image(_) => -libc::EIO,
        }
    }
}
