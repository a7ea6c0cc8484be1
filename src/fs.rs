//! The filesystem context and its path-indexed operation surface.
//!
//! [`NanoFs`] is the single value every operation threads through: it owns
//! the mapped image, and the bitmap, inode, directory, and path layers all
//! hang their methods off it. Operations run to completion on the calling
//! thread; callers serialize.

use log::{debug, info, warn};

use crate::bitmap::{bitmap_get, bitmap_put};
use crate::image::DiskImage;
use crate::path::basename;
use crate::types::{
    now, BITMAP_BLOCK, BLOCK_SIZE, INODE_TABLE_BLOCK, MAX_FILE_BLOCKS, ROOT_INO, S_IFDIR, S_IFMT,
};
use crate::FsError;

/// Metadata returned by [`NanoFs::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    /// Inode number.
    pub ino: u32,
    /// Type and permission bits.
    pub mode: u16,
    /// Hard-link count.
    pub nlink: u16,
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// Size in bytes.
    pub size: u64,
    /// Occupied 512-byte units, `ceil(size / 512)`.
    pub blocks: u64,
    /// Preferred I/O size.
    pub block_size: u32,
    /// Last access, seconds since the epoch.
    pub atime: i64,
    /// Last modification, seconds since the epoch.
    pub mtime: i64,
}

/// A mounted image.
///
/// All state lives in the mapping itself; dropping the value unmaps the
/// image and leaves durability to the host's writeback.
pub struct NanoFs {
    pub(crate) image: DiskImage,
}

impl NanoFs {
    /// Opens the image at `path`, creating and formatting it if it has
    /// never held a filesystem.
    ///
    /// A formatted image carries its two reserved block-bitmap bits and a
    /// root directory at inode 0 with one pre-grown entry block; an image
    /// that already has a root is used as-is.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, FsError> {
        let image = DiskImage::open(path)?;
        let mut fs = NanoFs { image };
        if bitmap_get(fs.inode_bitmap(), ROOT_INO as usize) {
            debug!("image already initialized");
        } else {
            fs.format()?;
        }
        Ok(fs)
    }

    /// Lays down a fresh filesystem: reserved bits, then the root
    /// directory at inode 0.
    fn format(&mut self) -> Result<(), FsError> {
        info!("formatting fresh image");
        {
            let bits = self.block_bitmap_mut();
            bitmap_put(bits, BITMAP_BLOCK as usize, true);
            bitmap_put(bits, INODE_TABLE_BLOCK as usize, true);
        }
        let root = self.alloc_inode()?;
        debug_assert_eq!(root, ROOT_INO);
        let mut node = self.inode(root)?;
        node.mode = S_IFDIR | 0o755;
        self.put_inode(root, &node);
        self.grow_inode(root, BLOCK_SIZE as u32)?;
        Ok(())
    }

    /// Metadata for `path`.
    pub fn stat(&self, path: &str) -> Result<Metadata, FsError> {
        let ino = self.tree_lookup(path)?;
        let node = self.inode(ino)?;
        Ok(Metadata {
            ino,
            mode: node.mode,
            nlink: node.refs,
            uid: node.uid,
            gid: node.gid,
            size: node.size as u64,
            blocks: (node.size as u64).div_ceil(512),
            block_size: BLOCK_SIZE as u32,
            atime: node.atime as i64,
            mtime: node.mtime as i64,
        })
    }

    /// Whether `path` resolves.
    pub fn exists(&self, path: &str) -> bool {
        self.tree_lookup(path).is_ok()
    }

    /// Reads up to `buf.len()` bytes at `offset`, short-reading at the end
    /// of the file. Reading at or past the end returns 0 bytes. Updates
    /// the access time.
    pub fn read(&mut self, path: &str, buf: &mut [u8], offset: u64) -> Result<usize, FsError> {
        let ino = self.tree_lookup(path)?;
        let mut node = self.inode(ino)?;
        if offset >= node.size as u64 {
            return Ok(0);
        }
        let offset = offset as usize;
        let want = buf.len().min(node.size as usize - offset);

        let mut done = 0;
        while done < want {
            let pos = offset + done;
            let k = (pos / BLOCK_SIZE) as u32;
            let in_block = pos % BLOCK_SIZE;
            let Some(bnum) = self.inode_bnum(&node, k) else {
                break;
            };
            let n = (BLOCK_SIZE - in_block).min(want - done);
            buf[done..done + n]
                .copy_from_slice(&self.image.block(bnum)[in_block..in_block + n]);
            done += n;
        }

        node.atime = now();
        self.put_inode(ino, &node);
        Ok(done)
    }

    /// Writes `data` at `offset`, growing the file first when the write
    /// extends past the current size. Returns the number of bytes written,
    /// which falls short only if a block lookup fails mid-copy.
    pub fn write(&mut self, path: &str, data: &[u8], offset: u64) -> Result<usize, FsError> {
        let ino = self.tree_lookup(path)?;
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(FsError::InvalidArgument)?;
        if end > (MAX_FILE_BLOCKS * BLOCK_SIZE) as u64 {
            return Err(FsError::NoSpace);
        }
        if end > self.inode(ino)?.size as u64 {
            self.grow_inode(ino, end as u32)?;
        }

        let mut node = self.inode(ino)?;
        let offset = offset as usize;
        let mut done = 0;
        while done < data.len() {
            let pos = offset + done;
            let k = (pos / BLOCK_SIZE) as u32;
            let in_block = pos % BLOCK_SIZE;
            let Some(bnum) = self.inode_bnum(&node, k) else {
                warn!("write: no block mapped for file block {k}, short write");
                break;
            };
            let n = (BLOCK_SIZE - in_block).min(data.len() - done);
            self.image.block_mut(bnum)[in_block..in_block + n]
                .copy_from_slice(&data[done..done + n]);
            done += n;
        }

        node.mtime = now();
        self.put_inode(ino, &node);
        Ok(done)
    }

    /// Sets the file size, growing with zero-fill or shrinking and freeing
    /// as needed. Equal size is a no-op.
    pub fn truncate(&mut self, path: &str, size: u64) -> Result<(), FsError> {
        let ino = self.tree_lookup(path)?;
        if size > (MAX_FILE_BLOCKS * BLOCK_SIZE) as u64 {
            return Err(FsError::NoSpace);
        }
        let size = size as u32;
        let node = self.inode(ino)?;
        if size > node.size {
            self.grow_inode(ino, size)
        } else if size < node.size {
            self.shrink_inode(ino, size)
        } else {
            Ok(())
        }
    }

    /// Creates a file or directory at `path` with the given mode bits.
    ///
    /// A directory gets one pre-grown block so it can hold entries. If the
    /// parent insert fails, the fresh inode is released again.
    pub fn mknod(&mut self, path: &str, mode: u16) -> Result<(), FsError> {
        if self.tree_lookup(path).is_ok() {
            return Err(FsError::Exists);
        }
        let parent = self.tree_lookup_parent(path)?;
        let name = basename(path);

        let ino = self.alloc_inode()?;
        let mut node = self.inode(ino)?;
        node.mode = mode;
        self.put_inode(ino, &node);

        if mode & S_IFDIR != 0 {
            if let Err(e) = self.grow_inode(ino, BLOCK_SIZE as u32) {
                self.free_inode(ino)?;
                return Err(e);
            }
        }
        if let Err(e) = self.dir_put(parent, name, ino) {
            self.free_inode(ino)?;
            return Err(e);
        }
        debug!("mknod({path}, {mode:o}) -> inode {ino}");
        Ok(())
    }

    /// Creates a directory: [`NanoFs::mknod`] with the directory type bit
    /// forced on.
    pub fn mkdir(&mut self, path: &str, mode: u16) -> Result<(), FsError> {
        self.mknod(path, mode | S_IFDIR)
    }

    /// Removes the directory entry for `path` and drops the link count,
    /// releasing the inode and its blocks when the count reaches zero.
    pub fn unlink(&mut self, path: &str) -> Result<(), FsError> {
        let ino = self.tree_lookup(path)?;
        let parent = self.tree_lookup_parent(path)?;
        self.dir_delete(parent, basename(path))?;

        let mut node = self.inode(ino)?;
        node.refs = node.refs.saturating_sub(1);
        if node.refs == 0 && ino != ROOT_INO {
            self.free_inode(ino)?;
        } else {
            self.put_inode(ino, &node);
        }
        debug!("unlink({path})");
        Ok(())
    }

    /// Removes an empty directory. Any live entry makes it
    /// [`FsError::NotEmpty`].
    pub fn rmdir(&mut self, path: &str) -> Result<(), FsError> {
        let ino = self.tree_lookup(path)?;
        let node = self.inode(ino)?;
        if !node.is_dir() {
            return Err(FsError::NotADirectory);
        }
        if !self.dir_names(&node).is_empty() {
            return Err(FsError::NotEmpty);
        }
        self.unlink(path)
    }

    /// Creates a hard link: a new entry at `to` naming the inode `from`
    /// resolves to.
    pub fn link(&mut self, from: &str, to: &str) -> Result<(), FsError> {
        let ino = self.tree_lookup(from)?;
        if self.tree_lookup(to).is_ok() {
            return Err(FsError::Exists);
        }
        let parent = self.tree_lookup_parent(to)?;
        self.dir_put(parent, basename(to), ino)?;

        let mut node = self.inode(ino)?;
        node.refs += 1;
        self.put_inode(ino, &node);
        debug!("link({from} => {to})");
        Ok(())
    }

    /// Moves `from` to `to`, replacing an existing `to` first. The inode
    /// itself is untouched; only directory entries move.
    ///
    /// Not atomic: the entry is inserted at the destination before the
    /// source entry is removed, and a crash in between leaves both names
    /// live. Both parents' modification times are stamped.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), FsError> {
        let ino = self.tree_lookup(from)?;
        if self.tree_lookup(to).is_ok() {
            self.unlink(to)?;
        }
        let from_parent = self.tree_lookup_parent(from)?;
        let to_parent = self.tree_lookup_parent(to)?;

        self.dir_put(to_parent, basename(to), ino)?;
        self.dir_delete(from_parent, basename(from))?;

        let t = now();
        for parent in [from_parent, to_parent] {
            let mut node = self.inode(parent)?;
            node.mtime = t;
            self.put_inode(parent, &node);
        }
        debug!("rename({from} => {to})");
        Ok(())
    }

    /// Stamps both timestamps, clamped to the on-disk u32 second range.
    pub fn set_time(&mut self, path: &str, atime: i64, mtime: i64) -> Result<(), FsError> {
        let ino = self.tree_lookup(path)?;
        let mut node = self.inode(ino)?;
        node.atime = atime.clamp(0, u32::MAX as i64) as u32;
        node.mtime = mtime.clamp(0, u32::MAX as i64) as u32;
        self.put_inode(ino, &node);
        Ok(())
    }

    /// Replaces the permission bits of `path`, preserving the type bits.
    pub fn chmod(&mut self, path: &str, mode: u16) -> Result<(), FsError> {
        let ino = self.tree_lookup(path)?;
        let mut node = self.inode(ino)?;
        node.mode = (node.mode & S_IFMT) | (mode & !S_IFMT);
        self.put_inode(ino, &node);
        Ok(())
    }

    /// Names of the live entries of the directory at `path`, in slot
    /// order. A missing or non-directory path yields an empty list.
    pub fn list(&self, path: &str) -> Vec<String> {
        let Ok(ino) = self.tree_lookup(path) else {
            return Vec::new();
        };
        let Ok(node) = self.inode(ino) else {
            return Vec::new();
        };
        if !node.is_dir() {
            return Vec::new();
        }
        self.dir_names(&node)
    }
}
