//! Byte-exact on-disk records.
//!
//! Block 0 carries the two allocation bitmaps, block 1 the inode table,
//! and a directory's data blocks hold packed 64-byte entries. Every record
//! here is `#[repr(C)]` with its size pinned by a compile-time assertion,
//! and is moved between image bytes and memory through `zerocopy` casts so
//! stray padding or field reordering cannot creep into the format. Field
//! order is disk order; integers are native-endian, so an image is portable
//! only across runs of the same build.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::types::{BLOCK_COUNT, BLOCK_SIZE, INODE_COUNT, S_IFDIR};

/// Byte offset of the block bitmap inside block 0.
pub const BLOCK_BITMAP_OFFSET: usize = 0;
/// Width of the block bitmap in bytes (one bit per block).
pub const BLOCK_BITMAP_LEN: usize = BLOCK_COUNT / 8;
/// Byte offset of the inode bitmap inside block 0.
pub const INODE_BITMAP_OFFSET: usize = BLOCK_BITMAP_OFFSET + BLOCK_BITMAP_LEN;
/// Width of the inode bitmap in bytes (one bit per inode).
pub const INODE_BITMAP_LEN: usize = INODE_COUNT / 8;

const_assert!(INODE_BITMAP_OFFSET + INODE_BITMAP_LEN <= BLOCK_SIZE);

/// On-disk inode record.
///
/// The record is exactly 32 bytes so the 128-entry table fills block 1
/// with no tail. A record whose `refs` is zero is free; the inode bitmap
/// bit and `refs >= 1` always agree for live inodes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct Inode {
    /// Hard-link count: the number of directory entries naming this inode.
    pub refs: u16,
    /// Type and permission bits; the directory bit is `0o040000`.
    pub mode: u16,
    /// File size in bytes.
    pub size: u32,
    /// Direct data block number; 0 = none.
    pub block: u32,
    /// Single-indirect block number; 0 = none. When nonzero, that block is
    /// a table of u32 data block numbers for logical blocks 1 and up.
    pub indirect: u32,
    /// Last access, seconds since the epoch.
    pub atime: u32,
    /// Last modification, seconds since the epoch.
    pub mtime: u32,
    /// Owner user id captured at allocation.
    pub uid: u32,
    /// Owner group id captured at allocation.
    pub gid: u32,
}

/// Size of one inode record in bytes.
pub const INODE_SIZE: usize = core::mem::size_of::<Inode>();
const_assert!(INODE_SIZE == 32);
const_assert!(INODE_COUNT * INODE_SIZE == BLOCK_SIZE);

impl Inode {
    /// Whether the directory type bit is set.
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFDIR != 0
    }
}

/// Length of the name field of a directory entry, including the
/// terminating NUL; names of up to 47 bytes fit.
pub const NAME_LEN: usize = 48;

/// On-disk directory entry: a name bound to an inode number.
///
/// An entry is empty iff `inum == 0` or the name starts with NUL. Deleting
/// an entry zeroes the whole 64 bytes, so either test finds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct DirEntry {
    /// NUL-terminated name, zero-padded to 48 bytes.
    pub name: [u8; NAME_LEN],
    /// Inode number the name binds; 0 marks an empty slot.
    pub inum: u32,
    /// Reserved; zeroed on write.
    pub _reserved: [u8; 12],
}

/// Size of one directory entry in bytes.
pub const DIRENT_SIZE: usize = core::mem::size_of::<DirEntry>();
/// Directory entries per data block.
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DIRENT_SIZE;

const_assert!(DIRENT_SIZE == 64);
const_assert!(ENTRIES_PER_BLOCK == 64);

impl Default for DirEntry {
    fn default() -> Self {
        DirEntry {
            name: [0; NAME_LEN],
            inum: 0,
            _reserved: [0; 12],
        }
    }
}

impl DirEntry {
    /// Builds a live entry. `name` must already be validated to be
    /// non-empty and shorter than [`NAME_LEN`] bytes.
    pub fn new(name: &str, inum: u32) -> Self {
        let mut entry = DirEntry {
            inum,
            ..DirEntry::default()
        };
        entry.name[..name.len()].copy_from_slice(name.as_bytes());
        entry
    }

    /// Whether this slot holds no live entry.
    pub fn is_empty(&self) -> bool {
        self.inum == 0 || self.name[0] == 0
    }

    /// The name bytes up to the terminating NUL.
    pub fn name_bytes(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        &self.name[..end]
    }

    /// Whether this is a live entry with exactly the given name.
    pub fn matches(&self, name: &str) -> bool {
        !self.is_empty() && self.name_bytes() == name.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_flags() {
        let mut node = Inode::default();
        assert!(!node.is_dir());
        node.mode = S_IFDIR | 0o755;
        assert!(node.is_dir());
        node.mode = 0o100644;
        assert!(!node.is_dir());
    }

    #[test]
    fn dirent_empty_and_match() {
        let empty = DirEntry::default();
        assert!(empty.is_empty());
        assert!(!empty.matches(""));

        let entry = DirEntry::new("hello", 3);
        assert!(!entry.is_empty());
        assert_eq!(entry.name_bytes(), b"hello");
        assert!(entry.matches("hello"));
        assert!(!entry.matches("hell"));
        assert!(!entry.matches("hello2"));

        // inum 0 marks the slot empty even with a name present.
        let stale = DirEntry::new("gone", 0);
        assert!(stale.is_empty());
        assert!(!stale.matches("gone"));
    }

    #[test]
    fn dirent_round_trips_through_bytes() {
        use zerocopy::{FromBytes, IntoBytes};

        let entry = DirEntry::new("a-name", 42);
        let bytes = entry.as_bytes();
        assert_eq!(bytes.len(), DIRENT_SIZE);
        let back = DirEntry::read_from_bytes(bytes).unwrap();
        assert_eq!(back, entry);
    }
}
