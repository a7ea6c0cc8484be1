//! Fixed geometry of the image and small shared helpers.
//!
//! The 1 MiB image size, 4 KiB block size, and 128-inode cap are design
//! parameters, not tunables: changing any of them changes the on-disk
//! format.

use std::time::{SystemTime, UNIX_EPOCH};

/// Size of one block in bytes.
pub const BLOCK_SIZE: usize = 4096;
/// Number of blocks in the image.
pub const BLOCK_COUNT: usize = 256;
/// Total image size in bytes.
pub const IMAGE_SIZE: usize = BLOCK_SIZE * BLOCK_COUNT;
/// Number of records in the inode table.
pub const INODE_COUNT: usize = 128;

/// Block holding the two allocation bitmaps.
pub const BITMAP_BLOCK: u32 = 0;
/// Block holding the inode table.
pub const INODE_TABLE_BLOCK: u32 = 1;
/// Lowest block number the allocator will hand out.
pub const FIRST_DATA_BLOCK: u32 = 2;

/// Inode number of the root directory.
///
/// Because directory entries use inode number 0 to mark an empty slot, the
/// root claims inode 0 at image initialization and the allocator never
/// returns it afterwards.
pub const ROOT_INO: u32 = 0;

/// Entries in an indirect block (u32 block numbers).
pub const INDIRECT_ENTRIES: usize = BLOCK_SIZE / core::mem::size_of::<u32>();
/// Largest number of data blocks a single inode can address: one direct
/// plus a full indirect table.
pub const MAX_FILE_BLOCKS: usize = 1 + INDIRECT_ENTRIES;

/// Directory type bit within `mode`.
pub const S_IFDIR: u16 = 0o040000;
/// Mask of the type bits within `mode`.
pub const S_IFMT: u16 = 0o170000;

/// Number of blocks needed to hold `n` bytes; zero for `n == 0`.
pub fn bytes_to_blocks(n: u32) -> u32 {
    n.div_ceil(BLOCK_SIZE as u32)
}

/// Current wall-clock time in whole seconds, saturating at the u32 range
/// the inode record stores.
pub(crate) fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

/// Real user id of the calling process.
pub(crate) fn process_uid() -> u32 {
    unsafe { libc::getuid() }
}

/// Real group id of the calling process.
pub(crate) fn process_gid() -> u32 {
    unsafe { libc::getgid() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_to_blocks_boundaries() {
        assert_eq!(bytes_to_blocks(0), 0);
        assert_eq!(bytes_to_blocks(1), 1);
        assert_eq!(bytes_to_blocks(4095), 1);
        assert_eq!(bytes_to_blocks(4096), 1);
        assert_eq!(bytes_to_blocks(4097), 2);
        assert_eq!(bytes_to_blocks(8192), 2);
    }
}
