//! The two allocation bitmaps in block 0, and the data-block allocator.
//!
//! Bit `i` set means slot `i` is in use. The bitmaps are views into the
//! mapped image, not copies: every mutation is immediately visible in the
//! on-disk bytes. The bitmap is the sole authority on what is free; no
//! side cache of free slots exists to drift out of sync with it.

use log::debug;

use crate::disk_layout::{
    BLOCK_BITMAP_LEN, BLOCK_BITMAP_OFFSET, INODE_BITMAP_LEN, INODE_BITMAP_OFFSET,
};
use crate::fs::NanoFs;
use crate::types::{BITMAP_BLOCK, BLOCK_COUNT, FIRST_DATA_BLOCK};
use crate::FsError;

/// Reads bit `i` of a bitmap region.
pub fn bitmap_get(bits: &[u8], i: usize) -> bool {
    bits[i / 8] & (1 << (i % 8)) != 0
}

/// Sets bit `i` of a bitmap region to `v`.
pub fn bitmap_put(bits: &mut [u8], i: usize, v: bool) {
    if v {
        bits[i / 8] |= 1 << (i % 8);
    } else {
        bits[i / 8] &= !(1 << (i % 8));
    }
}

impl NanoFs {
    /// The block bitmap: one bit per block, at the head of block 0.
    pub(crate) fn block_bitmap(&self) -> &[u8] {
        &self.image.block(BITMAP_BLOCK)[BLOCK_BITMAP_OFFSET..BLOCK_BITMAP_OFFSET + BLOCK_BITMAP_LEN]
    }

    pub(crate) fn block_bitmap_mut(&mut self) -> &mut [u8] {
        &mut self.image.block_mut(BITMAP_BLOCK)
            [BLOCK_BITMAP_OFFSET..BLOCK_BITMAP_OFFSET + BLOCK_BITMAP_LEN]
    }

    /// The inode bitmap: one bit per inode, right after the block bitmap.
    pub(crate) fn inode_bitmap(&self) -> &[u8] {
        &self.image.block(BITMAP_BLOCK)[INODE_BITMAP_OFFSET..INODE_BITMAP_OFFSET + INODE_BITMAP_LEN]
    }

    pub(crate) fn inode_bitmap_mut(&mut self) -> &mut [u8] {
        &mut self.image.block_mut(BITMAP_BLOCK)
            [INODE_BITMAP_OFFSET..INODE_BITMAP_OFFSET + INODE_BITMAP_LEN]
    }

    /// Allocates the lowest-numbered free data block and zero-fills it.
    ///
    /// Blocks 0 and 1 are reserved; the scan covers `[2, 256)`.
    pub(crate) fn alloc_block(&mut self) -> Result<u32, FsError> {
        let mut found = None;
        {
            let bits = self.block_bitmap_mut();
            for bno in FIRST_DATA_BLOCK..BLOCK_COUNT as u32 {
                if !bitmap_get(bits, bno as usize) {
                    bitmap_put(bits, bno as usize, true);
                    found = Some(bno);
                    break;
                }
            }
        }
        let bno = found.ok_or(FsError::NoSpace)?;
        self.image.zero_block(bno);
        debug!("alloc_block -> {bno}");
        Ok(bno)
    }

    /// Clears the bitmap bit for `bno`. The block contents are left as-is;
    /// a later allocation zero-fills before reuse.
    pub(crate) fn free_block(&mut self, bno: u32) {
        debug_assert!(bno >= FIRST_DATA_BLOCK && (bno as usize) < BLOCK_COUNT);
        bitmap_put(self.block_bitmap_mut(), bno as usize, false);
    }
}
