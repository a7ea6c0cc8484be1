//! The inode table in block 1: record lifecycle and block-pointer
//! arithmetic.
//!
//! An inode addresses its data through one direct pointer plus a single
//! indirect block, so logical file block `k` lives at:
//!
//! - `k == 0` — `node.block`;
//! - `k >= 1` — entry `k - 1` of the block named by `node.indirect`.
//!
//! All index arithmetic for that scheme is kept here; the layers above
//! deal only in logical block numbers.

use log::debug;
use zerocopy::{FromBytes, IntoBytes};

use crate::disk_layout::{Inode, INODE_SIZE};
use crate::fs::NanoFs;
use crate::types::{
    bytes_to_blocks, now, process_gid, process_uid, BLOCK_SIZE, INDIRECT_ENTRIES, INODE_COUNT,
    INODE_TABLE_BLOCK, MAX_FILE_BLOCKS, ROOT_INO,
};
use crate::FsError;

/// Reads entry `idx` of an indirect table block.
pub(crate) fn indirect_get(block: &[u8; BLOCK_SIZE], idx: usize) -> u32 {
    let at = idx * 4;
    u32::from_ne_bytes(block[at..at + 4].try_into().unwrap())
}

/// Writes entry `idx` of an indirect table block.
pub(crate) fn indirect_set(block: &mut [u8; BLOCK_SIZE], idx: usize, bno: u32) {
    let at = idx * 4;
    block[at..at + 4].copy_from_slice(&bno.to_ne_bytes());
}

impl NanoFs {
    /// Reads inode record `ino` out of the table.
    pub(crate) fn inode(&self, ino: u32) -> Result<Inode, FsError> {
        if ino as usize >= INODE_COUNT {
            return Err(FsError::NotFound);
        }
        let at = ino as usize * INODE_SIZE;
        let table = self.image.block(INODE_TABLE_BLOCK);
        Ok(Inode::read_from_bytes(&table[at..at + INODE_SIZE]).unwrap())
    }

    /// Writes `node` back to slot `ino` of the table.
    pub(crate) fn put_inode(&mut self, ino: u32, node: &Inode) {
        debug_assert!((ino as usize) < INODE_COUNT);
        let at = ino as usize * INODE_SIZE;
        let table = self.image.block_mut(INODE_TABLE_BLOCK);
        table[at..at + INODE_SIZE].copy_from_slice(node.as_bytes());
    }

    /// Allocates the lowest free inode.
    ///
    /// The record starts zeroed with `refs = 1`, owner ids of the calling
    /// process, and both timestamps set to now. `mode` is left 0 for the
    /// caller to fill in.
    pub(crate) fn alloc_inode(&mut self) -> Result<u32, FsError> {
        use crate::bitmap::{bitmap_get, bitmap_put};

        let mut found = None;
        {
            let bits = self.inode_bitmap_mut();
            for ino in 0..INODE_COUNT {
                if !bitmap_get(bits, ino) {
                    bitmap_put(bits, ino, true);
                    found = Some(ino as u32);
                    break;
                }
            }
        }
        let ino = found.ok_or(FsError::NoSpace)?;
        let t = now();
        let node = Inode {
            refs: 1,
            mode: 0,
            size: 0,
            block: 0,
            indirect: 0,
            atime: t,
            mtime: t,
            uid: process_uid(),
            gid: process_gid(),
        };
        self.put_inode(ino, &node);
        debug!("alloc_inode -> {ino}");
        Ok(ino)
    }

    /// Releases `ino`: the direct block, every live indirect entry, the
    /// indirect block itself, then the record and its bitmap bit.
    ///
    /// The root inode is never freed; callers uphold that.
    pub(crate) fn free_inode(&mut self, ino: u32) -> Result<(), FsError> {
        use crate::bitmap::bitmap_put;

        debug_assert!(ino != ROOT_INO);
        let node = self.inode(ino)?;
        debug!("free_inode({ino})");

        if node.block != 0 {
            self.free_block(node.block);
        }
        if node.indirect != 0 {
            let used = bytes_to_blocks(node.size).saturating_sub(1) as usize;
            for idx in 0..used.min(INDIRECT_ENTRIES) {
                let bno = indirect_get(self.image.block(node.indirect), idx);
                if bno != 0 {
                    self.free_block(bno);
                }
            }
            self.free_block(node.indirect);
        }

        self.put_inode(ino, &Inode::default());
        bitmap_put(self.inode_bitmap_mut(), ino as usize, false);
        Ok(())
    }

    /// Maps logical file block `k` of `node` to its image block number, or
    /// `None` when unallocated or past the addressable range.
    pub(crate) fn inode_bnum(&self, node: &Inode, k: u32) -> Option<u32> {
        if k == 0 {
            return (node.block != 0).then_some(node.block);
        }
        if node.indirect == 0 {
            return None;
        }
        let idx = (k - 1) as usize;
        if idx >= INDIRECT_ENTRIES {
            return None;
        }
        let bno = indirect_get(self.image.block(node.indirect), idx);
        (bno != 0).then_some(bno)
    }

    /// Grows `ino` to `new_size` bytes, attaching zero-filled blocks one
    /// logical index at a time. The indirect block is allocated and zeroed
    /// the first time logical block 1 is placed.
    ///
    /// On allocation failure the blocks attached by this call are released
    /// again and the on-disk record keeps its old pointers and size; only
    /// a fully placed growth commits `size` and `mtime`.
    pub(crate) fn grow_inode(&mut self, ino: u32, new_size: u32) -> Result<(), FsError> {
        let mut node = self.inode(ino)?;
        debug_assert!(new_size >= node.size);
        let current = bytes_to_blocks(node.size);
        let target = bytes_to_blocks(new_size);
        if target as usize > MAX_FILE_BLOCKS {
            return Err(FsError::NoSpace);
        }

        let had_indirect = node.indirect != 0;
        let mut added: Vec<(u32, u32)> = Vec::new();
        let mut failed = None;

        for k in current..target {
            let bno = match self.alloc_block() {
                Ok(bno) => bno,
                Err(e) => {
                    failed = Some(e);
                    break;
                }
            };
            if k == 0 {
                node.block = bno;
            } else {
                if node.indirect == 0 {
                    match self.alloc_block() {
                        Ok(ib) => node.indirect = ib,
                        Err(e) => {
                            self.free_block(bno);
                            failed = Some(e);
                            break;
                        }
                    }
                }
                indirect_set(self.image.block_mut(node.indirect), (k - 1) as usize, bno);
            }
            added.push((k, bno));
        }

        if let Some(e) = failed {
            for (k, bno) in added {
                if k > 0 && had_indirect {
                    indirect_set(self.image.block_mut(node.indirect), (k - 1) as usize, 0);
                }
                self.free_block(bno);
            }
            if !had_indirect && node.indirect != 0 {
                self.free_block(node.indirect);
            }
            return Err(e);
        }

        debug!("grow_inode({ino}): {current} -> {target} blocks, size {new_size}");
        node.size = new_size;
        node.mtime = now();
        self.put_inode(ino, &node);
        Ok(())
    }

    /// Shrinks `ino` to `new_size` bytes, freeing blocks from the highest
    /// logical index down and zeroing each vacated indirect slot. Once at
    /// most one block remains, the indirect block itself is released.
    ///
    /// Bytes left in the retained final block past `new_size` are not
    /// re-zeroed.
    pub(crate) fn shrink_inode(&mut self, ino: u32, new_size: u32) -> Result<(), FsError> {
        let mut node = self.inode(ino)?;
        debug_assert!(new_size <= node.size);
        let current = bytes_to_blocks(node.size);
        let target = bytes_to_blocks(new_size);
        debug!("shrink_inode({ino}): {current} -> {target} blocks, size {new_size}");

        for k in (target..current).rev() {
            if k == 0 {
                if node.block != 0 {
                    self.free_block(node.block);
                    node.block = 0;
                }
            } else if node.indirect != 0 {
                let idx = (k - 1) as usize;
                let bno = indirect_get(self.image.block(node.indirect), idx);
                if bno != 0 {
                    self.free_block(bno);
                    indirect_set(self.image.block_mut(node.indirect), idx, 0);
                }
            }
        }

        if target <= 1 && node.indirect != 0 {
            self.free_block(node.indirect);
            node.indirect = 0;
        }

        node.size = new_size;
        node.mtime = now();
        self.put_inode(ino, &node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::bitmap_get;
    use crate::fs::testutil::fresh;
    use crate::types::S_IFDIR;

    #[test]
    fn alloc_inode_initializes_the_record() {
        let (mut fs, _path) = fresh();
        let ino = fs.alloc_inode().unwrap();
        assert_eq!(ino, 1); // 0 is the root
        let node = fs.inode(ino).unwrap();
        assert_eq!(node.refs, 1);
        assert_eq!(node.mode, 0);
        assert_eq!(node.size, 0);
        assert_eq!(node.block, 0);
        assert_eq!(node.indirect, 0);
        assert!(node.atime > 0 && node.atime == node.mtime);
        assert!(bitmap_get(fs.inode_bitmap(), 1));
    }

    #[test]
    fn alloc_inode_never_returns_the_root() {
        let (mut fs, _path) = fresh();
        for expect in 1..INODE_COUNT as u32 {
            assert_eq!(fs.alloc_inode().unwrap(), expect);
        }
        assert!(matches!(fs.alloc_inode(), Err(FsError::NoSpace)));
    }

    #[test]
    fn root_is_a_directory_with_one_block() {
        let (fs, _path) = fresh();
        let root = fs.inode(ROOT_INO).unwrap();
        assert_eq!(root.mode, S_IFDIR | 0o755);
        assert_eq!(root.refs, 1);
        assert_eq!(root.size, BLOCK_SIZE as u32);
        assert_eq!(root.block, 2);
        assert_eq!(root.indirect, 0);
    }

    #[test]
    fn out_of_range_inode_is_absent() {
        let (fs, _path) = fresh();
        assert!(matches!(
            fs.inode(INODE_COUNT as u32),
            Err(FsError::NotFound)
        ));
    }

    #[test]
    fn one_block_file_stays_direct() {
        let (mut fs, _path) = fresh();
        let ino = fs.alloc_inode().unwrap();
        fs.grow_inode(ino, BLOCK_SIZE as u32).unwrap();
        let node = fs.inode(ino).unwrap();
        assert_eq!(node.size, BLOCK_SIZE as u32);
        assert_ne!(node.block, 0);
        assert_eq!(node.indirect, 0);
        assert_eq!(fs.inode_bnum(&node, 0), Some(node.block));
        assert_eq!(fs.inode_bnum(&node, 1), None);
    }

    #[test]
    fn byte_4097_brings_in_the_indirect_block() {
        let (mut fs, _path) = fresh();
        let ino = fs.alloc_inode().unwrap();
        fs.grow_inode(ino, BLOCK_SIZE as u32 + 1).unwrap();
        let node = fs.inode(ino).unwrap();
        assert_eq!(node.size, BLOCK_SIZE as u32 + 1);
        assert_ne!(node.block, 0);
        assert_ne!(node.indirect, 0);
        let second = indirect_get(fs.image.block(node.indirect), 0);
        assert_ne!(second, 0);
        assert_eq!(indirect_get(fs.image.block(node.indirect), 1), 0);
        assert_eq!(fs.inode_bnum(&node, 1), Some(second));
    }

    #[test]
    fn grow_commits_size_only_on_success() {
        let (mut fs, _path) = fresh();
        let ino = fs.alloc_inode().unwrap();
        fs.grow_inode(ino, 3 * BLOCK_SIZE as u32).unwrap();

        // Occupy every remaining block but one, then ask for seven more so
        // the allocator fails partway through the growth.
        let mut taken = Vec::new();
        while let Ok(bno) = fs.alloc_block() {
            taken.push(bno);
        }
        fs.free_block(taken.pop().unwrap());

        let before = fs.inode(ino).unwrap();
        let bitmap_before = fs.block_bitmap().to_vec();
        assert!(matches!(
            fs.grow_inode(ino, 10 * BLOCK_SIZE as u32),
            Err(FsError::NoSpace)
        ));
        let after = fs.inode(ino).unwrap();
        assert_eq!(after, before);
        assert_eq!(fs.block_bitmap(), &bitmap_before[..]);
    }

    #[test]
    fn grow_rejects_sizes_past_the_pointer_scheme() {
        let (mut fs, _path) = fresh();
        let ino = fs.alloc_inode().unwrap();
        let too_big = (MAX_FILE_BLOCKS as u32 + 1) * BLOCK_SIZE as u32;
        assert!(matches!(
            fs.grow_inode(ino, too_big),
            Err(FsError::NoSpace)
        ));
    }

    #[test]
    fn shrink_frees_from_the_top_and_drops_the_indirect() {
        let (mut fs, _path) = fresh();
        let ino = fs.alloc_inode().unwrap();
        fs.grow_inode(ino, 3 * BLOCK_SIZE as u32).unwrap();
        let node = fs.inode(ino).unwrap();
        let b1 = fs.inode_bnum(&node, 1).unwrap();
        let b2 = fs.inode_bnum(&node, 2).unwrap();
        let indirect = node.indirect;

        fs.shrink_inode(ino, 100).unwrap();
        let node = fs.inode(ino).unwrap();
        assert_eq!(node.size, 100);
        assert_ne!(node.block, 0);
        assert_eq!(node.indirect, 0);
        assert!(!bitmap_get(fs.block_bitmap(), b1 as usize));
        assert!(!bitmap_get(fs.block_bitmap(), b2 as usize));
        assert!(!bitmap_get(fs.block_bitmap(), indirect as usize));
    }

    #[test]
    fn shrink_to_zero_clears_every_pointer() {
        let (mut fs, _path) = fresh();
        let ino = fs.alloc_inode().unwrap();
        fs.grow_inode(ino, 2 * BLOCK_SIZE as u32).unwrap();
        fs.shrink_inode(ino, 0).unwrap();
        let node = fs.inode(ino).unwrap();
        assert_eq!(node.size, 0);
        assert_eq!(node.block, 0);
        assert_eq!(node.indirect, 0);
    }

    #[test]
    fn free_inode_returns_every_block_and_clears_the_bit() {
        let (mut fs, _path) = fresh();
        let bitmap_before = fs.block_bitmap().to_vec();
        let ino = fs.alloc_inode().unwrap();
        fs.grow_inode(ino, 5 * BLOCK_SIZE as u32).unwrap();
        fs.free_inode(ino).unwrap();

        assert_eq!(fs.block_bitmap(), &bitmap_before[..]);
        assert!(!bitmap_get(fs.inode_bitmap(), ino as usize));
        assert_eq!(fs.inode(ino).unwrap(), Inode::default());
    }

    #[test]
    fn bnum_is_none_past_the_addressable_range() {
        let (mut fs, _path) = fresh();
        let ino = fs.alloc_inode().unwrap();
        fs.grow_inode(ino, 2 * BLOCK_SIZE as u32).unwrap();
        let node = fs.inode(ino).unwrap();
        assert_eq!(fs.inode_bnum(&node, INDIRECT_ENTRIES as u32 + 1), None);
    }
}
