//! The directory layer: packed 64-byte name/inode entries inside a
//! directory inode's data blocks.
//!
//! Lookups, insertions, and deletions are linear scans over the slot
//! array. Deletion only zeroes the slot, so a directory never shrinks; a
//! long-lived directory's on-disk size overstates its live entry count,
//! and insertion reuses the first cleared slot before growing.

use log::debug;
use zerocopy::{FromBytes, IntoBytes};

use crate::disk_layout::{DirEntry, Inode, DIRENT_SIZE, ENTRIES_PER_BLOCK, NAME_LEN};
use crate::fs::NanoFs;
use crate::types::{bytes_to_blocks, BLOCK_SIZE};
use crate::FsError;

/// Number of entry slots the directory can currently hold.
pub(crate) fn max_entries(node: &Inode) -> u32 {
    bytes_to_blocks(node.size) * ENTRIES_PER_BLOCK as u32
}

impl NanoFs {
    /// Reads entry `idx`, following the directory's block pointers.
    /// `None` once the slot index runs past the mapped blocks.
    fn dir_entry(&self, node: &Inode, idx: u32) -> Option<DirEntry> {
        let bnum = self.inode_bnum(node, idx / ENTRIES_PER_BLOCK as u32)?;
        let at = (idx as usize % ENTRIES_PER_BLOCK) * DIRENT_SIZE;
        let block = self.image.block(bnum);
        Some(DirEntry::read_from_bytes(&block[at..at + DIRENT_SIZE]).unwrap())
    }

    /// Overwrites slot `idx` with `entry`.
    fn put_dir_entry(&mut self, node: &Inode, idx: u32, entry: &DirEntry) -> Result<(), FsError> {
        let bnum = self
            .inode_bnum(node, idx / ENTRIES_PER_BLOCK as u32)
            .ok_or(FsError::NoSpace)?;
        let at = (idx as usize % ENTRIES_PER_BLOCK) * DIRENT_SIZE;
        let block = self.image.block_mut(bnum);
        block[at..at + DIRENT_SIZE].copy_from_slice(entry.as_bytes());
        Ok(())
    }

    /// Finds `name` in the directory; the first matching live entry wins.
    pub(crate) fn dir_lookup(&self, node: &Inode, name: &str) -> Option<u32> {
        for idx in 0..max_entries(node) {
            let entry = self.dir_entry(node, idx)?;
            if entry.matches(name) {
                return Some(entry.inum);
            }
        }
        None
    }

    /// Inserts `name -> inum`, reusing the first empty slot or growing the
    /// directory by exactly one block when every slot is live.
    pub(crate) fn dir_put(&mut self, dir_ino: u32, name: &str, inum: u32) -> Result<(), FsError> {
        if name.is_empty() || name.bytes().any(|b| b == 0) {
            return Err(FsError::InvalidArgument);
        }
        if name.len() >= NAME_LEN {
            return Err(FsError::NameTooLong);
        }

        let node = self.inode(dir_ino)?;
        let slots = max_entries(&node);
        let entry = DirEntry::new(name, inum);
        for idx in 0..slots {
            let Some(existing) = self.dir_entry(&node, idx) else {
                break;
            };
            if existing.is_empty() {
                self.put_dir_entry(&node, idx, &entry)?;
                debug!("dir_put: {name} -> {inum} at slot {idx}");
                return Ok(());
            }
        }

        // Every slot is live: extend by one block and take its first slot.
        self.grow_inode(dir_ino, node.size + BLOCK_SIZE as u32)?;
        let node = self.inode(dir_ino)?;
        self.put_dir_entry(&node, slots, &entry)?;
        debug!("dir_put: {name} -> {inum} at slot {slots} (grew directory)");
        Ok(())
    }

    /// Removes `name`, zeroing its whole slot. The directory keeps its
    /// size.
    pub(crate) fn dir_delete(&mut self, dir_ino: u32, name: &str) -> Result<(), FsError> {
        let node = self.inode(dir_ino)?;
        for idx in 0..max_entries(&node) {
            let Some(entry) = self.dir_entry(&node, idx) else {
                break;
            };
            if entry.matches(name) {
                self.put_dir_entry(&node, idx, &DirEntry::default())?;
                debug!("dir_delete: {name} (was -> {})", entry.inum);
                return Ok(());
            }
        }
        Err(FsError::NotFound)
    }

    /// Collects the live entry names in slot order.
    pub(crate) fn dir_names(&self, node: &Inode) -> Vec<String> {
        let mut names = Vec::new();
        for idx in 0..max_entries(node) {
            let Some(entry) = self.dir_entry(node, idx) else {
                break;
            };
            if !entry.is_empty() {
                names.push(String::from_utf8_lossy(entry.name_bytes()).into_owned());
            }
        }
        names
    }
}
