//! The image surface: a fixed-size, memory-mapped backing file divided
//! into 4096-byte blocks.

use std::fs::OpenOptions;
use std::path::Path;

use log::info;
use memmap2::MmapMut;

use crate::types::{BLOCK_COUNT, BLOCK_SIZE, IMAGE_SIZE};
use crate::FsError;

/// A writable view of the 1 MiB image.
///
/// Writes land in the mapping and reach the backing file whenever the host
/// virtual-memory subsystem flushes them; the image offers no stronger
/// durability than that, and no sync API.
pub struct DiskImage {
    map: MmapMut,
}

impl DiskImage {
    /// Opens (or creates) the backing file at `path`, extends it to exactly
    /// [`IMAGE_SIZE`] bytes, and maps it writable.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FsError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;
        file.set_len(IMAGE_SIZE as u64)?;
        // SAFETY: the mapping is private to this process for the lifetime
        // of the filesystem; truncation of the backing file out from under
        // the map is outside the supported usage.
        let map = unsafe { MmapMut::map_mut(&file)? };
        info!(
            "mapped image {} ({BLOCK_COUNT} blocks of {BLOCK_SIZE} bytes)",
            path.as_ref().display()
        );
        Ok(Self { map })
    }

    /// Borrows block `bno` read-only.
    ///
    /// Block numbers come from the allocator and the inode table and are
    /// trusted to be in range; an out-of-range number is a bug and panics.
    pub fn block(&self, bno: u32) -> &[u8; BLOCK_SIZE] {
        let at = bno as usize * BLOCK_SIZE;
        self.map[at..at + BLOCK_SIZE].try_into().unwrap()
    }

    /// Borrows block `bno` writable.
    pub fn block_mut(&mut self, bno: u32) -> &mut [u8; BLOCK_SIZE] {
        let at = bno as usize * BLOCK_SIZE;
        (&mut self.map[at..at + BLOCK_SIZE]).try_into().unwrap()
    }

    /// Zero-fills block `bno`.
    pub fn zero_block(&mut self, bno: u32) {
        self.block_mut(bno).fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn open_sizes_and_zeroes_a_fresh_file() {
        let path = NamedTempFile::new().unwrap().into_temp_path();
        let img = DiskImage::open(&path).unwrap();
        assert!(img.block(0).iter().all(|&b| b == 0));
        assert!(img.block(255).iter().all(|&b| b == 0));
        drop(img);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), IMAGE_SIZE as u64);
    }

    #[test]
    fn writes_are_visible_across_reopen() {
        let path = NamedTempFile::new().unwrap().into_temp_path();
        {
            let mut img = DiskImage::open(&path).unwrap();
            img.block_mut(7)[0..4].copy_from_slice(b"mark");
        }
        let img = DiskImage::open(&path).unwrap();
        assert_eq!(&img.block(7)[0..4], b"mark");
    }

    #[test]
    fn zero_block_clears_contents() {
        let path = NamedTempFile::new().unwrap().into_temp_path();
        let mut img = DiskImage::open(&path).unwrap();
        img.block_mut(3).fill(0xa5);
        img.zero_block(3);
        assert!(img.block(3).iter().all(|&b| b == 0));
    }
}
