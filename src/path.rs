//! Absolute-path resolution over the directory tree.

use crate::fs::NanoFs;
use crate::types::ROOT_INO;
use crate::FsError;

/// The substring after the final `/`, or the whole path if none.
pub(crate) fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(at) => &path[at + 1..],
        None => path,
    }
}

impl NanoFs {
    /// Resolves an absolute path to its inode number.
    ///
    /// Empty components from doubled or trailing slashes are skipped, so
    /// `"/a//b/"` names the same inode as `"/a/b"`. Walking through a
    /// non-directory is [`FsError::NotADirectory`]; a missing component is
    /// [`FsError::NotFound`].
    pub(crate) fn tree_lookup(&self, path: &str) -> Result<u32, FsError> {
        if !path.starts_with('/') {
            return Err(FsError::InvalidArgument);
        }
        let mut ino = ROOT_INO;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let node = self.inode(ino)?;
            if !node.is_dir() {
                return Err(FsError::NotADirectory);
            }
            ino = self
                .dir_lookup(&node, component)
                .ok_or(FsError::NotFound)?;
        }
        Ok(ino)
    }

    /// Resolves the directory that holds the final component of `path`.
    /// The root is its own parent.
    pub(crate) fn tree_lookup_parent(&self, path: &str) -> Result<u32, FsError> {
        if !path.starts_with('/') {
            return Err(FsError::InvalidArgument);
        }
        match path.rfind('/') {
            Some(0) | None => Ok(ROOT_INO),
            Some(at) => self.tree_lookup(&path[..at]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::testutil::fresh;
    use crate::types::S_IFDIR;

    #[test]
    fn basename_cases() {
        assert_eq!(basename("/a"), "a");
        assert_eq!(basename("/a/b/c"), "c");
        assert_eq!(basename("/"), "");
        assert_eq!(basename("plain"), "plain");
    }

    #[test]
    fn root_resolves_to_inode_zero() {
        let (fs, _path) = fresh();
        assert_eq!(fs.tree_lookup("/").unwrap(), ROOT_INO);
        assert_eq!(fs.tree_lookup_parent("/").unwrap(), ROOT_INO);
    }

    #[test]
    fn walks_nested_directories() {
        let (mut fs, _path) = fresh();
        fs.mkdir("/d", 0o755).unwrap();
        fs.mkdir("/d/e", 0o755).unwrap();
        fs.mknod("/d/e/f", 0o100644).unwrap();

        let d = fs.tree_lookup("/d").unwrap();
        let f = fs.tree_lookup("/d/e/f").unwrap();
        assert!(fs.inode(d).unwrap().mode & S_IFDIR != 0);
        assert_eq!(fs.tree_lookup_parent("/d/e/f").unwrap(), fs.tree_lookup("/d/e").unwrap());
        assert_ne!(d, f);
    }

    #[test]
    fn stray_slashes_are_ignored() {
        let (mut fs, _path) = fresh();
        fs.mkdir("/d", 0o755).unwrap();
        fs.mknod("/d/f", 0o100644).unwrap();
        let f = fs.tree_lookup("/d/f").unwrap();
        assert_eq!(fs.tree_lookup("/d//f").unwrap(), f);
        assert_eq!(fs.tree_lookup("/d/f/").unwrap(), f);
        assert_eq!(fs.tree_lookup("//d/f").unwrap(), f);
    }

    #[test]
    fn missing_components_and_bad_shapes() {
        let (mut fs, _path) = fresh();
        fs.mknod("/file", 0o100644).unwrap();
        assert!(matches!(fs.tree_lookup("/nope"), Err(FsError::NotFound)));
        assert!(matches!(
            fs.tree_lookup("/file/child"),
            Err(FsError::NotADirectory)
        ));
        assert!(matches!(
            fs.tree_lookup("relative"),
            Err(FsError::InvalidArgument)
        ));
    }

    #[test]
    fn parent_of_a_top_level_name_is_root() {
        let (fs, _path) = fresh();
        assert_eq!(fs.tree_lookup_parent("/anything").unwrap(), ROOT_INO);
    }
}
