//! Path resolver (C7): resolves a `/`-separated absolute path to an
//! inode by walking directories from the root.

use std::path::Path;

use crate::dir;
use crate::error::{Error, Result};
use crate::inode::Inode;
use crate::superblock::Superblock;

/// Resolves `path` to its inode, starting at the filesystem's root.
///
/// Empty path components (so a leading or trailing `/` or a run of
/// `//`) are ignored. Depth is uncapped here; the consistency checker
/// is what enforces a cycle guard.
pub fn resolve(dir: &Path, sb: &Superblock, path: &str) -> Result<Inode> {
    let mut current = Inode::read(dir, sb.root_inode)?;
    for component in path.split('/').filter(|c| !c.is_empty()) {
        if !current.is_dir {
            return Err(Error::NotDir);
        }
        let child_ino = dir::lookup(&current, dir, component)?;
        current = Inode::read(dir, child_ino)?;
    }
    Ok(current)
}

/// Resolves the parent directory and final component name of `path`.
///
/// Fails with [`Error::Invalid`] for the root path itself (it has no
/// parent within the filesystem) and with [`Error::NotDir`] if any
/// intermediate component is not a directory.
pub fn resolve_parent<'p>(dir: &Path, sb: &Superblock, path: &'p str) -> Result<(Inode, &'p str)> {
    let mut components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    let name = components.pop().ok_or(Error::Invalid)?;
    let mut current = Inode::read(dir, sb.root_inode)?;
    for component in components {
        if !current.is_dir {
            return Err(Error::NotDir);
        }
        let child_ino = dir::lookup(&current, dir, component)?;
        current = Inode::read(dir, child_ino)?;
    }
    if !current.is_dir {
        return Err(Error::NotDir);
    }
    Ok((current, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::Bitmap;
    use crate::format;
    use tempfile::tempdir;

    #[test]
    fn resolves_nested_path() {
        let dir = tempdir().unwrap();
        format::mkfs(dir.path(), 32).unwrap();
        let sb = Superblock::read(dir.path()).unwrap();
        let mut bm = Bitmap::read(dir.path(), sb.total_blocks).unwrap();

        let mut root = Inode::read(dir.path(), sb.root_inode).unwrap();
        let child_ino = crate::inode::create_inode(&mut bm, true, dir.path()).unwrap();
        dir::add(&mut bm, &mut root, dir.path(), "sub", child_ino).unwrap();

        let resolved = resolve(dir.path(), &sb, "/sub").unwrap();
        assert_eq!(resolved.ino, child_ino);
        assert!(resolved.is_dir);
    }

    #[test]
    fn resolve_through_non_directory_fails() {
        let dir = tempdir().unwrap();
        format::mkfs(dir.path(), 32).unwrap();
        let sb = Superblock::read(dir.path()).unwrap();
        let mut bm = Bitmap::read(dir.path(), sb.total_blocks).unwrap();

        let mut root = Inode::read(dir.path(), sb.root_inode).unwrap();
        let file_ino = crate::inode::create_inode(&mut bm, false, dir.path()).unwrap();
        dir::add(&mut bm, &mut root, dir.path(), "f", file_ino).unwrap();

        let err = resolve(dir.path(), &sb, "/f/anything").unwrap_err();
        assert!(matches!(err, Error::NotDir));
    }

    #[test]
    fn resolve_parent_splits_final_component() {
        let dir = tempdir().unwrap();
        format::mkfs(dir.path(), 32).unwrap();
        let sb = Superblock::read(dir.path()).unwrap();

        let (parent, name) = resolve_parent(dir.path(), &sb, "/b").unwrap();
        assert_eq!(parent.ino, sb.root_inode);
        assert_eq!(name, "b");
    }
}
