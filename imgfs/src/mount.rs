//! Mount facade (C10): the operation table a kernel-to-userspace bridge
//! (e.g. a `fuser`-based binary) drives to expose this filesystem as a
//! mounted hierarchy. The facade owns the two mutable globals of a
//! mounted instance, the in-memory superblock and bitmap, for its
//! lifetime, encapsulating them in a single owning context rather than
//! file-scope state.

use std::path::{Path, PathBuf};

use crate::bitmap::Bitmap;
use crate::dir;
use crate::error::{Error, Result};
use crate::inode::{self, Inode};
use crate::path as pathres;
use crate::superblock::Superblock;

/// Attributes a bridge's `getattr` callback needs.
#[derive(Debug, Clone, Copy)]
pub struct Attr {
    pub ino: u32,
    pub is_dir: bool,
    pub size: u32,
    /// `block_count * 125000 / 512`, the number of 512-byte sectors the
    /// file occupies, the unit POSIX `st_blocks` uses.
    pub blocks_512: u64,
    /// Fixed permission bits: 0o755 for directories, 0o644 for files.
    pub mode: u32,
}

/// Aggregate free-space counters for `statfs`.
#[derive(Debug, Clone, Copy)]
pub struct StatFs {
    pub total_blocks: u32,
    pub free_blocks: u32,
}

/// A mounted filesystem instance. Holds the superblock and bitmap in
/// memory for the lifetime of the mount; every operation persists its
/// changes before returning.
pub struct Mount {
    root: PathBuf,
    sb: Superblock,
    bm: Bitmap,
}

impl Mount {
    /// Mounts the filesystem rooted at host directory `fs_dir`
    /// (`init`).
    pub fn init(fs_dir: &Path) -> Result<Self> {
        let root = fs_dir
            .canonicalize()
            .map_err(Error::Io)?;
        let sb = Superblock::read(&root)?;
        let bm = Bitmap::read(&root, sb.total_blocks)?;
        log::info!("mount: mounted filesystem at {}", root.display());
        Ok(Self { root, sb, bm })
    }

    /// Tears down the mount (`destroy`). No persistent state is held
    /// beyond what every operation already flushed, so this is a no-op
    /// besides logging.
    pub fn destroy(self) {
        log::info!("mount: unmounted filesystem at {}", self.root.display());
    }

    fn resolve(&self, path: &str) -> Result<Inode> {
        pathres::resolve(&self.root, &self.sb, path)
    }

    /// `access`: resolves `path`, returning `Ok(())` if it exists.
    /// Permission bits are fixed and not enforced.
    pub fn access(&self, path: &str) -> Result<()> {
        self.resolve(path).map(|_| ())
    }

    /// `getattr`.
    pub fn getattr(&self, path: &str) -> Result<Attr> {
        let inode = self.resolve(path)?;
        Ok(Self::attr_of(&inode))
    }

    fn attr_of(inode: &Inode) -> Attr {
        Attr {
            ino: inode.ino,
            is_dir: inode.is_dir,
            size: inode.size,
            blocks_512: (inode.block_count as u64 * crate::block::BLOCK_BYTES as u64) / 512,
            mode: if inode.is_dir { 0o755 } else { 0o644 },
        }
    }

    /// `opendir` + `readdir`: lists `.`, `..`, then every occupied entry
    /// of the directory's single block.
    pub fn readdir(&self, path: &str) -> Result<Vec<(String, u32)>> {
        let inode = self.resolve(path)?;
        if !inode.is_dir {
            return Err(Error::NotDir);
        }
        let mut entries = vec![(".".to_string(), inode.ino), ("..".to_string(), inode.ino)];
        entries.extend(dir::list(&inode, &self.root)?);
        Ok(entries)
    }

    /// `mkdir`.
    pub fn mkdir(&mut self, parent_path: &str, name: &str) -> Result<u32> {
        self.create_entry(parent_path, name, true)
    }

    /// `create`: creates a regular file.
    pub fn create(&mut self, parent_path: &str, name: &str) -> Result<u32> {
        self.create_entry(parent_path, name, false)
    }

    fn create_entry(&mut self, parent_path: &str, name: &str, is_dir: bool) -> Result<u32> {
        let mut parent = self.resolve(parent_path)?;
        if !parent.is_dir {
            return Err(Error::NotDir);
        }
        if dir::lookup(&parent, &self.root, name).is_ok() {
            return Err(Error::Exists);
        }
        let child_ino = inode::create_inode(&mut self.bm, is_dir, &self.root)?;
        match dir::add(&mut self.bm, &mut parent, &self.root, name, child_ino) {
            Ok(()) => Ok(child_ino),
            Err(e) => {
                // Roll back the orphaned inode we just created.
                let inode = Inode::read(&self.root, child_ino)?;
                let _ = self.free_inode(inode);
                Err(e)
            }
        }
    }

    /// `rmdir`: fails with [`Error::NotEmpty`] unless the directory has
    /// no occupied entries.
    pub fn rmdir(&mut self, parent_path: &str, name: &str) -> Result<()> {
        let mut parent = self.resolve(parent_path)?;
        let child_ino = dir::lookup(&parent, &self.root, name)?;
        let child = Inode::read(&self.root, child_ino)?;
        if !child.is_dir {
            return Err(Error::NotDir);
        }
        if dir::occupied_count(&child, &self.root)? > 0 {
            return Err(Error::NotEmpty);
        }
        dir::remove(&mut parent, &self.root, name)?;
        self.free_inode(child)?;
        Ok(())
    }

    /// `unlink`: removes a regular file.
    pub fn unlink(&mut self, parent_path: &str, name: &str) -> Result<()> {
        let mut parent = self.resolve(parent_path)?;
        let child_ino = dir::lookup(&parent, &self.root, name)?;
        let child = Inode::read(&self.root, child_ino)?;
        if child.is_dir {
            return Err(Error::IsDir);
        }
        dir::remove(&mut parent, &self.root, name)?;
        self.free_inode(child)?;
        Ok(())
    }

    /// Frees every data block of `inode`, then the inode's own block,
    /// persisting the bitmap once (data blocks, then bitmap, then the
    /// implicit inode-block reclamation).
    fn free_inode(&mut self, inode: Inode) -> Result<()> {
        for &b in &inode.blocks[..inode.block_count as usize] {
            crate::alloc::free_blocks(&mut self.bm, b, 1);
        }
        crate::alloc::free_blocks(&mut self.bm, inode.ino, 1);
        self.bm.write(&self.root)?;
        Ok(())
    }

    /// `read`: reads up to `buf.len()` bytes starting at `offset`,
    /// translating the byte offset into `(block_index, intra_block_offset)`
    /// pairs.
    pub fn read(&self, path: &str, offset: u32, buf: &mut [u8]) -> Result<usize> {
        let inode = self.resolve(path)?;
        if inode.is_dir {
            return Err(Error::IsDir);
        }
        if offset >= inode.size {
            return Ok(0);
        }
        let to_read = buf.len().min((inode.size - offset) as usize);
        let mut done = 0;
        while done < to_read {
            let abs = offset as usize + done;
            let block_idx = abs / crate::block::BLOCK_BYTES;
            let intra = abs % crate::block::BLOCK_BYTES;
            let block_id = inode.blocks[block_idx];
            let chunk = (crate::block::BLOCK_BYTES - intra).min(to_read - done);
            let mut block_buf = vec![0u8; intra + chunk];
            crate::block::read_block(&self.root, block_id, &mut block_buf, intra + chunk)?;
            buf[done..done + chunk].copy_from_slice(&block_buf[intra..intra + chunk]);
            done += chunk;
        }
        Ok(to_read)
    }

    /// `write`: writes `data` at `offset`, growing the file with
    /// [`crate::inode::resize`] if needed, and performing a
    /// read-modify-write for any block the write does not fully cover.
    pub fn write(&mut self, path: &str, offset: u32, data: &[u8]) -> Result<usize> {
        let (parent_path, name) = split_path(path)?;
        let parent = self.resolve(&parent_path)?;
        let child_ino = dir::lookup(&parent, &self.root, &name)?;
        let mut inode = Inode::read(&self.root, child_ino)?;
        if inode.is_dir {
            return Err(Error::IsDir);
        }

        let end = offset
            .checked_add(data.len() as u32)
            .ok_or(Error::Invalid)?;
        if end > inode.size {
            inode::resize(&mut self.bm, &mut inode, end, &self.root)?;
        }

        let mut done = 0;
        while done < data.len() {
            let abs = offset as usize + done;
            let block_idx = abs / crate::block::BLOCK_BYTES;
            let intra = abs % crate::block::BLOCK_BYTES;
            let block_id = inode.blocks[block_idx];
            let chunk = (crate::block::BLOCK_BYTES - intra).min(data.len() - done);

            let mut block_buf = vec![0u8; crate::block::BLOCK_BYTES];
            if intra != 0 || chunk != crate::block::BLOCK_BYTES {
                crate::block::read_block(&self.root, block_id, &mut block_buf, crate::block::BLOCK_BYTES)?;
            }
            block_buf[intra..intra + chunk].copy_from_slice(&data[done..done + chunk]);
            crate::block::write_block(&self.root, block_id, &block_buf, crate::block::BLOCK_BYTES)?;
            done += chunk;
        }

        inode.write(&self.root)?;
        Ok(done)
    }

    /// `lseek`: a pure offset computation with no persistent effect (no
    /// open-file-handle table is modeled).
    pub fn lseek(&self, path: &str, offset: i64, whence: Whence) -> Result<u64> {
        let inode = self.resolve(path)?;
        let base = match whence {
            Whence::Start => 0i64,
            Whence::End => inode.size as i64,
        };
        let result = base + offset;
        if result < 0 {
            return Err(Error::Invalid);
        }
        Ok(result as u64)
    }

    /// `rename`: restricted to renaming within the same parent
    /// directory; cross-directory moves fail with
    /// [`Error::CrossDevice`].
    pub fn rename(&mut self, parent_path: &str, from: &str, to_parent: &str, to: &str) -> Result<()> {
        if parent_path != to_parent {
            return Err(Error::CrossDevice);
        }
        let mut parent = self.resolve(parent_path)?;
        let child_ino = dir::lookup(&parent, &self.root, from)?;
        if dir::lookup(&parent, &self.root, to).is_ok() {
            return Err(Error::Exists);
        }
        dir::remove(&mut parent, &self.root, from)?;
        dir::add(&mut self.bm, &mut parent, &self.root, to, child_ino)?;
        Ok(())
    }

    /// `flush`/`fsync`: every mutating operation above already persists
    /// its state before returning, so there is nothing buffered to
    /// flush; both calls succeed unconditionally.
    pub fn flush(&self, path: &str) -> Result<()> {
        self.access(path)
    }

    pub fn fsync(&self, path: &str) -> Result<()> {
        self.access(path)
    }

    /// `statfs`.
    pub fn statfs(&self) -> StatFs {
        StatFs {
            total_blocks: self.sb.total_blocks,
            free_blocks: self.sb.total_blocks - self.bm.popcount(),
        }
    }
}

/// `lseek`'s reference point.
#[derive(Debug, Clone, Copy)]
pub enum Whence {
    Start,
    End,
}

fn split_path(path: &str) -> Result<(String, String)> {
    let path = path.trim_end_matches('/');
    let idx = path.rfind('/').ok_or(Error::Invalid)?;
    let (parent, name) = path.split_at(idx);
    let parent = if parent.is_empty() { "/" } else { parent };
    let name = &name[1..];
    if name.is_empty() {
        return Err(Error::Invalid);
    }
    Ok((parent.to_string(), name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format;
    use tempfile::tempdir;

    fn mounted(total_blocks: u32) -> (tempfile::TempDir, Mount) {
        let dir = tempdir().unwrap();
        format::mkfs(dir.path(), total_blocks).unwrap();
        let mount = Mount::init(dir.path()).unwrap();
        (dir, mount)
    }

    #[test]
    fn create_write_read_round_trip() {
        let (_dir, mut mount) = mounted(32);
        mount.create("/", "a").unwrap();
        let n = mount.write("/a", 0, b"hello").unwrap();
        assert_eq!(n, 5);
        let mut buf = [0u8; 5];
        let read = mount.read("/a", 0, &mut buf).unwrap();
        assert_eq!(read, 5);
        assert_eq!(&buf, b"hello");

        let attr = mount.getattr("/a").unwrap();
        assert_eq!(attr.size, 5);
        assert_eq!(attr.blocks_512, crate::block::BLOCK_BYTES as u64 / 512);
    }

    #[test]
    fn rmdir_non_empty_then_empty() {
        let (_dir, mut mount) = mounted(32);
        mount.mkdir("/", "d").unwrap();
        mount.create("/d", "f").unwrap();

        let err = mount.rmdir("/", "d").unwrap_err();
        assert!(matches!(err, Error::NotEmpty));

        mount.unlink("/d", "f").unwrap();
        mount.rmdir("/", "d").unwrap();

        let err = mount.access("/d").unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[test]
    fn rename_cross_directory_is_rejected() {
        let (_dir, mut mount) = mounted(32);
        mount.mkdir("/", "a").unwrap();
        mount.mkdir("/", "b").unwrap();
        mount.create("/a", "x").unwrap();

        let err = mount.rename("/a", "x", "/b", "x").unwrap_err();
        assert!(matches!(err, Error::CrossDevice));

        mount.rename("/a", "x", "/a", "y").unwrap();
        let attr_before = mount.getattr("/a/y").unwrap();
        assert!(!attr_before.is_dir);
        let err = mount.access("/a/x").unwrap_err();
        assert!(matches!(err, Error::NotFound));
    }

    #[test]
    fn readdir_lists_dot_and_dotdot_and_entries() {
        let (_dir, mut mount) = mounted(32);
        mount.mkdir("/", "sub").unwrap();
        let entries = mount.readdir("/").unwrap();
        let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"."));
        assert!(names.contains(&".."));
        assert!(names.contains(&"sub"));
    }

    #[test]
    fn statfs_reports_free_blocks() {
        let (_dir, mount) = mounted(16);
        let stats = mount.statfs();
        assert_eq!(stats.total_blocks, 16);
        assert_eq!(stats.free_blocks, 16 - 3); // super, bitmap, root inode
    }

    #[test]
    fn write_past_eof_grows_file() {
        let (_dir, mut mount) = mounted(32);
        mount.create("/", "a").unwrap();
        mount.write("/a", 0, b"abc").unwrap();
        mount.write("/a", 10, b"xyz").unwrap();
        let attr = mount.getattr("/a").unwrap();
        assert_eq!(attr.size, 13);

        let mut buf = [0u8; 13];
        mount.read("/a", 0, &mut buf).unwrap();
        assert_eq!(&buf[0..3], b"abc");
        assert!(buf[3..10].iter().all(|&b| b == 0));
        assert_eq!(&buf[10..13], b"xyz");
    }
}
