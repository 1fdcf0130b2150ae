//! `mount` resolves an `imgfs` filesystem directory to an absolute path
//! and hands it to the kernel-to-userspace bridge: a [`fuser`]
//! `Filesystem` implementation that forwards every FUSE callback to
//! [`imgfs::mount::Mount`] (C10).
//!
//! Usage: `mount <fs_dir> <mount_point> [bridge options]`.
//!
//! FUSE addresses files by a 64-bit inode number, reserving `1` for the
//! mount's root, whereas [`imgfs::mount::Mount`]'s facade is addressed
//! by path. [`ImgfsFuse`] bridges the two: it keeps a cache mapping the
//! FUSE inode number handed out for each name the kernel has looked up
//! back to that entry's path, and maps `1` to the engine's own root
//! inode. Every other FUSE inode number is the engine's native inode
//! number verbatim (always `>= 2`, so it never collides with `1`).

use std::collections::HashMap;
use std::env;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::exit;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyLseek, ReplyOpen, ReplyStatfs, ReplyWrite,
    Request,
};
use imgfs::block::BLOCK_BYTES;
use imgfs::mount::{Attr, Mount, Whence};

/// How long the kernel may cache an entry or attribute before asking
/// again. This engine has no concurrent-mount support, so there is
/// nothing invalidating the cache out from under the kernel besides
/// this same process.
const TTL: Duration = Duration::from_secs(1);

/// FUSE's reserved inode number for the mount's root.
const FUSE_ROOT_INO: u64 = 1;

struct ImgfsFuse {
    mount: Mount,
    root_ino: u32,
    /// FUSE inode number -> absolute path, populated as the kernel
    /// looks up names. `FUSE_ROOT_INO` is seeded at `init`.
    paths: HashMap<u64, String>,
}

impl ImgfsFuse {
    fn new(mount: Mount, root_ino: u32) -> Self {
        let mut paths = HashMap::new();
        paths.insert(FUSE_ROOT_INO, "/".to_string());
        Self {
            mount,
            root_ino,
            paths,
        }
    }

    fn native_to_fuse(&self, native_ino: u32) -> u64 {
        if native_ino == self.root_ino {
            FUSE_ROOT_INO
        } else {
            native_ino as u64
        }
    }

    fn path_of(&self, ino: u64) -> Option<&str> {
        self.paths.get(&ino).map(String::as_str)
    }

    fn join(parent: &str, name: &OsStr) -> String {
        let name = name.to_string_lossy();
        if parent == "/" {
            format!("/{name}")
        } else {
            format!("{parent}/{name}")
        }
    }

    fn file_attr(&self, fuse_ino: u64, attr: &Attr) -> FileAttr {
        let now = SystemTime::now();
        FileAttr {
            ino: fuse_ino,
            size: attr.size as u64,
            blocks: attr.blocks_512,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind: if attr.is_dir {
                FileType::Directory
            } else {
                FileType::RegularFile
            },
            perm: attr.mode as u16,
            nlink: 1,
            uid: 0,
            gid: 0,
            rdev: 0,
            blksize: BLOCK_BYTES as u32,
            flags: 0,
        }
    }
}

impl Filesystem for ImgfsFuse {
    fn destroy(&mut self) {
        log::info!("mount: unmounting");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.path_of(parent).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        let child_path = Self::join(&parent_path, name);
        match self.mount.getattr(&child_path) {
            Ok(attr) => {
                let fuse_ino = self.native_to_fuse(attr.ino);
                self.paths.insert(fuse_ino, child_path);
                reply.entry(&TTL, &self.file_attr(fuse_ino, &attr), 0);
            }
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.mount.getattr(&path) {
            Ok(attr) => reply.attr(&TTL, &self.file_attr(ino, &attr)),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        let entries = match self.mount.readdir(&path) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.as_errno());
                return;
            }
        };
        for (i, (name, native_ino)) in entries.into_iter().enumerate().skip(offset as usize) {
            let kind = if name == "." || name == ".." {
                FileType::Directory
            } else {
                match self.mount.getattr(&Self::join(&path, OsStr::new(&name))) {
                    Ok(a) if a.is_dir => FileType::Directory,
                    _ => FileType::RegularFile,
                }
            };
            let fuse_ino = self.native_to_fuse(native_ino);
            if name != "." && name != ".." {
                self.paths
                    .entry(fuse_ino)
                    .or_insert_with(|| Self::join(&path, OsStr::new(&name)));
            }
            if reply.add(fuse_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.path_of(parent).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        let name_str = name.to_string_lossy().into_owned();
        match self.mount.mkdir(&parent_path, &name_str) {
            Ok(native_ino) => {
                let fuse_ino = self.native_to_fuse(native_ino);
                let child_path = Self::join(&parent_path, name);
                self.paths.insert(fuse_ino, child_path.clone());
                let attr = self.mount.getattr(&child_path).unwrap();
                reply.entry(&TTL, &self.file_attr(fuse_ino, &attr), 0);
            }
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(parent_path) = self.path_of(parent).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        let name_str = name.to_string_lossy().into_owned();
        match self.mount.create(&parent_path, &name_str) {
            Ok(native_ino) => {
                let fuse_ino = self.native_to_fuse(native_ino);
                let child_path = Self::join(&parent_path, name);
                self.paths.insert(fuse_ino, child_path.clone());
                let attr = self.mount.getattr(&child_path).unwrap();
                reply.created(&TTL, &self.file_attr(fuse_ino, &attr), 0, 0, 0);
            }
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_of(parent).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        let name_str = name.to_string_lossy();
        match self.mount.rmdir(&parent_path, &name_str) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_of(parent).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        let name_str = name.to_string_lossy();
        match self.mount.unlink(&parent_path, &name_str) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        let mut buf = vec![0u8; size as usize];
        match self.mount.read(&path, offset as u32, &mut buf) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.mount.write(&path, offset as u32, data) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.mount.flush(&path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.mount.fsync(&path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn lseek(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        whence: i32,
        reply: ReplyLseek,
    ) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        let whence = if whence == libc::SEEK_END {
            Whence::End
        } else {
            Whence::Start
        };
        match self.mount.lseek(&path, offset, whence) {
            Ok(result) => reply.offset(result as i64),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(parent_path), Some(newparent_path)) = (
            self.path_of(parent).map(str::to_string),
            self.path_of(newparent).map(str::to_string),
        ) else {
            reply.error(libc::ENOENT);
            return;
        };
        let name_str = name.to_string_lossy();
        let newname_str = newname.to_string_lossy();
        match self
            .mount
            .rename(&parent_path, &name_str, &newparent_path, &newname_str)
        {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, _mask: i32, reply: ReplyEmpty) {
        let Some(path) = self.path_of(ino).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.mount.access(&path) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.as_errno()),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let stats = self.mount.statfs();
        reply.statfs(
            stats.total_blocks as u64,
            stats.free_blocks as u64,
            stats.free_blocks as u64,
            0,
            0,
            BLOCK_BYTES as u32,
            255,
            BLOCK_BYTES as u32,
        );
    }
}

fn print_usage(prog: &str) {
    eprintln!("Usage:");
    eprintln!(" {prog} <fs_dir> <mount_point> [bridge options]");
}

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("mount");

    let (fs_dir, mount_point) = match &args[1..] {
        [fs_dir, mount_point, ..] => (PathBuf::from(fs_dir), PathBuf::from(mount_point)),
        _ => {
            print_usage(prog);
            exit(1);
        }
    };

    let fs_dir = fs_dir.canonicalize().unwrap_or_else(|e| {
        eprintln!("{prog}: {}: {}", fs_dir.display(), e);
        exit(1);
    });

    let mount = Mount::init(&fs_dir).unwrap_or_else(|e| {
        eprintln!("{prog}: {}: {}", fs_dir.display(), e);
        exit(1);
    });
    let root_ino = match imgfs::superblock::Superblock::read(&fs_dir) {
        Ok(sb) => sb.root_inode,
        Err(e) => {
            eprintln!("{prog}: {}: {}", fs_dir.display(), e);
            exit(1);
        }
    };

    let fs = ImgfsFuse::new(mount, root_ino);
    let options = vec![
        MountOption::FSName("imgfs".to_string()),
        MountOption::AutoUnmount,
    ];
    if let Err(e) = fuser::mount2(fs, &mount_point, &options) {
        eprintln!("{prog}: mount failed: {e}");
        exit(1);
    }
}
