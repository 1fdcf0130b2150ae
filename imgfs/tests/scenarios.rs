//! Integration tests for the concrete scenarios this workspace's
//! specification calls out (S1-S6): end-to-end exercises of the public
//! engine API against a real temporary directory of block images.

use imgfs::bitmap::Bitmap;
use imgfs::dir;
use imgfs::error::Error;
use imgfs::format;
use imgfs::fsck::{self, Outcome};
use imgfs::inode::Inode;
use imgfs::mount::Mount;
use imgfs::superblock::Superblock;
use tempfile::tempdir;

/// S1: format then check.
#[test]
fn s1_format_then_check() {
    let dir = tempdir().unwrap();
    format::mkfs(dir.path(), 16).unwrap();

    let report = fsck::check(dir.path(), false).unwrap();
    assert_eq!(report.outcome, Outcome::Clean);
    assert_eq!(report.exit_code(), 0);

    let sb = Superblock::read(dir.path()).unwrap();
    assert_eq!(sb.total_blocks, 16);
    assert_eq!(sb.root_inode, 2);
    assert_eq!(sb.block_size, imgfs::superblock::BLOCK_SIZE_BITS);

    let bm = Bitmap::read(dir.path(), 16).unwrap();
    assert!(bm.test(0));
    assert!(bm.test(1));
    assert!(bm.test(2));
    assert_eq!(bm.popcount(), 3);
}

/// S2: worst-fit allocator choice.
#[test]
fn s2_worst_fit_choice() {
    // 16 blocks; reserve everything but two free runs: [3..6) len 3 and
    // [10..15) len 5.
    let mut bm = Bitmap::new(16);
    for i in 2..16 {
        bm.set(i);
    }
    for i in 3..6 {
        bm.clear(i);
    }
    for i in 10..15 {
        bm.clear(i);
    }
    let start = imgfs::alloc::alloc(&mut bm, 2).unwrap();
    assert_eq!(start, 10, "the longer run must win even though the shorter one suffices");
}

/// S3: create, write, read.
#[test]
fn s3_create_write_read() {
    let dir = tempdir().unwrap();
    format::mkfs(dir.path(), 32).unwrap();
    let mut mount = Mount::init(dir.path()).unwrap();

    mount.create("/", "a").unwrap();
    mount.write("/a", 0, b"hello").unwrap();

    let attr = mount.getattr("/a").unwrap();
    assert_eq!(attr.size, 5);
    assert!(!attr.is_dir);

    let mut buf = [0u8; 5];
    let n = mount.read("/a", 0, &mut buf).unwrap();
    assert_eq!(n, 5);
    assert_eq!(&buf, b"hello");
}

/// S4: rmdir refuses a non-empty directory; unlinking its content
/// allows it to succeed.
#[test]
fn s4_rmdir_non_empty() {
    let dir = tempdir().unwrap();
    format::mkfs(dir.path(), 32).unwrap();
    let mut mount = Mount::init(dir.path()).unwrap();

    mount.mkdir("/", "d").unwrap();
    mount.create("/d", "f").unwrap();

    let err = mount.rmdir("/", "d").unwrap_err();
    assert!(matches!(err, Error::NotEmpty));

    mount.unlink("/d", "f").unwrap();
    mount.rmdir("/", "d").unwrap();

    let report = fsck::check(dir.path(), false).unwrap();
    assert_eq!(report.outcome, Outcome::Clean);
}

/// S5: fsck repairs a leaked bitmap bit.
#[test]
fn s5_fsck_repairs_leaked_bit() {
    let dir = tempdir().unwrap();
    format::mkfs(dir.path(), 32).unwrap();

    let sb = Superblock::read(dir.path()).unwrap();
    let mut bm = Bitmap::read(dir.path(), sb.total_blocks).unwrap();
    bm.set(20);
    bm.write(dir.path()).unwrap();

    let report = fsck::check(dir.path(), true).unwrap();
    assert_eq!(report.outcome, Outcome::Repaired);
    assert_eq!(report.exit_code(), 1);

    let bm_after = Bitmap::read(dir.path(), sb.total_blocks).unwrap();
    assert!(!bm_after.test(20));
}

/// S6: rename is rejected across parent directories but succeeds
/// within the same directory.
#[test]
fn s6_rename_cross_directory_rejected() {
    let dir = tempdir().unwrap();
    format::mkfs(dir.path(), 32).unwrap();
    let mut mount = Mount::init(dir.path()).unwrap();

    mount.mkdir("/", "a").unwrap();
    mount.mkdir("/", "b").unwrap();
    let created = mount.create("/a", "x").unwrap();

    let err = mount.rename("/a", "x", "/b", "x").unwrap_err();
    assert!(matches!(err, Error::CrossDevice));

    mount.rename("/a", "x", "/a", "y").unwrap();
    let resolved = mount.getattr("/a/y").unwrap();
    assert_eq!(resolved.ino, created);
    assert!(mount.access("/a/x").is_err());
}

/// Tree reachability holds after a sequence of directory operations,
/// and the bitmap's popcount matches the live-block count exactly
/// (quantified properties 7 and 8).
#[test]
fn tree_reachability_and_bitmap_conservation() {
    let dir = tempdir().unwrap();
    format::mkfs(dir.path(), 64).unwrap();
    let mut mount = Mount::init(dir.path()).unwrap();

    mount.mkdir("/", "a").unwrap();
    mount.create("/a", "f1").unwrap();
    mount.create("/a", "f2").unwrap();
    mount.write("/a/f1", 0, &vec![7u8; 3]).unwrap();
    mount.mkdir("/", "b").unwrap();
    mount.unlink("/a", "f2").unwrap();

    let report = fsck::check(dir.path(), false).unwrap();
    assert_eq!(report.outcome, Outcome::Clean);

    let sb = Superblock::read(dir.path()).unwrap();
    let bm = Bitmap::read(dir.path(), sb.total_blocks).unwrap();
    // super + bitmap + root inode + root's dir block (lazily allocated
    // by the first insert) + "a" inode + "a"'s dir block + f1 inode +
    // f1's one data block + "b" inode. "b" has no dir block: nothing
    // was ever inserted into it.
    assert_eq!(bm.popcount(), 9);
}

/// Directory uniqueness: `add` only succeeds while no entry shares the
/// name, and a successful add is immediately visible to `lookup`.
#[test]
fn directory_uniqueness_property() {
    let dir = tempdir().unwrap();
    format::mkfs(dir.path(), 32).unwrap();
    let sb = Superblock::read(dir.path()).unwrap();
    let mut bm = Bitmap::read(dir.path(), sb.total_blocks).unwrap();
    let mut root = Inode::read(dir.path(), sb.root_inode).unwrap();

    dir::add(&mut bm, &mut root, dir.path(), "x", 9).unwrap();
    assert_eq!(dir::lookup(&root, dir.path(), "x").unwrap(), 9);
    assert!(matches!(
        dir::add(&mut bm, &mut root, dir.path(), "x", 10).unwrap_err(),
        Error::Exists
    ));
}
