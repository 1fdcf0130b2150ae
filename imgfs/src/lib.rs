//! `imgfs`: an on-image filesystem engine.
//!
//! Persistent storage is a directory of fixed-size monochrome raster
//! images on the host filesystem, one image per logical block; every
//! byte of user data is encoded as eight adjacent pixels. On top of
//! this image-backed block device this crate implements a classical
//! Unix-style filesystem: a superblock, an allocation bitmap, fixed-size
//! inodes with direct data-block pointers, single-block directories, a
//! path resolver, a formatter and a consistency checker.
//!
//! This crate is the engine only. The `mkfs`, `fsck` and `mount`
//! binaries in this workspace are thin front-ends over the modules
//! below; the kernel-to-userspace bridge that `mount` drives via
//! `fuser` is an external collaborator that talks to [`mount::Mount`]
//! exclusively through its public methods.

pub mod alloc;
pub mod bitmap;
pub mod block;
pub mod crypto;
pub mod dir;
pub mod error;
pub mod format;
pub mod fsck;
pub mod inode;
pub mod mount;
pub mod path;
pub mod superblock;

pub use error::{Error, Result};
