//! Formatter (C8): initializes a fresh filesystem directory.

use std::fs;
use std::path::Path;

use crate::bitmap::Bitmap;
use crate::block;
use crate::error::{Error, Result};
use crate::inode;
use crate::superblock::Superblock;

/// Minimum number of blocks a filesystem needs: superblock, bitmap, and
/// the root inode.
pub const MIN_BLOCKS: u32 = 3;

/// Formats a fresh filesystem of `total_blocks` blocks at `dir`,
/// creating the directory if it does not already exist.
///
/// `total_blocks` must be at least [`MIN_BLOCKS`].
pub fn mkfs(dir: &Path, total_blocks: u32) -> Result<()> {
    if total_blocks < MIN_BLOCKS {
        return Err(Error::Invalid);
    }
    fs::create_dir_all(dir)?;

    let mut sb = Superblock::init(total_blocks);
    let mut bm = Bitmap::new(total_blocks);

    let root_ino = inode::create_inode(&mut bm, true, dir)?;
    sb.root_inode = root_ino;

    sb.write(dir)?;
    bm.write(dir)?;

    for i in 0..total_blocks {
        if i == 0 || i == 1 || i == root_ino {
            // Already persisted with real content above.
            continue;
        }
        block::create_empty_block(dir, i)?;
    }

    log::info!(
        "format: created filesystem at {} (total_blocks={total_blocks}, root_inode={root_ino})",
        dir.display()
    );
    Ok(())
}
