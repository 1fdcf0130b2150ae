//! Inode store (C5): fixed-size inode records, one per block, with ten
//! direct data-block pointers.

use std::path::Path;

use crate::alloc;
use crate::bitmap::Bitmap;
use crate::block::{self, BLOCK_BYTES};
use crate::error::{Error, Result};

/// Number of direct block pointers an inode carries.
pub const DIRECT_BLOCKS: usize = 10;
/// On-disk size of an inode record.
pub const INODE_HEADER_LEN: usize = 128;
/// Bit 0 of `flags`: this inode is a directory.
const FLAG_DIR: u8 = 1 << 0;

/// A fixed-size inode record. Its own block index is its inode number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub ino: u32,
    pub size: u32,
    pub block_count: u32,
    pub is_dir: bool,
    pub blocks: [u32; DIRECT_BLOCKS],
}

impl Inode {
    /// A zeroed inode for block `ino`.
    pub fn zeroed(ino: u32, is_dir: bool) -> Self {
        Self {
            ino,
            size: 0,
            block_count: 0,
            is_dir,
            blocks: [0; DIRECT_BLOCKS],
        }
    }

    fn encode(&self, out: &mut [u8; INODE_HEADER_LEN]) {
        out[0..4].copy_from_slice(&self.ino.to_le_bytes());
        out[4..8].copy_from_slice(&self.size.to_le_bytes());
        out[8..12].copy_from_slice(&self.block_count.to_le_bytes());
        out[12] = if self.is_dir { FLAG_DIR } else { 0 };
        // out[13..16] padding left zero.
        for (i, &b) in self.blocks.iter().enumerate() {
            let off = 16 + i * 4;
            out[off..off + 4].copy_from_slice(&b.to_le_bytes());
        }
        // out[56..60] indirect, reserved zero.
        // out[60..128] reserved, left zero.
    }

    fn decode(buf: &[u8; INODE_HEADER_LEN]) -> Self {
        let ino = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let size = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let block_count = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        let is_dir = buf[12] & FLAG_DIR != 0;
        let mut blocks = [0u32; DIRECT_BLOCKS];
        for (i, slot) in blocks.iter_mut().enumerate() {
            let off = 16 + i * 4;
            *slot = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        }
        Self {
            ino,
            size,
            block_count,
            is_dir,
            blocks,
        }
    }

    /// Persists this inode to its own block.
    pub fn write(&self, dir: &Path) -> Result<()> {
        let mut header = [0u8; INODE_HEADER_LEN];
        self.encode(&mut header);
        let mut payload = vec![0u8; BLOCK_BYTES];
        payload[..INODE_HEADER_LEN].copy_from_slice(&header);
        block::write_block(dir, self.ino, &payload, BLOCK_BYTES)?;
        Ok(())
    }

    /// Reads the inode stored in block `ino`.
    pub fn read(dir: &Path, ino: u32) -> Result<Self> {
        let mut payload = vec![0u8; INODE_HEADER_LEN];
        block::read_block(dir, ino, &mut payload, INODE_HEADER_LEN)?;
        let header: [u8; INODE_HEADER_LEN] = payload.try_into().unwrap();
        Ok(Self::decode(&header))
    }

    /// The number of whole or partial 125,000-byte blocks needed to hold
    /// `size` bytes.
    pub fn blocks_needed(size: u32) -> u32 {
        (size as u64).div_ceil(BLOCK_BYTES as u64) as u32
    }
}

/// Allocates one block for a new inode, zeroes it, marks the directory
/// flag, and persists both the inode and the bitmap.
///
/// On any I/O failure after the block has been reserved, the allocation
/// is rolled back on a best-effort basis (the block is freed and the
/// bitmap re-persisted) before the error is returned.
pub fn create_inode(bm: &mut Bitmap, is_dir: bool, dir: &Path) -> Result<u32> {
    let ino = alloc::alloc(bm, 1).ok_or(Error::Full)?;
    let inode = Inode::zeroed(ino, is_dir);
    match (|| -> Result<()> {
        bm.write(dir)?;
        inode.write(dir)?;
        Ok(())
    })() {
        Ok(()) => {
            log::debug!("inode: created inode {ino} (dir={is_dir})");
            Ok(ino)
        }
        Err(e) => {
            alloc::free_blocks(bm, ino, 1);
            let _ = bm.write(dir);
            Err(e)
        }
    }
}

/// Resizes `inode`'s data to `new_size` bytes, (de)allocating direct
/// blocks as needed.
///
/// All-or-nothing with respect to `block_count`: on success the inode
/// reflects the new `block_count`/`size`; on failure (`Full` when
/// `new_size` would need more than [`DIRECT_BLOCKS`] blocks, or when the
/// allocator runs out of room while growing) the inode is left
/// unchanged. The bitmap is always persisted before the inode, so a
/// crash between the two can only leak blocks, never leave the inode
/// pointing at an unreserved block.
pub fn resize(bm: &mut Bitmap, inode: &mut Inode, new_size: u32, dir: &Path) -> Result<()> {
    let req = Inode::blocks_needed(new_size);
    if req > DIRECT_BLOCKS as u32 {
        return Err(Error::Full);
    }

    if req > inode.block_count {
        let mut allocated = Vec::new();
        let mut failure = None;
        for slot in inode.block_count..req {
            match alloc::alloc(bm, 1) {
                Some(b) => allocated.push((slot, b)),
                None => {
                    failure = Some(Error::Full);
                    break;
                }
            }
        }
        if let Some(e) = failure {
            for (_, b) in &allocated {
                alloc::free_blocks(bm, *b, 1);
            }
            let _ = bm.write(dir);
            return Err(e);
        }
        for (slot, b) in allocated {
            inode.blocks[slot as usize] = b;
        }
    } else if req < inode.block_count {
        for slot in req..inode.block_count {
            let b = inode.blocks[slot as usize];
            alloc::free_blocks(bm, b, 1);
            inode.blocks[slot as usize] = 0;
        }
    }

    inode.block_count = req;
    inode.size = new_size;
    bm.write(dir)?;
    inode.write(dir)?;
    log::debug!(
        "inode: resized inode {} to size={} block_count={}",
        inode.ino,
        inode.size,
        inode.block_count
    );
    Ok(())
}
