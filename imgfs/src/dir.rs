//! Directory (C6): a fixed-length array of `{ino, name}` slots packed
//! into a single data block. A directory occupies at most one block
//! (no multi-block directories are supported); the block is
//! allocated lazily on the first [`add`].

use std::path::Path;

use crate::alloc;
use crate::bitmap::Bitmap;
use crate::block::{self, BLOCK_BYTES};
use crate::error::{Error, Result};
use crate::inode::Inode;

/// Maximum length of a name, not counting the terminating NUL.
pub const NAME_MAX: usize = 255;
/// On-disk size of one directory entry: `u32 ino` + `u8[256] name`.
pub const ENTRY_LEN: usize = 4 + 256;
/// Number of entry slots that fit in one 125,000-byte data block.
pub const SLOTS_PER_BLOCK: usize = BLOCK_BYTES / ENTRY_LEN;

/// One directory slot. `ino == 0` marks an empty slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    ino: u32,
    /// Raw NUL-terminated name bytes, at most `NAME_MAX` significant
    /// bytes plus the terminator.
    name: [u8; 256],
}

impl Entry {
    fn empty() -> Self {
        Self {
            ino: 0,
            name: [0; 256],
        }
    }

    fn name_bytes(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        &self.name[..len.min(NAME_MAX)]
    }

    fn set_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_MAX);
        self.name = [0; 256];
        self.name[..len].copy_from_slice(&bytes[..len]);
    }

    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.ino.to_le_bytes());
        out[4..4 + 256].copy_from_slice(&self.name);
    }

    fn decode(buf: &[u8]) -> Self {
        let ino = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let mut name = [0u8; 256];
        name.copy_from_slice(&buf[4..4 + 256]);
        Self { ino, name }
    }
}

/// Names are compared up to [`NAME_MAX`] bytes; two names that agree on
/// their first 255 bytes are treated as equal. Intentional.
fn names_equal(a: &str, b: &[u8]) -> bool {
    let a_bytes = a.as_bytes();
    let len = a_bytes.len().min(NAME_MAX).min(b.len());
    a_bytes.len().min(NAME_MAX) == b.len().min(NAME_MAX) && a_bytes[..len] == b[..len]
}

fn read_slots(dir: &Path, block_id: u32) -> Result<Vec<Entry>> {
    let mut payload = vec![0u8; BLOCK_BYTES];
    block::read_block(dir, block_id, &mut payload, BLOCK_BYTES)?;
    Ok((0..SLOTS_PER_BLOCK)
        .map(|i| Entry::decode(&payload[i * ENTRY_LEN..(i + 1) * ENTRY_LEN]))
        .collect())
}

fn write_slots(dir: &Path, block_id: u32, slots: &[Entry]) -> Result<()> {
    let mut payload = vec![0u8; BLOCK_BYTES];
    for (i, slot) in slots.iter().enumerate() {
        slot.encode(&mut payload[i * ENTRY_LEN..(i + 1) * ENTRY_LEN]);
    }
    block::write_block(dir, block_id, &payload, BLOCK_BYTES)
}

/// Number of occupied (non-empty) slots in `dir_inode`'s directory
/// block. Returns 0 if the directory has no block allocated yet.
pub fn occupied_count(dir_inode: &Inode, dir: &Path) -> Result<usize> {
    if dir_inode.block_count == 0 {
        return Ok(0);
    }
    let slots = read_slots(dir, dir_inode.blocks[0])?;
    Ok(slots.iter().filter(|e| e.ino != 0).count())
}

/// Inserts `name -> child_ino` into `dir_inode`'s directory, allocating
/// its data block on first use.
///
/// Fails with [`Error::Exists`] if `name` already names an entry, or
/// [`Error::Full`] if the directory's single block has no empty slot
/// left (or, on first insert, if no block can be allocated).
pub fn add(
    bm: &mut Bitmap,
    dir_inode: &mut Inode,
    dir: &Path,
    name: &str,
    child_ino: u32,
) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Invalid);
    }
    if dir_inode.block_count == 0 {
        let block_id = alloc::alloc(bm, 1).ok_or(Error::Full)?;
        let empty = vec![Entry::empty(); SLOTS_PER_BLOCK];
        if let Err(e) = write_slots(dir, block_id, &empty) {
            alloc::free_blocks(bm, block_id, 1);
            let _ = bm.write(dir);
            return Err(e);
        }
        dir_inode.blocks[0] = block_id;
        dir_inode.block_count = 1;
        dir_inode.size = 0;
        bm.write(dir)?;
        dir_inode.write(dir)?;
    }

    let mut slots = read_slots(dir, dir_inode.blocks[0])?;
    let mut free_idx = None;
    for (i, slot) in slots.iter().enumerate() {
        if slot.ino == 0 {
            if free_idx.is_none() {
                free_idx = Some(i);
            }
        } else if names_equal(name, slot.name_bytes()) {
            return Err(Error::Exists);
        }
    }
    let idx = free_idx.ok_or(Error::Full)?;

    slots[idx].ino = child_ino;
    slots[idx].set_name(name);
    write_slots(dir, dir_inode.blocks[0], &slots)?;
    dir_inode.size += ENTRY_LEN as u32;
    dir_inode.write(dir)?;
    log::debug!("dir: added `{name}` -> inode {child_ino} in directory {}", dir_inode.ino);
    Ok(())
}

/// Removes the entry named `name` from `dir_inode`'s directory.
pub fn remove(dir_inode: &mut Inode, dir: &Path, name: &str) -> Result<()> {
    if dir_inode.block_count == 0 {
        return Err(Error::NotFound);
    }
    let mut slots = read_slots(dir, dir_inode.blocks[0])?;
    let idx = slots
        .iter()
        .position(|s| s.ino != 0 && names_equal(name, s.name_bytes()))
        .ok_or(Error::NotFound)?;
    slots[idx].ino = 0;
    slots[idx].name[0] = 0;
    write_slots(dir, dir_inode.blocks[0], &slots)?;
    dir_inode.size = dir_inode.size.saturating_sub(ENTRY_LEN as u32);
    dir_inode.write(dir)?;
    log::debug!("dir: removed `{name}` from directory {}", dir_inode.ino);
    Ok(())
}

/// Looks up `name` in `dir_inode`'s directory, returning its inode
/// number.
pub fn lookup(dir_inode: &Inode, dir: &Path, name: &str) -> Result<u32> {
    if dir_inode.block_count == 0 {
        return Err(Error::NotFound);
    }
    let slots = read_slots(dir, dir_inode.blocks[0])?;
    slots
        .iter()
        .find(|s| s.ino != 0 && names_equal(name, s.name_bytes()))
        .map(|s| s.ino)
        .ok_or(Error::NotFound)
}

/// Lists every occupied entry's name and inode number, for `readdir`.
pub fn list(dir_inode: &Inode, dir: &Path) -> Result<Vec<(String, u32)>> {
    if dir_inode.block_count == 0 {
        return Ok(Vec::new());
    }
    let slots = read_slots(dir, dir_inode.blocks[0])?;
    Ok(slots
        .iter()
        .filter(|s| s.ino != 0)
        .map(|s| (String::from_utf8_lossy(s.name_bytes()).into_owned(), s.ino))
        .collect())
}
