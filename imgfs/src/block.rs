//! Block codec (C1): treats one host image file as an addressable
//! 125,000-byte region.
//!
//! Every logical block is a 1000x1000 single-channel (8 bits per pixel)
//! PNG on disk. Each byte of the logical region maps to eight
//! consecutive pixels on a single row, MSB-first: bit 7 of the byte is
//! the leftmost pixel of the group. A bit value of 1 is written as the
//! maximum luminance sample (255); 0 as the minimum (0). On read, a
//! sample strictly greater than the midpoint (127) decodes to bit 1,
//! everything else to bit 0. This is the one encoding this workspace's
//! formatter produces and its reader accepts; a block image written by
//! a different encoder is not a supported input.

use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};

use crate::error::{Error, Result};

/// Width and height of a block image, in pixels.
pub const IMAGE_DIM: u32 = 1000;
/// Number of bytes addressable within one logical block.
pub const BLOCK_BYTES: usize = 125_000;
/// File extension the formatter writes and the reader expects.
pub const BLOCK_EXT: &str = "png";

/// Luminance threshold separating a decoded 0 bit from a decoded 1 bit.
const DECODE_THRESHOLD: u8 = 127;

/// Returns the path of the block file for logical block `id` inside
/// filesystem directory `dir`.
pub fn block_path(dir: &Path, id: u32) -> PathBuf {
    dir.join(format!("block{id}.{BLOCK_EXT}"))
}

/// Creates the block file for index `id` with all bytes zero.
pub fn create_empty_block(dir: &Path, id: u32) -> Result<()> {
    write_block(dir, id, &[], 0)
}

/// Writes `len` bytes of `buf` at offset 0 of block `id`; the remainder
/// of the block's 125,000-byte region is zero-padded.
pub fn write_block(dir: &Path, id: u32, buf: &[u8], len: usize) -> Result<()> {
    if len > BLOCK_BYTES || len > buf.len() {
        return Err(Error::BadLen);
    }
    let mut payload = vec![0u8; BLOCK_BYTES];
    payload[..len].copy_from_slice(&buf[..len]);

    let img = encode(&payload);
    let path = block_path(dir, id);
    img.save(&path).map_err(|e| Error::Io(to_io_error(e)))?;
    log::debug!("block: wrote {len} bytes to block {id} at {}", path.display());
    Ok(())
}

/// Reads the first `len` bytes of block `id` into `out`.
///
/// `out` must be at least `len` bytes long.
pub fn read_block(dir: &Path, id: u32, out: &mut [u8], len: usize) -> Result<()> {
    if len > BLOCK_BYTES || len > out.len() {
        return Err(Error::BadLen);
    }
    let path = block_path(dir, id);
    let img = image::open(&path)
        .map_err(|e| Error::Io(to_io_error(e)))?
        .into_luma8();
    if img.width() != IMAGE_DIM || img.height() != IMAGE_DIM {
        return Err(Error::BadDimensions);
    }
    let payload = decode(&img);
    out[..len].copy_from_slice(&payload[..len]);
    Ok(())
}

/// Encodes a 125,000-byte payload into a 1000x1000 grayscale image.
///
/// Each byte occupies eight consecutive pixels on one row; a block's
/// 125,000 bytes therefore exactly fill 1,000,000 bits = 1000 rows of
/// 1000 pixels.
fn encode(payload: &[u8]) -> GrayImage {
    debug_assert_eq!(payload.len(), BLOCK_BYTES);
    let mut img = GrayImage::new(IMAGE_DIM, IMAGE_DIM);
    let bytes_per_row = (IMAGE_DIM / 8) as usize;
    for (byte_idx, &byte) in payload.iter().enumerate() {
        let row = (byte_idx / bytes_per_row) as u32;
        let col_group = (byte_idx % bytes_per_row) as u32;
        for bit in 0..8u32 {
            // MSB-first: bit 7 is the leftmost pixel of the group.
            let value = (byte >> (7 - bit)) & 1;
            let sample = if value == 1 { 255 } else { 0 };
            let x = col_group * 8 + bit;
            img.put_pixel(x, row, Luma([sample]));
        }
    }
    img
}

/// Decodes a 1000x1000 grayscale image back into a 125,000-byte payload.
fn decode(img: &GrayImage) -> [u8; BLOCK_BYTES] {
    let mut payload = [0u8; BLOCK_BYTES];
    let bytes_per_row = (IMAGE_DIM / 8) as usize;
    for (byte_idx, out) in payload.iter_mut().enumerate() {
        let row = (byte_idx / bytes_per_row) as u32;
        let col_group = (byte_idx % bytes_per_row) as u32;
        let mut byte = 0u8;
        for bit in 0..8u32 {
            let x = col_group * 8 + bit;
            let sample = img.get_pixel(x, row).0[0];
            let value = u8::from(sample > DECODE_THRESHOLD);
            byte |= value << (7 - bit);
        }
        *out = byte;
    }
    payload
}

fn to_io_error(e: image::ImageError) -> std::io::Error {
    std::io::Error::other(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trip_full_block() {
        let dir = tempdir().unwrap();
        let mut buf = vec![0u8; BLOCK_BYTES];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = (i % 256) as u8;
        }
        write_block(dir.path(), 7, &buf, BLOCK_BYTES).unwrap();
        let mut out = vec![0u8; BLOCK_BYTES];
        read_block(dir.path(), 7, &mut out, BLOCK_BYTES).unwrap();
        assert_eq!(buf, out);
    }

    #[test]
    fn round_trip_partial_write_pads_with_zero() {
        let dir = tempdir().unwrap();
        let buf = vec![0xAAu8; 37];
        write_block(dir.path(), 3, &buf, 37).unwrap();
        let mut out = vec![0u8; BLOCK_BYTES];
        read_block(dir.path(), 3, &mut out, BLOCK_BYTES).unwrap();
        assert_eq!(&out[..37], &buf[..]);
        assert!(out[37..].iter().all(|&b| b == 0));
    }

    #[test]
    fn write_rejects_oversized_buffer() {
        let dir = tempdir().unwrap();
        let buf = vec![0u8; BLOCK_BYTES + 1];
        let err = write_block(dir.path(), 0, &buf, BLOCK_BYTES + 1).unwrap_err();
        assert!(matches!(err, Error::BadLen));
    }

    #[test]
    fn empty_block_is_all_zero() {
        let dir = tempdir().unwrap();
        create_empty_block(dir.path(), 1).unwrap();
        let mut out = vec![0u8; BLOCK_BYTES];
        read_block(dir.path(), 1, &mut out, BLOCK_BYTES).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }
}
