//! Block allocator (C4): worst-fit contiguous reservation over the
//! bitmap.
//!
//! Worst-fit is chosen so large allocations keep finding room: every
//! request takes from the longest free run currently available, leaving
//! the smaller runs for later small requests rather than fragmenting the
//! biggest hole first. Neither [`alloc`] nor [`free_blocks`] persists the
//! bitmap; callers batch the write the way [`crate::inode::resize`]
//! does (bitmap before inode, so a crash in between leaks blocks but
//! never dangles a reference).

use crate::bitmap::Bitmap;

/// Reserves `count` contiguous blocks in `bm` using worst-fit: the
/// longest run of free bits, ties broken by the lowest start index.
/// Returns the start index of the reserved run, or `None` if no run is
/// at least `count` bits long. `bm` is left unchanged on `None`.
///
/// Callers MUST NOT pass `count == 0`.
pub fn alloc(bm: &mut Bitmap, count: u32) -> Option<u32> {
    debug_assert!(count > 0, "alloc(0) is a caller error");
    let total = bm.total_blocks();

    let mut best_start: Option<u32> = None;
    let mut best_len: u32 = 0;
    let mut run_start: Option<u32> = None;

    let mut close_run = |start: u32, len: u32, best_start: &mut Option<u32>, best_len: &mut u32| {
        if len >= count && len > *best_len {
            *best_len = len;
            *best_start = Some(start);
        }
    };
    for i in 0..total {
        if bm.test(i) {
            if let Some(s) = run_start.take() {
                close_run(s, i - s, &mut best_start, &mut best_len);
            }
        } else if run_start.is_none() {
            run_start = Some(i);
        }
    }
    // A run reaching the end of the bitmap is closed at the terminator.
    if let Some(s) = run_start {
        close_run(s, total - s, &mut best_start, &mut best_len);
    }

    let start = best_start?;
    for i in start..start + count {
        bm.set(i);
    }
    log::debug!("alloc: reserved [{start}, {}) (count={count})", start + count);
    Some(start)
}

/// Clears the `count` bits starting at `start`. Does not persist the
/// bitmap.
pub fn free_blocks(bm: &mut Bitmap, start: u32, count: u32) {
    for i in start..start + count {
        bm.clear(i);
    }
    log::debug!("alloc: freed [{start}, {})", start + count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worst_fit_picks_longest_run_even_when_shorter_suffices() {
        // total_blocks=16, bits 0,1 reserved by Bitmap::new. Free runs:
        // carve out free [3..6) (len 3) and [10..15) (len 5), rest used.
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
        let start = alloc(&mut bm, 2).unwrap();
        assert_eq!(start, 10);
        assert!(bm.test(10) && bm.test(11));
    }

    #[test]
    fn rejects_when_no_run_is_long_enough() {
        let mut bm = Bitmap::new(8);
        for i in 2..8 {
            bm.set(i);
        }
        let before = bm.clone();
        let res = alloc(&mut bm, 1);
        assert!(res.is_none());
        for i in 0..8 {
            assert_eq!(bm.test(i), before.test(i));
        }
    }

    #[test]
    fn free_then_alloc_restores_bit_pattern() {
        let mut bm = Bitmap::new(32);
        let before = bm.clone();
        let start = alloc(&mut bm, 4).unwrap();
        free_blocks(&mut bm, start, 4);
        for i in 0..32 {
            assert_eq!(bm.test(i), before.test(i), "bit {i}");
        }
    }

    #[test]
    fn run_reaching_bitmap_end_is_considered() {
        let mut bm = Bitmap::new(10);
        for i in 2..6 {
            bm.set(i);
        }
        // free: [6, 10) len 4, reaching the terminator.
        let start = alloc(&mut bm, 4).unwrap();
        assert_eq!(start, 6);
    }
}
