//! Size-class mapping for the two-level index.
use super::{ALIGN, FLI_OFFSET, FLLEN, MAX_FLI, MIN_BLOCK_SIZE, SLI, SLLEN, SMALL_BLOCK};
use crate::int::last_set_bit;

/// Map a block size to the `(fl, sl)` class that stores it.
#[inline]
pub(super) fn map_insert(size: usize) -> (usize, usize) {
    debug_assert!(size >= MIN_BLOCK_SIZE);
    debug_assert_eq!(size % ALIGN, 0);
    debug_assert!(size < 1 << MAX_FLI);

    if size < SMALL_BLOCK {
        (0, size / (SMALL_BLOCK / SLLEN))
    } else {
        let f = last_set_bit(size as u32);
        let sl = (size >> (f - SLI)) - SLLEN;
        ((f - FLI_OFFSET) as usize, sl)
    }
}

/// Map a request size to the first class whose every block can hold it.
///
/// Returns the class-rounded size together with `(fl, sl)`, or `None` when
/// the request is beyond the largest class.
#[inline]
pub(super) fn map_search(size: usize) -> Option<(usize, usize, usize)> {
    debug_assert!(size >= MIN_BLOCK_SIZE);
    debug_assert_eq!(size % ALIGN, 0);

    if size < SMALL_BLOCK {
        return Some((size, 0, size / (SMALL_BLOCK / SLLEN)));
    }
    if size >= 1 << MAX_FLI {
        return None;
    }

    // Round up to the class stride so the chosen class can not contain a
    // block smaller than the request.
    let t = (1usize << (last_set_bit(size as u32) - SLI)) - 1;
    let size = (size + t) & !t;

    let f = last_set_bit(size as u32);
    let fl = (f - FLI_OFFSET) as usize;
    if fl >= FLLEN {
        return None;
    }
    let sl = (size >> (f - SLI)) - SLLEN;
    Some((size, fl, sl))
}
