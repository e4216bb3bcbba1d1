extern crate std;

use std::{collections::BTreeMap, ops::Range, prelude::v1::*, ptr::NonNull};

use crate::ALIGN;

/// Tracks which byte ranges the allocator under test has handed out, and
/// panics on overlapping allocations or mismatched frees.
pub(crate) struct ShadowAllocator {
    regions: BTreeMap<usize, SaRegion>,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
enum SaRegion {
    Free,
    Used,
    Invalid,
}

impl ShadowAllocator {
    pub fn new() -> Self {
        Self {
            regions: Some((0, SaRegion::Invalid)).into_iter().collect(),
        }
    }

    fn convert_range(&mut self, range: Range<usize>, old_region: SaRegion, new_region: SaRegion) {
        if range.len() == 0 {
            return;
        }

        assert_ne!(old_region, new_region);
        log::trace!(
            "sa: converting {:?} from {:?} to {:?}",
            range,
            old_region,
            new_region
        );

        let (&addr, &region) = self.regions.range(0..range.end).rev().next().unwrap();
        if addr > range.start {
            panic!("there's a discontinuity in range {:?}", range);
        } else if region != old_region {
            panic!(
                "range {:?} is {:?} (expected {:?})",
                range, region, old_region
            );
        }

        // Insert an element at `range.start`
        if addr == range.start {
            *self.regions.get_mut(&addr).unwrap() = new_region;
        } else {
            self.regions.insert(range.start, new_region);
        }

        // Each element must represent a discontinuity. If it doesn't
        // represent a discontinuity, it must be removed.
        if let Some((_, &region)) = self.regions.range(0..range.start).rev().next() {
            if region == new_region {
                self.regions.remove(&range.start);
            }
        }

        if let Some(&end_region) = self.regions.get(&range.end) {
            if end_region == new_region {
                self.regions.remove(&range.end);
            }
        } else {
            // Insert an element at `range.end`
            self.regions.insert(range.end, old_region);
        }
    }

    /// Declare `len` bytes at `start` managed by the allocator and
    /// initially unallocated.
    pub fn manage(&mut self, start: usize, len: usize) {
        self.convert_range(start..start + len, SaRegion::Invalid, SaRegion::Free);
    }

    pub fn allocate(&mut self, size: usize, start: NonNull<u8>) {
        let start = start.as_ptr() as usize;
        assert_eq!(
            start % ALIGN,
            0,
            "0x{:x} is not aligned to a machine-word pair",
            start
        );
        self.convert_range(start..start + size, SaRegion::Free, SaRegion::Used);
    }

    pub fn deallocate(&mut self, size: usize, start: NonNull<u8>) {
        let start = start.as_ptr() as usize;
        self.convert_range(start..start + size, SaRegion::Used, SaRegion::Free);
    }
}
