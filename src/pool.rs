//! The pool allocator core
use core::{
    fmt,
    hint::unreachable_unchecked,
    marker::PhantomData,
    mem::{self, MaybeUninit},
    ptr::{self, NonNull},
};

use crate::{
    int::{first_set_bit, BinInteger},
    utils::{nonnull_slice_from_raw_parts, nonnull_slice_len, nonnull_slice_start},
};

mod map;
use self::map::{map_insert, map_search};

/// The allocation granularity.
///
/// It is `size_of::<usize>() * 2` bytes, a machine-word pair. Backing
/// regions must start on this boundary; payload pointers are aligned to it.
pub const ALIGN: usize = mem::size_of::<usize>() * 2;

/// The minimum payload size of a block: the two words that hold the
/// free-list links while a block is free.
pub const MIN_BLOCK_SIZE: usize = mem::size_of::<usize>() * 2;

/// The per-block overhead in bytes.
const HDR_OVERHEAD: usize = mem::size_of::<BlockHdr>();

/// The bit of [`BlockHdr::size`] indicating whether the block is free.
const SIZE_FREE: usize = 0x1;
/// The bit of [`BlockHdr::size`] indicating whether the physical
/// predecessor is free.
const SIZE_PREV_FREE: usize = 0x2;
/// The bits of [`BlockHdr::size`] holding the block's payload size.
const SIZE_MASK: usize = !(mem::size_of::<usize>() - 1);

const MAX_FLI: u32 = 30;
const FLI_OFFSET: u32 = 6;
const SLI: u32 = 5;
const FLLEN: usize = (MAX_FLI - FLI_OFFSET) as usize;
const SLLEN: usize = 1 << SLI;
/// Sizes below this are filed in the uniformly subdivided first row.
const SMALL_BLOCK: usize = 128;

/// Marks a region as holding a live pool.
const SIGNATURE: u32 = 0x2A59_FA59;

/// The payload size of an area's sentinel block, sized to hold an
/// [`AreaInfo`].
const SENTINEL_PAYLOAD: usize = {
    let info = round_up(mem::size_of::<AreaInfo>());
    if info < MIN_BLOCK_SIZE {
        MIN_BLOCK_SIZE
    } else {
        info
    }
};

/// The smallest region [`Pool::init`] accepts.
pub const MIN_POOL_SIZE: usize = mem::size_of::<PoolHdr>() + HDR_OVERHEAD * 8;

/// The smallest region [`Pool::add_area`] accepts: boundary structures plus
/// one minimum-size block.
pub const MIN_AREA_SIZE: usize = HDR_OVERHEAD * 3 + SENTINEL_PAYLOAD + MIN_BLOCK_SIZE;

/// The largest region a pool can manage in one piece.
///
/// A block of `2^30` bytes or more has no slot in the two-level index, so
/// regions (and area merges) are capped below that.
pub const MAX_AREA_SIZE: usize = 1 << MAX_FLI;

const _: () = {
    if mem::size_of::<BlockHdr>() != ALIGN {
        const_panic!("bad `BlockHdr` size");
    }
    if mem::size_of::<FreeBlockHdr>() != ALIGN * 2 {
        const_panic!("bad `FreeBlockHdr` size");
    }
    if MIN_BLOCK_SIZE < 4 {
        const_panic!("the size word can not spare its low bits for state");
    }
    if FLLEN as u32 > u32::BITS || SLLEN as u32 > u32::BITS {
        const_panic!("the bitmap words can not cover the index");
    }
};

const fn round_up(size: usize) -> usize {
    (size + ALIGN - 1) & !(ALIGN - 1)
}

const fn round_down(size: usize) -> usize {
    size & !(ALIGN - 1)
}

/// The header of a memory block.
///
/// The payload follows the header immediately. While the block is free, the
/// first two payload words hold the free-list links; while it is used, they
/// belong to the caller.
#[repr(C)]
#[derive(Debug)]
struct BlockHdr {
    /// The physical predecessor's header. Meaningful only while
    /// [`SIZE_PREV_FREE`] is set in `size`; the predecessor keeps it
    /// up to date whenever it is freed.
    prev_phys_block: Option<NonNull<BlockHdr>>,
    /// The payload size in bytes with the state bits [`SIZE_FREE`] and
    /// [`SIZE_PREV_FREE`] folded into the low bits, which alignment keeps
    /// zero.
    size: usize,
}

impl BlockHdr {
    #[inline]
    fn is_free(&self) -> bool {
        self.size & SIZE_FREE != 0
    }

    #[inline]
    fn prev_is_free(&self) -> bool {
        self.size & SIZE_PREV_FREE != 0
    }

    /// The first payload byte.
    #[inline]
    fn payload(&self) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked((self as *const _ as *mut u8).add(HDR_OVERHEAD)) }
    }

    /// The block that physically follows this one.
    ///
    /// # Safety
    ///
    /// `self` must not be an area terminator.
    #[inline]
    unsafe fn next_phys_block(&self) -> NonNull<BlockHdr> {
        NonNull::new_unchecked(
            (self as *const _ as *mut u8).add(HDR_OVERHEAD + (self.size & SIZE_MASK)),
        )
        .cast()
    }
}

/// The header of a free memory block, overlaying the first two payload
/// words with the free-list links.
#[repr(C)]
#[derive(Debug)]
struct FreeBlockHdr {
    common: BlockHdr,
    next_free: Option<NonNull<FreeBlockHdr>>,
    prev_free: Option<NonNull<FreeBlockHdr>>,
}

/// Per-area bookkeeping, stored in the sentinel block's payload.
#[repr(C)]
#[derive(Debug)]
struct AreaInfo {
    /// The area's terminator block.
    end: NonNull<BlockHdr>,
    /// The next area owned by the same pool.
    next: Option<NonNull<AreaInfo>>,
}

/// Recover the block header backing a payload pointer.
#[inline]
unsafe fn block_from_payload(ptr: NonNull<u8>) -> NonNull<BlockHdr> {
    NonNull::new_unchecked(ptr.as_ptr().sub(HDR_OVERHEAD)).cast()
}

/// The sentinel block whose payload holds the given [`AreaInfo`].
#[inline]
unsafe fn sentinel_of_info(info: NonNull<AreaInfo>) -> NonNull<BlockHdr> {
    NonNull::new_unchecked(info.as_ptr().cast::<u8>().sub(HDR_OVERHEAD)).cast()
}

/// The pool control structure, stored at the base of the backing region.
///
/// `fl_bitmap` summarizes which rows of `sl_bitmap` are non-empty, and each
/// `sl_bitmap` word summarizes which lists of the corresponding `first_free`
/// row are non-empty, so a suitable list is always found with two bit scans.
#[repr(C)]
struct PoolHdr {
    signature: u32,
    /// Managed bytes not currently held in any free block, bookkeeping
    /// included.
    used_size: usize,
    /// High-water mark of `used_size`.
    max_size: usize,
    /// Head of the singly linked list of areas owned by this pool.
    area_head: Option<NonNull<AreaInfo>>,
    fl_bitmap: u32,
    sl_bitmap: [u32; FLLEN],
    first_free: [[Option<NonNull<FreeBlockHdr>>; SLLEN]; FLLEN],
}

impl PoolHdr {
    #[inline]
    fn stat_add(&mut self, size: usize) {
        self.used_size += size + HDR_OVERHEAD;
        if self.used_size > self.max_size {
            self.max_size = self.used_size;
        }
    }

    #[inline]
    fn stat_remove(&mut self, size: usize) {
        self.used_size -= size + HDR_OVERHEAD;
    }

    /// File a free block under the list for its size class.
    ///
    /// # Safety
    ///
    ///  - `block` must be owned by this pool and not currently on any list.
    ///  - `size` must be its masked size.
    unsafe fn link_free_block(&mut self, mut block: NonNull<FreeBlockHdr>, size: usize) {
        let (fl, sl) = map_insert(size);
        let first_free = &mut self.first_free[fl][sl];
        let next_free = mem::replace(first_free, Some(block));
        block.as_mut().next_free = next_free;
        block.as_mut().prev_free = None;
        if let Some(mut next_free) = next_free {
            next_free.as_mut().prev_free = Some(block);
        }

        self.fl_bitmap.set_bit(fl as u32);
        self.sl_bitmap[fl].set_bit(sl as u32);
    }

    /// Remove a free block from the list it is filed under.
    ///
    /// # Safety
    ///
    ///  - `block` must currently be on the free list given by `size`.
    ///  - `size` must be its masked size.
    unsafe fn unlink_free_block(&mut self, mut block: NonNull<FreeBlockHdr>, size: usize) {
        let next_free = block.as_ref().next_free;
        let prev_free = block.as_ref().prev_free;

        if let Some(mut next_free) = next_free {
            next_free.as_mut().prev_free = prev_free;
        }

        if let Some(mut prev_free) = prev_free {
            prev_free.as_mut().next_free = next_free;
        } else {
            let (fl, sl) = map_insert(size);
            debug_assert_eq!(self.first_free[fl][sl], Some(block));
            self.first_free[fl][sl] = next_free;

            if next_free.is_none() {
                // The free list is now empty - update the bitmaps
                self.sl_bitmap[fl].clear_bit(sl as u32);
                if self.sl_bitmap[fl] == 0 {
                    self.fl_bitmap.clear_bit(fl as u32);
                }
            }
        }

        block.as_mut().next_free = None;
        block.as_mut().prev_free = None;
    }

    /// Locate a non-empty free list at `(fl, sl)` or the nearest class
    /// above it.
    fn search_suitable_block(&self, fl: usize, sl: usize) -> Option<(usize, usize)> {
        // Search in range `(fl, sl..SLLEN)`
        let sl2 = self.sl_bitmap[fl].bit_scan_forward(sl as u32) as usize;
        if sl2 < SLLEN {
            return Some((fl, sl2));
        }

        // Search in range `(fl + 1.., ..)`
        let fl2 = self.fl_bitmap.bit_scan_forward(fl as u32 + 1) as usize;
        if fl2 < FLLEN {
            let sl2 = first_set_bit(self.sl_bitmap[fl2]) as usize;
            debug_assert!(sl2 < SLLEN);
            Some((fl2, sl2))
        } else {
            None
        }
    }

    /// Return a block to the index, coalescing it with free physical
    /// neighbors, and refresh the successor's boundary tag.
    ///
    /// # Safety
    ///
    /// `block` must be a used block owned by this pool and distinct from
    /// every sentinel and terminator.
    unsafe fn free_block(&mut self, block: NonNull<BlockHdr>) {
        let mut block = block.cast::<FreeBlockHdr>();
        {
            let b = block.as_mut();
            b.common.size |= SIZE_FREE;
            b.next_free = None;
            b.prev_free = None;
        }
        self.stat_remove(block.as_ref().common.size & SIZE_MASK);

        // Merge with the next block if it is free
        let next = block.as_ref().common.next_phys_block();
        if next.as_ref().is_free() {
            let next_size = next.as_ref().size & SIZE_MASK;
            self.unlink_free_block(next.cast(), next_size);
            block.as_mut().common.size += next_size + HDR_OVERHEAD;
        }

        // Merge with the previous block if it is free
        if block.as_ref().common.prev_is_free() {
            let prev = block
                .as_ref()
                .common
                .prev_phys_block
                .unwrap_or_else(|| unreachable_unchecked());
            let mut prev = prev.cast::<FreeBlockHdr>();
            debug_assert!(prev.as_ref().common.is_free());

            let block_size = block.as_ref().common.size & SIZE_MASK;
            self.unlink_free_block(prev, prev.as_ref().common.size & SIZE_MASK);
            prev.as_mut().common.size += block_size + HDR_OVERHEAD;
            block = prev;
        }

        let size = block.as_ref().common.size & SIZE_MASK;
        self.link_free_block(block, size);

        // The successor's boundary tag now describes `block`
        let mut next = block.as_ref().common.next_phys_block();
        next.as_mut().size |= SIZE_PREV_FREE;
        next.as_mut().prev_phys_block = Some(block.cast());
    }
}

/// Carve a raw area into a sentinel, one usable block and a terminator.
///
/// The usable block is left marked used; the caller publishes it with
/// [`PoolHdr::free_block`]. Returns the sentinel.
///
/// # Safety
///
/// `area` must be writable, `ALIGN`-aligned and at least [`MIN_AREA_SIZE`]
/// bytes long.
unsafe fn process_area(area: NonNull<u8>, size: usize) -> NonNull<BlockHdr> {
    debug_assert_eq!(area.as_ptr() as usize % ALIGN, 0);
    debug_assert!(size >= MIN_AREA_SIZE);

    let sentinel = area.cast::<BlockHdr>();
    sentinel.as_ptr().write(BlockHdr {
        prev_phys_block: None,
        size: SENTINEL_PAYLOAD,
    });

    let block = sentinel.as_ref().next_phys_block().cast::<FreeBlockHdr>();
    let usable = round_down(size - HDR_OVERHEAD * 3 - SENTINEL_PAYLOAD);
    block.as_ptr().write(FreeBlockHdr {
        common: BlockHdr {
            prev_phys_block: None,
            size: usable,
        },
        next_free: None,
        prev_free: None,
    });

    let terminator = block.as_ref().common.next_phys_block();
    terminator.as_ptr().write(BlockHdr {
        prev_phys_block: Some(block.cast()),
        // Zero-sized and permanently used; `PREV_FREE` anticipates the
        // publishing free of `block`.
        size: SIZE_PREV_FREE,
    });

    let info = sentinel.as_ref().payload().cast::<AreaInfo>();
    info.as_ptr().write(AreaInfo {
        end: terminator,
        next: None,
    });

    sentinel
}

/// The reasons [`Pool::init`] can reject a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// The region does not start on an [`ALIGN`]-byte boundary.
    Misaligned,
    /// The region is smaller than [`MIN_POOL_SIZE`].
    TooSmall,
    /// The region is larger than [`MAX_AREA_SIZE`].
    TooLarge,
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InitError::Misaligned => "region is not aligned to a machine-word pair",
            InitError::TooSmall => "region is smaller than the minimum pool size",
            InitError::TooLarge => "region is larger than the maximum area size",
        })
    }
}

#[cfg_attr(doc, svgbobdoc::transform)]
/// A handle to a pool living inside a caller-supplied region.
///
/// `'arena` represents the backing region's lifetime. All allocator state
/// is stored in-band, so the handle itself is a single pointer.
///
/// # Data Structure Overview
///
/// <center>
/// ```svgbob
///  Backing region
///  ,---------+----------+--------------~~~--------------+------------,
///  | control | sentinel |         managed blocks        | terminator |
///  | struct  | AreaInfo |                               |  size = 0  |
///  '---------+----------+--------------~~~--------------+------------'
/// ```
/// </center>
///
/// The control structure holds a 32-bit first-level bitmap, one 32-bit
/// second-level bitmap per first-level row, and the matrix of free-list
/// heads. Size classes cover `2^6` up to `2^30` bytes; sizes below 128
/// bytes share a first-level row subdivided into 4-byte slots. Further
/// regions handed over with [`Self::add_area`] become additional areas
/// with the same sentinel/terminator bracketing, chained off the control
/// structure.
#[derive(Debug)]
pub struct Pool<'arena> {
    hdr: NonNull<PoolHdr>,
    _phantom: PhantomData<&'arena mut ()>,
}

// Safety: All memory referenced by a `Pool` is logically owned by it and
//         has no interior mutability, and the `&self` methods only read the
//         statistics counters.
unsafe impl Send for Pool<'_> {}
unsafe impl Sync for Pool<'_> {}

impl<'arena> Pool<'arena> {
    /// Initialize a pool inside `region`.
    ///
    /// On success, returns the handle together with the usable size of the
    /// pool's first block.
    ///
    /// # Examples
    ///
    /// ```
    /// use poolfit::Pool;
    /// use std::mem::MaybeUninit;
    ///
    /// #[repr(align(16))]
    /// struct Arena([MaybeUninit<u8>; 65536]);
    /// let mut arena = Arena([MaybeUninit::uninit(); 65536]);
    ///
    /// let (mut pool, first_block) = Pool::init(&mut arena.0).unwrap();
    /// assert!(first_block > 0);
    /// ```
    #[inline]
    pub fn init(region: &'arena mut [MaybeUninit<u8>]) -> Result<(Self, usize), InitError> {
        let len = region.len();
        let base = NonNull::new(region.as_mut_ptr() as *mut u8).unwrap();
        // Safety: the mutable borrow guarantees exclusive ownership of the
        //         region for 'arena
        unsafe { Self::init_ptr(nonnull_slice_from_raw_parts(base, len)) }
    }

    /// Initialize a pool inside the region specified by a slice pointer.
    ///
    /// If the region already carries a live pool signature it is reopened:
    /// nothing is rewritten, and the returned size is that of the block
    /// physically following the first area's sentinel. The signature check
    /// reads the region's first word, so callers that rely on reopen
    /// detection must hand over zeroed or previously initialized memory.
    ///
    /// # Safety
    ///
    ///  - The region will be considered owned by the returned pool. It must
    ///    be valid for reads and writes, must not be accessed through other
    ///    pointers while the pool is alive, and must outlive `'arena`.
    pub unsafe fn init_ptr(region: NonNull<[u8]>) -> Result<(Self, usize), InitError> {
        let base = nonnull_slice_start(region);
        let size = nonnull_slice_len(region);

        if base.as_ptr() as usize & (ALIGN - 1) != 0 {
            return Err(InitError::Misaligned);
        }
        if size < MIN_POOL_SIZE {
            return Err(InitError::TooSmall);
        }
        if size > MAX_AREA_SIZE {
            return Err(InitError::TooLarge);
        }

        let mut hdr = base.cast::<PoolHdr>();
        let pool = Pool {
            hdr,
            _phantom: PhantomData,
        };
        let offset = round_up(mem::size_of::<PoolHdr>());

        if (base.as_ptr() as *const u32).read() == SIGNATURE {
            // Reopen rather than re-carve
            let sentinel = base.as_ptr().add(offset) as *const BlockHdr;
            let first = (*sentinel).next_phys_block();
            return Ok((pool, first.as_ref().size & SIZE_MASK));
        }

        hdr.as_ptr().write(PoolHdr {
            signature: SIGNATURE,
            used_size: 0,
            max_size: 0,
            area_head: None,
            fl_bitmap: 0,
            sl_bitmap: [0; FLLEN],
            first_free: [[None; SLLEN]; FLLEN],
        });

        let sentinel = process_area(
            NonNull::new_unchecked(base.as_ptr().add(offset)),
            round_down(size - offset),
        );
        let block = sentinel.as_ref().next_phys_block();
        let published = block.as_ref().size & SIZE_MASK;

        {
            let hdr = hdr.as_mut();
            // The publishing free below subtracts this back out
            hdr.used_size = published + HDR_OVERHEAD;
            hdr.free_block(block);
            debug_assert_eq!(hdr.used_size, 0);

            hdr.area_head = Some(sentinel.as_ref().payload().cast());
            hdr.used_size = size - published;
            hdr.max_size = hdr.used_size;
        }

        Ok((pool, published))
    }

    /// Attempt to allocate `size` bytes.
    ///
    /// Returns the payload's starting address on success, `None` when no
    /// free block can hold the request. The payload is aligned to [`ALIGN`]
    /// bytes and stays valid until passed to [`Self::deallocate`]. Requests
    /// smaller than [`MIN_BLOCK_SIZE`] (including zero) are served a
    /// minimum-size block.
    ///
    /// # Time Complexity
    ///
    /// This method will complete in constant time.
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        unsafe {
            let size = if size < MIN_BLOCK_SIZE {
                MIN_BLOCK_SIZE
            } else {
                size.checked_add(ALIGN - 1)? & !(ALIGN - 1)
            };

            // `size` picks up the class rounding so the block is split at
            // the class boundary the search was made with.
            let (size, fl, sl) = map_search(size)?;
            let hdr = self.hdr.as_mut();
            let (fl, sl) = hdr.search_suitable_block(fl, sl)?;

            // Pop the head of the chosen list. Its `prev_free` is known to
            // be `None`, so this is cheaper than `unlink_free_block`.
            let first_free = &mut hdr.first_free[fl][sl];
            let mut block = first_free.unwrap_or_else(|| unreachable_unchecked());
            debug_assert!(block.as_ref().common.is_free());
            debug_assert!((block.as_ref().common.size & SIZE_MASK) >= size);

            let next_free = block.as_ref().next_free;
            *first_free = next_free;
            if let Some(mut next_free) = next_free {
                next_free.as_mut().prev_free = None;
            } else {
                // The free list is now empty - update the bitmaps
                hdr.sl_bitmap[fl].clear_bit(sl as u32);
                if hdr.sl_bitmap[fl] == 0 {
                    hdr.fl_bitmap.clear_bit(fl as u32);
                }
            }
            block.as_mut().next_free = None;
            block.as_mut().prev_free = None;

            let mut next = block.as_ref().common.next_phys_block();
            let surplus = (block.as_ref().common.size & SIZE_MASK) - size;

            if surplus >= mem::size_of::<FreeBlockHdr>() {
                // Split the surplus off into a new free block
                let rem_size = surplus - HDR_OVERHEAD;
                let rem = NonNull::new_unchecked(
                    block.as_ref().common.payload().as_ptr().add(size),
                )
                .cast::<FreeBlockHdr>();
                rem.as_ptr().write(FreeBlockHdr {
                    common: BlockHdr {
                        prev_phys_block: None,
                        size: rem_size | SIZE_FREE,
                    },
                    next_free: None,
                    prev_free: None,
                });
                next.as_mut().prev_phys_block = Some(rem.cast());
                hdr.link_free_block(rem, rem_size);

                let b = block.as_mut();
                b.common.size = size | (b.common.size & SIZE_PREV_FREE);
            } else {
                next.as_mut().size &= !SIZE_PREV_FREE;
                block.as_mut().common.size &= !SIZE_FREE;
            }

            hdr.stat_add(block.as_ref().common.size & SIZE_MASK);

            Some(block.as_ref().common.payload())
        }
    }

    /// Deallocate a memory block previously returned by [`Self::allocate`],
    /// merging it with any free physical neighbor.
    ///
    /// # Time Complexity
    ///
    /// This method will complete in constant time.
    ///
    /// # Safety
    ///
    ///  - `ptr` must denote a live memory block allocated from `self`.
    ///  - The memory block must not be accessed after this call.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        let block = block_from_payload(ptr);
        debug_assert!(!block.as_ref().is_free(), "double free");
        self.hdr.as_mut().free_block(block);
    }

    /// Hand an additional region over to the pool.
    ///
    /// The region is carved into a new area and its usable block is
    /// published into the index. If the region is physically adjacent to an
    /// area the pool already owns, the two are merged and the boundary
    /// structures between them dissolve into the usable block. Returns the
    /// usable block's size.
    ///
    /// # Panics
    ///
    /// Panics if the region is not `ALIGN`-aligned or its size is outside
    /// `MIN_AREA_SIZE..=MAX_AREA_SIZE`.
    #[inline]
    pub fn add_area(&mut self, area: &'arena mut [MaybeUninit<u8>]) -> usize {
        let len = area.len();
        let base = NonNull::new(area.as_mut_ptr() as *mut u8).unwrap();
        // Safety: the mutable borrow guarantees exclusive ownership of the
        //         region for 'arena
        unsafe { self.add_area_ptr(nonnull_slice_from_raw_parts(base, len)) }
    }

    /// [`Self::add_area`] for a region specified by a slice pointer.
    ///
    /// # Panics
    ///
    /// See [`Self::add_area`].
    ///
    /// # Safety
    ///
    /// The region will be considered owned by the pool, under the same
    /// conditions as [`Self::init_ptr`].
    pub unsafe fn add_area_ptr(&mut self, area: NonNull<[u8]>) -> usize {
        let base = nonnull_slice_start(area);
        let size = nonnull_slice_len(area);

        assert_eq!(
            base.as_ptr() as usize & (ALIGN - 1),
            0,
            "area is not aligned to a machine-word pair"
        );
        assert!(
            (MIN_AREA_SIZE..=MAX_AREA_SIZE).contains(&size),
            "area size out of range"
        );

        ptr::write_bytes(base.as_ptr(), 0, size);

        let mut ib0 = process_area(base, size);
        let mut b0 = ib0.as_ref().next_phys_block();
        let mut lb0 = b0.as_ref().next_phys_block();

        let hdr = self.hdr.as_mut();

        // Walk the area list looking for physical adjacency with the new
        // area. At most one merge can happen on each side.
        let mut prev_link: *mut Option<NonNull<AreaInfo>> = &mut hdr.area_head;
        let mut cursor = hdr.area_head;
        while let Some(mut info) = cursor {
            let ib1 = sentinel_of_info(info);
            let mut b1 = ib1.as_ref().next_phys_block();
            let mut lb1 = info.as_ref().end;

            if ib1.as_ptr() as usize == lb0.as_ptr() as usize + HDR_OVERHEAD
                && lb1.as_ptr() as usize + HDR_OVERHEAD - base.as_ptr() as usize <= MAX_AREA_SIZE
            {
                // This area begins right past the new terminator. Absorb
                // its sentinel and our terminator into the usable block.
                *prev_link = info.as_ref().next;
                cursor = info.as_ref().next;

                b0.as_mut().size = round_down(
                    (b0.as_ref().size & SIZE_MASK)
                        + (ib1.as_ref().size & SIZE_MASK)
                        + HDR_OVERHEAD * 2,
                );
                b1.as_mut().prev_phys_block = Some(b0);
                lb0 = lb1;
                continue;
            }

            if lb1.as_ref().payload().as_ptr() as usize == ib0.as_ptr() as usize
                && lb0.as_ptr() as usize + HDR_OVERHEAD - ib1.as_ptr() as usize <= MAX_AREA_SIZE
            {
                // The new area begins right past this area's terminator,
                // which becomes the merged usable block.
                *prev_link = info.as_ref().next;
                cursor = info.as_ref().next;

                lb1.as_mut().size = round_down(
                    (b0.as_ref().size & SIZE_MASK)
                        + (ib0.as_ref().size & SIZE_MASK)
                        + HDR_OVERHEAD * 2,
                ) | (lb1.as_ref().size & SIZE_PREV_FREE);
                let mut next_b = lb1.as_ref().next_phys_block();
                next_b.as_mut().prev_phys_block = Some(lb1);
                b0 = lb1;
                ib0 = ib1;
                continue;
            }

            prev_link = &mut info.as_mut().next;
            cursor = info.as_ref().next;
        }

        let info = ib0.as_ref().payload().cast::<AreaInfo>();
        info.as_ptr().write(AreaInfo {
            end: lb0,
            next: hdr.area_head,
        });
        hdr.area_head = Some(info);

        let published = b0.as_ref().size & SIZE_MASK;
        // Charge the whole region up front; the publishing free then moves
        // the usable block's share back to the free side.
        hdr.used_size += size;
        hdr.free_block(b0);
        if hdr.used_size > hdr.max_size {
            hdr.max_size = hdr.used_size;
        }

        published
    }

    /// Managed bytes not currently held in any free block, bookkeeping
    /// included.
    #[inline]
    pub fn used_size(&self) -> usize {
        unsafe { self.hdr.as_ref() }.used_size
    }

    /// High-water mark of [`Self::used_size`].
    #[inline]
    pub fn max_size(&self) -> usize {
        unsafe { self.hdr.as_ref() }.max_size
    }

    /// Invalidate the pool, clearing its signature so the backing region
    /// can be reused.
    pub fn destroy(self) {
        unsafe { (*self.hdr.as_ptr()).signature = 0 };
    }
}
