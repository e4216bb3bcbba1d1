//! This crate implements a deterministic memory pool allocator based on the
//! TLSF (Two-Level Segregated Fit) algorithm¹.
//!
//!  - **Allocation and deallocation are guaranteed to complete in constant
//!    time.** There are no hidden loops over the number of live allocations,
//!    which makes the allocator suitable for real-time control paths and
//!    RTOS kernels.
//!
//!  - **The memory pool is provided by an application.** The entire allocator
//!    state lives inside the caller-supplied region: a control structure at
//!    the base, followed by the managed blocks. Nothing is allocated from a
//!    host allocator, and additional regions can be handed over later with
//!    [`Pool::add_area`].
//!
//!  - **This crate supports `#![no_std]`.** It can be used in bare-metal and
//!    RTOS-based applications.
//!
//! <sub>¹ M. Masmano, I. Ripoll, A. Crespo and J. Real, "TLSF: a new dynamic
//! memory allocator for real-time systems," *Proceedings. 16th Euromicro
//! Conference on Real-Time Systems*, 2004. ECRTS 2004., Catania, Italy, 2004,
//! pp. 79-88, doi: 10.1109/EMRTS.2004.1311009.</sub>
//!
//! # Examples
//!
//! ## `Pool`: Core API
//!
//! ```rust
//! use poolfit::Pool;
//! use std::mem::MaybeUninit;
//!
//! // The backing region must be aligned to a machine-word pair.
//! #[repr(align(16))]
//! struct Arena([MaybeUninit<u8>; 65536]);
//! let mut arena = Arena([MaybeUninit::uninit(); 65536]);
//!
//! let (mut pool, first_block) = Pool::init(&mut arena.0).unwrap();
//! assert_eq!(pool.used_size(), 65536 - first_block);
//!
//! let p = pool.allocate(100).unwrap();
//! let q = pool.allocate(200).unwrap();
//! unsafe {
//!     p.as_ptr().write_bytes(0xa5, 100);
//!     pool.deallocate(p);
//!     pool.deallocate(q);
//! }
//! assert_eq!(pool.used_size(), 65536 - first_block);
//! ```
//!
//! ## `GlobalPool`: a process-wide heap
//!
//! ```rust
//! use poolfit::GlobalPool;
//! use std::ptr::NonNull;
//!
//! #[repr(align(16))]
//! struct Arena([u8; 65536]);
//!
//! static HEAP: GlobalPool = GlobalPool::INIT;
//!
//! let arena = Box::leak(Box::new(Arena([0; 65536])));
//! unsafe { HEAP.init(NonNull::from(&mut arena.0[..])) }.unwrap();
//!
//! let p = HEAP.allocate(256).unwrap();
//! unsafe { HEAP.deallocate(p.as_ptr()) };
//! ```
//!
//! # Details
//!
//! ## Changes from the original algorithm
//!
//!  - Each memory area is bracketed by a sentinel block at the low end
//!    (which doubles as storage for the per-area bookkeeping record) and a
//!    zero-sized terminator at the high end, so coalescing never has to
//!    consult anything but block headers.
//!
//!  - Areas handed over with [`Pool::add_area`] are merged with physically
//!    adjacent areas already owned by the pool, dissolving the boundary
//!    structures between them.
#![no_std]
#![cfg_attr(feature = "doc_cfg", feature(doc_cfg))]

// FIXME: panicking in constants is unstable
macro_rules! const_panic {
    ($($tt:tt)*) => {
        #[allow(unconditional_panic)]
        {
            let _ = 1 / 0;
            loop {}
        }
    };
}

mod global;
mod init;
pub mod int;
mod pool;
mod utils;
pub use self::{global::*, init::*, pool::*};

#[cfg(any(test, feature = "std"))]
extern crate std;

#[cfg(test)]
mod tests;
