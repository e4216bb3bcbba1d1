//! A process-wide pool usable as a conventional heap.
use core::{
    alloc::{GlobalAlloc, Layout},
    cell::UnsafeCell,
    ops,
    ptr::{self, NonNull},
};

use crate::{Init, InitError, Pool, ALIGN};

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        use self::unix as os;
    } else {
        mod spin;
        use self::spin as os;
    }
}

/// The largest request [`GlobalPool`] serves.
///
/// Bounding the request size keeps the worst-case fragmentation of a small
/// heap in check. The limit applies to this wrapper only; [`Pool`] itself
/// serves anything its free lists can hold.
pub const REQUEST_LIMIT: usize = 16384;

/// A [`Pool`] behind a process-wide lock.
///
/// Designed for the common embedded setup where one statically reserved
/// region backs the heap of the whole firmware. Until [`Self::init`] is
/// called every allocation fails.
///
/// # Examples
///
/// ```rust
/// use poolfit::GlobalPool;
/// use std::ptr::NonNull;
///
/// #[repr(align(16))]
/// struct Arena([u8; 65536]);
///
/// static HEAP: GlobalPool = GlobalPool::INIT;
///
/// let arena = Box::leak(Box::new(Arena([0; 65536])));
/// let size = unsafe { HEAP.init(NonNull::from(&mut arena.0[..])) }.unwrap();
/// assert!(size > 0);
///
/// let p = HEAP.allocate(256).unwrap();
/// unsafe { HEAP.deallocate(p.as_ptr()) };
/// ```
pub struct GlobalPool {
    pool: UnsafeCell<Option<Pool<'static>>>,
    mutex: os::Mutex,
}

// Safety: every access to `pool` happens behind `mutex`.
unsafe impl Send for GlobalPool {}
unsafe impl Sync for GlobalPool {}

impl const_default1::ConstDefault for GlobalPool {
    const DEFAULT: Self = Self::INIT;
}

impl GlobalPool {
    /// An unbound global pool.
    pub const INIT: Self = Self {
        pool: UnsafeCell::new(None),
        mutex: Init::INIT,
    };

    #[inline]
    fn lock_inner(&self) -> impl ops::DerefMut<Target = Option<Pool<'static>>> + '_ {
        struct LockGuard<'a>(&'a GlobalPool);

        impl ops::Deref for LockGuard<'_> {
            type Target = Option<Pool<'static>>;

            #[inline]
            fn deref(&self) -> &Self::Target {
                // Safety: Protected by `mutex`
                unsafe { &*self.0.pool.get() }
            }
        }

        impl ops::DerefMut for LockGuard<'_> {
            #[inline]
            fn deref_mut(&mut self) -> &mut Self::Target {
                // Safety: Protected by `mutex`
                unsafe { &mut *self.0.pool.get() }
            }
        }

        impl Drop for LockGuard<'_> {
            #[inline]
            fn drop(&mut self) {
                self.0.mutex.unlock();
            }
        }

        self.mutex.lock();
        LockGuard(self)
    }

    /// Bind the global pool to `region` and initialize it.
    ///
    /// Returns the usable size of the pool's first block. A region that
    /// already carries a live pool is reopened, as with
    /// [`Pool::init_ptr`].
    ///
    /// # Safety
    ///
    /// The conditions of [`Pool::init_ptr`] apply, with `'arena` being
    /// `'static`: the region must stay valid and otherwise untouched for
    /// the rest of the program.
    pub unsafe fn init(&self, region: NonNull<[u8]>) -> Result<usize, InitError> {
        let mut guard = self.lock_inner();
        let (pool, size) = Pool::init_ptr(region)?;
        *guard = Some(pool);
        Ok(size)
    }

    /// Allocate `size` bytes from the global pool.
    ///
    /// Returns `None` when the pool is unbound, the request exceeds
    /// [`REQUEST_LIMIT`], or no free block can hold it.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        if size > REQUEST_LIMIT {
            return None;
        }
        self.lock_inner().as_mut()?.allocate(size)
    }

    /// Return `ptr` to the global pool. A null `ptr` is a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or denote a live memory block previously
    /// returned by this pool.
    pub unsafe fn deallocate(&self, ptr: *mut u8) {
        let ptr = match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None => return,
        };
        let mut guard = self.lock_inner();
        match guard.as_mut() {
            Some(pool) => pool.deallocate(ptr),
            None => debug_assert!(false, "deallocating into an unbound global pool"),
        }
    }

    /// Managed bytes currently in use, bookkeeping included. Zero while
    /// the pool is unbound.
    pub fn used_size(&self) -> usize {
        self.lock_inner().as_ref().map_or(0, Pool::used_size)
    }

    /// High-water mark of [`Self::used_size`].
    pub fn max_size(&self) -> usize {
        self.lock_inner().as_ref().map_or(0, Pool::max_size)
    }
}

unsafe impl GlobalAlloc for GlobalPool {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > ALIGN {
            return ptr::null_mut();
        }
        self.allocate(layout.size())
            .map(NonNull::as_ptr)
            .unwrap_or(ptr::null_mut())
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        // Safety: `ptr` denotes a previous allocation from this pool
        self.deallocate(ptr);
    }
}
