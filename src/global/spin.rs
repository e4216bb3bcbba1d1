use const_default1::ConstDefault;
use core::sync::atomic::{AtomicBool, Ordering};

pub struct Mutex(AtomicBool);

impl ConstDefault for Mutex {
    const DEFAULT: Self = Self(AtomicBool::new(false));
}

impl Mutex {
    #[inline]
    pub fn lock(&self) {
        while self
            .0
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
    }

    #[inline]
    pub fn unlock(&self) {
        self.0.store(false, Ordering::Release);
    }
}
