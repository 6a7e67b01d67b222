//! A word-sized atomic cell for small `Copy` types, adapted from
//! `riverdb::common::atomic_cell::AtomicCell`. Used to store the connection
//! and reconnector state enums so reads never need to take a lock on the hot
//! path (every `publish` call checks the connection state).
//!
//! Unlike the teacher's version, this is narrowed to the one width this
//! crate actually needs (`u8`-sized enums) rather than picking an atomic
//! width generically via a macro — the extra generality bought nothing here
//! and the transmute-based dispatch was the riskiest part of the original.

use std::sync::atomic::{AtomicU8, Ordering};

pub struct AtomicCell<T: Copy + Into<u8> + From<u8>> {
    raw: AtomicU8,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Copy + Into<u8> + From<u8>> AtomicCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            raw: AtomicU8::new(value.into()),
            _marker: std::marker::PhantomData,
        }
    }

    #[inline]
    pub fn load(&self) -> T {
        T::from(self.raw.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, value: T) {
        self.raw.store(value.into(), Ordering::Release);
    }

    #[inline]
    pub fn swap(&self, value: T) -> T {
        T::from(self.raw.swap(value.into(), Ordering::AcqRel))
    }

    /// Stores `new` only if the current value equals `current`. Returns the
    /// previous value either way, like `compare_exchange`.
    #[inline]
    pub fn compare_exchange(&self, current: T, new: T) -> Result<T, T> {
        match self
            .raw
            .compare_exchange(current.into(), new.into(), Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(v) => Ok(T::from(v)),
            Err(v) => Err(T::from(v)),
        }
    }
}

impl<T: Copy + Into<u8> + From<u8> + Default> Default for AtomicCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
