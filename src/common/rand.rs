//! Randomness helpers: endpoint-pool shuffling, reconnect jitter, and inbox
//! tokens. Grounded on `riverdb::worker::Worker`, which keeps a per-thread
//! `nanorand::WyRand` rather than reaching for a global mutex-guarded RNG.
//! This crate doesn't have the teacher's pinned worker-thread pool, so the
//! RNG lives in a plain `thread_local!` instead of a `Worker` slab.

use std::cell::RefCell;
use std::time::Duration;

use nanorand::{Rng, WyRand};

thread_local! {
    static RNG: RefCell<WyRand> = RefCell::new(WyRand::new());
}

/// Fisher-Yates shuffle, used once at pool-build time when `no_randomize` is
/// not set.
pub fn shuffle<T>(items: &mut [T]) {
    if items.len() < 2 {
        return;
    }
    RNG.with(|rng| {
        let mut rng = rng.borrow_mut();
        for i in (1..items.len()).rev() {
            let j = (rng.generate::<u32>() as usize) % (i + 1);
            items.swap(i, j);
        }
    });
}

/// Adds a uniform random duration in `[0, max_jitter]` to `base`.
pub fn jitter(base: Duration, max_jitter: Duration) -> Duration {
    if max_jitter.is_zero() {
        return base;
    }
    let extra_nanos = RNG.with(|rng| {
        let max_nanos = max_jitter.as_nanos().min(u64::MAX as u128) as u64;
        if max_nanos == 0 {
            0
        } else {
            rng.borrow_mut().generate::<u64>() % (max_nanos + 1)
        }
    });
    base + Duration::from_nanos(extra_nanos)
}

/// Generates a cryptographically-irrelevant but collision-resistant-enough
/// random token for inbox subjects, as a lowercase hex string. Per
/// SPEC_FULL.md §4.E / design note, uniqueness (not unpredictability against
/// an adversary) is the actual requirement here: the inbox subject is already
/// private to this connection.
pub fn inbox_token() -> String {
    RNG.with(|rng| {
        let mut rng = rng.borrow_mut();
        let bytes: [u8; 12] = std::array::from_fn(|_| rng.generate::<u8>());
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    })
}
