//! Injectable time source.
//!
//! The optimizer and estimator both need "now" to evict stale state. A
//! trait object lets tests advance time deterministically instead of
//! sleeping real wall-clock seconds, mirroring the injectable
//! `support::Chrono` the original `LocalOptimizerAsync`/`RttEstimator`
//! took as a constructor dependency.

use std::sync::atomic::{AtomicU64, Ordering};

/// A source of monotonically-nondecreasing seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// Wall-clock time via `SystemTime`.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_secs_f64()
    }
}

/// A clock tests can advance explicitly. Stored as bits of an `f64` in an
/// `AtomicU64` so `set`/`advance` work through a shared `&ManualClock`.
#[derive(Debug)]
pub struct ManualClock {
    now_bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now_bits: AtomicU64::new(start.to_bits()),
        }
    }

    pub fn set(&self, now: f64) {
        self.now_bits.store(now.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, delta: f64) {
        self.set(self.now() + delta);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::SeqCst))
    }
}
