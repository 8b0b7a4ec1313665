//! Injectable time and randomness so retry backoff, heartbeat timeouts, and
//! discovery tie-breaking are deterministic under test (teacher's
//! `resilience` crate threads `Instant::now()` directly; we generalize it
//! behind a trait so workflow/orchestrator tests can advance time and pin
//! random choices without sleeping real wall-clock time).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only advances when told to, for deterministic timeout and
/// retry-backoff tests.
#[derive(Debug, Clone)]
pub struct FixedClock {
    inner: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut guard = self.inner.lock();
        *guard += duration;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.inner.lock() = at;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.lock()
    }
}

/// Source of randomness for jittered backoff and `RANDOM`/`WEIGHTED_HEALTH`
/// discovery tie-breaking.
pub trait RngSource: Send + Sync + fmt::Debug {
    fn gen_range_u64(&self, low: u64, high: u64) -> u64;
    fn gen_f64(&self) -> f64;
}

#[derive(Debug, Default)]
pub struct SystemRng;

impl RngSource for SystemRng {
    fn gen_range_u64(&self, low: u64, high: u64) -> u64 {
        if low >= high {
            return low;
        }
        rand::thread_rng().gen_range(low..high)
    }

    fn gen_f64(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Seeded, reproducible RNG for tests asserting on `RANDOM` discovery or
/// jitter behavior.
#[derive(Debug)]
pub struct SeededRng {
    inner: Mutex<StdRng>,
    calls: AtomicU64,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Mutex::new(StdRng::seed_from_u64(seed)),
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl RngSource for SeededRng {
    fn gen_range_u64(&self, low: u64, high: u64) -> u64 {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if low >= high {
            return low;
        }
        self.inner.lock().gen_range(low..high)
    }

    fn gen_f64(&self) -> f64 {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().gen::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_only_moves_when_advanced() {
        let start = Utc::now();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(30));
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let a = SeededRng::new(7);
        let b = SeededRng::new(7);
        let seq_a: Vec<u64> = (0..5).map(|_| a.gen_range_u64(0, 100)).collect();
        let seq_b: Vec<u64> = (0..5).map(|_| b.gen_range_u64(0, 100)).collect();
        assert_eq!(seq_a, seq_b);
    }
}
