//! Jittered exponential backoff for reconnect scheduling.

use std::time::Duration;

use rand::Rng;

/// Maximum fraction of the delay added as random jitter.
const JITTER_FRACTION: f64 = 0.25;

/// Produces the delay sequence gating reconnect attempts: exponential growth
/// from a base, doubling per attempt, clamped to a maximum, with a small
/// random jitter so a fleet of clients does not reconnect in lockstep.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// The next delay in the sequence. Called once per failed attempt.
    pub fn next(&mut self) -> Duration {
        let factor = 1u32 << self.attempt.min(16);
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.base.saturating_mul(factor).min(self.max);
        let jitter = delay.mul_f64(rand::thread_rng().gen_range(0.0..JITTER_FRACTION));
        (delay + jitter).min(self.max)
    }

    /// Return the sequence to its initial delay. Called when registration
    /// succeeds.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        let mut last = Duration::ZERO;
        for expected_base in [1u64, 2, 4, 8, 16, 30, 30] {
            let d = b.next();
            let base = Duration::from_secs(expected_base);
            assert!(d >= base || d == Duration::from_secs(30), "delay {d:?} below {base:?}");
            assert!(d <= Duration::from_secs(30));
            last = d;
        }
        assert_eq!(last, Duration::from_secs(30));
    }

    #[test]
    fn reset_returns_to_base() {
        let mut b = Backoff::default();
        for _ in 0..6 {
            b.next();
        }
        b.reset();
        let d = b.next();
        assert!(d < Duration::from_secs(2));
    }

    #[test]
    fn no_overflow_after_many_attempts() {
        let mut b = Backoff::default();
        for _ in 0..100 {
            assert!(b.next() <= Duration::from_secs(30));
        }
    }
}
