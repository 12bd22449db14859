//! Token bucket implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::clock::{Clock, SystemClock};
use crate::error::{Result, TollgateError};

/// A credit counter that refills continuously up to a fixed capacity.
///
/// Every operation first credits the time elapsed since the previous refill,
/// so the balance read or consumed is always current. All state lives behind
/// a per-bucket mutex; buckets for different keys never contend.
pub struct TokenBucket {
    /// Maximum number of tokens the bucket can hold
    capacity: u64,
    /// Tokens credited per second of elapsed time
    refill_rate: f64,
    state: Mutex<BucketState>,
    clock: Arc<dyn Clock>,
}

#[derive(Debug)]
struct BucketState {
    /// Current balance, `0 <= available <= capacity`
    available: f64,
    last_refill: Instant,
    last_access: Instant,
    /// Set once the bucket has been evicted from its table
    retired: bool,
}

impl TokenBucket {
    /// Create a full bucket using the system clock.
    pub fn new(capacity: u64, refill_rate: f64) -> Result<Self> {
        Self::with_clock(capacity, refill_rate, Arc::new(SystemClock))
    }

    /// Create a full bucket reading time from `clock`.
    pub fn with_clock(capacity: u64, refill_rate: f64, clock: Arc<dyn Clock>) -> Result<Self> {
        if capacity == 0 {
            return Err(TollgateError::InvalidArgument(
                "bucket capacity must be positive".to_string(),
            ));
        }
        if !(refill_rate.is_finite() && refill_rate > 0.0) {
            return Err(TollgateError::InvalidArgument(format!(
                "refill rate must be a positive number, got {}",
                refill_rate
            )));
        }

        let now = clock.now();
        Ok(Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                available: capacity as f64,
                last_refill: now,
                last_access: now,
                retired: false,
            }),
            clock,
        })
    }

    /// Try to consume `tokens` from the bucket.
    ///
    /// Returns `Ok(true)` and debits the balance if enough tokens are
    /// available, `Ok(false)` with the balance untouched otherwise.
    pub fn try_consume(&self, tokens: u64) -> Result<bool> {
        validate_tokens(tokens)?;
        let mut state = self.state.lock();
        Ok(self.consume_locked(&mut state, tokens))
    }

    /// Like [`try_consume`](Self::try_consume), but returns `None` without
    /// touching the balance if the bucket has been retired.
    pub(crate) fn try_consume_live(&self, tokens: u64) -> Result<Option<bool>> {
        validate_tokens(tokens)?;
        let mut state = self.state.lock();
        if state.retired {
            return Ok(None);
        }
        Ok(Some(self.consume_locked(&mut state, tokens)))
    }

    /// Current balance after refill, without consuming anything.
    pub fn peek(&self) -> f64 {
        let mut state = self.state.lock();
        let now = self.clock.now();
        self.refill(&mut state, now);
        state.available
    }

    /// Get the capacity of this bucket.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Get the refill rate in tokens per second.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Mark the bucket retired if it has not been touched for `max_idle` and
    /// has refilled to capacity. Returns whether it is retired.
    ///
    /// Peeking from the sweeper does not count as access.
    pub(crate) fn retire_if_idle(&self, max_idle: Duration) -> bool {
        let mut state = self.state.lock();
        if state.retired {
            return true;
        }

        let now = self.clock.now();
        if now.saturating_duration_since(state.last_access) < max_idle {
            return false;
        }

        self.refill(&mut state, now);
        if state.available >= self.capacity as f64 {
            state.retired = true;
        }
        state.retired
    }

    fn consume_locked(&self, state: &mut BucketState, tokens: u64) -> bool {
        let now = self.clock.now();
        self.refill(state, now);
        if now > state.last_access {
            state.last_access = now;
        }

        let tokens = tokens as f64;
        if state.available >= tokens {
            state.available -= tokens;
            true
        } else {
            false
        }
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        // A clock that went backwards yields zero here, never a debit.
        let elapsed = now.saturating_duration_since(state.last_refill);
        if elapsed.is_zero() {
            return;
        }

        let credit = elapsed.as_secs_f64() * self.refill_rate;
        state.available = (state.available + credit).min(self.capacity as f64);
        state.last_refill = now;
    }
}

impl std::fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucket")
            .field("capacity", &self.capacity)
            .field("refill_rate", &self.refill_rate)
            .field("state", &*self.state.lock())
            .finish()
    }
}

fn validate_tokens(tokens: u64) -> Result<()> {
    if tokens == 0 {
        return Err(TollgateError::InvalidArgument(
            "tokens to consume must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;

    const EPSILON: f64 = 1e-9;

    fn bucket(capacity: u64, rate: f64) -> (TokenBucket, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let bucket = TokenBucket::with_clock(capacity, rate, clock.clone()).unwrap();
        (bucket, clock)
    }

    #[test]
    fn test_new_bucket_starts_full() {
        let (bucket, _clock) = bucket(10, 1.0);
        assert_eq!(bucket.capacity(), 10);
        assert_eq!(bucket.refill_rate(), 1.0);
        assert!((bucket.peek() - 10.0).abs() < EPSILON);
    }

    #[test]
    fn test_invalid_construction_rejected() {
        assert!(matches!(
            TokenBucket::new(0, 1.0),
            Err(TollgateError::InvalidArgument(_))
        ));
        assert!(TokenBucket::new(5, 0.0).is_err());
        assert!(TokenBucket::new(5, -2.5).is_err());
        assert!(TokenBucket::new(5, f64::NAN).is_err());
        assert!(TokenBucket::new(5, f64::INFINITY).is_err());
    }

    #[test]
    fn test_zero_tokens_is_invalid_argument() {
        let (bucket, _clock) = bucket(3, 1.0);
        let result = bucket.try_consume(0);
        assert!(matches!(result, Err(TollgateError::InvalidArgument(_))));
        assert!((bucket.peek() - 3.0).abs() < EPSILON);
    }

    #[test]
    fn test_exact_depletion() {
        let (bucket, _clock) = bucket(5, 1.0);

        for _ in 0..5 {
            assert!(bucket.try_consume(1).unwrap());
        }

        // The 6th request should be rejected
        assert!(!bucket.try_consume(1).unwrap());
        assert!(bucket.peek().abs() < EPSILON);
    }

    #[test]
    fn test_rejection_leaves_balance_untouched() {
        let (bucket, _clock) = bucket(4, 1.0);
        assert!(bucket.try_consume(3).unwrap());
        assert!(!bucket.try_consume(2).unwrap());
        assert!((bucket.peek() - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_refill_is_linear_and_clamped() {
        let (bucket, clock) = bucket(10, 2.0);
        assert!(bucket.try_consume(10).unwrap());

        clock.advance(Duration::from_millis(1500));
        assert!((bucket.peek() - 3.0).abs() < EPSILON);

        clock.advance(Duration::from_secs(60));
        assert!((bucket.peek() - 10.0).abs() < EPSILON);
    }

    #[test]
    fn test_refill_monotonicity() {
        let (bucket, clock) = bucket(8, 0.75);
        assert!(bucket.try_consume(7).unwrap());

        let first = bucket.peek();
        for step_ms in [0u64, 250, 1000, 4000, 10_000] {
            let before = bucket.peek();
            clock.advance(Duration::from_millis(step_ms));
            let after = bucket.peek();
            let expected = (before + step_ms as f64 / 1000.0 * 0.75).min(8.0);
            assert!((after - expected).abs() < EPSILON);
        }
        assert!(bucket.peek() >= first);
    }

    #[test]
    fn test_fractional_accrual_is_preserved() {
        let (bucket, clock) = bucket(1, 1.0);
        assert!(bucket.try_consume(1).unwrap());

        // Three 0.4s steps add up to 1.2 tokens, even though no single
        // step crosses a whole token.
        clock.advance(Duration::from_millis(400));
        assert!(!bucket.try_consume(1).unwrap());
        clock.advance(Duration::from_millis(400));
        assert!(!bucket.try_consume(1).unwrap());
        clock.advance(Duration::from_millis(400));
        assert!(bucket.try_consume(1).unwrap());
    }

    #[test]
    fn test_recovery_after_wait() {
        let (bucket, clock) = bucket(3, 4.0);
        for _ in 0..3 {
            assert!(bucket.try_consume(1).unwrap());
        }
        assert!(!bucket.try_consume(1).unwrap());

        clock.advance(Duration::from_millis(250));
        assert!(bucket.try_consume(1).unwrap());
        assert!(!bucket.try_consume(1).unwrap());
    }

    #[test]
    fn test_clock_rewind_does_not_debit_or_reject() {
        let (bucket, clock) = bucket(5, 1.0);
        assert!(bucket.try_consume(2).unwrap());

        clock.rewind(Duration::from_secs(30));
        assert!((bucket.peek() - 3.0).abs() < EPSILON);
        assert!(bucket.try_consume(1).unwrap());
        assert!((bucket.peek() - 2.0).abs() < EPSILON);

        // Refill resumes from the last refill point once time catches up.
        clock.advance(Duration::from_secs(31));
        assert!((bucket.peek() - 3.0).abs() < EPSILON);
    }

    #[test]
    fn test_boundedness_over_mixed_operations() {
        let (bucket, clock) = bucket(6, 1.5);
        for i in 0..200u64 {
            let _ = bucket.try_consume(1 + i % 4).unwrap();
            clock.advance(Duration::from_millis((i * 37) % 900));
            let balance = bucket.peek();
            assert!((0.0..=6.0).contains(&balance), "balance {} out of range", balance);
        }
    }

    #[test]
    fn test_five_per_second_scenario() {
        let (bucket, clock) = bucket(5, 1.0);
        for _ in 0..5 {
            assert!(bucket.try_consume(1).unwrap());
        }
        assert!(!bucket.try_consume(1).unwrap());

        clock.advance(Duration::from_secs(2));
        assert!(bucket.try_consume(1).unwrap());
        assert!(!bucket.try_consume(2).unwrap());
    }

    #[test]
    fn test_retire_requires_idle_and_full() {
        let (bucket, clock) = bucket(2, 1.0);
        assert!(bucket.try_consume(2).unwrap());

        // Idle long enough, but not yet refilled.
        clock.advance(Duration::from_secs(1));
        assert!(!bucket.retire_if_idle(Duration::from_millis(500)));

        // Full, but touched too recently.
        clock.advance(Duration::from_secs(1));
        assert!(bucket.try_consume_live(1).unwrap().unwrap());
        clock.advance(Duration::from_secs(1));
        assert!(!bucket.retire_if_idle(Duration::from_secs(5)));

        clock.advance(Duration::from_secs(5));
        assert!(bucket.retire_if_idle(Duration::from_secs(5)));
        assert_eq!(bucket.try_consume_live(1).unwrap(), None);
        assert!((bucket.peek() - 2.0).abs() < EPSILON);
    }
}
