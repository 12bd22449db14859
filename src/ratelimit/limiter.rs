//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tracing::{debug, info, trace, warn};

use super::bucket::TokenBucket;
use super::clock::{Clock, SystemClock};
use super::key::{BucketKey, EndpointKey};
use super::rules::{EndpointLimit, LimitRegistry, LimitsConfig};
use crate::error::Result;

/// Tokens charged for a single request.
const TOKENS_PER_REQUEST: u64 = 1;

/// Per-client, per-endpoint admission control.
///
/// Limits are read from an immutable [`LimitRegistry`] snapshot that is
/// replaced atomically on reload. Buckets live in a sharded map keyed by
/// `(client, endpoint)`; each bucket carries its own lock, so requests for
/// unrelated keys never wait on each other.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct RateLimiter {
    /// Active limit table
    registry: ArcSwap<LimitRegistry>,
    /// Token buckets indexed by bucket key
    buckets: DashMap<BucketKey, Arc<TokenBucket>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter over `registry` using the system clock.
    pub fn new(registry: LimitRegistry) -> Self {
        Self::with_clock(registry, Arc::new(SystemClock))
    }

    /// Create a rate limiter reading time from `clock`.
    pub fn with_clock(registry: LimitRegistry, clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(registry, clock, 0)
    }

    /// Create a rate limiter with room for `capacity` buckets preallocated.
    pub fn with_capacity(registry: LimitRegistry, clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            registry: ArcSwap::from_pointee(registry),
            buckets: DashMap::with_capacity(capacity),
            clock,
        }
    }

    /// Create a rate limiter from a serialized limit table.
    pub fn from_config(config: &LimitsConfig) -> Result<Self> {
        Ok(Self::new(LimitRegistry::from_config(config)?))
    }

    /// Decide whether a request from `client_identity` to `request_path`
    /// is admitted, charging one token if it is.
    pub fn allow(&self, client_identity: &str, request_path: &str) -> bool {
        let (endpoint, limit) = self.registry.load().resolve(request_path);
        let key = BucketKey::new(client_identity, endpoint);

        trace!(
            key = %key,
            path = %request_path,
            "Checking rate limit"
        );

        loop {
            let outcome = self
                .bucket_for(&key, limit)
                .and_then(|bucket| bucket.try_consume_live(TOKENS_PER_REQUEST));

            match outcome {
                Ok(Some(true)) => return true,
                Ok(Some(false)) => {
                    debug!(key = %key, "Rate limit exceeded");
                    return false;
                }
                // Evicted between lookup and consume; the sweeper has
                // already removed it, so the next lookup creates a fresh one.
                Ok(None) => continue,
                // Registry limits pass the same checks as bucket construction,
                // so this only fires if the two drift apart.
                Err(e) => {
                    warn!(key = %key, error = %e, "Token bucket rejected request");
                    debug_assert!(false, "validated limit rejected by token bucket: {}", e);
                    return false;
                }
            }
        }
    }

    /// Atomically fetch the bucket for `key`, creating it from `limit` if absent.
    fn bucket_for(&self, key: &BucketKey, limit: EndpointLimit) -> Result<Arc<TokenBucket>> {
        if let Some(bucket) = self.buckets.get(key) {
            return Ok(bucket.clone());
        }

        let bucket = self
            .buckets
            .entry(key.clone())
            .or_try_insert_with(|| {
                debug!(
                    key = %key,
                    capacity = limit.capacity,
                    refill_rate = limit.refill_tokens_per_second,
                    "Creating new token bucket"
                );
                TokenBucket::with_clock(
                    limit.capacity,
                    limit.refill_tokens_per_second,
                    self.clock.clone(),
                )
                .map(Arc::new)
            })?;
        Ok(bucket.clone())
    }

    /// Replace the active limit table.
    ///
    /// The new table is validated first; on error the current table stays
    /// active. Existing buckets keep the capacity and rate they were created
    /// with; only buckets created after the swap see the new limits.
    pub fn reload_limits(&self, config: LimitsConfig) -> Result<()> {
        let registry = LimitRegistry::from_config(&config)?;
        let endpoint_count = registry.len();
        self.registry.store(Arc::new(registry));

        info!(endpoints = endpoint_count, "Endpoint limits reloaded");
        Ok(())
    }

    /// Snapshot of the active limit table.
    pub fn limits(&self) -> Arc<LimitRegistry> {
        self.registry.load_full()
    }

    /// Remove buckets idle for at least `max_idle` that have refilled to
    /// capacity. Returns the number of buckets removed.
    ///
    /// A full bucket carries no state a fresh bucket would not, so eviction
    /// never changes an admission decision.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut removed = 0;
        self.buckets.retain(|_, bucket| {
            if bucket.retire_if_idle(max_idle) {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            debug!(
                removed = removed,
                remaining = self.buckets.len(),
                "Evicted idle token buckets"
            );
        }
        removed
    }

    /// Get the bucket for a client and endpoint, if one exists.
    pub fn bucket(&self, client_identity: &str, endpoint: &EndpointKey) -> Option<Arc<TokenBucket>> {
        let key = BucketKey::new(client_identity, endpoint.clone());
        self.buckets.get(&key).map(|bucket| bucket.clone())
    }

    /// Get the number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Clear all buckets.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.buckets.clear();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(LimitRegistry::default())
    }
}
