//! Background maintenance: limits file reloading and idle bucket eviction.
//!
//! Both loops run until the shutdown channel flips to `true` (or its sender
//! is dropped). A zero interval disables the loop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::ratelimit::{LimitsConfig, RateLimiter};

/// Polls the endpoint limits file and reloads the limiter when it changes.
pub struct LimitsWatcher {
    path: PathBuf,
    limiter: Arc<RateLimiter>,
    /// Last table successfully applied from the file
    applied: Option<LimitsConfig>,
}

impl LimitsWatcher {
    /// Create a watcher. `applied` is the table already loaded from `path`,
    /// if any, so an unchanged file does not trigger a reload.
    pub fn new(path: PathBuf, limiter: Arc<RateLimiter>, applied: Option<LimitsConfig>) -> Self {
        Self {
            path,
            limiter,
            applied,
        }
    }

    /// Read the file once and reload if its contents changed.
    ///
    /// Returns whether a reload happened. On error the limiter keeps its
    /// current table.
    pub fn poll(&mut self) -> Result<bool> {
        let contents = std::fs::read_to_string(&self.path)?;
        let config = LimitsConfig::from_yaml(&contents)?;

        if self.applied.as_ref() == Some(&config) {
            return Ok(false);
        }

        self.limiter.reload_limits(config.clone())?;
        self.applied = Some(config);
        Ok(true)
    }

    /// Poll every `period` until shutdown.
    pub async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        if period.is_zero() {
            debug!("Limits file reloading disabled");
            return;
        }

        info!(
            path = %self.path.display(),
            interval_secs = period.as_secs_f64(),
            "Watching endpoint limits file"
        );

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll() {
                        Ok(true) => info!(path = %self.path.display(), "Applied updated endpoint limits"),
                        Ok(false) => {}
                        Err(e) => warn!(
                            path = %self.path.display(),
                            error = %e,
                            "Failed to reload endpoint limits, keeping current table"
                        ),
                    }
                }
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
        }

        debug!("Limits watcher stopped");
    }
}

/// Evict idle, fully refilled buckets every `period` until shutdown.
pub async fn run_sweeper(
    limiter: Arc<RateLimiter>,
    period: Duration,
    idle_ttl: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    if period.is_zero() {
        debug!("Idle bucket sweeping disabled");
        return;
    }

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = limiter.sweep_idle(idle_ttl);
                debug!(
                    removed = removed,
                    buckets = limiter.bucket_count(),
                    "Idle bucket sweep finished"
                );
            }
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
    }

    debug!("Bucket sweeper stopped");
}
