//! Endpoint limit configuration and the limit registry.
//!
//! `LimitsConfig` is the serialized form (YAML file, admin API body).
//! `LimitRegistry` is its validated, compiled form: an immutable snapshot
//! that the rate limiter swaps wholesale on reload.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::key::EndpointKey;
use super::pattern::{best_match, PathPattern};
use crate::error::{Result, TollgateError};

/// Capacity of the fallback limit when none is configured.
const DEFAULT_FALLBACK_CAPACITY: u64 = 20;
/// Refill rate of the fallback limit when none is configured.
const DEFAULT_FALLBACK_REFILL: f64 = 10.0;

/// Token bucket parameters for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointLimit {
    /// Maximum burst size, in tokens
    pub capacity: u64,
    /// Sustained rate, in tokens per second
    #[serde(alias = "refill-tokens-per-second")]
    pub refill_tokens_per_second: f64,
}

impl EndpointLimit {
    pub fn new(capacity: u64, refill_tokens_per_second: f64) -> Self {
        Self {
            capacity,
            refill_tokens_per_second,
        }
    }

    /// Check that the limit can back a token bucket.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(TollgateError::Config(
                "capacity must be a positive integer".to_string(),
            ));
        }
        if !(self.refill_tokens_per_second.is_finite() && self.refill_tokens_per_second > 0.0) {
            return Err(TollgateError::Config(format!(
                "refill_tokens_per_second must be a positive number, got {}",
                self.refill_tokens_per_second
            )));
        }
        Ok(())
    }
}

impl Default for EndpointLimit {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_CAPACITY, DEFAULT_FALLBACK_REFILL)
    }
}

/// Serialized limit table: endpoint patterns plus the fallback limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Map of endpoint pattern to its limit
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointLimit>,
    /// Limit applied when no pattern matches
    #[serde(default)]
    pub fallback: EndpointLimit,
}

impl LimitsConfig {
    /// Create a configuration with no endpoint patterns and the default fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the limit for a pattern.
    pub fn with_endpoint(mut self, pattern: &str, limit: EndpointLimit) -> Self {
        self.endpoints.insert(pattern.to_string(), limit);
        self
    }

    /// Replace the fallback limit.
    pub fn with_fallback(mut self, fallback: EndpointLimit) -> Self {
        self.fallback = fallback;
        self
    }

    /// Load configuration from a YAML (or JSON) file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading endpoint limits");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse endpoint limits: {}", e)))
    }
}

/// Compiled, validated limit table.
#[derive(Debug, Clone)]
pub struct LimitRegistry {
    patterns: Vec<PathPattern>,
    limits: BTreeMap<String, EndpointLimit>,
    fallback: EndpointLimit,
}

impl LimitRegistry {
    /// Build a registry from `(pattern, limit)` pairs.
    ///
    /// When a pattern appears more than once the last entry wins. Any
    /// invalid limit or empty pattern fails the whole registry.
    pub fn new<I>(endpoints: I, fallback: EndpointLimit) -> Result<Self>
    where
        I: IntoIterator<Item = (String, EndpointLimit)>,
    {
        fallback
            .validate()
            .map_err(|e| TollgateError::Config(format!("fallback: {}", e)))?;

        let limits: BTreeMap<String, EndpointLimit> = endpoints.into_iter().collect();

        let mut patterns = Vec::with_capacity(limits.len());
        for (pattern, limit) in &limits {
            limit
                .validate()
                .map_err(|e| TollgateError::Config(format!("endpoint '{}': {}", pattern, e)))?;
            patterns.push(PathPattern::new(pattern)?);
        }

        Ok(Self {
            patterns,
            limits,
            fallback,
        })
    }

    /// Build a registry from its serialized form.
    pub fn from_config(config: &LimitsConfig) -> Result<Self> {
        Self::new(
            config
                .endpoints
                .iter()
                .map(|(pattern, limit)| (pattern.clone(), *limit)),
            config.fallback,
        )
    }

    /// Serialize the registry back to its configuration form.
    pub fn to_config(&self) -> LimitsConfig {
        LimitsConfig {
            endpoints: self.limits.clone(),
            fallback: self.fallback,
        }
    }

    /// Find the endpoint key and limit that apply to `path`.
    pub fn resolve(&self, path: &str) -> (EndpointKey, EndpointLimit) {
        best_match(&self.patterns, path)
            .and_then(|pattern| {
                self.limits
                    .get(pattern.as_str())
                    .map(|limit| (EndpointKey::pattern(pattern.as_str()), *limit))
            })
            .unwrap_or((EndpointKey::Fallback, self.fallback))
    }

    /// Get the limit configured for an exact pattern string.
    pub fn get(&self, pattern: &str) -> Option<&EndpointLimit> {
        self.limits.get(pattern)
    }

    /// Get the fallback limit.
    pub fn fallback(&self) -> &EndpointLimit {
        &self.fallback
    }

    /// Number of configured patterns, excluding the fallback.
    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}

impl Default for LimitRegistry {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            limits: BTreeMap::new(),
            fallback: EndpointLimit::default(),
        }
    }
}
