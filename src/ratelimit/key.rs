//! Bucket key generation and handling.

use std::fmt;

/// Name shown for the fallback endpoint in logs.
const FALLBACK_LABEL: &str = "__FALLBACK__";

/// The endpoint half of a bucket key.
///
/// The fallback is its own variant rather than a reserved string, so no
/// configured pattern can ever share a bucket with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EndpointKey {
    /// A configured endpoint pattern
    Pattern(String),
    /// No pattern matched; the fallback limit applies
    Fallback,
}

impl EndpointKey {
    pub fn pattern(pattern: impl Into<String>) -> Self {
        EndpointKey::Pattern(pattern.into())
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, EndpointKey::Fallback)
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKey::Pattern(pattern) => f.write_str(pattern),
            EndpointKey::Fallback => f.write_str(FALLBACK_LABEL),
        }
    }
}

/// A key that uniquely identifies one token bucket: a client identity
/// paired with the endpoint it is being limited on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    /// Client identity as supplied by the caller
    pub client: String,
    /// Matched endpoint pattern, or the fallback
    pub endpoint: EndpointKey,
}

impl BucketKey {
    pub fn new(client: &str, endpoint: EndpointKey) -> Self {
        Self {
            client: client.to_string(),
            endpoint,
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.client, self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_key_to_string() {
        let key = BucketKey::new("10.0.0.1", EndpointKey::pattern("/api/**"));
        assert_eq!(key.to_string(), "10.0.0.1|/api/**");

        let key = BucketKey::new("10.0.0.1", EndpointKey::Fallback);
        assert_eq!(key.to_string(), "10.0.0.1|__FALLBACK__");
    }

    #[test]
    fn test_fallback_never_equals_a_pattern() {
        let fallback = BucketKey::new("c", EndpointKey::Fallback);
        let lookalike = BucketKey::new("c", EndpointKey::pattern(FALLBACK_LABEL));

        assert_ne!(fallback, lookalike);
        assert!(fallback.endpoint.is_fallback());
        assert!(!lookalike.endpoint.is_fallback());
    }

    #[test]
    fn test_bucket_key_equality() {
        let key1 = BucketKey::new("client", EndpointKey::pattern("/hello"));
        let key2 = BucketKey::new("client", EndpointKey::pattern("/hello"));
        let key3 = BucketKey::new("other", EndpointKey::pattern("/hello"));

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
    }
}
