//! Rate limiting logic and state management.

mod bucket;
mod clock;
mod key;
mod limiter;
mod pattern;
mod rules;

pub use bucket::TokenBucket;
pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{BucketKey, EndpointKey};
pub use limiter::RateLimiter;
pub use pattern::{best_match, PathPattern};
pub use rules::{EndpointLimit, LimitRegistry, LimitsConfig};
