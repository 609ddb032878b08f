//! Process-wide per-source rate limiting.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::domain::models::{RateLimitConfig, RateLimitsConfig, SourceId};

/// One token bucket per source, shared by every concurrent query.
///
/// Buckets are created up front; the map itself is never mutated, so the
/// limiter can be shared by `Arc` without locking.
#[derive(Clone)]
pub struct SourceRateLimiter {
    buckets: Arc<HashMap<SourceId, DefaultDirectRateLimiter>>,
}

impl std::fmt::Debug for SourceRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRateLimiter")
            .field("sources", &self.buckets.len())
            .finish()
    }
}

fn quota_for(limit: RateLimitConfig) -> Quota {
    let burst = NonZeroU32::new(limit.burst_size).unwrap_or(NonZeroU32::MIN);
    let period = if limit.requests_per_second > 0.0 {
        Duration::from_secs_f64(1.0 / limit.requests_per_second)
    } else {
        Duration::from_secs(1)
    };
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}

impl SourceRateLimiter {
    pub fn new(config: &RateLimitsConfig) -> Self {
        let buckets = SourceId::ALL
            .into_iter()
            .map(|source| {
                let quota = quota_for(config.for_source(source));
                (source, RateLimiter::direct(quota))
            })
            .collect();
        Self {
            buckets: Arc::new(buckets),
        }
    }

    /// Wait until `source` may be called again.
    pub async fn acquire(&self, source: SourceId) {
        let Some(bucket) = self.buckets.get(&source) else {
            return;
        };
        if bucket.check().is_err() {
            debug!(source = %source, "rate limit reached, waiting for capacity");
            bucket.until_ready().await;
        }
    }
}

impl Default for SourceRateLimiter {
    fn default() -> Self {
        Self::new(&RateLimitsConfig::default())
    }
}
