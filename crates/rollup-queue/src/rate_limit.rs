// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-tenant token-bucket rate limiter gating `create`, `update`, and `run`
//! (§4.9, §5).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rollup_core::model::TenantId;
use rollup_error::{ErrorCode, RollupError, RollupResult};

/// `maxRequestsPerWindow` spread evenly over `window` as a refill rate, plus
/// a `burstAllowance` bucket capacity above the steady-state rate.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub max_requests_per_window: u32,
    pub window: Duration,
    pub burst_allowance: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { max_requests_per_window: 60, window: Duration::from_secs(60), burst_allowance: 10 }
    }
}

impl RateLimiterConfig {
    fn capacity(&self) -> f64 {
        f64::from(self.max_requests_per_window) + f64::from(self.burst_allowance)
    }

    fn refill_per_sec(&self) -> f64 {
        f64::from(self.max_requests_per_window) / self.window.as_secs_f64()
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe per-tenant token buckets, one lazily created per tenant on
/// first use.
pub struct TenantRateLimiter {
    config: RateLimiterConfig,
    buckets: Mutex<HashMap<TenantId, Bucket>>,
}

impl TenantRateLimiter {
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self { config, buckets: Mutex::new(HashMap::new()) }
    }

    /// Consumes one token for `tenant`, refilling first based on elapsed
    /// time.
    ///
    /// # Errors
    ///
    /// Returns `LIMIT_RATE` with `retry_after_secs` set to the time until
    /// the next token becomes available when the bucket is empty.
    pub fn check(&self, tenant: TenantId) -> RollupResult<()> {
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let now = Instant::now();
        let capacity = self.config.capacity();
        let refill_rate = self.config.refill_per_sec();
        let bucket = buckets.entry(tenant).or_insert_with(|| Bucket { tokens: capacity, last_refill: now });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * refill_rate).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            let retry_after_secs = (deficit / refill_rate).ceil() as u64;
            Err(RollupError::new(ErrorCode::LimitRate, format!("rate limit exceeded for tenant {tenant}"))
                .with_retry_after(retry_after_secs.max(1)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn burst_allowance_permits_initial_spike() {
        let limiter = TenantRateLimiter::new(RateLimiterConfig { max_requests_per_window: 1, window: Duration::from_secs(60), burst_allowance: 3 });
        let tenant = Uuid::new_v4();
        for _ in 0..4 {
            limiter.check(tenant).unwrap();
        }
        let err = limiter.check(tenant).unwrap_err();
        assert_eq!(err.code, ErrorCode::LimitRate);
        assert!(err.retry_after_secs.is_some());
    }

    #[test]
    fn separate_tenants_do_not_share_a_bucket() {
        let limiter = TenantRateLimiter::new(RateLimiterConfig { max_requests_per_window: 1, window: Duration::from_secs(60), burst_allowance: 0 });
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        limiter.check(a).unwrap();
        limiter.check(a).unwrap_err();
        limiter.check(b).unwrap();
    }
}
