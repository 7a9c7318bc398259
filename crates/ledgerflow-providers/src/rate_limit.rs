use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter as GovernorLimiter};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};

use crate::capability::RateLimitConfig;

type Bucket = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Per-provider token-bucket rate limiter (spec §4.2). Each configured tier
/// (`requests_per_second/minute/hour`) is its own governor bucket; a request
/// waits on every configured bucket, so the tightest one effectively wins.
pub struct ProviderRateLimiter {
	buckets: Vec<Arc<Bucket>>,
}

fn make_bucket(quota: Quota) -> Arc<Bucket> {
	Arc::new(GovernorLimiter::direct(quota))
}

impl ProviderRateLimiter {
	pub fn new(config: &RateLimitConfig) -> Self {
		let mut buckets = Vec::new();
		let burst = config
			.burst_limit
			.and_then(NonZeroU32::new)
			.unwrap_or_else(|| NonZeroU32::new(1).unwrap());

		if let Some(rps) = config.requests_per_second.and_then(NonZeroU32::new) {
			buckets.push(make_bucket(Quota::per_second(rps).allow_burst(burst)));
		}
		if let Some(rpm) = config.requests_per_minute.and_then(NonZeroU32::new) {
			buckets.push(make_bucket(Quota::per_minute(rpm).allow_burst(burst)));
		}
		if let Some(rph) = config.requests_per_hour.and_then(NonZeroU32::new) {
			buckets.push(make_bucket(Quota::per_hour(rph).allow_burst(burst)));
		}

		Self { buckets }
	}

	/// Blocks until every configured tier has a token available.
	pub async fn acquire(&self) {
		for bucket in &self.buckets {
			bucket.until_ready().await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn generous_quota_does_not_block() {
		let limiter = ProviderRateLimiter::new(&RateLimitConfig {
			requests_per_second: Some(1000),
			requests_per_minute: Some(1000),
			requests_per_hour: None,
			burst_limit: Some(50),
		});

		for _ in 0..10 {
			limiter.acquire().await;
		}
	}

	#[test]
	fn no_configured_tiers_means_no_buckets() {
		let limiter = ProviderRateLimiter::new(&RateLimitConfig {
			requests_per_second: None,
			requests_per_minute: None,
			requests_per_hour: None,
			burst_limit: None,
		});
		assert!(limiter.buckets.is_empty());
	}
}
