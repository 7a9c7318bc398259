use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::OnceCell;

/// A short-TTL cache for idempotent one-shot provider calls (spec §4.2),
/// keyed by `Operation::cache_key`. Concurrent callers requesting the same
/// key share a single in-flight request rather than each issuing their own
/// — the same "dedupe in flight, cache on completion" idea as the teacher's
/// `caching_request.rs`, implemented with a per-key `OnceCell` instead of a
/// dedicated actor task.
pub struct ResponseCache {
	ttl: Duration,
	entries: DashMap<String, Arc<Entry>>,
}

struct Entry {
	inserted_at: Instant,
	cell: OnceCell<Result<Value, String>>,
}

impl ResponseCache {
	pub fn new(ttl: Duration) -> Self {
		Self { ttl, entries: DashMap::new() }
	}

	/// Returns the cached value for `key`, computing it via `fetch` at most
	/// once across concurrent callers. Expired entries are dropped and
	/// refetched transparently.
	pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<Value, String>
	where
		F: FnOnce() -> Fut,
		Fut: std::future::Future<Output = Result<Value, String>>,
	{
		let fresh = self.entries.get(key).filter(|e| e.inserted_at.elapsed() < self.ttl).map(|e| e.clone());
		let entry = match fresh {
			Some(entry) => entry,
			None => {
				let entry = Arc::new(Entry { inserted_at: Instant::now(), cell: OnceCell::new() });
				self.entries.insert(key.to_string(), entry.clone());
				entry
			}
		};
		entry.cell.get_or_init(fetch).await.clone()
	}

	pub fn invalidate(&self, key: &str) {
		self.entries.remove(key);
	}

	pub fn clear(&self) {
		self.entries.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	#[tokio::test]
	async fn concurrent_callers_share_one_fetch() {
		let cache = ResponseCache::new(Duration::from_secs(60));
		let calls = Arc::new(AtomicU32::new(0));

		let do_fetch = || {
			let calls = calls.clone();
			async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Ok(Value::from(42))
			}
		};

		let (a, b) = tokio::join!(
			cache.get_or_fetch("k", do_fetch),
			cache.get_or_fetch("k", do_fetch),
		);
		assert_eq!(a.unwrap(), Value::from(42));
		assert_eq!(b.unwrap(), Value::from(42));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn invalidate_forces_refetch() {
		let cache = ResponseCache::new(Duration::from_secs(60));
		let calls = Arc::new(AtomicU32::new(0));
		let do_fetch = || {
			let calls = calls.clone();
			async move {
				let n = calls.fetch_add(1, Ordering::SeqCst);
				Ok(Value::from(n))
			}
		};

		cache.get_or_fetch("k", do_fetch).await.unwrap();
		cache.invalidate("k");
		cache.get_or_fetch("k", do_fetch).await.unwrap();
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}
}
