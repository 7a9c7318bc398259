use lru::LruCache;
use std::num::NonZeroUsize;

/// Fixed-size seen-set over `eventId`, used to suppress duplicates produced
/// when a new provider resumes a stream inside the old provider's replay
/// window (spec §4.3 step 3). Default window is 256 records; per spec §9's
/// open question, sources with block-based replay windows should size this
/// comfortably larger than their maximum expected replay count.
pub struct DedupWindow {
	seen: LruCache<String, ()>,
}

pub const DEFAULT_WINDOW: usize = 256;

impl DedupWindow {
	pub fn new(capacity: usize) -> Self {
		let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
		Self { seen: LruCache::new(capacity) }
	}

	/// Returns `true` if `event_id` had not been seen before (i.e. it
	/// should be yielded downstream), marking it seen either way.
	pub fn admit(&mut self, event_id: &str) -> bool {
		if self.seen.contains(event_id) {
			self.seen.promote(event_id);
			false
		} else {
			self.seen.put(event_id.to_string(), ());
			true
		}
	}

	pub fn seed(&mut self, event_id: &str) {
		self.seen.put(event_id.to_string(), ());
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn admits_each_id_once() {
		let mut window = DedupWindow::new(DEFAULT_WINDOW);
		assert!(window.admit("a"));
		assert!(!window.admit("a"));
		assert!(window.admit("b"));
	}

	#[test]
	fn evicts_oldest_beyond_capacity() {
		let mut window = DedupWindow::new(2);
		window.admit("a");
		window.admit("b");
		window.admit("c"); // evicts "a"
		assert!(window.admit("a"));
	}
}
