use chrono::{DateTime, Utc};
use ledgerflow_types::CircuitState;
use uuid::Uuid;

/// Typed progress envelopes consumed by the UI collaborator (spec §4.9).
#[derive(Debug, Clone)]
pub enum Envelope {
	ImportStarted { account_id: Uuid, at: DateTime<Utc> },
	ImportCompleted { account_id: Uuid, imported: u64, skipped: u64, at: DateTime<Utc> },
	ImportFailed { account_id: Uuid, reason: String, at: DateTime<Utc> },
	ProcessBatchStarted { account_id: Uuid, chunk_index: usize, at: DateTime<Utc> },
	ProcessBatchCompleted { account_id: Uuid, chunk_index: usize, transactions_written: u64, at: DateTime<Utc> },
	ProviderCircuitOpen { blockchain_or_exchange: String, provider_name: String, at: DateTime<Utc> },
	ProviderTransition { blockchain_or_exchange: String, provider_name: String, state: CircuitState, at: DateTime<Utc> },
}

/// In-process pub/sub over `async_broadcast`, the same channel the teacher
/// already depends on (spec §4.9, §5). Ordering within one `accountId` holds
/// because every account's events are published by a single serial task
/// (spec §5: "inside a stream: single-flight"); a single shared channel then
/// preserves that per-account order as a special case of global publish
/// order. Overflow mode means `publish` never blocks or backpressures the
/// publisher — a receiver too slow to keep up silently misses the oldest
/// events instead (spec §4.9: "consumers cannot backpressure; slow consumers
/// are detached").
pub struct EventBus {
	sender: async_broadcast::Sender<Envelope>,
}

impl EventBus {
	pub fn new(capacity: usize) -> (Self, async_broadcast::Receiver<Envelope>) {
		let (mut sender, receiver) = async_broadcast::broadcast(capacity);
		sender.set_overflow(true);
		(Self { sender }, receiver)
	}

	pub fn publish(&self, envelope: Envelope) {
		let _ = self.sender.try_broadcast(envelope);
	}

	pub fn subscribe(&self) -> async_broadcast::Receiver<Envelope> {
		self.sender.new_receiver()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures_util::StreamExt;

	#[tokio::test]
	async fn subscriber_receives_published_events_in_order() {
		let (bus, mut rx) = EventBus::new(8);
		let account_id = Uuid::new_v4();
		bus.publish(Envelope::ImportStarted { account_id, at: Utc::now() });
		bus.publish(Envelope::ImportCompleted { account_id, imported: 3, skipped: 1, at: Utc::now() });

		let first = rx.next().await.unwrap();
		assert!(matches!(first, Envelope::ImportStarted { .. }));
		let second = rx.next().await.unwrap();
		assert!(matches!(second, Envelope::ImportCompleted { imported: 3, skipped: 1, .. }));
	}

	#[tokio::test]
	async fn publish_never_blocks_a_full_receiver() {
		let (bus, _rx) = EventBus::new(1);
		let account_id = Uuid::new_v4();
		for _ in 0..10 {
			bus.publish(Envelope::ImportStarted { account_id, at: Utc::now() });
		}
	}
}
