//! Pipeline events and the event bus that carries them.
//!
//! Components publish progress here; callers that detached simply stop
//! listening and any undelivered event is dropped.

use crate::{StatusResult, TransactionHash, WebhookResponse};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Top-level event type, grouped by the stage that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
	Transaction(TransactionEvent),
	Dispatch(DispatchEvent),
}

/// Events from submission and status resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransactionEvent {
	Submitted {
		process_id: String,
		tx_hash: TransactionHash,
	},
	Resolved {
		process_id: String,
		tx_hash: TransactionHash,
		status: StatusResult,
	},
}

/// Events from the webhook dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DispatchEvent {
	RetryScheduled {
		process_id: String,
		attempt: u32,
		next_retry_at: u64,
		error: String,
	},
	Delivered {
		process_id: String,
		response: WebhookResponse,
	},
	Exhausted {
		process_id: String,
		attempts: u32,
	},
}

/// Broadcast bus shared by every pipeline component.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Publishes an event. Fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: PipelineEvent,
	) -> Result<usize, broadcast::error::SendError<PipelineEvent>> {
		self.sender.send(event)
	}

	pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
		self.sender.subscribe()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1000)
	}
}
