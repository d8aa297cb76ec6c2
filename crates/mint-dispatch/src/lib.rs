//! Retryable, idempotent webhook dispatch.
//!
//! One job per `process_id`. A job is attempted until it is delivered, runs
//! out of attempts, or outlives its retention window; each of those ends it
//! for good and leaves a terminal record behind. Between attempts the job is
//! persisted so [`RetryableDispatcher::resume_pending`] can pick it up after a
//! restart. A per-key guard keeps two dispatches for the same key from ever
//! running at once.

use async_trait::async_trait;
use mint_config::WebhookConfig;
use mint_storage::{StorageError, StorageService};
use mint_types::{
	current_timestamp_millis, truncate_id, DispatchEvent, DispatchRecord, EventBus,
	PipelineEvent, StorageKey, TerminalOutcome, WebhookJob, WebhookResponse,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

pub mod guard;
pub mod policy;
pub mod recovery;

pub mod implementations {
	pub mod http;
}

pub use guard::{KeyGuard, KeyedLocks};
pub use policy::RetryPolicy;
pub use recovery::RecoveryReport;

/// Failure of a single delivery attempt. Always retryable.
#[derive(Debug, Error)]
pub enum WebhookError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Webhook returned HTTP {0}")]
	Status(u16),
	#[error("Invalid webhook response: {0}")]
	InvalidResponse(String),
	#[error("Webhook reported success: false")]
	Rejected,
}

#[derive(Debug, Error)]
pub enum DispatchError {
	/// A job or terminal record could not be read or written.
	#[error("Storage error: {0}")]
	Storage(String),
	/// The spawned delivery task panicked or was cancelled.
	#[error("Dispatch task failed: {0}")]
	Task(String),
	#[error("Invalid payload: {0}")]
	Payload(String),
}

impl From<StorageError> for DispatchError {
	fn from(err: StorageError) -> Self {
		DispatchError::Storage(err.to_string())
	}
}

/// The downstream endpoint that performs the off-chain work.
#[async_trait]
pub trait WebhookInterface: Send + Sync {
	/// One delivery attempt. `Ok` only for a 2xx response with `success: true`.
	async fn deliver(&self, payload: &serde_json::Value) -> Result<WebhookResponse, WebhookError>;
}

/// Result of a `dispatch` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
	Delivered(WebhookResponse),
	/// Every attempt failed.
	Exhausted { attempts: u32 },
	/// Dropped after outliving the retention window.
	Expired { attempts: u32 },
	/// Another dispatch for this key is running; nothing was done.
	InFlight,
	/// The key already reached a terminal outcome earlier; nothing was done.
	AlreadyCompleted(DispatchRecord),
}

impl From<TerminalOutcome> for DispatchOutcome {
	fn from(outcome: TerminalOutcome) -> Self {
		match outcome {
			TerminalOutcome::Delivered { response } => DispatchOutcome::Delivered(response),
			TerminalOutcome::Exhausted { attempts } => DispatchOutcome::Exhausted { attempts },
			TerminalOutcome::Expired { attempts } => DispatchOutcome::Expired { attempts },
		}
	}
}

/// Where a key currently stands.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobView {
	Pending { job: WebhookJob, in_flight: bool },
	Completed { record: DispatchRecord },
	NotFound,
}

/// Limits for webhook delivery.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
	/// Delivery attempts before a job is exhausted.
	pub max_attempts: u32,
	pub policy: RetryPolicy,
	/// Lifetime of a job, measured from its creation.
	pub retention: Duration,
}

impl Default for DispatcherConfig {
	fn default() -> Self {
		Self {
			max_attempts: 18,
			policy: RetryPolicy::default(),
			retention: Duration::from_secs(300),
		}
	}
}

impl From<&WebhookConfig> for DispatcherConfig {
	fn from(config: &WebhookConfig) -> Self {
		Self {
			max_attempts: config.max_attempts,
			policy: RetryPolicy::from(config),
			retention: config.retention(),
		}
	}
}

/// Delivers webhooks with retries, persisting jobs between attempts.
///
/// Cheap to clone; clones share the per-key guards, storage and event bus.
#[derive(Clone)]
pub struct RetryableDispatcher {
	webhook: Arc<dyn WebhookInterface>,
	storage: Arc<StorageService>,
	locks: KeyedLocks,
	config: DispatcherConfig,
	event_bus: EventBus,
}

impl RetryableDispatcher {
	/// Creates a dispatcher.
	///
	/// Jobs and terminal records live in `storage` under the
	/// `webhook_retry` and `webhook_outcome` namespaces. Retries and terminal
	/// outcomes are announced on `event_bus`.
	pub fn new(
		webhook: Arc<dyn WebhookInterface>,
		storage: Arc<StorageService>,
		config: DispatcherConfig,
		event_bus: EventBus,
	) -> Self {
		Self {
			webhook,
			storage,
			locks: KeyedLocks::new(),
			config,
			event_bus,
		}
	}

	/// Whether a dispatch for `process_id` is running in this process.
	pub fn is_in_flight(&self, process_id: &str) -> bool {
		self.locks.is_held(process_id)
	}

	/// Dispatches the webhook for `process_id` and waits for a terminal outcome.
	///
	/// Returns `InFlight` at once if the key is already being dispatched, and
	/// `AlreadyCompleted` if it reached a terminal outcome before. A persisted
	/// job for the key is continued from its attempt count and keeps its
	/// original payload. The job runs on its own task: dropping the returned
	/// future detaches the caller without cancelling delivery.
	pub async fn dispatch(
		&self,
		process_id: &str,
		payload: serde_json::Value,
	) -> Result<DispatchOutcome, DispatchError> {
		let Some(guard) = self.locks.try_acquire(process_id) else {
			tracing::info!(
				process_id = %truncate_id(process_id),
				"Dispatch already in flight, ignoring"
			);
			return Ok(DispatchOutcome::InFlight);
		};

		if let Some(record) = self.terminal_record(process_id).await? {
			tracing::info!(
				process_id = %truncate_id(process_id),
				"Dispatch already completed"
			);
			return Ok(DispatchOutcome::AlreadyCompleted(record));
		}

		let job = match self
			.storage
			.find::<WebhookJob>(StorageKey::WebhookRetry.as_str(), process_id)
			.await
		{
			Ok(Some(job)) => {
				tracing::info!(
					process_id = %truncate_id(process_id),
					attempts = job.attempt_count,
					"Continuing persisted webhook job"
				);
				job
			},
			Ok(None) => WebhookJob::new(process_id, payload, current_timestamp_millis()),
			Err(e) => {
				tracing::warn!(
					process_id = %truncate_id(process_id),
					error = %e,
					"Could not read persisted job, starting fresh"
				);
				WebhookJob::new(process_id, payload, current_timestamp_millis())
			},
		};

		self.spawn_job(job, guard)
			.await
			.map_err(|e| DispatchError::Task(e.to_string()))?
	}

	/// Reports the current state of a key.
	pub async fn lookup(&self, process_id: &str) -> Result<JobView, DispatchError> {
		if let Some(record) = self.terminal_record(process_id).await? {
			return Ok(JobView::Completed { record });
		}

		let job = self
			.storage
			.find::<WebhookJob>(StorageKey::WebhookRetry.as_str(), process_id)
			.await?;
		Ok(match job {
			Some(job) => JobView::Pending {
				in_flight: self.is_in_flight(process_id),
				job,
			},
			None => JobView::NotFound,
		})
	}

	pub(crate) fn spawn_job(
		&self,
		job: WebhookJob,
		guard: KeyGuard,
	) -> tokio::task::JoinHandle<Result<DispatchOutcome, DispatchError>> {
		let this = self.clone();
		tokio::spawn(async move { this.drive(job, guard).await })
	}

	pub(crate) async fn terminal_record(
		&self,
		process_id: &str,
	) -> Result<Option<DispatchRecord>, DispatchError> {
		Ok(self
			.storage
			.find::<DispatchRecord>(StorageKey::WebhookOutcome.as_str(), process_id)
			.await?)
	}

	/// Retention left for a job, or `None` once it has run out.
	fn remaining_retention(&self, job: &WebhookJob, now: u64) -> Option<Duration> {
		let deadline = job
			.created_at
			.saturating_add(self.config.retention.as_millis() as u64);
		(deadline > now).then(|| Duration::from_millis(deadline - now))
	}

	/// Runs attempts until the job reaches a terminal outcome. The guard is
	/// held for the whole run.
	#[instrument(skip_all, fields(process_id = %truncate_id(&job.process_id)))]
	async fn drive(
		self,
		mut job: WebhookJob,
		_guard: KeyGuard,
	) -> Result<DispatchOutcome, DispatchError> {
		let now = current_timestamp_millis();
		if self.remaining_retention(&job, now).is_none() {
			tracing::warn!(attempts = job.attempt_count, "Job outlived its retention window");
			let attempts = job.attempt_count;
			return self.finish(&job, TerminalOutcome::Expired { attempts }).await;
		}
		if !job.is_due(now) {
			tokio::time::sleep(Duration::from_millis(job.next_retry_at - now)).await;
		}

		loop {
			let attempt = job.attempt_count + 1;
			tracing::debug!(attempt, max_attempts = self.config.max_attempts, "Delivering webhook");

			let error = match self.webhook.deliver(&job.payload).await {
				Ok(response) => {
					tracing::info!(attempt, "Webhook delivered");
					return self
						.finish(&job, TerminalOutcome::Delivered { response })
						.await;
				},
				Err(e) => e,
			};

			job.attempt_count = attempt;
			tracing::warn!(
				attempt,
				max_attempts = self.config.max_attempts,
				error = %error,
				"Webhook delivery failed"
			);

			if job.attempt_count >= self.config.max_attempts {
				tracing::error!(attempts = attempt, "Webhook retries exhausted");
				return self
					.finish(&job, TerminalOutcome::Exhausted { attempts: attempt })
					.await;
			}

			let now = current_timestamp_millis();
			let Some(retention) = self.remaining_retention(&job, now) else {
				tracing::warn!(attempts = attempt, "Job outlived its retention window");
				return self
					.finish(&job, TerminalOutcome::Expired { attempts: attempt })
					.await;
			};

			let delay = self.config.policy.delay(job.attempt_count);
			job.next_retry_at = now.saturating_add(delay.as_millis() as u64);

			if let Err(e) = self
				.storage
				.store_with_ttl(
					StorageKey::WebhookRetry.as_str(),
					&job.process_id,
					&job,
					Some(retention),
				)
				.await
			{
				tracing::warn!(error = %e, "Failed to persist webhook job");
			}

			self.event_bus
				.publish(PipelineEvent::Dispatch(DispatchEvent::RetryScheduled {
					process_id: job.process_id.clone(),
					attempt,
					next_retry_at: job.next_retry_at,
					error: error.to_string(),
				}))
				.ok();

			tokio::time::sleep(delay).await;
		}
	}

	/// Records the terminal outcome, clears the pending job and announces it.
	///
	/// The job is only removed once the record is stored. If the record
	/// cannot be written the job stays in place and the storage error is
	/// returned.
	async fn finish(
		&self,
		job: &WebhookJob,
		outcome: TerminalOutcome,
	) -> Result<DispatchOutcome, DispatchError> {
		let record = DispatchRecord {
			process_id: job.process_id.clone(),
			outcome: outcome.clone(),
			recorded_at: current_timestamp_millis(),
		};

		if let Err(e) = self
			.storage
			.store(StorageKey::WebhookOutcome.as_str(), &job.process_id, &record)
			.await
		{
			tracing::error!(
				error = %e,
				outcome = ?outcome,
				"Failed to record terminal outcome, keeping webhook job"
			);
			return Err(e.into());
		}
		if let Err(e) = self
			.storage
			.remove(StorageKey::WebhookRetry.as_str(), &job.process_id)
			.await
		{
			tracing::warn!(error = %e, "Failed to remove webhook job");
		}

		let event = match &outcome {
			TerminalOutcome::Delivered { response } => DispatchEvent::Delivered {
				process_id: job.process_id.clone(),
				response: response.clone(),
			},
			TerminalOutcome::Exhausted { attempts } | TerminalOutcome::Expired { attempts } => {
				DispatchEvent::Exhausted {
					process_id: job.process_id.clone(),
					attempts: *attempts,
				}
			},
		};
		self.event_bus.publish(PipelineEvent::Dispatch(event)).ok();

		Ok(outcome.into())
	}
}
