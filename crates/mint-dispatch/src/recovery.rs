//! Resumption of persisted webhook jobs after a restart.

use crate::{DispatchError, DispatchOutcome, RetryableDispatcher};
use mint_types::{current_timestamp_millis, truncate_id, StorageKey, WebhookJob};
use tokio::task::JoinHandle;
use tracing::instrument;

/// Summary of one `resume_pending` pass.
#[derive(Debug, Default)]
pub struct RecoveryReport {
	/// Jobs found in the store.
	pub total_jobs: usize,
	/// Jobs handed back to the dispatcher.
	pub resumed: usize,
	/// Jobs whose retry time has not come yet.
	pub not_due: usize,
	/// Jobs skipped because a dispatch for the key is already running.
	pub in_flight: usize,
	/// Leftover jobs whose key already has a terminal record.
	pub already_completed: usize,
	/// One handle per resumed job.
	pub handles: Vec<JoinHandle<Result<DispatchOutcome, DispatchError>>>,
}

impl RetryableDispatcher {
	/// Resumes every persisted job whose retry time has passed.
	///
	/// Jobs are driven on their own tasks; the returned report carries their
	/// handles. Keys already being dispatched are left alone.
	#[instrument(skip_all)]
	pub async fn resume_pending(&self) -> Result<RecoveryReport, DispatchError> {
		let jobs: Vec<(String, WebhookJob)> = self
			.storage
			.retrieve_all(StorageKey::WebhookRetry.as_str())
			.await?;

		let mut report = RecoveryReport {
			total_jobs: jobs.len(),
			..Default::default()
		};
		if jobs.is_empty() {
			tracing::debug!("No pending webhook jobs");
			return Ok(report);
		}

		let now = current_timestamp_millis();
		for (_, job) in jobs {
			let process_id = job.process_id.clone();
			if !job.is_due(now) {
				report.not_due += 1;
				continue;
			}

			let Some(guard) = self.locks.try_acquire(&process_id) else {
				report.in_flight += 1;
				continue;
			};

			if self.terminal_record(&process_id).await?.is_some() {
				tracing::info!(
					process_id = %truncate_id(&process_id),
					"Dropping job for an already completed key"
				);
				if let Err(e) = self
					.storage
					.remove(StorageKey::WebhookRetry.as_str(), &process_id)
					.await
				{
					tracing::warn!(error = %e, "Failed to remove stale webhook job");
				}
				report.already_completed += 1;
				continue;
			}

			tracing::info!(
				process_id = %truncate_id(&process_id),
				attempts = job.attempt_count,
				"Resuming webhook job"
			);
			report.handles.push(self.spawn_job(job, guard));
			report.resumed += 1;
		}

		tracing::info!(
			total = report.total_jobs,
			resumed = report.resumed,
			not_due = report.not_due,
			in_flight = report.in_flight,
			already_completed = report.already_completed,
			"Webhook job recovery pass completed"
		);
		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use crate::tests::{dispatcher, storage, SpyWebhook};
	use crate::*;
	use mint_types::{current_timestamp_millis, DispatchRecord, PipelineEvent, WebhookJob};
	use serde_json::json;

	fn persisted_job(process_id: &str, attempts: u32, next_retry_at: u64) -> WebhookJob {
		let mut job = WebhookJob::new(process_id, json!({"processId": process_id}), current_timestamp_millis());
		job.attempt_count = attempts;
		job.next_retry_at = next_retry_at;
		job
	}

	#[tokio::test(start_paused = true)]
	async fn test_resume_continues_attempt_count_after_restart() {
		let storage = storage();
		let now = current_timestamp_millis();
		storage
			.store(
				StorageKey::WebhookRetry.as_str(),
				"proc-1",
				&persisted_job("proc-1", 3, now - 1_000),
			)
			.await
			.unwrap();

		// Fresh dispatcher over the same store stands in for a restart.
		let spy = SpyWebhook::new(vec![false], true);
		let dispatcher = dispatcher(spy.clone(), storage.clone());
		let mut events = dispatcher.event_bus.subscribe();

		let mut report = dispatcher.resume_pending().await.unwrap();
		assert_eq!(report.total_jobs, 1);
		assert_eq!(report.resumed, 1);

		let outcome = report.handles.pop().unwrap().await.unwrap().unwrap();
		assert!(matches!(outcome, DispatchOutcome::Delivered(_)));
		assert_eq!(spy.call_count(), 2);

		match events.recv().await.unwrap() {
			PipelineEvent::Dispatch(DispatchEvent::RetryScheduled { attempt, .. }) => {
				assert_eq!(attempt, 4)
			},
			other => panic!("unexpected event: {:?}", other),
		}

		// Resuming again finds nothing to do.
		let report = dispatcher.resume_pending().await.unwrap();
		assert_eq!(report.total_jobs, 0);
		assert_eq!(spy.call_count(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn test_resume_skips_jobs_not_yet_due() {
		let storage = storage();
		let now = current_timestamp_millis();
		storage
			.store(
				StorageKey::WebhookRetry.as_str(),
				"later",
				&persisted_job("later", 1, now + 60_000),
			)
			.await
			.unwrap();

		let spy = SpyWebhook::new(vec![], true);
		let report = dispatcher(spy.clone(), storage).resume_pending().await.unwrap();

		assert_eq!(report.not_due, 1);
		assert_eq!(report.resumed, 0);
		assert_eq!(spy.call_count(), 0);
	}

	#[tokio::test(start_paused = true)]
	async fn test_resume_drops_job_with_terminal_record() {
		let storage = storage();
		storage
			.store(
				StorageKey::WebhookRetry.as_str(),
				"done",
				&persisted_job("done", 2, 0),
			)
			.await
			.unwrap();
		storage
			.store(
				StorageKey::WebhookOutcome.as_str(),
				"done",
				&DispatchRecord {
					process_id: "done".into(),
					outcome: TerminalOutcome::Exhausted { attempts: 18 },
					recorded_at: 0,
				},
			)
			.await
			.unwrap();

		let spy = SpyWebhook::new(vec![], true);
		let report = dispatcher(spy.clone(), storage.clone())
			.resume_pending()
			.await
			.unwrap();

		assert_eq!(report.already_completed, 1);
		assert_eq!(spy.call_count(), 0);
		assert!(!storage
			.exists(StorageKey::WebhookRetry.as_str(), "done")
			.await
			.unwrap());
	}

	#[tokio::test(start_paused = true)]
	async fn test_job_past_retention_expires_without_posting() {
		let storage = storage();
		let mut job = persisted_job("stale", 5, 0);
		job.created_at = current_timestamp_millis() - 301_000;
		storage
			.store(StorageKey::WebhookRetry.as_str(), "stale", &job)
			.await
			.unwrap();

		let spy = SpyWebhook::new(vec![], true);
		let mut report = dispatcher(spy.clone(), storage.clone())
			.resume_pending()
			.await
			.unwrap();

		let outcome = report.handles.pop().unwrap().await.unwrap().unwrap();
		assert_eq!(outcome, DispatchOutcome::Expired { attempts: 5 });
		assert_eq!(spy.call_count(), 0);
		assert!(!storage
			.exists(StorageKey::WebhookRetry.as_str(), "stale")
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn test_resume_skips_keys_in_flight() {
		let storage = storage();
		storage
			.store(
				StorageKey::WebhookRetry.as_str(),
				"busy",
				&persisted_job("busy", 1, 0),
			)
			.await
			.unwrap();

		let spy = SpyWebhook::new(vec![], true);
		let dispatcher = dispatcher(spy.clone(), storage);
		let _held = dispatcher.locks.try_acquire("busy").unwrap();

		let report = dispatcher.resume_pending().await.unwrap();
		assert_eq!(report.in_flight, 1);
		assert_eq!(report.resumed, 0);
		assert_eq!(spy.call_count(), 0);
	}
}
