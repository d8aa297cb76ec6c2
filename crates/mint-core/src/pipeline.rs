//! The mint pipeline: submit, resolve, then dispatch.

use crate::{MintOutcome, PipelineError, ReconstructedMint};
use mint_config::{PipelineConfig, UnknownStatusPolicy};
use mint_dispatch::{DispatchError, DispatchOutcome, RecoveryReport, RetryableDispatcher};
use mint_status::StatusResolver;
use mint_storage::StorageService;
use mint_submit::TransactionSubmitter;
use mint_types::{
	current_timestamp_millis, truncate_id, EventBus, MintContext, PipelineEvent,
	SignerDescriptor, SnapshotMintedPayload, StatusResult, TerminalOutcome, TransactionEvent,
	TransactionHash, TransactionRequest,
};
use std::sync::Arc;
use tracing::instrument;

#[derive(Clone)]
pub struct MintPipeline {
	config: PipelineConfig,
	submitter: Arc<TransactionSubmitter>,
	resolver: Arc<StatusResolver>,
	dispatcher: RetryableDispatcher,
	storage: Arc<StorageService>,
	event_bus: EventBus,
}

impl MintPipeline {
	pub fn new(
		config: PipelineConfig,
		submitter: Arc<TransactionSubmitter>,
		resolver: Arc<StatusResolver>,
		dispatcher: RetryableDispatcher,
		storage: Arc<StorageService>,
		event_bus: EventBus,
	) -> Self {
		Self {
			config,
			submitter,
			resolver,
			dispatcher,
			storage,
			event_bus,
		}
	}

	pub fn dispatcher(&self) -> &RetryableDispatcher {
		&self.dispatcher
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Submits the mint transaction and carries it through to the webhook.
	#[instrument(skip_all, fields(process_id = %truncate_id(&mint.process_id), signer = %signer.kind))]
	pub async fn run(
		&self,
		request: &TransactionRequest,
		signer: &SignerDescriptor,
		mint: &MintContext,
	) -> Result<MintOutcome, PipelineError> {
		let handle = self.submitter.submit(request, signer).await?;

		self.event_bus
			.publish(PipelineEvent::Transaction(TransactionEvent::Submitted {
				process_id: mint.process_id.clone(),
				tx_hash: handle.tx_hash.clone(),
			}))
			.ok();

		self.finalize(&handle.tx_hash, mint).await
	}

	/// Resolves an already submitted transaction and, if it confirmed,
	/// dispatches the webhook.
	///
	/// Used on its own when the hash was kept outside the pipeline, for
	/// example after the process stopped between confirmation and dispatch.
	/// An `Unknown` status never dispatches.
	#[instrument(skip_all, fields(process_id = %truncate_id(&mint.process_id), tx_hash = %truncate_id(&tx_hash.to_hex())))]
	pub async fn finalize(
		&self,
		tx_hash: &TransactionHash,
		mint: &MintContext,
	) -> Result<MintOutcome, PipelineError> {
		let status = self.resolver.resolve(tx_hash).await;

		self.event_bus
			.publish(PipelineEvent::Transaction(TransactionEvent::Resolved {
				process_id: mint.process_id.clone(),
				tx_hash: tx_hash.clone(),
				status: status.clone(),
			}))
			.ok();

		match status {
			StatusResult::Confirmed { block_number, .. } => {
				self.dispatch_confirmed(tx_hash, block_number, mint).await
			},
			StatusResult::Reverted { reason } => {
				tracing::warn!(reason = ?reason, "Transaction reverted, not dispatching");
				Err(PipelineError::Reverted {
					tx_hash: tx_hash.clone(),
					reason,
				})
			},
			StatusResult::Unknown => match self.config.unknown_status_policy {
				UnknownStatusPolicy::Strict => {
					tracing::warn!("Transaction status unknown");
					Err(PipelineError::StatusTimeout {
						tx_hash: tx_hash.clone(),
					})
				},
				UnknownStatusPolicy::Optimistic => {
					tracing::warn!("Transaction status unknown, reporting unverified mint");
					Ok(MintOutcome::ConfirmationUncertain {
						tx_hash: tx_hash.clone(),
						reconstructed: self.reconstruct(mint),
					})
				},
			},
		}
	}

	/// Resumes persisted webhook jobs. See [`RetryableDispatcher::resume_pending`].
	pub async fn resume_pending(&self) -> Result<RecoveryReport, DispatchError> {
		self.dispatcher.resume_pending().await
	}

	async fn dispatch_confirmed(
		&self,
		tx_hash: &TransactionHash,
		block_number: u64,
		mint: &MintContext,
	) -> Result<MintOutcome, PipelineError> {
		let payload = SnapshotMintedPayload::from_confirmed(
			mint,
			tx_hash.clone(),
			block_number,
			current_timestamp_millis(),
		);
		let payload =
			serde_json::to_value(&payload).map_err(|e| DispatchError::Payload(e.to_string()))?;

		let finalized = |response| MintOutcome::Finalized {
			tx_hash: tx_hash.clone(),
			block_number,
			response,
		};

		match self.dispatcher.dispatch(&mint.process_id, payload).await? {
			DispatchOutcome::Delivered(response) => Ok(finalized(response)),
			DispatchOutcome::Exhausted { attempts } | DispatchOutcome::Expired { attempts } => {
				Err(self.exhausted(mint, attempts))
			},
			DispatchOutcome::InFlight => Ok(MintOutcome::DispatchInFlight {
				tx_hash: tx_hash.clone(),
				process_id: mint.process_id.clone(),
			}),
			DispatchOutcome::AlreadyCompleted(record) => match record.outcome {
				TerminalOutcome::Delivered { response } => Ok(finalized(response)),
				TerminalOutcome::Exhausted { attempts } | TerminalOutcome::Expired { attempts } => {
					Err(self.exhausted(mint, attempts))
				},
			},
		}
	}

	fn exhausted(&self, mint: &MintContext, attempts: u32) -> PipelineError {
		PipelineError::ExhaustedRetries {
			process_id: mint.process_id.clone(),
			attempts,
			fallback: self.reconstruct(mint),
		}
	}

	fn reconstruct(&self, mint: &MintContext) -> ReconstructedMint {
		ReconstructedMint {
			process_id: mint.process_id.clone(),
			seed_id: mint.seed_id.clone(),
			display_url: display_url(&self.config.display_url_template, mint),
			verified: false,
		}
	}
}

/// Fills `{seed_id}` and `{process_id}` in the template.
pub fn display_url(template: &str, mint: &MintContext) -> String {
	template
		.replace("{seed_id}", &mint.seed_id)
		.replace("{process_id}", &mint.process_id)
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use mint_dispatch::{DispatcherConfig, RetryPolicy, WebhookError, WebhookInterface};
	use mint_status::{Budget, ProviderError, ResolverConfig, StatusProviderInterface};
	use mint_storage::implementations::memory::MemoryStorage;
	use mint_submit::{SignerError, SignerInterface};
	use mint_types::{Address, Bytes, ProviderReceipt, SignerKind, StorageKey, U256, WebhookResponse};
	use serde_json::{json, Value};
	use std::sync::Mutex;
	use std::time::Duration;

	struct FakeSigner;

	#[async_trait]
	impl SignerInterface for FakeSigner {
		fn kind(&self) -> SignerKind {
			SignerKind::Embedded
		}

		async fn address(&self) -> Result<Option<Address>, SignerError> {
			Ok(Some(Address::repeat_byte(0x42)))
		}

		async fn send_transaction(
			&self,
			_request: &TransactionRequest,
		) -> Result<TransactionHash, SignerError> {
			Ok(TransactionHash(vec![0xab; 32]))
		}
	}

	/// Always answers with the same receipt status.
	struct FixedProvider(Option<&'static str>);

	#[async_trait]
	impl StatusProviderInterface for FixedProvider {
		fn name(&self) -> &str {
			"fixed"
		}

		async fn get_receipt(
			&self,
			_tx_hash: &TransactionHash,
		) -> Result<ProviderReceipt, ProviderError> {
			Ok(match self.0 {
				Some(status) => ProviderReceipt {
					receipt_status: Some(status.to_string()),
					block_number: Some(777),
					gas_used: Some(21_000),
					gas_price: Some(1),
				},
				None => ProviderReceipt::pending(),
			})
		}
	}

	#[derive(Default)]
	struct RecordingWebhook {
		fail: bool,
		posts: Mutex<Vec<Value>>,
	}

	#[async_trait]
	impl WebhookInterface for RecordingWebhook {
		async fn deliver(&self, payload: &Value) -> Result<WebhookResponse, WebhookError> {
			self.posts.lock().unwrap().push(payload.clone());
			if self.fail {
				Err(WebhookError::Status(502))
			} else {
				Ok(WebhookResponse {
					success: true,
					data: None,
				})
			}
		}
	}

	impl RecordingWebhook {
		fn posts(&self) -> Vec<Value> {
			self.posts.lock().unwrap().clone()
		}
	}

	fn pipeline(
		receipt_status: Option<&'static str>,
		webhook: Arc<RecordingWebhook>,
		policy: UnknownStatusPolicy,
	) -> MintPipeline {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let event_bus = EventBus::default();
		let resolver = StatusResolver::new(
			Arc::new(FixedProvider(receipt_status)),
			None,
			ResolverConfig {
				poll_interval: Duration::from_secs(5),
				rate_limit_delay: Duration::from_secs(15),
				fallback_timeout: Duration::from_secs(10),
				budget: Budget {
					max_attempts: 3,
					timeout: Duration::from_secs(120),
				},
			},
		);
		let dispatcher = RetryableDispatcher::new(
			webhook,
			storage.clone(),
			DispatcherConfig {
				max_attempts: 3,
				policy: RetryPolicy::Fixed(Duration::from_secs(10)),
				retention: Duration::from_secs(300),
			},
			event_bus.clone(),
		);

		MintPipeline::new(
			PipelineConfig {
				id: "test".into(),
				unknown_status_policy: policy,
				display_url_template: "https://cdn.example/{seed_id}/{process_id}.png".into(),
			},
			Arc::new(TransactionSubmitter::new(vec![Arc::new(FakeSigner)])),
			Arc::new(resolver),
			dispatcher,
			storage,
			event_bus,
		)
	}

	fn request() -> TransactionRequest {
		TransactionRequest {
			chain_id: 8453,
			to: Address::repeat_byte(0x01),
			data: Bytes::from(vec![0xde, 0xad]),
			value: U256::ZERO,
		}
	}

	fn mint() -> MintContext {
		MintContext {
			process_id: "proc-7".into(),
			contract_address: "0x0101010101010101010101010101010101010101".into(),
			seed_id: "seed-3".into(),
			snapshot_id: "snap-9".into(),
			beneficiary_code: "B1".into(),
			beneficiary_distribution: json!({ "B1": 100 }),
			creator: "0x4242424242424242424242424242424242424242".into(),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_confirmed_mint_is_dispatched_once() {
		let webhook = Arc::new(RecordingWebhook::default());
		let pipeline = pipeline(Some("1"), webhook.clone(), UnknownStatusPolicy::Strict);
		let mut events = pipeline.event_bus().subscribe();

		let outcome = pipeline
			.run(&request(), &SignerDescriptor::embedded(), &mint())
			.await
			.unwrap();

		assert!(matches!(
			outcome,
			MintOutcome::Finalized {
				block_number: 777,
				..
			}
		));
		let posts = webhook.posts();
		assert_eq!(posts.len(), 1);
		assert_eq!(posts[0]["processId"], "proc-7");
		assert_eq!(posts[0]["blockNumber"], 777);
		assert_eq!(posts[0]["txHash"], format!("0x{}", "ab".repeat(32)));

		assert!(matches!(
			events.recv().await.unwrap(),
			PipelineEvent::Transaction(TransactionEvent::Submitted { .. })
		));
		assert!(matches!(
			events.recv().await.unwrap(),
			PipelineEvent::Transaction(TransactionEvent::Resolved {
				status: StatusResult::Confirmed { .. },
				..
			})
		));

		// A second finalize for the same mint returns the recorded outcome.
		let again = pipeline
			.finalize(&TransactionHash(vec![0xab; 32]), &mint())
			.await
			.unwrap();
		assert!(matches!(again, MintOutcome::Finalized { .. }));
		assert_eq!(webhook.posts().len(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_reverted_transaction_never_dispatches() {
		let webhook = Arc::new(RecordingWebhook::default());
		let pipeline = pipeline(Some("0"), webhook.clone(), UnknownStatusPolicy::Optimistic);

		let err = pipeline
			.run(&request(), &SignerDescriptor::embedded(), &mint())
			.await
			.unwrap_err();

		assert!(matches!(err, PipelineError::Reverted { .. }));
		assert_eq!(err.user_outcome(), crate::UserOutcome::TransactionFailed);
		assert!(webhook.posts().is_empty());
		assert!(!pipeline
			.storage()
			.exists(StorageKey::WebhookRetry.as_str(), "proc-7")
			.await
			.unwrap());
	}

	#[tokio::test(start_paused = true)]
	async fn test_unknown_status_strict_is_a_timeout() {
		let webhook = Arc::new(RecordingWebhook::default());
		let pipeline = pipeline(None, webhook.clone(), UnknownStatusPolicy::Strict);

		let err = pipeline
			.finalize(&TransactionHash(vec![0xab; 32]), &mint())
			.await
			.unwrap_err();

		assert!(matches!(err, PipelineError::StatusTimeout { .. }));
		assert_eq!(err.user_outcome(), crate::UserOutcome::ConfirmationUncertain);
		assert!(webhook.posts().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_unknown_status_optimistic_reports_unverified_mint() {
		let webhook = Arc::new(RecordingWebhook::default());
		let pipeline = pipeline(Some("0x1"), webhook.clone(), UnknownStatusPolicy::Optimistic);

		let outcome = pipeline
			.finalize(&TransactionHash(vec![0xab; 32]), &mint())
			.await
			.unwrap();

		match outcome {
			MintOutcome::ConfirmationUncertain { reconstructed, .. } => {
				assert!(!reconstructed.verified);
				assert_eq!(
					reconstructed.display_url,
					"https://cdn.example/seed-3/proc-7.png"
				);
			},
			other => panic!("unexpected outcome: {:?}", other),
		}
		assert!(webhook.posts().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_exhausted_webhook_falls_back_to_reconstruction() {
		let webhook = Arc::new(RecordingWebhook {
			fail: true,
			..Default::default()
		});
		let pipeline = pipeline(Some("1"), webhook.clone(), UnknownStatusPolicy::Strict);

		let err = pipeline
			.run(&request(), &SignerDescriptor::embedded(), &mint())
			.await
			.unwrap_err();

		match &err {
			PipelineError::ExhaustedRetries {
				attempts, fallback, ..
			} => {
				assert_eq!(*attempts, 3);
				assert_eq!(fallback.display_url, "https://cdn.example/seed-3/proc-7.png");
				assert!(!fallback.verified);
			},
			other => panic!("unexpected error: {:?}", other),
		}
		assert_eq!(err.user_outcome(), crate::UserOutcome::SideEffectPending);
		assert_eq!(webhook.posts().len(), 3);
	}

	#[tokio::test]
	async fn test_submission_failure_skips_resolution() {
		let webhook = Arc::new(RecordingWebhook::default());
		let pipeline = pipeline(Some("1"), webhook.clone(), UnknownStatusPolicy::Strict);

		let err = pipeline
			.run(&request(), &SignerDescriptor::external(), &mint())
			.await
			.unwrap_err();

		assert!(matches!(err, PipelineError::Submission(_)));
		assert!(webhook.posts().is_empty());
	}

	#[test]
	fn test_display_url_fills_placeholders() {
		assert_eq!(
			display_url("https://x/{process_id}?seed={seed_id}", &mint()),
			"https://x/proc-7?seed=seed-3"
		);
	}
}
