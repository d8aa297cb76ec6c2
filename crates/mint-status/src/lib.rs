//! Transaction status resolution.
//!
//! The resolver polls a primary provider on a fixed interval under an attempt
//! limit and a wall-clock budget, then consults an optional fallback once.
//! The fallback lookup has a bounded slice of the budget held back for it.
//! Only receipt statuses `"1"` and `"0"` are definitive; anything else ends in
//! [`StatusResult::Unknown`], which is never treated as confirmed.

use async_trait::async_trait;
use mint_config::StatusConfig;
use mint_types::{truncate_id, ProviderReceipt, StatusResult, TransactionHash};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::instrument;

pub mod implementations {
	pub mod indexer;
	pub mod rpc;
}

#[derive(Debug, Error)]
pub enum ProviderError {
	#[error("Rate limited")]
	RateLimited,
	#[error("Unauthorized: {0}")]
	Unauthorized(String),
	#[error("Network error: {0}")]
	Network(String),
}

/// A source of transaction receipts.
#[async_trait]
pub trait StatusProviderInterface: Send + Sync {
	/// Short name used in logs.
	fn name(&self) -> &str;

	/// Looks up the receipt. A transaction that is not confirmed yet yields a
	/// receipt without `receipt_status`, not an error.
	async fn get_receipt(&self, tx_hash: &TransactionHash) -> Result<ProviderReceipt, ProviderError>;
}

/// Limits for one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
	pub max_attempts: u32,
	pub timeout: Duration,
}

impl Default for Budget {
	fn default() -> Self {
		Self {
			max_attempts: 12,
			timeout: Duration::from_secs(120),
		}
	}
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
	pub poll_interval: Duration,
	/// Wait after a rate-limited poll.
	pub rate_limit_delay: Duration,
	/// Bound on the fallback lookup, reserved out of the budget.
	pub fallback_timeout: Duration,
	pub budget: Budget,
}

impl Default for ResolverConfig {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_secs(5),
			rate_limit_delay: Duration::from_secs(15),
			fallback_timeout: Duration::from_secs(10),
			budget: Budget::default(),
		}
	}
}

impl From<&StatusConfig> for ResolverConfig {
	fn from(config: &StatusConfig) -> Self {
		Self {
			poll_interval: config.poll_interval(),
			rate_limit_delay: config.rate_limit_delay(),
			fallback_timeout: config
				.fallback
				.as_ref()
				.map(|fallback| fallback.request_timeout())
				.unwrap_or_else(|| ResolverConfig::default().fallback_timeout),
			budget: Budget {
				max_attempts: config.max_attempts,
				timeout: config.timeout(),
			},
		}
	}
}

/// How one receipt reads.
#[derive(Debug, PartialEq)]
enum Reading {
	Definitive(StatusResult),
	Unconfirmed,
	UnrecognizedStatus(String),
}

fn read_receipt(receipt: &ProviderReceipt) -> Reading {
	match receipt.receipt_status.as_deref() {
		Some("1") => match receipt.block_number {
			Some(block_number) => Reading::Definitive(StatusResult::Confirmed {
				block_number,
				gas_used: receipt.gas_used.unwrap_or_default(),
				effective_gas_price: receipt.gas_price.unwrap_or_default(),
			}),
			None => {
				tracing::warn!("Success receipt without a block number, treating as unconfirmed");
				Reading::Unconfirmed
			},
		},
		Some("0") => Reading::Definitive(StatusResult::Reverted { reason: None }),
		Some(other) => Reading::UnrecognizedStatus(other.to_string()),
		None => Reading::Unconfirmed,
	}
}

pub struct StatusResolver {
	primary: Arc<dyn StatusProviderInterface>,
	fallback: Option<Arc<dyn StatusProviderInterface>>,
	config: ResolverConfig,
}

impl StatusResolver {
	pub fn new(
		primary: Arc<dyn StatusProviderInterface>,
		fallback: Option<Arc<dyn StatusProviderInterface>>,
		config: ResolverConfig,
	) -> Self {
		Self {
			primary,
			fallback,
			config,
		}
	}

	/// Resolves with the configured budget.
	pub async fn resolve(&self, tx_hash: &TransactionHash) -> StatusResult {
		self.resolve_with_budget(tx_hash, self.config.budget).await
	}

	/// Resolves a transaction to a terminal status.
	///
	/// Unconfirmed, unreachable and unrecognized polls each use one attempt
	/// and wait the poll interval. A rate-limited poll uses one attempt and
	/// waits the longer rate-limit delay. An unauthorized poll uses no attempt
	/// and ends primary polling at once. Every wait is clipped to the time
	/// left in the budget, and none follows the last allowed attempt.
	///
	/// With a fallback configured, its timeout (at most half the budget) is
	/// held back from primary polling so the fallback lookup also finishes
	/// inside the budget.
	#[instrument(skip_all, fields(tx_hash = %truncate_id(&tx_hash.to_hex())))]
	pub async fn resolve_with_budget(
		&self,
		tx_hash: &TransactionHash,
		budget: Budget,
	) -> StatusResult {
		let start = Instant::now();
		let reserve = match self.fallback {
			Some(_) => self.config.fallback_timeout.min(budget.timeout / 2),
			None => Duration::ZERO,
		};
		let polling_budget = budget.timeout.saturating_sub(reserve);
		let mut attempts = 0u32;

		while attempts < budget.max_attempts {
			let remaining = polling_budget.saturating_sub(start.elapsed());
			if remaining.is_zero() {
				break;
			}

			let poll = tokio::time::timeout(remaining, self.primary.get_receipt(tx_hash)).await;
			let wait = match poll {
				Ok(Ok(receipt)) => match read_receipt(&receipt) {
					Reading::Definitive(status) => {
						tracing::info!(
							provider = self.primary.name(),
							attempt = attempts + 1,
							status = ?status,
							"Resolved transaction status"
						);
						return status;
					},
					Reading::Unconfirmed => {
						tracing::debug!(attempt = attempts + 1, "Transaction not confirmed yet");
						self.config.poll_interval
					},
					Reading::UnrecognizedStatus(status) => {
						tracing::warn!(
							attempt = attempts + 1,
							receipt_status = %status,
							"unknown status, proceed with caution"
						);
						self.config.poll_interval
					},
				},
				Ok(Err(ProviderError::RateLimited)) => {
					tracing::warn!(
						attempt = attempts + 1,
						delay_secs = self.config.rate_limit_delay.as_secs(),
						"Status provider rate limited"
					);
					self.config.rate_limit_delay
				},
				Ok(Err(ProviderError::Unauthorized(msg))) => {
					tracing::error!(
						provider = self.primary.name(),
						error = %msg,
						"Status provider rejected credentials, skipping to fallback"
					);
					break;
				},
				Ok(Err(ProviderError::Network(msg))) => {
					tracing::warn!(attempt = attempts + 1, error = %msg, "Status poll failed");
					self.config.poll_interval
				},
				Err(_) => {
					tracing::warn!(attempt = attempts + 1, "Status poll exceeded the remaining budget");
					self.config.poll_interval
				},
			};

			attempts += 1;
			if attempts >= budget.max_attempts {
				break;
			}
			let remaining = polling_budget.saturating_sub(start.elapsed());
			tokio::time::sleep(wait.min(remaining)).await;
		}

		tracing::info!(
			attempts,
			elapsed_secs = start.elapsed().as_secs(),
			"Primary polling ended without a definitive status"
		);

		let limit = budget
			.timeout
			.saturating_sub(start.elapsed())
			.min(self.config.fallback_timeout);
		if let Some(status) = self.consult_fallback(tx_hash, limit).await {
			return status;
		}

		tracing::warn!("Transaction status unknown");
		StatusResult::Unknown
	}

	async fn consult_fallback(
		&self,
		tx_hash: &TransactionHash,
		limit: Duration,
	) -> Option<StatusResult> {
		let fallback = self.fallback.as_ref()?;

		let lookup = match tokio::time::timeout(limit, fallback.get_receipt(tx_hash)).await {
			Ok(lookup) => lookup,
			Err(_) => {
				tracing::warn!(
					provider = fallback.name(),
					timeout_secs = limit.as_secs(),
					"fallback unavailable"
				);
				return None;
			},
		};

		match lookup {
			Ok(receipt) => match read_receipt(&receipt) {
				Reading::Definitive(status) => {
					tracing::info!(
						provider = fallback.name(),
						status = ?status,
						"Resolved transaction status from fallback"
					);
					Some(status)
				},
				Reading::Unconfirmed => {
					tracing::info!(provider = fallback.name(), "Fallback has no receipt");
					None
				},
				Reading::UnrecognizedStatus(status) => {
					tracing::warn!(
						provider = fallback.name(),
						receipt_status = %status,
						"unknown status, proceed with caution"
					);
					None
				},
			},
			Err(e) => {
				tracing::warn!(provider = fallback.name(), error = %e, "Fallback lookup failed");
				None
			},
		}
	}
}
