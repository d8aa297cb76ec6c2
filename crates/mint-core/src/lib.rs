//! Mint confirmation pipeline.
//!
//! Ties the three stages together: a transaction is submitted through one of
//! the signing paths, resolved to a terminal status, and only when it is
//! confirmed is the `snapshot-minted` webhook dispatched. Every failure is
//! folded into one of three user-visible outcomes so callers never surface
//! raw provider or webhook errors.

use mint_dispatch::DispatchError;
use mint_submit::SubmissionError;
use mint_types::{TransactionHash, WebhookResponse};
use serde::Serialize;
use thiserror::Error;

pub mod builder;
pub mod pipeline;

pub use builder::{BuilderError, PipelineBuilder};
pub use pipeline::MintPipeline;

/// Best-effort view of a mint whose side effect could not be verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructedMint {
	pub process_id: String,
	pub seed_id: String,
	pub display_url: String,
	/// Always false: the webhook never confirmed this mint.
	pub verified: bool,
}

/// Successful or tolerated end states of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MintOutcome {
	/// Confirmed on chain and acknowledged by the webhook.
	Finalized {
		tx_hash: TransactionHash,
		block_number: u64,
		response: WebhookResponse,
	},
	/// Status could not be determined and the optimistic policy is in effect.
	/// No webhook was dispatched.
	ConfirmationUncertain {
		tx_hash: TransactionHash,
		reconstructed: ReconstructedMint,
	},
	/// Confirmed, but another dispatch for the same mint is still running.
	DispatchInFlight {
		tx_hash: TransactionHash,
		process_id: String,
	},
}

/// The three outcomes a user ever sees for a failed mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserOutcome {
	/// Nothing happened on chain, or the transaction reverted.
	TransactionFailed,
	/// The transaction may or may not have landed.
	ConfirmationUncertain,
	/// The transaction landed but the off-chain side effect is not verified.
	SideEffectPending,
}

#[derive(Debug, Error)]
pub enum PipelineError {
	#[error("Submission failed: {0}")]
	Submission(#[from] SubmissionError),
	#[error("Transaction {tx_hash} reverted")]
	Reverted {
		tx_hash: TransactionHash,
		reason: Option<String>,
	},
	#[error("Could not determine the status of {tx_hash}")]
	StatusTimeout { tx_hash: TransactionHash },
	#[error("Dispatch failed: {0}")]
	Dispatch(#[from] DispatchError),
	#[error("Webhook for {process_id} gave up after {attempts} attempts")]
	ExhaustedRetries {
		process_id: String,
		attempts: u32,
		fallback: ReconstructedMint,
	},
}

impl PipelineError {
	pub fn user_outcome(&self) -> UserOutcome {
		match self {
			PipelineError::Submission(_) | PipelineError::Reverted { .. } => {
				UserOutcome::TransactionFailed
			},
			PipelineError::StatusTimeout { .. } => UserOutcome::ConfirmationUncertain,
			PipelineError::Dispatch(_) | PipelineError::ExhaustedRetries { .. } => {
				UserOutcome::SideEffectPending
			},
		}
	}

	/// Reconstructed mint to show in place of a verified one, if any.
	pub fn fallback(&self) -> Option<&ReconstructedMint> {
		match self {
			PipelineError::ExhaustedRetries { fallback, .. } => Some(fallback),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use mint_types::SignerKind;

	#[test]
	fn test_errors_fold_into_user_outcomes() {
		let hash = TransactionHash(vec![0xaa; 32]);

		assert_eq!(
			PipelineError::Submission(SubmissionError::UserRejected).user_outcome(),
			UserOutcome::TransactionFailed
		);
		assert_eq!(
			PipelineError::Submission(SubmissionError::AlreadyInFlight(SignerKind::External))
				.user_outcome(),
			UserOutcome::TransactionFailed
		);
		assert_eq!(
			PipelineError::Reverted {
				tx_hash: hash.clone(),
				reason: None
			}
			.user_outcome(),
			UserOutcome::TransactionFailed
		);
		assert_eq!(
			PipelineError::StatusTimeout { tx_hash: hash }.user_outcome(),
			UserOutcome::ConfirmationUncertain
		);
		assert_eq!(
			PipelineError::Dispatch(DispatchError::Storage("disk full".into())).user_outcome(),
			UserOutcome::SideEffectPending
		);
	}

	#[test]
	fn test_exhausted_retries_carries_unverified_fallback() {
		let err = PipelineError::ExhaustedRetries {
			process_id: "p1".into(),
			attempts: 18,
			fallback: ReconstructedMint {
				process_id: "p1".into(),
				seed_id: "s1".into(),
				display_url: "https://app.example/seed/s1".into(),
				verified: false,
			},
		};

		assert_eq!(err.user_outcome(), UserOutcome::SideEffectPending);
		assert!(!err.fallback().unwrap().verified);
	}
}
