//! Transaction submission for the mint pipeline.
//!
//! Two signing paths converge on one contract: a custodial embedded signer
//! that sends directly, and an externally-connected wallet that prompts the
//! user and may be rejected. Either way the caller gets a
//! [`TransactionHandle`] or a terminal [`SubmissionError`].

use async_trait::async_trait;
use mint_types::{
	current_timestamp_millis, truncate_id, Address, SignerDescriptor, SignerKind,
	TransactionHandle, TransactionHash, TransactionRequest,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub mod implementations {
	pub mod embedded;
	pub mod external;
}

/// Errors raised by a signer implementation.
#[derive(Debug, Error)]
pub enum SignerError {
	#[error("User rejected the request")]
	UserRejected,
	#[error("No account available: {0}")]
	NoAccount(String),
	#[error("Network error: {0}")]
	Network(String),
	#[error("RPC error {code}: {message}")]
	Rpc { code: i64, message: String },
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Terminal submission failures. None of these are retried automatically;
/// the caller restarts the whole flow.
#[derive(Debug, Error)]
pub enum SubmissionError {
	#[error("User rejected the transaction")]
	UserRejected,
	#[error("No active signer")]
	NoActiveSigner,
	#[error("A submission is already in flight for the {0} signer")]
	AlreadyInFlight(SignerKind),
	#[error("Broadcast failed: {0}")]
	Broadcast(String),
}

impl From<SignerError> for SubmissionError {
	fn from(err: SignerError) -> Self {
		match err {
			SignerError::UserRejected => SubmissionError::UserRejected,
			SignerError::NoAccount(_) => SubmissionError::NoActiveSigner,
			other => SubmissionError::Broadcast(other.to_string()),
		}
	}
}

/// A signing path that can broadcast a transaction.
#[async_trait]
pub trait SignerInterface: Send + Sync {
	fn kind(&self) -> SignerKind;

	/// Currently active account, if any.
	async fn address(&self) -> Result<Option<Address>, SignerError>;

	/// Signs and broadcasts exactly one transaction.
	async fn send_transaction(
		&self,
		request: &TransactionRequest,
	) -> Result<TransactionHash, SignerError>;
}

/// Clears an in-flight flag when dropped, including on cancellation.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::Release);
	}
}

/// Routes submissions to the signer matching the caller's descriptor.
pub struct TransactionSubmitter {
	signers: HashMap<SignerKind, Arc<dyn SignerInterface>>,
	in_flight: HashMap<SignerKind, AtomicBool>,
}

impl TransactionSubmitter {
	pub fn new(signers: Vec<Arc<dyn SignerInterface>>) -> Self {
		let signers: HashMap<_, _> = signers.into_iter().map(|s| (s.kind(), s)).collect();
		let in_flight = signers
			.keys()
			.map(|kind| (*kind, AtomicBool::new(false)))
			.collect();
		Self { signers, in_flight }
	}

	pub fn has_signer(&self, kind: SignerKind) -> bool {
		self.signers.contains_key(&kind)
	}

	/// Submits one transaction through the requested signing path.
	///
	/// A second call for the same signer kind while one is outstanding fails
	/// with [`SubmissionError::AlreadyInFlight`] instead of broadcasting twice.
	pub async fn submit(
		&self,
		request: &TransactionRequest,
		signer: &SignerDescriptor,
	) -> Result<TransactionHandle, SubmissionError> {
		let (Some(implementation), Some(flag)) = (
			self.signers.get(&signer.kind),
			self.in_flight.get(&signer.kind),
		) else {
			tracing::warn!(kind = %signer.kind, "No signer configured for requested path");
			return Err(SubmissionError::NoActiveSigner);
		};

		if flag
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			return Err(SubmissionError::AlreadyInFlight(signer.kind));
		}
		let _guard = InFlightGuard(flag);

		let active = implementation.address().await?;
		match (active, signer.address) {
			(None, _) => return Err(SubmissionError::NoActiveSigner),
			(Some(active), Some(expected)) if active != expected => {
				tracing::warn!(
					kind = %signer.kind,
					expected = %expected,
					active = %active,
					"Active account differs from the requested one"
				);
				return Err(SubmissionError::NoActiveSigner);
			},
			_ => {},
		}

		let tx_hash = implementation.send_transaction(request).await.map_err(|e| {
			tracing::warn!(kind = %signer.kind, error = %e, "Submission failed");
			SubmissionError::from(e)
		})?;

		tracing::info!(
			kind = %signer.kind,
			tx_hash = %truncate_id(&tx_hash.to_hex()),
			chain_id = request.chain_id,
			"Submitted transaction"
		);

		Ok(TransactionHandle {
			tx_hash,
			submitted_at: current_timestamp_millis(),
		})
	}
}
