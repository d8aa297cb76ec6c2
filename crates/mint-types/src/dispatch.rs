//! Webhook job types.
//!
//! A [`WebhookJob`] is born when a transaction is confirmed and dies exactly
//! once, recorded as a [`DispatchRecord`].

use crate::delivery::TransactionHash;
use serde::{Deserialize, Serialize};

/// Mint data known before the transaction confirms.
///
/// Kept alongside the transaction hash so the webhook payload can be rebuilt
/// after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintContext {
	/// Idempotency key supplied by the chain-side mint operation.
	pub process_id: String,
	pub contract_address: String,
	pub seed_id: String,
	pub snapshot_id: String,
	pub beneficiary_code: String,
	#[serde(default)]
	pub beneficiary_distribution: serde_json::Value,
	pub creator: String,
}

/// Body of `POST /snapshot-minted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMintedPayload {
	pub contract_address: String,
	pub seed_id: String,
	pub snapshot_id: String,
	pub beneficiary_code: String,
	pub beneficiary_distribution: serde_json::Value,
	pub creator: String,
	pub tx_hash: TransactionHash,
	/// Unix timestamp in milliseconds of the confirmation.
	pub timestamp: u64,
	pub block_number: u64,
	pub process_id: String,
}

impl SnapshotMintedPayload {
	/// Builds the payload for a confirmed mint.
	pub fn from_confirmed(
		mint: &MintContext,
		tx_hash: TransactionHash,
		block_number: u64,
		timestamp: u64,
	) -> Self {
		Self {
			contract_address: mint.contract_address.clone(),
			seed_id: mint.seed_id.clone(),
			snapshot_id: mint.snapshot_id.clone(),
			beneficiary_code: mint.beneficiary_code.clone(),
			beneficiary_distribution: mint.beneficiary_distribution.clone(),
			creator: mint.creator.clone(),
			tx_hash,
			timestamp,
			block_number,
			process_id: mint.process_id.clone(),
		}
	}
}

/// Persisted retry state for one `process_id`.
///
/// Serialized as `{ processId, data, count, nextRetry, createdAt }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookJob {
	#[serde(rename = "processId")]
	pub process_id: String,
	#[serde(rename = "data")]
	pub payload: serde_json::Value,
	/// Number of failed deliveries so far.
	#[serde(rename = "count")]
	pub attempt_count: u32,
	/// Unix timestamp in milliseconds.
	#[serde(rename = "nextRetry")]
	pub next_retry_at: u64,
	/// Unix timestamp in milliseconds.
	#[serde(rename = "createdAt")]
	pub created_at: u64,
}

impl WebhookJob {
	/// A fresh job that is due immediately.
	pub fn new(process_id: impl Into<String>, payload: serde_json::Value, now: u64) -> Self {
		Self {
			process_id: process_id.into(),
			payload,
			attempt_count: 0,
			next_retry_at: now,
			created_at: now,
		}
	}

	pub fn is_due(&self, now: u64) -> bool {
		self.next_retry_at <= now
	}
}

/// Response of the webhook endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookResponse {
	pub success: bool,
	#[serde(default)]
	pub data: Option<WebhookResponseData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponseData {
	#[serde(default)]
	pub image_url: Option<String>,
	#[serde(default)]
	pub beneficiary_code: Option<String>,
	#[serde(flatten)]
	pub extra: serde_json::Map<String, serde_json::Value>,
}

/// How a job ended. Every variant is irreversible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOutcome {
	Delivered { response: WebhookResponse },
	Exhausted { attempts: u32 },
	/// Dropped because the job outlived the retention window.
	Expired { attempts: u32 },
}

/// Terminal record kept per `process_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
	pub process_id: String,
	pub outcome: TerminalOutcome,
	/// Unix timestamp in milliseconds.
	pub recorded_at: u64,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_job_record_layout() {
		let job = WebhookJob::new("proc-1", json!({"seedId": "7"}), 1_000);
		let value = serde_json::to_value(&job).unwrap();

		assert_eq!(value["processId"], "proc-1");
		assert_eq!(value["data"]["seedId"], "7");
		assert_eq!(value["count"], 0);
		assert_eq!(value["nextRetry"], 1_000);
		assert!(job.is_due(1_000));
		assert!(!job.is_due(999));
	}

	#[test]
	fn test_payload_is_camel_case() {
		let mint = MintContext {
			process_id: "proc-1".into(),
			contract_address: "0x1111111111111111111111111111111111111111".into(),
			seed_id: "12".into(),
			snapshot_id: "3".into(),
			beneficiary_code: "ABC".into(),
			beneficiary_distribution: json!([{"code": "ABC", "share": 100}]),
			creator: "0x2222222222222222222222222222222222222222".into(),
		};
		let payload =
			SnapshotMintedPayload::from_confirmed(&mint, TransactionHash(vec![0xab]), 42, 5);
		let value = serde_json::to_value(&payload).unwrap();

		assert_eq!(value["txHash"], "0xab");
		assert_eq!(value["blockNumber"], 42);
		assert_eq!(value["beneficiaryDistribution"][0]["share"], 100);
		assert_eq!(value["processId"], "proc-1");
	}

	#[test]
	fn test_webhook_response_keeps_extra_fields() {
		let response: WebhookResponse = serde_json::from_value(json!({
			"success": true,
			"data": {"imageUrl": "https://img/1.png", "beneficiaryCode": "ABC", "tokenId": 9}
		}))
		.unwrap();

		let data = response.data.unwrap();
		assert_eq!(data.image_url.as_deref(), Some("https://img/1.png"));
		assert_eq!(data.extra["tokenId"], 9);
	}
}
