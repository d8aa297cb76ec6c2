//! Hosted indexer status provider.
//!
//! `GET {base_url}/transaction/{hash}?chain={chain}` with an `X-API-Key`
//! header. The indexer reports numbers as decimal strings and omits
//! `receipt_status` until the transaction is mined. A 404 means the
//! transaction has not been indexed yet.

use crate::{ProviderError, StatusProviderInterface};
use async_trait::async_trait;
use mint_config::IndexerConfig;
use mint_types::{ProviderReceipt, SecretString, TransactionHash};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
struct IndexerTransaction {
	#[serde(default)]
	receipt_status: Value,
	#[serde(default)]
	block_number: Value,
	#[serde(default)]
	receipt_gas_used: Value,
	#[serde(default)]
	gas_price: Value,
}

/// Accepts both `"123"` and `123`; null and empty strings read as absent.
fn text(value: &Value) -> Option<String> {
	match value {
		Value::String(s) if !s.is_empty() => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		_ => None,
	}
}

fn number<T: FromStr>(value: &Value) -> Option<T> {
	text(value).and_then(|s| s.parse().ok())
}

impl From<IndexerTransaction> for ProviderReceipt {
	fn from(tx: IndexerTransaction) -> Self {
		ProviderReceipt {
			receipt_status: text(&tx.receipt_status),
			block_number: number(&tx.block_number),
			gas_used: number(&tx.receipt_gas_used),
			gas_price: number(&tx.gas_price),
		}
	}
}

pub struct IndexerStatusProvider {
	client: reqwest::Client,
	base_url: String,
	api_key: SecretString,
	chain: String,
}

impl IndexerStatusProvider {
	pub fn new(
		base_url: impl Into<String>,
		api_key: SecretString,
		chain: impl Into<String>,
		timeout: Duration,
	) -> Result<Self, ProviderError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| ProviderError::Network(e.to_string()))?;

		Ok(Self {
			client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			api_key,
			chain: chain.into(),
		})
	}

	pub fn from_config(config: &IndexerConfig) -> Result<Self, ProviderError> {
		Self::new(
			config.base_url.clone(),
			config.api_key.clone(),
			config.chain.clone(),
			Duration::from_secs(config.request_timeout_seconds),
		)
	}
}

#[async_trait]
impl StatusProviderInterface for IndexerStatusProvider {
	fn name(&self) -> &str {
		"indexer"
	}

	async fn get_receipt(&self, tx_hash: &TransactionHash) -> Result<ProviderReceipt, ProviderError> {
		let url = format!("{}/transaction/{}", self.base_url, tx_hash.to_hex());

		let response = self.api_key.with_exposed(|key| {
			self.client
				.get(&url)
				.query(&[("chain", self.chain.as_str())])
				.header("X-API-Key", key)
				.header("accept", "application/json")
				.send()
		});
		let response = response
			.await
			.map_err(|e| ProviderError::Network(e.to_string()))?;

		match response.status() {
			StatusCode::NOT_FOUND => return Ok(ProviderReceipt::pending()),
			StatusCode::TOO_MANY_REQUESTS => return Err(ProviderError::RateLimited),
			status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
				return Err(ProviderError::Unauthorized(format!("HTTP {}", status)))
			},
			status if !status.is_success() => {
				return Err(ProviderError::Network(format!("HTTP {}", status)))
			},
			_ => {},
		}

		let tx: IndexerTransaction = response
			.json()
			.await
			.map_err(|e| ProviderError::Network(format!("Invalid indexer response: {}", e)))?;
		Ok(tx.into())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::{
		extract::{Path, Query},
		http::{HeaderMap, StatusCode as HttpStatus},
		response::IntoResponse,
		routing::get,
		Json, Router,
	};
	use serde_json::json;
	use std::collections::HashMap;

	async fn handler(
		Path(hash): Path<String>,
		Query(query): Query<HashMap<String, String>>,
		headers: HeaderMap,
	) -> axum::response::Response {
		if headers.get("x-api-key").and_then(|v| v.to_str().ok()) != Some("test-key") {
			return HttpStatus::UNAUTHORIZED.into_response();
		}
		if query.get("chain").map(String::as_str) != Some("base") {
			return HttpStatus::BAD_REQUEST.into_response();
		}

		match &hash[2..4] {
			"11" => Json(json!({
				"hash": hash,
				"receipt_status": "1",
				"block_number": "12345",
				"receipt_gas_used": "21000",
				"gas_price": "1500000000"
			}))
			.into_response(),
			"22" => Json(json!({ "hash": hash, "receipt_status": null })).into_response(),
			"33" => HttpStatus::TOO_MANY_REQUESTS.into_response(),
			"44" => HttpStatus::INTERNAL_SERVER_ERROR.into_response(),
			_ => HttpStatus::NOT_FOUND.into_response(),
		}
	}

	async fn serve() -> String {
		let app = Router::new().route("/transaction/{hash}", get(handler));
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});
		format!("http://{}", addr)
	}

	fn provider(base_url: String, key: &str) -> IndexerStatusProvider {
		IndexerStatusProvider::new(base_url, SecretString::from(key), "base", Duration::from_secs(5))
			.unwrap()
	}

	#[tokio::test]
	async fn test_confirmed_receipt_parses_string_numbers() {
		let provider = provider(serve().await, "test-key");

		let receipt = provider.get_receipt(&TransactionHash(vec![0x11; 32])).await.unwrap();
		assert_eq!(
			receipt,
			ProviderReceipt {
				receipt_status: Some("1".into()),
				block_number: Some(12345),
				gas_used: Some(21000),
				gas_price: Some(1_500_000_000),
			}
		);
	}

	#[tokio::test]
	async fn test_unmined_and_unindexed_are_pending() {
		let provider = provider(serve().await, "test-key");

		let unmined = provider.get_receipt(&TransactionHash(vec![0x22; 32])).await.unwrap();
		assert_eq!(unmined, ProviderReceipt::pending());

		let unindexed = provider.get_receipt(&TransactionHash(vec![0x99; 32])).await.unwrap();
		assert_eq!(unindexed, ProviderReceipt::pending());
	}

	#[tokio::test]
	async fn test_http_errors_are_classified() {
		let base_url = serve().await;
		let good = provider(base_url.clone(), "test-key");
		let bad = provider(base_url, "wrong-key");

		assert!(matches!(
			good.get_receipt(&TransactionHash(vec![0x33; 32])).await,
			Err(ProviderError::RateLimited)
		));
		assert!(matches!(
			good.get_receipt(&TransactionHash(vec![0x44; 32])).await,
			Err(ProviderError::Network(_))
		));
		assert!(matches!(
			bad.get_receipt(&TransactionHash(vec![0x11; 32])).await,
			Err(ProviderError::Unauthorized(_))
		));
	}
}
