//! Externally-connected wallet reached through a JSON-RPC bridge.
//!
//! The bridge forwards `eth_accounts` and `eth_sendTransaction` to the user's
//! wallet, which prompts for on-device confirmation. Wallet error codes follow
//! EIP-1193: 4001 is a user rejection, 4100 and 4900 mean no usable account.

use crate::{SignerError, SignerInterface};
use async_trait::async_trait;
use mint_config::ExternalSignerConfig;
use mint_types::{Address, SignerKind, TransactionHash, TransactionRequest};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const USER_REJECTED: i64 = 4001;
const UNAUTHORIZED: i64 = 4100;
const DISCONNECTED: i64 = 4900;

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
	code: i64,
	#[serde(default)]
	message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
	result: Option<T>,
	error: Option<RpcErrorObject>,
}

impl From<RpcErrorObject> for SignerError {
	fn from(err: RpcErrorObject) -> Self {
		match err.code {
			USER_REJECTED => SignerError::UserRejected,
			UNAUTHORIZED | DISCONNECTED => SignerError::NoAccount(err.message),
			code => SignerError::Rpc {
				code,
				message: err.message,
			},
		}
	}
}

pub struct ExternalSigner {
	client: reqwest::Client,
	bridge_url: String,
	next_id: AtomicU64,
}

impl ExternalSigner {
	pub fn new(bridge_url: impl Into<String>, timeout: Duration) -> Result<Self, SignerError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| SignerError::Configuration(e.to_string()))?;

		Ok(Self {
			client,
			bridge_url: bridge_url.into(),
			next_id: AtomicU64::new(1),
		})
	}

	pub fn from_config(config: &ExternalSignerConfig) -> Result<Self, SignerError> {
		Self::new(
			config.bridge_url.clone(),
			Duration::from_secs(config.request_timeout_seconds),
		)
	}

	async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, SignerError> {
		let body = json!({
			"jsonrpc": "2.0",
			"id": self.next_id.fetch_add(1, Ordering::Relaxed),
			"method": method,
			"params": params,
		});

		let response = self
			.client
			.post(&self.bridge_url)
			.json(&body)
			.send()
			.await
			.map_err(|e| SignerError::Network(format!("{} failed: {}", method, e)))?;

		let status = response.status();
		if !status.is_success() {
			return Err(SignerError::Network(format!(
				"{} returned HTTP {}",
				method, status
			)));
		}

		let envelope: RpcResponse<T> = response
			.json()
			.await
			.map_err(|e| SignerError::Network(format!("Invalid {} response: {}", method, e)))?;

		if let Some(error) = envelope.error {
			return Err(error.into());
		}
		envelope.result.ok_or_else(|| {
			SignerError::Network(format!("{} response carried no result", method))
		})
	}
}

#[async_trait]
impl SignerInterface for ExternalSigner {
	fn kind(&self) -> SignerKind {
		SignerKind::External
	}

	async fn address(&self) -> Result<Option<Address>, SignerError> {
		let accounts: Vec<Address> = self.call("eth_accounts", json!([])).await?;
		Ok(accounts.into_iter().next())
	}

	async fn send_transaction(
		&self,
		request: &TransactionRequest,
	) -> Result<TransactionHash, SignerError> {
		let from = self
			.address()
			.await?
			.ok_or_else(|| SignerError::NoAccount("Wallet exposes no accounts".into()))?;

		let tx = json!({
			"from": from,
			"to": request.to,
			"data": request.data,
			"value": format!("{:#x}", request.value),
			"chainId": format!("{:#x}", request.chain_id),
		});

		tracing::debug!(from = %from, "Waiting for wallet confirmation");
		let hash: String = self.call("eth_sendTransaction", json!([tx])).await?;
		hash.parse()
			.map_err(|e| SignerError::Network(format!("Wallet returned invalid hash: {}", e)))
	}
}
