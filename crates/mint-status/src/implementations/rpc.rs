//! Raw JSON-RPC fallback using `eth_getTransactionReceipt`.

use crate::{ProviderError, StatusProviderInterface};
use alloy::primitives::B256;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::client::RpcClient;
use alloy::transports::http::reqwest::{Client, Url};
use alloy::transports::http::Http;
use async_trait::async_trait;
use mint_config::FallbackRpcConfig;
use mint_types::{ProviderReceipt, TransactionHash};
use std::time::Duration;

pub struct RpcStatusProvider {
	provider: DynProvider,
}

impl RpcStatusProvider {
	/// Every request made through the provider is bounded by `request_timeout`.
	pub fn new(rpc_url: &str, request_timeout: Duration) -> Result<Self, ProviderError> {
		let url: Url = rpc_url
			.parse()
			.map_err(|e| ProviderError::Network(format!("Invalid RPC URL: {}", e)))?;
		let client = Client::builder()
			.timeout(request_timeout)
			.build()
			.map_err(|e| ProviderError::Network(format!("Failed to build HTTP client: {}", e)))?;

		let rpc = RpcClient::new(Http::with_client(client, url), false);
		Ok(Self {
			provider: ProviderBuilder::new().connect_client(rpc).erased(),
		})
	}

	pub fn from_config(config: &FallbackRpcConfig) -> Result<Self, ProviderError> {
		Self::new(&config.rpc_url, config.request_timeout())
	}
}

#[async_trait]
impl StatusProviderInterface for RpcStatusProvider {
	fn name(&self) -> &str {
		"rpc"
	}

	async fn get_receipt(&self, tx_hash: &TransactionHash) -> Result<ProviderReceipt, ProviderError> {
		if tx_hash.0.len() != 32 {
			return Err(ProviderError::Network(format!(
				"Invalid transaction hash length: {}",
				tx_hash.0.len()
			)));
		}
		let hash = B256::from_slice(&tx_hash.0);

		match self.provider.get_transaction_receipt(hash).await {
			Ok(Some(receipt)) => Ok(ProviderReceipt {
				receipt_status: Some(if receipt.status() { "1" } else { "0" }.to_string()),
				block_number: receipt.block_number,
				gas_used: Some(receipt.gas_used),
				gas_price: Some(receipt.effective_gas_price),
			}),
			Ok(None) => Ok(ProviderReceipt::pending()),
			Err(e) => Err(ProviderError::Network(format!(
				"Failed to get receipt: {}",
				e
			))),
		}
	}
}
