//! Custodial signer backed by a local private key.
//!
//! Transactions are signed in-process and broadcast through an alloy HTTP
//! provider; no user prompt is involved.

use crate::{SignerError, SignerInterface};
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest as RpcTransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use mint_config::EmbeddedSignerConfig;
use mint_types::{Address, SecretString, SignerKind, TransactionHash, TransactionRequest};

pub struct EmbeddedSigner {
	provider: DynProvider,
	address: Address,
}

impl EmbeddedSigner {
	pub fn new(
		rpc_url: &str,
		private_key: &SecretString,
		chain_id: u64,
	) -> Result<Self, SignerError> {
		let signer: PrivateKeySigner = private_key
			.with_exposed(|key| key.parse::<PrivateKeySigner>())
			.map_err(|e| SignerError::Configuration(format!("Invalid private key: {}", e)))?;
		let signer = signer.with_chain_id(Some(chain_id));
		let address = signer.address();

		let url: Url = rpc_url
			.parse()
			.map_err(|e| SignerError::Configuration(format!("Invalid RPC URL: {}", e)))?;

		let provider = ProviderBuilder::new()
			.wallet(EthereumWallet::from(signer))
			.connect_http(url)
			.erased();

		Ok(Self { provider, address })
	}

	pub fn from_config(config: &EmbeddedSignerConfig, chain_id: u64) -> Result<Self, SignerError> {
		Self::new(&config.rpc_url, &config.private_key, chain_id)
	}
}

#[async_trait]
impl SignerInterface for EmbeddedSigner {
	fn kind(&self) -> SignerKind {
		SignerKind::Embedded
	}

	async fn address(&self) -> Result<Option<Address>, SignerError> {
		Ok(Some(self.address))
	}

	async fn send_transaction(
		&self,
		request: &TransactionRequest,
	) -> Result<TransactionHash, SignerError> {
		let tx = RpcTransactionRequest::default()
			.with_from(self.address)
			.with_to(request.to)
			.with_input(request.data.clone())
			.with_value(request.value)
			.with_chain_id(request.chain_id);

		// The provider's wallet signs; fillers supply nonce, gas and fees.
		let pending = self
			.provider
			.send_transaction(tx)
			.await
			.map_err(|e| SignerError::Network(format!("Failed to send transaction: {}", e)))?;

		Ok(TransactionHash(pending.tx_hash().0.to_vec()))
	}
}
