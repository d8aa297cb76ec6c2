//! Builds a [`MintPipeline`] from configuration.
//!
//! Storage backends are pluggable and created through named factories; the
//! signers, status providers and webhook client come from their typed config
//! sections.

use crate::MintPipeline;
use mint_config::Config;
use mint_dispatch::{implementations::http::HttpWebhook, DispatcherConfig, RetryableDispatcher};
use mint_status::implementations::{indexer::IndexerStatusProvider, rpc::RpcStatusProvider};
use mint_status::{ResolverConfig, StatusProviderInterface, StatusResolver};
use mint_storage::{StorageError, StorageInterface, StorageService};
use mint_submit::implementations::{embedded::EmbeddedSigner, external::ExternalSigner};
use mint_submit::{SignerInterface, TransactionSubmitter};
use mint_types::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

pub struct PipelineBuilder {
	config: Config,
}

impl PipelineBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the pipeline, creating storage through `storage_factories`.
	pub fn build<SF>(
		self,
		storage_factories: HashMap<String, SF>,
	) -> Result<MintPipeline, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let storage = Arc::new(StorageService::new(self.build_storage(&storage_factories)?));
		let event_bus = EventBus::default();

		let submitter = Arc::new(TransactionSubmitter::new(self.build_signers()?));

		let resolver = Arc::new(self.build_resolver()?);

		let webhook = HttpWebhook::from_config(&self.config.webhook)
			.map_err(|e| BuilderError::Config(format!("Failed to create webhook client: {}", e)))?;
		tracing::info!(component = "webhook", url = %self.config.webhook.url, "Loaded");
		let dispatcher = RetryableDispatcher::new(
			Arc::new(webhook),
			storage.clone(),
			DispatcherConfig::from(&self.config.webhook),
			event_bus.clone(),
		);

		Ok(MintPipeline::new(
			self.config.pipeline,
			submitter,
			resolver,
			dispatcher,
			storage,
			event_bus,
		))
	}

	fn build_storage<SF>(
		&self,
		factories: &HashMap<String, SF>,
	) -> Result<Box<dyn StorageInterface>, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			let Some(factory) = factories.get(name) else {
				tracing::warn!(component = "storage", implementation = %name, "Unknown implementation, skipping");
				continue;
			};
			match factory(config) {
				Ok(implementation) => {
					let is_primary = &self.config.storage.primary == name;
					tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
					storage_impls.insert(name.clone(), implementation);
				},
				Err(e) => {
					tracing::error!(
						component = "storage",
						implementation = %name,
						error = %e,
						"Failed to create storage implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create storage implementation '{}': {}",
						name, e
					)));
				},
			}
		}

		let primary = &self.config.storage.primary;
		storage_impls.remove(primary).ok_or_else(|| {
			BuilderError::Config(format!(
				"Primary storage '{}' failed to load or has invalid configuration",
				primary
			))
		})
	}

	fn build_signers(&self) -> Result<Vec<Arc<dyn SignerInterface>>, BuilderError> {
		let submitter = &self.config.submitter;
		let mut signers: Vec<Arc<dyn SignerInterface>> = Vec::new();

		if let Some(embedded) = &submitter.embedded {
			let signer = EmbeddedSigner::from_config(embedded, submitter.chain_id).map_err(|e| {
				BuilderError::Config(format!("Failed to create embedded signer: {}", e))
			})?;
			tracing::info!(component = "signer", implementation = "embedded", "Loaded");
			signers.push(Arc::new(signer));
		}

		if let Some(external) = &submitter.external {
			let signer = ExternalSigner::from_config(external).map_err(|e| {
				BuilderError::Config(format!("Failed to create external signer: {}", e))
			})?;
			tracing::info!(component = "signer", implementation = "external", bridge = %external.bridge_url, "Loaded");
			signers.push(Arc::new(signer));
		}

		if signers.is_empty() {
			return Err(BuilderError::MissingComponent("signer".into()));
		}
		Ok(signers)
	}

	fn build_resolver(&self) -> Result<StatusResolver, BuilderError> {
		let status = &self.config.status;

		let primary = IndexerStatusProvider::from_config(&status.primary).map_err(|e| {
			BuilderError::Config(format!("Failed to create indexer provider: {}", e))
		})?;
		tracing::info!(component = "status", implementation = "indexer", chain = %status.primary.chain, "Loaded");

		let fallback = match &status.fallback {
			Some(config) => {
				let provider = RpcStatusProvider::from_config(config).map_err(|e| {
					BuilderError::Config(format!("Failed to create RPC fallback: {}", e))
				})?;
				tracing::info!(component = "status", implementation = "rpc", "Loaded fallback");
				Some(Arc::new(provider) as Arc<dyn StatusProviderInterface>)
			},
			None => None,
		};

		Ok(StatusResolver::new(
			Arc::new(primary),
			fallback,
			ResolverConfig::from(status),
		))
	}
}
