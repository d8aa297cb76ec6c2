//! Configuration for the mint confirmation pipeline.
//!
//! Configuration is TOML. `${VAR}` and `${VAR:-default}` references are
//! resolved from the environment before parsing, and a root file may pull in
//! other files with `include = ["a.toml", "b.toml"]`. Each top-level section
//! must be defined in exactly one file.

mod loader;

use mint_types::SecretString;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the echoed input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub pipeline: PipelineConfig,
	pub storage: StorageConfig,
	pub submitter: SubmitterConfig,
	pub status: StatusConfig,
	pub webhook: WebhookConfig,
	/// Optional HTTP surface.
	pub api: Option<ApiConfig>,
}

/// What the pipeline reports when confirmation cannot be established.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownStatusPolicy {
	/// Surface a timeout error.
	#[default]
	Strict,
	/// Show an unverified, reconstructed result.
	Optimistic,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
	pub id: String,
	#[serde(default)]
	pub unknown_status_policy: UnknownStatusPolicy,
	/// Template for the reconstructed display URL. `{seed_id}` and
	/// `{process_id}` are substituted.
	pub display_url_template: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use.
	pub primary: String,
	/// Implementation name to raw TOML table.
	pub implementations: HashMap<String, toml::Value>,
	#[serde(default = "default_cleanup_interval_seconds")]
	pub cleanup_interval_seconds: u64,
}

fn default_cleanup_interval_seconds() -> u64 {
	60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmitterConfig {
	pub chain_id: u64,
	/// Custodial signer holding a local key.
	pub embedded: Option<EmbeddedSignerConfig>,
	/// User wallet reached through a JSON-RPC bridge.
	pub external: Option<ExternalSignerConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddedSignerConfig {
	pub rpc_url: String,
	pub private_key: SecretString,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExternalSignerConfig {
	pub bridge_url: String,
	/// Covers the time the user spends approving in their wallet.
	#[serde(default = "default_bridge_timeout_seconds")]
	pub request_timeout_seconds: u64,
}

fn default_bridge_timeout_seconds() -> u64 {
	120
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusConfig {
	#[serde(default = "default_poll_interval_seconds")]
	pub poll_interval_seconds: u64,
	#[serde(default = "default_rate_limit_delay_seconds")]
	pub rate_limit_delay_seconds: u64,
	#[serde(default = "default_status_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_status_timeout_seconds")]
	pub timeout_seconds: u64,
	pub primary: IndexerConfig,
	pub fallback: Option<FallbackRpcConfig>,
}

fn default_poll_interval_seconds() -> u64 {
	5
}

fn default_rate_limit_delay_seconds() -> u64 {
	15
}

fn default_status_max_attempts() -> u32 {
	12
}

fn default_status_timeout_seconds() -> u64 {
	120
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexerConfig {
	pub base_url: String,
	pub api_key: SecretString,
	/// Chain name as the indexer spells it, e.g. "base".
	pub chain: String,
	#[serde(default = "default_request_timeout_seconds")]
	pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FallbackRpcConfig {
	pub rpc_url: String,
	/// Bound on the single fallback lookup. This much of the status budget
	/// is held back from primary polling.
	#[serde(default = "default_fallback_timeout_seconds")]
	pub request_timeout_seconds: u64,
}

fn default_fallback_timeout_seconds() -> u64 {
	10
}

impl FallbackRpcConfig {
	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_seconds)
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
	#[default]
	Fixed,
	Exponential,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
	/// Backend base URL; jobs are POSTed to `{url}/snapshot-minted`.
	pub url: String,
	#[serde(default = "default_webhook_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_retry_delay_seconds")]
	pub retry_delay_seconds: u64,
	#[serde(default)]
	pub backoff: BackoffKind,
	/// Cap for exponential backoff.
	#[serde(default = "default_max_retry_delay_seconds")]
	pub max_retry_delay_seconds: u64,
	#[serde(default = "default_request_timeout_seconds")]
	pub request_timeout_seconds: u64,
	/// Period of the background sweep over persisted jobs.
	#[serde(default = "default_resume_interval_seconds")]
	pub resume_interval_seconds: u64,
	/// How long a job is kept, measured from its creation.
	#[serde(default = "default_retention_seconds")]
	pub retention_seconds: u64,
}

fn default_webhook_max_attempts() -> u32 {
	18
}

fn default_retry_delay_seconds() -> u64 {
	10
}

fn default_max_retry_delay_seconds() -> u64 {
	60
}

fn default_request_timeout_seconds() -> u64 {
	30
}

fn default_resume_interval_seconds() -> u64 {
	15
}

fn default_retention_seconds() -> u64 {
	300
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

impl StatusConfig {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.poll_interval_seconds)
	}

	pub fn rate_limit_delay(&self) -> Duration {
		Duration::from_secs(self.rate_limit_delay_seconds)
	}

	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_seconds)
	}
}

impl WebhookConfig {
	pub fn retry_delay(&self) -> Duration {
		Duration::from_secs(self.retry_delay_seconds)
	}

	pub fn max_retry_delay(&self) -> Duration {
		Duration::from_secs(self.max_retry_delay_seconds)
	}

	pub fn retention(&self) -> Duration {
		Duration::from_secs(self.retention_seconds)
	}
}

/// Replaces `${VAR}` and `${VAR:-default}` with environment values.
///
/// Input is capped at 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match (std::env::var(var_name.as_str()), cap.get(2)) {
			(Ok(v), _) => v,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					var_name.as_str()
				)))
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

impl Config {
	/// Loads a root configuration file together with its includes.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.pipeline.id.is_empty() {
			return Err(ConfigError::Validation("Pipeline ID cannot be empty".into()));
		}

		if self.storage.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Storage primary implementation cannot be empty".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be greater than 0".into(),
			));
		}

		if self.submitter.embedded.is_none() && self.submitter.external.is_none() {
			return Err(ConfigError::Validation(
				"At least one signer (embedded or external) must be configured".into(),
			));
		}
		if let Some(embedded) = &self.submitter.embedded {
			if embedded.rpc_url.is_empty() || embedded.private_key.is_empty() {
				return Err(ConfigError::Validation(
					"Embedded signer requires rpc_url and private_key".into(),
				));
			}
		}

		let status = &self.status;
		if status.poll_interval_seconds == 0
			|| status.rate_limit_delay_seconds == 0
			|| status.max_attempts == 0
			|| status.timeout_seconds == 0
		{
			return Err(ConfigError::Validation(
				"Status polling values must be greater than 0".into(),
			));
		}
		if status.primary.base_url.is_empty() {
			return Err(ConfigError::Validation(
				"Status primary base_url cannot be empty".into(),
			));
		}

		let webhook = &self.webhook;
		if webhook.url.is_empty() {
			return Err(ConfigError::Validation("Webhook URL cannot be empty".into()));
		}
		if webhook.max_attempts == 0 {
			return Err(ConfigError::Validation(
				"Webhook max_attempts must be at least 1".into(),
			));
		}
		if webhook.retry_delay_seconds == 0 || webhook.retention_seconds == 0 {
			return Err(ConfigError::Validation(
				"Webhook retry_delay_seconds and retention_seconds must be greater than 0".into(),
			));
		}
		if webhook.max_retry_delay_seconds < webhook.retry_delay_seconds {
			return Err(ConfigError::Validation(
				"Webhook max_retry_delay_seconds cannot be below retry_delay_seconds".into(),
			));
		}

		Ok(())
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
