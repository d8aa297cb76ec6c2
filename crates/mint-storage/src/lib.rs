//! Durable job store for the mint pipeline.
//!
//! Keys have the form `<namespace>:<id>`. Backends implement the byte-level
//! [`StorageInterface`]; [`StorageService`] adds typed JSON access and
//! namespace scans used by startup recovery.

use async_trait::async_trait;
use mint_types::{ConfigSchema, ImplementationRegistry, StorageKey};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// The key is missing or its entry has expired.
	#[error("Not found")]
	NotFound,
	/// A value could not be encoded to or decoded from JSON.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// The underlying backend failed, e.g. an I/O error.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Backend configuration was rejected at construction.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level key-value backend with optional expiry.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Returns `NotFound` for missing and for expired keys.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores a value. `None` falls back to the namespace TTL from config;
	/// a zero TTL never expires.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Deleting a missing key is not an error.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Whether a live (unexpired) entry exists for the key.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists live keys in a namespace, as full `<namespace>:<id>` keys.
	///
	/// Ids come back exactly as they were stored, whatever the backend does
	/// to them on disk. Order is unspecified.
	async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError>;

	/// Returns the schema used to validate this backend's configuration.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries and returns how many were dropped.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

/// Builds a backend from its `[storage.implementations.<name>]` table.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry implemented by every storage backend.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// All built-in backends as `(name, factory)` pairs.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Per-namespace default TTLs read from `ttl_<namespace>` config keys.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	/// Reads `ttl_webhook_retry` and friends. Negative or non-integer values
	/// are ignored.
	pub fn from_config(config: &toml::Value) -> Self {
		let mut ttls = HashMap::new();

		if let Some(table) = config.as_table() {
			for storage_key in StorageKey::all() {
				let config_key = format!("ttl_{}", storage_key.as_str());
				if let Some(secs) = table
					.get(&config_key)
					.and_then(|v| v.as_integer())
					.filter(|v| *v >= 0)
				{
					ttls.insert(storage_key, Duration::from_secs(secs as u64));
				}
			}
		}

		Self { ttls }
	}

	/// TTL for a full key, resolved through its namespace prefix.
	pub fn ttl_for_key(&self, key: &str) -> Duration {
		let namespace = key.split(':').next().unwrap_or("");
		namespace
			.parse::<StorageKey>()
			.ok()
			.and_then(|sk| self.ttls.get(&sk).copied())
			.unwrap_or(Duration::ZERO)
	}
}

/// Splits `<namespace>:<id>`; keys without a namespace yield `None`.
pub(crate) fn split_key(key: &str) -> Option<(&str, &str)> {
	key.split_once(':')
}

/// Typed access on top of a storage backend.
///
/// Values are stored as JSON under `<namespace>:<id>`. The service is shared
/// behind an `Arc` by the dispatcher, recovery and the API.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Wraps a backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	/// Stores a value as JSON with an explicit TTL. Overwrites any previous
	/// value. `None` uses the namespace default configured on the backend.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.set_bytes(&Self::key(namespace, id), bytes, ttl)
			.await
	}

	/// Stores a value with the namespace default TTL.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	/// Loads and deserializes a value.
	///
	/// Returns `NotFound` for missing or expired entries and `Serialization`
	/// if the stored bytes do not decode as `T`.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Like [`retrieve`](Self::retrieve) but maps `NotFound` to `None`.
	pub async fn find<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Removes a value. Removing a missing value succeeds.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}

	/// Checks for a live value.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}

	/// Loads every live entry of a namespace as `(id, value)` pairs.
	///
	/// Entries that expire between listing and reading are skipped, as are
	/// entries that no longer deserialize.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<(String, T)>, StorageError> {
		let mut entries = Vec::new();

		for key in self.backend.list_keys(namespace).await? {
			let Some((_, id)) = split_key(&key) else {
				continue;
			};
			let bytes = match self.backend.get_bytes(&key).await {
				Ok(bytes) => bytes,
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			};
			match serde_json::from_slice(&bytes) {
				Ok(value) => entries.push((id.to_string(), value)),
				Err(e) => tracing::warn!(key = %key, error = %e, "Skipping unreadable entry"),
			}
		}

		Ok(entries)
	}

	/// Drops expired entries from the backend, returning how many went.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;
	use serde::Deserialize;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Job {
		count: u32,
	}

	#[test]
	fn test_ttl_config_by_namespace() {
		let config: toml::Value =
			toml::from_str("ttl_webhook_retry = 300\nttl_webhook_outcome = 86400").unwrap();
		let ttls = TtlConfig::from_config(&config);

		assert_eq!(ttls.ttl_for_key("webhook_retry:p1"), Duration::from_secs(300));
		assert_eq!(
			ttls.ttl_for_key("webhook_outcome:p1"),
			Duration::from_secs(86400)
		);
		assert_eq!(ttls.ttl_for_key("other:p1"), Duration::ZERO);
	}

	#[tokio::test]
	async fn test_typed_roundtrip_and_scan() {
		let service = StorageService::new(Box::new(MemoryStorage::new()));

		service.store("webhook_retry", "a", &Job { count: 1 }).await.unwrap();
		service.store("webhook_retry", "b", &Job { count: 2 }).await.unwrap();
		service.store("webhook_outcome", "a", &Job { count: 9 }).await.unwrap();

		let found: Option<Job> = service.find("webhook_retry", "a").await.unwrap();
		assert_eq!(found, Some(Job { count: 1 }));
		assert!(service
			.find::<Job>("webhook_retry", "missing")
			.await
			.unwrap()
			.is_none());

		let mut all: Vec<(String, Job)> = service.retrieve_all("webhook_retry").await.unwrap();
		all.sort_by(|a, b| a.0.cmp(&b.0));
		assert_eq!(
			all,
			vec![("a".to_string(), Job { count: 1 }), ("b".to_string(), Job { count: 2 })]
		);

		service.remove("webhook_retry", "a").await.unwrap();
		assert!(!service.exists("webhook_retry", "a").await.unwrap());
	}
}
