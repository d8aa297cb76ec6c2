//! In-memory storage backend.
//!
//! Nothing survives a restart. Expiry uses the tokio clock so tests can drive
//! it with paused time.

use crate::{split_key, StorageError, StorageInterface, TtlConfig};
use async_trait::async_trait;
use mint_types::{ConfigSchema, Field, FieldType, Schema, StorageKey, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn is_expired(&self, now: Instant) -> bool {
		self.expires_at.is_some_and(|at| now >= at)
	}
}

/// Process-local backend. Contents are lost on restart.
pub struct MemoryStorage {
	store: Arc<RwLock<HashMap<String, Entry>>>,
	ttl_config: TtlConfig,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::with_ttl_config(TtlConfig::default())
	}

	/// Applies namespace default TTLs to writes that pass no explicit TTL.
	pub fn with_ttl_config(ttl_config: TtlConfig) -> Self {
		Self {
			store: Arc::new(RwLock::new(HashMap::new())),
			ttl_config,
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		match store.get(key) {
			Some(entry) if !entry.is_expired(Instant::now()) => Ok(entry.value.clone()),
			_ => Err(StorageError::NotFound),
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let ttl = ttl.unwrap_or_else(|| self.ttl_config.ttl_for_key(key));
		let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);

		let mut store = self.store.write().await;
		store.insert(key.to_string(), Entry { value, expires_at });
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.get(key)
			.is_some_and(|entry| !entry.is_expired(Instant::now())))
	}

	async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let now = Instant::now();
		let store = self.store.read().await;
		Ok(store
			.iter()
			.filter(|(key, entry)| {
				split_key(key).is_some_and(|(ns, _)| ns == namespace) && !entry.is_expired(now)
			})
			.map(|(key, _)| key.clone())
			.collect())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let now = Instant::now();
		let mut store = self.store.write().await;
		let before = store.len();
		store.retain(|_, entry| !entry.is_expired(now));
		Ok(before - store.len())
	}
}

pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let optional = StorageKey::all()
			.map(|key| {
				Field::new(
					format!("ttl_{}", key.as_str()),
					FieldType::Integer {
						min: Some(0),
						max: None,
					},
				)
			})
			.collect();
		Schema::new(vec![], optional).validate(config)
	}
}

/// Builds a memory backend; only the optional `ttl_<namespace>` keys apply.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::with_ttl_config(
		TtlConfig::from_config(config),
	)))
}

pub struct Registry;

impl mint_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		let key = "webhook_retry:p1";
		storage.set_bytes(key, b"job".to_vec(), None).await.unwrap();
		assert_eq!(storage.get_bytes(key).await.unwrap(), b"job".to_vec());
		assert!(storage.exists(key).await.unwrap());

		storage.delete(key).await.unwrap();
		assert!(!storage.exists(key).await.unwrap());
		assert!(matches!(
			storage.get_bytes(key).await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_entries_expire() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes(
				"webhook_retry:p1",
				b"job".to_vec(),
				Some(Duration::from_secs(300)),
			)
			.await
			.unwrap();
		storage
			.set_bytes("webhook_retry:p2", b"job".to_vec(), None)
			.await
			.unwrap();

		tokio::time::advance(Duration::from_secs(299)).await;
		assert!(storage.exists("webhook_retry:p1").await.unwrap());

		tokio::time::advance(Duration::from_secs(1)).await;
		assert!(!storage.exists("webhook_retry:p1").await.unwrap());
		assert_eq!(
			storage.list_keys("webhook_retry").await.unwrap(),
			vec!["webhook_retry:p2".to_string()]
		);
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn test_namespace_ttl_from_config() {
		let config: toml::Value = toml::from_str("ttl_webhook_retry = 5").unwrap();
		let storage = create_storage(&config).unwrap();

		storage
			.set_bytes("webhook_retry:p1", b"job".to_vec(), None)
			.await
			.unwrap();
		tokio::time::advance(Duration::from_secs(5)).await;
		assert!(!storage.exists("webhook_retry:p1").await.unwrap());
	}
}
