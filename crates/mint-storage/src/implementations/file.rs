//! File-backed storage.
//!
//! Each namespace is a directory under `storage_path`; each entry is one file
//! `<namespace>/<hex(id)>.bin` prefixed with a fixed header carrying its
//! expiry. Ids are hex-encoded so distinct ids never share a file. Writes go to
//! a temporary file that is renamed into place.

use crate::{split_key, StorageError, StorageInterface, TtlConfig};
use async_trait::async_trait;
use mint_types::{
	current_timestamp_millis, ConfigSchema, Field, FieldType, Schema, StorageKey,
	ValidationError,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Fixed 64-byte entry header.
///
/// - [0-3]: magic "MINT"
/// - [4-5]: version (u16, little-endian)
/// - [6-13]: expiry (u64, little-endian, Unix milliseconds, 0 = never)
/// - [14-63]: reserved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EntryHeader {
	expires_at: u64,
}

impl EntryHeader {
	const MAGIC: &'static [u8; 4] = b"MINT";
	const VERSION: u16 = 1;
	const SIZE: usize = 64;

	fn new(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			current_timestamp_millis().saturating_add(ttl.as_millis() as u64)
		};
		Self { expires_at }
	}

	fn encode(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&Self::VERSION.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE || &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Unrecognized entry header".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported entry version: {}",
				version
			)));
		}

		let mut expires = [0u8; 8];
		expires.copy_from_slice(&bytes[6..14]);
		Ok(Self {
			expires_at: u64::from_le_bytes(expires),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && current_timestamp_millis() >= self.expires_at
	}
}

/// Durable backend rooted at a directory; survives restarts.
pub struct FileStorage {
	base_path: PathBuf,
	ttl_config: TtlConfig,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
		}
	}

	/// Namespaces are fixed identifiers; only path separators are replaced.
	fn namespace_dir(namespace: &str) -> String {
		namespace.replace(['/', '\\', '.'], "_")
	}

	fn file_path(&self, key: &str) -> PathBuf {
		match split_key(key) {
			Some((namespace, id)) => self
				.base_path
				.join(Self::namespace_dir(namespace))
				.join(format!("{}.bin", hex::encode(id))),
			None => self.base_path.join(format!("{}.bin", hex::encode(key))),
		}
	}

	/// Recovers the id from an entry's file stem.
	fn decode_id(stem: &str) -> Option<String> {
		hex::decode(stem)
			.ok()
			.and_then(|bytes| String::from_utf8(bytes).ok())
	}

	/// Reads an entry and returns its payload if it is still live.
	async fn read_live(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
		let data = match fs::read(path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let header = EntryHeader::decode(&data)?;
		if header.is_expired() {
			return Ok(None);
		}
		Ok(Some(data[EntryHeader::SIZE..].to_vec()))
	}

	async fn entry_files(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
		let mut entries = match fs::read_dir(dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut files = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() == Some(std::ffi::OsStr::new("bin")) {
				files.push(path);
			}
		}
		Ok(files)
	}

	async fn remove_if_expired(path: &Path) -> bool {
		let data = match fs::read(path).await {
			Ok(data) => data,
			Err(e) => {
				tracing::debug!("Skipping {:?}: could not be read: {}", path, e);
				return false;
			},
		};
		match EntryHeader::decode(&data) {
			Ok(header) if header.is_expired() => match fs::remove_file(path).await {
				Ok(()) => true,
				Err(e) => {
					tracing::warn!("Failed to remove expired entry {:?}: {}", path, e);
					false
				},
			},
			Ok(_) => false,
			Err(e) => {
				tracing::debug!("Skipping {:?}: {}", path, e);
				false
			},
		}
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		Self::read_live(&self.file_path(key))
			.await?
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.file_path(key);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let ttl = ttl.unwrap_or_else(|| self.ttl_config.ttl_for_key(key));
		let mut file_data = Vec::with_capacity(EntryHeader::SIZE + value.len());
		file_data.extend_from_slice(&EntryHeader::new(ttl).encode());
		file_data.extend_from_slice(&value);

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, file_data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.file_path(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(Self::read_live(&self.file_path(key)).await?.is_some())
	}

	async fn list_keys(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
		let dir = self.base_path.join(Self::namespace_dir(namespace));
		let mut keys = Vec::new();

		for path in Self::entry_files(&dir).await? {
			let Some(id) = path
				.file_stem()
				.and_then(|s| s.to_str())
				.and_then(Self::decode_id)
			else {
				tracing::debug!("Skipping {:?}: not a storage entry name", path);
				continue;
			};
			match Self::read_live(&path).await {
				Ok(Some(_)) => keys.push(format!("{}:{}", namespace, id)),
				Ok(None) => {},
				Err(e) => tracing::debug!("Skipping {:?}: {}", path, e),
			}
		}

		Ok(keys)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let mut removed = 0;
		for namespace in StorageKey::all() {
			let dir = self.base_path.join(namespace.as_str());
			for path in Self::entry_files(&dir).await? {
				if Self::remove_if_expired(&path).await {
					removed += 1;
				}
			}
		}
		Ok(removed)
	}
}

/// Configuration schema for the file backend.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional = vec![Field::new("storage_path", FieldType::String)];
		optional.extend(StorageKey::all().map(|key| {
			Field::new(
				format!("ttl_{}", key.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			)
		}));

		Schema::new(vec![], optional).validate(config)
	}
}

/// Builds a file backend.
///
/// Configuration:
/// - `storage_path`: base directory (default "./data/storage")
/// - `ttl_webhook_retry`, `ttl_webhook_outcome`: namespace TTLs in seconds
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

pub struct Registry;

impl mint_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
