//! File-based storage backend for the order service.
//!
//! Every key is stored as one binary file under a base directory. Files carry
//! a fixed-size header with an expiry timestamp so cache entries written with
//! a TTL age out. Every write goes to its own temporary file in the base
//! directory and is renamed over the target, so readers never see a partial
//! file. Counter creation, increments and compare-and-swap take an exclusive
//! advisory lock on a directory-wide lock file, which makes them atomic
//! across tasks and across processes sharing the same directory.

use crate::{parse_counter, StorageError, StorageInterface};
use async_trait::async_trait;
use fs2::FileExt;
use order_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StorageKey, ValidationError,
};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;

const LOCK_FILE: &str = ".lock";

fn now_secs() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}

fn backend_err(e: impl std::fmt::Display) -> StorageError {
	StorageError::Backend(e.to_string())
}

#[allow(clippy::doc_nested_refdefs)]
/// Fixed-size file header for TTL support.
///
/// Binary layout (64 bytes total):
/// - [0-3]: Magic bytes "ORDS"
/// - [4-5]: Version (u16, little-endian)
/// - [6-13]: Expiration timestamp (u64, little-endian, Unix seconds, 0 = never)
/// - [14-63]: Reserved
#[derive(Debug, Clone)]
struct FileHeader {
	version: u16,
	expires_at: u64,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"ORDS";
	const VERSION: u16 = 1;
	const SIZE: usize = 64;

	fn new(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			now_secs().saturating_add(ttl.as_secs().max(1))
		};

		Self {
			version: Self::VERSION,
			expires_at,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Missing file header".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		let mut expires_bytes = [0u8; 8];
		expires_bytes.copy_from_slice(&bytes[6..14]);

		Ok(Self {
			version,
			expires_at: u64::from_le_bytes(expires_bytes),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && now_secs() >= self.expires_at
	}
}

/// Prepends a header to a payload.
fn encode(value: &[u8], ttl: Duration) -> Vec<u8> {
	encode_with(&FileHeader::new(ttl), value)
}

fn encode_with(header: &FileHeader, value: &[u8]) -> Vec<u8> {
	let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
	file_data.extend_from_slice(&header.serialize());
	file_data.extend_from_slice(value);
	file_data
}

/// Extracts the payload of a stored file, or `None` if it has expired.
///
/// Files without a header are returned as-is.
fn decode(data: Vec<u8>) -> Option<Vec<u8>> {
	match FileHeader::deserialize(&data) {
		Ok(header) if header.is_expired() => None,
		Ok(_) => Some(data[FileHeader::SIZE..].to_vec()),
		Err(_) => Some(data),
	}
}

/// Blocking read used while the directory lock is held.
fn read_live(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
	match std::fs::read(path) {
		Ok(data) => Ok(decode(data)),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(backend_err(e)),
	}
}

/// Blocking write-then-rename through a uniquely named temporary file.
///
/// The temporary file lives next to the target so the rename stays on one
/// filesystem. It has no `.bin` extension, so scans and cleanup skip it.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
	let dir = path
		.parent()
		.ok_or_else(|| StorageError::Backend(format!("No parent directory for {:?}", path)))?;
	let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(backend_err)?;
	temp.write_all(data).map_err(backend_err)?;
	temp.persist(path).map_err(backend_err)?;
	Ok(())
}

/// TTL configuration for different storage keys.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	/// Reads `ttl_<collection>` entries from the backend table.
	fn from_config(config: &toml::Value) -> Self {
		let mut ttls = HashMap::new();

		if let Some(table) = config.as_table() {
			for storage_key in StorageKey::all() {
				let config_key = format!("ttl_{}", storage_key.as_str());
				if let Some(ttl_value) = table
					.get(&config_key)
					.and_then(|v| v.as_integer())
					.and_then(|v| u64::try_from(v).ok())
				{
					ttls.insert(storage_key, Duration::from_secs(ttl_value));
				}
			}
		}

		Self { ttls }
	}

	fn get_ttl(&self, storage_key: StorageKey) -> Duration {
		self.ttls
			.get(&storage_key)
			.copied()
			.unwrap_or(Duration::ZERO)
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
	/// Default TTLs applied when a write carries none.
	ttl_config: TtlConfig,
}

impl FileStorage {
	/// Creates a new FileStorage instance with the specified base path and TTL config.
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
		}
	}

	/// Replaces characters that are unsafe or ambiguous in file names.
	fn sanitize(key: &str) -> String {
		key.replace(['/', ':', ' '], "_")
	}

	fn get_file_path(&self, key: &str) -> PathBuf {
		self.base_path.join(format!("{}.bin", Self::sanitize(key)))
	}

	fn get_ttl_for_key(&self, key: &str) -> Duration {
		StorageKey::from_key(key)
			.map(|sk| self.ttl_config.get_ttl(sk))
			.unwrap_or(Duration::ZERO)
	}

	async fn ensure_base_dir(&self) -> Result<(), StorageError> {
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(backend_err)
	}

	/// Runs `op` on a blocking thread while holding the directory lock.
	async fn with_lock<T, F>(&self, op: F) -> Result<T, StorageError>
	where
		T: Send + 'static,
		F: FnOnce() -> Result<T, StorageError> + Send + 'static,
	{
		self.ensure_base_dir().await?;
		let lock_path = self.base_path.join(LOCK_FILE);

		tokio::task::spawn_blocking(move || {
			let lock = std::fs::OpenOptions::new()
				.create(true)
				.truncate(false)
				.write(true)
				.open(&lock_path)
				.map_err(backend_err)?;
			lock.lock_exclusive().map_err(backend_err)?;
			let result = op();
			if let Err(e) = FileExt::unlock(&lock) {
				tracing::warn!("Failed to release storage lock {:?}: {}", lock_path, e);
			}
			result
		})
		.await
		.map_err(backend_err)?
	}

	/// Removes all expired files from storage.
	async fn cleanup_expired_files(&self) -> Result<usize, StorageError> {
		let mut removed = 0;
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
			Err(e) => return Err(backend_err(e)),
		};

		while let Some(entry) = entries.next_entry().await.map_err(backend_err)? {
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("bin")) {
				continue;
			}
			match fs::read(&path).await {
				Ok(data) => {
					let expired = FileHeader::deserialize(&data)
						.map(|header| header.is_expired())
						.unwrap_or(false);
					if !expired {
						continue;
					}
					if let Err(e) = fs::remove_file(&path).await {
						tracing::warn!("Failed to remove expired file {:?}: {}", path, e);
					} else {
						removed += 1;
					}
				},
				Err(e) => {
					tracing::debug!("Skipping file {:?}: could not be read: {}", path, e);
				},
			}
		}
		Ok(removed)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);

		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			},
			Err(e) => return Err(backend_err(e)),
		};

		decode(data).ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		self.ensure_base_dir().await?;
		let path = self.get_file_path(key);
		let ttl = ttl.unwrap_or_else(|| self.get_ttl_for_key(key));

		tokio::task::spawn_blocking(move || write_atomic(&path, &encode(&value, ttl)))
			.await
			.map_err(backend_err)?
	}

	async fn set_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError> {
		let path = self.get_file_path(key);
		self.with_lock(move || {
			if read_live(&path)?.is_some() {
				return Ok(false);
			}
			write_atomic(&path, &encode(&value, Duration::ZERO))?;
			Ok(true)
		})
		.await
	}

	async fn increment(&self, key: &str, delta: i64) -> Result<i64, StorageError> {
		let path = self.get_file_path(key);
		let key = key.to_string();
		self.with_lock(move || {
			let current = read_live(&path)?.ok_or(StorageError::NotFound)?;
			let next = parse_counter(&current)?
				.checked_add(delta)
				.ok_or_else(|| StorageError::Backend(format!("counter overflow at {}", key)))?;
			write_atomic(&path, &encode(next.to_string().as_bytes(), Duration::ZERO))?;
			Ok(next)
		})
		.await
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		let path = self.get_file_path(key);
		let expected = expected.to_vec();
		let default_ttl = self.get_ttl_for_key(key);
		self.with_lock(move || {
			let data = match std::fs::read(&path) {
				Ok(data) => data,
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
					return Err(StorageError::NotFound)
				},
				Err(e) => return Err(backend_err(e)),
			};

			let (header, current) = match FileHeader::deserialize(&data) {
				Ok(header) if header.is_expired() => return Err(StorageError::NotFound),
				Ok(header) => (header, &data[FileHeader::SIZE..]),
				Err(_) => (FileHeader::new(default_ttl), &data[..]),
			};
			if current != expected.as_slice() {
				return Ok(false);
			}

			write_atomic(&path, &encode_with(&header, &value))?;
			Ok(true)
		})
		.await
	}

	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError> {
		let file_prefix = Self::sanitize(prefix);
		let mut values = Vec::new();
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(values),
			Err(e) => return Err(backend_err(e)),
		};

		while let Some(entry) = entries.next_entry().await.map_err(backend_err)? {
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("bin")) {
				continue;
			}
			let matches = path
				.file_stem()
				.and_then(|stem| stem.to_str())
				.is_some_and(|stem| stem.starts_with(&file_prefix));
			if !matches {
				continue;
			}
			match fs::read(&path).await {
				Ok(data) => values.extend(decode(data)),
				// Deleted between listing and reading
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
				Err(e) => return Err(backend_err(e)),
			}
		}
		Ok(values)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(backend_err(e)),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		match self.get_bytes(key).await {
			Ok(_) => Ok(true),
			Err(StorageError::NotFound) => Ok(false),
			Err(e) => Err(e),
		}
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.cleanup_expired_files().await
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional_fields = vec![Field::new("storage_path", FieldType::String)];

		for storage_key in StorageKey::all() {
			optional_fields.push(Field::new(
				format!("ttl_{}", storage_key.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			));
		}

		Schema::new(vec![], optional_fields).validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
/// - `ttl_orders`, `ttl_counters`, `ttl_order`, `ttl_event`: default TTL in
///   seconds for writes to that collection that carry no TTL (default: 0, never)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage")
		.to_string();

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
