//! Storage module for the order management service.
//!
//! This module provides abstractions for persistent storage of orders and
//! sequence counters, and for the response cache, supporting different
//! backend implementations such as in-memory, file-based or Redis.

use async_trait::async_trait;
use order_types::{ConfigSchema, ImplementationRegistry, StorageKey};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
	#[cfg(feature = "redis")]
	pub mod redis;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs when an insert targets a key that is already taken.
	#[error("Key already exists: {0}")]
	AlreadyExists(String),
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Besides plain key-value access, backends provide three atomic primitives:
/// `set_if_absent` and `increment` create and advance sequence counters, and
/// `compare_and_swap` lets a read-modify-write of a record detect that
/// another writer got there first.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes with optional time-to-live.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Stores raw bytes only if the key is absent.
	///
	/// Returns `true` when the value was written and `false` when the key
	/// already held a value. The check and the write are a single atomic step.
	async fn set_if_absent(&self, key: &str, value: Vec<u8>) -> Result<bool, StorageError>;

	/// Atomically adds `delta` to the integer stored at `key` and returns the
	/// new value. Fails with `NotFound` if the key holds no value.
	async fn increment(&self, key: &str, delta: i64) -> Result<i64, StorageError>;

	/// Replaces the value at `key` with `value` only if it still holds exactly
	/// `expected`, keeping its expiry.
	///
	/// Returns `false` when the stored value differs and `NotFound` when the
	/// key holds no value. The comparison and the write are a single atomic
	/// step.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: &[u8],
		value: Vec<u8>,
	) -> Result<bool, StorageError>;

	/// Returns the values of every live key starting with `prefix`.
	async fn scan_prefix(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries from storage.
	/// Returns the number of entries removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

/// Parses a counter value as stored by `set_if_absent`/`increment`.
pub(crate) fn parse_counter(bytes: &[u8]) -> Result<i64, StorageError> {
	std::str::from_utf8(bytes)
		.ok()
		.and_then(|s| s.trim().parse::<i64>().ok())
		.ok_or_else(|| StorageError::Serialization("counter value is not an integer".into()))
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	#[allow(unused_mut)]
	let mut all = vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	];
	#[cfg(feature = "redis")]
	all.push((
		implementations::redis::Registry::NAME,
		implementations::redis::Registry::factory(),
	));
	all
}

/// High-level storage service that provides typed operations.
///
/// The StorageService wraps a low-level storage backend and stores values
/// as JSON under keys laid out by [`StorageKey`].
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a serializable value with optional time-to-live, overwriting
	/// any existing value.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		collection: StorageKey,
		id: impl Display,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&collection.key(id), bytes, ttl).await
	}

	/// Stores a serializable value without time-to-live.
	pub async fn store<T: Serialize>(
		&self,
		collection: StorageKey,
		id: impl Display,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(collection, id, data, None).await
	}

	/// Inserts a new value, failing with `AlreadyExists` if the key is taken.
	pub async fn insert<T: Serialize>(
		&self,
		collection: StorageKey,
		id: impl Display,
		data: &T,
	) -> Result<(), StorageError> {
		let key = collection.key(id);
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		if self.backend.set_if_absent(&key, bytes).await? {
			Ok(())
		} else {
			Err(StorageError::AlreadyExists(key))
		}
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		collection: StorageKey,
		id: impl Display,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&collection.key(id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Retrieves and deserializes every value of a collection.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		collection: StorageKey,
	) -> Result<Vec<T>, StorageError> {
		self.backend
			.scan_prefix(&collection.prefix())
			.await?
			.iter()
			.map(|bytes| {
				serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
			})
			.collect()
	}

	/// Retrieves a value together with the exact bytes it was decoded from.
	///
	/// The bytes are the version token to hand back to `compare_and_swap`.
	pub async fn retrieve_versioned<T: DeserializeOwned>(
		&self,
		collection: StorageKey,
		id: impl Display,
	) -> Result<(T, Vec<u8>), StorageError> {
		let bytes = self.backend.get_bytes(&collection.key(id)).await?;
		let value = serde_json::from_slice(&bytes)
			.map_err(|e| StorageError::Serialization(e.to_string()))?;
		Ok((value, bytes))
	}

	/// Writes `data` only if the stored value is still `version`.
	///
	/// Returns `false` when another writer changed the value in between and
	/// `NotFound` when it has been removed.
	pub async fn compare_and_swap<T: Serialize>(
		&self,
		collection: StorageKey,
		id: impl Display,
		version: &[u8],
		data: &T,
	) -> Result<bool, StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.compare_and_swap(&collection.key(id), version, bytes)
			.await
	}

	/// Removes a value from storage.
	pub async fn remove(&self, collection: StorageKey, id: impl Display) -> Result<(), StorageError> {
		self.backend.delete(&collection.key(id)).await
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, collection: StorageKey, id: impl Display) -> Result<bool, StorageError> {
		self.backend.exists(&collection.key(id)).await
	}

	/// Creates a counter holding `initial` if none exists yet.
	///
	/// Returns `true` if this call created the counter.
	pub async fn create_counter(
		&self,
		collection: StorageKey,
		id: impl Display,
		initial: i64,
	) -> Result<bool, StorageError> {
		self.backend
			.set_if_absent(&collection.key(id), initial.to_string().into_bytes())
			.await
	}

	/// Reads the current value of a counter.
	pub async fn counter_value(
		&self,
		collection: StorageKey,
		id: impl Display,
	) -> Result<i64, StorageError> {
		let bytes = self.backend.get_bytes(&collection.key(id)).await?;
		parse_counter(&bytes)
	}

	/// Atomically increments a counter and returns its new value.
	pub async fn increment(
		&self,
		collection: StorageKey,
		id: impl Display,
		delta: i64,
	) -> Result<i64, StorageError> {
		self.backend.increment(&collection.key(id), delta).await
	}

	/// Removes expired entries from storage.
	///
	/// Returns the number of entries that were removed.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryStorage;
	use serde::Deserialize;

	#[derive(Debug, Serialize, Deserialize, PartialEq)]
	struct Record {
		id: i64,
		label: String,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_insert_rejects_existing_key() {
		let storage = service();
		let record = Record {
			id: 1,
			label: "first".into(),
		};

		storage.insert(StorageKey::Orders, 1, &record).await.unwrap();
		let err = storage
			.insert(StorageKey::Orders, 1, &record)
			.await
			.unwrap_err();
		assert!(matches!(err, StorageError::AlreadyExists(key) if key == "orders:1"));
	}

	#[tokio::test]
	async fn test_compare_and_swap_detects_concurrent_change() {
		let storage = service();
		let record = Record {
			id: 9,
			label: "first".into(),
		};
		storage.insert(StorageKey::Orders, 9, &record).await.unwrap();

		let (mut mine, version): (Record, _) = storage
			.retrieve_versioned(StorageKey::Orders, 9)
			.await
			.unwrap();
		let (mut theirs, their_version): (Record, _) = storage
			.retrieve_versioned(StorageKey::Orders, 9)
			.await
			.unwrap();

		theirs.label = "theirs".into();
		assert!(storage
			.compare_and_swap(StorageKey::Orders, 9, &their_version, &theirs)
			.await
			.unwrap());

		mine.label = "mine".into();
		assert!(!storage
			.compare_and_swap(StorageKey::Orders, 9, &version, &mine)
			.await
			.unwrap());

		let stored: Record = storage.retrieve(StorageKey::Orders, 9).await.unwrap();
		assert_eq!(stored.label, "theirs");
	}

	#[tokio::test]
	async fn test_compare_and_swap_requires_existing_key() {
		let storage = service();
		let record = Record {
			id: 9,
			label: "missing".into(),
		};

		let result = storage
			.compare_and_swap(StorageKey::Orders, 9, b"{}", &record)
			.await;
		assert!(matches!(result, Err(StorageError::NotFound)));
	}

	#[tokio::test]
	async fn test_retrieve_all_is_scoped_to_collection() {
		let storage = service();
		for id in 1..=3 {
			let record = Record {
				id,
				label: format!("order-{}", id),
			};
			storage.store(StorageKey::Orders, id, &record).await.unwrap();
		}
		storage
			.create_counter(StorageKey::Counters, "orders", 1)
			.await
			.unwrap();

		let mut records: Vec<Record> = storage.retrieve_all(StorageKey::Orders).await.unwrap();
		records.sort_by_key(|r| r.id);
		assert_eq!(records.len(), 3);
		assert_eq!(records[2].label, "order-3");
	}

	#[tokio::test]
	async fn test_counter_lifecycle() {
		let storage = service();

		assert!(storage
			.create_counter(StorageKey::Counters, "orders", 1)
			.await
			.unwrap());
		assert!(!storage
			.create_counter(StorageKey::Counters, "orders", 1)
			.await
			.unwrap());
		assert_eq!(
			storage.increment(StorageKey::Counters, "orders", 1).await.unwrap(),
			2
		);
		assert_eq!(
			storage.counter_value(StorageKey::Counters, "orders").await.unwrap(),
			2
		);
	}

	#[test]
	fn test_parse_counter_rejects_garbage() {
		assert_eq!(parse_counter(b"41").unwrap(), 41);
		assert!(matches!(
			parse_counter(b"{\"x\":1}"),
			Err(StorageError::Serialization(_))
		));
	}
}
