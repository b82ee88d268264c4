//! Configuration builder for creating test and development configurations.

use crate::{ApiConfig, CacheConfig, Config, ServiceConfig, StorageConfig};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
///
/// Defaults to an in-memory store with no cache and no API section.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	storage_primary: String,
	storage_implementations: HashMap<String, toml::Value>,
	storage_cleanup_interval_seconds: u64,
	cache: Option<CacheConfig>,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with default values suitable for testing.
	pub fn new() -> Self {
		let mut storage_implementations = HashMap::new();
		storage_implementations.insert(
			"memory".to_string(),
			toml::Value::Table(toml::map::Map::new()),
		);

		Self {
			service_id: "orders-test".to_string(),
			storage_primary: "memory".to_string(),
			storage_implementations,
			storage_cleanup_interval_seconds: 60,
			cache: None,
			api: None,
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	/// Adds a storage implementation and makes it primary.
	pub fn storage(mut self, name: impl Into<String>, config: toml::Value) -> Self {
		let name = name.into();
		self.storage_implementations.insert(name.clone(), config);
		self.storage_primary = name;
		self
	}

	pub fn storage_cleanup_interval_seconds(mut self, interval: u64) -> Self {
		self.storage_cleanup_interval_seconds = interval;
		self
	}

	/// Enables an in-memory response cache with the given expiry.
	pub fn memory_cache(mut self, ttl_seconds: u64) -> Self {
		let mut implementations = HashMap::new();
		implementations.insert(
			"memory".to_string(),
			toml::Value::Table(toml::map::Map::new()),
		);
		self.cache = Some(CacheConfig {
			primary: "memory".to_string(),
			implementations,
			ttl_seconds,
		});
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations: self.storage_implementations,
				cleanup_interval_seconds: self.storage_cleanup_interval_seconds,
			},
			cache: self.cache,
			api: self.api,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builder_output_passes_validation() {
		let config = ConfigBuilder::new().memory_cache(300).build();
		assert!(config.validate().is_ok());
		assert_eq!(config.cache.unwrap().ttl_seconds, 300);
	}

	#[test]
	fn test_storage_override_becomes_primary() {
		let mut table = toml::map::Map::new();
		table.insert(
			"storage_path".to_string(),
			toml::Value::String("/tmp/orders".into()),
		);
		let config = ConfigBuilder::new()
			.storage("file", toml::Value::Table(table))
			.build();

		assert_eq!(config.storage.primary, "file");
		assert_eq!(config.storage.implementations.len(), 2);
	}
}
