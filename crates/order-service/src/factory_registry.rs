//! Factory registry for pluggable implementations.
//!
//! Collects every storage backend compiled into the binary and resolves the
//! ones named in the configuration into builder factories.

use order_config::Config;
use order_core::{OrderEngine, OrderEngineBuilder, OrderFactories};
use order_storage::StorageFactory;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Registry of all available implementation factories.
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
}

impl FactoryRegistry {
	/// Create a new empty registry
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
		}
	}

	/// Register a storage implementation
	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}
}

impl Default for FactoryRegistry {
	fn default() -> Self {
		Self::new()
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Returns the global registry, populating it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in order_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		registry
	})
}

/// Picks the factories for the implementations a section configures.
fn resolve_factories<'a>(
	registry: &HashMap<String, StorageFactory>,
	configured: impl Iterator<Item = &'a String>,
	type_name: &str,
) -> Result<HashMap<String, StorageFactory>, String> {
	let mut factories = HashMap::new();
	for name in configured {
		match registry.get(name) {
			Some(factory) => {
				factories.insert(name.clone(), *factory);
			},
			None => {
				let mut available: Vec<_> = registry.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					type_name,
					name,
					available.join(", ")
				));
			},
		}
	}
	Ok(factories)
}

/// Builds the order engine using the registry and configuration.
pub fn build_engine_from_config(config: Config) -> Result<OrderEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let mut storage_factories = resolve_factories(
		&registry.storage,
		config.storage.implementations.keys(),
		"storage",
	)?;
	if let Some(cache) = &config.cache {
		storage_factories.extend(resolve_factories(
			&registry.storage,
			cache.implementations.keys(),
			"cache",
		)?);
	}

	let factories = OrderFactories { storage_factories };
	Ok(OrderEngineBuilder::new(config).build(factories)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use order_config::builders::config::ConfigBuilder;

	#[test]
	fn test_registry_contains_builtin_backends() {
		let registry = get_registry();
		assert!(registry.storage.contains_key("memory"));
		assert!(registry.storage.contains_key("file"));
	}

	#[test]
	fn test_build_engine_with_memory_cache() {
		let config = ConfigBuilder::new()
			.service_id("orders-registry")
			.memory_cache(30)
			.build();
		let engine = tokio_test::assert_ok!(build_engine_from_config(config));
		assert_eq!(engine.config().service.id, "orders-registry");
	}

	#[test]
	fn test_unknown_implementation_lists_available() {
		let config = ConfigBuilder::new()
			.storage("mongodb", toml::Value::Table(toml::map::Map::new()))
			.build();
		let err = build_engine_from_config(config).err().unwrap().to_string();
		assert!(err.starts_with("Unknown storage implementation 'mongodb'"));
		assert!(err.contains("file"));
		assert!(err.contains("memory"));
	}
}
