//! Builder pattern for constructing the order engine.
//!
//! Storage and cache backends are created through factory functions looked
//! up by the implementation names used in the configuration. The same
//! factories serve both sections, so any storage backend can act as a cache.

use crate::allocator::{IdAllocator, StorageIdAllocator, ORDERS_DOMAIN};
use crate::cache::ResponseCache;
use crate::engine::OrderEngine;
use crate::repository::OrderRepository;
use order_config::Config;
use order_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions available to the builder, keyed by implementation name.
pub struct OrderFactories<SF> {
	pub storage_factories: HashMap<String, SF>,
}

/// Builder for constructing an OrderEngine with pluggable backends.
pub struct OrderEngineBuilder {
	config: Config,
	allocator: Option<Arc<dyn IdAllocator>>,
}

impl OrderEngineBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			allocator: None,
		}
	}

	/// Replaces the counter-backed identifier allocator.
	pub fn with_allocator(mut self, allocator: Arc<dyn IdAllocator>) -> Self {
		self.allocator = Some(allocator);
		self
	}

	pub fn build<SF>(self, factories: OrderFactories<SF>) -> Result<OrderEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let backend = create_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
		)?;
		let storage = Arc::new(StorageService::new(backend));

		let cache = match &self.config.cache {
			Some(cache_config) => {
				let backend = create_primary(
					"cache",
					&cache_config.primary,
					&cache_config.implementations,
					&factories.storage_factories,
				)?;
				Some(Arc::new(ResponseCache::new(
					StorageService::new(backend),
					Duration::from_secs(cache_config.ttl_seconds),
				)))
			},
			None => {
				tracing::info!(component = "cache", "Disabled");
				None
			},
		};

		let allocator = self
			.allocator
			.unwrap_or_else(|| Arc::new(StorageIdAllocator::new(storage.clone(), ORDERS_DOMAIN)));

		let mut repository = OrderRepository::new(storage.clone(), allocator);
		if let Some(cache) = &cache {
			repository = repository.with_cache(cache.clone());
		}

		Ok(OrderEngine::new(
			self.config,
			storage,
			cache,
			Arc::new(repository),
		))
	}
}

/// Creates the primary implementation of a section.
///
/// Only the primary is instantiated; other configured implementations are
/// ignored so an unused backend cannot block startup.
fn create_primary<SF>(
	component: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, SF>,
) -> Result<Box<dyn StorageInterface>, BuilderError>
where
	SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
{
	let config = implementations.get(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' not found in implementations",
			component, primary
		))
	})?;
	let factory = factories.get(primary).ok_or_else(|| {
		BuilderError::MissingComponent(format!(
			"No {} factory registered for '{}'",
			component, primary
		))
	})?;

	match factory(config) {
		Ok(implementation) => {
			tracing::info!(component = %component, implementation = %primary, "Loaded");
			Ok(implementation)
		},
		Err(e) => {
			tracing::error!(
				component = %component,
				implementation = %primary,
				error = %e,
				"Failed to create implementation"
			);
			Err(BuilderError::Config(format!(
				"Failed to create {} implementation '{}': {}",
				component, primary, e
			)))
		},
	}
}
