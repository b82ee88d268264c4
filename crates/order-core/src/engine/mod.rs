//! Running order service instance.
//!
//! The engine owns the order store, the optional response cache and the
//! operations exposed to the HTTP layer, and drives periodic housekeeping.

use crate::cache::ResponseCache;
use crate::OrderOperations;
use order_config::Config;
use order_storage::StorageService;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct OrderEngine {
	config: Config,
	storage: Arc<StorageService>,
	cache: Option<Arc<ResponseCache>>,
	operations: Arc<dyn OrderOperations>,
}

impl OrderEngine {
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		cache: Option<Arc<ResponseCache>>,
		operations: Arc<dyn OrderOperations>,
	) -> Self {
		Self {
			config,
			storage,
			cache,
			operations,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Handle to the order operations, shared with request handlers.
	pub fn operations(&self) -> Arc<dyn OrderOperations> {
		self.operations.clone()
	}

	/// Removes expired entries from the store and the cache once.
	///
	/// Returns the total number of entries removed. Failures are logged.
	pub async fn cleanup_once(&self) -> usize {
		let mut removed = 0;

		match self.storage.cleanup_expired().await {
			Ok(count) => removed += count,
			Err(e) => tracing::warn!(component = "storage", "Cleanup failed: {}", e),
		}
		if let Some(cache) = &self.cache {
			match cache.cleanup_expired().await {
				Ok(count) => removed += count,
				Err(e) => tracing::warn!(component = "cache", "Cleanup failed: {}", e),
			}
		}

		if removed > 0 {
			tracing::debug!("Cleanup removed {} expired entries", removed);
		}
		removed
	}

	/// Starts the periodic cleanup task.
	pub fn spawn_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
		let engine = self.clone();
		let period = Duration::from_secs(self.config.storage.cleanup_interval_seconds);

		tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			loop {
				interval.tick().await;
				engine.cleanup_once().await;
			}
		})
	}
}
