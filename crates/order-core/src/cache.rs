//! Response cache kept beside the order store.
//!
//! Entries hold the JSON of the last `ResponseGet` and `ResponseUpdate` per
//! order and expire after a fixed TTL. The cache is never authoritative:
//! every failure is logged and treated as a miss.

use order_storage::{StorageError, StorageService};
use order_types::{ResponseGet, ResponseUpdate, StorageKey};
use std::time::Duration;

pub struct ResponseCache {
	storage: StorageService,
	ttl: Duration,
}

impl ResponseCache {
	pub fn new(storage: StorageService, ttl: Duration) -> Self {
		Self { storage, ttl }
	}

	/// Returns the cached projection of an order, if any.
	pub async fn get_order(&self, order_id: i64) -> Option<ResponseGet> {
		match self.storage.retrieve(StorageKey::OrderCache, order_id).await {
			Ok(response) => {
				tracing::debug!(order_id, "Cache hit");
				Some(response)
			},
			Err(StorageError::NotFound) => None,
			Err(e) => {
				tracing::warn!(order_id, error = %e, "Cache read failed");
				None
			},
		}
	}

	pub async fn put_order(&self, response: &ResponseGet) {
		let order_id = response.order_id;
		if let Err(e) = self
			.storage
			.store_with_ttl(StorageKey::OrderCache, order_id, response, Some(self.ttl))
			.await
		{
			tracing::warn!(order_id, error = %e, "Cache write failed");
		}
	}

	pub async fn put_event(&self, response: &ResponseUpdate) {
		let order_id = response.order_id;
		if let Err(e) = self
			.storage
			.store_with_ttl(StorageKey::EventCache, order_id, response, Some(self.ttl))
			.await
		{
			tracing::warn!(order_id, error = %e, "Cache write failed");
		}
	}

	/// Returns the last cached event response of an order, if any.
	pub async fn get_event(&self, order_id: i64) -> Option<ResponseUpdate> {
		self.storage
			.retrieve(StorageKey::EventCache, order_id)
			.await
			.ok()
	}

	/// Drops expired entries. Returns the number removed.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.storage.cleanup_expired().await
	}
}
