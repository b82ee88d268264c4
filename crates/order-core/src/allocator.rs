//! Order identifier allocation.
//!
//! Identifiers come from a persisted counter record per domain. The storage
//! backend performs counter creation as an insert-if-absent and advances it
//! with an atomic increment, so concurrent allocations never observe the
//! same value.

use async_trait::async_trait;
use order_storage::{StorageError, StorageService};
use order_types::StorageKey;
use std::sync::Arc;
use thiserror::Error;

/// Domain name of the order counter.
pub const ORDERS_DOMAIN: &str = "orders";

/// Errors that can occur while allocating an identifier.
#[derive(Debug, Error)]
pub enum AllocationError {
	/// The counter lookup failed for a reason other than absence.
	#[error("Error getting auto incremental ID: {0}")]
	Read(String),
	/// The initial counter record could not be persisted.
	#[error("Error creating auto incremental ID: {0}")]
	Create(String),
	/// The increment could not be persisted.
	#[error("Error updating auto incremental ID: {0}")]
	Update(String),
}

/// Source of new order identifiers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdAllocator: Send + Sync {
	/// Returns the next identifier.
	async fn allocate(&self) -> Result<i64, AllocationError>;
}

/// Allocator backed by a counter in the `counters` collection.
pub struct StorageIdAllocator {
	storage: Arc<StorageService>,
	domain: String,
}

impl StorageIdAllocator {
	pub fn new(storage: Arc<StorageService>, domain: impl Into<String>) -> Self {
		Self {
			storage,
			domain: domain.into(),
		}
	}
}

#[async_trait]
impl IdAllocator for StorageIdAllocator {
	async fn allocate(&self) -> Result<i64, AllocationError> {
		let exists = self
			.storage
			.exists(StorageKey::Counters, &self.domain)
			.await
			.map_err(|e| AllocationError::Read(e.to_string()))?;

		if !exists {
			let created = self
				.storage
				.create_counter(StorageKey::Counters, &self.domain, 1)
				.await
				.map_err(|e| AllocationError::Create(e.to_string()))?;
			if created {
				tracing::info!(domain = %self.domain, "Initialized sequence counter");
				return Ok(1);
			}
			// Another allocation created the counter first
		}

		match self
			.storage
			.increment(StorageKey::Counters, &self.domain, 1)
			.await
		{
			Ok(id) => Ok(id),
			Err(StorageError::NotFound) => Err(AllocationError::Update(format!(
				"counter '{}' disappeared",
				self.domain
			))),
			Err(e) => Err(AllocationError::Update(e.to_string())),
		}
	}
}
