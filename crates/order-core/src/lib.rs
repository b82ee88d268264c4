//! Core order management logic.
//!
//! This crate holds the rules that decide whether an order may be created,
//! whether an incoming event is new, a resubmission or a conflict, and which
//! status it leads to. The [`OrderOperations`] trait exposes the four order
//! operations; [`OrderRepository`] implements them on top of the storage
//! service, and [`OrderEngineBuilder`] wires everything from configuration.

use async_trait::async_trait;
use order_types::{Event, Filters, Order, OrderStatus, ResponseCreate, ResponseGet, ResponseUpdate};
use thiserror::Error;

pub mod allocator;
pub mod builder;
pub mod cache;
pub mod engine;
pub mod filter;
pub mod repository;
pub mod state;
pub mod translation;
pub mod validation;

pub use allocator::{AllocationError, IdAllocator, StorageIdAllocator};
pub use builder::{BuilderError, OrderEngineBuilder, OrderFactories};
pub use engine::OrderEngine;
pub use repository::OrderRepository;

/// Errors returned by the order operations.
#[derive(Debug, Error)]
pub enum OrderError {
	#[error("Total value does not match sum of products")]
	TotalMismatch,
	#[error("Channel not found")]
	ChannelNotFound,
	#[error("External ReferenceId does not match with channel")]
	ExternalReferenceMismatch,
	#[error("The date is not in the correct format")]
	InvalidDateFormat,
	#[error("Invalid state transition: {event_type} is not allowed from {from}")]
	InvalidTransition {
		from: OrderStatus,
		event_type: String,
	},
	#[error("Another event with same ID already exists")]
	DuplicateEventIdConflict,
	#[error(transparent)]
	Allocation(#[from] AllocationError),
	#[error("Order {0} not found")]
	NotFound(i64),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl OrderError {
	/// Short machine-readable code used in API error bodies.
	pub fn code(&self) -> &'static str {
		match self {
			OrderError::TotalMismatch => "TOTAL_MISMATCH",
			OrderError::ChannelNotFound => "CHANNEL_NOT_FOUND",
			OrderError::ExternalReferenceMismatch => "EXTERNAL_REFERENCE_MISMATCH",
			OrderError::InvalidDateFormat => "INVALID_DATE_FORMAT",
			OrderError::InvalidTransition { .. } => "INVALID_TRANSITION",
			OrderError::DuplicateEventIdConflict => "DUPLICATE_EVENT_ID",
			OrderError::Allocation(_) => "ID_ALLOCATION_FAILED",
			OrderError::NotFound(_) => "ORDER_NOT_FOUND",
			OrderError::Storage(_) => "STORAGE_ERROR",
		}
	}
}

/// The four operations of the order service.
#[async_trait]
pub trait OrderOperations: Send + Sync {
	/// Validates and persists a new order under a freshly allocated id.
	async fn create_order(&self, order: Order) -> Result<ResponseCreate, OrderError>;

	/// Applies a lifecycle event to an existing order.
	async fn update_event_order(
		&self,
		order_id: i64,
		event: Event,
	) -> Result<ResponseUpdate, OrderError>;

	/// Returns an order with translated channel and status labels.
	async fn get_order_by_id(&self, order_id: i64) -> Result<ResponseGet, OrderError>;

	/// Returns the orders matching every set filter, each with only its
	/// latest event.
	async fn get_order_by_filters(&self, filters: Filters) -> Result<Vec<Order>, OrderError>;
}
