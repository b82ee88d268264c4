//! Order repository: the four order operations over the storage service.

use crate::allocator::IdAllocator;
use crate::cache::ResponseCache;
use crate::filter::{retain_last_event, OrderQuery};
use crate::state::{admit_event, apply_transition, replayed_transition, Admission};
use crate::translation::translate;
use crate::validation::{validate_external_reference, validate_total};
use crate::{OrderError, OrderOperations};
use async_trait::async_trait;
use order_storage::{StorageError, StorageService};
use order_types::{
	Event, Filters, Order, OrderStatus, ResponseCreate, ResponseGet, ResponseUpdate, StorageKey,
};
use std::sync::Arc;
use tracing::instrument;

/// Attempts at applying an event before a persistently contended order is
/// reported as a storage error.
const MAX_UPDATE_ATTEMPTS: usize = 16;

/// Builds the translated projection returned by `get_order_by_id`.
pub fn to_response_get(order: &Order) -> ResponseGet {
	let (channel_translate, status_translate) = translate(&order.channel, order.status.as_str());
	ResponseGet {
		order_id: order.id,
		external_reference_id: order.external_reference_id.clone(),
		channel: order.channel.clone(),
		channel_translate,
		purchase_date: order.purchase_date.clone(),
		total_value: order.total_value,
		buyer: order.buyer.clone(),
		products: order.products.clone(),
		status: order.status.to_string(),
		status_translate,
		events: order.events.clone(),
	}
}

pub struct OrderRepository {
	storage: Arc<StorageService>,
	allocator: Arc<dyn IdAllocator>,
	cache: Option<Arc<ResponseCache>>,
}

impl OrderRepository {
	pub fn new(storage: Arc<StorageService>, allocator: Arc<dyn IdAllocator>) -> Self {
		Self {
			storage,
			allocator,
			cache: None,
		}
	}

	/// Attaches a response cache.
	pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
		self.cache = Some(cache);
		self
	}

	async fn load_order(&self, order_id: i64) -> Result<Order, OrderError> {
		self.storage
			.retrieve(StorageKey::Orders, order_id)
			.await
			.map_err(|e| order_storage_error(order_id, e))
	}

	/// Loads an order along with the stored bytes that act as its version.
	async fn load_versioned(&self, order_id: i64) -> Result<(Order, Vec<u8>), OrderError> {
		self.storage
			.retrieve_versioned(StorageKey::Orders, order_id)
			.await
			.map_err(|e| order_storage_error(order_id, e))
	}
}

fn order_storage_error(order_id: i64, e: StorageError) -> OrderError {
	match e {
		StorageError::NotFound => OrderError::NotFound(order_id),
		other => OrderError::Storage(other.to_string()),
	}
}

#[async_trait]
impl OrderOperations for OrderRepository {
	#[instrument(skip_all, fields(channel = %order.channel))]
	async fn create_order(&self, mut order: Order) -> Result<ResponseCreate, OrderError> {
		if !validate_total(&order.products, order.total_value) {
			return Err(OrderError::TotalMismatch);
		}
		validate_external_reference(&order.external_reference_id, &order.channel)?;

		let id = self.allocator.allocate().await?;
		order.id = id;
		order.status = OrderStatus::Created;
		order.events = Vec::new();

		self.storage
			.insert(StorageKey::Orders, id, &order)
			.await
			.map_err(|e| OrderError::Storage(e.to_string()))?;
		tracing::info!(order_id = id, "Order created");

		if let Some(cache) = &self.cache {
			cache.put_order(&to_response_get(&order)).await;
		}

		Ok(ResponseCreate {
			order_id: id,
			status: order.status.to_string(),
			updated_on: order.purchase_date,
		})
	}

	#[instrument(skip_all, fields(order_id = %order_id, event_id = %event.id))]
	async fn update_event_order(
		&self,
		order_id: i64,
		event: Event,
	) -> Result<ResponseUpdate, OrderError> {
		for attempt in 1..=MAX_UPDATE_ATTEMPTS {
			let (mut order, version) = self.load_versioned(order_id).await?;

			if let Admission::Replay { index } = admit_event(&order.events, &event)? {
				let (previous, next) = replayed_transition(&order.events, index)?;
				tracing::debug!(order_id, "Event already applied");
				return Ok(ResponseUpdate {
					order_id: order.id,
					previous_status: previous.to_string(),
					new_status: next.to_string(),
					updated_on: event.date,
				});
			}

			let previous = order.status;
			let next = apply_transition(previous, &event.event_type)?;
			order.status = next;
			order.events.push(event.clone());

			let swapped = self
				.storage
				.compare_and_swap(StorageKey::Orders, order_id, &version, &order)
				.await
				.map_err(|e| order_storage_error(order_id, e))?;
			if !swapped {
				tracing::debug!(order_id, attempt, "Order changed concurrently, retrying");
				continue;
			}

			let response = ResponseUpdate {
				order_id: order.id,
				previous_status: previous.to_string(),
				new_status: next.to_string(),
				updated_on: event.date,
			};
			tracing::info!(
				order_id,
				previous_status = %response.previous_status,
				new_status = %response.new_status,
				"Order status updated"
			);

			if let Some(cache) = &self.cache {
				cache.put_event(&response).await;
				cache.put_order(&to_response_get(&order)).await;
			}

			return Ok(response);
		}

		tracing::warn!(order_id, "Giving up on contended order update");
		Err(OrderError::Storage(format!(
			"order {} was modified concurrently {} times",
			order_id, MAX_UPDATE_ATTEMPTS
		)))
	}

	#[instrument(skip(self))]
	async fn get_order_by_id(&self, order_id: i64) -> Result<ResponseGet, OrderError> {
		if let Some(cached) = match &self.cache {
			Some(cache) => cache.get_order(order_id).await,
			None => None,
		} {
			return Ok(cached);
		}

		let order = self.load_order(order_id).await?;
		let response = to_response_get(&order);

		if let Some(cache) = &self.cache {
			cache.put_order(&response).await;
		}
		Ok(response)
	}

	#[instrument(skip_all)]
	async fn get_order_by_filters(&self, filters: Filters) -> Result<Vec<Order>, OrderError> {
		let query = OrderQuery::from_filters(&filters);

		let orders: Vec<Order> = self
			.storage
			.retrieve_all(StorageKey::Orders)
			.await
			.map_err(|e| OrderError::Storage(e.to_string()))?;

		let mut matched: Vec<Order> = orders
			.into_iter()
			.filter(|order| query.matches(order))
			.map(retain_last_event)
			.collect();
		matched.sort_by_key(|order| order.id);

		tracing::debug!(
			predicates = query.predicates().len(),
			matched = matched.len(),
			"Order search"
		);
		Ok(matched)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::allocator::{AllocationError, MockIdAllocator, StorageIdAllocator, ORDERS_DOMAIN};
	use order_storage::implementations::memory::MemoryStorage;
	use order_types::{Buyer, Product};
	use std::time::Duration;

	fn storage() -> Arc<StorageService> {
		Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
	}

	fn repository() -> OrderRepository {
		let storage = storage();
		let allocator = Arc::new(StorageIdAllocator::new(storage.clone(), ORDERS_DOMAIN));
		OrderRepository::new(storage, allocator)
	}

	fn new_order() -> Order {
		Order {
			id: 0,
			external_reference_id: "abc-123".into(),
			channel: "Ecommerce".into(),
			purchase_date: "2024-05-01T14:00:00Z".into(),
			total_value: 2000.0,
			buyer: Buyer {
				first_name: "Ana".into(),
				last_name: "Pérez".into(),
				document_number: "30111222".into(),
				phone: "+54 11 5555 0000".into(),
			},
			products: vec![Product {
				sku: "SKU-1".into(),
				name: "Monitor".into(),
				description: "27 inch".into(),
				price: 1000.0,
				quantity: 2,
			}],
			status: OrderStatus::Created,
			events: vec![],
		}
	}

	fn event(id: &str, event_type: &str, date: &str) -> Event {
		Event {
			id: id.into(),
			event_type: event_type.into(),
			date: date.into(),
			user: "backoffice".into(),
		}
	}

	#[tokio::test]
	async fn test_create_order_success() {
		let mut allocator = MockIdAllocator::new();
		allocator.expect_allocate().times(1).returning(|| Ok(1));
		let repo = OrderRepository::new(storage(), Arc::new(allocator));

		let response = repo.create_order(new_order()).await.unwrap();
		assert_eq!(
			response,
			ResponseCreate {
				order_id: 1,
				status: "Created".into(),
				updated_on: "2024-05-01T14:00:00Z".into(),
			}
		);
	}

	#[tokio::test]
	async fn test_create_order_resets_lifecycle_fields() {
		let repo = repository();
		let mut order = new_order();
		order.status = OrderStatus::Invoiced;
		order.events = vec![event("ev-0", "PaymentReceived", "2024-05-01T15:00:00Z")];

		let created = repo.create_order(order).await.unwrap();
		let stored = repo.get_order_by_id(created.order_id).await.unwrap();
		assert_eq!(stored.status, "Created");
		assert!(stored.events.is_empty());
	}

	#[tokio::test]
	async fn test_validation_failures_do_not_allocate() {
		let mut allocator = MockIdAllocator::new();
		allocator.expect_allocate().never();
		let repo = OrderRepository::new(storage(), Arc::new(allocator));

		let mut wrong_total = new_order();
		wrong_total.total_value = 1999.99;
		let err = repo.create_order(wrong_total).await.unwrap_err();
		assert_eq!(err.to_string(), "Total value does not match sum of products");

		let mut wrong_reference = new_order();
		wrong_reference.external_reference_id = "def-456".into();
		assert!(matches!(
			repo.create_order(wrong_reference).await,
			Err(OrderError::ExternalReferenceMismatch)
		));

		let mut unknown_channel = new_order();
		unknown_channel.channel = "Marketplace".into();
		assert!(matches!(
			repo.create_order(unknown_channel).await,
			Err(OrderError::ChannelNotFound)
		));
	}

	#[tokio::test]
	async fn test_allocation_failure_is_propagated() {
		let mut allocator = MockIdAllocator::new();
		allocator
			.expect_allocate()
			.returning(|| Err(AllocationError::Create("store down".into())));
		let repo = OrderRepository::new(storage(), Arc::new(allocator));

		let err = repo.create_order(new_order()).await.unwrap_err();
		assert!(matches!(err, OrderError::Allocation(AllocationError::Create(_))));
	}

	#[tokio::test]
	async fn test_sequential_ids() {
		let repo = repository();
		for expected in 1..=3 {
			let response = repo.create_order(new_order()).await.unwrap();
			assert_eq!(response.order_id, expected);
		}
	}

	#[tokio::test]
	async fn test_update_unknown_order() {
		let repo = repository();
		let err = repo
			.update_event_order(42, event("ev-1", "PaymentReceived", "2024-05-02T10:00:00Z"))
			.await
			.unwrap_err();
		assert!(matches!(err, OrderError::NotFound(42)));
	}

	#[tokio::test]
	async fn test_replay_is_idempotent() {
		let repo = repository();
		let id = repo.create_order(new_order()).await.unwrap().order_id;
		let paid = event("ev-1", "PaymentReceived", "2024-05-02T10:00:00Z");

		let first = repo.update_event_order(id, paid.clone()).await.unwrap();
		assert_eq!(first.previous_status, "Created");
		assert_eq!(first.new_status, "PaymentReceived");

		let second = repo.update_event_order(id, paid).await.unwrap();
		assert_eq!(first, second);

		let stored = repo.get_order_by_id(id).await.unwrap();
		assert_eq!(stored.events.len(), 1);
	}

	#[tokio::test]
	async fn test_replay_of_earlier_event_after_later_ones() {
		let repo = repository();
		let id = repo.create_order(new_order()).await.unwrap().order_id;
		let paid = event("ev-1", "PaymentReceived", "2024-05-02T10:00:00Z");

		let first = repo.update_event_order(id, paid.clone()).await.unwrap();
		repo.update_event_order(id, event("ev-2", "Invoiced", "2024-05-03T10:00:00Z"))
			.await
			.unwrap();

		let replayed = repo.update_event_order(id, paid).await.unwrap();
		assert_eq!(replayed, first);
		assert_eq!(replayed.previous_status, "Created");
		assert_eq!(replayed.new_status, "PaymentReceived");

		let stored = repo.get_order_by_id(id).await.unwrap();
		assert_eq!(stored.status, "Invoiced");
		assert_eq!(stored.events.len(), 2);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_events_are_never_lost() {
		let repo = Arc::new(repository());

		for _ in 0..20 {
			let id = repo.create_order(new_order()).await.unwrap().order_id;

			let cancel = {
				let repo = repo.clone();
				tokio::spawn(async move {
					repo.update_event_order(id, event("ev-a", "Canceled", "2024-05-02T10:00:00Z"))
						.await
				})
			};
			let pay = {
				let repo = repo.clone();
				tokio::spawn(async move {
					repo.update_event_order(
						id,
						event("ev-b", "PaymentReceived", "2024-05-02T10:00:00Z"),
					)
					.await
				})
			};
			let results = [cancel.await.unwrap(), pay.await.unwrap()];

			let applied: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
			assert_eq!(applied.len(), 1);
			assert_eq!(applied[0].previous_status, "Created");
			assert!(results.iter().any(|r| matches!(
				r,
				Err(OrderError::InvalidTransition {
					from: OrderStatus::Canceled | OrderStatus::PaymentReceived,
					..
				})
			)));

			let stored = repo.get_order_by_id(id).await.unwrap();
			assert_eq!(stored.events.len(), 1);
			assert_eq!(stored.status, applied[0].new_status);
		}
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_resubmissions_record_one_event() {
		let repo = Arc::new(repository());
		let id = repo.create_order(new_order()).await.unwrap().order_id;
		let paid = event("ev-1", "PaymentReceived", "2024-05-02T10:00:00Z");

		let mut handles = Vec::new();
		for _ in 0..8 {
			let repo = repo.clone();
			let paid = paid.clone();
			handles.push(tokio::spawn(async move {
				repo.update_event_order(id, paid).await.unwrap()
			}));
		}

		for handle in handles {
			let response = handle.await.unwrap();
			assert_eq!(response.previous_status, "Created");
			assert_eq!(response.new_status, "PaymentReceived");
		}
		let stored = repo.get_order_by_id(id).await.unwrap();
		assert_eq!(stored.events.len(), 1);
	}

	#[tokio::test]
	async fn test_invalid_transition_leaves_order_unchanged() {
		let repo = repository();
		let id = repo.create_order(new_order()).await.unwrap().order_id;

		let err = repo
			.update_event_order(id, event("ev-1", "Invoiced", "2024-05-02T10:00:00Z"))
			.await
			.unwrap_err();
		assert!(matches!(err, OrderError::InvalidTransition { .. }));

		let stored = repo.get_order_by_id(id).await.unwrap();
		assert_eq!(stored.status, "Created");
		assert!(stored.events.is_empty());
	}

	#[tokio::test]
	async fn test_end_to_end_lifecycle() {
		let repo = repository();

		let created = repo.create_order(new_order()).await.unwrap();
		assert_eq!(created.order_id, 1);
		assert_eq!(created.status, "Created");

		let paid = repo
			.update_event_order(1, event("ev-1", "PaymentReceived", "2024-05-02T10:00:00Z"))
			.await
			.unwrap();
		assert_eq!(paid.previous_status, "Created");
		assert_eq!(paid.new_status, "PaymentReceived");

		let err = repo
			.update_event_order(1, event("ev-1", "Invoiced", "2024-05-02T10:00:00Z"))
			.await
			.unwrap_err();
		assert!(matches!(err, OrderError::DuplicateEventIdConflict));
		assert_eq!(err.to_string(), "Another event with same ID already exists");

		let stored = repo.get_order_by_id(1).await.unwrap();
		assert_eq!(stored.status, "PaymentReceived");
		assert_eq!(stored.status_translate, "Pago Recibido");
		assert_eq!(stored.channel_translate, "Comercio Electrónico");
		assert_eq!(stored.events.len(), 1);
	}

	#[tokio::test]
	async fn test_search_by_filters() {
		let repo = repository();
		for _ in 0..3 {
			repo.create_order(new_order()).await.unwrap();
		}
		repo.update_event_order(2, event("ev-1", "PaymentReceived", "2024-05-02T10:00:00Z"))
			.await
			.unwrap();
		repo.update_event_order(2, event("ev-2", "Invoiced", "2024-05-03T10:00:00Z"))
			.await
			.unwrap();

		let all = repo.get_order_by_filters(Filters::default()).await.unwrap();
		assert_eq!(all.iter().map(|o| o.id).collect::<Vec<_>>(), vec![1, 2, 3]);

		let invoiced = repo
			.get_order_by_filters(Filters {
				status: "Invoiced".into(),
				..Filters::default()
			})
			.await
			.unwrap();
		assert_eq!(invoiced.len(), 1);
		assert_eq!(invoiced[0].id, 2);
		assert_eq!(invoiced[0].events.len(), 1);
		assert_eq!(invoiced[0].events[0].id, "ev-2");

		let none = repo
			.get_order_by_filters(Filters {
				document_number: "99999999".into(),
				..Filters::default()
			})
			.await
			.unwrap();
		assert!(none.is_empty());

		// Trimming is a projection only
		let full = repo.get_order_by_id(2).await.unwrap();
		assert_eq!(full.events.len(), 2);
	}

	#[tokio::test]
	async fn test_cache_is_written_through() {
		let storage = storage();
		let allocator = Arc::new(StorageIdAllocator::new(storage.clone(), ORDERS_DOMAIN));
		let cache = Arc::new(ResponseCache::new(
			StorageService::new(Box::new(MemoryStorage::new())),
			Duration::from_secs(60),
		));
		let repo = OrderRepository::new(storage.clone(), allocator).with_cache(cache.clone());

		let id = repo.create_order(new_order()).await.unwrap().order_id;
		assert_eq!(cache.get_order(id).await.unwrap().status, "Created");

		repo.update_event_order(id, event("ev-1", "Canceled", "2024-05-02T10:00:00Z"))
			.await
			.unwrap();
		assert_eq!(cache.get_order(id).await.unwrap().status, "Canceled");
		assert_eq!(cache.get_event(id).await.unwrap().new_status, "Canceled");

		// Reads are served from the cache once populated
		storage.remove(StorageKey::Orders, id).await.unwrap();
		assert_eq!(repo.get_order_by_id(id).await.unwrap().status, "Canceled");
	}
}
