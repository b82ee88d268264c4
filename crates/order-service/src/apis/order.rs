//! Order API handlers.
//!
//! Each handler decodes its input, checks date fields, delegates to the
//! order operations and maps the outcome onto HTTP. Malformed input is a
//! 400; every failure reported by the operations is a 500 carrying the
//! error message.

use crate::server::AppState;
use axum::{
	extract::{rejection::JsonRejection, Path, Query, State},
	response::Json,
};
use order_core::{validation::check_date_format, OrderError};
use order_types::{
	APIError, Event, Filters, Order, ResponseCreate, ResponseGet, ResponseUpdate,
};
use std::collections::HashMap;
use tracing::{info, warn};

const INVALID_JSON: &str = "INVALID_JSON";
const INVALID_DATE_FORMAT: &str = "INVALID_DATE_FORMAT";

fn invalid_json(rejection: JsonRejection) -> APIError {
	warn!("Rejected request body: {}", rejection.body_text());
	APIError::bad_request(INVALID_JSON, "Error unmarshaling JSON")
}

fn internal(e: OrderError) -> APIError {
	APIError::internal(e.code(), e.to_string())
}

/// Handles POST /api/v1/orders.
pub async fn create_order(
	State(state): State<AppState>,
	payload: Result<Json<Order>, JsonRejection>,
) -> Result<Json<ResponseCreate>, APIError> {
	info!("Received request to create order");
	let Json(order) = payload.map_err(invalid_json)?;

	check_date_format(&order.purchase_date)
		.map_err(|e| APIError::bad_request(INVALID_DATE_FORMAT, e.to_string()))?;

	match state.operations.create_order(order).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			warn!("Order creation failed: {}", e);
			Err(internal(e))
		},
	}
}

/// Handles POST /api/v1/orders/{orderId}/events.
pub async fn update_event_order(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
	payload: Result<Json<Event>, JsonRejection>,
) -> Result<Json<ResponseUpdate>, APIError> {
	let order_id: i64 = order_id.parse().map_err(|_| {
		APIError::bad_request(
			"INVALID_ORDER_ID",
			format!("Order ID must be an integer: {}", order_id),
		)
	})?;
	let Json(event) = payload.map_err(invalid_json)?;

	check_date_format(&event.date)
		.map_err(|e| APIError::bad_request(INVALID_DATE_FORMAT, e.to_string()))?;

	match state.operations.update_event_order(order_id, event).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			warn!(order_id, "Event update failed: {}", e);
			Err(internal(e))
		},
	}
}

/// Handles GET /api/v1/orders/{orderId}.
///
/// A non-numeric id is looked up as 0, which never matches a stored order.
pub async fn get_order_by_id(
	State(state): State<AppState>,
	Path(order_id): Path<String>,
) -> Result<Json<ResponseGet>, APIError> {
	let order_id: i64 = order_id.parse().unwrap_or(0);

	match state.operations.get_order_by_id(order_id).await {
		Ok(response) => Ok(Json(response)),
		Err(e) => {
			warn!(order_id, "Order retrieval failed: {}", e);
			Err(internal(e))
		},
	}
}

/// Handles GET /api/v1/orders/search.
pub async fn search_orders(
	State(state): State<AppState>,
	Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Order>>, APIError> {
	let filters = filters_from_query(&params);

	if !filters.created_on_from.is_empty() && check_date_format(&filters.created_on_from).is_err()
	{
		return Err(APIError::internal(
			INVALID_DATE_FORMAT,
			"The From date is not in the correct format",
		));
	}
	if !filters.created_on_to.is_empty() && check_date_format(&filters.created_on_to).is_err() {
		return Err(APIError::internal(
			INVALID_DATE_FORMAT,
			"The To date is not in the correct format",
		));
	}

	match state.operations.get_order_by_filters(filters).await {
		Ok(orders) => Ok(Json(orders)),
		Err(e) => {
			warn!("Order search failed: {}", e);
			Err(internal(e))
		},
	}
}

/// Builds search filters from raw query parameters.
///
/// Missing parameters leave their filter unset; an `orderId` that is not an
/// integer counts as unset.
fn filters_from_query(params: &HashMap<String, String>) -> Filters {
	let value = |key: &str| params.get(key).cloned().unwrap_or_default();

	Filters {
		order_id: params
			.get("orderId")
			.and_then(|id| id.parse().ok())
			.unwrap_or(0),
		document_number: value("documentNumber"),
		status: value("status"),
		created_on_from: value("createdOnFrom"),
		created_on_to: value("createdOnTo"),
	}
}
