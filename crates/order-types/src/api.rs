//! API types for the order management HTTP API.
//!
//! This module defines the read-only response projections returned by the
//! four order endpoints, the query descriptor used by the search endpoint,
//! and the structured error type that maps failures to HTTP statuses.

use crate::{Buyer, Event, Product};
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Response returned after an order is created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseCreate {
	#[serde(rename = "orderID")]
	pub order_id: i64,
	pub status: String,
	/// Purchase date of the created order.
	#[serde(rename = "updatedOn")]
	pub updated_on: String,
}

/// Response returned after an event is applied to an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseUpdate {
	#[serde(rename = "orderID")]
	pub order_id: i64,
	#[serde(rename = "previousStatus")]
	pub previous_status: String,
	#[serde(rename = "newStatus")]
	pub new_status: String,
	#[serde(rename = "updatedOn")]
	pub updated_on: String,
}

/// Full order projection with localized display strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseGet {
	#[serde(rename = "orderID")]
	pub order_id: i64,
	#[serde(rename = "externalReferenceID")]
	pub external_reference_id: String,
	pub channel: String,
	#[serde(rename = "channelTranslate")]
	pub channel_translate: String,
	#[serde(rename = "purchaseDate")]
	pub purchase_date: String,
	#[serde(rename = "totalValue")]
	pub total_value: f64,
	pub buyer: Buyer,
	#[serde(rename = "product")]
	pub products: Vec<Product>,
	pub status: String,
	#[serde(rename = "statusTranslate")]
	pub status_translate: String,
	pub events: Vec<Event>,
}

/// Optional constraints for the order search endpoint.
///
/// Every field is optional; the zero value of a field means "no constraint".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct Filters {
	pub order_id: i64,
	pub document_number: String,
	pub status: String,
	pub created_on_from: String,
	pub created_on_to: String,
}

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Additional error context
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Structured API error type with HTTP status mapping.
///
/// Malformed input maps to 400; every domain and storage failure is reported
/// as 500 with its message propagated.
#[derive(Debug)]
pub enum APIError {
	/// Bad request with validation errors (400)
	BadRequest {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	pub fn bad_request(error_type: impl Into<String>, message: impl Into<String>) -> Self {
		APIError::BadRequest {
			error_type: error_type.into(),
			message: message.into(),
			details: None,
		}
	}

	pub fn internal(error_type: impl Into<String>, message: impl Into<String>) -> Self {
		APIError::InternalServerError {
			error_type: error_type.into(),
			message: message.into(),
		}
	}

	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> StatusCode {
		match self {
			APIError::BadRequest { .. } => StatusCode::BAD_REQUEST,
			APIError::InternalServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		match self {
			APIError::BadRequest {
				error_type,
				message,
				details,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: details.clone(),
			},
			APIError::InternalServerError {
				error_type,
				message,
			} => ErrorResponse {
				error: error_type.clone(),
				message: message.clone(),
				details: None,
			},
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

impl IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		let status = self.status_code();
		(status, Json(self.to_error_response())).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_filters_deserialize_partial_query() {
		let filters: Filters =
			serde_json::from_str(r#"{"status": "Created", "createdOnFrom": "x"}"#).unwrap();
		assert_eq!(filters.order_id, 0);
		assert_eq!(filters.status, "Created");
		assert_eq!(filters.created_on_from, "x");
		assert!(filters.created_on_to.is_empty());
	}

	#[test]
	fn test_error_status_mapping() {
		let err = APIError::bad_request("INVALID_JSON", "Error unmarshaling JSON");
		assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
		assert_eq!(err.to_error_response().error, "INVALID_JSON");

		let err = APIError::internal("INVALID_TRANSITION", "Invalid state transition");
		assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(
			err.to_string(),
			"Internal Server Error: Invalid state transition"
		);
	}

	#[test]
	fn test_response_get_uses_product_key() {
		let response = ResponseGet {
			order_id: 1,
			external_reference_id: "abc-123".into(),
			channel: "Ecommerce".into(),
			channel_translate: "Comercio Electrónico".into(),
			purchase_date: "2024-05-01T14:00:00Z".into(),
			total_value: 0.0,
			buyer: Buyer::default(),
			products: vec![],
			status: "Created".into(),
			status_translate: "Creado".into(),
			events: vec![],
		};
		let json = serde_json::to_value(&response).unwrap();
		assert!(json.get("product").is_some());
		assert!(json.get("products").is_none());
	}
}
