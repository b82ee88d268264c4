//! HTTP server for the order API.
//!
//! Routes are nested under `/api/v1` and share a single handle to the order
//! operations.

use crate::apis::order;
use axum::{
	http::{HeaderName, HeaderValue, Method, StatusCode},
	routing::{get, post},
	Router,
};
use order_config::{ApiConfig, CorsConfig};
use order_core::{OrderEngine, OrderOperations};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
	cors::{AllowOrigin, Any, CorsLayer},
	limit::RequestBodyLimitLayer,
	timeout::TimeoutLayer,
	trace::TraceLayer,
};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Operations backing every endpoint.
	pub operations: Arc<dyn OrderOperations>,
}

/// Builds the order routes without transport middleware.
pub fn build_router(state: AppState) -> Router {
	Router::new()
		.nest(
			"/api/v1",
			Router::new()
				.route("/orders", post(order::create_order))
				.route("/orders/search", get(order::search_orders))
				.route("/orders/{orderId}", get(order::get_order_by_id))
				.route("/orders/{orderId}/events", post(order::update_event_order)),
		)
		.with_state(state)
}

/// Builds the CORS layer from configuration.
///
/// Without a `[api.cors]` section any origin is allowed.
fn cors_layer(cors: Option<&CorsConfig>) -> CorsLayer {
	let Some(cors) = cors else {
		return CorsLayer::permissive();
	};

	let origins = if cors.allowed_origins.iter().any(|o| o == "*") {
		AllowOrigin::any()
	} else {
		AllowOrigin::list(
			cors.allowed_origins
				.iter()
				.filter_map(|o| HeaderValue::from_str(o).ok()),
		)
	};

	let mut layer = CorsLayer::new().allow_origin(origins);

	layer = if cors.allowed_methods.is_empty() {
		layer.allow_methods(Any)
	} else {
		layer.allow_methods(
			cors.allowed_methods
				.iter()
				.filter_map(|m| m.parse::<Method>().ok())
				.collect::<Vec<_>>(),
		)
	};

	if cors.allowed_headers.is_empty() {
		layer.allow_headers(Any)
	} else {
		layer.allow_headers(
			cors.allowed_headers
				.iter()
				.filter_map(|h| h.parse::<HeaderName>().ok())
				.collect::<Vec<_>>(),
		)
	}
}

/// Builds the full application with tracing, CORS, body limit and timeout.
pub fn build_app(api_config: &ApiConfig, state: AppState) -> Router {
	// Layers are applied innermost-first so each one sees axum's `Body`;
	// the resulting order is trace -> cors -> body limit -> timeout.
	build_router(state)
		.layer(TimeoutLayer::with_status_code(
			StatusCode::REQUEST_TIMEOUT,
			Duration::from_secs(api_config.timeout_seconds),
		))
		.layer(RequestBodyLimitLayer::new(api_config.max_request_size))
		.layer(cors_layer(api_config.cors.as_ref()))
		.layer(TraceLayer::new_for_http())
}

/// Starts the HTTP server for the API.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<OrderEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let state = AppState {
		operations: engine.operations(),
	};
	let app = build_app(&api_config, state);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Order API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::{body::Body, http::Request};
	use order_config::builders::config::ConfigBuilder;
	use order_core::{OrderEngineBuilder, OrderFactories};
	use tower::ServiceExt;

	fn api_config(max_request_size: usize, cors: Option<CorsConfig>) -> ApiConfig {
		ApiConfig {
			enabled: true,
			host: "127.0.0.1".to_string(),
			port: 8080,
			timeout_seconds: 30,
			max_request_size,
			cors,
		}
	}

	fn memory_state() -> AppState {
		let factories = OrderFactories {
			storage_factories: order_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		};
		let engine = OrderEngineBuilder::new(ConfigBuilder::new().build())
			.build(factories)
			.unwrap();
		AppState {
			operations: engine.operations(),
		}
	}

	#[tokio::test]
	async fn test_oversized_body_is_rejected() {
		let app = build_app(&api_config(64, None), memory_state());
		let body = format!(r#"{{"channel":"{}"}}"#, "x".repeat(256));
		let length = body.len().to_string();

		let response = app
			.oneshot(
				Request::builder()
					.method("POST")
					.uri("/api/v1/orders")
					.header("content-type", "application/json")
					.header("content-length", length)
					.body(Body::from(body))
					.unwrap(),
			)
			.await
			.unwrap();

		assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
	}

	#[tokio::test]
	async fn test_unknown_route() {
		let app = build_app(&api_config(1024, None), memory_state());
		let response = app
			.oneshot(Request::builder().uri("/api/v2/orders").body(Body::empty()).unwrap())
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn test_cors_restricted_origin() {
		let cors = CorsConfig {
			allowed_origins: vec!["https://shop.example".to_string()],
			allowed_headers: vec![],
			allowed_methods: vec!["GET".to_string()],
		};
		let app = build_app(&api_config(1024, Some(cors)), memory_state());

		let response = app
			.oneshot(
				Request::builder()
					.uri("/api/v1/orders/search")
					.header("origin", "https://shop.example")
					.body(Body::empty())
					.unwrap(),
			)
			.await
			.unwrap();

		assert_eq!(response.status(), StatusCode::OK);
		assert_eq!(
			response.headers().get("access-control-allow-origin").unwrap(),
			"https://shop.example"
		);
	}

	#[tokio::test]
	async fn test_full_lifecycle_over_http() {
		use http_body_util::BodyExt;

		let app = build_app(&api_config(1024 * 1024, None), memory_state());
		let order = serde_json::json!({
			"externalReferenceID": "jkl-012",
			"channel": "Affiliate",
			"purchaseDate": "2024-05-01T14:00:00Z",
			"totalValue": 30.0,
			"buyer": { "firstName": "Luis", "lastName": "Paz", "documentNumber": "20999888", "phone": "" },
			"products": [{ "sku": "S-1", "name": "Mug", "price": 15.0, "quantity": 2 }]
		});

		let send = |method: &str, uri: &str, body: Option<serde_json::Value>| {
			let builder = Request::builder().method(method).uri(uri);
			match body {
				Some(body) => builder
					.header("content-type", "application/json")
					.body(Body::from(body.to_string()))
					.unwrap(),
				None => builder.body(Body::empty()).unwrap(),
			}
		};

		let response = app
			.clone()
			.oneshot(send("POST", "/api/v1/orders", Some(order)))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);

		let event = serde_json::json!({
			"id": "e1", "type": "PaymentReceived", "date": "2024-05-02T10:00:00Z", "user": "ops"
		});
		let response = app
			.clone()
			.oneshot(send("POST", "/api/v1/orders/1/events", Some(event)))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);

		let conflicting = serde_json::json!({
			"id": "e1", "type": "Canceled", "date": "2024-05-03T10:00:00Z"
		});
		let response = app
			.clone()
			.oneshot(send("POST", "/api/v1/orders/1/events", Some(conflicting)))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

		let response = app
			.oneshot(send("GET", "/api/v1/orders/1", None))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
		let bytes = response.into_body().collect().await.unwrap().to_bytes();
		let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
		assert_eq!(body["status"], "PaymentReceived");
		assert_eq!(body["statusTranslate"], "Pago Recibido");
		assert_eq!(body["channelTranslate"], "Afiliado");
		assert_eq!(body["events"].as_array().unwrap().len(), 1);
	}
}
