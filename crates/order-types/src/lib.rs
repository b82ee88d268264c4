//! Common types module for the order management service.
//!
//! This module defines the core data types shared by every crate in the
//! workspace: the order aggregate and its lifecycle events, the request and
//! response projections exposed over HTTP, and the helpers used to validate
//! pluggable implementation configuration.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Order aggregate, lifecycle statuses, channels and events.
pub mod order;
/// Registry trait implemented by every pluggable backend.
pub mod registry;
/// Storage types for managing persistent data.
pub mod storage;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use api::*;
pub use order::*;
pub use registry::*;
pub use storage::*;
pub use validation::*;
