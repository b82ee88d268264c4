//! Order types for the order management service.
//!
//! This module defines the order aggregate together with the closed sets of
//! values that gate its lifecycle: sales channels, order statuses and the
//! event types that trigger status transitions.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// A purchase and its lifecycle.
///
/// Orders are created once, after which only `status` and `events` change,
/// and only through lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
	/// Identifier assigned by the allocator at creation time.
	#[serde(rename = "orderID", default)]
	pub id: i64,
	/// Reference issued by the originating channel.
	#[serde(rename = "externalReferenceID")]
	pub external_reference_id: String,
	/// Sales channel code (e.g. "Ecommerce").
	pub channel: String,
	/// RFC3339 purchase timestamp.
	#[serde(rename = "purchaseDate")]
	pub purchase_date: String,
	/// Declared total; must equal the sum of price × quantity.
	#[serde(rename = "totalValue")]
	pub total_value: f64,
	pub buyer: Buyer,
	#[serde(default)]
	pub products: Vec<Product>,
	/// Assigned by the service; unrecognized input decodes as `Created`.
	#[serde(default, deserialize_with = "lenient_status")]
	pub status: OrderStatus,
	#[serde(default)]
	pub events: Vec<Event>,
}

fn lenient_status<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OrderStatus, D::Error> {
	let value = serde_json::Value::deserialize(deserializer)?;
	Ok(value
		.as_str()
		.and_then(|s| s.parse().ok())
		.unwrap_or_default())
}

/// Buyer details attached to an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Buyer {
	pub first_name: String,
	pub last_name: String,
	pub document_number: String,
	pub phone: String,
}

/// A purchased line item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
	pub sku: String,
	pub name: String,
	#[serde(default)]
	pub description: String,
	pub price: f64,
	pub quantity: i64,
}

impl Product {
	/// Price times quantity for this line.
	pub fn subtotal(&self) -> f64 {
		self.price * self.quantity as f64
	}
}

/// An immutable fact appended to an order.
///
/// `event_type` is kept as the raw string received from the caller so that
/// unknown types surface as invalid transitions rather than decode failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
	pub id: String,
	#[serde(rename = "type")]
	pub event_type: String,
	pub date: String,
	#[serde(default)]
	pub user: String,
}

impl Event {
	/// Returns true when `other` is a byte-identical resubmission of this event.
	pub fn is_replay_of(&self, other: &Event) -> bool {
		self.id == other.id && self.event_type == other.event_type && self.date == other.date
	}
}

/// Status of an order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OrderStatus {
	/// Initial status assigned at creation.
	#[default]
	Created,
	PaymentReceived,
	/// Terminal.
	Canceled,
	Invoiced,
	/// Terminal.
	Returned,
}

impl OrderStatus {
	/// Returns the wire representation of the status.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Created => "Created",
			OrderStatus::PaymentReceived => "PaymentReceived",
			OrderStatus::Canceled => "Canceled",
			OrderStatus::Invoiced => "Invoiced",
			OrderStatus::Returned => "Returned",
		}
	}

	/// Returns true if no event can move the order out of this status.
	pub fn is_terminal(&self) -> bool {
		matches!(self, OrderStatus::Canceled | OrderStatus::Returned)
	}

	/// Returns an iterator over all statuses.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Created,
			Self::PaymentReceived,
			Self::Canceled,
			Self::Invoiced,
			Self::Returned,
		]
		.into_iter()
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|status| status.as_str() == s).ok_or(())
	}
}

/// Event types that trigger status transitions.
///
/// `Created` is deliberately absent: it is never the target of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
	PaymentReceived,
	Canceled,
	Invoiced,
	Returned,
}

impl EventType {
	pub fn as_str(&self) -> &'static str {
		match self {
			EventType::PaymentReceived => "PaymentReceived",
			EventType::Canceled => "Canceled",
			EventType::Invoiced => "Invoiced",
			EventType::Returned => "Returned",
		}
	}
}

impl FromStr for EventType {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"PaymentReceived" => Ok(Self::PaymentReceived),
			"Canceled" => Ok(Self::Canceled),
			"Invoiced" => Ok(Self::Invoiced),
			"Returned" => Ok(Self::Returned),
			_ => Err(()),
		}
	}
}

/// Sales channel an order originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
	Ecommerce,
	CallCenter,
	Store,
	Affiliate,
}

impl Channel {
	pub fn as_str(&self) -> &'static str {
		match self {
			Channel::Ecommerce => "Ecommerce",
			Channel::CallCenter => "CallCenter",
			Channel::Store => "Store",
			Channel::Affiliate => "Affiliate",
		}
	}

	/// The external reference every order from this channel must carry.
	pub fn external_reference(&self) -> &'static str {
		match self {
			Channel::Ecommerce => "abc-123",
			Channel::CallCenter => "def-456",
			Channel::Store => "ghi-789",
			Channel::Affiliate => "jkl-012",
		}
	}
}

impl FromStr for Channel {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"Ecommerce" => Ok(Self::Ecommerce),
			"CallCenter" => Ok(Self::CallCenter),
			"Store" => Ok(Self::Store),
			"Affiliate" => Ok(Self::Affiliate),
			_ => Err(()),
		}
	}
}

impl fmt::Display for Channel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
