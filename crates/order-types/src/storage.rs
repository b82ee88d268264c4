//! Storage-related types for the order management service.

use std::str::FromStr;

/// Storage keys for different data collections.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants. Each variant owns the
/// layout of the keys it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order documents keyed by integer id.
	Orders,
	/// Sequence counters keyed by domain name.
	Counters,
	/// Cached `ResponseGet` projections keyed by order id.
	OrderCache,
	/// Cached last `ResponseUpdate` keyed by order id.
	EventCache,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::Counters => "counters",
			StorageKey::OrderCache => "order",
			StorageKey::EventCache => "event",
		}
	}

	/// Prefix shared by every key in this collection.
	pub fn prefix(&self) -> String {
		match self {
			StorageKey::Orders | StorageKey::Counters => format!("{}:", self.as_str()),
			StorageKey::OrderCache | StorageKey::EventCache => format!("{}: ", self.as_str()),
		}
	}

	/// Builds the full backend key for an item of this collection.
	pub fn key(&self, id: impl std::fmt::Display) -> String {
		format!("{}{}", self.prefix(), id)
	}

	/// Finds the collection a backend key belongs to.
	pub fn from_key(key: &str) -> Option<Self> {
		let namespace = key.split(':').next().unwrap_or("");
		namespace.parse().ok()
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::Counters,
			Self::OrderCache,
			Self::EventCache,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|key| key.as_str() == s).ok_or(())
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_key_layout() {
		assert_eq!(StorageKey::Orders.key(7), "orders:7");
		assert_eq!(StorageKey::Counters.key("orders"), "counters:orders");
		assert_eq!(StorageKey::OrderCache.key(7), "order: 7");
		assert_eq!(StorageKey::EventCache.key(7), "event: 7");
	}

	#[test]
	fn test_from_key() {
		assert_eq!(StorageKey::from_key("orders:12"), Some(StorageKey::Orders));
		assert_eq!(StorageKey::from_key("event: 3"), Some(StorageKey::EventCache));
		assert_eq!(StorageKey::from_key("quotes:1"), None);
	}
}
