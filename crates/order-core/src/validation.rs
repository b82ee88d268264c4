//! Consistency checks applied to incoming orders and events.

use crate::OrderError;
use chrono::DateTime;
use order_types::{Channel, Product};

/// Returns true when `total` equals the sum of price times quantity.
///
/// The comparison is exact. A total such as `0.1 + 0.2` declared as `0.3`
/// fails because the computed `f64` sum is `0.30000000000000004`.
pub fn validate_total(products: &[Product], total: f64) -> bool {
	let computed: f64 = products.iter().map(Product::subtotal).sum();
	#[allow(clippy::float_cmp)]
	let equal = computed == total;
	equal
}

/// Checks that `id` is the external reference assigned to `channel`.
pub fn validate_external_reference(id: &str, channel: &str) -> Result<bool, OrderError> {
	let channel: Channel = channel.parse().map_err(|_| OrderError::ChannelNotFound)?;
	if channel.external_reference() == id {
		Ok(true)
	} else {
		Err(OrderError::ExternalReferenceMismatch)
	}
}

/// Requires a complete RFC3339 timestamp: date, time and offset or `Z`.
pub fn check_date_format(date: &str) -> Result<(), OrderError> {
	DateTime::parse_from_rfc3339(date)
		.map(|_| ())
		.map_err(|_| OrderError::InvalidDateFormat)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn product(price: f64, quantity: i64) -> Product {
		Product {
			sku: "SKU-1".into(),
			name: "Notebook".into(),
			description: String::new(),
			price,
			quantity,
		}
	}

	#[test]
	fn test_validate_total() {
		let products = vec![product(1000.0, 2), product(25.5, 4)];
		assert!(validate_total(&products, 2102.0));
		assert!(!validate_total(&products, 2101.99));
		assert!(validate_total(&[], 0.0));
	}

	#[test]
	fn test_validate_total_is_exact() {
		let products = vec![product(0.1, 1), product(0.2, 1)];
		assert!(!validate_total(&products, 0.3));
		assert!(validate_total(&products, 0.1 + 0.2));
	}

	#[test]
	fn test_validate_external_reference() {
		for (channel, reference) in [
			("Ecommerce", "abc-123"),
			("CallCenter", "def-456"),
			("Store", "ghi-789"),
			("Affiliate", "jkl-012"),
		] {
			assert!(validate_external_reference(reference, channel).unwrap());
			assert!(matches!(
				validate_external_reference("zzz-000", channel),
				Err(OrderError::ExternalReferenceMismatch)
			));
		}

		assert!(matches!(
			validate_external_reference("abc-123", "Marketplace"),
			Err(OrderError::ChannelNotFound)
		));
		assert!(matches!(
			validate_external_reference("abc-123", "ecommerce"),
			Err(OrderError::ChannelNotFound)
		));
	}

	#[test]
	fn test_check_date_format() {
		assert!(check_date_format("2024-05-01T14:00:00Z").is_ok());
		assert!(check_date_format("2024-05-01T14:00:00.123-03:00").is_ok());

		for bad in ["", "2024-05-01", "2024-05-01T14:00:00", "01/05/2024 14:00"] {
			let err = check_date_format(bad).unwrap_err();
			assert_eq!(err.to_string(), "The date is not in the correct format");
		}
	}
}
