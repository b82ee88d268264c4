//! Spanish display labels for channels and statuses.
//!
//! Unknown codes are returned unchanged.

use order_types::{Channel, OrderStatus};

pub fn translate_channel(channel: &str) -> String {
	match channel.parse::<Channel>() {
		Ok(Channel::Ecommerce) => "Comercio Electrónico".to_string(),
		Ok(Channel::CallCenter) => "Centro de Llamadas".to_string(),
		Ok(Channel::Store) => "Tienda".to_string(),
		Ok(Channel::Affiliate) => "Afiliado".to_string(),
		Err(_) => channel.to_string(),
	}
}

pub fn translate_status(status: &str) -> String {
	match status.parse::<OrderStatus>() {
		Ok(OrderStatus::Created) => "Creado".to_string(),
		Ok(OrderStatus::PaymentReceived) => "Pago Recibido".to_string(),
		Ok(OrderStatus::Canceled) => "Cancelado".to_string(),
		Ok(OrderStatus::Invoiced) => "Facturado".to_string(),
		Ok(OrderStatus::Returned) => "Devuelto".to_string(),
		Err(_) => status.to_string(),
	}
}

/// Returns `(channel label, status label)`.
pub fn translate(channel: &str, status: &str) -> (String, String) {
	(translate_channel(channel), translate_status(status))
}
