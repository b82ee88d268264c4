//! Search predicates built from optional filter fields.

use chrono::{DateTime, FixedOffset};
use order_types::{Filters, Order};
use std::cmp::Ordering;

/// A single constraint on an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
	OrderId(i64),
	DocumentNumber(String),
	Status(String),
	/// Purchase date within `[from, to]`, both ends inclusive.
	CreatedOn { from: String, to: String },
}

impl Predicate {
	pub fn matches(&self, order: &Order) -> bool {
		match self {
			Predicate::OrderId(id) => order.id == *id,
			Predicate::DocumentNumber(number) => order.buyer.document_number == *number,
			Predicate::Status(status) => order.status.as_str() == status,
			Predicate::CreatedOn { from, to } => {
				compare_dates(&order.purchase_date, from) != Ordering::Less
					&& compare_dates(&order.purchase_date, to) != Ordering::Greater
			},
		}
	}
}

/// Compares two timestamps as instants, or as text if either does not parse.
fn compare_dates(left: &str, right: &str) -> Ordering {
	let parse = |s: &str| DateTime::<FixedOffset>::parse_from_rfc3339(s).ok();
	match (parse(left), parse(right)) {
		(Some(l), Some(r)) => l.cmp(&r),
		_ => left.cmp(right),
	}
}

/// Conjunction of predicates. An empty query matches every order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
	predicates: Vec<Predicate>,
}

impl OrderQuery {
	/// Builds a query from the fields of `filters` that are set.
	///
	/// An id of zero counts as unset. The date range is only applied when
	/// both bounds are present.
	pub fn from_filters(filters: &Filters) -> Self {
		let mut predicates = Vec::new();

		if filters.order_id > 0 {
			predicates.push(Predicate::OrderId(filters.order_id));
		}
		if !filters.document_number.is_empty() {
			predicates.push(Predicate::DocumentNumber(filters.document_number.clone()));
		}
		if !filters.status.is_empty() {
			predicates.push(Predicate::Status(filters.status.clone()));
		}
		if !filters.created_on_from.is_empty() && !filters.created_on_to.is_empty() {
			predicates.push(Predicate::CreatedOn {
				from: filters.created_on_from.clone(),
				to: filters.created_on_to.clone(),
			});
		}

		Self { predicates }
	}

	pub fn predicates(&self) -> &[Predicate] {
		&self.predicates
	}

	pub fn is_match_all(&self) -> bool {
		self.predicates.is_empty()
	}

	pub fn matches(&self, order: &Order) -> bool {
		self.predicates.iter().all(|p| p.matches(order))
	}
}

/// Keeps only the most recent event of an order.
pub fn retain_last_event(mut order: Order) -> Order {
	if order.events.len() > 1 {
		order.events = order.events.split_off(order.events.len() - 1);
	}
	order
}
