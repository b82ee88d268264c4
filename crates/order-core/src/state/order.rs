//! Event admission and the status transition table.

use crate::OrderError;
use once_cell::sync::Lazy;
use order_types::{Event, EventType, OrderStatus};
use std::collections::HashMap;

/// Outcome of checking a candidate event against an order's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
	/// No event with this id exists yet.
	New,
	/// An identical event (id, type and date) was already applied, at this
	/// position of the history.
	Replay { index: usize },
}

/// Static transition table: (current status, event type) -> next status.
static TRANSITIONS: Lazy<HashMap<(OrderStatus, EventType), OrderStatus>> = Lazy::new(|| {
	HashMap::from([
		(
			(OrderStatus::Created, EventType::PaymentReceived),
			OrderStatus::PaymentReceived,
		),
		(
			(OrderStatus::Created, EventType::Canceled),
			OrderStatus::Canceled,
		),
		(
			(OrderStatus::PaymentReceived, EventType::Invoiced),
			OrderStatus::Invoiced,
		),
		(
			(OrderStatus::Invoiced, EventType::Returned),
			OrderStatus::Returned,
		),
	])
});

/// Classifies `candidate` against the events already recorded on an order.
///
/// Fails with `DuplicateEventIdConflict` when the id is taken by an event
/// with a different type or date.
pub fn admit_event(existing: &[Event], candidate: &Event) -> Result<Admission, OrderError> {
	match existing
		.iter()
		.enumerate()
		.find(|(_, event)| event.id == candidate.id)
	{
		None => Ok(Admission::New),
		Some((index, event)) if event.is_replay_of(candidate) => Ok(Admission::Replay { index }),
		Some(_) => Err(OrderError::DuplicateEventIdConflict),
	}
}

/// Recomputes the (previous, new) statuses of the event at `index` by
/// replaying the history from `Created`.
pub fn replayed_transition(
	events: &[Event],
	index: usize,
) -> Result<(OrderStatus, OrderStatus), OrderError> {
	let previous = events
		.iter()
		.take(index)
		.try_fold(OrderStatus::Created, |status, event| {
			apply_transition(status, &event.event_type)
		})?;
	let event = events.get(index).ok_or_else(|| {
		OrderError::Storage(format!("event history has no entry at {}", index))
	})?;
	let next = apply_transition(previous, &event.event_type)?;
	Ok((previous, next))
}

/// Returns the status reached by applying `event_type` to `current`.
///
/// Unknown event types, events on terminal orders and out-of-order events
/// all fail with `InvalidTransition`.
pub fn apply_transition(current: OrderStatus, event_type: &str) -> Result<OrderStatus, OrderError> {
	let invalid = || OrderError::InvalidTransition {
		from: current,
		event_type: event_type.to_string(),
	};

	let event_type: EventType = event_type.parse().map_err(|_| invalid())?;
	TRANSITIONS
		.get(&(current, event_type))
		.copied()
		.ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn event(id: &str, event_type: &str, date: &str) -> Event {
		Event {
			id: id.into(),
			event_type: event_type.into(),
			date: date.into(),
			user: "operator".into(),
		}
	}

	#[test]
	fn test_validate_state_transition() {
		let allowed = [
			(OrderStatus::Created, "PaymentReceived", OrderStatus::PaymentReceived),
			(OrderStatus::Created, "Canceled", OrderStatus::Canceled),
			(OrderStatus::PaymentReceived, "Invoiced", OrderStatus::Invoiced),
			(OrderStatus::Invoiced, "Returned", OrderStatus::Returned),
		];
		for (from, event_type, to) in allowed {
			assert_eq!(apply_transition(from, event_type).unwrap(), to);
		}
	}

	#[test]
	fn test_every_other_pair_is_rejected() {
		let event_types = ["PaymentReceived", "Canceled", "Invoiced", "Returned", "Created"];
		for from in OrderStatus::all() {
			for event_type in event_types {
				let allowed = matches!(
					(from, event_type),
					(OrderStatus::Created, "PaymentReceived")
						| (OrderStatus::Created, "Canceled")
						| (OrderStatus::PaymentReceived, "Invoiced")
						| (OrderStatus::Invoiced, "Returned")
				);
				let result = apply_transition(from, event_type);
				assert_eq!(result.is_ok(), allowed, "{} + {}", from, event_type);
				if let Err(e) = result {
					assert!(matches!(e, OrderError::InvalidTransition { .. }));
				}
			}
		}
	}

	#[test]
	fn test_terminal_statuses_have_no_exits() {
		for status in OrderStatus::all().filter(|s| s.is_terminal()) {
			for event_type in ["PaymentReceived", "Canceled", "Invoiced", "Returned"] {
				assert!(apply_transition(status, event_type).is_err());
			}
		}
	}

	#[test]
	fn test_misspelled_event_type() {
		let err = apply_transition(OrderStatus::Created, "paymentreceived").unwrap_err();
		assert!(err.to_string().starts_with("Invalid state transition"));
	}

	#[test]
	fn test_check_unique_event_id() {
		let existing = vec![
			event("ev-1", "PaymentReceived", "2024-05-02T10:00:00Z"),
			event("ev-2", "Invoiced", "2024-05-03T10:00:00Z"),
		];

		let fresh = event("ev-3", "Returned", "2024-05-04T10:00:00Z");
		assert_eq!(admit_event(&existing, &fresh).unwrap(), Admission::New);

		let replay = event("ev-2", "Invoiced", "2024-05-03T10:00:00Z");
		assert_eq!(
			admit_event(&existing, &replay).unwrap(),
			Admission::Replay { index: 1 }
		);

		let other_type = event("ev-1", "Canceled", "2024-05-02T10:00:00Z");
		assert!(matches!(
			admit_event(&existing, &other_type),
			Err(OrderError::DuplicateEventIdConflict)
		));

		let other_date = event("ev-1", "PaymentReceived", "2024-05-09T10:00:00Z");
		assert!(matches!(
			admit_event(&existing, &other_date),
			Err(OrderError::DuplicateEventIdConflict)
		));
	}

	#[test]
	fn test_replay_ignores_user() {
		let existing = vec![event("ev-1", "PaymentReceived", "2024-05-02T10:00:00Z")];
		let mut candidate = existing[0].clone();
		candidate.user = "someone-else".into();
		assert_eq!(
			admit_event(&existing, &candidate).unwrap(),
			Admission::Replay { index: 0 }
		);
	}

	#[test]
	fn test_replayed_transition_reconstructs_each_step() {
		let history = vec![
			event("ev-1", "PaymentReceived", "2024-05-02T10:00:00Z"),
			event("ev-2", "Invoiced", "2024-05-03T10:00:00Z"),
			event("ev-3", "Returned", "2024-05-04T10:00:00Z"),
		];

		assert_eq!(
			replayed_transition(&history, 0).unwrap(),
			(OrderStatus::Created, OrderStatus::PaymentReceived)
		);
		assert_eq!(
			replayed_transition(&history, 1).unwrap(),
			(OrderStatus::PaymentReceived, OrderStatus::Invoiced)
		);
		assert_eq!(
			replayed_transition(&history, 2).unwrap(),
			(OrderStatus::Invoiced, OrderStatus::Returned)
		);
		assert!(replayed_transition(&history, 3).is_err());
	}
}
