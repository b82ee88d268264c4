//! Order lifecycle state machine.
//!
//! Decides whether an incoming event is new, a harmless resubmission or a
//! conflicting reuse of an event id, and which status a new event leads to.

pub mod order;

pub use order::{admit_event, apply_transition, replayed_transition, Admission};
