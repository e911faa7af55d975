//! Listener event types.

use serde::{Deserialize, Serialize};

use crate::prelude::*;
use crate::snapshot::DataSnapshot;

/// The kinds of events a listener can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
	/// The entire value at the path, delivered on registration and after
	/// every change.
	Value,
	ChildAdded,
	ChildChanged,
	ChildRemoved,
	ChildMoved,
}

impl EventType {
	/// The name used on the wire and in subscription payloads.
	pub fn wire_name(self) -> &'static str {
		match self {
			EventType::Value => "value",
			EventType::ChildAdded => "child_added",
			EventType::ChildChanged => "child_changed",
			EventType::ChildRemoved => "child_removed",
			EventType::ChildMoved => "child_moved",
		}
	}

	pub fn from_wire_name(name: &str) -> EmResult<Self> {
		match name {
			"value" => Ok(EventType::Value),
			"child_added" => Ok(EventType::ChildAdded),
			"child_changed" => Ok(EventType::ChildChanged),
			"child_removed" => Ok(EventType::ChildRemoved),
			"child_moved" => Ok(EventType::ChildMoved),
			_ => Err(Error::Protocol(format!("unknown event type '{}'", name))),
		}
	}
}

impl std::fmt::Display for EventType {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		f.write_str(self.wire_name())
	}
}

/// A single change delivered to a listener.
#[derive(Debug, Clone)]
pub struct Event {
	pub event_type: EventType,
	/// The data at (or below) the listened path after the change.
	pub snapshot: DataSnapshot,
	/// For child events, the key of the sibling that precedes this child
	/// in the current ordering.
	pub prev_name: Option<Box<str>>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_wire_names_round_trip() {
		for et in [
			EventType::Value,
			EventType::ChildAdded,
			EventType::ChildChanged,
			EventType::ChildRemoved,
			EventType::ChildMoved,
		] {
			assert_eq!(EventType::from_wire_name(et.wire_name()).unwrap(), et);
		}
	}

	#[test]
	fn test_unknown_wire_name_fails() {
		assert!(EventType::from_wire_name("child_updated").is_err());
	}

	#[test]
	fn test_serde_names_match_wire_names() {
		let json = serde_json::to_string(&EventType::ChildAdded).unwrap();
		assert_eq!(json, "\"child_added\"");
	}
}

// vim: ts=4
