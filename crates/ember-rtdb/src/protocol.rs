//! Wire protocol for the Realtime Database WebSocket endpoint.
//!
//! Every frame is a JSON object of the form:
//! ```json
//! {
//!   "id": "msg-123",
//!   "type": "get|subscribe|transaction|...",
//!   ... request/response fields flattened alongside ...
//! }
//! ```
//! Requests carry a client-generated `id`; the backend answers with a
//! frame of the matching `id` (a `*Result` type, an `ack`, or an `error`).
//! `change` frames are server-initiated and carry a `subscriptionId`
//! instead of correlating to a request.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

use ember_types::utils::random_id;

use crate::event::EventType;
use crate::path::Path;
use crate::prelude::*;
use crate::query::Query;

/// A frame in the database protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
	/// Message ID used for request/response correlation - string or number.
	pub id: Value,

	/// Frame kind (get, subscribe, change, ack, error, ...)
	#[serde(rename = "type")]
	pub msg_type: String,

	/// All other fields flattened into this map.
	#[serde(flatten)]
	pub payload: serde_json::Map<String, Value>,
}

impl WireMessage {
	/// Create a request frame with a fresh message id.
	pub fn request(msg_type: impl Into<String>, payload: Value) -> Self {
		let mut map = serde_json::Map::new();
		if let Value::Object(obj) = payload {
			map = obj;
		}
		Self { id: Value::String(random_id()), msg_type: msg_type.into(), payload: map }
	}

	pub fn auth(token: &str) -> Self {
		Self::request("auth", json!({ "token": token }))
	}

	pub fn ping() -> Self {
		Self::request("ping", json!({}))
	}

	pub fn get(path: &Path, query: Option<&Query>) -> Self {
		let mut payload = json!({ "path": path.to_string() });
		if let Some(query) = query {
			payload["query"] = query.to_wire();
		}
		Self::request("get", payload)
	}

	pub fn subscribe(path: &Path, events: &[EventType], query: Option<&Query>) -> Self {
		let events: Vec<&str> = events.iter().map(|e| e.wire_name()).collect();
		let mut payload = json!({ "path": path.to_string(), "events": events });
		if let Some(query) = query {
			payload["query"] = query.to_wire();
		}
		Self::request("subscribe", payload)
	}

	pub fn unsubscribe(subscription_id: &str) -> Self {
		Self::request("unsubscribe", json!({ "subscriptionId": subscription_id }))
	}

	/// Atomic batch of write operations. Every operation applies or none
	/// does.
	pub fn transaction(operations: Vec<WriteOp>) -> EmResult<Self> {
		let ops = serde_json::to_value(operations)?;
		Ok(Self::request("transaction", json!({ "operations": ops })))
	}

	pub fn on_disconnect(op: &OnDisconnectOp) -> EmResult<Self> {
		let mut payload = serde_json::to_value(op)?;
		if payload.get("data").is_none() {
			// keep the frame shape stable for cancel/remove
			payload["data"] = Value::Null;
		}
		Ok(Self::request("onDisconnect", payload))
	}

	/// Whether this frame reports a failure for its correlated request.
	pub fn is_error(&self) -> bool {
		self.msg_type == "error"
	}

	/// Convert an `error` frame into an [`Error`].
	pub fn to_error(&self) -> Error {
		let message = self
			.payload
			.get("message")
			.and_then(|v| v.as_str())
			.unwrap_or("unspecified backend error")
			.to_string();
		match self.payload.get("code").and_then(Value::as_u64) {
			Some(401 | 403) => Error::PermissionDenied(message),
			Some(404) => Error::NotFound(message),
			Some(400) => Error::ValidationError(message),
			_ => Error::Protocol(message),
		}
	}

	/// The `data` field of a result frame.
	pub fn data(&self) -> Value {
		self.payload.get("data").cloned().unwrap_or(Value::Null)
	}

	/// Parse a `change` frame into a routed notification.
	pub fn to_change(&self) -> EmResult<ChangeNotification> {
		if self.msg_type != "change" {
			return Err(Error::Protocol(format!("expected change frame, got {}", self.msg_type)));
		}
		let subscription_id = self
			.payload
			.get("subscriptionId")
			.and_then(|v| v.as_str())
			.ok_or_else(|| Error::Protocol("change frame without subscriptionId".to_string()))?;
		let event = self
			.payload
			.get("event")
			.ok_or_else(|| Error::Protocol("change frame without event".to_string()))?;

		let remote: RemoteEvent = serde_json::from_value(event.clone())?;
		Ok(ChangeNotification { subscription_id: subscription_id.into(), event: remote })
	}

	/// Serialize to JSON and wrap in a WebSocket message.
	pub fn to_ws_message(&self) -> EmResult<Message> {
		let json = serde_json::to_string(self)?;
		Ok(Message::Text(json))
	}

	/// Parse from a WebSocket message. Control frames yield `None`.
	pub fn from_ws_message(msg: &Message) -> EmResult<Option<Self>> {
		match msg {
			Message::Text(text) => {
				let parsed = serde_json::from_str::<WireMessage>(text)?;
				Ok(Some(parsed))
			}
			_ => Ok(None),
		}
	}
}

/// One operation inside an atomic `transaction` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WriteOp {
	/// Replace the value at `path` entirely.
	Replace { path: String, data: Value },
	/// Delete the value at `path`.
	Delete { path: String },
}

/// Disconnect-triggered write registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum OnDisconnectOp {
	Set { path: String, data: Value },
	Update { path: String, data: Value },
	Remove { path: String },
	Cancel { path: String },
}

impl OnDisconnectOp {
	pub fn path(&self) -> &str {
		match self {
			OnDisconnectOp::Set { path, .. }
			| OnDisconnectOp::Update { path, .. }
			| OnDisconnectOp::Remove { path }
			| OnDisconnectOp::Cancel { path } => path,
		}
	}
}

/// A `change` frame routed to one subscription.
#[derive(Debug, Clone)]
pub struct ChangeNotification {
	pub subscription_id: Box<str>,
	pub event: RemoteEvent,
}

/// The event object inside a `change` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEvent {
	/// Wire name of the event type ("value", "child_added", ...).
	pub action: String,
	pub path: String,
	#[serde(default)]
	pub data: Value,
	#[serde(rename = "prevName", default, skip_serializing_if = "Option::is_none")]
	pub prev_name: Option<Box<str>>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_request_has_generated_id() {
		let msg = WireMessage::request("get", json!({ "path": "users" }));
		assert_eq!(msg.msg_type, "get");
		assert!(msg.id.as_str().map(|s| !s.is_empty()).unwrap_or(false));
		assert_eq!(msg.payload.get("path").and_then(|v| v.as_str()), Some("users"));
	}

	#[test]
	fn test_payload_fields_flatten() {
		let msg = WireMessage::request("subscribe", json!({ "path": "rooms", "events": ["value"] }));
		let json = serde_json::to_value(&msg).unwrap();
		// Fields sit beside id/type, not nested under "payload"
		assert_eq!(json.get("path").and_then(|v| v.as_str()), Some("rooms"));
		assert!(json.get("payload").is_none());
	}

	#[test]
	fn test_parse_numeric_id() {
		let raw = r#"{"id": 7, "type": "ack", "status": "ok"}"#;
		let msg: WireMessage = serde_json::from_str(raw).unwrap();
		assert_eq!(msg.id, json!(7));
		assert_eq!(msg.payload.get("status").and_then(|v| v.as_str()), Some("ok"));
	}

	#[test]
	fn test_error_frame_mapping() {
		let raw = r#"{"id": "m1", "type": "error", "code": 403, "message": "write denied"}"#;
		let msg: WireMessage = serde_json::from_str(raw).unwrap();
		assert!(msg.is_error());
		match msg.to_error() {
			Error::PermissionDenied(m) => assert_eq!(m, "write denied"),
			other => panic!("unexpected error variant: {:?}", other),
		}
	}

	#[test]
	fn test_change_frame_parsing() {
		let raw = r#"{
			"id": "srv-1",
			"type": "change",
			"subscriptionId": "sub-abc",
			"event": {"action": "child_added", "path": "rooms/lobby/members/alice",
				"data": {"role": "admin"}, "prevName": "aaron"}
		}"#;
		let msg: WireMessage = serde_json::from_str(raw).unwrap();
		let change = msg.to_change().unwrap();
		assert_eq!(change.subscription_id.as_ref(), "sub-abc");
		assert_eq!(change.event.action, "child_added");
		assert_eq!(change.event.prev_name.as_deref(), Some("aaron"));
	}

	#[test]
	fn test_change_frame_requires_subscription_id() {
		let raw = r#"{"id": "srv-1", "type": "change", "event": {"action": "value", "path": ""}}"#;
		let msg: WireMessage = serde_json::from_str(raw).unwrap();
		assert!(msg.to_change().is_err());
	}

	#[test]
	fn test_transaction_ops_serialize_tagged() {
		let msg = WireMessage::transaction(vec![
			WriteOp::Replace { path: "a/b".to_string(), data: json!(1) },
			WriteOp::Delete { path: "a/c".to_string() },
		])
		.unwrap();
		let ops = msg.payload.get("operations").and_then(|v| v.as_array()).unwrap();
		assert_eq!(ops[0].get("type").and_then(|v| v.as_str()), Some("replace"));
		assert_eq!(ops[1].get("type").and_then(|v| v.as_str()), Some("delete"));
		assert!(ops[1].get("data").is_none());
	}

	#[test]
	fn test_on_disconnect_op_serializes_op_tag() {
		let frame =
			WireMessage::on_disconnect(&OnDisconnectOp::Remove { path: "presence/alice".into() })
				.unwrap();
		assert_eq!(frame.msg_type, "onDisconnect");
		assert_eq!(frame.payload.get("op").and_then(|v| v.as_str()), Some("remove"));
		assert_eq!(frame.payload.get("data"), Some(&Value::Null));
	}

	#[test]
	fn test_ws_round_trip() {
		let msg = WireMessage::request("ping", json!({}));
		let ws = msg.to_ws_message().unwrap();
		let parsed = WireMessage::from_ws_message(&ws).unwrap().unwrap();
		assert_eq!(parsed.msg_type, "ping");
		assert_eq!(parsed.id, msg.id);
	}

	#[test]
	fn test_control_frames_skipped() {
		let parsed = WireMessage::from_ws_message(&Message::Ping(Vec::new())).unwrap();
		assert!(parsed.is_none());
	}
}

// vim: ts=4
