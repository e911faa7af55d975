//! Server value placeholders.
//!
//! These produce `{".sv": ...}` markers that the backend replaces at write
//! time, so the authoritative clock and counters live server-side. The
//! placeholders pass through the client untouched.

use serde_json::{Value, json};

/// Placeholder replaced with the server's clock (epoch milliseconds) when
/// the write is applied.
pub fn timestamp() -> Value {
	json!({ ".sv": "timestamp" })
}

/// Placeholder that atomically adds `delta` to the current numeric value
/// at the written location. A missing or non-numeric current value is
/// treated as zero.
pub fn increment(delta: f64) -> Value {
	json!({ ".sv": { "increment": delta } })
}

/// Whether a value is a server value placeholder.
pub fn is_server_value(value: &Value) -> bool {
	value.as_object().map(|obj| obj.contains_key(".sv")).unwrap_or(false)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_timestamp_shape() {
		assert_eq!(timestamp(), json!({".sv": "timestamp"}));
	}

	#[test]
	fn test_increment_shape() {
		assert_eq!(increment(3.0), json!({".sv": {"increment": 3.0}}));
		assert_eq!(increment(-1.5), json!({".sv": {"increment": -1.5}}));
	}

	#[test]
	fn test_recognizer() {
		assert!(is_server_value(&timestamp()));
		assert!(is_server_value(&increment(1.0)));
		assert!(!is_server_value(&json!({"sv": "timestamp"})));
		assert!(!is_server_value(&json!(42)));
	}
}

// vim: ts=4
