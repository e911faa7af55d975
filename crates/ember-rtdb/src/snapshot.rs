//! Data snapshots.
//!
//! A snapshot pairs a path with the JSON value the backend reported for it
//! at one moment. Snapshots are plain data: navigating into children
//! clones the relevant subtree and never touches the network.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::path::Path;
use crate::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct DataSnapshot {
	path: Path,
	value: Value,
}

impl DataSnapshot {
	pub fn new(path: Path, value: Value) -> Self {
		DataSnapshot { path, value }
	}

	/// The key of the location this snapshot was taken at, `None` at the
	/// database root.
	pub fn key(&self) -> Option<&str> {
		self.path.key()
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// The raw JSON value. `Value::Null` means no data exists here.
	pub fn value(&self) -> &Value {
		&self.value
	}

	pub fn into_value(self) -> Value {
		self.value
	}

	/// Deserialize the value into a concrete type.
	pub fn to<T: DeserializeOwned>(&self) -> EmResult<T> {
		Ok(serde_json::from_value(self.value.clone())?)
	}

	pub fn exists(&self) -> bool {
		!self.value.is_null()
	}

	/// Snapshot of a descendant location.
	pub fn child(&self, relative: &str) -> EmResult<DataSnapshot> {
		let child_path = self.path.child(relative)?;
		let suffix = Path::parse(relative)?;
		let mut value = &self.value;
		for segment in suffix.segments() {
			value = value.get(segment).unwrap_or(&Value::Null);
		}
		Ok(DataSnapshot { path: child_path, value: value.clone() })
	}

	pub fn has_child(&self, relative: &str) -> bool {
		self.child(relative).map(|s| s.exists()).unwrap_or(false)
	}

	pub fn has_children(&self) -> bool {
		self.num_children() > 0
	}

	pub fn num_children(&self) -> usize {
		match &self.value {
			Value::Object(map) => map.len(),
			Value::Array(arr) => arr.iter().filter(|v| !v.is_null()).count(),
			_ => 0,
		}
	}

	/// Child snapshots in ascending key order. Arrays enumerate their
	/// indices as keys, the backend's representation for list-like data.
	pub fn children(&self) -> Vec<DataSnapshot> {
		let mut entries: Vec<(String, Value)> = match &self.value {
			Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
			Value::Array(arr) => arr
				.iter()
				.enumerate()
				.filter(|(_, v)| !v.is_null())
				.map(|(i, v)| (i.to_string(), v.clone()))
				.collect(),
			_ => Vec::new(),
		};
		entries.sort_by(|(a, _), (b, _)| a.cmp(b));

		entries
			.into_iter()
			.filter_map(|(key, value)| {
				let path = self.path.child(&key).ok()?;
				Some(DataSnapshot { path, value })
			})
			.collect()
	}
}


// vim: ts=4
