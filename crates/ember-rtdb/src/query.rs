//! Query constraints for reads and subscriptions.
//!
//! A query narrows what a read or listener sees: an ordering, range
//! bounds against that ordering, and a result limit. Conflicting
//! combinations are rejected when the constraint is added, so a `Query`
//! that exists is always sendable.

use serde_json::{Value, json};

use crate::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OrderBy {
	Child(Box<str>),
	Key,
	Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Limit {
	First(u32),
	Last(u32),
}

/// An immutable set of query constraints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
	order_by: Option<OrderBy>,
	start_at: Option<Value>,
	end_at: Option<Value>,
	equal_to: Option<Value>,
	limit: Option<Limit>,
}

impl Query {
	pub fn new() -> Self {
		Query::default()
	}

	pub fn order_by_child(mut self, key: &str) -> EmResult<Self> {
		self.set_order(OrderBy::Child(key.into()))?;
		Ok(self)
	}

	pub fn order_by_key(mut self) -> EmResult<Self> {
		self.set_order(OrderBy::Key)?;
		Ok(self)
	}

	pub fn order_by_value(mut self) -> EmResult<Self> {
		self.set_order(OrderBy::Value)?;
		Ok(self)
	}

	pub fn start_at(mut self, value: impl Into<Value>) -> EmResult<Self> {
		if self.equal_to.is_some() {
			return Err(Error::ValidationError(
				"start_at cannot be combined with equal_to".to_string(),
			));
		}
		if self.start_at.is_some() {
			return Err(Error::ValidationError("start_at already set".to_string()));
		}
		self.start_at = Some(value.into());
		Ok(self)
	}

	pub fn end_at(mut self, value: impl Into<Value>) -> EmResult<Self> {
		if self.equal_to.is_some() {
			return Err(Error::ValidationError(
				"end_at cannot be combined with equal_to".to_string(),
			));
		}
		if self.end_at.is_some() {
			return Err(Error::ValidationError("end_at already set".to_string()));
		}
		self.end_at = Some(value.into());
		Ok(self)
	}

	pub fn equal_to(mut self, value: impl Into<Value>) -> EmResult<Self> {
		if self.start_at.is_some() || self.end_at.is_some() {
			return Err(Error::ValidationError(
				"equal_to cannot be combined with start_at/end_at".to_string(),
			));
		}
		if self.equal_to.is_some() {
			return Err(Error::ValidationError("equal_to already set".to_string()));
		}
		self.equal_to = Some(value.into());
		Ok(self)
	}

	pub fn limit_to_first(mut self, count: u32) -> EmResult<Self> {
		self.set_limit(Limit::First(count))?;
		Ok(self)
	}

	pub fn limit_to_last(mut self, count: u32) -> EmResult<Self> {
		self.set_limit(Limit::Last(count))?;
		Ok(self)
	}

	/// Whether any constraint is set at all.
	pub fn is_empty(&self) -> bool {
		*self == Query::default()
	}

	/// The JSON object sent inside request payloads.
	pub(crate) fn to_wire(&self) -> Value {
		let mut obj = json!({});
		match &self.order_by {
			Some(OrderBy::Child(key)) => obj["orderBy"] = json!({ "child": key.as_ref() }),
			Some(OrderBy::Key) => obj["orderBy"] = json!("key"),
			Some(OrderBy::Value) => obj["orderBy"] = json!("value"),
			None => {}
		}
		if let Some(v) = &self.start_at {
			obj["startAt"] = v.clone();
		}
		if let Some(v) = &self.end_at {
			obj["endAt"] = v.clone();
		}
		if let Some(v) = &self.equal_to {
			obj["equalTo"] = v.clone();
		}
		match self.limit {
			Some(Limit::First(n)) => obj["limitToFirst"] = json!(n),
			Some(Limit::Last(n)) => obj["limitToLast"] = json!(n),
			None => {}
		}
		obj
	}

	fn set_order(&mut self, order: OrderBy) -> EmResult<()> {
		if self.order_by.is_some() {
			return Err(Error::ValidationError("ordering already set".to_string()));
		}
		self.order_by = Some(order);
		Ok(())
	}

	fn set_limit(&mut self, limit: Limit) -> EmResult<()> {
		if self.limit.is_some() {
			return Err(Error::ValidationError("limit already set".to_string()));
		}
		self.limit = Some(limit);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builder_chain() {
		let query = Query::new()
			.order_by_child("age")
			.unwrap()
			.start_at(18)
			.unwrap()
			.limit_to_first(10)
			.unwrap();
		let wire = query.to_wire();
		assert_eq!(wire["orderBy"], serde_json::json!({ "child": "age" }));
		assert_eq!(wire["startAt"], serde_json::json!(18));
		assert_eq!(wire["limitToFirst"], serde_json::json!(10));
	}

	#[test]
	fn test_double_ordering_rejected() {
		let query = Query::new().order_by_key().unwrap();
		assert!(query.order_by_value().is_err());
	}

	#[test]
	fn test_double_limit_rejected() {
		let query = Query::new().limit_to_first(5).unwrap();
		assert!(query.limit_to_last(5).is_err());
	}

	#[test]
	fn test_equal_to_conflicts_with_range() {
		assert!(Query::new().equal_to("x").unwrap().start_at("a").is_err());
		assert!(Query::new().start_at("a").unwrap().equal_to("x").is_err());
		assert!(Query::new().equal_to("x").unwrap().end_at("z").is_err());
	}

	#[test]
	fn test_range_bounds_combine() {
		let query = Query::new().start_at("a").unwrap().end_at("m").unwrap();
		let wire = query.to_wire();
		assert_eq!(wire["startAt"], serde_json::json!("a"));
		assert_eq!(wire["endAt"], serde_json::json!("m"));
	}

	#[test]
	fn test_empty_query() {
		assert!(Query::new().is_empty());
		assert!(!Query::new().order_by_key().unwrap().is_empty());
		assert_eq!(Query::new().to_wire(), serde_json::json!({}));
	}
}

// vim: ts=4
