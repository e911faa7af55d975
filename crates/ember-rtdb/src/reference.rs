//! References - path-bound handles for reads, writes, and listeners.

use serde::Serialize;
use serde_json::{Map, Value};

use ember_types::utils::now_millis;

use crate::database::Database;
use crate::event::{Event, EventType};
use crate::on_disconnect::OnDisconnect;
use crate::path::Path;
use crate::prelude::*;
use crate::protocol::{WireMessage, WriteOp};
use crate::push_id;
use crate::query::Query;
use crate::snapshot::DataSnapshot;
use crate::subscription::Subscription;

/// A handle to a location in the database.
#[derive(Debug, Clone)]
pub struct Reference {
	db: Database,
	path: Path,
}

impl Reference {
	pub(crate) fn new(db: Database, path: Path) -> Self {
		Reference { db, path }
	}

	pub fn key(&self) -> Option<&str> {
		self.path.key()
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn database(&self) -> &Database {
		&self.db
	}

	pub fn root(&self) -> Reference {
		Reference::new(self.db.clone(), Path::root())
	}

	pub fn parent(&self) -> Option<Reference> {
		self.path.parent().map(|path| Reference::new(self.db.clone(), path))
	}

	pub fn child(&self, relative: &str) -> EmResult<Reference> {
		Ok(Reference::new(self.db.clone(), self.path.child(relative)?))
	}

	/// Read the current value once.
	pub async fn get(&self) -> EmResult<DataSnapshot> {
		let frame = WireMessage::get(&self.path, None);
		let response = self.db.conn().await.request(frame).await?;
		Ok(DataSnapshot::new(self.path.clone(), response.data()))
	}

	/// Read the current value once, narrowed by a query.
	pub async fn get_with_query(&self, query: &Query) -> EmResult<DataSnapshot> {
		let frame = WireMessage::get(&self.path, Some(query));
		let response = self.db.conn().await.request(frame).await?;
		Ok(DataSnapshot::new(self.path.clone(), response.data()))
	}

	/// Replace the value at this location.
	pub async fn set(&self, value: impl Serialize) -> EmResult<()> {
		let data = serde_json::to_value(value)?;
		let frame = WireMessage::transaction(vec![WriteOp::Replace {
			path: self.path.to_string(),
			data,
		}])?;
		self.db.conn().await.request(frame).await?;
		Ok(())
	}

	/// Atomically write several descendant locations at once.
	///
	/// Each key is a relative path; its value replaces that location
	/// entirely, and `null` deletes it. Either every write applies or
	/// none does.
	pub async fn update(&self, values: Map<String, Value>) -> EmResult<()> {
		let ops = build_update_ops(&self.path, values)?;
		if ops.is_empty() {
			return Ok(());
		}
		let frame = WireMessage::transaction(ops)?;
		self.db.conn().await.request(frame).await?;
		Ok(())
	}

	/// Delete the value at this location.
	pub async fn remove(&self) -> EmResult<()> {
		let frame =
			WireMessage::transaction(vec![WriteOp::Delete { path: self.path.to_string() }])?;
		self.db.conn().await.request(frame).await?;
		Ok(())
	}

	/// Write `value` under a fresh chronologically ordered key and return
	/// a reference to it.
	pub async fn push(&self, value: impl Serialize) -> EmResult<Reference> {
		let key = push_id::next_push_id(now_millis())?;
		let child = self.child(&key)?;
		child.set(value).await?;
		Ok(child)
	}

	/// Register a listener for `event_type` at this location.
	pub async fn on(&self, event_type: EventType) -> EmResult<Subscription> {
		self.listen(vec![event_type], None).await
	}

	/// Register a listener narrowed by a query.
	pub async fn on_with_query(
		&self,
		event_type: EventType,
		query: Query,
	) -> EmResult<Subscription> {
		self.listen(vec![event_type], Some(query)).await
	}

	/// Wait for a single event of `event_type`, then drop the listener.
	pub async fn once(&self, event_type: EventType) -> EmResult<Event> {
		let mut subscription = self.on(event_type).await?;
		subscription.next_event().await.ok_or(Error::Disconnected)
	}

	/// Disconnect-triggered writes for this location.
	pub fn on_disconnect(&self) -> OnDisconnect {
		OnDisconnect::new(self.db.clone(), self.path.clone())
	}

	async fn listen(&self, events: Vec<EventType>, query: Option<Query>) -> EmResult<Subscription> {
		let conn = self.db.conn().await;
		let (key, rx) = conn.subscribe(self.path.clone(), events, query).await?;
		Ok(Subscription::new(key, conn.command_sender(), rx))
	}
}

/// Expand an update map into write operations rooted at `base`.
fn build_update_ops(base: &Path, values: Map<String, Value>) -> EmResult<Vec<WriteOp>> {
	let mut ops = Vec::with_capacity(values.len());
	for (relative, value) in values {
		let target = base.child(&relative)?;
		if value.is_null() {
			ops.push(WriteOp::Delete { path: target.to_string() });
		} else {
			ops.push(WriteOp::Replace { path: target.to_string(), data: value });
		}
	}
	Ok(ops)
}


// vim: ts=4
