//! Disconnect-triggered writes.
//!
//! An `OnDisconnect` handle queues writes on the backend that fire when
//! this client's connection drops - cleanly or not. Typical use is
//! presence: set `presence/<user>` on connect and register a disconnect
//! removal right after.
//!
//! Registrations survive reconnects: the connection re-registers them
//! after re-establishing the session.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::database::Database;
use crate::path::Path;
use crate::prelude::*;
use crate::protocol::OnDisconnectOp;

/// Pending disconnect writes for one location.
#[derive(Debug, Clone)]
pub struct OnDisconnect {
	db: Database,
	path: Path,
}

impl OnDisconnect {
	pub(crate) fn new(db: Database, path: Path) -> Self {
		OnDisconnect { db, path }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Replace the value at this location when the connection drops.
	pub async fn set(&self, value: impl Serialize) -> EmResult<()> {
		let data = serde_json::to_value(value)?;
		self.send(OnDisconnectOp::Set { path: self.path.to_string(), data }).await
	}

	/// Write several descendant locations when the connection drops.
	pub async fn update(&self, values: Map<String, Value>) -> EmResult<()> {
		self.send(OnDisconnectOp::Update {
			path: self.path.to_string(),
			data: Value::Object(values),
		})
		.await
	}

	/// Delete the value at this location when the connection drops.
	pub async fn remove(&self) -> EmResult<()> {
		self.send(OnDisconnectOp::Remove { path: self.path.to_string() }).await
	}

	/// Cancel all disconnect writes registered for this location.
	pub async fn cancel(&self) -> EmResult<()> {
		self.send(OnDisconnectOp::Cancel { path: self.path.to_string() }).await
	}

	async fn send(&self, op: OnDisconnectOp) -> EmResult<()> {
		self.db.conn().await.on_disconnect(op).await
	}
}

// vim: ts=4
