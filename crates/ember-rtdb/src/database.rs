//! Database handle.

use std::time::Duration;

use tokio::sync::OnceCell;
use url::Url;

use crate::connection::{
	ConnectionConfig, ConnectionHandle, DEFAULT_REQUEST_TIMEOUT,
};
use crate::path::Path;
use crate::prelude::*;
use crate::reference::Reference;

/// Client configuration for one database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
	/// Database URL; `ws`, `wss`, or `https` (mapped to `wss`).
	pub url: Box<str>,
	/// Token sent in an `auth` request after every (re)connect.
	pub auth_token: Option<Box<str>>,
	/// How long to wait for a response frame before failing a request.
	pub request_timeout: Duration,
}

impl DatabaseConfig {
	pub fn new(url: impl Into<Box<str>>) -> Self {
		DatabaseConfig { url: url.into(), auth_token: None, request_timeout: DEFAULT_REQUEST_TIMEOUT }
	}

	pub fn with_auth_token(mut self, token: impl Into<Box<str>>) -> Self {
		self.auth_token = Some(token.into());
		self
	}

	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;
		self
	}
}

#[derive(Debug)]
struct DatabaseInner {
	url: Box<str>,
	config: ConnectionConfig,
	/// The connection actor, spawned on first use. Creating a handle
	/// performs no I/O and needs no runtime.
	conn: OnceCell<ConnectionHandle>,
}

/// A handle to one Realtime Database instance.
///
/// Cheap to clone; all clones share the same lazy connection.
#[derive(Debug, Clone)]
pub struct Database {
	inner: std::sync::Arc<DatabaseInner>,
}

impl Database {
	/// Create a handle for the database at `url`.
	pub fn new(config: DatabaseConfig) -> EmResult<Self> {
		let endpoint = websocket_endpoint(&config.url)?;
		let inner = DatabaseInner {
			url: config.url.clone(),
			config: ConnectionConfig {
				endpoint,
				auth_token: config.auth_token,
				request_timeout: config.request_timeout,
			},
			conn: OnceCell::new(),
		};
		Ok(Database { inner: std::sync::Arc::new(inner) })
	}

	/// The URL this handle was created with.
	pub fn url(&self) -> &str {
		&self.inner.url
	}

	/// A reference to the database root.
	pub fn reference(&self) -> Reference {
		Reference::new(self.clone(), Path::root())
	}

	/// A reference to the location at `path`.
	pub fn reference_with_path(&self, path: &str) -> EmResult<Reference> {
		Ok(Reference::new(self.clone(), Path::parse(path)?))
	}

	/// Close the connection and stop reconnecting until
	/// [`go_online`](Self::go_online) is called. Listeners stay registered
	/// locally and resume on reconnect.
	pub async fn go_offline(&self) {
		self.conn().await.go_offline();
	}

	/// Allow the connection to be (re)established.
	pub async fn go_online(&self) {
		self.conn().await.go_online();
	}

	pub(crate) async fn conn(&self) -> &ConnectionHandle {
		self.inner
			.conn
			.get_or_init(|| async { ConnectionHandle::spawn(self.inner.config.clone()) })
			.await
	}

	/// Whether two handles are the same underlying instance.
	pub fn same_instance(&self, other: &Database) -> bool {
		std::sync::Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl Drop for DatabaseInner {
	fn drop(&mut self) {
		if let Some(conn) = self.conn.get() {
			conn.close();
		}
	}
}

/// Derive the WebSocket endpoint from a database URL.
///
/// `https` maps to `wss` (the admin layer hands us `https` URLs);
/// `ws`/`wss` pass through. Anything else is rejected.
fn websocket_endpoint(raw: &str) -> EmResult<Box<str>> {
	let url = Url::parse(raw)?;
	let scheme = match url.scheme() {
		"wss" | "https" => "wss",
		"ws" => "ws",
		other => {
			return Err(Error::ValidationError(format!(
				"unsupported database URL scheme '{}'",
				other
			)));
		}
	};
	let host = url
		.host_str()
		.ok_or_else(|| Error::ValidationError("database URL has no host".to_string()))?;
	let endpoint = match url.port() {
		Some(port) => format!("{}://{}:{}/.ws?v=2", scheme, host, port),
		None => format!("{}://{}/.ws?v=2", scheme, host),
	};
	Ok(endpoint.into())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_endpoint_from_https() {
		assert_eq!(
			websocket_endpoint("https://apps.ember.example").unwrap().as_ref(),
			"wss://apps.ember.example/.ws?v=2"
		);
	}

	#[test]
	fn test_endpoint_keeps_ws_and_port() {
		assert_eq!(
			websocket_endpoint("ws://127.0.0.1:9000").unwrap().as_ref(),
			"ws://127.0.0.1:9000/.ws?v=2"
		);
	}

	#[test]
	fn test_endpoint_rejects_http() {
		assert!(websocket_endpoint("http://apps.ember.example").is_err());
		assert!(websocket_endpoint("ftp://apps.ember.example").is_err());
	}

	#[test]
	fn test_handle_creation_is_lazy() {
		// No runtime needed: nothing is spawned until the first operation
		let db = Database::new(DatabaseConfig::new("wss://apps.ember.example")).unwrap();
		assert_eq!(db.url(), "wss://apps.ember.example");
	}

	#[test]
	fn test_same_instance() {
		let db = Database::new(DatabaseConfig::new("wss://apps.ember.example")).unwrap();
		let clone = db.clone();
		let other = Database::new(DatabaseConfig::new("wss://apps.ember.example")).unwrap();
		assert!(db.same_instance(&clone));
		assert!(!db.same_instance(&other));
	}
}

// vim: ts=4
