//! Error type shared across the SDK.
//!
//! One enum covers both halves of the SDK: connection/protocol failures
//! raised by the client library and registry/configuration failures raised
//! by the admin wrapper. Adapters in other crates convert their library
//! errors into these variants at the boundary.

use std::fmt;

pub type EmResult<T> = Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// The WebSocket transport failed (dial, TLS, or mid-session).
	Connection(String),
	/// The connection dropped (or was closed) while a request was in flight.
	Disconnected,
	/// A request was not answered within the configured timeout.
	Timeout,
	/// The backend sent a frame that violates the wire protocol.
	Protocol(String),
	/// A JSON payload could not be parsed.
	Parse,
	/// Invalid caller input (paths, URLs, query combinations).
	ValidationError(String),
	/// Missing or unusable configuration (no database URL, bad env config).
	ConfigError(String),
	/// No application registered under the requested name.
	NoApp(String),
	/// An application with this name is already registered.
	DuplicateApp(String),
	/// The backend rejected the request for authorization reasons.
	PermissionDenied(String),
	/// The backend reported the target as missing.
	NotFound(String),
	/// An HTTP call (rules management) failed.
	Http(String),
	IoError(std::io::Error),
	Internal(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::Connection(msg) => write!(f, "connection error: {}", msg),
			Error::Disconnected => write!(f, "connection closed"),
			Error::Timeout => write!(f, "request timed out"),
			Error::Protocol(msg) => write!(f, "protocol error: {}", msg),
			Error::Parse => write!(f, "parse error"),
			Error::ValidationError(msg) => write!(f, "validation error: {}", msg),
			Error::ConfigError(msg) => write!(f, "configuration error: {}", msg),
			Error::NoApp(msg) => write!(f, "no app: {}", msg),
			Error::DuplicateApp(name) => write!(f, "app already exists: {}", name),
			Error::PermissionDenied(msg) => write!(f, "permission denied: {}", msg),
			Error::NotFound(msg) => write!(f, "not found: {}", msg),
			Error::Http(msg) => write!(f, "http error: {}", msg),
			Error::IoError(e) => write!(f, "io error: {}", e),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
		}
	}
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Self {
		Error::IoError(e)
	}
}

impl From<serde_json::Error> for Error {
	fn from(_: serde_json::Error) -> Self {
		Error::Parse
	}
}

impl From<url::ParseError> for Error {
	fn from(e: url::ParseError) -> Self {
		Error::ValidationError(format!("invalid URL: {}", e))
	}
}

impl From<tokio::task::JoinError> for Error {
	fn from(e: tokio::task::JoinError) -> Self {
		Error::Internal(e.to_string())
	}
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
	fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
		Error::Disconnected
	}
}

// vim: ts=4
