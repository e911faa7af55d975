//! Database service and admin database handles.
//!
//! The service is the per-app memoization point: one [`DatabaseService`]
//! per app, one [`Database`] per canonical URL within it. Handles bind
//! the client library's database to the app's credentials and add rules
//! management over the backend's REST surface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use url::Url;

use ember_rtdb::Database as ClientDatabase;
use ember_rtdb::{DatabaseConfig, Reference};
use ember_types::lock;

use crate::app::App;
use crate::prelude::*;

const RULES_PATH: &str = "/.settings/rules.json";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The per-app database service. Resolves URLs and hands out memoized
/// [`Database`] handles.
pub struct DatabaseService {
	app_name: Box<str>,
	default_url: Option<Box<str>>,
	auth_token: Option<Box<str>>,
	databases: Mutex<HashMap<Box<str>, Database>>,
}

impl DatabaseService {
	pub(crate) fn new(app: &App) -> Self {
		DatabaseService {
			app_name: app.name().into(),
			default_url: app.options().database_url.clone(),
			auth_token: app.options().auth_token.clone(),
			databases: Mutex::new(HashMap::new()),
		}
	}

	pub fn app_name(&self) -> &str {
		&self.app_name
	}

	/// The database handle for `url`, or for the app's default URL when
	/// omitted. Repeated calls with the same (canonical) URL return the
	/// same handle.
	pub fn database(&self, url: Option<&str>) -> EmResult<Database> {
		let raw = match url {
			Some(explicit) => explicit,
			None => self.default_url.as_deref().ok_or_else(|| {
				Error::ConfigError(format!(
					"no database URL configured for app '{}'; set database_url in AppOptions or pass one explicitly",
					self.app_name
				))
			})?,
		};
		let canonical = normalize_url(raw)?;

		let mut databases = lock!(self.databases, "databases")?;
		if let Some(existing) = databases.get(&canonical) {
			return Ok(existing.clone());
		}

		let database = Database::open(&canonical, &self.app_name, self.auth_token.as_deref())?;
		databases.insert(canonical, database.clone());
		debug!("Opened database handle: app={}, url={}", self.app_name, database.url());
		Ok(database)
	}

	/// Number of distinct database handles this service holds.
	pub fn instance_count(&self) -> EmResult<usize> {
		Ok(lock!(self.databases, "databases")?.len())
	}
}

struct DatabaseInner {
	url: Box<str>,
	app_name: Box<str>,
	client: ClientDatabase,
	rules_endpoint: Box<str>,
	http: reqwest::Client,
	auth_token: Option<Box<str>>,
}

/// A database bound to an application instance.
///
/// Cheap to clone; clones share the underlying client connection.
#[derive(Clone)]
pub struct Database {
	inner: Arc<DatabaseInner>,
}

impl Database {
	fn open(canonical_url: &str, app_name: &str, auth_token: Option<&str>) -> EmResult<Self> {
		let mut config = DatabaseConfig::new(canonical_url);
		if let Some(token) = auth_token {
			config = config.with_auth_token(token);
		}
		let client = ClientDatabase::new(config)?;

		let http = reqwest::Client::builder()
			.timeout(HTTP_TIMEOUT)
			.build()
			.map_err(|e| Error::Http(e.to_string()))?;

		Ok(Database {
			inner: Arc::new(DatabaseInner {
				url: canonical_url.into(),
				app_name: app_name.into(),
				client,
				rules_endpoint: rules_endpoint(canonical_url)?,
				http,
				auth_token: auth_token.map(Into::into),
			}),
		})
	}

	/// The canonical URL this handle is bound to.
	pub fn url(&self) -> &str {
		&self.inner.url
	}

	/// Name of the app this handle belongs to.
	pub fn app_name(&self) -> &str {
		&self.inner.app_name
	}

	/// A reference to the database root.
	pub fn reference(&self) -> Reference {
		self.inner.client.reference()
	}

	/// A reference to the location at `path`.
	pub fn reference_with_path(&self, path: &str) -> EmResult<Reference> {
		self.inner.client.reference_with_path(path)
	}

	pub async fn go_offline(&self) {
		self.inner.client.go_offline().await;
	}

	pub async fn go_online(&self) {
		self.inner.client.go_online().await;
	}

	/// Whether two handles came from the same memoized instance.
	pub fn same_instance(&self, other: &Database) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// Fetch the security rules document as raw source.
	pub async fn get_rules(&self) -> EmResult<String> {
		let mut request = self.inner.http.get(self.inner.rules_endpoint.as_ref());
		if let Some(token) = &self.inner.auth_token {
			request = request.bearer_auth(token);
		}
		let response = request.send().await.map_err(|e| Error::Http(e.to_string()))?;
		let status = response.status();
		let body = response.text().await.map_err(|e| Error::Http(e.to_string()))?;
		if !status.is_success() {
			return Err(rules_error(status, &body));
		}
		Ok(body)
	}

	/// Fetch the security rules document parsed as JSON.
	pub async fn get_rules_json(&self) -> EmResult<Value> {
		let source = self.get_rules().await?;
		Ok(serde_json::from_str(&source)?)
	}

	/// Upload a new security rules document from raw source.
	pub async fn set_rules(&self, source: &str) -> EmResult<()> {
		let mut request = self
			.inner
			.http
			.put(self.inner.rules_endpoint.as_ref())
			.header("content-type", "application/json")
			.body(source.to_string());
		if let Some(token) = &self.inner.auth_token {
			request = request.bearer_auth(token);
		}
		let response = request.send().await.map_err(|e| Error::Http(e.to_string()))?;
		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(rules_error(status, &body));
		}
		Ok(())
	}

	/// Upload a new security rules document from a JSON value.
	pub async fn set_rules_json(&self, rules: &Value) -> EmResult<()> {
		self.set_rules(&serde_json::to_string_pretty(rules)?).await
	}
}

impl std::fmt::Debug for Database {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		f.debug_struct("Database")
			.field("url", &self.inner.url)
			.field("app_name", &self.inner.app_name)
			.finish_non_exhaustive()
	}
}

impl App {
	/// The memoized [`DatabaseService`] for this app.
	pub fn database_service(&self) -> EmResult<Arc<DatabaseService>> {
		self.get_or_init_service(|app| Ok(DatabaseService::new(app)))
	}

	/// The database handle for this app's default URL.
	pub fn database(&self) -> EmResult<Database> {
		self.database_service()?.database(None)
	}

	/// The database handle for an explicit URL.
	pub fn database_with_url(&self, url: &str) -> EmResult<Database> {
		self.database_service()?.database(Some(url))
	}
}

/// Canonicalize a database URL so memoization keys are stable.
///
/// Accepts `https`, `wss`, and `ws`; a host is required; path, query, and
/// fragment must be empty. Scheme and host are lowercased by the parser,
/// and any trailing slash is dropped.
fn normalize_url(raw: &str) -> EmResult<Box<str>> {
	let url = Url::parse(raw)?;
	match url.scheme() {
		"https" | "wss" | "ws" => {}
		"http" => {
			return Err(Error::ValidationError(
				"database URLs must use https, wss, or ws (not http)".to_string(),
			));
		}
		other => {
			return Err(Error::ValidationError(format!(
				"unsupported database URL scheme '{}'",
				other
			)));
		}
	}
	let host = url
		.host_str()
		.ok_or_else(|| Error::ValidationError("database URL has no host".to_string()))?;
	if !matches!(url.path(), "" | "/") {
		return Err(Error::ValidationError(format!(
			"database URL must not have a path: '{}'",
			url.path()
		)));
	}
	if url.query().is_some() || url.fragment().is_some() {
		return Err(Error::ValidationError(
			"database URL must not have a query or fragment".to_string(),
		));
	}
	let canonical = match url.port() {
		Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
		None => format!("{}://{}", url.scheme(), host),
	};
	Ok(canonical.into())
}

/// The REST endpoint holding the rules document for a database URL.
fn rules_endpoint(canonical_url: &str) -> EmResult<Box<str>> {
	let url = Url::parse(canonical_url)?;
	let scheme = match url.scheme() {
		"https" | "wss" => "https",
		// Plain ws is the local/emulator case; its REST side is http
		"ws" => "http",
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
		Some(port) => format!("{}://{}:{}{}", scheme, host, port, RULES_PATH),
		None => format!("{}://{}{}", scheme, host, RULES_PATH),
	};
	Ok(endpoint.into())
}

fn rules_error(status: reqwest::StatusCode, body: &str) -> Error {
	// Prefer the backend's own message when the body carries one
	let message = serde_json::from_str::<Value>(body)
		.ok()
		.and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
		.unwrap_or_else(|| body.trim().to_string());
	match status.as_u16() {
		401 | 403 => Error::PermissionDenied(message),
		404 => Error::NotFound(message),
		_ => Error::Http(format!("{}: {}", status, message)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_normalize_url_strips_trailing_slash() {
		assert_eq!(
			normalize_url("https://Apps.Ember.Example/").unwrap().as_ref(),
			"https://apps.ember.example"
		);
	}

	#[test]
	fn test_normalize_url_keeps_port() {
		assert_eq!(
			normalize_url("ws://127.0.0.1:9000").unwrap().as_ref(),
			"ws://127.0.0.1:9000"
		);
	}

	#[test]
	fn test_normalize_url_rejects_http() {
		assert!(matches!(
			normalize_url("http://apps.ember.example"),
			Err(Error::ValidationError(_))
		));
	}

	#[test]
	fn test_normalize_url_rejects_path_and_query() {
		assert!(normalize_url("https://apps.ember.example/rooms").is_err());
		assert!(normalize_url("https://apps.ember.example?ns=x").is_err());
		assert!(normalize_url("https://apps.ember.example#frag").is_err());
	}

	#[test]
	fn test_normalize_url_requires_host() {
		assert!(normalize_url("wss://").is_err());
	}

	#[test]
	fn test_rules_endpoint_mapping() {
		assert_eq!(
			rules_endpoint("wss://apps.ember.example").unwrap().as_ref(),
			"https://apps.ember.example/.settings/rules.json"
		);
		assert_eq!(
			rules_endpoint("ws://127.0.0.1:9000").unwrap().as_ref(),
			"http://127.0.0.1:9000/.settings/rules.json"
		);
	}

	#[test]
	fn test_rules_error_prefers_backend_message() {
		let err = rules_error(
			reqwest::StatusCode::FORBIDDEN,
			r#"{"error": "rules write denied"}"#,
		);
		match err {
			Error::PermissionDenied(msg) => assert_eq!(msg, "rules write denied"),
			other => panic!("unexpected error: {:?}", other),
		}
	}

	#[test]
	fn test_service_memoizes_per_url() {
		let service = DatabaseService {
			app_name: "test".into(),
			default_url: Some("wss://apps.ember.example".into()),
			auth_token: None,
			databases: Mutex::new(HashMap::new()),
		};

		let by_default = service.database(None).unwrap();
		let by_equivalent_url = service.database(Some("wss://apps.ember.example/")).unwrap();
		assert!(by_default.same_instance(&by_equivalent_url));
		assert_eq!(service.instance_count().unwrap(), 1);

		let other = service.database(Some("wss://other.ember.example")).unwrap();
		assert!(!by_default.same_instance(&other));
		assert_eq!(service.instance_count().unwrap(), 2);
	}

	#[test]
	fn test_service_without_default_url() {
		let service = DatabaseService {
			app_name: "test".into(),
			default_url: None,
			auth_token: None,
			databases: Mutex::new(HashMap::new()),
		};
		assert!(matches!(service.database(None), Err(Error::ConfigError(_))));
		assert!(service.database(Some("wss://apps.ember.example")).is_ok());
	}
}

// vim: ts=4
