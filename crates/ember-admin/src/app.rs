//! Application instances and the process-wide app registry.
//!
//! An [`App`] names one backend configuration (default database URL,
//! project id, credentials). Services bind to an app and are created at
//! most once per app through its typed service container; the registry
//! resolves the `"[DEFAULT]"` app for the no-argument accessors.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use serde::{Deserialize, Serialize};

use ember_types::lock;

use crate::prelude::*;

/// Name under which [`initialize_app`] registers an app.
pub const DEFAULT_APP_NAME: &str = "[DEFAULT]";

const CONFIG_ENV_VAR: &str = "EMBER_CONFIG";
const DATABASE_URL_ENV_VAR: &str = "EMBER_DATABASE_URL";
const TOKEN_ENV_VAR: &str = "EMBER_TOKEN";

/// Configuration for one application instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppOptions {
	/// Default database URL used when an accessor gets no explicit URL.
	#[serde(rename = "databaseURL")]
	pub database_url: Option<Box<str>>,

	pub project_id: Option<Box<str>>,

	/// Token sent to the database after every (re)connect and attached to
	/// rules requests. Never read from config files.
	#[serde(skip)]
	pub auth_token: Option<Box<str>>,
}

impl AppOptions {
	pub fn new() -> Self {
		AppOptions::default()
	}

	pub fn with_database_url(mut self, url: impl Into<Box<str>>) -> Self {
		self.database_url = Some(url.into());
		self
	}

	pub fn with_project_id(mut self, project_id: impl Into<Box<str>>) -> Self {
		self.project_id = Some(project_id.into());
		self
	}

	pub fn with_auth_token(mut self, token: impl Into<Box<str>>) -> Self {
		self.auth_token = Some(token.into());
		self
	}

	/// Build options from the environment.
	///
	/// `EMBER_CONFIG` holds either inline JSON (`{"databaseURL": ...}`)
	/// or the path of a JSON file. `EMBER_DATABASE_URL` and `EMBER_TOKEN`
	/// override/supply individual fields.
	pub fn from_env() -> EmResult<Self> {
		let mut options = match std::env::var(CONFIG_ENV_VAR) {
			Ok(raw) if raw.trim_start().starts_with('{') => AppOptions::from_json_str(&raw)?,
			Ok(path) => {
				let raw = std::fs::read_to_string(path.trim())?;
				AppOptions::from_json_str(&raw)?
			}
			Err(_) => AppOptions::default(),
		};
		if let Ok(url) = std::env::var(DATABASE_URL_ENV_VAR) {
			options.database_url = Some(url.into());
		}
		if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
			options.auth_token = Some(token.into());
		}
		Ok(options)
	}

	/// Parse options from a JSON config document.
	pub fn from_json_str(raw: &str) -> EmResult<Self> {
		serde_json::from_str(raw)
			.map_err(|e| Error::ConfigError(format!("invalid app config: {}", e)))
	}
}

/// Type-erased service container, one per app.
#[derive(Default)]
struct Services {
	map: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

struct AppState {
	name: Box<str>,
	options: AppOptions,
	services: Mutex<Services>,
	deleted: AtomicBool,
}

/// A handle to an application instance. Cheap to clone.
#[derive(Clone)]
pub struct App {
	inner: Arc<AppState>,
}

impl App {
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	pub fn options(&self) -> &AppOptions {
		&self.inner.options
	}

	pub(crate) fn is_deleted(&self) -> bool {
		self.inner.deleted.load(Ordering::Acquire)
	}

	/// Fetch the service of type `T` for this app, constructing it on
	/// first use. At most one instance of each service type exists per
	/// app.
	pub(crate) fn get_or_init_service<T, F>(&self, init: F) -> EmResult<Arc<T>>
	where
		T: Send + Sync + 'static,
		F: FnOnce(&App) -> EmResult<T>,
	{
		if self.is_deleted() {
			return Err(Error::NoApp(format!("app '{}' has been deleted", self.name())));
		}
		let mut services = lock!(self.inner.services, "services")?;
		if let Some(existing) = services.map.get(&TypeId::of::<T>()) {
			if let Ok(typed) = Arc::clone(existing).downcast::<T>() {
				return Ok(typed);
			}
		}
		let service = Arc::new(init(self)?);
		services.map.insert(TypeId::of::<T>(), service.clone());
		debug!("Initialized service for app '{}'", self.name());
		Ok(service)
	}

	fn mark_deleted(&self) -> EmResult<()> {
		self.inner.deleted.store(true, Ordering::Release);
		lock!(self.inner.services, "services")?.map.clear();
		Ok(())
	}
}

impl std::fmt::Debug for App {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		f.debug_struct("App").field("name", &self.inner.name).finish_non_exhaustive()
	}
}

fn registry() -> &'static Mutex<HashMap<Box<str>, App>> {
	static APPS: OnceLock<Mutex<HashMap<Box<str>, App>>> = OnceLock::new();
	APPS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register the default app.
pub fn initialize_app(options: AppOptions) -> EmResult<App> {
	initialize_app_named(options, DEFAULT_APP_NAME)
}

/// Register an app under an explicit name.
pub fn initialize_app_named(options: AppOptions, name: &str) -> EmResult<App> {
	if name.is_empty() {
		return Err(Error::ValidationError("app name cannot be empty".to_string()));
	}
	let mut apps = lock!(registry(), "apps")?;
	if apps.contains_key(name) {
		return Err(Error::DuplicateApp(name.to_string()));
	}
	let app = App {
		inner: Arc::new(AppState {
			name: name.into(),
			options,
			services: Mutex::new(Services::default()),
			deleted: AtomicBool::new(false),
		}),
	};
	apps.insert(name.into(), app.clone());
	info!("Initialized app '{}'", name);
	Ok(app)
}

/// The default app.
pub fn get_app() -> EmResult<App> {
	let apps = lock!(registry(), "apps")?;
	apps.get(DEFAULT_APP_NAME).cloned().ok_or_else(|| {
		Error::NoApp(
			"the default app does not exist; call initialize_app() before requesting services"
				.to_string(),
		)
	})
}

/// The app registered under `name`.
pub fn get_app_named(name: &str) -> EmResult<App> {
	let apps = lock!(registry(), "apps")?;
	apps.get(name)
		.cloned()
		.ok_or_else(|| Error::NoApp(format!("no app named '{}' has been initialized", name)))
}

/// All registered apps.
pub fn apps() -> EmResult<Vec<App>> {
	let apps = lock!(registry(), "apps")?;
	Ok(apps.values().cloned().collect())
}

/// Remove `app` from the registry and release its services.
///
/// The app's database connections close once the remaining handles are
/// dropped; further service lookups on the app fail. The name becomes
/// available for re-initialization immediately.
pub fn delete_app(app: &App) -> EmResult<()> {
	{
		let mut apps = lock!(registry(), "apps")?;
		match apps.get(app.name()) {
			Some(registered) if Arc::ptr_eq(&registered.inner, &app.inner) => {
				apps.remove(app.name());
			}
			_ => {
				return Err(Error::NoApp(format!(
					"app '{}' is not registered",
					app.name()
				)));
			}
		}
	}
	app.mark_deleted()?;
	info!("Deleted app '{}'", app.name());
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_options_builder() {
		let options = AppOptions::new()
			.with_database_url("wss://apps.ember.example")
			.with_project_id("demo")
			.with_auth_token("secret");
		assert_eq!(options.database_url.as_deref(), Some("wss://apps.ember.example"));
		assert_eq!(options.project_id.as_deref(), Some("demo"));
		assert_eq!(options.auth_token.as_deref(), Some("secret"));
	}

	#[test]
	fn test_options_from_json() {
		let options = AppOptions::from_json_str(
			r#"{"databaseURL": "wss://apps.ember.example", "projectId": "demo"}"#,
		)
		.unwrap();
		assert_eq!(options.database_url.as_deref(), Some("wss://apps.ember.example"));
		assert_eq!(options.project_id.as_deref(), Some("demo"));
		assert!(options.auth_token.is_none());
	}

	#[test]
	fn test_options_from_json_ignores_unknown_fields() {
		let options =
			AppOptions::from_json_str(r#"{"storageBucket": "b", "projectId": "demo"}"#).unwrap();
		assert_eq!(options.project_id.as_deref(), Some("demo"));
	}

	#[test]
	fn test_options_from_invalid_json() {
		assert!(AppOptions::from_json_str("databaseURL=x").is_err());
	}

	#[test]
	fn test_auth_token_never_serialized() {
		let options = AppOptions::new().with_auth_token("secret");
		let json = serde_json::to_string(&options).unwrap();
		assert!(!json.contains("secret"));
	}

	#[test]
	fn test_empty_app_name_rejected() {
		assert!(matches!(
			initialize_app_named(AppOptions::new(), ""),
			Err(Error::ValidationError(_))
		));
	}

	#[test]
	fn test_service_memoized_per_app() {
		struct Marker(u32);

		let app = initialize_app_named(AppOptions::new(), "service-memo-test").unwrap();
		let first = app.get_or_init_service(|_| Ok(Marker(1))).unwrap();
		let second = app.get_or_init_service(|_| Ok(Marker(2))).unwrap();
		assert!(Arc::ptr_eq(&first, &second));
		assert_eq!(second.0, 1);

		delete_app(&app).unwrap();
	}

	#[test]
	fn test_deleted_app_rejects_services() {
		struct Marker;

		let app = initialize_app_named(AppOptions::new(), "service-deleted-test").unwrap();
		delete_app(&app).unwrap();
		assert!(matches!(app.get_or_init_service(|_| Ok(Marker)), Err(Error::NoApp(_))));
	}
}

// vim: ts=4
