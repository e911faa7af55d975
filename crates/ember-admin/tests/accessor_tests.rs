//! Integration tests for database handle resolution and memoization.

use ember_admin::{AppOptions, Error, delete_app, initialize_app_named};

#[test]
fn test_same_url_returns_same_handle() {
	let app = initialize_app_named(
		AppOptions::new().with_database_url("wss://apps.ember.example"),
		"accessor-memo",
	)
	.unwrap();

	let first = app.database().unwrap();
	let second = app.database().unwrap();
	let explicit = app.database_with_url("wss://apps.ember.example").unwrap();

	assert!(first.same_instance(&second));
	assert!(first.same_instance(&explicit));

	delete_app(&app).unwrap();
}

#[test]
fn test_equivalent_urls_share_a_handle() {
	let app = initialize_app_named(
		AppOptions::new().with_database_url("wss://apps.ember.example"),
		"accessor-canonical",
	)
	.unwrap();

	// Trailing slash and host case differences canonicalize away
	let a = app.database_with_url("wss://apps.ember.example/").unwrap();
	let b = app.database_with_url("wss://APPS.Ember.Example").unwrap();
	assert!(a.same_instance(&b));
	assert_eq!(a.url(), "wss://apps.ember.example");

	delete_app(&app).unwrap();
}

#[test]
fn test_distinct_urls_get_distinct_handles() {
	let app = initialize_app_named(
		AppOptions::new().with_database_url("wss://apps.ember.example"),
		"accessor-distinct",
	)
	.unwrap();

	let default = app.database().unwrap();
	let other = app.database_with_url("wss://staging.ember.example").unwrap();
	assert!(!default.same_instance(&other));
	assert_eq!(other.url(), "wss://staging.ember.example");
	assert_eq!(app.database_service().unwrap().instance_count().unwrap(), 2);

	delete_app(&app).unwrap();
}

#[test]
fn test_missing_default_url_is_config_error() {
	let app = initialize_app_named(AppOptions::new(), "accessor-no-url").unwrap();

	match app.database() {
		Err(Error::ConfigError(msg)) => assert!(msg.contains("accessor-no-url")),
		other => panic!("expected ConfigError, got {:?}", other),
	}
	// An explicit URL still works
	assert!(app.database_with_url("wss://apps.ember.example").is_ok());

	delete_app(&app).unwrap();
}

#[test]
fn test_invalid_urls_rejected() {
	let app = initialize_app_named(AppOptions::new(), "accessor-bad-url").unwrap();

	for url in [
		"http://apps.ember.example",
		"ftp://apps.ember.example",
		"wss://apps.ember.example/rooms",
		"not a url",
	] {
		assert!(
			matches!(app.database_with_url(url), Err(Error::ValidationError(_))),
			"expected {:?} to be rejected",
			url
		);
	}

	delete_app(&app).unwrap();
}

#[test]
fn test_service_is_memoized_per_app() {
	let app = initialize_app_named(
		AppOptions::new().with_database_url("wss://apps.ember.example"),
		"accessor-service",
	)
	.unwrap();

	let first = app.database_service().unwrap();
	let second = app.database_service().unwrap();
	assert!(std::sync::Arc::ptr_eq(&first, &second));

	delete_app(&app).unwrap();
}

#[test]
fn test_handles_expose_references_without_io() {
	let app = initialize_app_named(
		AppOptions::new().with_database_url("wss://apps.ember.example"),
		"accessor-refs",
	)
	.unwrap();

	// No backend exists at this URL; handle and reference creation must
	// still succeed because connections dial lazily.
	let db = app.database().unwrap();
	let root = db.reference();
	assert!(root.path().is_root());

	let member = db.reference_with_path("rooms/lobby/members/alice").unwrap();
	assert_eq!(member.key(), Some("alice"));
	assert!(db.reference_with_path("bad#path").is_err());

	delete_app(&app).unwrap();
}

// vim: ts=4
