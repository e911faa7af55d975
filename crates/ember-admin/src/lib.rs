//! Administrative access to the Ember Realtime Database.
//!
//! This crate binds the client library (`ember-rtdb`) to application
//! instances:
//!
//! - register apps with [`initialize_app`] / [`initialize_app_named`]
//! - fetch handles with [`get_database`] (default app, default URL),
//!   [`get_database_with_url`], or the [`App::database`] /
//!   [`App::database_with_url`] methods
//! - handles are memoized: one service per app, one [`Database`] per
//!   (app, canonical URL) pair
//! - admin handles add rules management on top of the client's
//!   references, listeners, and on-disconnect writes
//!
//! The client library's public types are re-exported here so consumers
//! only depend on this crate.
//!
//! ```no_run
//! use ember_admin::{AppOptions, initialize_app, get_database};
//!
//! # fn main() -> ember_admin::EmResult<()> {
//! initialize_app(AppOptions::new().with_database_url("wss://apps.ember.example"))?;
//!
//! let db = get_database()?;
//! let lobby = db.reference_with_path("rooms/lobby")?;
//! # Ok(())
//! # }
//! ```

// Re-export the client library's public types
pub use ember_rtdb::{
	DataSnapshot, Event, EventType, OnDisconnect, Path, Query, Reference, Subscription,
	enable_logging, server_value,
};

// Re-export the shared error type so consumers need only this crate
pub use ember_types::error::{EmResult, Error};

// Local modules
pub mod app;
pub mod database;

mod prelude;

pub use crate::app::{
	App, AppOptions, DEFAULT_APP_NAME, apps, delete_app, get_app, get_app_named, initialize_app,
	initialize_app_named,
};
pub use crate::database::{Database, DatabaseService};

/// The database handle for the default app's default URL.
pub fn get_database() -> EmResult<Database> {
	get_app()?.database()
}

/// The database handle for an explicit URL on the default app.
pub fn get_database_with_url(url: &str) -> EmResult<Database> {
	get_app()?.database_with_url(url)
}

// vim: ts=4
