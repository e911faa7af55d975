//! Shared types and core utilities for the Ember Realtime Database SDK.
//!
//! This crate contains the error type, result alias, and small helpers
//! shared between the client library (`ember-rtdb`) and the admin wrapper
//! (`ember-admin`). Extracting them into a separate crate keeps the two
//! halves of the SDK decoupled from each other's internals.

pub mod error;
pub mod prelude;
pub mod utils;

mod lock;

// vim: ts=4
