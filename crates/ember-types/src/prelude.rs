//! Common imports used throughout the SDK crates.

pub use crate::error::{EmResult, Error};
pub use tracing::{debug, error, info, warn};

// vim: ts=4
