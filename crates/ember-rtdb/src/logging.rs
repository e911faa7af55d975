//! Wire-level logging toggle.
//!
//! The client never installs a log backend; all output goes through
//! `tracing` and the consumer picks a subscriber. This flag only controls
//! whether individual protocol frames are logged at debug level.

use std::sync::atomic::{AtomicBool, Ordering};

static WIRE_LOGGING: AtomicBool = AtomicBool::new(false);

/// Enable or disable per-frame debug logging for all connections in this
/// process.
pub fn enable_logging(enabled: bool) {
	WIRE_LOGGING.store(enabled, Ordering::Relaxed);
}

pub(crate) fn wire_logging_enabled() -> bool {
	WIRE_LOGGING.load(Ordering::Relaxed)
}


// vim: ts=4
