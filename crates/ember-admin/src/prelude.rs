pub use ember_types::error::{EmResult, Error};
pub use tracing::{debug, info, warn};

// vim: ts=4
