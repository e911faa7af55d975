//! Poison-safe locking for `std::sync` mutexes.

/// Lock a `std::sync::Mutex`, converting poisoning into an [`Error`]
/// instead of panicking. An optional label names the lock in diagnostics.
///
/// ```ignore
/// let mut apps = lock!(self.apps)?;
/// let mut dbs = lock!(self.databases, "databases")?;
/// ```
///
/// [`Error`]: crate::error::Error
#[macro_export]
macro_rules! lock {
	($mutex:expr) => {
		$mutex
			.lock()
			.map_err(|_| $crate::error::Error::Internal("lock poisoned".to_string()))
	};
	($mutex:expr, $label:expr) => {
		$mutex
			.lock()
			.map_err(|_| $crate::error::Error::Internal(format!("lock poisoned: {}", $label)))
	};
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	#[test]
	fn test_lock_healthy_mutex() {
		let m = Mutex::new(41);
		{
			let mut guard = lock!(m).unwrap();
			*guard += 1;
		}
		assert_eq!(*lock!(m, "counter").unwrap(), 42);
	}
}

// vim: ts=4
