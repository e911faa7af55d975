//! Database path handling.
//!
//! Paths are slash-separated and validated on construction, so every
//! `Path` held by a handle is known good. The empty path is the database
//! root.

use std::fmt;

use crate::prelude::*;

/// Characters that may not appear in a path segment.
const INVALID_SEGMENT_CHARS: [char; 5] = ['.', '#', '$', '[', ']'];

/// A validated database path.
///
/// The root path has no segments. Leading and trailing slashes are
/// accepted on parse and stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
	segments: Vec<Box<str>>,
}

impl Path {
	/// The root of the database.
	pub fn root() -> Self {
		Path { segments: Vec::new() }
	}

	/// Parse and validate a path like `"users/alice/profile"`.
	pub fn parse(raw: &str) -> EmResult<Self> {
		let mut segments = Vec::new();
		for segment in raw.split('/') {
			if segment.is_empty() {
				// Tolerate leading/trailing/double slashes
				continue;
			}
			validate_segment(segment)?;
			segments.push(Box::from(segment));
		}
		Ok(Path { segments })
	}

	pub fn is_root(&self) -> bool {
		self.segments.is_empty()
	}

	/// The last segment, or `None` at the root.
	pub fn key(&self) -> Option<&str> {
		self.segments.last().map(AsRef::as_ref)
	}

	/// The path one level up, or `None` at the root.
	pub fn parent(&self) -> Option<Path> {
		if self.segments.is_empty() {
			return None;
		}
		Some(Path { segments: self.segments[..self.segments.len() - 1].to_vec() })
	}

	/// Append a relative path (which may itself contain slashes).
	pub fn child(&self, relative: &str) -> EmResult<Path> {
		let suffix = Path::parse(relative)?;
		if suffix.is_root() {
			return Err(Error::ValidationError("child path cannot be empty".to_string()));
		}
		let mut segments = self.segments.clone();
		segments.extend(suffix.segments);
		Ok(Path { segments })
	}

	pub fn segments(&self) -> impl Iterator<Item = &str> {
		self.segments.iter().map(AsRef::as_ref)
	}

	pub fn depth(&self) -> usize {
		self.segments.len()
	}
}

impl fmt::Display for Path {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let mut first = true;
		for segment in &self.segments {
			if !first {
				write!(f, "/")?;
			}
			write!(f, "{}", segment)?;
			first = false;
		}
		Ok(())
	}
}

impl std::str::FromStr for Path {
	type Err = Error;

	fn from_str(s: &str) -> EmResult<Self> {
		Path::parse(s)
	}
}

fn validate_segment(segment: &str) -> EmResult<()> {
	for c in segment.chars() {
		if INVALID_SEGMENT_CHARS.contains(&c) || c.is_control() {
			return Err(Error::ValidationError(format!(
				"invalid character {:?} in path segment '{}'",
				c, segment
			)));
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_simple() {
		let path = Path::parse("users/alice").unwrap();
		assert_eq!(path.to_string(), "users/alice");
		assert_eq!(path.key(), Some("alice"));
		assert_eq!(path.depth(), 2);
	}

	#[test]
	fn test_parse_strips_extra_slashes() {
		let path = Path::parse("/users//alice/").unwrap();
		assert_eq!(path.to_string(), "users/alice");
	}

	#[test]
	fn test_empty_is_root() {
		assert!(Path::parse("").unwrap().is_root());
		assert!(Path::parse("/").unwrap().is_root());
		assert_eq!(Path::root().key(), None);
	}

	#[test]
	fn test_parent_chain() {
		let path = Path::parse("a/b/c").unwrap();
		let parent = path.parent().unwrap();
		assert_eq!(parent.to_string(), "a/b");
		assert_eq!(parent.parent().unwrap().to_string(), "a");
		assert!(parent.parent().unwrap().parent().unwrap().is_root());
		assert!(Path::root().parent().is_none());
	}

	#[test]
	fn test_child_join() {
		let path = Path::parse("users").unwrap();
		let child = path.child("alice/profile").unwrap();
		assert_eq!(child.to_string(), "users/alice/profile");
	}

	#[test]
	fn test_child_empty_fails() {
		assert!(Path::root().child("").is_err());
		assert!(Path::root().child("/").is_err());
	}

	#[test]
	fn test_invalid_characters_rejected() {
		for raw in ["users/.hidden", "a#b", "pri$e", "arr[0]", "arr]0[", "tab\tkey"] {
			assert!(Path::parse(raw).is_err(), "expected {:?} to be rejected", raw);
		}
	}

	#[test]
	fn test_unicode_segments_allowed() {
		let path = Path::parse("útkövetés/állapot").unwrap();
		assert_eq!(path.depth(), 2);
	}
}

// vim: ts=4
