//! Read-only, path-addressable view over binding credentials.

// crates.io
use serde_json::Value;
// self
use crate::{_prelude::*, error::DestinationAccessError};

/// Borrowed view over a JSON credentials tree.
///
/// Paths are either segment slices (`&["uaa", "clientid"]`) or dotted strings (`"uaa.clientid"`).
/// Lookups never fail; typed accessors return `None` when the value is missing or has another
/// type, and the `require_*` variants turn that into a [`DestinationAccessError`].
#[derive(Clone, Copy, Debug)]
pub struct TypedCredentials<'a> {
	root: &'a Value,
}
impl<'a> TypedCredentials<'a> {
	/// Wraps `root`.
	pub fn new(root: &'a Value) -> Self {
		Self { root }
	}

	/// Value at `path`.
	pub fn get_path(&self, path: &[&str]) -> Option<&'a Value> {
		path.iter().try_fold(self.root, |node, segment| node.as_object()?.get(*segment))
	}

	/// Value at a dotted `path`.
	pub fn get(&self, path: &str) -> Option<&'a Value> {
		self.get_path(&path.split('.').collect::<Vec<_>>())
	}

	/// Returns `true` when `path` exists.
	pub fn contains(&self, path: &[&str]) -> bool {
		self.get_path(path).is_some()
	}

	/// Text at `path`; numbers and booleans are rendered as text.
	pub fn string(&self, path: &[&str]) -> Option<String> {
		match self.get_path(path)? {
			Value::String(text) => Some(text.clone()),
			Value::Number(number) => Some(number.to_string()),
			Value::Bool(flag) => Some(flag.to_string()),
			_ => None,
		}
	}

	/// Integer at `path`; numeric strings are accepted.
	pub fn number(&self, path: &[&str]) -> Option<i64> {
		match self.get_path(path)? {
			Value::Number(number) => number.as_i64(),
			Value::String(text) => text.trim().parse().ok(),
			_ => None,
		}
	}

	/// Boolean at `path`; `"true"`/`"false"` strings are accepted.
	pub fn boolean(&self, path: &[&str]) -> Option<bool> {
		match self.get_path(path)? {
			Value::Bool(flag) => Some(*flag),
			Value::String(text) => text.trim().parse().ok(),
			_ => None,
		}
	}

	/// Nested object view at `path`.
	pub fn view(&self, path: &[&str]) -> Option<Self> {
		self.get_path(path).filter(|value| value.is_object()).map(Self::new)
	}

	/// Keys of the current object, in document order.
	pub fn keys(&self) -> impl Iterator<Item = &'a str> + 'a {
		self.root.as_object().into_iter().flat_map(|object| object.keys().map(String::as_str))
	}

	/// Text at `path` or an access error naming the path.
	pub fn require_string(&self, path: &[&str]) -> Result<String, DestinationAccessError> {
		self.string(path).ok_or_else(|| missing(path))
	}

	/// URL at `path` or an access error naming the path.
	pub fn require_url(&self, path: &[&str]) -> Result<Url, DestinationAccessError> {
		let raw = self.require_string(path)?;

		Url::parse(raw.trim()).map_err(|e| {
			DestinationAccessError::with_source(format!("Unable to convert '{raw}' into a URL."), e)
		})
	}
}

pub(crate) fn missing(path: &[&str]) -> DestinationAccessError {
	DestinationAccessError::new(format!(
		"Failed to resolve property [{}] from service binding.",
		path.join(", ")
	))
}
