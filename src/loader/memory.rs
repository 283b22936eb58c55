//! Process-local destination registry.

// self
use crate::{
	_prelude::*,
	destination::{Destination, DestinationOptions},
	error::{ConfigError, LoadError},
	loader::DestinationLoader,
};

/// Loader backed by destinations registered at runtime.
#[derive(Debug, Default)]
pub struct InMemoryDestinationLoader {
	destinations: RwLock<HashMap<String, Destination>>,
}
impl InMemoryDestinationLoader {
	/// Registers `destination` under its name, replacing an earlier one with the same name.
	///
	/// Destinations without a name (or with a blank one) are rejected here rather than at lookup.
	/// Names are matched exactly, surrounding whitespace included.
	pub fn register(&self, destination: Destination) -> Result<(), ConfigError> {
		let name = destination
			.name()
			.filter(|name| !name.trim().is_empty())
			.ok_or(ConfigError::EmptyDestinationName)?
			.to_owned();

		tracing::debug!(destination = %name, "Registering in-memory destination.");

		self.destinations.write().insert(name, destination);

		Ok(())
	}

	/// Removes the destination registered under `name`.
	pub fn unregister(&self, name: &str) -> Option<Destination> {
		self.destinations.write().remove(name)
	}

	/// Number of registered destinations.
	pub fn len(&self) -> usize {
		self.destinations.read().len()
	}

	/// Returns `true` when nothing is registered.
	pub fn is_empty(&self) -> bool {
		self.destinations.read().is_empty()
	}
}
impl DestinationLoader for InMemoryDestinationLoader {
	fn name(&self) -> &str {
		"in-memory"
	}

	fn try_get_destination(
		&self,
		destination_name: &str,
		_: &DestinationOptions,
	) -> Result<Destination, LoadError> {
		self.destinations.read().get(destination_name).cloned().ok_or_else(|| {
			LoadError::not_found(
				Some(destination_name),
				"No destination with this name is registered in memory.",
			)
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn named(name: &str) -> Destination {
		Destination::builder("https://memory.example")
			.name(name)
			.build_unproxied()
			.expect("Destination fixture should build.")
	}

	#[test]
	fn unnamed_destinations_are_rejected_at_registration() {
		let loader = InMemoryDestinationLoader::default();
		let unnamed = Destination::builder("https://memory.example")
			.build_unproxied()
			.expect("Destination fixture should build.");

		assert!(matches!(loader.register(unnamed), Err(ConfigError::EmptyDestinationName)));
		assert!(matches!(loader.register(named("  ")), Err(ConfigError::EmptyDestinationName)));
		assert!(loader.is_empty());
	}

	#[test]
	fn registered_destinations_resolve_by_name() {
		let loader = InMemoryDestinationLoader::default();

		loader.register(named("backend")).expect("Named destination should register.");

		let found = loader
			.try_get_destination("backend", &DestinationOptions::default())
			.expect("Registered destination should resolve.");

		assert_eq!(found.name(), Some("backend"));
		assert!(
			loader
				.try_get_destination("other", &DestinationOptions::default())
				.expect_err("Unknown names should not resolve.")
				.is_not_found()
		);
		assert!(loader.unregister("backend").is_some());
		assert_eq!(loader.len(), 0);
	}

	#[test]
	fn lookup_key_matches_the_destination_name() {
		let loader = InMemoryDestinationLoader::default();

		loader.register(named(" padded ")).expect("Padded name should register.");

		let found = loader
			.try_get_destination(" padded ", &DestinationOptions::default())
			.expect("Exact name should resolve.");

		assert_eq!(found.name(), Some(" padded "));
		assert!(loader.try_get_destination("padded", &DestinationOptions::default()).is_err());
	}
}
