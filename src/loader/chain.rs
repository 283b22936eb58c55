//! First-definitive-result-wins composition of destination loaders.

// std
use std::ptr;
// self
use crate::{
	_prelude::*,
	destination::{Destination, DestinationOptions},
	error::{ConfigError, DestinationNotFound, LoadError},
	loader::DestinationLoader,
};

/// Ordered, flat, non-empty list of loaders.
///
/// Appending or prepending a chain adds its members rather than the chain itself, and adding a
/// loader instance that is already a member is a no-op.
#[derive(Clone, Debug)]
pub struct DestinationLoaderChain {
	loaders: Vec<Arc<dyn DestinationLoader>>,
}
impl DestinationLoaderChain {
	/// Builds a chain; an empty list is rejected.
	pub fn new<I>(loaders: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = Arc<dyn DestinationLoader>>,
	{
		let mut chain = Self { loaders: Vec::new() };

		for loader in loaders {
			chain.push_back(loader);
		}

		if chain.loaders.is_empty() {
			return Err(ConfigError::EmptyLoaderChain);
		}

		Ok(chain)
	}

	/// Builds a chain from one loader, flattening it when it is itself a chain.
	pub fn from_loader(loader: Arc<dyn DestinationLoader>) -> Self {
		let mut chain = Self { loaders: Vec::new() };

		chain.push_back(loader);

		chain
	}

	/// Returns a copy with `loader` (or its members) appended.
	pub fn append(&self, loader: Arc<dyn DestinationLoader>) -> Self {
		let mut chain = self.clone();

		chain.push_back(loader);

		chain
	}

	/// Returns a copy with `loader` (or its members) prepended.
	pub fn prepend(&self, loader: Arc<dyn DestinationLoader>) -> Self {
		let mut head = Self::from_loader(loader);

		for existing in &self.loaders {
			head.push_back(existing.clone());
		}

		head
	}

	/// Members in evaluation order.
	pub fn loaders(&self) -> &[Arc<dyn DestinationLoader>] {
		&self.loaders
	}

	/// Number of members.
	pub fn len(&self) -> usize {
		self.loaders.len()
	}

	/// Always `false`; chains are non-empty by construction.
	pub fn is_empty(&self) -> bool {
		self.loaders.is_empty()
	}

	fn push_back(&mut self, loader: Arc<dyn DestinationLoader>) {
		let members = match loader.as_chain() {
			Some(chain) => chain.loaders.clone(),
			None => vec![loader],
		};

		for member in members {
			if !self.contains(&member) {
				self.loaders.push(member);
			}
		}
	}

	fn contains(&self, loader: &Arc<dyn DestinationLoader>) -> bool {
		self.loaders.iter().any(|existing| ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(loader)))
	}
}
impl DestinationLoader for DestinationLoaderChain {
	fn name(&self) -> &str {
		"chain"
	}

	fn try_get_destination(
		&self,
		destination_name: &str,
		options: &DestinationOptions,
	) -> Result<Destination, LoadError> {
		let mut consulted = Vec::with_capacity(self.loaders.len());

		for loader in &self.loaders {
			consulted.push(loader.name().to_owned());

			match loader.try_get_destination(destination_name, options) {
				Ok(destination) => {
					tracing::debug!(
						destination = destination_name,
						loader = loader.name(),
						"Destination resolved."
					);

					return Ok(destination);
				},
				Err(LoadError::NotFound(e)) => {
					tracing::debug!(
						destination = destination_name,
						loader = loader.name(),
						reason = %e,
						"Loader has no such destination; trying the next one."
					);
				},
				Err(e) => return Err(e),
			}
		}

		Err(DestinationNotFound::new(Some(destination_name), "No loader provided the destination.")
			.with_consulted(consulted)
			.into())
	}

	fn as_chain(&self) -> Option<&DestinationLoaderChain> {
		Some(self)
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;

	#[derive(Debug)]
	enum Outcome {
		NotFound,
		Access,
		Found,
	}

	#[derive(Debug)]
	struct Scripted {
		label: &'static str,
		outcome: Outcome,
		calls: AtomicUsize,
		order: Arc<Mutex<Vec<&'static str>>>,
	}
	impl Scripted {
		fn new(
			label: &'static str,
			outcome: Outcome,
			order: &Arc<Mutex<Vec<&'static str>>>,
		) -> Arc<Self> {
			Arc::new(Self { label, outcome, calls: AtomicUsize::new(0), order: order.clone() })
		}
	}
	impl DestinationLoader for Scripted {
		fn name(&self) -> &str {
			self.label
		}

		fn try_get_destination(
			&self,
			destination_name: &str,
			_: &DestinationOptions,
		) -> Result<Destination, LoadError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.order.lock().push(self.label);

			match self.outcome {
				Outcome::NotFound => Err(LoadError::not_found(Some(destination_name), "nothing")),
				Outcome::Access => Err(LoadError::access(format!("{} failed", self.label))),
				Outcome::Found => Ok(Destination::builder("https://found.example")
					.name(self.label)
					.build_unproxied()
					.map_err(LoadError::from)?),
			}
		}
	}

	#[test]
	fn not_found_continues_until_success() {
		let order = Arc::new(Mutex::new(Vec::new()));
		let a = Scripted::new("a", Outcome::NotFound, &order);
		let b = Scripted::new("b", Outcome::NotFound, &order);
		let c = Scripted::new("c", Outcome::Found, &order);
		let chain = DestinationLoaderChain::new([
			a.clone() as Arc<dyn DestinationLoader>,
			b.clone(),
			c.clone(),
		])
		.expect("Chain fixture should build.");
		let destination = chain
			.try_get_destination("any", &DestinationOptions::default())
			.expect("Last loader should resolve the destination.");

		assert_eq!(destination.name(), Some("c"));
		assert_eq!(*order.lock(), vec!["a", "b", "c"]);
		assert_eq!(c.calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn access_error_stops_the_chain() {
		let order = Arc::new(Mutex::new(Vec::new()));
		let a = Scripted::new("a", Outcome::Access, &order);
		let b = Scripted::new("b", Outcome::Found, &order);
		let chain = DestinationLoaderChain::new([a as Arc<dyn DestinationLoader>, b.clone()])
			.expect("Chain fixture should build.");
		let err = chain
			.try_get_destination("any", &DestinationOptions::default())
			.expect_err("Access errors must abort the chain.");

		assert!(matches!(&err, LoadError::Access(e) if e.message == "a failed"));
		assert_eq!(b.calls.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn exhausted_chain_lists_consulted_loaders() {
		let order = Arc::new(Mutex::new(Vec::new()));
		let chain = DestinationLoaderChain::new([
			Scripted::new("a", Outcome::NotFound, &order) as Arc<dyn DestinationLoader>,
			Scripted::new("b", Outcome::NotFound, &order),
		])
		.expect("Chain fixture should build.");

		match chain.try_get_destination("missing", &DestinationOptions::default()) {
			Err(LoadError::NotFound(e)) => {
				assert_eq!(e.name.as_deref(), Some("missing"));
				assert_eq!(e.consulted, vec!["a".to_owned(), "b".to_owned()]);
			},
			other => panic!("Expected a not-found outcome, got {other:?}."),
		}
	}

	#[test]
	fn composition_flattens_and_deduplicates() {
		let order = Arc::new(Mutex::new(Vec::new()));
		let y1: Arc<dyn DestinationLoader> = Scripted::new("y1", Outcome::NotFound, &order);
		let x1: Arc<dyn DestinationLoader> = Scripted::new("x1", Outcome::NotFound, &order);
		let x2: Arc<dyn DestinationLoader> = Scripted::new("x2", Outcome::NotFound, &order);
		let y = DestinationLoaderChain::new([y1.clone()]).expect("Chain fixture should build.");
		let x = DestinationLoaderChain::new([x1, x2]).expect("Chain fixture should build.");
		let combined = y.append(Arc::new(x));

		assert_eq!(combined.len(), 3);
		assert!(combined.loaders().iter().all(|loader| loader.as_chain().is_none()));
		assert_eq!(combined.append(y1.clone()).len(), 3, "Re-adding a member must be a no-op.");
		assert_eq!(combined.prepend(y1).len(), 3);
		assert!(matches!(
			DestinationLoaderChain::new(Vec::<Arc<dyn DestinationLoader>>::new()),
			Err(ConfigError::EmptyLoaderChain)
		));
	}
}
