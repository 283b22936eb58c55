//! Holder of the active destination loader chain.

// self
use crate::{
	_prelude::*,
	destination::{Destination, DestinationOptions},
	loader::{DestinationLoader, DestinationLoaderChain, EnvVarDestinationLoader},
};

static GLOBAL: LazyLock<DestinationAccessor> = LazyLock::new(DestinationAccessor::default);

/// Builds the chain installed when no loader is configured.
pub type DefaultChainFactory = Arc<dyn Fn() -> DestinationLoaderChain + Send + Sync>;

/// Registry object holding the active [`DestinationLoaderChain`].
///
/// Reads take a snapshot of the chain so lookups never observe a half-applied administrative
/// change. `set_loader(None)` restores the default chain.
pub struct DestinationAccessor {
	chain: RwLock<DestinationLoaderChain>,
	default_chain: DefaultChainFactory,
}
impl DestinationAccessor {
	/// Process-wide accessor.
	pub fn global() -> &'static Self {
		&GLOBAL
	}

	/// Creates an accessor whose default chain is produced by `default_chain`.
	pub fn with_default_chain(default_chain: DefaultChainFactory) -> Self {
		Self { chain: RwLock::new(default_chain()), default_chain }
	}

	/// Snapshot of the active chain.
	pub fn loader(&self) -> DestinationLoaderChain {
		self.chain.read().clone()
	}

	/// Replaces the active chain; `None` restores the default chain.
	pub fn set_loader(&self, loader: Option<Arc<dyn DestinationLoader>>) {
		let chain = match loader {
			Some(loader) => DestinationLoaderChain::from_loader(loader),
			None => {
				tracing::warn!("Destination loader reset to the default chain.");

				(self.default_chain)()
			},
		};

		*self.chain.write() = chain;
	}

	/// Appends `loader` (or its members) to the active chain.
	pub fn append_loader(&self, loader: Arc<dyn DestinationLoader>) {
		let mut chain = self.chain.write();

		*chain = chain.append(loader);
	}

	/// Prepends `loader` (or its members) to the active chain.
	pub fn prepend_loader(&self, loader: Arc<dyn DestinationLoader>) {
		let mut chain = self.chain.write();

		*chain = chain.prepend(loader);
	}

	/// Resolves `name` with default options.
	pub fn try_get_destination(&self, name: &str) -> Result<Destination> {
		self.try_get_destination_with(name, &DestinationOptions::default())
	}

	/// Resolves `name` with explicit options.
	pub fn try_get_destination_with(
		&self,
		name: &str,
		options: &DestinationOptions,
	) -> Result<Destination> {
		let chain = self.loader();

		Ok(chain.try_get_destination(name, options)?)
	}
}
impl Default for DestinationAccessor {
	fn default() -> Self {
		Self::with_default_chain(Arc::new(|| {
			DestinationLoaderChain::from_loader(Arc::new(EnvVarDestinationLoader::default()))
		}))
	}
}
impl Debug for DestinationAccessor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DestinationAccessor").field("chain", &*self.chain.read()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::loader::InMemoryDestinationLoader;

	fn memory_with(name: &str, uri: &str) -> Arc<InMemoryDestinationLoader> {
		let loader = Arc::new(InMemoryDestinationLoader::default());

		loader
			.register(
				Destination::builder(uri)
					.name(name)
					.build_unproxied()
					.expect("Destination fixture should build."),
			)
			.expect("Named destination should register.");

		loader
	}

	fn isolated() -> DestinationAccessor {
		DestinationAccessor::with_default_chain(Arc::new(|| {
			DestinationLoaderChain::from_loader(Arc::new(InMemoryDestinationLoader::default()))
		}))
	}

	#[test]
	fn prepended_loaders_win_and_reset_restores_default() {
		let accessor = isolated();

		accessor.append_loader(memory_with("a", "https://appended.example"));
		accessor.prepend_loader(memory_with("a", "https://prepended.example"));

		let destination = accessor.try_get_destination("a").expect("Destination should resolve.");

		assert_eq!(destination.uri().host_str(), Some("prepended.example"));
		assert_eq!(accessor.loader().len(), 3);

		accessor.set_loader(None);

		assert_eq!(accessor.loader().len(), 1);
		assert!(matches!(accessor.try_get_destination("a"), Err(Error::NotFound(_))));
	}

	#[test]
	fn set_loader_flattens_chains() {
		let accessor = isolated();
		let chain = DestinationLoaderChain::new([
			memory_with("a", "https://a.example") as Arc<dyn DestinationLoader>,
			memory_with("b", "https://b.example"),
		])
		.expect("Chain fixture should build.");

		accessor.set_loader(Some(Arc::new(chain)));

		assert_eq!(accessor.loader().len(), 2);
		assert!(accessor.try_get_destination("b").is_ok());
	}
}
