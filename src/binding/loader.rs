//! Loaders turning service-binding requests into destinations.

// self
use crate::{
	_prelude::*,
	binding::{
		IdentityAuthenticationLoader, OAuth2ServiceBindingLoader, ServiceBindingDestinationOptions,
	},
	destination::Destination,
	error::{ConfigError, DestinationNotFound, LoadError},
};

/// Resolves a destination from a service binding.
///
/// Answers like a name-based loader: a destination, [`LoadError::NotFound`] to let the next
/// loader try, or [`LoadError::Access`] to abort.
pub trait ServiceBindingDestinationLoader
where
	Self: Debug + Send + Sync,
{
	/// Label used in diagnostics.
	fn name(&self) -> &str;

	/// Resolves `options`.
	fn try_get_destination(
		&self,
		options: &ServiceBindingDestinationOptions,
	) -> Result<Destination, LoadError>;
}

/// Ordered, non-empty list of service-binding loaders; the first definitive answer wins.
#[derive(Clone, Debug)]
pub struct ServiceBindingLoaderChain {
	loaders: Vec<Arc<dyn ServiceBindingDestinationLoader>>,
}
impl ServiceBindingLoaderChain {
	/// Builds a chain; an empty list is rejected.
	pub fn new<I>(loaders: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = Arc<dyn ServiceBindingDestinationLoader>>,
	{
		let loaders = loaders.into_iter().collect::<Vec<_>>();

		if loaders.is_empty() {
			return Err(ConfigError::EmptyLoaderChain);
		}

		Ok(Self { loaders })
	}

	/// Process-wide chain: identity-service rewriting, then the OAuth 2.0 loader.
	pub fn global() -> Arc<Self> {
		static GLOBAL: LazyLock<Arc<ServiceBindingLoaderChain>> = LazyLock::new(|| {
			let oauth2: Arc<dyn ServiceBindingDestinationLoader> =
				OAuth2ServiceBindingLoader::global();
			let ias: Arc<dyn ServiceBindingDestinationLoader> =
				Arc::new(IdentityAuthenticationLoader::new(oauth2.clone()));

			Arc::new(ServiceBindingLoaderChain { loaders: vec![ias, oauth2] })
		});

		GLOBAL.clone()
	}

	/// Members in evaluation order.
	pub fn loaders(&self) -> &[Arc<dyn ServiceBindingDestinationLoader>] {
		&self.loaders
	}
}
impl ServiceBindingDestinationLoader for ServiceBindingLoaderChain {
	fn name(&self) -> &str {
		"service-binding-chain"
	}

	fn try_get_destination(
		&self,
		options: &ServiceBindingDestinationOptions,
	) -> Result<Destination, LoadError> {
		let mut consulted = Vec::with_capacity(self.loaders.len());

		for loader in &self.loaders {
			consulted.push(loader.name().to_owned());

			match loader.try_get_destination(options) {
				Err(LoadError::NotFound(e)) => tracing::debug!(
					loader = loader.name(),
					reason = %e,
					"Loader does not handle the service binding; trying the next one."
				),
				outcome => return outcome,
			}
		}

		let service = options
			.service_binding()
			.service_identifier()
			.map_or_else(|| "<unknown>".to_owned(), ToString::to_string);

		Err(DestinationNotFound::new(
			None,
			format!("No loader created a destination for service binding of service '{service}'."),
		)
		.with_consulted(consulted)
		.into())
	}
}
