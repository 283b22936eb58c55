//! Service-binding loader minting OAuth 2.0 destinations.

// std
use std::panic::{self, AssertUnwindSafe};
// crates.io
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::ClientIdentity,
	binding::{
		OAuth2Options, PropertySupplierRegistry, ProxyOptions, ResilienceOptions,
		ServiceBindingDestinationLoader, ServiceBindingDestinationOptions,
	},
	destination::{AuthenticationType, Destination, DestinationBuilder, keys},
	error::{DestinationAccessError, LoadError},
	resilience::ResilienceExecutor,
	token::{
		OAuth2HeaderProvider, OAuth2TokenProvider, TenantPropagationStrategy, TokenServiceCache,
	},
};

struct OAuth2Properties {
	service_uri: Url,
	token_uri: Url,
	identity: ClientIdentity,
	options: OAuth2Options,
}

/// Turns a binding into a destination whose `Authorization` header carries a fresh token.
///
/// The supplier comes from the [`PropertySupplierRegistry`]. With [`ProxyOptions`], the given
/// destination is routed through the bound service instead: it gets the service URI as proxy
/// (unless one is set) and a `Proxy-Authorization` provider.
#[derive(Clone, Debug)]
pub struct OAuth2ServiceBindingLoader {
	registry: Arc<PropertySupplierRegistry>,
	token_services: Option<Arc<TokenServiceCache>>,
	executor: Option<Arc<dyn ResilienceExecutor>>,
}
impl OAuth2ServiceBindingLoader {
	/// Creates a loader selecting suppliers from `registry`.
	pub fn new(registry: Arc<PropertySupplierRegistry>) -> Self {
		Self { registry, token_services: None, executor: None }
	}

	/// Loader over the process-wide registry, cache and executor.
	pub fn global() -> Arc<Self> {
		static GLOBAL: LazyLock<Arc<OAuth2ServiceBindingLoader>> = LazyLock::new(|| {
			Arc::new(OAuth2ServiceBindingLoader::new(PropertySupplierRegistry::global()))
		});

		GLOBAL.clone()
	}

	/// Uses `cache` for token services.
	pub fn with_token_services(mut self, cache: Arc<TokenServiceCache>) -> Self {
		self.token_services = Some(cache);

		self
	}

	/// Uses `executor` around token retrievals.
	pub fn with_resilience_executor(mut self, executor: Arc<dyn ResilienceExecutor>) -> Self {
		self.executor = Some(executor);

		self
	}

	/// Supplier registry.
	pub fn registry(&self) -> &Arc<PropertySupplierRegistry> {
		&self.registry
	}

	fn properties(
		&self,
		options: &ServiceBindingDestinationOptions,
		service: &str,
	) -> Result<OAuth2Properties, LoadError> {
		let supplier = self.registry.select(options)?;
		let extracted = panic::catch_unwind(AssertUnwindSafe(|| {
			Ok::<_, DestinationAccessError>(OAuth2Properties {
				service_uri: supplier.service_uri()?,
				token_uri: supplier.token_uri()?,
				identity: supplier.client_identity()?,
				options: supplier.oauth2_options()?,
			})
		}));

		match extracted {
			Ok(properties) => Ok(properties?),
			Err(_) => Err(LoadError::access(format!(
				"Failed to retrieve OAuth2 properties for service binding of service '{service}'."
			))),
		}
	}

	fn token_provider(
		&self,
		options: &ServiceBindingDestinationOptions,
		properties: &OAuth2Properties,
	) -> Arc<OAuth2TokenProvider> {
		let OAuth2Properties { token_uri, identity, options: oauth, .. } = properties;
		let host = token_uri.host_str().unwrap_or_default();
		let mut resilience = options
			.option::<ResilienceOptions>()
			.cloned()
			.unwrap_or_default()
			.configuration(format!("{host}-{}", identity.id()));

		if let Some(timeout) = oauth.timeout {
			resilience = resilience.with_timeout(Some(timeout));
		}

		let mut builder = OAuth2TokenProvider::builder(token_uri.clone(), identity.clone())
			.on_behalf_of(options.on_behalf_of())
			.tenant_propagation(TenantPropagationStrategy::for_service(
				options.service_binding().service_identifier(),
			))
			.parameters(oauth.additional_parameters.clone())
			.resilience(resilience);

		if let Some(window) = oauth.refresh_window {
			builder = builder.refresh_window(window);
		}
		if let Some(cache) = &self.token_services {
			builder = builder.token_services(cache.clone());
		}
		if let Some(executor) = &self.executor {
			builder = builder.executor(executor.clone());
		}

		Arc::new(builder.build())
	}

	fn proxied(
		proxied: &Destination,
		properties: &OAuth2Properties,
		provider: Option<Arc<OAuth2TokenProvider>>,
	) -> DestinationBuilder {
		let mut builder = proxied.to_builder();

		if builder.get(keys::PROXY_URI).is_none() && builder.get(keys::PROXY_HOST).is_none() {
			builder = builder.proxy(&properties.service_uri);
		}
		if let Some(provider) = provider {
			let header = OAuth2HeaderProvider::proxy_authorization(provider);

			builder = builder.header_provider(Arc::new(header));
		}

		builder
	}

	fn direct(
		service: &str,
		properties: &OAuth2Properties,
		provider: Option<Arc<OAuth2TokenProvider>>,
	) -> DestinationBuilder {
		let mut builder = Destination::builder(properties.service_uri.as_str())
			.name(format!("{service}-{}", short_digest(properties.identity.id())));

		builder = match provider {
			Some(provider) => builder
				.authentication_type(AuthenticationType::OAuth2)
				.header_provider(Arc::new(OAuth2HeaderProvider::authorization(provider))),
			None => builder.authentication_type(AuthenticationType::NoAuthentication),
		};

		if let Some(key_store) = &properties.options.client_key_store {
			builder = builder.key_store(key_store.clone());
		}

		builder
	}
}
impl ServiceBindingDestinationLoader for OAuth2ServiceBindingLoader {
	fn name(&self) -> &str {
		"oauth2"
	}

	fn try_get_destination(
		&self,
		options: &ServiceBindingDestinationOptions,
	) -> Result<Destination, LoadError> {
		let service = options
			.service_binding()
			.service_identifier()
			.map_or_else(|| "unknown".to_owned(), ToString::to_string);

		tracing::debug!(service = %service, "Creating an OAuth2 destination.");

		let properties = self.properties(options, &service)?;
		let provider = (!properties.options.skip_token_retrieval)
			.then(|| self.token_provider(options, &properties));
		let builder = match options.option::<ProxyOptions>() {
			Some(ProxyOptions(proxied)) => {
				tracing::debug!(
					service = %service,
					destination = proxied.name().unwrap_or_default(),
					"Routing destination through the bound service."
				);

				Self::proxied(proxied, &properties, provider)
			},
			None => Self::direct(&service, &properties, provider),
		};

		builder.build_unproxied().map_err(|e| {
			DestinationAccessError::with_source(
				"Failed to instantiate OAuth destination based on given properties.",
				e,
			)
			.into()
		})
	}
}

fn short_digest(value: &str) -> String {
	Sha256::digest(value.as_bytes())[..4].iter().map(|b| format!("{b:02x}")).collect()
}
