//! On-premise proxy handling: picks the proxy-hop identity and attaches connectivity headers.
//!
//! | Authentication         | Mode            | Tenant id | Acts as                        |
//! |------------------------|-----------------|-----------|--------------------------------|
//! | `PrincipalPropagation` | `RECOMMENDED`   | any       | named user, current tenant     |
//! | `PrincipalPropagation` | `COMPATIBILITY` | any       | technical user, current tenant |
//! | anything else          |                 | `""`      | technical user, provider       |
//! | anything else          |                 | otherwise | technical user, current tenant |
//!
//! An unset mode means `COMPATIBILITY`; any other value is rejected. In compatibility mode the
//! ambient user token travels in `SAP-Connectivity-Authentication`.

// self
use crate::{
	_prelude::*,
	binding::{
		EnvServiceBindingAccessor, ProxyOptions, ServiceBinding, ServiceBindingAccessor,
		ServiceBindingDestinationLoader, ServiceBindingDestinationOptions,
		ServiceBindingLoaderChain, ServiceIdentifier,
	},
	context,
	destination::{
		AUTHORIZATION, AuthenticationType, Destination, DestinationBuilder, Header, HeaderFuture,
		HeaderProvider, PrincipalPropagationMode, RequestContext, StaticHeaderProvider, keys,
	},
	error::{DestinationAccessError, LoadError},
	token::OnBehalfOf,
};

/// Header naming the cloud connector that serves the request.
pub const LOCATION_ID_HEADER: &str = "SAP-Connectivity-SCC-Location_ID";
/// Header forwarding the end-user token in compatibility mode.
pub const CONNECTIVITY_AUTHENTICATION_HEADER: &str = "SAP-Connectivity-Authentication";

const BASIC_AUTHORIZATION_KEY: &str = "connectivity:Authorization";

/// Adds [`LOCATION_ID_HEADER`] when the destination names a cloud connector location.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocationIdHeaderProvider;
impl LocationIdHeaderProvider {
	/// Provider key.
	pub const KEY: &'static str = "connectivity:location-id";
}
impl HeaderProvider for LocationIdHeaderProvider {
	fn provider_key(&self) -> &str {
		Self::KEY
	}

	fn headers<'a>(&'a self, ctx: RequestContext<'a>) -> HeaderFuture<'a> {
		let headers = ctx
			.destination
			.cloud_connector_location_id()
			.map(|location| Header::new(LOCATION_ID_HEADER, location))
			.into_iter()
			.collect();

		Box::pin(async move { Ok(headers) })
	}
}

/// Forwards the ambient user token as [`CONNECTIVITY_AUTHENTICATION_HEADER`].
///
/// A missing user token fails the header computation.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConnectivityAuthenticationHeaderProvider;
impl ConnectivityAuthenticationHeaderProvider {
	/// Provider key.
	pub const KEY: &'static str = "connectivity:authentication";
}
impl HeaderProvider for ConnectivityAuthenticationHeaderProvider {
	fn provider_key(&self) -> &str {
		Self::KEY
	}

	fn headers<'a>(&'a self, _: RequestContext<'a>) -> HeaderFuture<'a> {
		let headers = context::auth_token()
			.get_current()
			.map(|token| {
				vec![Header::new(
					CONNECTIVITY_AUTHENTICATION_HEADER,
					format!("Bearer {}", token.token().expose()),
				)]
			})
			.map_err(Error::from);

		Box::pin(async move { headers })
	}
}

/// Routes on-premise destinations through the connectivity service.
///
/// The connectivity binding is either set explicitly or looked up once through the accessor; the
/// proxied destination is produced by the service-binding loader with [`ProxyOptions`].
#[derive(Debug)]
pub struct ProxyHandler {
	connectivity: RwLock<Option<ServiceBinding>>,
	accessor: Arc<dyn ServiceBindingAccessor>,
	loader: Arc<dyn ServiceBindingDestinationLoader>,
}
impl ProxyHandler {
	/// Handler reading bindings from `VCAP_SERVICES` and using the global loader chain.
	pub fn new() -> Self {
		Self {
			connectivity: RwLock::new(None),
			accessor: Arc::new(EnvServiceBindingAccessor::default()),
			loader: ServiceBindingLoaderChain::global(),
		}
	}

	/// Process-wide handler used by [`DestinationBuilder::build`].
	pub fn global() -> &'static Self {
		static GLOBAL: LazyLock<ProxyHandler> = LazyLock::new(ProxyHandler::new);

		&GLOBAL
	}

	/// Uses `binding` as the connectivity binding instead of looking one up.
	pub fn with_connectivity_binding(self, binding: ServiceBinding) -> Self {
		*self.connectivity.write() = Some(binding);

		self
	}

	/// Looks the connectivity binding up through `accessor`.
	pub fn with_service_binding_accessor(
		mut self,
		accessor: Arc<dyn ServiceBindingAccessor>,
	) -> Self {
		self.accessor = accessor;

		self
	}

	/// Delegates proxying to `loader`.
	pub fn with_loader(mut self, loader: Arc<dyn ServiceBindingDestinationLoader>) -> Self {
		self.loader = loader;

		self
	}

	/// Builds `builder` as a destination proxied through the connectivity service.
	pub fn handle(&self, builder: DestinationBuilder) -> Result<Destination> {
		let builder = builder.header_provider(Arc::new(LocationIdHeaderProvider));
		let connectivity = self.connectivity_binding()?.ok_or_else(|| {
			DestinationAccessError::new("Unable to resolve connectivity service binding.")
		})?;
		let (behalf, builder) = Self::derive_on_behalf_of(builder)?;
		let destination = builder.build_unproxied()?;

		tracing::debug!(
			destination = destination.name().unwrap_or_default(),
			behalf = ?behalf,
			"Proxying on-premise destination through the connectivity service."
		);

		let options = ServiceBindingDestinationOptions::for_service(connectivity)
			.on_behalf_of(behalf)
			.with_option(ProxyOptions(destination))?
			.build();

		self.loader.try_get_destination(&options).map_err(|e| match e {
			LoadError::NotFound(e) => DestinationAccessError::with_source(
				"Connectivity service binding could not proxy the destination.",
				e,
			)
			.into(),
			LoadError::Access(e) => e.into(),
		})
	}

	fn derive_on_behalf_of(
		builder: DestinationBuilder,
	) -> Result<(OnBehalfOf, DestinationBuilder), DestinationAccessError> {
		if builder.staged_authentication_type() == AuthenticationType::PrincipalPropagation {
			let mode = match builder.get(keys::PRINCIPAL_PROPAGATION_MODE) {
				None => PrincipalPropagationMode::default(),
				Some(raw) => PrincipalPropagationMode::parse(raw).ok_or_else(|| {
					DestinationAccessError::new(format!(
						"Unsupported principal propagation mode `{raw}`."
					))
				})?,
			};

			return Ok(match mode {
				PrincipalPropagationMode::Recommended =>
					(OnBehalfOf::NamedUserCurrentTenant, builder),
				PrincipalPropagationMode::Compatibility => (
					OnBehalfOf::TechnicalUserCurrentTenant,
					builder.header_provider(Arc::new(ConnectivityAuthenticationHeaderProvider)),
				),
			});
		}

		let builder = match builder.staged_basic_credentials() {
			Some(credentials)
				if builder.staged_authentication_type()
					== AuthenticationType::BasicAuthentication =>
			{
				let header = Header::new(AUTHORIZATION, credentials.header_value());

				builder.header_provider(Arc::new(StaticHeaderProvider::new(
					BASIC_AUTHORIZATION_KEY,
					vec![header],
				)))
			},
			_ => builder,
		};
		let behalf = match builder.get(keys::TENANT_ID) {
			Some("") => OnBehalfOf::TechnicalUserProvider,
			_ => OnBehalfOf::TechnicalUserCurrentTenant,
		};

		Ok((behalf, builder))
	}

	fn connectivity_binding(&self) -> Result<Option<ServiceBinding>> {
		if let Some(binding) = self.connectivity.read().clone() {
			return Ok(Some(binding));
		}

		let mut matching = self
			.accessor
			.service_bindings()?
			.into_iter()
			.filter(|binding| {
				binding.service_identifier() == Some(&ServiceIdentifier::CONNECTIVITY)
			})
			.collect::<Vec<_>>();

		match matching.len() {
			0 => {
				tracing::debug!("No service bindings found matching the connectivity service.");

				Ok(None)
			},
			1 => {
				let binding = matching.pop();

				self.connectivity.write().clone_from(&binding);

				Ok(binding)
			},
			found => {
				tracing::debug!(
					found,
					"More than one service binding matches the connectivity service."
				);

				Ok(None)
			},
		}
	}
}
impl Default for ProxyHandler {
	fn default() -> Self {
		Self::new()
	}
}
