//! Immutable connection descriptors and their copy-on-write builder.
//!
//! A [`Destination`] is a case-insensitive property bag plus static headers, header providers and
//! optional mTLS material. [`Destination::headers`] assembles the headers for one request in a
//! fixed order: static headers, provider headers, `URL.headers.*` properties, authentication-type
//! headers (only when no `Authorization` header exists yet), and the `ProxyAuthorization` property
//! (only when no `Proxy-Authorization` header exists yet).

pub mod header;
pub mod options;
pub mod property;

pub use header::*;
pub use options::*;
pub use property::*;

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
// self
use crate::{
	_prelude::*,
	auth::{KeyStore, TokenSecret},
	context,
	error::ConfigError,
	proxy::ProxyHandler,
};

/// User name and password for basic authentication.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BasicCredentials {
	/// User name.
	pub user: String,
	/// Password.
	pub password: TokenSecret,
}
impl BasicCredentials {
	/// Value of an `Authorization: Basic …` header.
	pub fn header_value(&self) -> String {
		format!("Basic {}", STANDARD.encode(format!("{}:{}", self.user, self.password.expose())))
	}
}

/// Resolved connection descriptor. Build one with [`Destination::builder`].
#[derive(Clone)]
pub struct Destination {
	uri: Url,
	properties: DestinationProperties,
	headers: Vec<Header>,
	header_providers: Vec<Arc<dyn HeaderProvider>>,
	key_store: Option<Arc<KeyStore>>,
}
impl Destination {
	/// Starts a builder targeting `uri`.
	pub fn builder(uri: impl AsRef<str>) -> DestinationBuilder {
		DestinationBuilder::default().property(keys::URI, uri.as_ref())
	}

	/// Copies this destination into a new builder.
	pub fn to_builder(&self) -> DestinationBuilder {
		DestinationBuilder {
			properties: self.properties.clone(),
			headers: self.headers.clone(),
			header_providers: self.header_providers.clone(),
			key_store: self.key_store.clone(),
		}
	}

	/// Destination name, if set.
	pub fn name(&self) -> Option<&str> {
		self.properties.get(keys::NAME)
	}

	/// Target URI.
	pub fn uri(&self) -> &Url {
		&self.uri
	}

	/// Raw property lookup, ignoring key case.
	pub fn property(&self, key: &str) -> Option<&str> {
		self.properties.get(key)
	}

	/// All properties.
	pub fn properties(&self) -> &DestinationProperties {
		&self.properties
	}

	/// Authentication type; derived from the credentials when no explicit type is set.
	pub fn authentication_type(&self) -> AuthenticationType {
		authentication_type_of(&self.properties)
	}

	/// Basic credentials from `User` (or `username`) and `Password`.
	pub fn basic_credentials(&self) -> Option<BasicCredentials> {
		basic_credentials_of(&self.properties)
	}

	/// Proxy type; `Internet` when absent or unrecognized.
	pub fn proxy_type(&self) -> ProxyType {
		proxy_type_of(&self.properties)
	}

	/// Proxy URI from `Proxy`, or from `ProxyHost` plus `ProxyPort`.
	pub fn proxy_uri(&self) -> Option<Url> {
		if let Some(uri) = self.properties.get(keys::PROXY_URI) {
			return Url::parse(uri).ok();
		}

		let host = self.properties.get(keys::PROXY_HOST)?;
		let port = self.properties.get(keys::PROXY_PORT)?.trim().parse::<u16>().ok()?;

		Url::parse(&format!("http://{host}:{port}")).ok()
	}

	/// Tenant the destination belongs to; empty for the provider tenant.
	pub fn tenant_id(&self) -> Option<&str> {
		self.properties.get(keys::TENANT_ID)
	}

	/// Principal propagation mode, if configured and recognized.
	pub fn principal_propagation_mode(&self) -> Option<PrincipalPropagationMode> {
		self.properties
			.get(keys::PRINCIPAL_PROPAGATION_MODE)
			.and_then(PrincipalPropagationMode::parse)
	}

	/// Cloud connector location id.
	pub fn cloud_connector_location_id(&self) -> Option<&str> {
		self.properties.get(keys::CLOUD_CONNECTOR_LOCATION_ID)
	}

	/// Client key store for mTLS towards the target.
	pub fn key_store(&self) -> Option<&KeyStore> {
		self.key_store.as_deref()
	}

	/// Static headers added through the builder.
	pub fn static_headers(&self) -> &[Header] {
		&self.headers
	}

	/// Attached header providers, in attachment order.
	pub fn header_providers(&self) -> &[Arc<dyn HeaderProvider>] {
		&self.header_providers
	}

	/// Returns `true` when a provider with `key` is attached.
	pub fn has_header_provider(&self, key: &str) -> bool {
		self.header_providers.iter().any(|provider| provider.provider_key() == key)
	}

	/// Assembles the headers for a request to `request_uri`.
	pub async fn headers(&self, request_uri: &Url) -> Result<Vec<Header>> {
		let mut all = self.headers.clone();
		let ctx = RequestContext { destination: self, request_uri };

		for provider in &self.header_providers {
			all.extend(provider.headers(ctx).await?);
		}

		all.extend(self.property_headers());

		if !all.iter().any(|header| header.is(AUTHORIZATION)) {
			all.extend(self.authentication_headers());
		}
		if !all.iter().any(|header| header.is(PROXY_AUTHORIZATION))
			&& let Some(value) = self.properties.get(keys::PROXY_AUTH)
		{
			all.push(Header::new(PROXY_AUTHORIZATION, value));
		}

		tracing::debug!(
			destination = self.name().unwrap_or_default(),
			providers = self.header_providers.len(),
			headers = all.len(),
			"Assembled destination headers."
		);

		Ok(all)
	}

	fn provider_keys(&self) -> impl Iterator<Item = &str> {
		self.header_providers.iter().map(|provider| provider.provider_key())
	}

	fn property_headers(&self) -> impl Iterator<Item = Header> + '_ {
		let prefix = keys::HEADER_PREFIX;

		self.properties.iter().filter_map(move |(key, value)| {
			key.get(..prefix.len())
				.filter(|head| head.eq_ignore_ascii_case(prefix))
				.and_then(|_| key.get(prefix.len()..))
				.filter(|name| !name.is_empty())
				.map(|name| Header::new(name, value))
		})
	}

	fn authentication_headers(&self) -> Vec<Header> {
		match self.authentication_type() {
			AuthenticationType::BasicAuthentication => match self.basic_credentials() {
				Some(credentials) => vec![Header::new(AUTHORIZATION, credentials.header_value())],
				None => {
					tracing::warn!(
						"Basic authentication is configured but no credentials are available."
					);

					Vec::new()
				},
			},
			AuthenticationType::TokenForwarding => {
				let forwarded = context::request_headers()
					.try_get_current()
					.map(|headers| {
						headers
							.get_all(AUTHORIZATION)
							.map(|value| Header::new(AUTHORIZATION, value))
							.collect::<Vec<_>>()
					})
					.unwrap_or_default();

				if forwarded.is_empty() {
					tracing::warn!(
						"Token forwarding is configured but the inbound request carries no Authorization header."
					);
				}

				forwarded
			},
			_ => Vec::new(),
		}
	}
}
impl PartialEq for Destination {
	fn eq(&self, other: &Self) -> bool {
		self.properties == other.properties
			&& self.headers == other.headers
			&& self.key_store == other.key_store
			&& self.provider_keys().eq(other.provider_keys())
	}
}
impl Eq for Destination {}
impl Hash for Destination {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.properties.hash(state);
		self.headers.hash(state);
		self.key_store.hash(state);

		for key in self.provider_keys() {
			key.hash(state);
		}
	}
}
impl Debug for Destination {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Destination")
			.field("uri", &self.uri.as_str())
			.field("properties", &self.properties)
			.field("headers", &self.headers)
			.field("header_providers", &self.provider_keys().collect::<Vec<_>>())
			.field("key_store", &self.key_store)
			.finish()
	}
}

/// Copy-on-write builder for [`Destination`].
#[derive(Clone, Debug, Default)]
pub struct DestinationBuilder {
	properties: DestinationProperties,
	headers: Vec<Header>,
	header_providers: Vec<Arc<dyn HeaderProvider>>,
	key_store: Option<Arc<KeyStore>>,
}
impl DestinationBuilder {
	/// Sets a property, replacing any value stored under the same key (ignoring case).
	pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.properties.insert(key, value);

		self
	}

	/// Removes a property.
	pub fn remove_property(mut self, key: &str) -> Self {
		self.properties.remove(key);

		self
	}

	/// Reads a property staged on the builder.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.properties.get(key)
	}

	/// Sets the destination name.
	pub fn name(self, name: impl Into<String>) -> Self {
		self.property(keys::NAME, name)
	}

	/// Sets the target URI.
	pub fn uri(self, uri: &Url) -> Self {
		self.property(keys::URI, uri.as_str())
	}

	/// Sets the authentication type.
	pub fn authentication_type(self, kind: AuthenticationType) -> Self {
		self.property(keys::AUTH_TYPE, kind.as_str())
	}

	/// Sets basic credentials and switches the authentication type to basic.
	pub fn basic_credentials(self, user: impl Into<String>, password: impl Into<String>) -> Self {
		self.property(keys::USER, user)
			.property(keys::PASSWORD, password)
			.authentication_type(AuthenticationType::BasicAuthentication)
	}

	/// Sets the proxy type.
	pub fn proxy_type(self, kind: ProxyType) -> Self {
		self.property(keys::PROXY_TYPE, kind.as_str())
	}

	/// Sets the proxy URI.
	pub fn proxy(self, uri: &Url) -> Self {
		self.property(keys::PROXY_URI, uri.as_str())
	}

	/// Sets a pre-computed `Proxy-Authorization` value.
	pub fn proxy_authorization(self, value: impl Into<String>) -> Self {
		self.property(keys::PROXY_AUTH, value)
	}

	/// Sets the principal propagation mode.
	pub fn principal_propagation_mode(self, mode: PrincipalPropagationMode) -> Self {
		self.property(keys::PRINCIPAL_PROPAGATION_MODE, mode.as_str())
	}

	/// Sets the tenant id property; pass `""` for the provider tenant.
	pub fn tenant_id(self, tenant_id: impl Into<String>) -> Self {
		self.property(keys::TENANT_ID, tenant_id)
	}

	/// Sets the cloud connector location id.
	pub fn cloud_connector_location_id(self, location_id: impl Into<String>) -> Self {
		self.property(keys::CLOUD_CONNECTOR_LOCATION_ID, location_id)
	}

	/// Adds a static header.
	pub fn header(mut self, header: Header) -> Self {
		self.headers.push(header);

		self
	}

	/// Attaches a header provider, replacing one with the same key.
	pub fn header_provider(mut self, provider: Arc<dyn HeaderProvider>) -> Self {
		match self
			.header_providers
			.iter()
			.position(|existing| existing.provider_key() == provider.provider_key())
		{
			Some(index) => self.header_providers[index] = provider,
			None => self.header_providers.push(provider),
		}

		self
	}

	/// Sets the mTLS key store.
	pub fn key_store(mut self, key_store: KeyStore) -> Self {
		self.key_store = Some(Arc::new(key_store));

		self
	}

	/// Authentication type staged on the builder.
	pub fn staged_authentication_type(&self) -> AuthenticationType {
		authentication_type_of(&self.properties)
	}

	/// Basic credentials staged on the builder.
	pub fn staged_basic_credentials(&self) -> Option<BasicCredentials> {
		basic_credentials_of(&self.properties)
	}

	/// Builds the destination; on-premise destinations go through the global [`ProxyHandler`].
	pub fn build(self) -> Result<Destination> {
		self.build_with(ProxyHandler::global())
	}

	/// Builds the destination with an explicit proxy handler for on-premise destinations.
	pub fn build_with(self, handler: &ProxyHandler) -> Result<Destination> {
		if proxy_type_of(&self.properties) == ProxyType::OnPremise {
			return handler.handle(self);
		}

		self.build_unproxied()
	}

	/// Builds the destination without on-premise proxy handling.
	pub fn build_unproxied(self) -> Result<Destination> {
		let raw = self
			.properties
			.get(keys::URI)
			.filter(|uri| !uri.trim().is_empty())
			.ok_or(ConfigError::MissingProperty { property: keys::URI })?;
		let uri = Url::parse(raw.trim()).map_err(|e| ConfigError::invalid_url(raw, e))?;
		let mut properties = self.properties;

		properties.insert(keys::TYPE, "HTTP");

		Ok(Destination {
			uri,
			properties,
			headers: self.headers,
			header_providers: self.header_providers,
			key_store: self.key_store,
		})
	}
}

fn authentication_type_of(properties: &DestinationProperties) -> AuthenticationType {
	properties
		.get(keys::AUTH_TYPE)
		.or_else(|| properties.get(keys::AUTH_TYPE_FALLBACK))
		.and_then(AuthenticationType::parse)
		.unwrap_or_else(|| {
			if basic_credentials_of(properties).is_some() {
				AuthenticationType::BasicAuthentication
			} else {
				AuthenticationType::NoAuthentication
			}
		})
}

fn basic_credentials_of(properties: &DestinationProperties) -> Option<BasicCredentials> {
	let user = properties.get(keys::USER).or_else(|| properties.get(keys::USER_FALLBACK))?;
	let password = properties.get(keys::PASSWORD)?;

	Some(BasicCredentials { user: user.to_owned(), password: TokenSecret::new(password) })
}

fn proxy_type_of(properties: &DestinationProperties) -> ProxyType {
	properties.get(keys::PROXY_TYPE).and_then(ProxyType::parse).unwrap_or_default()
}
