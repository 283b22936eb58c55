//! Built-in property suppliers for the platform services.

// self
use crate::{
	_prelude::*,
	auth::ClientIdentity,
	binding::{
		IasOptions, OAuth2Options, OAuth2PropertySupplier, ServiceBindingDestinationOptions,
		ServiceIdentifier, TypedCredentials,
		credentials::missing,
		supplier::{SupplierEntry, boxed_factory},
	},
	context,
	error::DestinationAccessError,
	token::OnBehalfOf,
};

const IDENTITY_TOKEN_PATH: &str = "oauth2/token";
const APPLICATION_RESOURCE: &str = "urn:sap:identity:application:provider:name";
const CONSUMER_RESOURCE: &str = "urn:sap:identity:consumer:clientid";

/// How a binding authenticates its client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CredentialType {
	/// Secret issued per binding.
	#[default]
	BindingSecret,
	/// Secret shared by the service instance.
	InstanceSecret,
	/// X.509 client certificate.
	X509,
}
impl CredentialType {
	fn parse(raw: &str) -> Self {
		let raw = raw.trim().to_ascii_lowercase();

		if raw.starts_with("x509") {
			Self::X509
		} else if raw == "instance-secret" {
			Self::InstanceSecret
		} else {
			Self::BindingSecret
		}
	}
}

/// Supplier reading OAuth fields from a configurable credentials path.
///
/// The service URI is read from `url` at the credentials root. OAuth fields (`clientid`,
/// `clientsecret`, `url`, `certurl`, `certificate`, `key`, `credential-type`) are read below the
/// OAuth path, `["uaa"]` by default. X.509 credentials use `certurl` as the token endpoint.
#[derive(Clone, Debug)]
pub struct DefaultOAuth2PropertySupplier {
	options: ServiceBindingDestinationOptions,
	oauth_path: Vec<String>,
	service_uri_property: String,
}
impl DefaultOAuth2PropertySupplier {
	/// Default OAuth path.
	pub const DEFAULT_OAUTH_PATH: &[&str] = &["uaa"];

	/// Creates a supplier for `options`.
	pub fn new(options: &ServiceBindingDestinationOptions) -> Self {
		Self {
			options: options.clone(),
			oauth_path: Self::DEFAULT_OAUTH_PATH.iter().map(|s| (*s).to_owned()).collect(),
			service_uri_property: "url".into(),
		}
	}

	/// Reads OAuth fields below `path`; an empty path means the credentials root.
	pub fn with_oauth_path(mut self, path: &[&str]) -> Self {
		self.oauth_path = path.iter().map(|s| (*s).to_owned()).collect();

		self
	}

	/// Reads the service URI from `property` instead of `url`.
	pub fn with_service_uri_property(mut self, property: impl Into<String>) -> Self {
		self.service_uri_property = property.into();

		self
	}

	/// Request being interpreted.
	pub fn options(&self) -> &ServiceBindingDestinationOptions {
		&self.options
	}

	/// Credentials of the binding.
	pub fn credentials(&self) -> TypedCredentials<'_> {
		self.options.service_binding().credentials()
	}

	/// OAuth field `key`.
	pub fn oauth_string(&self, key: &str) -> Option<String> {
		self.credentials().string(&self.oauth_path(key))
	}

	/// OAuth field `key` or an access error naming its full path.
	pub fn require_oauth_string(&self, key: &str) -> Result<String, DestinationAccessError> {
		self.credentials().require_string(&self.oauth_path(key))
	}

	/// Credential type declared by the binding.
	pub fn credential_type(&self) -> CredentialType {
		self.oauth_string("credential-type")
			.map(|raw| CredentialType::parse(&raw))
			.unwrap_or_default()
	}

	fn oauth_path<'a>(&'a self, key: &'a str) -> Vec<&'a str> {
		self.oauth_path.iter().map(String::as_str).chain([key]).collect()
	}
}
impl OAuth2PropertySupplier for DefaultOAuth2PropertySupplier {
	fn is_oauth2_binding(&self) -> bool {
		self.oauth_string("clientid").is_some()
	}

	fn service_uri(&self) -> Result<Url, DestinationAccessError> {
		self.credentials().require_url(&[&self.service_uri_property])
	}

	fn token_uri(&self) -> Result<Url, DestinationAccessError> {
		let property = match self.credential_type() {
			CredentialType::X509 => "certurl",
			_ => "url",
		};

		self.credentials().require_url(&self.oauth_path(property))
	}

	fn client_identity(&self) -> Result<ClientIdentity, DestinationAccessError> {
		let client_id = self.require_oauth_string("clientid")?;

		match self.credential_type() {
			CredentialType::X509 => {
				let certificate = self.require_oauth_string("certificate")?;
				let key = self.require_oauth_string("key")?;

				ClientIdentity::certificate(client_id, &certificate, &key).map_err(|e| {
					DestinationAccessError::with_source(
						"Failed to load the client certificate of the service binding.",
						e,
					)
				})
			},
			_ => Ok(ClientIdentity::secret(client_id, self.require_oauth_string("clientsecret")?)),
		}
	}
}

/// Connectivity proxy supplier.
///
/// The service URI is `http://<onpremise_proxy_host>:<port>`, preferring
/// `onpremise_proxy_http_port` over the legacy `onpremise_proxy_port`.
#[derive(Clone, Debug)]
pub struct ConnectivityPropertySupplier(DefaultOAuth2PropertySupplier);
impl ConnectivityPropertySupplier {
	/// Creates a supplier for `options`.
	pub fn new(options: &ServiceBindingDestinationOptions) -> Self {
		Self(DefaultOAuth2PropertySupplier::new(options).with_oauth_path(&[]))
	}
}
impl OAuth2PropertySupplier for ConnectivityPropertySupplier {
	fn is_oauth2_binding(&self) -> bool {
		self.0.is_oauth2_binding()
	}

	fn service_uri(&self) -> Result<Url, DestinationAccessError> {
		let credentials = self.0.credentials();
		let host = credentials.require_string(&["onpremise_proxy_host"])?;
		let port = credentials
			.number(&["onpremise_proxy_http_port"])
			.or_else(|| credentials.number(&["onpremise_proxy_port"]))
			.ok_or_else(|| missing(&["onpremise_proxy_port"]))?;
		let raw = format!("http://{host}:{port}");

		Url::parse(&raw).map_err(|e| {
			DestinationAccessError::with_source(format!("Unable to convert '{raw}' into a URL."), e)
		})
	}

	fn token_uri(&self) -> Result<Url, DestinationAccessError> {
		self.0.token_uri()
	}

	fn client_identity(&self) -> Result<ClientIdentity, DestinationAccessError> {
		self.0.client_identity()
	}
}

/// Identity authentication supplier.
///
/// The token endpoint is `<url>/oauth2/token`. Token requests carry the binding's `app_tid` and,
/// when [`IasOptions`] name an application or consumer client, a `resource` parameter. With
/// [`IasOptions::without_token_for_technical_provider_user`], provider-technical access skips
/// token retrieval and relies on mTLS alone.
#[derive(Clone, Debug)]
pub struct IdentityAuthenticationPropertySupplier(DefaultOAuth2PropertySupplier);
impl IdentityAuthenticationPropertySupplier {
	/// Creates a supplier for `options`.
	pub fn new(options: &ServiceBindingDestinationOptions) -> Self {
		Self(DefaultOAuth2PropertySupplier::new(options).with_oauth_path(&[]))
	}

	fn ias_options(&self) -> Option<&IasOptions> {
		self.0.options().option::<IasOptions>()
	}

	fn skip_token_retrieval(&self, app_tid: Option<&str>) -> bool {
		if !self.ias_options().is_some_and(IasOptions::mtls_only_for_technical_provider) {
			return false;
		}

		match self.0.options().on_behalf_of() {
			OnBehalfOf::TechnicalUserProvider => true,
			OnBehalfOf::TechnicalUserCurrentTenant => context::tenant()
				.try_get_current()
				.is_none_or(|tenant| Some(tenant.id.as_str()) == app_tid),
			OnBehalfOf::NamedUserCurrentTenant => false,
		}
	}

	fn resource(&self) -> Option<String> {
		let ias = self.ias_options()?;

		if let Some(name) = ias.application_name() {
			return Some(format!("{APPLICATION_RESOURCE}:{name}"));
		}

		ias.consumer_client().map(|client| match &client.tenant_id {
			Some(tenant_id) =>
				format!("{CONSUMER_RESOURCE}:{}:apptid:{tenant_id}", client.client_id),
			None => format!("{CONSUMER_RESOURCE}:{}", client.client_id),
		})
	}
}
impl OAuth2PropertySupplier for IdentityAuthenticationPropertySupplier {
	fn is_oauth2_binding(&self) -> bool {
		self.0.is_oauth2_binding()
	}

	fn service_uri(&self) -> Result<Url, DestinationAccessError> {
		match self.ias_options().and_then(IasOptions::target_uri) {
			Some(uri) => Ok(uri.clone()),
			None => self.0.service_uri(),
		}
	}

	fn token_uri(&self) -> Result<Url, DestinationAccessError> {
		let mut uri = self.0.credentials().require_url(&["url"])?;
		let path = format!("{}/{IDENTITY_TOKEN_PATH}", uri.path().trim_end_matches('/'));

		uri.set_path(&path);

		Ok(uri)
	}

	fn client_identity(&self) -> Result<ClientIdentity, DestinationAccessError> {
		self.0.client_identity()
	}

	fn oauth2_options(&self) -> Result<OAuth2Options, DestinationAccessError> {
		let app_tid = self.0.credentials().string(&["app_tid"]);
		let mut options = OAuth2Options::default();

		if let Some(key_store) = self.client_identity()?.key_store() {
			options = options.with_client_key_store(key_store.clone());
		}
		if self.skip_token_retrieval(app_tid.as_deref()) {
			options.skip_token_retrieval = true;

			return Ok(options);
		}
		if let Some(app_tid) = app_tid {
			options = options.with_parameter("app_tid", app_tid);
		}
		if let Some(resource) = self.resource() {
			options = options.with_parameter("resource", resource);
		}

		Ok(options)
	}
}

pub(super) fn builtin_entries() -> Vec<SupplierEntry> {
	let root_level = |service_uri_property: &'static str| {
		boxed_factory(move |options: &ServiceBindingDestinationOptions| {
			DefaultOAuth2PropertySupplier::new(options)
				.with_oauth_path(&[])
				.with_service_uri_property(service_uri_property)
		})
	};

	vec![
		SupplierEntry::for_service(ServiceIdentifier::DESTINATION, root_level("uri")),
		SupplierEntry::for_service(
			ServiceIdentifier::CONNECTIVITY,
			boxed_factory(ConnectivityPropertySupplier::new),
		),
		SupplierEntry::for_service(
			ServiceIdentifier::IDENTITY_AUTHENTICATION,
			boxed_factory(IdentityAuthenticationPropertySupplier::new),
		),
		SupplierEntry::for_service(ServiceIdentifier::XSUAA, root_level("url")),
		SupplierEntry::new(
			"default".into(),
			Arc::new(|_: &ServiceBindingDestinationOptions| true),
			boxed_factory(DefaultOAuth2PropertySupplier::new),
		),
	]
}
