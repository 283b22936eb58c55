//! Behalf-aware token retrieval.

// self
use crate::{
	_prelude::*,
	auth::ClientIdentity,
	binding::ServiceIdentifier,
	context,
	error::{ContextError, DestinationAccessError},
	obs::{FlowOutcome, FlowSpan, TokenFlow, record_flow_outcome},
	resilience::{DefaultResilienceExecutor, ResilienceConfiguration, ResilienceExecutor, operation},
	token::{CacheKey, Grant, TokenRequest, TokenResponse, TokenServiceCache},
};

const DEFAULT_TOKEN_PATH: &str = "/oauth/token";
const SUBSCRIPTION_HINT: &str = "Make sure the tenant is subscribed to the application and that \
	the application declares the services it depends on as subscription dependencies.";

/// Identity a downstream call is made as.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OnBehalfOf {
	/// Technical user of the provider tenant.
	TechnicalUserProvider,
	/// Technical user of the ambient tenant; the provider tenant when none is set.
	#[default]
	TechnicalUserCurrentTenant,
	/// Current end user, exchanging the ambient user token.
	NamedUserCurrentTenant,
}

/// How the tenant is communicated to the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TenantPropagationStrategy {
	/// Send the zone id in the `x-zid` header.
	#[default]
	ZoneIdHeader,
	/// Replace the first host label of the token endpoint with the tenant subdomain.
	TenantSubdomain,
}
impl TenantPropagationStrategy {
	/// Strategy used by a service family.
	pub fn for_service(service: Option<&ServiceIdentifier>) -> Self {
		match service {
			Some(service) if *service == ServiceIdentifier::IDENTITY_AUTHENTICATION =>
				Self::TenantSubdomain,
			_ => Self::ZoneIdHeader,
		}
	}
}

#[derive(Debug)]
struct TokenPlan {
	grant: Grant,
	tenant_id: Option<String>,
	zone_id: Option<String>,
	subdomain: Option<String>,
}

/// Retrieves access tokens for one token endpoint and client identity.
///
/// Context is resolved on every call:
///
/// - [`OnBehalfOf::TechnicalUserProvider`] runs `client_credentials` without tenant information.
/// - [`OnBehalfOf::TechnicalUserCurrentTenant`] runs `client_credentials` for the ambient tenant,
///   or for the provider when no tenant is set.
/// - [`OnBehalfOf::NamedUserCurrentTenant`] exchanges the ambient user token. An ambient tenant
///   that differs from the token's tenant fails with [`ContextError::TenantMismatch`] before any
///   request is sent.
#[derive(Clone, Debug)]
pub struct OAuth2TokenProvider {
	token_uri: Url,
	identity: ClientIdentity,
	behalf: OnBehalfOf,
	strategy: TenantPropagationStrategy,
	parameters: BTreeMap<String, String>,
	refresh_window: Duration,
	resilience: ResilienceConfiguration,
	token_services: Arc<TokenServiceCache>,
	executor: Arc<dyn ResilienceExecutor>,
}
impl OAuth2TokenProvider {
	/// Starts a builder for `token_uri` and `identity`.
	pub fn builder(token_uri: Url, identity: ClientIdentity) -> OAuth2TokenProviderBuilder {
		OAuth2TokenProviderBuilder {
			token_uri,
			identity,
			behalf: OnBehalfOf::default(),
			strategy: TenantPropagationStrategy::default(),
			parameters: BTreeMap::new(),
			refresh_window: TokenRequest::DEFAULT_REFRESH_WINDOW,
			timeout: Some(ResilienceConfiguration::DEFAULT_TIMEOUT),
			resilience: None,
			token_services: None,
			executor: None,
		}
	}

	/// Token endpoint, with the default path applied.
	pub fn token_uri(&self) -> &Url {
		&self.token_uri
	}

	/// Client identity.
	pub fn identity(&self) -> &ClientIdentity {
		&self.identity
	}

	/// Configured behalf.
	pub fn on_behalf_of(&self) -> OnBehalfOf {
		self.behalf
	}

	/// Tenant propagation strategy.
	pub fn strategy(&self) -> TenantPropagationStrategy {
		self.strategy
	}

	/// Additional form parameters.
	pub fn parameters(&self) -> &BTreeMap<String, String> {
		&self.parameters
	}

	/// Resilience configuration wrapped around every retrieval.
	pub fn resilience(&self) -> &ResilienceConfiguration {
		&self.resilience
	}

	/// Retrieves a token for the current context.
	pub async fn retrieve_access_token(&self) -> Result<TokenResponse> {
		let flow = match self.behalf {
			OnBehalfOf::NamedUserCurrentTenant => TokenFlow::JwtBearer,
			_ => TokenFlow::ClientCredentials,
		};
		let span = FlowSpan::new(flow, "retrieve_access_token");

		record_flow_outcome(flow, FlowOutcome::Attempt);

		let result = span.instrument(self.retrieve()).await;

		record_flow_outcome(
			flow,
			if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure },
		);

		result
	}

	async fn retrieve(&self) -> Result<TokenResponse> {
		let plan = self.plan()?;
		let service = self
			.token_services
			.get_or_create(&CacheKey::new(plan.tenant_id.as_deref(), self.identity.clone()))?;
		let mut request = TokenRequest::new(self.token_uri.clone(), plan.grant)
			.with_parameters(self.parameters.clone())
			.with_refresh_window(self.refresh_window);

		if let Some(zone_id) = plan.zone_id {
			request = request.with_zone_id(zone_id);
		}
		if let Some(subdomain) = plan.subdomain {
			request = request.with_subdomain(subdomain);
		}

		let result = self
			.executor
			.execute(&self.resilience, operation(|| service.retrieve(&request)))
			.await;

		match (result, plan.tenant_id) {
			(Err(Error::TokenRequest(e)), Some(tenant_id)) if e.status == Some(401) => {
				tracing::warn!(
					tenant_id = %tenant_id,
					client_id = self.identity.id(),
					"Token endpoint rejected the tenant's request."
				);

				Err(e.with_hint(SUBSCRIPTION_HINT).into())
			},
			(result, _) => result,
		}
	}

	fn plan(&self) -> Result<TokenPlan> {
		match self.behalf {
			OnBehalfOf::TechnicalUserProvider => Ok(TokenPlan::provider()),
			OnBehalfOf::TechnicalUserCurrentTenant => match context::tenant().try_get_current() {
				Some(tenant) => self.tenant_plan(
					Grant::ClientCredentials,
					tenant.id.to_string(),
					tenant.subdomain,
				),
				None => Ok(TokenPlan::provider()),
			},
			OnBehalfOf::NamedUserCurrentTenant => {
				let token = context::auth_token().get_current()?;
				let token_tenant = token.tenant_id().map(ToOwned::to_owned).ok_or_else(|| {
					ContextError::InvalidToken {
						reason: "the token carries neither an app_tid nor a zid claim".into(),
					}
				})?;
				let ambient = context::tenant().try_get_current();

				match &ambient {
					Some(tenant) if tenant.id.as_str() != token_tenant =>
						return Err(ContextError::TenantMismatch {
							ambient: tenant.id.to_string(),
							token: token_tenant,
						}
						.into()),
					Some(_) => {},
					None => tracing::warn!(
						tenant_id = %token_tenant,
						"No current tenant is set; using the tenant of the user token."
					),
				}

				let subdomain = ambient
					.and_then(|tenant| tenant.subdomain)
					.or_else(|| token.subdomain().map(ToOwned::to_owned));

				self.tenant_plan(
					Grant::JwtBearer { assertion: token.token().clone() },
					token_tenant,
					subdomain,
				)
			},
		}
	}

	fn tenant_plan(
		&self,
		grant: Grant,
		tenant_id: String,
		subdomain: Option<String>,
	) -> Result<TokenPlan> {
		match self.strategy {
			TenantPropagationStrategy::ZoneIdHeader => Ok(TokenPlan {
				grant,
				zone_id: Some(tenant_id.clone()),
				tenant_id: Some(tenant_id),
				subdomain: None,
			}),
			TenantPropagationStrategy::TenantSubdomain => {
				let subdomain = subdomain.filter(|s| !s.is_empty()).ok_or_else(|| {
					DestinationAccessError::new(format!(
						"Unable to get subdomain of tenant '{tenant_id}'."
					))
				})?;

				Ok(TokenPlan {
					grant,
					tenant_id: Some(tenant_id),
					zone_id: None,
					subdomain: Some(subdomain),
				})
			},
		}
	}
}
impl TokenPlan {
	fn provider() -> Self {
		Self { grant: Grant::ClientCredentials, tenant_id: None, zone_id: None, subdomain: None }
	}
}

/// Builder for [`OAuth2TokenProvider`].
#[derive(Clone, Debug)]
pub struct OAuth2TokenProviderBuilder {
	token_uri: Url,
	identity: ClientIdentity,
	behalf: OnBehalfOf,
	strategy: TenantPropagationStrategy,
	parameters: BTreeMap<String, String>,
	refresh_window: Duration,
	timeout: Option<Duration>,
	resilience: Option<ResilienceConfiguration>,
	token_services: Option<Arc<TokenServiceCache>>,
	executor: Option<Arc<dyn ResilienceExecutor>>,
}
impl OAuth2TokenProviderBuilder {
	/// Sets the behalf.
	pub fn on_behalf_of(mut self, behalf: OnBehalfOf) -> Self {
		self.behalf = behalf;

		self
	}

	/// Sets the tenant propagation strategy.
	pub fn tenant_propagation(mut self, strategy: TenantPropagationStrategy) -> Self {
		self.strategy = strategy;

		self
	}

	/// Adds one form parameter.
	pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.parameters.insert(name.into(), value.into());

		self
	}

	/// Adds several form parameters.
	pub fn parameters<I, K, V>(mut self, parameters: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.parameters.extend(parameters.into_iter().map(|(k, v)| (k.into(), v.into())));

		self
	}

	/// Sets the refresh window of cached tokens.
	pub fn refresh_window(mut self, window: Duration) -> Self {
		self.refresh_window = window;

		self
	}

	/// Sets the per-attempt timeout of the default resilience configuration.
	pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
		self.timeout = timeout;

		self
	}

	/// Replaces the resilience configuration entirely.
	pub fn resilience(mut self, config: ResilienceConfiguration) -> Self {
		self.resilience = Some(config);

		self
	}

	/// Uses `cache` instead of the process-wide token service cache.
	pub fn token_services(mut self, cache: Arc<TokenServiceCache>) -> Self {
		self.token_services = Some(cache);

		self
	}

	/// Uses `executor` instead of the process-wide resilience executor.
	pub fn executor(mut self, executor: Arc<dyn ResilienceExecutor>) -> Self {
		self.executor = Some(executor);

		self
	}

	/// Builds the provider.
	///
	/// A token URI without a path gets `/oauth/token`. The default resilience isolation key is
	/// `<token host>-<client id>`.
	pub fn build(self) -> OAuth2TokenProvider {
		let mut token_uri = self.token_uri;

		if matches!(token_uri.path(), "" | "/") {
			token_uri.set_path(DEFAULT_TOKEN_PATH);
		}

		let resilience = self.resilience.unwrap_or_else(|| {
			ResilienceConfiguration::new(format!(
				"{}-{}",
				token_uri.host_str().unwrap_or_default(),
				self.identity.id()
			))
			.with_timeout(self.timeout)
		});

		OAuth2TokenProvider {
			token_uri,
			identity: self.identity,
			behalf: self.behalf,
			strategy: self.strategy,
			parameters: self.parameters,
			refresh_window: self.refresh_window,
			resilience,
			token_services: self.token_services.unwrap_or_else(TokenServiceCache::global),
			executor: self.executor.unwrap_or_else(|| DefaultResilienceExecutor::global()),
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::Ordering;
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::{
		auth::TenantId,
		context::{AuthToken, Tenant, encode_test_jwt},
		http::{HttpClientFactory, TokenHttpClient},
		token::service::tests::ScriptedHttpClient,
	};

	const TOKEN: &str = r#"{"access_token":"at","token_type":"bearer","expires_in":3600}"#;

	#[derive(Debug)]
	struct Fixed(Arc<ScriptedHttpClient>);
	impl HttpClientFactory for Fixed {
		fn create(
			&self,
			_: &ClientIdentity,
		) -> Result<Arc<dyn TokenHttpClient>, crate::error::ConfigError> {
			Ok(self.0.clone())
		}
	}

	fn provider(
		client: &Arc<ScriptedHttpClient>,
		behalf: OnBehalfOf,
		strategy: TenantPropagationStrategy,
	) -> OAuth2TokenProvider {
		let cache =
			TokenServiceCache::default().with_http_client_factory(Arc::new(Fixed(client.clone())));

		OAuth2TokenProvider::builder(
			Url::parse("https://provider.auth.example.com").expect("Token URI should parse."),
			ClientIdentity::secret("client", "secret"),
		)
		.on_behalf_of(behalf)
		.tenant_propagation(strategy)
		.token_services(Arc::new(cache))
		.executor(Arc::new(DefaultResilienceExecutor::default()))
		.build()
	}

	fn tenant(id: &str) -> Tenant {
		Tenant::new(TenantId::new(id).expect("Tenant id fixture should be valid."))
	}

	fn user_token(tenant: &str) -> AuthToken {
		AuthToken::decode(encode_test_jwt(json!({"zid": tenant, "ext_attr": {"zdn": "sub"}})))
			.expect("User token fixture should decode.")
	}

	#[test]
	fn builder_applies_default_path_and_isolation_key() {
		let client = Arc::new(ScriptedHttpClient::default());
		let provider = provider(
			&client,
			OnBehalfOf::TechnicalUserProvider,
			TenantPropagationStrategy::ZoneIdHeader,
		);

		assert_eq!(provider.token_uri().path(), "/oauth/token");
		assert_eq!(provider.resilience().isolation_key, "provider.auth.example.com-client");
		assert_eq!(provider.resilience().timeout, Some(ResilienceConfiguration::DEFAULT_TIMEOUT));
	}

	#[tokio::test]
	async fn current_tenant_without_tenant_matches_provider_request() {
		let client = Arc::new(ScriptedHttpClient::with([(200, TOKEN), (200, TOKEN)]));

		provider(
			&client,
			OnBehalfOf::TechnicalUserProvider,
			TenantPropagationStrategy::ZoneIdHeader,
		)
		.retrieve_access_token()
		.await
		.expect("Provider token should be retrieved.");
		provider(
			&client,
			OnBehalfOf::TechnicalUserCurrentTenant,
			TenantPropagationStrategy::ZoneIdHeader,
		)
		.retrieve_access_token()
		.await
		.expect("Current tenant token should be retrieved.");

		let requests = client.requests.lock();

		assert_eq!(requests.len(), 2);
		assert_eq!(requests[0].uri(), requests[1].uri());
		assert_eq!(requests[0].headers(), requests[1].headers());
		assert_eq!(requests[0].body(), requests[1].body());
	}

	#[tokio::test]
	async fn current_tenant_sends_zone_header() {
		let client = Arc::new(ScriptedHttpClient::with([(200, TOKEN)]));
		let provider = provider(
			&client,
			OnBehalfOf::TechnicalUserCurrentTenant,
			TenantPropagationStrategy::ZoneIdHeader,
		);

		context::tenant()
			.execute_with(tenant("t1"), provider.retrieve_access_token())
			.await
			.expect("Tenant token should be retrieved.");

		assert_eq!(client.header(0, "x-zid").as_deref(), Some("t1"));
	}

	#[tokio::test]
	async fn subdomain_strategy_requires_a_subdomain() {
		let client = Arc::new(ScriptedHttpClient::with([(200, TOKEN)]));
		let provider = provider(
			&client,
			OnBehalfOf::TechnicalUserCurrentTenant,
			TenantPropagationStrategy::TenantSubdomain,
		);
		let missing =
			context::tenant().execute_with(tenant("t1"), provider.retrieve_access_token()).await;

		assert!(matches!(missing, Err(Error::Access(ref e)) if e.message.contains("'t1'")));

		context::tenant()
			.execute_with(tenant("t1").with_subdomain("consumer"), provider.retrieve_access_token())
			.await
			.expect("Tenant with subdomain should get a token.");

		let requests = client.requests.lock();

		assert_eq!(requests[0].uri().host(), Some("consumer.auth.example.com"));
		assert!(requests[0].headers().get("x-zid").is_none());
	}

	#[tokio::test]
	async fn named_user_tenant_mismatch_fails_before_any_request() {
		let client = Arc::new(ScriptedHttpClient::with([(200, TOKEN)]));
		let provider = provider(
			&client,
			OnBehalfOf::NamedUserCurrentTenant,
			TenantPropagationStrategy::ZoneIdHeader,
		);
		let result = context::auth_token()
			.execute_with(
				user_token("T2"),
				context::tenant().execute_with(tenant("T1"), provider.retrieve_access_token()),
			)
			.await;

		assert!(matches!(result, Err(Error::Context(ContextError::TenantMismatch { .. }))));
		assert_eq!(client.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn named_user_without_tenant_uses_token_tenant() {
		let client = Arc::new(ScriptedHttpClient::with([(200, TOKEN)]));
		let provider = provider(
			&client,
			OnBehalfOf::NamedUserCurrentTenant,
			TenantPropagationStrategy::ZoneIdHeader,
		);

		context::auth_token()
			.execute_with(user_token("T2"), provider.retrieve_access_token())
			.await
			.expect("Token exchange should succeed.");

		assert_eq!(client.header(0, "x-zid").as_deref(), Some("T2"));
		assert!(client.form(0).iter().any(|(k, v)| k == "grant_type" && v.contains("jwt-bearer")));
	}

	#[tokio::test]
	async fn unauthorized_tenant_requests_carry_a_hint() {
		let client = Arc::new(ScriptedHttpClient::with([(401, r#"{"error":"unauthorized"}"#)]));
		let provider = provider(
			&client,
			OnBehalfOf::TechnicalUserCurrentTenant,
			TenantPropagationStrategy::ZoneIdHeader,
		);
		let result =
			context::tenant().execute_with(tenant("t1"), provider.retrieve_access_token()).await;

		match result {
			Err(Error::TokenRequest(e)) =>
				assert!(e.hint.is_some_and(|hint| hint.contains("subscribed"))),
			other => panic!("Expected a token request error, got {other:?}."),
		}
	}
}
