//! Token endpoint exchanges for one client identity.

// std
use std::time::{Duration as StdDuration, Instant};
// crates.io
use moka::{Expiry, sync::Cache};
use oauth2::{
	HttpRequest, HttpResponse,
	basic::BasicErrorResponse,
	http::{
		Method, Request, StatusCode,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
use sha2::{Digest, Sha256};
use url::{Host, form_urlencoded::Serializer};
// self
use crate::{
	_prelude::*,
	auth::{ClientIdentity, TokenSecret},
	error::{ConfigError, TokenRequestError, TransientError},
	http::{ResponseMetadata, TokenHttpClient},
	obs::{self, CacheLookup, TokenFlow},
};

/// Grant type sent for user token exchanges.
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Header carrying the zone (tenant) id to the token endpoint.
pub const ZONE_ID_HEADER: &str = "x-zid";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// OAuth grant to run.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Grant {
	/// `client_credentials`.
	ClientCredentials,
	/// JWT bearer exchange of a user token.
	JwtBearer {
		/// User token presented as `assertion`.
		assertion: TokenSecret,
	},
}
impl Grant {
	/// Wire value of `grant_type`.
	pub fn grant_type(&self) -> &'static str {
		match self {
			Self::ClientCredentials => "client_credentials",
			Self::JwtBearer { .. } => JWT_BEARER_GRANT_TYPE,
		}
	}

	/// Observability label of the grant.
	pub fn flow(&self) -> TokenFlow {
		match self {
			Self::ClientCredentials => TokenFlow::ClientCredentials,
			Self::JwtBearer { .. } => TokenFlow::JwtBearer,
		}
	}
}

/// Fully resolved token request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRequest {
	/// Token endpoint as configured.
	pub token_uri: Url,
	/// Grant to run.
	pub grant: Grant,
	/// Zone id sent in the [`ZONE_ID_HEADER`] header.
	pub zone_id: Option<String>,
	/// Subdomain replacing the first host label of the token endpoint.
	pub subdomain: Option<String>,
	/// Additional form parameters.
	pub parameters: BTreeMap<String, String>,
	/// Cached tokens closer than this to expiry are fetched again.
	pub refresh_window: Duration,
}
impl TokenRequest {
	/// Default refresh window.
	pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::seconds(60);

	/// Creates a request without tenant information.
	pub fn new(token_uri: Url, grant: Grant) -> Self {
		Self {
			token_uri,
			grant,
			zone_id: None,
			subdomain: None,
			parameters: BTreeMap::new(),
			refresh_window: Self::DEFAULT_REFRESH_WINDOW,
		}
	}

	/// Sets the zone id header value.
	pub fn with_zone_id(mut self, zone_id: impl Into<String>) -> Self {
		self.zone_id = Some(zone_id.into());

		self
	}

	/// Sets the tenant subdomain.
	pub fn with_subdomain(mut self, subdomain: impl Into<String>) -> Self {
		self.subdomain = Some(subdomain.into());

		self
	}

	/// Replaces the additional form parameters.
	pub fn with_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
		self.parameters = parameters;

		self
	}

	/// Overrides the refresh window; negative values count as zero.
	pub fn with_refresh_window(mut self, window: Duration) -> Self {
		self.refresh_window = window.max(Duration::ZERO);

		self
	}

	/// Token endpoint the request is sent to, after subdomain rewriting.
	///
	/// Only domain hosts with at least two labels are rewritten; IP addresses and single-label
	/// hosts are left untouched.
	pub fn endpoint(&self) -> Result<Url, ConfigError> {
		let mut endpoint = self.token_uri.clone();
		let Some(subdomain) = self.subdomain.as_deref().filter(|s| !s.is_empty()) else {
			return Ok(endpoint);
		};
		let Some(Host::Domain(host)) = self.token_uri.host() else {
			tracing::debug!(uri = %self.token_uri, "Token endpoint host is not a domain.");

			return Ok(endpoint);
		};
		let Some((_, rest)) = host.split_once('.') else {
			return Ok(endpoint);
		};
		let rewritten = format!("{subdomain}.{rest}");

		endpoint.set_host(Some(&rewritten)).map_err(|e| ConfigError::invalid_url(rewritten, e))?;

		Ok(endpoint)
	}
}

/// Access token returned by a token endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenResponse {
	/// Access token.
	pub access_token: TokenSecret,
	/// Token type as reported by the endpoint.
	pub token_type: String,
	/// Absolute expiry, when the endpoint reported `expires_in`.
	pub expires_at: Option<OffsetDateTime>,
	/// Refresh token, if issued.
	pub refresh_token: Option<TokenSecret>,
	/// Granted scopes, space-delimited.
	pub scope: Option<String>,
}
impl TokenResponse {
	/// Creates a bearer token expiring `expires_in` from now.
	pub fn bearer(access_token: TokenSecret, expires_in: Option<Duration>) -> Self {
		Self {
			access_token,
			token_type: "bearer".into(),
			expires_at: expires_in.map(|ttl| OffsetDateTime::now_utc() + ttl),
			refresh_token: None,
			scope: None,
		}
	}

	/// Returns `true` when the token stays valid for longer than `window` after `now`.
	///
	/// Tokens without an expiry are never considered fresh, so they are not reused.
	pub fn is_fresh_at(&self, now: OffsetDateTime, window: Duration) -> bool {
		self.expires_at.is_some_and(|expires_at| expires_at - window > now)
	}

	/// Value of an `Authorization` header carrying this token.
	pub fn authorization_value(&self) -> String {
		format!("Bearer {}", self.access_token.expose())
	}
}

#[derive(Deserialize)]
struct RawTokenResponse {
	#[serde(default)]
	access_token: Option<String>,
	#[serde(default)]
	token_type: Option<String>,
	#[serde(default)]
	expires_in: Option<i64>,
	#[serde(default)]
	refresh_token: Option<String>,
	#[serde(default)]
	scope: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct RequestKey {
	endpoint: String,
	grant_type: &'static str,
	assertion: Option<[u8; 32]>,
	zone_id: Option<String>,
	parameters: Vec<(String, String)>,
}
impl RequestKey {
	fn new(endpoint: &Url, request: &TokenRequest) -> Self {
		let assertion = match &request.grant {
			Grant::JwtBearer { assertion } => Some(Sha256::digest(assertion.expose()).into()),
			Grant::ClientCredentials => None,
		};

		Self {
			endpoint: endpoint.to_string(),
			grant_type: request.grant.grant_type(),
			assertion,
			zone_id: request.zone_id.clone(),
			parameters: request.parameters.clone().into_iter().collect(),
		}
	}
}

struct UntilTokenExpiry;
impl Expiry<RequestKey, TokenResponse> for UntilTokenExpiry {
	fn expire_after_create(
		&self,
		_: &RequestKey,
		response: &TokenResponse,
		_: Instant,
	) -> Option<StdDuration> {
		let remaining = response
			.expires_at
			.map(|expires_at| expires_at - OffsetDateTime::now_utc())
			.unwrap_or(Duration::ZERO);

		Some(remaining.try_into().unwrap_or(StdDuration::ZERO))
	}
}

/// Removes the single-flight guard of a request once nobody waits on it anymore.
struct Flight<'a> {
	guards: &'a Mutex<HashMap<RequestKey, Arc<AsyncMutex<()>>>>,
	key: &'a RequestKey,
	guard: Arc<AsyncMutex<()>>,
}
impl Drop for Flight<'_> {
	fn drop(&mut self) {
		let mut guards = self.guards.lock();

		// One reference held by the map, one by this flight.
		if Arc::strong_count(&self.guard) == 2
			&& guards.get(self.key).is_some_and(|guard| Arc::ptr_eq(guard, &self.guard))
		{
			guards.remove(self.key);
		}
	}
}

/// Executes token requests for one [`ClientIdentity`] and caches their responses.
///
/// Responses are cached per request shape (endpoint, grant, hashed assertion, zone id, extra
/// parameters) and reused until they enter the request's refresh window. Cached responses expire
/// with their token and are bounded by [`Self::DEFAULT_MAX_CACHED_RESPONSES`]. Concurrent
/// requests with the same shape are single-flighted.
pub struct OAuth2TokenService {
	identity: ClientIdentity,
	http_client: Arc<dyn TokenHttpClient>,
	responses: Cache<RequestKey, TokenResponse>,
	flow_guards: Mutex<HashMap<RequestKey, Arc<AsyncMutex<()>>>>,
}
impl OAuth2TokenService {
	/// Default bound on cached responses.
	pub const DEFAULT_MAX_CACHED_RESPONSES: u64 = 10_000;

	/// Creates a service sending requests through `http_client`.
	pub fn new(identity: ClientIdentity, http_client: Arc<dyn TokenHttpClient>) -> Self {
		Self {
			identity,
			http_client,
			responses: build_responses(Self::DEFAULT_MAX_CACHED_RESPONSES),
			flow_guards: Default::default(),
		}
	}

	/// Overrides the bound on cached responses; cached responses are dropped.
	pub fn with_max_cached_responses(mut self, max: u64) -> Self {
		self.responses = build_responses(max);

		self
	}

	/// Identity presented to the token endpoint.
	pub fn identity(&self) -> &ClientIdentity {
		&self.identity
	}

	/// Number of cached responses.
	pub fn cached_responses(&self) -> u64 {
		self.responses.run_pending_tasks();

		self.responses.entry_count()
	}

	/// Number of requests currently in flight, waiters included.
	pub fn in_flight(&self) -> usize {
		self.flow_guards.lock().len()
	}

	/// Drops all cached responses.
	pub fn clear_cache(&self) {
		self.responses.invalidate_all();
	}

	/// Returns a cached token for `request` or fetches a new one.
	pub async fn retrieve(&self, request: &TokenRequest) -> Result<TokenResponse> {
		let endpoint = request.endpoint()?;
		let key = RequestKey::new(&endpoint, request);
		let flow = request.grant.flow();

		if let Some(hit) = self.cached(&key, request.refresh_window) {
			obs::record_cache_lookup(flow, CacheLookup::Hit);

			return Ok(hit);
		}

		let flight = self.flight(&key);
		let _singleflight = flight.guard.lock().await;

		if let Some(hit) = self.cached(&key, request.refresh_window) {
			obs::record_cache_lookup(flow, CacheLookup::Hit);

			return Ok(hit);
		}

		obs::record_cache_lookup(flow, CacheLookup::Miss);

		let response = self.exchange(&endpoint, request).await?;

		if response.expires_at.is_some() {
			self.responses.insert(key.clone(), response.clone());
		}

		Ok(response)
	}

	fn cached(&self, key: &RequestKey, window: Duration) -> Option<TokenResponse> {
		let hit = self.responses.get(key)?;

		if hit.is_fresh_at(OffsetDateTime::now_utc(), window) {
			tracing::debug!(endpoint = %key.endpoint, "Reusing cached access token.");

			return Some(hit);
		}

		self.responses.invalidate(key);

		None
	}

	fn flight<'a>(&'a self, key: &'a RequestKey) -> Flight<'a> {
		let guard = self
			.flow_guards
			.lock()
			.entry(key.clone())
			.or_insert_with(|| Arc::new(AsyncMutex::new(())))
			.clone();

		Flight { guards: &self.flow_guards, key, guard }
	}

	async fn exchange(&self, endpoint: &Url, request: &TokenRequest) -> Result<TokenResponse> {
		let mut builder = Request::builder()
			.method(Method::POST)
			.uri(endpoint.as_str())
			.header(CONTENT_TYPE, FORM_CONTENT_TYPE)
			.header(ACCEPT, "application/json");

		if let Some(zone_id) = &request.zone_id {
			builder = builder.header(ZONE_ID_HEADER, zone_id);
		}

		let http_request: HttpRequest =
			builder.body(self.form(request).into_bytes()).map_err(ConfigError::from)?;

		tracing::debug!(
			endpoint = %endpoint,
			grant_type = request.grant.grant_type(),
			client_id = self.identity.id(),
			zone_id = request.zone_id.as_deref(),
			"Requesting access token."
		);

		let response = self.http_client.execute(http_request).await?;

		map_response(endpoint, response)
	}

	fn form(&self, request: &TokenRequest) -> String {
		let mut form = Serializer::new(String::new());

		form.append_pair("grant_type", request.grant.grant_type());
		form.append_pair("client_id", self.identity.id());

		if let ClientIdentity::Secret { secret, .. } = &self.identity {
			form.append_pair("client_secret", secret.expose());
		}
		if let Grant::JwtBearer { assertion } = &request.grant {
			form.append_pair("assertion", assertion.expose());
		}

		for (name, value) in &request.parameters {
			form.append_pair(name, value);
		}

		form.finish()
	}
}
impl Debug for OAuth2TokenService {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuth2TokenService")
			.field("identity", &self.identity)
			.field("cached_responses", &self.responses.entry_count())
			.finish()
	}
}

fn build_responses(max: u64) -> Cache<RequestKey, TokenResponse> {
	Cache::builder().max_capacity(max).expire_after(UntilTokenExpiry).build()
}

fn map_response(endpoint: &Url, response: HttpResponse) -> Result<TokenResponse> {
	let meta = ResponseMetadata::from_response(&response);
	let status = response.status();

	if status.is_success() {
		return parse_token_response(response.body(), meta.status);
	}

	let described = describe_error_body(response.body());

	if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
		return Err(TransientError::TokenEndpoint {
			message: match described {
				Some((_, description)) => description,
				None => format!("token endpoint {endpoint} answered with HTTP {}", status.as_u16()),
			},
			status: meta.status,
			retry_after: meta.retry_after,
		}
		.into());
	}

	let mut e = TokenRequestError::new(format!(
		"Failed to retrieve an access token from {endpoint}{}.",
		described.as_ref().map(|(_, description)| format!(": {description}")).unwrap_or_default()
	))
	.with_status(status.as_u16());

	if let Some((code, _)) = described {
		e = e.with_oauth_error(code);
	}

	Err(e.into())
}

fn parse_token_response(body: &[u8], status: Option<u16>) -> Result<TokenResponse> {
	let mut deserializer = serde_json::Deserializer::from_slice(body);
	let with_status = |e: TokenRequestError| match status {
		Some(status) => e.with_status(status),
		None => e,
	};
	let raw: RawTokenResponse =
		serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
			with_status(TokenRequestError::new(format!(
				"OAuth2 token request succeeded but the response is not a token response: {e}."
			)))
		})?;
	let Some(access_token) = raw.access_token.filter(|token| !token.is_empty()) else {
		return Err(with_status(TokenRequestError::new(
			"OAuth2 token request succeeded but the response did not contain an access token.",
		))
		.into());
	};

	Ok(TokenResponse {
		access_token: TokenSecret::new(access_token),
		token_type: raw.token_type.unwrap_or_else(|| "bearer".into()),
		expires_at: raw.expires_in.map(|secs| OffsetDateTime::now_utc() + Duration::seconds(secs)),
		refresh_token: raw.refresh_token.map(TokenSecret::new),
		scope: raw.scope,
	})
}

fn describe_error_body(body: &[u8]) -> Option<(String, String)> {
	let response = serde_json::from_slice::<BasicErrorResponse>(body).ok()?;
	let code = response.error().as_ref().to_owned();
	let description = response.error_description().cloned().unwrap_or_else(|| code.clone());

	Some((code, description))
}

#[cfg(test)]
pub(crate) mod tests {
	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicUsize, Ordering},
	};
	// crates.io
	use oauth2::http::{HeaderValue, header::RETRY_AFTER};
	// self
	use super::*;
	use crate::{error::TransportError, http::TransportFuture};

	/// Transport replaying canned responses and recording every request.
	#[derive(Debug, Default)]
	pub(crate) struct ScriptedHttpClient {
		pub(crate) responses: Mutex<VecDeque<(u16, String)>>,
		pub(crate) requests: Mutex<Vec<HttpRequest>>,
		pub(crate) calls: AtomicUsize,
	}
	impl ScriptedHttpClient {
		pub(crate) fn with(responses: impl IntoIterator<Item = (u16, &'static str)>) -> Self {
			let client = Self::default();

			client
				.responses
				.lock()
				.extend(responses.into_iter().map(|(status, body)| (status, body.to_owned())));

			client
		}

		pub(crate) fn form(&self, index: usize) -> Vec<(String, String)> {
			let requests = self.requests.lock();

			url::form_urlencoded::parse(requests[index].body()).into_owned().collect()
		}

		pub(crate) fn header(&self, index: usize, name: &str) -> Option<String> {
			let requests = self.requests.lock();

			requests[index].headers().get(name).and_then(|v| v.to_str().ok()).map(Into::into)
		}
	}
	impl TokenHttpClient for ScriptedHttpClient {
		fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.requests.lock().push(request);

			let next = self.responses.lock().pop_front();

			Box::pin(async move {
				let (status, body) = next.ok_or_else(|| {
					TransportError::Io(std::io::Error::other("no scripted response left"))
				})?;
				let mut response = HttpResponse::new(body.into_bytes());

				*response.status_mut() =
					StatusCode::from_u16(status).expect("Scripted status should be valid.");
				response.headers_mut().insert(RETRY_AFTER, HeaderValue::from_static("2"));

				Ok(response)
			})
		}
	}

	const TOKEN: &str = r#"{"access_token":"at-1","token_type":"bearer","expires_in":3600}"#;

	fn service(client: Arc<ScriptedHttpClient>) -> OAuth2TokenService {
		OAuth2TokenService::new(ClientIdentity::secret("client", "secret"), client)
	}

	fn token_uri() -> Url {
		Url::parse("https://provider.auth.example.com/oauth/token")
			.expect("Token URI fixture should parse.")
	}

	#[tokio::test]
	async fn client_credentials_form_and_cache_reuse() {
		let client = Arc::new(ScriptedHttpClient::with([(200, TOKEN)]));
		let service = service(client.clone());
		let request = TokenRequest::new(token_uri(), Grant::ClientCredentials)
			.with_zone_id("zone-1")
			.with_parameters(BTreeMap::from([("resource".into(), "urn:app".into())]));
		let first = service.retrieve(&request).await.expect("First retrieval should succeed.");
		let second = service.retrieve(&request).await.expect("Cached retrieval should succeed.");

		assert_eq!(first, second);
		assert_eq!(first.authorization_value(), "Bearer at-1");
		assert_eq!(client.calls.load(Ordering::SeqCst), 1);
		assert_eq!(client.header(0, ZONE_ID_HEADER).as_deref(), Some("zone-1"));
		assert_eq!(client.header(0, "content-type").as_deref(), Some(FORM_CONTENT_TYPE));

		let form = client.form(0);

		assert!(form.contains(&("grant_type".into(), "client_credentials".into())));
		assert!(form.contains(&("client_id".into(), "client".into())));
		assert!(form.contains(&("client_secret".into(), "secret".into())));
		assert!(form.contains(&("resource".into(), "urn:app".into())));
	}

	#[tokio::test]
	async fn jwt_bearer_sends_assertion_and_keys_cache_by_token() {
		let client = Arc::new(ScriptedHttpClient::with([(200, TOKEN), (200, TOKEN)]));
		let service = service(client.clone());
		let a = TokenRequest::new(token_uri(), Grant::JwtBearer { assertion: "user-a".into() });
		let b = TokenRequest::new(token_uri(), Grant::JwtBearer { assertion: "user-b".into() });

		service.retrieve(&a).await.expect("Exchange for user a should succeed.");
		service.retrieve(&b).await.expect("Exchange for user b should succeed.");

		assert_eq!(client.calls.load(Ordering::SeqCst), 2);
		assert!(client.form(0).contains(&("grant_type".into(), JWT_BEARER_GRANT_TYPE.into())));
		assert!(client.form(1).contains(&("assertion".into(), "user-b".into())));
	}

	#[tokio::test]
	async fn classifies_error_statuses() {
		let client = Arc::new(ScriptedHttpClient::with([
			(401, r#"{"error":"unauthorized","error_description":"Bad credentials"}"#),
			(503, "unavailable"),
			(200, r#"{"token_type":"bearer"}"#),
			(200, "null"),
			(200, "<html>maintenance</html>"),
		]));
		let service = service(client);
		let request = TokenRequest::new(token_uri(), Grant::ClientCredentials);

		match service.retrieve(&request).await {
			Err(Error::TokenRequest(e)) => {
				assert_eq!(e.status, Some(401));
				assert_eq!(e.oauth_error.as_deref(), Some("unauthorized"));
				assert!(e.message.contains("Bad credentials"));
			},
			other => panic!("Expected a token request error, got {other:?}."),
		}
		match service.retrieve(&request).await {
			Err(Error::Transient(e)) => assert_eq!(e.retry_after(), Some(Duration::seconds(2))),
			other => panic!("Expected a transient error, got {other:?}."),
		}
		match service.retrieve(&request).await {
			Err(Error::TokenRequest(e)) => assert!(e.message.contains("did not contain")),
			other => panic!("Expected a missing token error, got {other:?}."),
		}

		for body in ["null", "HTML"] {
			match service.retrieve(&request).await {
				Err(Error::TokenRequest(e)) => {
					assert_eq!(e.status, Some(200));
					assert!(e.message.contains("not a token response"), "{body}: {e}");
				},
				other => panic!("Expected a fatal error for a {body} body, got {other:?}."),
			}
		}
	}

	#[tokio::test]
	async fn distinct_user_exchanges_keep_bookkeeping_bounded() {
		let client = Arc::new(ScriptedHttpClient::with(std::iter::repeat_n((200, TOKEN), 200)));
		let service = service(client.clone()).with_max_cached_responses(16);

		for i in 0..200 {
			let request = TokenRequest::new(
				token_uri(),
				Grant::JwtBearer { assertion: format!("user-{i}").into() },
			);

			service.retrieve(&request).await.expect("User token exchange should succeed.");
		}

		assert_eq!(client.calls.load(Ordering::SeqCst), 200);
		assert_eq!(service.in_flight(), 0);
		assert!(service.cached_responses() <= 16);
	}

	#[tokio::test]
	async fn concurrent_requests_share_one_exchange() {
		let client = Arc::new(ScriptedHttpClient::with([(200, TOKEN)]));
		let service = service(client.clone());
		let request = TokenRequest::new(token_uri(), Grant::ClientCredentials);
		let (a, b) = tokio::join!(service.retrieve(&request), service.retrieve(&request));

		assert_eq!(
			a.expect("First caller should receive a token."),
			b.expect("Second caller should receive the same token.")
		);
		assert_eq!(client.calls.load(Ordering::SeqCst), 1);
		assert_eq!(service.in_flight(), 0);
		assert_eq!(service.cached_responses(), 1);
	}

	#[tokio::test]
	async fn tokens_without_expiry_are_not_cached() {
		let client = Arc::new(ScriptedHttpClient::with([
			(200, r#"{"access_token":"once","token_type":"bearer"}"#),
			(200, TOKEN),
		]));
		let service = service(client.clone());
		let request = TokenRequest::new(token_uri(), Grant::ClientCredentials);

		service.retrieve(&request).await.expect("First retrieval should succeed.");

		assert_eq!(service.cached_responses(), 0);

		let second = service.retrieve(&request).await.expect("Second retrieval should succeed.");

		assert_eq!(second.access_token.expose(), "at-1");
		assert_eq!(client.calls.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn subdomain_rewrites_first_host_label_only() {
		let request = TokenRequest::new(token_uri(), Grant::ClientCredentials)
			.with_subdomain("tenant-a");

		assert_eq!(
			request.endpoint().expect("Rewritten endpoint should be valid.").as_str(),
			"https://tenant-a.auth.example.com/oauth/token"
		);

		let local = TokenRequest::new(
			Url::parse("http://127.0.0.1:8080/oauth/token").expect("Local URI should parse."),
			Grant::ClientCredentials,
		)
		.with_subdomain("tenant-a");

		assert_eq!(
			local.endpoint().expect("IP endpoints should pass through.").host_str(),
			Some("127.0.0.1")
		);
	}

	#[test]
	fn freshness_respects_refresh_window() {
		let now = OffsetDateTime::now_utc();
		let token = TokenResponse::bearer("t".into(), Some(Duration::seconds(90)));

		assert!(token.is_fresh_at(now, Duration::seconds(60)));
		assert!(!token.is_fresh_at(now + Duration::seconds(40), Duration::seconds(60)));
		assert!(!TokenResponse::bearer("t".into(), None).is_fresh_at(now, Duration::ZERO));
	}
}
