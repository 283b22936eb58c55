//! Transport primitives for token endpoint exchanges.
//!
//! [`TokenHttpClient`] is the crate's only dependency on an HTTP stack. Token services obtain one
//! client per [`ClientIdentity`] through an [`HttpClientFactory`]; the default factory builds a
//! [`ReqwestHttpClient`] that presents the identity's certificate chain when it is
//! certificate-based.

// crates.io
use oauth2::{
	HttpRequest, HttpResponse,
	http::{HeaderMap, header::RETRY_AFTER},
};
use reqwest::{Identity, redirect::Policy};
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	auth::ClientIdentity,
	error::{ConfigError, TransportError},
};

/// Boxed future returned by [`TokenHttpClient::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + 'a + Send>>;

/// Executes token endpoint requests.
///
/// Implementations must return every HTTP response, including error statuses, so the token
/// service can classify them; only connection-level failures map to [`TransportError`].
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and returns the raw response.
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_>;
}

/// Produces a transport bound to one client identity.
pub trait HttpClientFactory
where
	Self: Debug + Send + Sync,
{
	/// Builds the transport used for all token requests of `identity`.
	fn create(&self, identity: &ClientIdentity) -> Result<Arc<dyn TokenHttpClient>, ConfigError>;
}

/// Metadata captured from a token endpoint response for error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the token endpoint, if available.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}
impl ResponseMetadata {
	/// Extracts status and retry hint from `response`.
	pub fn from_response(response: &HttpResponse) -> Self {
		Self {
			status: Some(response.status().as_u16()),
			retry_after: parse_retry_after(response.headers()),
		}
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Token requests never follow redirects; token endpoints answer directly.
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient(pub ReqwestClient);
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds a client for `identity`, attaching its certificate chain for mutual TLS.
	pub fn for_identity(identity: &ClientIdentity) -> Result<Self, ConfigError> {
		let mut builder = ReqwestClient::builder().redirect(Policy::none());

		if let Some(pem) = identity.key_store().and_then(|store| store.identity_pem()) {
			builder = builder.identity(Identity::from_pem(pem.expose().as_bytes())?);
		}

		Ok(Self(builder.build()?))
	}
}
impl TokenHttpClient for ReqwestHttpClient {
	fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let request = request.try_into().map_err(TransportError::from)?;
			let response = self.0.execute(request).await?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let mut converted = HttpResponse::new(response.bytes().await?.to_vec());

			*converted.status_mut() = status;
			*converted.headers_mut() = headers;

			Ok(converted)
		})
	}
}

/// Factory building one [`ReqwestHttpClient`] per identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReqwestHttpClientFactory;
impl HttpClientFactory for ReqwestHttpClientFactory {
	fn create(&self, identity: &ClientIdentity) -> Result<Arc<dyn TokenHttpClient>, ConfigError> {
		tracing::debug!(
			client_id = identity.id(),
			certificate = identity.is_certificate_based(),
			"Building token endpoint HTTP client."
		);

		Ok(Arc::new(ReqwestHttpClient::for_identity(identity)?))
	}
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(i64::from(secs)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::{HeaderValue, StatusCode};
	// self
	use super::*;

	#[test]
	fn retry_after_accepts_seconds_and_ignores_garbage() {
		let mut response = HttpResponse::new(Vec::new());

		*response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
		response.headers_mut().insert(RETRY_AFTER, HeaderValue::from_static("7"));

		let meta = ResponseMetadata::from_response(&response);

		assert_eq!(meta.status, Some(429));
		assert_eq!(meta.retry_after, Some(Duration::seconds(7)));

		response.headers_mut().insert(RETRY_AFTER, HeaderValue::from_static("soon"));

		assert_eq!(ResponseMetadata::from_response(&response).retry_after, None);
	}

	#[test]
	fn secret_identities_get_a_plain_client() {
		let identity = ClientIdentity::secret("client", "secret");

		assert!(ReqwestHttpClientFactory.create(&identity).is_ok());
	}
}
