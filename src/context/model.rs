//! Values carried by the ambient context: tenant, principal, user token, and inbound headers.

// crates.io
use jsonwebtoken::dangerous;
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	auth::{PrincipalId, TenantId, TokenSecret},
	error::ContextError,
};

/// Subscriber tenant, optionally carrying the subdomain used for token endpoint rewriting.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tenant {
	/// Tenant (zone) identifier.
	pub id: TenantId,
	/// Tenant subdomain, when known.
	pub subdomain: Option<String>,
}
impl Tenant {
	/// Creates a tenant without a subdomain.
	pub fn new(id: TenantId) -> Self {
		Self { id, subdomain: None }
	}

	/// Attaches a subdomain.
	pub fn with_subdomain(mut self, subdomain: impl Into<String>) -> Self {
		self.subdomain = Some(subdomain.into());

		self
	}
}

/// End user or technical principal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Principal {
	/// Principal identifier.
	pub id: PrincipalId,
}
impl Principal {
	/// Creates a principal.
	pub fn new(id: PrincipalId) -> Self {
		Self { id }
	}
}

/// Current user's JWT.
///
/// The payload is decoded without signature verification; validating the token is the job of
/// whatever accepted the inbound request.
#[derive(Clone)]
pub struct AuthToken {
	raw: TokenSecret,
	claims: Arc<Map<String, Value>>,
}
impl AuthToken {
	/// Decodes the header and claims of a compact JWT.
	pub fn decode(jwt: impl Into<String>) -> Result<Self, ContextError> {
		let raw = jwt.into();
		let claims = dangerous::insecure_decode::<Map<String, Value>>(&raw)
			.map_err(|e| ContextError::InvalidToken { reason: e.to_string() })?
			.claims;

		Ok(Self { raw: TokenSecret::new(raw), claims: Arc::new(claims) })
	}

	/// Encoded token, for forwarding or exchanging.
	pub fn token(&self) -> &TokenSecret {
		&self.raw
	}

	/// Raw claim lookup.
	pub fn claim(&self, name: &str) -> Option<&Value> {
		self.claims.get(name)
	}

	/// Tenant embedded in the token: `app_tid`, falling back to `zid`.
	pub fn tenant_id(&self) -> Option<&str> {
		["app_tid", "zid"]
			.into_iter()
			.find_map(|claim| self.claim(claim).and_then(Value::as_str).filter(|v| !v.is_empty()))
	}

	/// Tenant subdomain from the `ext_attr.zdn` claim.
	pub fn subdomain(&self) -> Option<&str> {
		self.claim("ext_attr")?.get("zdn")?.as_str()
	}

	/// Subject (`sub`) of the token.
	pub fn subject(&self) -> Option<&str> {
		self.claim("sub").and_then(Value::as_str)
	}
}
impl PartialEq for AuthToken {
	fn eq(&self, other: &Self) -> bool {
		self.raw == other.raw
	}
}
impl Eq for AuthToken {}
impl Debug for AuthToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthToken")
			.field("token", &self.raw)
			.field("tenant_id", &self.tenant_id())
			.finish()
	}
}

/// Headers of the inbound request, looked up case-insensitively.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestHeaders(Vec<(String, String)>);
impl RequestHeaders {
	/// Builds the header list from name/value pairs, keeping duplicates in order.
	pub fn from_pairs<I, K, V>(pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}

	/// All values for `name`, in arrival order.
	pub fn get_all<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a str> + use<'a, 'n> {
		self.0.iter().filter(move |(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
	}

	/// First value for `name`.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.get_all(name).next()
	}

	/// Returns `true` when no header is present.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

#[cfg(test)]
pub(crate) fn encode_test_jwt(claims: Value) -> String {
	// crates.io
	use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
	let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

	format!("{header}.{payload}.sig")
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn tenant_claim_prefers_app_tid() {
		let token = AuthToken::decode(encode_test_jwt(json!({"app_tid": "t1", "zid": "t2"})))
			.expect("Token fixture should decode.");

		assert_eq!(token.tenant_id(), Some("t1"));

		let token =
			AuthToken::decode(encode_test_jwt(json!({"zid": "t2", "ext_attr": {"zdn": "sub"}})))
				.expect("Token fixture should decode.");

		assert_eq!(token.tenant_id(), Some("t2"));
		assert_eq!(token.subdomain(), Some("sub"));
	}

	#[test]
	fn malformed_tokens_are_rejected() {
		// crates.io
		use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

		let valid = encode_test_jwt(json!({"sub": "user"}));
		let (header, _) = valid.split_once('.').expect("Encoded token should contain a dot.");

		assert!(AuthToken::decode("abc").is_err());
		assert!(AuthToken::decode(format!("{header}.!!!.sig")).is_err());
		assert!(
			AuthToken::decode(format!("{header}.{}.sig", URL_SAFE_NO_PAD.encode("[1]"))).is_err(),
			"Claims must be a JSON object."
		);

		let unsupported = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
		let empty_claims = URL_SAFE_NO_PAD.encode("{}");

		assert!(
			AuthToken::decode(format!("{unsupported}.{empty_claims}.sig")).is_err(),
			"Headers must name a known algorithm."
		);
		assert!(AuthToken::decode(valid).is_ok());
	}

	#[test]
	fn request_headers_are_case_insensitive() {
		let headers = RequestHeaders::from_pairs([
			("Authorization", "Bearer a"),
			("authorization", "Bearer b"),
		]);

		assert_eq!(headers.get("AUTHORIZATION"), Some("Bearer a"));
		assert_eq!(headers.get_all("authorization").count(), 2);
	}
}
