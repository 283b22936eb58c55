//! Case-insensitive property bag and the well-known destination property keys.

// self
use crate::_prelude::*;

/// Well-known property names.
pub mod keys {
	/// Destination name.
	pub const NAME: &str = "Name";
	/// Destination type, always `HTTP` for destinations built by this crate.
	pub const TYPE: &str = "Type";
	/// Target URL.
	pub const URI: &str = "URL";
	/// Authentication type.
	pub const AUTH_TYPE: &str = "Authentication";
	/// Alternative spelling of [`AUTH_TYPE`].
	pub const AUTH_TYPE_FALLBACK: &str = "authType";
	/// Basic authentication user.
	pub const USER: &str = "User";
	/// Alternative spelling of [`USER`].
	pub const USER_FALLBACK: &str = "username";
	/// Basic authentication password.
	pub const PASSWORD: &str = "Password";
	/// Pre-computed `Proxy-Authorization` header value.
	pub const PROXY_AUTH: &str = "ProxyAuthorization";
	/// Proxy URL.
	pub const PROXY_URI: &str = "Proxy";
	/// Proxy host, combined with [`PROXY_PORT`] when [`PROXY_URI`] is absent.
	pub const PROXY_HOST: &str = "ProxyHost";
	/// Proxy port.
	pub const PROXY_PORT: &str = "ProxyPort";
	/// Proxy type (`Internet` or `OnPremise`).
	pub const PROXY_TYPE: &str = "ProxyType";
	/// Principal propagation mode for on-premise destinations.
	pub const PRINCIPAL_PROPAGATION_MODE: &str = "cloudsdk.principalPropagationMode";
	/// Cloud connector location id.
	pub const CLOUD_CONNECTOR_LOCATION_ID: &str = "CloudConnectorLocationId";
	/// Tenant the destination was retrieved for; empty for the provider tenant.
	pub const TENANT_ID: &str = "cloudsdk.tenantId";
	/// Prefix of properties that become static request headers.
	pub const HEADER_PREFIX: &str = "URL.headers.";
}

/// Map with case-insensitive keys that remembers the original spelling.
///
/// Equality and hashing only look at the lowercased keys and the values.
#[derive(Clone, Default)]
pub struct DestinationProperties(BTreeMap<String, (String, String)>);
impl DestinationProperties {
	/// Looks up a property, ignoring key case.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.0.get(&key.to_ascii_lowercase()).map(|(_, value)| value.as_str())
	}

	/// Returns `true` when the key is present.
	pub fn contains(&self, key: &str) -> bool {
		self.0.contains_key(&key.to_ascii_lowercase())
	}

	/// Iterates `(key, value)` pairs using the original key spelling.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.values().map(|(key, value)| (key.as_str(), value.as_str()))
	}

	/// Number of properties.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when no property is set.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub(crate) fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
		let key = key.into();

		self.0.insert(key.to_ascii_lowercase(), (key, value.into()));
	}

	pub(crate) fn remove(&mut self, key: &str) -> Option<String> {
		self.0.remove(&key.to_ascii_lowercase()).map(|(_, value)| value)
	}
}
impl PartialEq for DestinationProperties {
	fn eq(&self, other: &Self) -> bool {
		self.0.len() == other.0.len()
			&& self
				.0
				.iter()
				.zip(other.0.iter())
				.all(|((ka, (_, va)), (kb, (_, vb)))| ka == kb && va == vb)
	}
}
impl Eq for DestinationProperties {}
impl Hash for DestinationProperties {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.0.len().hash(state);

		for (key, (_, value)) in &self.0 {
			key.hash(state);
			value.hash(state);
		}
	}
}
impl Debug for DestinationProperties {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let mut map = f.debug_map();

		for (key, value) in self.iter() {
			if is_sensitive(key) {
				map.entry(&key, &"<redacted>");
			} else {
				map.entry(&key, &value);
			}
		}

		map.finish()
	}
}
impl<K, V> FromIterator<(K, V)> for DestinationProperties
where
	K: Into<String>,
	V: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut properties = Self::default();

		for (key, value) in iter {
			properties.insert(key, value);
		}

		properties
	}
}

/// How requests to a destination authenticate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthenticationType {
	/// No authentication.
	NoAuthentication,
	/// HTTP basic authentication from the `User`/`Password` properties.
	BasicAuthentication,
	/// OAuth 2.0 bearer tokens supplied by a header provider.
	OAuth2,
	/// Forward the inbound request's `Authorization` header.
	TokenForwarding,
	/// Propagate the end user through an on-premise proxy.
	PrincipalPropagation,
	/// Mutual TLS with a client certificate.
	ClientCertificate,
}
impl AuthenticationType {
	/// Stable identifier used in property values.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::NoAuthentication => "NoAuthentication",
			Self::BasicAuthentication => "BasicAuthentication",
			Self::OAuth2 => "OAuth2ClientCredentials",
			Self::TokenForwarding => "TokenForwarding",
			Self::PrincipalPropagation => "PrincipalPropagation",
			Self::ClientCertificate => "ClientCertificateAuthentication",
		}
	}

	/// Parses an identifier, ignoring case.
	pub fn parse(value: &str) -> Option<Self> {
		let value = value.trim();

		[
			(Self::NoAuthentication, &["NoAuthentication"][..]),
			(Self::BasicAuthentication, &["BasicAuthentication"][..]),
			(Self::OAuth2, &["OAuth2ClientCredentials", "OAuth2"][..]),
			(Self::TokenForwarding, &["TokenForwarding"][..]),
			(Self::PrincipalPropagation, &["PrincipalPropagation"][..]),
			(
				Self::ClientCertificate,
				&["ClientCertificateAuthentication", "ClientCertificate"][..],
			),
		]
		.into_iter()
		.find(|(_, names)| names.iter().any(|name| name.eq_ignore_ascii_case(value)))
		.map(|(kind, _)| kind)
	}
}
impl Display for AuthenticationType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Network route to the target system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProxyType {
	/// Directly reachable over the internet.
	#[default]
	Internet,
	/// Reachable through the connectivity proxy and a cloud connector.
	OnPremise,
}
impl ProxyType {
	/// Stable identifier used in property values.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Internet => "Internet",
			Self::OnPremise => "OnPremise",
		}
	}

	/// Parses an identifier; matching is case-sensitive.
	pub fn parse(value: &str) -> Option<Self> {
		match value.trim() {
			"Internet" => Some(Self::Internet),
			"OnPremise" => Some(Self::OnPremise),
			_ => None,
		}
	}
}
impl Display for ProxyType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Principal propagation strategy for on-premise destinations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrincipalPropagationMode {
	/// Forward the user token in `SAP-Connectivity-Authentication` and authenticate the proxy hop
	/// as the current tenant's technical user.
	#[default]
	Compatibility,
	/// Exchange the user token for a proxy token (named user flow).
	Recommended,
}
impl PrincipalPropagationMode {
	/// Stable identifier used in property values.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Compatibility => "COMPATIBILITY",
			Self::Recommended => "RECOMMENDED",
		}
	}

	/// Parses an identifier, ignoring case.
	pub fn parse(value: &str) -> Option<Self> {
		let value = value.trim();

		if value.eq_ignore_ascii_case("COMPATIBILITY") {
			Some(Self::Compatibility)
		} else if value.eq_ignore_ascii_case("RECOMMENDED") {
			Some(Self::Recommended)
		} else {
			None
		}
	}
}

pub(crate) fn is_sensitive(key: &str) -> bool {
	[keys::PASSWORD, keys::PROXY_AUTH].iter().any(|k| k.eq_ignore_ascii_case(key))
		|| key.to_ascii_lowercase().contains("secret")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn keys_are_case_insensitive_and_keep_spelling() {
		let properties =
			DestinationProperties::from_iter([("URL", "https://a"), ("url", "https://b")]);

		assert_eq!(properties.len(), 1);
		assert_eq!(properties.get("Url"), Some("https://b"));
		assert_eq!(properties.iter().next(), Some(("url", "https://b")));
	}

	#[test]
	fn equality_ignores_key_case_but_not_values() {
		let a = DestinationProperties::from_iter([("Name", "x")]);
		let b = DestinationProperties::from_iter([("NAME", "x")]);
		let c = DestinationProperties::from_iter([("name", "y")]);

		assert_eq!(a, b);
		assert_ne!(a, c);
	}

	#[test]
	fn enum_identifiers_parse() {
		assert_eq!(
			AuthenticationType::parse("basicauthentication"),
			Some(AuthenticationType::BasicAuthentication)
		);
		assert_eq!(
			AuthenticationType::parse("OAuth2ClientCredentials"),
			Some(AuthenticationType::OAuth2)
		);
		assert_eq!(ProxyType::parse("onpremise"), None, "Proxy type matching is case-sensitive.");
		assert_eq!(
			PrincipalPropagationMode::parse("recommended"),
			Some(PrincipalPropagationMode::Recommended)
		);
	}

	#[test]
	fn debug_redacts_sensitive_values() {
		let properties =
			DestinationProperties::from_iter([("Password", "hunter2"), ("User", "me")]);
		let rendered = format!("{properties:?}");

		assert!(!rendered.contains("hunter2"));
		assert!(rendered.contains("me"));
	}
}
