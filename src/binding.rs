//! Service bindings and the loaders that turn them into OAuth 2.0 destinations.
//!
//! A [`ServiceBinding`] is the credential bundle of one bound service instance. The
//! [`OAuth2ServiceBindingLoader`] picks a property supplier for the binding from the
//! [`PropertySupplierRegistry`] and mints a destination whose `Authorization` header is produced
//! by a tenant-aware token provider. Identity-service backed bindings are first rewritten by the
//! [`IdentityAuthenticationLoader`].

pub mod accessor;
pub mod credentials;
pub mod ias;
pub mod loader;
pub mod oauth2;
pub mod options;
pub mod supplier;

pub use accessor::*;
pub use credentials::*;
pub use ias::*;
pub use loader::*;
pub use oauth2::*;
pub use options::*;
pub use supplier::*;

// std
use std::borrow::Cow;
// crates.io
use serde_json::Value;
// self
use crate::{_prelude::*, destination::Destination};

/// Normalized (trimmed, lowercase) service label.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceIdentifier(Cow<'static, str>);
impl ServiceIdentifier {
	/// Connectivity proxy service.
	pub const CONNECTIVITY: Self = Self(Cow::Borrowed("connectivity"));
	/// Destination service.
	pub const DESTINATION: Self = Self(Cow::Borrowed("destination"));
	/// Identity authentication service.
	pub const IDENTITY_AUTHENTICATION: Self = Self(Cow::Borrowed("identity"));
	/// XSUAA authorization service.
	pub const XSUAA: Self = Self(Cow::Borrowed("xsuaa"));

	/// Normalizes `label` into an identifier.
	pub fn new(label: impl AsRef<str>) -> Self {
		Self(Cow::Owned(label.as_ref().trim().to_ascii_lowercase()))
	}

	/// Identifier text.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Debug for ServiceIdentifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ServiceIdentifier").field(&self.as_str()).finish()
	}
}
impl Display for ServiceIdentifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl From<&str> for ServiceIdentifier {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

/// Credentials and metadata of one bound service instance.
#[derive(Clone, PartialEq)]
pub struct ServiceBinding {
	name: Option<String>,
	service_identifier: Option<ServiceIdentifier>,
	plan: Option<String>,
	tags: Vec<String>,
	credentials: Value,
}
impl ServiceBinding {
	/// Creates a binding of `service` with the given credentials object.
	pub fn new(service: ServiceIdentifier, credentials: Value) -> Self {
		Self {
			name: None,
			service_identifier: Some(service),
			plan: None,
			tags: Vec::new(),
			credentials,
		}
	}

	/// Creates a binding without a known service label.
	pub fn unidentified(credentials: Value) -> Self {
		Self { name: None, service_identifier: None, plan: None, tags: Vec::new(), credentials }
	}

	/// Sets the instance name.
	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());

		self
	}

	/// Sets the service plan.
	pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
		self.plan = Some(plan.into());

		self
	}

	/// Sets the tags.
	pub fn with_tags<I, S>(mut self, tags: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.tags = tags.into_iter().map(Into::into).collect();

		self
	}

	/// Instance name.
	pub fn name(&self) -> Option<&str> {
		self.name.as_deref()
	}

	/// Service label.
	pub fn service_identifier(&self) -> Option<&ServiceIdentifier> {
		self.service_identifier.as_ref()
	}

	/// Service plan.
	pub fn plan(&self) -> Option<&str> {
		self.plan.as_deref()
	}

	/// Tags.
	pub fn tags(&self) -> &[String] {
		&self.tags
	}

	/// Path-addressable view over the credentials.
	pub fn credentials(&self) -> TypedCredentials<'_> {
		TypedCredentials::new(&self.credentials)
	}

	/// Raw credentials object.
	pub fn raw_credentials(&self) -> &Value {
		&self.credentials
	}
}
impl Debug for ServiceBinding {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceBinding")
			.field("name", &self.name)
			.field("service_identifier", &self.service_identifier)
			.field("plan", &self.plan)
			.field("tags", &self.tags)
			.field("credentials", &self.credentials().keys().collect::<Vec<_>>())
			.finish()
	}
}

/// Resolves `options` with the process-wide service-binding loader chain.
pub fn try_get_destination(options: &ServiceBindingDestinationOptions) -> Result<Destination> {
	Ok(ServiceBindingLoaderChain::global().try_get_destination(options)?)
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn identifiers_are_normalized() {
		assert_eq!(ServiceIdentifier::new(" XSUAA "), ServiceIdentifier::XSUAA);
		assert_eq!(ServiceIdentifier::from("Identity").to_string(), "identity");
	}

	#[test]
	fn debug_output_hides_credential_values() {
		let binding = ServiceBinding::new(
			ServiceIdentifier::XSUAA,
			json!({"clientid": "id", "clientsecret": "very-secret"}),
		)
		.with_name("uaa-instance");
		let rendered = format!("{binding:?}");

		assert!(rendered.contains("clientsecret"));
		assert!(!rendered.contains("very-secret"));
	}
}
