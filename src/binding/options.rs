//! Requests against service bindings and the options they carry.

// self
use crate::{
	_prelude::*,
	binding::{ServiceBinding, ServiceBindingAccessor, ServiceIdentifier},
	destination::{Destination, OptionBag},
	error::{ConfigError, DestinationAccessError},
	resilience::{CircuitBreakerPolicy, IsolationScope, ResilienceConfiguration, RetryPolicy},
	token::OnBehalfOf,
};

/// Which binding to turn into a destination, acting as whom, with which options.
#[derive(Clone, Debug)]
pub struct ServiceBindingDestinationOptions {
	binding: ServiceBinding,
	behalf: OnBehalfOf,
	options: OptionBag,
}
impl ServiceBindingDestinationOptions {
	/// Starts a request for `binding`.
	pub fn for_service(binding: ServiceBinding) -> ServiceBindingDestinationOptionsBuilder {
		ServiceBindingDestinationOptionsBuilder {
			binding,
			behalf: OnBehalfOf::default(),
			options: OptionBag::default(),
		}
	}

	/// Starts a request for the single binding of `service` known to `accessor`.
	///
	/// Zero or several matching bindings fail with an access error.
	pub fn for_service_identifier(
		accessor: &dyn ServiceBindingAccessor,
		service: &ServiceIdentifier,
	) -> Result<ServiceBindingDestinationOptionsBuilder> {
		let mut matching = accessor
			.service_bindings()?
			.into_iter()
			.filter(|binding| binding.service_identifier() == Some(service))
			.collect::<Vec<_>>();

		match (matching.pop(), matching.len()) {
			(Some(binding), 0) => Ok(Self::for_service(binding)),
			(found, others) => Err(DestinationAccessError::new(format!(
				"Expected exactly one service binding for service '{service}', but found {}.",
				others + usize::from(found.is_some())
			))
			.into()),
		}
	}

	/// Binding to interpret.
	pub fn service_binding(&self) -> &ServiceBinding {
		&self.binding
	}

	/// Identity the destination acts as.
	pub fn on_behalf_of(&self) -> OnBehalfOf {
		self.behalf
	}

	/// Option of type `O`, if present.
	pub fn option<O>(&self) -> Option<&O>
	where
		O: Any,
	{
		self.options.get()
	}

	/// All options.
	pub fn options(&self) -> &OptionBag {
		&self.options
	}

	/// Copies this request into a builder.
	pub fn to_builder(&self) -> ServiceBindingDestinationOptionsBuilder {
		ServiceBindingDestinationOptionsBuilder {
			binding: self.binding.clone(),
			behalf: self.behalf,
			options: self.options.clone(),
		}
	}
}

/// Builder for [`ServiceBindingDestinationOptions`].
#[derive(Clone, Debug)]
pub struct ServiceBindingDestinationOptionsBuilder {
	binding: ServiceBinding,
	behalf: OnBehalfOf,
	options: OptionBag,
}
impl ServiceBindingDestinationOptionsBuilder {
	/// Sets the behalf; defaults to [`OnBehalfOf::TechnicalUserCurrentTenant`].
	pub fn on_behalf_of(mut self, behalf: OnBehalfOf) -> Self {
		self.behalf = behalf;

		self
	}

	/// Adds an option; each option type may appear once.
	pub fn with_option<O>(mut self, option: O) -> Result<Self, ConfigError>
	where
		O: Any + Send + Sync,
	{
		self.options.insert(option)?;

		Ok(self)
	}

	pub(crate) fn service_binding(mut self, binding: ServiceBinding) -> Self {
		self.binding = binding;

		self
	}

	pub(crate) fn replace_option<O>(mut self, option: O) -> Self
	where
		O: Any + Send + Sync,
	{
		self.options.replace(option);

		self
	}

	/// Finishes the request.
	pub fn build(self) -> ServiceBindingDestinationOptions {
		ServiceBindingDestinationOptions {
			binding: self.binding,
			behalf: self.behalf,
			options: self.options,
		}
	}
}

/// Destination whose traffic is routed through the service of the binding.
#[derive(Clone, Debug)]
pub struct ProxyOptions(pub Destination);

/// Resilience overrides for token retrieval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResilienceOptions {
	/// Per-attempt time limit; `None` disables it.
	pub timeout: Option<Duration>,
	/// Retry policy.
	pub retry: RetryPolicy,
	/// Whether breaker state is shared across tenants.
	pub isolation_scope: IsolationScope,
	/// Circuit breaker policy; `None` disables it.
	pub circuit_breaker: Option<CircuitBreakerPolicy>,
}
impl ResilienceOptions {
	/// Configuration for `isolation_key` with these overrides applied.
	pub fn configuration(&self, isolation_key: impl Into<String>) -> ResilienceConfiguration {
		ResilienceConfiguration::new(isolation_key)
			.with_timeout(self.timeout)
			.with_retry(self.retry.clone())
			.with_isolation_scope(self.isolation_scope)
			.with_circuit_breaker(self.circuit_breaker.clone())
	}
}
impl Default for ResilienceOptions {
	fn default() -> Self {
		Self {
			timeout: Some(ResilienceConfiguration::DEFAULT_TIMEOUT),
			retry: RetryPolicy::disabled(),
			isolation_scope: IsolationScope::default(),
			circuit_breaker: Some(CircuitBreakerPolicy::default()),
		}
	}
}

/// Consumer client addressed through the identity service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerClient {
	/// Client id of the consumer.
	pub client_id: String,
	/// Tenant of the consumer, if it differs from the caller's.
	pub tenant_id: Option<String>,
}

/// Identity-service specific request settings.
///
/// An application name and a consumer client are alternatives; setting one clears the other.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IasOptions {
	target_uri: Option<Url>,
	application_name: Option<String>,
	consumer_client: Option<ConsumerClient>,
	mtls_only_for_technical_provider: bool,
}
impl IasOptions {
	/// Sends requests to `uri` instead of the binding's endpoint.
	pub fn with_target_uri(mut self, uri: Url) -> Self {
		self.target_uri = Some(uri);

		self
	}

	/// Requests tokens for the application registered under `name`.
	pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
		self.application_name = Some(name.into());
		self.consumer_client = None;

		self
	}

	/// Requests tokens for a consumer client, optionally in another tenant.
	pub fn with_consumer_client(
		mut self,
		client_id: impl Into<String>,
		tenant_id: Option<&str>,
	) -> Self {
		self.consumer_client = Some(ConsumerClient {
			client_id: client_id.into(),
			tenant_id: tenant_id.map(ToOwned::to_owned),
		});
		self.application_name = None;

		self
	}

	/// Uses mTLS only, without a token, when acting as the provider's technical user.
	pub fn without_token_for_technical_provider_user(mut self) -> Self {
		self.mtls_only_for_technical_provider = true;

		self
	}

	/// Target URI override.
	pub fn target_uri(&self) -> Option<&Url> {
		self.target_uri.as_ref()
	}

	/// Application name.
	pub fn application_name(&self) -> Option<&str> {
		self.application_name.as_deref()
	}

	/// Consumer client.
	pub fn consumer_client(&self) -> Option<&ConsumerClient> {
		self.consumer_client.as_ref()
	}

	/// Whether technical provider access skips token retrieval.
	pub fn mtls_only_for_technical_provider(&self) -> bool {
		self.mtls_only_for_technical_provider
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::binding::StaticServiceBindingAccessor;

	fn binding(service: &str) -> ServiceBinding {
		ServiceBinding::new(ServiceIdentifier::new(service), json!({"url": "https://s.example"}))
	}

	#[test]
	fn exactly_one_binding_must_match() {
		let accessor = StaticServiceBindingAccessor::new([
			binding("xsuaa"),
			binding("destination"),
			binding("destination"),
		]);
		let single = ServiceBindingDestinationOptions::for_service_identifier(
			&accessor,
			&ServiceIdentifier::XSUAA,
		)
		.expect("A single xsuaa binding should be selected.")
		.build();

		assert_eq!(single.service_binding().service_identifier(), Some(&ServiceIdentifier::XSUAA));

		let ambiguous = [(ServiceIdentifier::DESTINATION, 2), (ServiceIdentifier::new("x"), 0)];

		for (service, count) in ambiguous {
			match ServiceBindingDestinationOptions::for_service_identifier(&accessor, &service) {
				Err(Error::Access(e)) => assert!(e.message.ends_with(&format!("found {count}."))),
				other => panic!("Expected an access error, got {other:?}."),
			}
		}
	}

	#[test]
	fn options_are_unique_per_type() {
		let options = ServiceBindingDestinationOptions::for_service(binding("xsuaa"))
			.on_behalf_of(OnBehalfOf::TechnicalUserProvider)
			.with_option(IasOptions::default().with_application_name("app"))
			.expect("First IAS option should be accepted.");

		assert!(options.clone().with_option(IasOptions::default()).is_err());

		let options = options.replace_option(IasOptions::default()).build();

		assert_eq!(options.on_behalf_of(), OnBehalfOf::TechnicalUserProvider);
		assert_eq!(options.option::<IasOptions>(), Some(&IasOptions::default()));
	}

	#[test]
	fn application_name_and_consumer_client_are_exclusive() {
		let options = IasOptions::default()
			.with_application_name("app")
			.with_consumer_client("consumer", Some("t1"));

		assert_eq!(options.application_name(), None);
		assert_eq!(
			options.consumer_client().map(|client| client.tenant_id.as_deref()),
			Some(Some("t1"))
		);
	}
}
