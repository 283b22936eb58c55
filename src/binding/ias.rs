//! Rewrites identity-service backed bindings before OAuth 2.0 loading.

// self
use crate::{
	_prelude::*,
	binding::{
		IasOptions, ServiceBinding, ServiceBindingDestinationLoader,
		ServiceBindingDestinationOptions, ServiceIdentifier, TypedCredentials,
	},
	destination::Destination,
	error::{DestinationAccessError, LoadError},
	token::OnBehalfOf,
};

#[derive(Debug)]
struct HttpEndpoint {
	name: String,
	uri: Url,
	requires_token_for_technical_access: bool,
}
impl HttpEndpoint {
	fn parse(name: &str, entry: TypedCredentials) -> Result<Option<Self>, DestinationAccessError> {
		let is_http = entry
			.get_path(&["protocol"])
			.and_then(|protocol| protocol.as_str())
			.is_some_and(|protocol| protocol.eq_ignore_ascii_case("http"));

		if !is_http {
			return Ok(None);
		}

		let uri = entry.require_url(&["uri"]).map_err(|e| {
			DestinationAccessError::with_source(
				format!(
					"The URI of the IAS-based service binding for endpoint '{name}' is not a valid \
					URI."
				),
				e,
			)
		})?;
		let requires_token_for_technical_access =
			match entry.get_path(&["requires-token-for-technical-access"]) {
				None => true,
				Some(_) => entry.boolean(&["requires-token-for-technical-access"]).ok_or_else(|| {
					DestinationAccessError::new(format!(
						"The 'requires-token-for-technical-access' attribute of endpoint '{name}' \
						is not a valid boolean."
					))
				})?,
			};

		Ok(Some(Self { name: name.to_owned(), uri, requires_token_for_technical_access }))
	}
}

/// Handles bindings of services that authenticate through the identity service.
///
/// Such bindings declare `authentication-service.service-label = identity` and list their
/// `endpoints`. The binding is re-labelled as an identity binding, the first HTTP endpoint becomes
/// the [`IasOptions`] target URI, and the request is passed to the delegate. Any other binding is
/// [`LoadError::NotFound`].
#[derive(Clone, Debug)]
pub struct IdentityAuthenticationLoader {
	delegate: Arc<dyn ServiceBindingDestinationLoader>,
}
impl IdentityAuthenticationLoader {
	/// Creates a loader passing rewritten requests to `delegate`.
	pub fn new(delegate: Arc<dyn ServiceBindingDestinationLoader>) -> Self {
		Self { delegate }
	}

	fn endpoint(
		service: &str,
		credentials: TypedCredentials,
	) -> Result<HttpEndpoint, DestinationAccessError> {
		let no_endpoints = || {
			DestinationAccessError::new(
				"The IAS-based service binding does not contain any HTTP endpoints.",
			)
		};
		let raw = credentials.view(&["endpoints"]).ok_or_else(no_endpoints)?;
		let mut endpoints = Vec::new();

		for name in raw.keys() {
			let entry = raw.view(&[name]).ok_or_else(|| {
				DestinationAccessError::new(
					"The IAS-based service binding contains an endpoint that is not an object.",
				)
			})?;

			endpoints.extend(HttpEndpoint::parse(name, entry)?);
		}

		if endpoints.len() > 1 {
			tracing::warn!(
				service,
				endpoints = endpoints.len(),
				"The IAS-based service binding contains multiple HTTP endpoints; using the first."
			);
		}

		endpoints.into_iter().next().ok_or_else(no_endpoints)
	}
}
impl ServiceBindingDestinationLoader for IdentityAuthenticationLoader {
	fn name(&self) -> &str {
		"identity-authentication"
	}

	fn try_get_destination(
		&self,
		options: &ServiceBindingDestinationOptions,
	) -> Result<Destination, LoadError> {
		let binding = options.service_binding();
		let credentials = binding.credentials();
		let authentication_service = credentials.view(&["authentication-service"]);
		let is_ias = authentication_service
			.and_then(|view| view.get_path(&["service-label"]))
			.and_then(|label| label.as_str())
			.is_some_and(|label| label.eq_ignore_ascii_case("identity"));

		if !is_ias {
			return Err(LoadError::not_found(
				None,
				"The bound service is not backed by the IAS service.",
			));
		}

		let service = binding
			.service_identifier()
			.map_or_else(|| "unknown-service".to_owned(), ToString::to_string);
		let endpoint = Self::endpoint(&service, credentials)?;
		let mut ias = options
			.option::<IasOptions>()
			.cloned()
			.unwrap_or_default()
			.with_target_uri(endpoint.uri.clone());

		if !endpoint.requires_token_for_technical_access
			&& options.on_behalf_of() != OnBehalfOf::NamedUserCurrentTenant
		{
			ias = ias.without_token_for_technical_provider_user();
		} else if ias.application_name().is_none() && ias.consumer_client().is_none() {
			let application_name = authentication_service
				.and_then(|view| view.get_path(&["application-name"]))
				.and_then(|name| name.as_str());

			if let Some(name) = application_name {
				ias = ias.with_application_name(name);
			}
		}

		tracing::debug!(
			service = %service,
			endpoint = %endpoint.name,
			"Rewriting IAS-backed binding to an identity binding."
		);

		let mut rewritten = ServiceBinding::new(
			ServiceIdentifier::IDENTITY_AUTHENTICATION,
			binding.raw_credentials().clone(),
		)
		.with_tags(binding.tags().iter().cloned());

		if let Some(name) = binding.name() {
			rewritten = rewritten.with_name(name);
		}
		if let Some(plan) = binding.plan() {
			rewritten = rewritten.with_plan(plan);
		}

		let request = options.to_builder().service_binding(rewritten).replace_option(ias).build();

		self.delegate.try_get_destination(&request)
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::{Value, json};
	// self
	use super::*;

	#[derive(Debug, Default)]
	struct Capture(Mutex<Vec<ServiceBindingDestinationOptions>>);
	impl ServiceBindingDestinationLoader for Capture {
		fn name(&self) -> &str {
			"capture"
		}

		fn try_get_destination(
			&self,
			options: &ServiceBindingDestinationOptions,
		) -> Result<Destination, LoadError> {
			self.0.lock().push(options.clone());

			Ok(Destination::builder("https://captured.example")
				.build_unproxied()
				.expect("Fixture destination should build."))
		}
	}

	fn binding(credentials: Value) -> ServiceBinding {
		ServiceBinding::new(ServiceIdentifier::new("business-logging"), credentials)
	}

	fn ias_credentials(requires_token: bool) -> Value {
		json!({
			"authentication-service": {"service-label": "identity", "application-name": "app"},
			"endpoints": {
				"grpc": {"protocol": "grpc", "uri": "grpc://ignored.example"},
				"api": {
					"protocol": "http",
					"uri": "https://api.example",
					"requires-token-for-technical-access": requires_token,
				},
			},
			"clientid": "client",
			"url": "https://tenant.ias.example",
		})
	}

	fn load(
		credentials: Value,
		behalf: OnBehalfOf,
	) -> (Result<Destination, LoadError>, Vec<ServiceBindingDestinationOptions>) {
		let capture = Arc::new(Capture::default());
		let loader = IdentityAuthenticationLoader::new(capture.clone());
		let options = ServiceBindingDestinationOptions::for_service(binding(credentials))
			.on_behalf_of(behalf)
			.build();
		let result = loader.try_get_destination(&options);
		let captured = capture.0.lock().clone();

		(result, captured)
	}

	#[test]
	fn ias_backed_bindings_are_rewritten() {
		let (result, captured) = load(ias_credentials(true), OnBehalfOf::TechnicalUserProvider);

		result.expect("Delegate should produce a destination.");

		let request = &captured[0];
		let ias = request.option::<IasOptions>().expect("IAS options should be attached.");

		assert_eq!(
			request.service_binding().service_identifier(),
			Some(&ServiceIdentifier::IDENTITY_AUTHENTICATION)
		);
		assert_eq!(ias.target_uri().map(Url::as_str), Some("https://api.example/"));
		assert_eq!(ias.application_name(), Some("app"));
		assert!(!ias.mtls_only_for_technical_provider());
	}

	#[test]
	fn technical_access_without_token_uses_mtls_only() {
		let (_, captured) = load(ias_credentials(false), OnBehalfOf::TechnicalUserCurrentTenant);
		let ias = captured[0].option::<IasOptions>().expect("IAS options should be attached.");

		assert!(ias.mtls_only_for_technical_provider());
		assert_eq!(ias.application_name(), None);

		let (_, captured) = load(ias_credentials(false), OnBehalfOf::NamedUserCurrentTenant);
		let ias = captured[0].option::<IasOptions>().expect("IAS options should be attached.");

		assert!(!ias.mtls_only_for_technical_provider());
	}

	#[test]
	fn other_bindings_are_not_found_and_missing_endpoints_fail() {
		let (result, captured) =
			load(json!({"clientid": "client"}), OnBehalfOf::TechnicalUserProvider);

		assert!(matches!(result, Err(LoadError::NotFound(_))));
		assert!(captured.is_empty());

		let (result, _) = load(
			json!({"authentication-service": {"service-label": "IDENTITY"}, "endpoints": {}}),
			OnBehalfOf::TechnicalUserProvider,
		);

		assert!(matches!(
			result,
			Err(LoadError::Access(e)) if e.message.contains("HTTP endpoints")
		));
	}
}
