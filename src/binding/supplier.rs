//! OAuth 2.0 property suppliers and the registry that selects one per binding.

pub mod builtin;

pub use builtin::*;

// std
use std::panic::{self, AssertUnwindSafe};
// self
use crate::{
	_prelude::*,
	auth::{ClientIdentity, KeyStore},
	binding::{ServiceBindingDestinationOptions, ServiceIdentifier},
	error::{DestinationAccessError, DestinationNotFound},
};

/// Predicate deciding whether a registry entry handles a request.
pub type SupplierPredicate = Arc<dyn Fn(&ServiceBindingDestinationOptions) -> bool + Send + Sync>;
/// Factory instantiating a supplier for a request.
pub type SupplierFactory = Arc<
	dyn Fn(&ServiceBindingDestinationOptions) -> Box<dyn OAuth2PropertySupplier> + Send + Sync,
>;

/// Reads the OAuth 2.0 properties of one service binding.
pub trait OAuth2PropertySupplier
where
	Self: Send + Sync,
{
	/// Returns `true` when the binding carries usable OAuth 2.0 credentials.
	fn is_oauth2_binding(&self) -> bool;

	/// URI of the bound service.
	fn service_uri(&self) -> Result<Url, DestinationAccessError>;

	/// Token endpoint.
	fn token_uri(&self) -> Result<Url, DestinationAccessError>;

	/// Client identity presented to the token endpoint.
	fn client_identity(&self) -> Result<ClientIdentity, DestinationAccessError>;

	/// Flow tuning.
	fn oauth2_options(&self) -> Result<OAuth2Options, DestinationAccessError> {
		Ok(OAuth2Options::default())
	}
}

/// Flow options produced by a supplier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OAuth2Options {
	/// Produce a destination without an `Authorization` header provider.
	pub skip_token_retrieval: bool,
	/// Extra form parameters sent with every token request.
	pub additional_parameters: BTreeMap<String, String>,
	/// Client key store used for mTLS towards the service itself.
	pub client_key_store: Option<KeyStore>,
	/// Token request timeout override.
	pub timeout: Option<Duration>,
	/// Token cache refresh window override.
	pub refresh_window: Option<Duration>,
}
impl OAuth2Options {
	/// Options that skip token retrieval.
	pub fn skip_token_retrieval() -> Self {
		Self { skip_token_retrieval: true, ..Default::default() }
	}

	/// Adds an extra token request parameter.
	pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.additional_parameters.insert(name.into(), value.into());

		self
	}

	/// Sets the client key store.
	pub fn with_client_key_store(mut self, key_store: KeyStore) -> Self {
		self.client_key_store = Some(key_store);

		self
	}
}

/// Order in which custom registrations are evaluated.
///
/// Custom registrations are always evaluated before the built-in suppliers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SupplierOrder {
	/// Latest registration first.
	#[default]
	MostRecentFirst,
	/// Earliest registration first.
	OldestFirst,
}

#[derive(Clone)]
struct SupplierEntry {
	label: String,
	predicate: SupplierPredicate,
	factory: SupplierFactory,
}
impl SupplierEntry {
	fn new(label: String, predicate: SupplierPredicate, factory: SupplierFactory) -> Self {
		Self { label, predicate, factory }
	}

	fn for_service(service: ServiceIdentifier, factory: SupplierFactory) -> Self {
		Self::new(
			service.to_string(),
			Arc::new(move |options: &ServiceBindingDestinationOptions| {
				options.service_binding().service_identifier() == Some(&service)
			}),
			factory,
		)
	}
}

#[derive(Clone, Default)]
struct RegistryState {
	custom: Vec<SupplierEntry>,
	builtin: Vec<SupplierEntry>,
	order: SupplierOrder,
}
impl RegistryState {
	fn evaluation_order(&self) -> Vec<SupplierEntry> {
		let custom: Box<dyn Iterator<Item = &SupplierEntry>> = match self.order {
			SupplierOrder::MostRecentFirst => Box::new(self.custom.iter().rev()),
			SupplierOrder::OldestFirst => Box::new(self.custom.iter()),
		};

		custom.chain(self.builtin.iter()).cloned().collect()
	}
}

/// Ordered, mutable list of `(predicate, factory)` pairs.
///
/// Selection picks the first entry whose predicate matches and whose supplier reports an OAuth 2.0
/// binding. Each predicate, factory and self-check runs in isolation: a panicking entry is logged
/// and skipped.
pub struct PropertySupplierRegistry {
	state: RwLock<RegistryState>,
}
impl PropertySupplierRegistry {
	/// Registry without any entries.
	pub fn empty() -> Self {
		Self { state: RwLock::new(RegistryState::default()) }
	}

	/// Registry with the built-in suppliers.
	pub fn with_defaults() -> Self {
		let state = RegistryState { builtin: builtin::builtin_entries(), ..Default::default() };

		Self { state: RwLock::new(state) }
	}

	/// Process-wide registry.
	pub fn global() -> Arc<Self> {
		static GLOBAL: LazyLock<Arc<PropertySupplierRegistry>> =
			LazyLock::new(|| Arc::new(PropertySupplierRegistry::with_defaults()));

		GLOBAL.clone()
	}

	/// Registers a supplier for requests matching `predicate`.
	pub fn register<P, F, S>(&self, label: impl Into<String>, predicate: P, factory: F)
	where
		P: 'static + Fn(&ServiceBindingDestinationOptions) -> bool + Send + Sync,
		F: 'static + Fn(&ServiceBindingDestinationOptions) -> S + Send + Sync,
		S: 'static + OAuth2PropertySupplier,
	{
		let label = label.into();

		tracing::debug!(supplier = %label, "Registering OAuth2 property supplier.");

		self.state.write().custom.push(SupplierEntry::new(
			label,
			Arc::new(predicate),
			boxed_factory(factory),
		));
	}

	/// Registers a supplier for every binding of `service`.
	pub fn register_for_service<F, S>(&self, service: ServiceIdentifier, factory: F)
	where
		F: 'static + Fn(&ServiceBindingDestinationOptions) -> S + Send + Sync,
		S: 'static + OAuth2PropertySupplier,
	{
		tracing::debug!(service = %service, "Registering OAuth2 property supplier.");

		self.state.write().custom.push(SupplierEntry::for_service(service, boxed_factory(factory)));
	}

	/// Drops every custom registration.
	pub fn reset(&self) {
		tracing::warn!("Resetting the OAuth2 property suppliers to their defaults.");

		self.state.write().custom.clear();
	}

	/// Sets the evaluation order of custom registrations.
	pub fn set_order(&self, order: SupplierOrder) {
		self.state.write().order = order;
	}

	/// Evaluation order of custom registrations.
	pub fn order(&self) -> SupplierOrder {
		self.state.read().order
	}

	/// Number of entries, custom and built-in.
	pub fn len(&self) -> usize {
		let state = self.state.read();

		state.custom.len() + state.builtin.len()
	}

	/// Returns `true` when the registry has no entries.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Selects the supplier for `options`.
	pub fn select(
		&self,
		options: &ServiceBindingDestinationOptions,
	) -> Result<Box<dyn OAuth2PropertySupplier>, DestinationNotFound> {
		// Factories may touch the registry; scan a snapshot.
		let entries = self.state.read().evaluation_order();
		let mut tried = 0;

		for entry in &entries {
			tried += 1;

			let Some(matches) = isolate(&entry.label, "predicate", || (entry.predicate)(options))
			else {
				continue;
			};

			if !matches {
				continue;
			}

			let Some(supplier) = isolate(&entry.label, "factory", || (entry.factory)(options))
			else {
				continue;
			};

			if isolate(&entry.label, "OAuth2 check", || supplier.is_oauth2_binding())
				.unwrap_or(false)
			{
				tracing::debug!(supplier = %entry.label, "Selected OAuth2 property supplier.");

				return Ok(supplier);
			}
		}

		let service = options
			.service_binding()
			.service_identifier()
			.map_or_else(|| "<unknown>".to_owned(), ToString::to_string);

		Err(DestinationNotFound::new(
			None,
			format!(
				"No property mapping for the provided service {service} found. You may provide your \
				own mapping by registering a property supplier with \
				`PropertySupplierRegistry::register`."
			),
		)
		.with_suppliers_tried(tried))
	}
}
impl Default for PropertySupplierRegistry {
	fn default() -> Self {
		Self::with_defaults()
	}
}
impl Debug for PropertySupplierRegistry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.read();

		f.debug_struct("PropertySupplierRegistry")
			.field(
				"entries",
				&state.evaluation_order().iter().map(|e| e.label.clone()).collect::<Vec<_>>(),
			)
			.field("order", &state.order)
			.finish()
	}
}

pub(crate) fn boxed_factory<F, S>(factory: F) -> SupplierFactory
where
	F: 'static + Fn(&ServiceBindingDestinationOptions) -> S + Send + Sync,
	S: 'static + OAuth2PropertySupplier,
{
	Arc::new(
		move |options: &ServiceBindingDestinationOptions| -> Box<dyn OAuth2PropertySupplier> {
			Box::new(factory(options))
		},
	)
}

fn isolate<T>(label: &str, stage: &str, f: impl FnOnce() -> T) -> Option<T> {
	match panic::catch_unwind(AssertUnwindSafe(f)) {
		Ok(value) => Some(value),
		Err(payload) => {
			let reason = payload
				.downcast_ref::<&str>()
				.map(|s| (*s).to_owned())
				.or_else(|| payload.downcast_ref::<String>().cloned())
				.unwrap_or_else(|| "unknown panic".into());

			tracing::error!(
				supplier = label,
				stage,
				reason = %reason,
				"OAuth2 property supplier failed."
			);

			None
		},
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::binding::ServiceBinding;

	struct Labeled(&'static str);
	impl OAuth2PropertySupplier for Labeled {
		fn is_oauth2_binding(&self) -> bool {
			true
		}

		fn service_uri(&self) -> Result<Url, DestinationAccessError> {
			Url::parse(&format!("https://{}.example", self.0))
				.map_err(|e| DestinationAccessError::with_source("Bad fixture.", e))
		}

		fn token_uri(&self) -> Result<Url, DestinationAccessError> {
			self.service_uri()
		}

		fn client_identity(&self) -> Result<ClientIdentity, DestinationAccessError> {
			Ok(ClientIdentity::secret(self.0, "secret"))
		}
	}

	fn options(service: &str) -> ServiceBindingDestinationOptions {
		ServiceBindingDestinationOptions::for_service(ServiceBinding::new(
			ServiceIdentifier::new(service),
			json!({}),
		))
		.build()
	}

	fn selected(registry: &PropertySupplierRegistry, service: &str) -> String {
		registry
			.select(&options(service))
			.expect("A supplier should be selected.")
			.client_identity()
			.expect("Fixture identity should resolve.")
			.id()
			.to_owned()
	}

	#[test]
	fn most_recent_registration_wins_by_default() {
		let registry = PropertySupplierRegistry::empty();

		registry.register("first", |_| true, |_| Labeled("first"));
		registry.register("second", |_| true, |_| Labeled("second"));

		assert_eq!(selected(&registry, "custom"), "second");

		registry.set_order(SupplierOrder::OldestFirst);

		assert_eq!(selected(&registry, "custom"), "first");
	}

	#[test]
	fn panicking_entries_are_skipped() {
		let registry = PropertySupplierRegistry::empty();

		registry.register("fallback", |_| true, |_| Labeled("fallback"));
		registry.register("bad-factory", |_| true, |_| -> Labeled { panic!("factory exploded") });
		registry.register("bad-predicate", |_| panic!("predicate exploded"), |_| Labeled("never"));

		assert_eq!(selected(&registry, "custom"), "fallback");
	}

	#[test]
	fn unmatched_bindings_report_suppliers_tried() {
		let registry = PropertySupplierRegistry::empty();

		registry.register_for_service(ServiceIdentifier::new("custom"), |_| Labeled("custom"));

		let err = registry.select(&options("other")).err().expect("No supplier should match.");

		assert_eq!(err.suppliers_tried, Some(1));
		assert!(err.message.contains("other"));

		registry.reset();

		assert!(registry.is_empty());
	}

	#[test]
	fn custom_entries_precede_builtins() {
		let registry = PropertySupplierRegistry::with_defaults();
		let builtins = registry.len();

		registry.register_for_service(ServiceIdentifier::XSUAA, |_| Labeled("override"));

		assert_eq!(registry.len(), builtins + 1);
		assert_eq!(selected(&registry, "xsuaa"), "override");
	}
}
