//! Sources of service bindings.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	binding::{ServiceBinding, ServiceIdentifier},
	error::DestinationAccessError,
	loader::{EnvReader, process_env_reader},
};

/// Lists the service bindings available to the application.
pub trait ServiceBindingAccessor
where
	Self: Debug + Send + Sync,
{
	/// All bindings, in source order.
	fn service_bindings(&self) -> Result<Vec<ServiceBinding>>;
}

/// Fixed list of bindings.
#[derive(Clone, Debug, Default)]
pub struct StaticServiceBindingAccessor(Vec<ServiceBinding>);
impl StaticServiceBindingAccessor {
	/// Wraps `bindings`.
	pub fn new(bindings: impl IntoIterator<Item = ServiceBinding>) -> Self {
		Self(bindings.into_iter().collect())
	}
}
impl ServiceBindingAccessor for StaticServiceBindingAccessor {
	fn service_bindings(&self) -> Result<Vec<ServiceBinding>> {
		Ok(self.0.clone())
	}
}

#[derive(Deserialize)]
struct VcapEntry {
	#[serde(default)]
	name: Option<String>,
	#[serde(default)]
	label: Option<String>,
	#[serde(default)]
	plan: Option<String>,
	#[serde(default)]
	tags: Vec<String>,
	#[serde(default)]
	credentials: Value,
}

/// Bindings from a `VCAP_SERVICES`-style environment variable.
///
/// The variable maps service labels to arrays of instances. A missing or blank variable yields
/// no bindings; malformed JSON is an access error.
#[derive(Clone)]
pub struct EnvServiceBindingAccessor {
	variable: String,
	reader: EnvReader,
}
impl EnvServiceBindingAccessor {
	/// Default variable name.
	pub const DEFAULT_VARIABLE: &str = "VCAP_SERVICES";

	/// Creates an accessor reading `variable` through `reader`.
	pub fn new(variable: impl Into<String>, reader: EnvReader) -> Self {
		Self { variable: variable.into(), reader }
	}
}
impl Default for EnvServiceBindingAccessor {
	fn default() -> Self {
		Self::new(Self::DEFAULT_VARIABLE, process_env_reader())
	}
}
impl Debug for EnvServiceBindingAccessor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EnvServiceBindingAccessor").field("variable", &self.variable).finish()
	}
}
impl ServiceBindingAccessor for EnvServiceBindingAccessor {
	fn service_bindings(&self) -> Result<Vec<ServiceBinding>> {
		let Some(raw) = (*self.reader)(&self.variable).filter(|raw| !raw.trim().is_empty()) else {
			tracing::debug!(variable = %self.variable, "No service bindings in the environment.");

			return Ok(Vec::new());
		};
		let mut deserializer = serde_json::Deserializer::from_str(&raw);
		let services: BTreeMap<String, Vec<VcapEntry>> =
			serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
				let variable = &self.variable;

				DestinationAccessError::with_source(
					format!("Environment variable '{variable}' does not hold service bindings."),
					e,
				)
			})?;

		Ok(services
			.into_iter()
			.flat_map(|(label, entries)| {
				entries.into_iter().map(move |entry| {
					let service = ServiceIdentifier::new(entry.label.as_deref().unwrap_or(&label));
					let mut binding =
						ServiceBinding::new(service, entry.credentials).with_tags(entry.tags);

					if let Some(name) = entry.name {
						binding = binding.with_name(name);
					}
					if let Some(plan) = entry.plan {
						binding = binding.with_plan(plan);
					}

					binding
				})
			})
			.collect())
	}
}
