//! Destinations declared as a JSON array inside an environment variable.

// crates.io
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	destination::{Destination, DestinationBuilder, DestinationOptions},
	error::{DestinationAccessError, LoadError},
	loader::DestinationLoader,
};

/// Reads an environment variable by name; injectable for tests.
pub type EnvReader = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reader backed by the process environment.
pub fn process_env_reader() -> EnvReader {
	Arc::new(|name| std::env::var(name).ok())
}

/// Loader that reads destinations from an environment variable (default `destinations`).
///
/// The variable holds a JSON array of objects. Each object is one destination identified by its
/// `name` field; every field becomes a property, with non-string values kept as their JSON text.
#[derive(Clone)]
pub struct EnvVarDestinationLoader {
	variable: String,
	reader: EnvReader,
}
impl EnvVarDestinationLoader {
	/// Default variable name.
	pub const DEFAULT_VARIABLE: &str = "destinations";

	/// Creates a loader reading `variable` through `reader`.
	pub fn new(variable: impl Into<String>, reader: EnvReader) -> Self {
		Self { variable: variable.into(), reader }
	}

	/// Overrides the variable name.
	pub fn with_variable(mut self, variable: impl Into<String>) -> Self {
		self.variable = variable.into();

		self
	}

	/// Variable this loader reads.
	pub fn variable(&self) -> &str {
		&self.variable
	}

	fn entries(&self) -> Result<Vec<Value>, LoadError> {
		let raw = (*self.reader)(&self.variable).filter(|raw| !raw.trim().is_empty()).ok_or_else(
			|| {
				LoadError::not_found(
					None,
					format!("Could not find environment variable for name '{}'.", self.variable),
				)
			},
		)?;
		let value = serde_json::from_str::<Value>(&raw).map_err(|e| {
			LoadError::Access(DestinationAccessError::with_source(
				format!("Environment variable '{}' does not contain valid JSON.", self.variable),
				e,
			))
		})?;

		match value {
			Value::Array(entries) => Ok(entries),
			_ => Err(LoadError::access(format!(
				"Environment variable '{}' has to be a JSON Array.",
				self.variable
			))),
		}
	}
}
impl Default for EnvVarDestinationLoader {
	fn default() -> Self {
		Self::new(Self::DEFAULT_VARIABLE, process_env_reader())
	}
}
impl Debug for EnvVarDestinationLoader {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EnvVarDestinationLoader").field("variable", &self.variable).finish()
	}
}
impl DestinationLoader for EnvVarDestinationLoader {
	fn name(&self) -> &str {
		"environment"
	}

	fn try_get_destination(
		&self,
		destination_name: &str,
		_: &DestinationOptions,
	) -> Result<Destination, LoadError> {
		for entry in self.entries()? {
			let Value::Object(fields) = entry else {
				return Err(LoadError::access(format!(
					"Entries of environment variable '{}' have to be JSON objects.",
					self.variable
				)));
			};
			let Some(name) = fields.get("name").and_then(Value::as_str) else {
				return Err(LoadError::access(format!(
					"A destination in environment variable '{}' has no 'name' property.",
					self.variable
				)));
			};

			if name != destination_name {
				continue;
			}

			let builder =
				fields.iter().fold(DestinationBuilder::default(), |builder, (key, value)| {
					let value = match value {
						Value::String(text) => text.clone(),
						other => other.to_string(),
					};

					builder.property(key.as_str(), value)
				});

			tracing::debug!(
				destination = destination_name,
				variable = %self.variable,
				"Loaded destination from the environment."
			);

			return builder.build().map_err(LoadError::from);
		}

		Err(LoadError::not_found(
			Some(destination_name),
			format!(
				"No destination with this name is defined in environment variable '{}'.",
				self.variable
			),
		))
	}
}
