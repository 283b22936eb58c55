//! Type-keyed option bag shared by destination and service-binding requests.

// std
use std::any;
// self
use crate::{_prelude::*, error::ConfigError};

/// Holds at most one value per option type.
#[derive(Clone, Default)]
pub struct OptionBag(HashMap<TypeId, (&'static str, Arc<dyn Any + Send + Sync>)>);
impl OptionBag {
	/// Adds `option`; a second value of the same type is rejected.
	pub fn insert<O>(&mut self, option: O) -> Result<(), ConfigError>
	where
		O: Any + Send + Sync,
	{
		let type_id = TypeId::of::<O>();

		if self.0.contains_key(&type_id) {
			return Err(ConfigError::DuplicateOption { option: any::type_name::<O>() });
		}

		self.0.insert(type_id, (any::type_name::<O>(), Arc::new(option)));

		Ok(())
	}

	/// Sets `option`, replacing any value of the same type.
	pub fn replace<O>(&mut self, option: O)
	where
		O: Any + Send + Sync,
	{
		self.0.insert(TypeId::of::<O>(), (any::type_name::<O>(), Arc::new(option)));
	}

	/// Returns the option of type `O`, if present.
	pub fn get<O>(&self) -> Option<&O>
	where
		O: Any,
	{
		self.0.get(&TypeId::of::<O>()).and_then(|(_, value)| value.downcast_ref())
	}

	/// Returns `true` when an option of type `O` is present.
	pub fn contains<O>(&self) -> bool
	where
		O: Any,
	{
		self.0.contains_key(&TypeId::of::<O>())
	}

	/// Number of options.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when no option is set.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl Debug for OptionBag {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let mut names = self.0.values().map(|(name, _)| *name).collect::<Vec<_>>();

		names.sort_unstable();

		f.debug_set().entries(names).finish()
	}
}

/// Options passed to name-based destination loaders.
#[derive(Clone, Debug, Default)]
pub struct DestinationOptions {
	options: OptionBag,
}
impl DestinationOptions {
	/// Adds an option; each option type may appear once.
	pub fn with_option<O>(mut self, option: O) -> Result<Self, ConfigError>
	where
		O: Any + Send + Sync,
	{
		self.options.insert(option)?;

		Ok(self)
	}

	/// Returns the option of type `O`, if present.
	pub fn option<O>(&self) -> Option<&O>
	where
		O: Any,
	{
		self.options.get()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[derive(Debug, PartialEq)]
	struct Retrieval(&'static str);

	#[test]
	fn duplicate_option_types_are_rejected() {
		let options = DestinationOptions::default()
			.with_option(Retrieval("current"))
			.expect("First option of a type should be accepted.");

		assert_eq!(options.option::<Retrieval>(), Some(&Retrieval("current")));

		let err = options
			.with_option(Retrieval("provider"))
			.expect_err("Second option of the same type must be rejected.");

		assert!(matches!(
			err,
			ConfigError::DuplicateOption { option } if option.ends_with("Retrieval")
		));
	}

	#[test]
	fn absent_options_return_none() {
		let mut bag = OptionBag::default();

		assert!(bag.get::<u8>().is_none());

		bag.insert(7_u8).expect("Option should be accepted.");

		assert!(bag.contains::<u8>());
		assert_eq!(bag.len(), 1);
	}
}
