//! Name-based destination loaders and the ordered chain that combines them.
//!
//! A loader answers one of three ways: a destination, [`LoadError::NotFound`] (the next loader may
//! try), or [`LoadError::Access`] (abort). [`DestinationLoaderChain`] applies that rule across an
//! ordered, non-empty list of loaders and [`DestinationAccessor`] holds the active chain.

pub mod accessor;
pub mod chain;
pub mod env;
pub mod memory;

pub use accessor::*;
pub use chain::*;
pub use env::*;
pub use memory::*;

// self
use crate::{
	_prelude::*,
	destination::{Destination, DestinationOptions},
	error::LoadError,
};

/// Resolves destinations by name.
pub trait DestinationLoader
where
	Self: Debug + Send + Sync,
{
	/// Label used in diagnostics.
	fn name(&self) -> &str;

	/// Looks up `destination_name`.
	fn try_get_destination(
		&self,
		destination_name: &str,
		options: &DestinationOptions,
	) -> Result<Destination, LoadError>;

	/// Returns the chain view when this loader is a [`DestinationLoaderChain`], so composition can
	/// flatten it instead of nesting.
	fn as_chain(&self) -> Option<&DestinationLoaderChain> {
		None
	}
}
