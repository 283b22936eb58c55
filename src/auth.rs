//! Identifiers, client identities, and secret material used by token provisioning.

pub mod id;
pub mod identity;
pub mod key_store;
pub mod secret;

pub use id::*;
pub use identity::*;
pub use key_store::*;
pub use secret::*;
