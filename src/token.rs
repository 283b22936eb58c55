//! Tenant-aware OAuth 2.0 token provisioning.
//!
//! [`OAuth2TokenProvider`] decides, from the configured [`OnBehalfOf`] and the ambient context,
//! which grant to run and how the tenant travels to the token endpoint. The request is executed by
//! a per-identity [`OAuth2TokenService`] taken from the [`TokenServiceCache`], wrapped by the
//! resilience executor. [`OAuth2HeaderProvider`] exposes the result as a destination header.

pub mod cache;
pub mod header;
pub mod provider;
pub mod service;

pub use cache::*;
pub use header::*;
pub use provider::*;
pub use service::*;
