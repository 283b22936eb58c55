//! Resolve named destinations and service bindings into ready-to-use connection descriptors.
//!
//! The crate combines an ordered loader chain, service-binding driven OAuth 2.0 destinations,
//! tenant-aware token provisioning, and nestable ambient context (tenant, principal, user token,
//! inbound request headers) that composes correctly across arbitrary nesting and concurrent tasks.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod binding;
pub mod context;
pub mod destination;
pub mod error;
pub mod http;
pub mod loader;
pub mod obs;
pub mod proxy;
pub mod resilience;
pub mod token;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		binding::{
			OAuth2ServiceBindingLoader, PropertySupplierRegistry, ServiceBinding, ServiceIdentifier,
		},
		http::HttpClientFactory,
		resilience::DefaultResilienceExecutor,
		token::TokenServiceCache,
	};

	/// Builds a service binding whose OAuth credentials sit inside a `uaa` block.
	pub fn test_uaa_binding(service: &str, service_url: &str, token_url: &str) -> ServiceBinding {
		ServiceBinding::new(
			ServiceIdentifier::new(service),
			serde_json::json!({
				"url": service_url,
				"uaa": {
					"clientid": "test-client",
					"clientsecret": "test-secret",
					"url": token_url,
				},
			}),
		)
	}

	/// Constructs an OAuth2 binding loader with isolated registry, token cache, and resilience
	/// state so tests never observe each other's process-wide caches.
	pub fn build_isolated_oauth2_loader(
		http_clients: Arc<dyn HttpClientFactory>,
	) -> (OAuth2ServiceBindingLoader, Arc<TokenServiceCache>) {
		let registry = Arc::new(PropertySupplierRegistry::with_defaults());
		let cache = Arc::new(TokenServiceCache::default().with_http_client_factory(http_clients));
		let executor = Arc::new(DefaultResilienceExecutor::default());
		let loader = OAuth2ServiceBindingLoader::new(registry)
			.with_token_services(cache.clone())
			.with_resilience_executor(executor);

		(loader, cache)
	}
}

mod _prelude {
	pub use std::{
		any::{Any, TypeId},
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::{Arc, LazyLock},
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
