//! Token services shared across destinations with the same credentials.

// std
use std::time::Duration as StdDuration;
// crates.io
use moka::sync::Cache;
// self
use crate::{
	_prelude::*,
	auth::ClientIdentity,
	error::ConfigError,
	http::{HttpClientFactory, ReqwestHttpClientFactory},
	token::OAuth2TokenService,
};

/// Identifies one cached token service.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
	/// Tenant the service acts for; `None` for the provider tenant.
	pub tenant_id: Option<String>,
	/// Client identity presented to the token endpoint.
	pub identity: ClientIdentity,
}
impl CacheKey {
	/// Creates a key.
	pub fn new(tenant_id: Option<&str>, identity: ClientIdentity) -> Self {
		Self { tenant_id: tenant_id.map(ToOwned::to_owned), identity }
	}
}

/// Lazily populated map from [`CacheKey`] to [`OAuth2TokenService`].
///
/// Entries idle for longer than the idle expiry are evicted. Two callers racing on a missing key
/// may both build a service; the first one stored wins and the other is dropped.
#[derive(Debug)]
pub struct TokenServiceCache {
	entries: Cache<CacheKey, Arc<OAuth2TokenService>>,
	idle_expiry: Duration,
	http_clients: Arc<dyn HttpClientFactory>,
}
impl TokenServiceCache {
	/// Default idle expiry.
	pub const DEFAULT_IDLE_EXPIRY: Duration = Duration::hours(1);

	/// Process-wide cache.
	pub fn global() -> Arc<Self> {
		static GLOBAL: LazyLock<Arc<TokenServiceCache>> = LazyLock::new(Default::default);

		GLOBAL.clone()
	}

	/// Overrides the idle expiry; cached services are dropped.
	pub fn with_idle_expiry(mut self, idle_expiry: Duration) -> Self {
		self.entries = build_entries(idle_expiry);
		self.idle_expiry = idle_expiry;

		self
	}

	/// Overrides the factory building transports for new services.
	pub fn with_http_client_factory(mut self, factory: Arc<dyn HttpClientFactory>) -> Self {
		self.http_clients = factory;

		self
	}

	/// Idle expiry in effect.
	pub fn idle_expiry(&self) -> Duration {
		self.idle_expiry
	}

	/// Returns the service for `key`, creating it on first use.
	pub fn get_or_create(&self, key: &CacheKey) -> Result<Arc<OAuth2TokenService>, ConfigError> {
		if let Some(service) = self.entries.get(key) {
			return Ok(service);
		}

		let http_client = self.http_clients.create(&key.identity)?;
		let service = Arc::new(OAuth2TokenService::new(key.identity.clone(), http_client));
		let entry = self.entries.entry(key.clone()).or_insert(service);

		if entry.is_fresh() {
			tracing::debug!(
				client_id = key.identity.id(),
				tenant_id = key.tenant_id.as_deref(),
				"Token service ready."
			);
		}

		Ok(entry.into_value())
	}

	/// Drops every cached service.
	pub fn clear(&self) {
		self.entries.invalidate_all();
	}

	/// Number of live cached services.
	pub fn len(&self) -> usize {
		self.entries.iter().count()
	}

	/// Returns `true` when no service is cached.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
impl Default for TokenServiceCache {
	fn default() -> Self {
		Self {
			entries: build_entries(Self::DEFAULT_IDLE_EXPIRY),
			idle_expiry: Self::DEFAULT_IDLE_EXPIRY,
			http_clients: Arc::new(ReqwestHttpClientFactory),
		}
	}
}

fn build_entries(idle_expiry: Duration) -> Cache<CacheKey, Arc<OAuth2TokenService>> {
	Cache::builder()
		.time_to_idle(idle_expiry.try_into().unwrap_or(StdDuration::ZERO))
		.eviction_listener(|key: Arc<CacheKey>, _, cause| {
			tracing::debug!(
				client_id = key.identity.id(),
				tenant_id = key.tenant_id.as_deref(),
				?cause,
				"Evicted token service."
			);
		})
		.build()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn services_are_shared_per_tenant_and_identity() {
		let cache = TokenServiceCache::default();
		let identity = ClientIdentity::secret("client", "secret");
		let provider = cache
			.get_or_create(&CacheKey::new(None, identity.clone()))
			.expect("Provider service should build.");
		let again = cache
			.get_or_create(&CacheKey::new(None, identity.clone()))
			.expect("Cached provider service should resolve.");
		let tenant = cache
			.get_or_create(&CacheKey::new(Some("t1"), identity))
			.expect("Tenant service should build.");

		assert!(Arc::ptr_eq(&provider, &again));
		assert!(!Arc::ptr_eq(&provider, &tenant));
		assert_eq!(cache.len(), 2);

		cache.clear();

		assert!(cache.is_empty());
	}

	#[test]
	fn idle_services_are_evicted() {
		let cache = TokenServiceCache::default().with_idle_expiry(Duration::milliseconds(50));
		let key = CacheKey::new(None, ClientIdentity::secret("client", "secret"));
		let first = cache.get_or_create(&key).expect("First service should build.");
		let reused = cache.get_or_create(&key).expect("Cached service should resolve.");

		assert!(Arc::ptr_eq(&first, &reused));

		std::thread::sleep(std::time::Duration::from_millis(120));

		assert!(cache.is_empty());

		let second = cache.get_or_create(&key).expect("Replacement service should build.");

		assert!(!Arc::ptr_eq(&first, &second));
		assert_eq!(cache.idle_expiry(), Duration::milliseconds(50));
	}
}
