//! Timeout, retry, and circuit-breaker wrapping for outbound calls, token retrieval first of all.
//!
//! Token retrieval runs under a [`ResilienceConfiguration`] whose isolation key defaults to
//! `<token host>-<client id>`. With [`IsolationScope::Shared`] the key is used as-is, so every
//! tenant hitting the same token endpoint with the same client shares breaker state;
//! [`IsolationScope::PerTenant`] appends the ambient tenant id.

// crates.io
use rand::Rng;
// self
use crate::{
	_prelude::*,
	context,
	error::TransientError,
	token::TokenResponse,
};

/// Boxed future produced by resilient operations.
pub type ResilienceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Re-runnable operation; each call starts a fresh attempt.
pub type Operation<'a, T> = Box<dyn FnMut() -> ResilienceFuture<'a, T> + 'a + Send>;

/// Boxes `f` into an [`Operation`].
pub fn operation<'a, T, F, Fut>(mut f: F) -> Operation<'a, T>
where
	F: 'a + Send + FnMut() -> Fut,
	Fut: 'a + Send + Future<Output = Result<T>>,
{
	Box::new(move || -> ResilienceFuture<'a, T> { Box::pin(f()) })
}

/// How the isolation key relates to tenants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IsolationScope {
	/// One state per isolation key, shared by all tenants.
	#[default]
	Shared,
	/// One state per isolation key and ambient tenant.
	PerTenant,
}

/// Retry policy with jittered exponential backoff.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Total attempts including the first one.
	pub max_attempts: u32,
	/// Delay before the second attempt.
	pub base_delay: Duration,
	/// Upper bound for any single delay, including `Retry-After` hints.
	pub max_delay: Duration,
}
impl RetryPolicy {
	/// Policy that never retries.
	pub const fn disabled() -> Self {
		Self { max_attempts: 1, base_delay: Duration::ZERO, max_delay: Duration::ZERO }
	}

	fn delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
		if let Some(hint) = hint.filter(|hint| hint.is_positive()) {
			return hint.min(self.max_delay);
		}

		let exp = self.base_delay.saturating_mul(1_i32 << attempt.saturating_sub(1).min(16));
		let ceiling = exp.min(self.max_delay).whole_milliseconds().max(0);
		let ceiling = u64::try_from(ceiling).unwrap_or(u64::MAX);

		if ceiling == 0 {
			return Duration::ZERO;
		}

		let jittered = rand::rng().random_range(ceiling / 2..=ceiling);

		Duration::milliseconds(i64::try_from(jittered).unwrap_or(i64::MAX))
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::milliseconds(200),
			max_delay: Duration::seconds(5),
		}
	}
}

/// Consecutive-failure circuit breaker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitBreakerPolicy {
	/// Consecutive retryable failures that open the circuit.
	pub failure_threshold: u32,
	/// How long the circuit stays open before a trial call is allowed.
	pub open_for: Duration,
}
impl Default for CircuitBreakerPolicy {
	fn default() -> Self {
		Self { failure_threshold: 5, open_for: Duration::seconds(30) }
	}
}

/// Resilience settings for one kind of operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResilienceConfiguration {
	/// Isolation key naming the shared state.
	pub isolation_key: String,
	/// Whether the ambient tenant refines the isolation key.
	pub isolation_scope: IsolationScope,
	/// Per-attempt time limit; `None` disables it.
	pub timeout: Option<Duration>,
	/// Retry policy.
	pub retry: RetryPolicy,
	/// Circuit breaker policy; `None` disables it.
	pub circuit_breaker: Option<CircuitBreakerPolicy>,
}
impl ResilienceConfiguration {
	/// Default per-attempt time limit.
	pub const DEFAULT_TIMEOUT: Duration = Duration::seconds(10);

	/// Creates a configuration with a 10 s timeout, no retries, and the default breaker.
	pub fn new(isolation_key: impl Into<String>) -> Self {
		Self {
			isolation_key: isolation_key.into(),
			isolation_scope: IsolationScope::default(),
			timeout: Some(Self::DEFAULT_TIMEOUT),
			retry: RetryPolicy::disabled(),
			circuit_breaker: Some(CircuitBreakerPolicy::default()),
		}
	}

	/// Overrides the isolation scope.
	pub fn with_isolation_scope(mut self, scope: IsolationScope) -> Self {
		self.isolation_scope = scope;

		self
	}

	/// Overrides the time limit.
	pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.timeout = timeout;

		self
	}

	/// Overrides the retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Overrides the circuit breaker policy.
	pub fn with_circuit_breaker(mut self, breaker: Option<CircuitBreakerPolicy>) -> Self {
		self.circuit_breaker = breaker;

		self
	}

	/// Key under which state is tracked for `tenant_id`.
	pub fn effective_key(&self, tenant_id: Option<&str>) -> String {
		match (self.isolation_scope, tenant_id) {
			(IsolationScope::PerTenant, Some(tenant)) => format!("{}#{tenant}", self.isolation_key),
			_ => self.isolation_key.clone(),
		}
	}
}

/// Runs an operation under a [`ResilienceConfiguration`]; token retrieval by default.
pub trait ResilienceExecutor<T = TokenResponse>
where
	Self: Debug + Send + Sync,
	T: 'static + Send,
{
	/// Executes `operation`, re-invoking it for retries.
	fn execute<'a>(
		&'a self,
		config: &'a ResilienceConfiguration,
		operation: Operation<'a, T>,
	) -> ResilienceFuture<'a, T>;
}

#[derive(Debug, Default)]
struct BreakerState {
	consecutive_failures: u32,
	open_until: Option<OffsetDateTime>,
}

/// In-process executor: tokio timeouts, jittered retries, per-key circuit breakers.
#[derive(Debug, Default)]
pub struct DefaultResilienceExecutor {
	breakers: Mutex<HashMap<String, BreakerState>>,
}
impl DefaultResilienceExecutor {
	/// Process-wide executor.
	pub fn global() -> Arc<Self> {
		static GLOBAL: LazyLock<Arc<DefaultResilienceExecutor>> = LazyLock::new(Default::default);

		GLOBAL.clone()
	}

	/// Drops all breaker state.
	pub fn reset(&self) {
		self.breakers.lock().clear();
	}

	/// Returns `true` when the breaker for `key` is currently open.
	pub fn is_open(&self, key: &str) -> bool {
		let now = OffsetDateTime::now_utc();

		self.breakers
			.lock()
			.get(key)
			.and_then(|state| state.open_until)
			.is_some_and(|until| until > now)
	}

	fn record_success(&self, key: &str) {
		self.breakers.lock().remove(key);
	}

	fn record_failure(&self, key: &str, policy: &CircuitBreakerPolicy) {
		let mut breakers = self.breakers.lock();
		let state = breakers.entry(key.to_owned()).or_default();

		state.consecutive_failures = state.consecutive_failures.saturating_add(1);

		if state.consecutive_failures >= policy.failure_threshold.max(1) {
			state.open_until = Some(OffsetDateTime::now_utc() + policy.open_for);

			tracing::warn!(
				isolation_key = key,
				failures = state.consecutive_failures,
				"Circuit breaker opened."
			);
		}
	}

	async fn attempt<'a, T>(
		config: &ResilienceConfiguration,
		key: &str,
		fut: ResilienceFuture<'a, T>,
	) -> Result<T> {
		let Some(limit) = config.timeout else {
			return fut.await;
		};

		match tokio::time::timeout(limit.unsigned_abs(), fut).await {
			Ok(outcome) => outcome,
			Err(_) => Err(TransientError::Timeout { isolation_key: key.to_owned(), timeout: limit }
				.into()),
		}
	}
}
impl<T> ResilienceExecutor<T> for DefaultResilienceExecutor
where
	T: 'static + Send,
{
	fn execute<'a>(
		&'a self,
		config: &'a ResilienceConfiguration,
		mut operation: Operation<'a, T>,
	) -> ResilienceFuture<'a, T> {
		Box::pin(async move {
			let tenant = context::tenant().try_get_current();
			let key = config.effective_key(tenant.as_ref().map(|tenant| tenant.id.as_str()));

			if config.circuit_breaker.is_some() && self.is_open(&key) {
				return Err(TransientError::CircuitOpen { isolation_key: key }.into());
			}

			let attempts = config.retry.max_attempts.max(1);
			let mut attempt = 1;

			loop {
				match Self::attempt(config, &key, operation()).await {
					Ok(value) => {
						self.record_success(&key);

						return Ok(value);
					},
					Err(e) => {
						if !e.is_retryable() {
							return Err(e);
						}
						if let Some(policy) = &config.circuit_breaker {
							self.record_failure(&key, policy);
						}
						if attempt >= attempts || self.is_open(&key) {
							return Err(e);
						}

						let hint = match &e {
							Error::Transient(transient) => transient.retry_after(),
							_ => None,
						};
						let delay = config.retry.delay(attempt, hint);

						tracing::debug!(
							isolation_key = %key,
							attempt,
							delay_ms = delay.whole_milliseconds(),
							error = %e,
							"Retrying after a retryable failure."
						);

						tokio::time::sleep(delay.unsigned_abs()).await;

						attempt += 1;
					},
				}
			}
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicU32, Ordering};
	// self
	use super::*;
	use crate::{auth::TokenSecret, error::TokenRequestError};

	fn token() -> TokenResponse {
		TokenResponse::bearer(TokenSecret::new("token"), Some(Duration::seconds(60)))
	}

	fn transient() -> Error {
		TransientError::TokenEndpoint {
			message: "busy".into(),
			status: Some(503),
			retry_after: None,
		}
		.into()
	}

	fn fast_retry(max_attempts: u32) -> RetryPolicy {
		RetryPolicy {
			max_attempts,
			base_delay: Duration::milliseconds(1),
			max_delay: Duration::milliseconds(5),
		}
	}

	#[tokio::test]
	async fn retries_transient_failures_until_success() {
		let executor = DefaultResilienceExecutor::default();
		let config = ResilienceConfiguration::new("host-client").with_retry(fast_retry(3));
		let calls = AtomicU32::new(0);
		let result = executor
			.execute(
				&config,
				operation(|| {
					let n = calls.fetch_add(1, Ordering::SeqCst);

					async move { if n < 2 { Err(transient()) } else { Ok(token()) } }
				}),
			)
			.await;

		assert!(result.is_ok());
		assert_eq!(calls.load(Ordering::SeqCst), 3);
		assert!(!executor.is_open("host-client"));
	}

	#[tokio::test]
	async fn fatal_failures_are_not_retried() {
		let executor = DefaultResilienceExecutor::default();
		let config = ResilienceConfiguration::new("host-client").with_retry(fast_retry(5));
		let calls = AtomicU32::new(0);
		let result = executor
			.execute(
				&config,
				operation(|| {
					calls.fetch_add(1, Ordering::SeqCst);

					async {
						let denied = TokenRequestError::new("denied").with_status(401);

						Err::<TokenResponse, _>(denied.into())
					}
				}),
			)
			.await;

		assert!(matches!(result, Err(Error::TokenRequest(_))));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn slow_attempts_time_out() {
		let executor = DefaultResilienceExecutor::default();
		let config = ResilienceConfiguration::new("slow")
			.with_timeout(Some(Duration::milliseconds(10)))
			.with_circuit_breaker(None);
		let result = executor
			.execute(
				&config,
				operation(|| async {
					tokio::time::sleep(std::time::Duration::from_secs(5)).await;

					Ok(token())
				}),
			)
			.await;

		assert!(matches!(
			result,
			Err(Error::Transient(TransientError::Timeout { ref isolation_key, .. }))
				if isolation_key == "slow"
		));
	}

	#[tokio::test]
	async fn breaker_opens_after_consecutive_failures() {
		let executor = DefaultResilienceExecutor::default();
		let config = ResilienceConfiguration::new("flaky").with_circuit_breaker(Some(
			CircuitBreakerPolicy { failure_threshold: 2, open_for: Duration::seconds(60) },
		));

		for _ in 0..2 {
			let _ = executor
				.execute(&config, operation(|| async { Err::<TokenResponse, _>(transient()) }))
				.await;
		}

		let calls = AtomicU32::new(0);
		let result = executor
			.execute(
				&config,
				operation(|| {
					calls.fetch_add(1, Ordering::SeqCst);

					async { Ok(token()) }
				}),
			)
			.await;

		assert!(matches!(result, Err(Error::Transient(TransientError::CircuitOpen { .. }))));
		assert_eq!(calls.load(Ordering::SeqCst), 0);

		executor.reset();

		assert!(!executor.is_open("flaky"));
	}

	#[tokio::test]
	async fn protects_operations_of_any_result_type() {
		let executor = DefaultResilienceExecutor::default();
		let config = ResilienceConfiguration::new("catalog").with_retry(fast_retry(2));
		let calls = AtomicU32::new(0);
		let result = executor
			.execute(
				&config,
				operation(|| {
					let n = calls.fetch_add(1, Ordering::SeqCst);

					async move {
						if n == 0 { Err(transient()) } else { Ok(vec!["orders", "invoices"]) }
					}
				}),
			)
			.await
			.expect("Second attempt should succeed.");

		assert_eq!(result, ["orders", "invoices"]);
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn per_tenant_scope_refines_the_key() {
		let shared = ResilienceConfiguration::new("host-client");
		let per_tenant = shared.clone().with_isolation_scope(IsolationScope::PerTenant);

		assert_eq!(shared.effective_key(Some("t1")), "host-client");
		assert_eq!(per_tenant.effective_key(Some("t1")), "host-client#t1");
		assert_eq!(per_tenant.effective_key(None), "host-client");
	}
}
