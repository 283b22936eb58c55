//! Ambient, nestable context values (tenant, principal, user token, inbound request headers).
//!
//! Every value kind is served by a [`ContextAccessor`] that resolves the current value with four
//! levels of precedence, most specific first:
//!
//! 1. the innermost explicit value pushed with [`ContextAccessor::execute_with`],
//! 2. the innermost scoped fallback pushed with [`ContextAccessor::execute_with_fallback`],
//! 3. the process-wide fallback installed with [`ContextAccessor::set_fallback`],
//! 4. absent.
//!
//! Scopes live in `tokio` task-locals, so concurrent tasks never observe each other's values and a
//! task that migrates between worker threads keeps its stack. Leaving a scope (return, error,
//! panic, or dropping the future) restores exactly the stack that was active before it.
//! Spawned tasks start empty; use [`ContextSnapshot`] to carry values into them.

mod model;
mod scope;
mod snapshot;

pub use model::*;
pub use scope::{ScopeStack, Supplier};
pub use snapshot::*;

#[cfg(test)] pub(crate) use model::encode_test_jwt;

// crates.io
use tokio::task::LocalKey;
// self
use crate::{_prelude::*, error::ContextError};

tokio::task_local! {
	static TENANT_SCOPE: ScopeStack<Tenant>;
	static PRINCIPAL_SCOPE: ScopeStack<Principal>;
	static AUTH_TOKEN_SCOPE: ScopeStack<AuthToken>;
	static REQUEST_HEADERS_SCOPE: ScopeStack<RequestHeaders>;
}

static TENANT: LazyLock<ContextAccessor<Tenant>> =
	LazyLock::new(|| ContextAccessor::new("tenant", &TENANT_SCOPE));
static PRINCIPAL: LazyLock<ContextAccessor<Principal>> =
	LazyLock::new(|| ContextAccessor::new("principal", &PRINCIPAL_SCOPE));
static AUTH_TOKEN: LazyLock<ContextAccessor<AuthToken>> =
	LazyLock::new(|| ContextAccessor::new("auth token", &AUTH_TOKEN_SCOPE));
static REQUEST_HEADERS: LazyLock<ContextAccessor<RequestHeaders>> =
	LazyLock::new(|| ContextAccessor::new("request headers", &REQUEST_HEADERS_SCOPE));

/// Accessor for the current tenant.
pub fn tenant() -> &'static ContextAccessor<Tenant> {
	&TENANT
}

/// Accessor for the current principal.
pub fn principal() -> &'static ContextAccessor<Principal> {
	&PRINCIPAL
}

/// Accessor for the current user token.
pub fn auth_token() -> &'static ContextAccessor<AuthToken> {
	&AUTH_TOKEN
}

/// Accessor for the headers of the inbound request.
pub fn request_headers() -> &'static ContextAccessor<RequestHeaders> {
	&REQUEST_HEADERS
}

/// Scoped access to one kind of ambient value.
pub struct ContextAccessor<T>
where
	T: 'static,
{
	kind: &'static str,
	key: &'static LocalKey<ScopeStack<T>>,
	global: RwLock<Option<Supplier<T>>>,
}
impl<T> ContextAccessor<T>
where
	T: 'static + Clone + Send + Sync,
{
	pub(crate) fn new(kind: &'static str, key: &'static LocalKey<ScopeStack<T>>) -> Self {
		Self { kind, key, global: RwLock::new(None) }
	}

	/// Runs `fut` with `value` as the current value.
	pub async fn execute_with<F>(&self, value: T, fut: F) -> F::Output
	where
		F: Future,
	{
		let stack = self.stack().push_explicit(value);

		self.key.scope(stack, fut).await
	}

	/// Synchronous counterpart of [`execute_with`](Self::execute_with).
	pub fn execute_with_sync<R>(&self, value: T, f: impl FnOnce() -> R) -> R {
		let stack = self.stack().push_explicit(value);

		self.key.sync_scope(stack, f)
	}

	/// Runs `fut` with a lazily evaluated fallback. Explicit values still take precedence, and the
	/// supplier only runs when the value is queried.
	pub async fn execute_with_fallback<S, F>(&self, supplier: S, fut: F) -> F::Output
	where
		S: 'static + Send + Sync + Fn() -> Option<T>,
		F: Future,
	{
		let stack = self.stack().push_fallback(Arc::new(supplier));

		self.key.scope(stack, fut).await
	}

	/// Synchronous counterpart of [`execute_with_fallback`](Self::execute_with_fallback).
	pub fn execute_with_fallback_sync<S, R>(&self, supplier: S, f: impl FnOnce() -> R) -> R
	where
		S: 'static + Send + Sync + Fn() -> Option<T>,
	{
		let stack = self.stack().push_fallback(Arc::new(supplier));

		self.key.sync_scope(stack, f)
	}

	/// Installs the process-wide fallback, replacing the previous one; `None` clears it.
	pub fn set_fallback(&self, supplier: Option<Supplier<T>>) {
		tracing::debug!(
			kind = self.kind,
			installed = supplier.is_some(),
			"Replacing global context fallback."
		);

		*self.global.write() = supplier;
	}

	/// Returns the current value, if any level provides one.
	pub fn try_get_current(&self) -> Option<T> {
		if let Some(value) = self.stack().resolve() {
			return Some(value);
		}

		let global = self.global.read().clone();

		global.and_then(|supplier| (*supplier)())
	}

	/// Returns the current value or [`ContextError::Missing`].
	pub fn get_current(&self) -> Result<T, ContextError> {
		self.try_get_current().ok_or(ContextError::Missing { kind: self.kind })
	}

	/// Number of scopes active in the current task.
	pub fn scope_depth(&self) -> usize {
		self.stack().depth()
	}

	pub(crate) fn stack(&self) -> ScopeStack<T> {
		self.key.try_with(Clone::clone).unwrap_or_default()
	}

	pub(crate) fn key(&self) -> &'static LocalKey<ScopeStack<T>> {
		self.key
	}
}
impl<T> Debug for ContextAccessor<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ContextAccessor")
			.field("kind", &self.kind)
			.field("global_fallback", &self.global.read().is_some())
			.finish()
	}
}
