//! Explicit hand-off of ambient context into spawned tasks.

// self
use crate::{
	_prelude::*,
	context::{self, AuthToken, Principal, RequestHeaders, ScopeStack, Tenant},
};

/// Captured scope stacks of every ambient value kind.
///
/// Task-locals do not follow `tokio::spawn`; capture before spawning and wrap the spawned future
/// with [`ContextSnapshot::scope`].
#[derive(Clone, Debug, Default)]
pub struct ContextSnapshot {
	tenant: ScopeStack<Tenant>,
	principal: ScopeStack<Principal>,
	auth_token: ScopeStack<AuthToken>,
	request_headers: ScopeStack<RequestHeaders>,
}
impl ContextSnapshot {
	/// Captures the scopes active in the current task.
	pub fn capture() -> Self {
		Self {
			tenant: context::tenant().stack(),
			principal: context::principal().stack(),
			auth_token: context::auth_token().stack(),
			request_headers: context::request_headers().stack(),
		}
	}

	/// Runs `fut` inside the captured scopes.
	pub async fn scope<F>(self, fut: F) -> F::Output
	where
		F: Future,
	{
		let Self { tenant, principal, auth_token, request_headers } = self;

		context::tenant()
			.key()
			.scope(
				tenant,
				context::principal().key().scope(
					principal,
					context::auth_token().key().scope(
						auth_token,
						context::request_headers().key().scope(request_headers, fut),
					),
				),
			)
			.await
	}

	/// Runs `f` inside the captured scopes.
	pub fn run<R>(self, f: impl FnOnce() -> R) -> R {
		let Self { tenant, principal, auth_token, request_headers } = self;

		context::tenant().key().sync_scope(tenant, || {
			context::principal().key().sync_scope(principal, || {
				context::auth_token().key().sync_scope(auth_token, || {
					context::request_headers().key().sync_scope(request_headers, f)
				})
			})
		})
	}
}
