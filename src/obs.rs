//! Observability helpers for token retrieval.
//!
//! Token retrieval futures are instrumented with spans named `oauth2_connectivity.token` carrying
//! the `flow` (grant) and `stage` (call site) fields. With the `metrics` feature enabled, every
//! attempt/success/failure increments the `oauth2_connectivity_token_total` counter labeled by
//! `flow` and `outcome`, and token service cache lookups increment
//! `oauth2_connectivity_token_cache_total` labeled by `flow` and `lookup`.

mod metrics;
mod span;

pub use metrics::*;
pub use span::*;

// self
use crate::_prelude::*;

/// Token grant flows observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenFlow {
	/// Client credentials grant (technical user).
	ClientCredentials,
	/// JWT bearer grant (named user token exchange).
	JwtBearer,
}
impl TokenFlow {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			TokenFlow::ClientCredentials => "client_credentials",
			TokenFlow::JwtBearer => "jwt_bearer",
		}
	}
}
impl Display for TokenFlow {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a token retrieval.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
