// self
use crate::obs::{FlowOutcome, TokenFlow};

/// Label recorded for a token cache lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheLookup {
	/// A fresh cached token was reused.
	Hit,
	/// The token endpoint had to be called.
	Miss,
}
impl CacheLookup {
	/// Returns a stable label suitable for metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Hit => "hit",
			Self::Miss => "miss",
		}
	}
}

/// Counts token retrievals per grant and outcome (`oauth2_connectivity_token_total`).
pub fn record_flow_outcome(flow: TokenFlow, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		"oauth2_connectivity_token_total",
		"flow" => flow.as_str(),
		"outcome" => outcome.as_str()
	)
	.increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = (flow, outcome);
}

/// Counts response cache lookups of the token service (`oauth2_connectivity_token_cache_total`).
pub fn record_cache_lookup(flow: TokenFlow, lookup: CacheLookup) {
	#[cfg(feature = "metrics")]
	metrics::counter!(
		"oauth2_connectivity_token_cache_total",
		"flow" => flow.as_str(),
		"lookup" => lookup.as_str()
	)
	.increment(1);

	#[cfg(not(feature = "metrics"))]
	let _ = (flow, lookup);
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn labels_are_stable() {
		assert_eq!(CacheLookup::Hit.as_str(), "hit");
		assert_eq!(CacheLookup::Miss.as_str(), "miss");

		record_flow_outcome(TokenFlow::JwtBearer, FlowOutcome::Failure);
		record_cache_lookup(TokenFlow::ClientCredentials, CacheLookup::Miss);
	}
}
