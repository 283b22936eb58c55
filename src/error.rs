//! Crate-level error types shared across loaders, token provisioning, and ambient context.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Boxed error used for wrapped sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// No resolver produced a destination.
	#[error(transparent)]
	NotFound(#[from] DestinationNotFound),
	/// A resolver matched but failed for a described reason.
	#[error(transparent)]
	Access(#[from] DestinationAccessError),
	/// Token endpoint call failed or returned an unusable response.
	#[error(transparent)]
	TokenRequest(#[from] TokenRequestError),
	/// Ambient context is missing or inconsistent.
	#[error(transparent)]
	Context(#[from] ContextError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl Error {
	/// Returns `true` when the resilience layer may retry the failed operation.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Self::Transient(_) | Self::Transport(_))
	}
}
impl From<LoadError> for Error {
	fn from(e: LoadError) -> Self {
		match e {
			LoadError::NotFound(e) => Self::NotFound(e),
			LoadError::Access(e) => Self::Access(e),
		}
	}
}

/// Outcome of a failed loader attempt.
///
/// Only [`LoadError::NotFound`] lets a chain continue with the next loader; every other failure
/// is folded into [`LoadError::Access`] so the continue-vs-abort decision stays deterministic.
#[derive(Debug, ThisError)]
pub enum LoadError {
	/// The loader has nothing for the request.
	#[error(transparent)]
	NotFound(#[from] DestinationNotFound),
	/// The loader matched but failed.
	#[error(transparent)]
	Access(#[from] DestinationAccessError),
}
impl LoadError {
	/// Convenience constructor for a not-found outcome.
	pub fn not_found(name: Option<&str>, message: impl Into<String>) -> Self {
		DestinationNotFound::new(name, message).into()
	}

	/// Convenience constructor for an access failure.
	pub fn access(message: impl Into<String>) -> Self {
		DestinationAccessError::new(message).into()
	}

	/// Returns `true` for [`LoadError::NotFound`].
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound(_))
	}
}
impl From<Error> for LoadError {
	fn from(e: Error) -> Self {
		match e {
			Error::NotFound(e) => Self::NotFound(e),
			Error::Access(e) => Self::Access(e),
			other => Self::Access(DestinationAccessError::with_source(
				"Unexpected failure while loading the destination.",
				other,
			)),
		}
	}
}
impl From<ConfigError> for LoadError {
	fn from(e: ConfigError) -> Self {
		Error::from(e).into()
	}
}

/// No destination could be found for a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestinationNotFound {
	/// Requested destination name, when the request was name-based.
	pub name: Option<String>,
	/// Human-readable explanation.
	pub message: String,
	/// Loaders or suppliers that were consulted, in order.
	pub consulted: Vec<String>,
	/// Number of property suppliers that were tried, when applicable.
	pub suppliers_tried: Option<usize>,
}
impl DestinationNotFound {
	/// Creates a new not-found error.
	pub fn new(name: Option<&str>, message: impl Into<String>) -> Self {
		Self {
			name: name.map(ToOwned::to_owned),
			message: message.into(),
			consulted: Vec::new(),
			suppliers_tried: None,
		}
	}

	/// Records which loaders were consulted before giving up.
	pub fn with_consulted(mut self, consulted: Vec<String>) -> Self {
		self.consulted = consulted;

		self
	}

	/// Records how many property suppliers were evaluated.
	pub fn with_suppliers_tried(mut self, count: usize) -> Self {
		self.suppliers_tried = Some(count);

		self
	}
}

impl Display for DestinationNotFound {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match &self.name {
			Some(name) => write!(f, "Destination `{name}` not found: {}", self.message)?,
			None => write!(f, "Destination not found: {}", self.message)?,
		}

		if let Some(count) = self.suppliers_tried {
			write!(f, " ({count} property suppliers tried)")?;
		}
		if !self.consulted.is_empty() {
			write!(f, " [consulted: {}]", self.consulted.join(", "))?;
		}

		Ok(())
	}
}
impl StdError for DestinationNotFound {}

/// A resolver matched but could not produce a destination.
#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct DestinationAccessError {
	/// Human-readable explanation.
	pub message: String,
	/// Underlying failure, when available.
	#[source]
	pub source: Option<BoxError>,
}
impl DestinationAccessError {
	/// Creates an access error without an underlying source.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into(), source: None }
	}

	/// Creates an access error that wraps an underlying failure.
	pub fn with_source(
		message: impl Into<String>,
		source: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self { message: message.into(), source: Some(Box::new(source)) }
	}
}

/// Token endpoint failures that must never be downgraded to unauthenticated requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRequestError {
	/// Human-readable explanation.
	pub message: String,
	/// HTTP status code, when available.
	pub status: Option<u16>,
	/// OAuth `error` code, when the endpoint returned one.
	pub oauth_error: Option<String>,
	/// Actionable hint appended to the message.
	pub hint: Option<String>,
}
impl TokenRequestError {
	/// Creates a token request error with only a message.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into(), status: None, oauth_error: None, hint: None }
	}

	/// Attaches the HTTP status code.
	pub fn with_status(mut self, status: u16) -> Self {
		self.status = Some(status);

		self
	}

	/// Attaches the OAuth error code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Attaches an actionable hint.
	pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
		self.hint = Some(hint.into());

		self
	}
}

impl Display for TokenRequestError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.message)?;

		if let Some(status) = self.status {
			write!(f, " (HTTP {status})")?;
		}
		if let Some(code) = &self.oauth_error {
			write!(f, " [{code}]")?;
		}
		if let Some(hint) = &self.hint {
			write!(f, " {hint}")?;
		}

		Ok(())
	}
}
impl StdError for TokenRequestError {}

/// Ambient context failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ContextError {
	/// Ambient tenant and the tenant embedded in the user token disagree.
	#[error(
		"Ambient tenant `{ambient}` does not match tenant `{token}` of the current user token; tenant and token accessors must return consistent results."
	)]
	TenantMismatch {
		/// Tenant id returned by the tenant accessor.
		ambient: String,
		/// Tenant id embedded in the user token.
		token: String,
	},
	/// A required ambient value is absent.
	#[error("No current {kind} is available in this context.")]
	Missing {
		/// Kind of context value (tenant, principal, auth token, request headers).
		kind: &'static str,
	},
	/// The ambient user token could not be decoded.
	#[error("The current user token is invalid: {reason}.")]
	InvalidToken {
		/// Decoding failure description.
		reason: String,
	},
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// A loader chain was built without loaders.
	#[error("A destination loader chain requires at least one loader.")]
	EmptyLoaderChain,
	/// A destination was registered without a usable name.
	#[error("Destinations must carry a non-empty name to be registered.")]
	EmptyDestinationName,
	/// A required property is absent.
	#[error("The required property `{property}` is missing.")]
	MissingProperty {
		/// Property name.
		property: &'static str,
	},
	/// The same option type was added twice.
	#[error("The option `{option}` is already in use.")]
	DuplicateOption {
		/// Type name of the duplicated option.
		option: &'static str,
	},
	/// A URL could not be parsed.
	#[error("`{value}` is not a valid URL.")]
	InvalidUrl {
		/// Offending value.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// PEM certificate or key material is malformed.
	#[error("Invalid PEM material: {reason}.")]
	InvalidPem {
		/// Decoding failure description.
		reason: String,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	/// Wraps a URL parsing failure.
	pub fn invalid_url(value: impl Into<String>, source: url::ParseError) -> Self {
		Self::InvalidUrl { value: value.into(), source }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint returned a retryable response.
	#[error("Token endpoint returned a retryable response: {message}.")]
	TokenEndpoint {
		/// Message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// The operation exceeded its time limit.
	#[error("Operation `{isolation_key}` timed out after {timeout}.")]
	Timeout {
		/// Resilience isolation key of the operation.
		isolation_key: String,
		/// Configured time limit.
		timeout: Duration,
	},
	/// The circuit breaker for the isolation key is open.
	#[error("Circuit breaker for `{isolation_key}` is open.")]
	CircuitOpen {
		/// Resilience isolation key of the operation.
		isolation_key: String,
	},
}
impl TransientError {
	/// Returns the upstream retry hint, if any.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::TokenEndpoint { retry_after, .. } => *retry_after,
			_ => None,
		}
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
