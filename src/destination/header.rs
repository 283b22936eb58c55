//! Request headers and the header-provider seam used for dynamic authentication.

// self
use crate::{_prelude::*, destination::Destination};

/// Header name for origin authentication.
pub const AUTHORIZATION: &str = "Authorization";
/// Header name for proxy authentication.
pub const PROXY_AUTHORIZATION: &str = "Proxy-Authorization";

/// Boxed future returned by [`HeaderProvider::headers`].
pub type HeaderFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Header>>> + 'a + Send>>;

/// Single outgoing request header.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Header {
	/// Header name.
	pub name: String,
	/// Header value.
	pub value: String,
}
impl Header {
	/// Creates a header.
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self { name: name.into(), value: value.into() }
	}

	/// Case-insensitive name comparison.
	pub fn is(&self, name: &str) -> bool {
		self.name.eq_ignore_ascii_case(name)
	}
}
impl Debug for Header {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let name = self.name.to_ascii_lowercase();
		let value: &dyn Debug =
			if name.contains("authorization") || name.contains("authentication") {
				&"<redacted>"
			} else {
				&self.value
			};

		f.debug_struct("Header").field("name", &self.name).field("value", value).finish()
	}
}

/// What a [`HeaderProvider`] sees when asked for headers.
#[derive(Clone, Copy, Debug)]
pub struct RequestContext<'a> {
	/// Destination the request is sent to.
	pub destination: &'a Destination,
	/// URI of the outgoing request.
	pub request_uri: &'a Url,
}

/// Computes headers at request time (for example bearer tokens).
///
/// Destinations hold at most one provider per [`provider_key`](HeaderProvider::provider_key);
/// attaching a provider whose key is already present replaces the earlier one, so rebuilding a
/// destination never stacks duplicate providers.
pub trait HeaderProvider
where
	Self: Debug + Send + Sync,
{
	/// Identity of the provider kind; providers with the same key replace each other.
	fn provider_key(&self) -> &str;

	/// Produces the headers for one outgoing request.
	fn headers<'a>(&'a self, ctx: RequestContext<'a>) -> HeaderFuture<'a>;
}

/// Provider that always returns the same headers.
#[derive(Clone, Debug)]
pub struct StaticHeaderProvider {
	key: String,
	headers: Vec<Header>,
}
impl StaticHeaderProvider {
	/// Creates a provider identified by `key`.
	pub fn new(key: impl Into<String>, headers: Vec<Header>) -> Self {
		Self { key: key.into(), headers }
	}
}
impl HeaderProvider for StaticHeaderProvider {
	fn provider_key(&self) -> &str {
		&self.key
	}

	fn headers<'a>(&'a self, _: RequestContext<'a>) -> HeaderFuture<'a> {
		let headers = self.headers.clone();

		Box::pin(async move { Ok(headers) })
	}
}
