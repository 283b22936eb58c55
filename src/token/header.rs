//! Bearer headers backed by an [`OAuth2TokenProvider`].

// self
use crate::{
	_prelude::*,
	destination::{
		AUTHORIZATION, Header, HeaderFuture, HeaderProvider, PROXY_AUTHORIZATION, RequestContext,
	},
	token::OAuth2TokenProvider,
};

/// Adds `Authorization: Bearer …` (or `Proxy-Authorization`) with a freshly retrieved token.
///
/// Token failures fail the header computation; the request is never sent unauthenticated.
#[derive(Clone, Debug)]
pub struct OAuth2HeaderProvider {
	header: &'static str,
	key: &'static str,
	provider: Arc<OAuth2TokenProvider>,
}
impl OAuth2HeaderProvider {
	/// Provider key of the `Authorization` variant.
	pub const AUTHORIZATION_KEY: &'static str = "oauth2:Authorization";
	/// Provider key of the `Proxy-Authorization` variant.
	pub const PROXY_AUTHORIZATION_KEY: &'static str = "oauth2:Proxy-Authorization";

	/// Produces the `Authorization` header.
	pub fn authorization(provider: Arc<OAuth2TokenProvider>) -> Self {
		Self { header: AUTHORIZATION, key: Self::AUTHORIZATION_KEY, provider }
	}

	/// Produces the `Proxy-Authorization` header.
	pub fn proxy_authorization(provider: Arc<OAuth2TokenProvider>) -> Self {
		Self { header: PROXY_AUTHORIZATION, key: Self::PROXY_AUTHORIZATION_KEY, provider }
	}

	/// Underlying token provider.
	pub fn token_provider(&self) -> &OAuth2TokenProvider {
		&self.provider
	}
}
impl HeaderProvider for OAuth2HeaderProvider {
	fn provider_key(&self) -> &str {
		self.key
	}

	fn headers<'a>(&'a self, _: RequestContext<'a>) -> HeaderFuture<'a> {
		Box::pin(async move {
			let token = self.provider.retrieve_access_token().await?;

			Ok::<_, Error>(vec![Header::new(self.header, token.authorization_value())])
		})
	}
}
