//! OAuth client identities (secret-based or certificate-based).

// self
use crate::{
	_prelude::*,
	auth::{KeyStore, TokenSecret},
	error::ConfigError,
};

/// Credentials a client presents to a token endpoint.
///
/// Certificate-based identities compare by the decoded certificate chain (see [`KeyStore`]), so
/// the same certificate delivered with different PEM formatting maps to the same cache entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClientIdentity {
	/// Client id plus shared secret.
	Secret {
		/// OAuth client id.
		client_id: String,
		/// OAuth client secret.
		secret: TokenSecret,
	},
	/// Client id plus an mTLS key store.
	Certificate {
		/// OAuth client id.
		client_id: String,
		/// Certificate chain and private key.
		key_store: Arc<KeyStore>,
	},
}
impl ClientIdentity {
	/// Creates a secret-based identity.
	pub fn secret(client_id: impl Into<String>, secret: impl Into<TokenSecret>) -> Self {
		Self::Secret { client_id: client_id.into(), secret: secret.into() }
	}

	/// Creates a certificate-based identity from PEM certificate and key text.
	pub fn certificate(
		client_id: impl Into<String>,
		certificate_pem: &str,
		key_pem: &str,
	) -> Result<Self, ConfigError> {
		let key_store = KeyStore::from_pem(certificate_pem, key_pem)?;

		Ok(Self::Certificate { client_id: client_id.into(), key_store: Arc::new(key_store) })
	}

	/// Creates a certificate-based identity from an existing key store.
	pub fn with_key_store(client_id: impl Into<String>, key_store: KeyStore) -> Self {
		Self::Certificate { client_id: client_id.into(), key_store: Arc::new(key_store) }
	}

	/// Returns the OAuth client id.
	pub fn id(&self) -> &str {
		match self {
			Self::Secret { client_id, .. } | Self::Certificate { client_id, .. } => client_id,
		}
	}

	/// Returns the key store for certificate-based identities.
	pub fn key_store(&self) -> Option<&KeyStore> {
		match self {
			Self::Certificate { key_store, .. } => Some(key_store),
			Self::Secret { .. } => None,
		}
	}

	/// Returns `true` for certificate-based identities.
	pub fn is_certificate_based(&self) -> bool {
		matches!(self, Self::Certificate { .. })
	}
}
