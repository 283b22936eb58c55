//! Client key store decoded from PEM material.
//!
//! Certificates are decoded to DER once and fingerprinted with SHA-256. Equality and hashing use
//! the fingerprint list only, so two stores built from differently wrapped or spaced PEM text for
//! the same chain compare equal, while an empty store never equals a loaded one.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use rustls_pki_types::{CertificateDer, PrivateKeyDer, pem::PemObject};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError};

const PEM_LINE_WIDTH: usize = 64;

/// Certificate chain plus private key used for mutual TLS towards a token endpoint.
#[derive(Clone, Default)]
pub struct KeyStore {
	certificates: Vec<Vec<u8>>,
	fingerprints: Vec<[u8; 32]>,
	private_key: Option<PemBlock>,
}
impl KeyStore {
	/// Creates a key store without any material.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Decodes a certificate chain and a private key from PEM text.
	///
	/// `certificate_pem` may contain several `CERTIFICATE` blocks; `key_pem` must contain exactly
	/// one PKCS#1, PKCS#8, or SEC1 private key block.
	pub fn from_pem(certificate_pem: &str, key_pem: &str) -> Result<Self, ConfigError> {
		let certificates = CertificateDer::pem_slice_iter(certificate_pem.as_bytes())
			.map(|certificate| certificate.map(|der| der.to_vec()))
			.collect::<Result<Vec<_>, _>>()
			.map_err(invalid_pem)?;

		if certificates.is_empty() {
			return Err(ConfigError::InvalidPem {
				reason: "no CERTIFICATE block was found".into(),
			});
		}

		let mut keys = PrivateKeyDer::pem_slice_iter(key_pem.as_bytes())
			.map(|key| key.map(PemBlock::from))
			.collect::<Result<Vec<_>, _>>()
			.map_err(invalid_pem)?;
		let private_key = match (keys.pop(), keys.is_empty()) {
			(Some(key), true) => key,
			(Some(_), false) =>
				return Err(ConfigError::InvalidPem {
					reason: "more than one PRIVATE KEY block was found".into(),
				}),
			(None, _) =>
				return Err(ConfigError::InvalidPem {
					reason: "no PRIVATE KEY block was found".into(),
				}),
		};
		let fingerprints = certificates.iter().map(|der| Sha256::digest(der).into()).collect();

		Ok(Self { certificates, fingerprints, private_key: Some(private_key) })
	}

	/// Returns `true` when no certificate was loaded.
	pub fn is_empty(&self) -> bool {
		self.certificates.is_empty()
	}

	/// SHA-256 fingerprints of the certificate chain, leaf first.
	pub fn fingerprints(&self) -> &[[u8; 32]] {
		&self.fingerprints
	}

	/// Number of certificates in the chain.
	pub fn certificate_count(&self) -> usize {
		self.certificates.len()
	}

	/// Renders the key followed by the chain as canonical PEM, ready for a TLS client identity.
	pub fn identity_pem(&self) -> Option<TokenSecret> {
		let key = self.private_key.as_ref()?;

		if self.is_empty() {
			return None;
		}

		let mut buf = encode_block(&key.label, &key.der);

		for der in &self.certificates {
			buf.push_str(&encode_block("CERTIFICATE", der));
		}

		Some(TokenSecret::new(buf))
	}
}
impl PartialEq for KeyStore {
	fn eq(&self, other: &Self) -> bool {
		self.fingerprints == other.fingerprints
	}
}
impl Eq for KeyStore {}
impl Hash for KeyStore {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.fingerprints.hash(state);
	}
}
impl Debug for KeyStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("KeyStore")
			.field("certificates", &self.certificates.len())
			.field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

#[derive(Clone)]
struct PemBlock {
	label: String,
	der: Vec<u8>,
}
impl From<PrivateKeyDer<'static>> for PemBlock {
	fn from(key: PrivateKeyDer<'static>) -> Self {
		let label = match &key {
			PrivateKeyDer::Pkcs1(_) => "RSA PRIVATE KEY",
			PrivateKeyDer::Sec1(_) => "EC PRIVATE KEY",
			_ => "PRIVATE KEY",
		};

		Self { label: label.into(), der: key.secret_der().to_vec() }
	}
}

fn invalid_pem(e: rustls_pki_types::pem::Error) -> ConfigError {
	ConfigError::InvalidPem { reason: e.to_string() }
}

fn encode_block(label: &str, der: &[u8]) -> String {
	let body = STANDARD.encode(der);
	let mut buf = format!("-----BEGIN {label}-----\n");

	for line in body.as_bytes().chunks(PEM_LINE_WIDTH) {
		buf.push_str(&String::from_utf8_lossy(line));
		buf.push('\n');
	}

	buf.push_str(&format!("-----END {label}-----\n"));

	buf
}
