//! Access and refresh secrets, redacted in every formatter.

// crates.io
use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

const REDACTED: &str = "<redacted>";

/// Bearer or refresh secret as issued by the provider.
///
/// Serializes as the bare string so credential files stay compatible; `Debug` and `Display`
/// never print it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a provider-issued secret.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Raw secret for request headers and token-endpoint forms. Never log it.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// `true` for an empty secret (Go writes `""` for an absent refresh token).
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	/// Unpadded base64 SHA-256 digest, used to key the revocation registry.
	pub fn fingerprint(&self) -> String {
		let digest = Sha256::digest(self.0.as_bytes());

		STANDARD_NO_PAD.encode(digest)
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&REDACTED).finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(REDACTED)
	}
}
