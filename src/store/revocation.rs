//! In-memory registry of locally revoked access secrets.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Outcome of [`crate::store::TokenStore::revoke`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevocationReceipt {
	/// SHA-256 fingerprint of the revoked access secret.
	pub fingerprint: String,
	/// When the revocation was recorded.
	pub revoked_at: OffsetDateTime,
	/// Whether the persisted slot held a credential that was removed.
	pub cleared: bool,
}

/// Fingerprints of revoked access secrets, keyed to their revocation instant.
///
/// Raw secrets are never retained.
#[derive(Debug, Default)]
pub struct RevocationRegistry(RwLock<HashMap<String, OffsetDateTime>>);
impl RevocationRegistry {
	/// Records `secret` as revoked now.
	pub fn record(&self, secret: &TokenSecret) -> RevocationReceipt {
		let fingerprint = secret.fingerprint();
		let revoked_at = OffsetDateTime::now_utc();

		self.0.write().insert(fingerprint.clone(), revoked_at);

		RevocationReceipt { fingerprint, revoked_at, cleared: false }
	}

	/// Returns `true` if `secret` has been revoked.
	pub fn contains(&self, secret: &TokenSecret) -> bool {
		self.0.read().contains_key(&secret.fingerprint())
	}

	/// Revocation instant for `secret`, if any.
	pub fn revoked_at(&self, secret: &TokenSecret) -> Option<OffsetDateTime> {
		self.0.read().get(&secret.fingerprint()).copied()
	}

	/// Number of revoked secrets.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing has been revoked.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn records_fingerprints_only() {
		let registry = RevocationRegistry::default();
		let secret = TokenSecret::new("ya29.revoked");
		let receipt = registry.record(&secret);

		assert!(registry.contains(&secret));
		assert!(!registry.contains(&TokenSecret::new("ya29.other")));
		assert_eq!(registry.revoked_at(&secret), Some(receipt.revoked_at));
		assert_eq!(registry.len(), 1);
		assert!(!format!("{registry:?}").contains("ya29.revoked"));
	}
}
