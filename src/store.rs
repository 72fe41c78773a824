//! Single-slot credential persistence, validity checks, and local revocation.

pub mod file;
pub mod memory;
pub mod revocation;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use revocation::{RevocationReceipt, RevocationRegistry};

// self
use crate::{_prelude::*, auth::Credential};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for the single persisted credential slot.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Reads the slot. `Ok(None)` means nothing is persisted.
	fn load(&self) -> StoreFuture<'_, Option<Credential>>;

	/// Atomically replaces the slot.
	fn save(&self, credential: Credential) -> StoreFuture<'_, ()>;

	/// Empties the slot, returning whether anything was removed.
	fn clear(&self) -> StoreFuture<'_, bool>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// The persisted slot could not be (de)serialized.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Snapshot returned by [`TokenStore::status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
	/// A valid, unrevoked credential is persisted.
	pub authenticated: bool,
	/// The persisted credential should be refreshed soon.
	pub needs_refresh: bool,
}

/// Token store facade: the single writer of the persisted credential slot.
pub struct TokenStore {
	backend: Arc<dyn CredentialStore>,
	revocations: RevocationRegistry,
}
impl TokenStore {
	/// Wraps a storage backend with an empty revocation registry.
	pub fn new(backend: Arc<dyn CredentialStore>) -> Self {
		Self { backend, revocations: RevocationRegistry::default() }
	}

	/// Loads the persisted credential.
	///
	/// A missing slot and a malformed one produce the same [`Error::CredentialNotFound`]
	/// outcome; other backend failures surface as [`Error::Storage`].
	pub async fn load(&self) -> Result<Credential> {
		match self.backend.load().await {
			Ok(Some(credential)) => Ok(credential),
			Ok(None) => Err(Error::CredentialNotFound),
			Err(StoreError::Serialization { message }) => {
				tracing::warn!(%message, "Persisted credential is unreadable; treating as absent.");

				Err(Error::CredentialNotFound)
			},
			Err(e) => Err(e.into()),
		}
	}

	/// Persists `credential`, replacing whatever was stored.
	pub async fn save(&self, credential: Credential) -> Result<()> {
		self.backend.save(credential).await?;

		tracing::info!("Credential persisted.");

		Ok(())
	}

	/// Returns `true` when `credential` is present and unexpired.
	pub fn is_valid(&self, credential: Option<&Credential>) -> bool {
		self.is_valid_at(credential, OffsetDateTime::now_utc())
	}

	/// [`Self::is_valid`] evaluated at `now`.
	pub fn is_valid_at(&self, credential: Option<&Credential>, now: OffsetDateTime) -> bool {
		credential.is_some_and(|credential| credential.is_valid_at(now))
	}

	/// Returns `true` when `credential` is present and close to (or past) its expiry.
	pub fn needs_refresh(&self, credential: Option<&Credential>) -> bool {
		self.needs_refresh_at(credential, OffsetDateTime::now_utc())
	}

	/// [`Self::needs_refresh`] evaluated at `now`.
	pub fn needs_refresh_at(&self, credential: Option<&Credential>, now: OffsetDateTime) -> bool {
		credential.is_some_and(|credential| credential.needs_refresh_at(now))
	}

	/// Returns `true` if `credential` was revoked by this process.
	pub fn is_revoked(&self, credential: &Credential) -> bool {
		self.revocations.contains(&credential.access_token)
	}

	/// Valid and not revoked.
	pub fn is_usable(&self, credential: &Credential) -> bool {
		credential.is_valid() && !self.is_revoked(credential)
	}

	/// Records `credential` as revoked and empties the persisted slot.
	///
	/// Clearing an already-empty slot is not an error. Any other clearing failure is logged
	/// and swallowed: the registry entry alone keeps the credential from being admitted.
	pub async fn revoke(&self, credential: &Credential) -> RevocationReceipt {
		let receipt = self.revocations.record(&credential.access_token);
		let cleared = match self.backend.clear().await {
			Ok(cleared) => cleared,
			Err(e) => {
				tracing::error!(error = %e, "Failed to clear the persisted credential.");

				false
			},
		};

		tracing::info!(cleared, "Credential revoked.");

		RevocationReceipt { cleared, ..receipt }
	}

	/// Summarizes the persisted credential for status endpoints.
	pub async fn status(&self) -> Result<AuthStatus> {
		let credential = match self.load().await {
			Ok(credential) => Some(credential),
			Err(Error::CredentialNotFound) => None,
			Err(e) => return Err(e),
		};
		let usable = credential.as_ref().filter(|credential| !self.is_revoked(credential));

		Ok(AuthStatus {
			authenticated: self.is_valid(usable),
			needs_refresh: self.needs_refresh(usable),
		})
	}
}
impl Debug for TokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenStore").field("revocations", &self.revocations).finish()
	}
}
