//! Thread-safe in-memory [`CredentialStore`] for tests and demos.

// self
use crate::{
	_prelude::*,
	auth::Credential,
	store::{CredentialStore, StoreFuture},
};

/// Storage backend that keeps the credential slot in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<Option<Credential>>>);
impl MemoryStore {
	/// Creates a store already holding `credential`.
	pub fn with_credential(credential: Credential) -> Self {
		Self(Arc::new(RwLock::new(Some(credential))))
	}

	/// Synchronous peek used by tests.
	pub fn snapshot(&self) -> Option<Credential> {
		self.0.read().clone()
	}
}
impl CredentialStore for MemoryStore {
	fn load(&self) -> StoreFuture<'_, Option<Credential>> {
		Box::pin(async move { Ok(self.snapshot()) })
	}

	fn save(&self, credential: Credential) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			*self.0.write() = Some(credential);

			Ok(())
		})
	}

	fn clear(&self) -> StoreFuture<'_, bool> {
		Box::pin(async move { Ok(self.0.write().take().is_some()) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn save_replaces_and_clear_reports_removal() {
		let store = MemoryStore::default();
		let first = Credential::builder()
			.access_token("first")
			.build()
			.expect("First credential should build.");
		let second = Credential::builder()
			.access_token("second")
			.build()
			.expect("Second credential should build.");

		store.save(first).await.expect("First save should succeed.");
		store.save(second.clone()).await.expect("Second save should succeed.");

		assert_eq!(store.load().await.expect("Load should succeed."), Some(second));
		assert!(store.clear().await.expect("Clear should succeed."));
		assert!(!store.clear().await.expect("Second clear should succeed."));
		assert!(store.snapshot().is_none());
	}
}
