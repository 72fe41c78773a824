//! JSON-file [`CredentialStore`] compatible with existing `token.json` files.

// std
use std::{
	fs::{self, File, OpenOptions},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::Credential,
	store::{CredentialStore, StoreError, StoreFuture},
};

/// Persists the credential slot to a single JSON file.
///
/// Loads read the file directly; saves are serialized by a writer lock and replace the file
/// atomically through a synced temporary sibling.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	writer: Arc<Mutex<()>>,
}
impl FileStore {
	/// Creates a store backed by `path`. The file need not exist yet.
	pub fn open(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into(), writer: Arc::new(Mutex::new(())) }
	}

	/// Location of the credential file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn read_slot(&self) -> Result<Option<Credential>, StoreError> {
		let bytes = match fs::read(&self.path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
			Err(e) => {
				return Err(StoreError::Backend {
					message: format!("Failed to read {}: {e}", self.path.display()),
				});
			},
		};

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(None);
		}

		serde_json::from_slice(&bytes).map(Some).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", self.path.display()),
		})
	}

	fn ensure_parent_exists(&self) -> Result<(), StoreError> {
		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, credential: &Credential) -> Result<(), StoreError> {
		self.ensure_parent_exists()?;

		let serialized =
			serde_json::to_vec_pretty(credential).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize credential: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = create_private(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl CredentialStore for FileStore {
	fn load(&self) -> StoreFuture<'_, Option<Credential>> {
		Box::pin(async move { self.read_slot() })
	}

	fn save(&self, credential: Credential) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let _guard = self.writer.lock();

			self.persist_locked(&credential)
		})
	}

	fn clear(&self) -> StoreFuture<'_, bool> {
		Box::pin(async move {
			let _guard = self.writer.lock();

			match fs::remove_file(&self.path) {
				Ok(()) => Ok(true),
				Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
				Err(e) => Err(StoreError::Backend {
					message: format!("Failed to remove {}: {e}", self.path.display()),
				}),
			}
		})
	}
}

#[cfg(unix)]
fn create_private(path: &Path) -> std::io::Result<File> {
	// std
	use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

	let file = OpenOptions::new().write(true).create(true).truncate(true).mode(0o600).open(path)?;

	// `mode` only applies on creation; a leftover temp file keeps its old bits.
	file.set_permissions(fs::Permissions::from_mode(0o600))?;

	Ok(file)
}

#[cfg(not(unix))]
fn create_private(path: &Path) -> std::io::Result<File> {
	OpenOptions::new().write(true).create(true).truncate(true).open(path)
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use tokio::runtime::Runtime;
	// self
	use super::*;

	fn temp_path(name: &str) -> PathBuf {
		let unique = format!(
			"playlist_gate_file_store_{name}_{}_{}",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique).join("token.json")
	}

	fn build_credential() -> Credential {
		Credential::builder()
			.access_token("access-token")
			.refresh_token("refresh-token")
			.expires_in(Duration::hours(1))
			.build()
			.expect("Failed to build file-store test credential.")
	}

	#[test]
	fn save_and_reload_round_trip() {
		let path = temp_path("round_trip");
		let store = FileStore::open(&path);
		let credential = build_credential();
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.save(credential.clone()))
			.expect("Failed to save fixture credential to file store.");

		let reopened = FileStore::open(&path);
		let loaded = rt
			.block_on(reopened.load())
			.expect("Failed to load fixture credential from file store.")
			.expect("File store lost credential after reopen.");

		assert_eq!(loaded, credential);

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;

			let mode = fs::metadata(&path)
				.expect("Credential file metadata should be readable.")
				.permissions()
				.mode();

			assert_eq!(mode & 0o777, 0o600);
		}

		assert!(rt.block_on(store.clear()).expect("Clear should succeed."));
		assert!(!rt.block_on(store.clear()).expect("Clearing twice should not fail."));

		if let Some(parent) = path.parent() {
			let _ = fs::remove_dir_all(parent);
		}
	}

	#[test]
	fn missing_empty_and_malformed_files() {
		let path = temp_path("malformed");
		let store = FileStore::open(&path);
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		assert_eq!(rt.block_on(store.load()).expect("Missing file should load as empty."), None);

		fs::create_dir_all(path.parent().expect("Temp path should have a parent."))
			.expect("Temp directory should be creatable.");
		fs::write(&path, b"\n").expect("Empty fixture should be writable.");

		assert_eq!(rt.block_on(store.load()).expect("Empty file should load as empty."), None);

		fs::write(&path, b"{not json").expect("Malformed fixture should be writable.");

		assert!(matches!(rt.block_on(store.load()), Err(StoreError::Serialization { .. })));

		if let Some(parent) = path.parent() {
			let _ = fs::remove_dir_all(parent);
		}
	}
}
