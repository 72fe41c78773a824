// std
use std::{
	env, fs,
	path::{Path, PathBuf},
	process,
};
// crates.io
use tokio::task::JoinSet;
// self
use playlist_gate::{
	_preludet::*,
	auth::Credential,
	store::{AuthStatus, CredentialStore, FileStore, MemoryStore, TokenStore},
};

fn temp_token_path(name: &str) -> PathBuf {
	env::temp_dir()
		.join(format!(
			"playlist_gate_token_store_it_{name}_{}_{}",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		))
		.join("token.json")
}

fn file_backed(path: &Path) -> (TokenStore, Arc<FileStore>) {
	let backend = Arc::new(FileStore::open(path));

	(TokenStore::new(backend.clone()), backend)
}

#[tokio::test]
async fn file_backed_store_persists_and_reports_status() {
	let path = temp_token_path("status");
	let (tokens, _) = file_backed(&path);

	assert!(matches!(tokens.load().await, Err(Error::CredentialNotFound)));
	assert_eq!(
		tokens.status().await.expect("Status should be available without a credential."),
		AuthStatus { authenticated: false, needs_refresh: false }
	);

	let credential = credential_expiring_in("file-access", Duration::hours(1));

	tokens.save(credential.clone()).await.expect("Credential should persist to disk.");

	let (reopened, _) = file_backed(&path);

	assert_eq!(reopened.load().await.expect("Reopened store should load."), credential);
	assert_eq!(
		reopened.status().await.expect("Status should be available."),
		AuthStatus { authenticated: true, needs_refresh: false }
	);

	let soon = credential_expiring_in("file-soon", Duration::minutes(2));

	reopened.save(soon).await.expect("Replacement credential should persist.");

	assert_eq!(
		reopened.status().await.expect("Status should be available."),
		AuthStatus { authenticated: true, needs_refresh: true }
	);
}

#[tokio::test]
async fn go_token_files_are_readable() {
	let path = temp_token_path("go_format");

	fs::create_dir_all(path.parent().expect("Temp path should have a parent."))
		.expect("Temp directory should be creatable.");
	fs::write(
		&path,
		r#"{"access_token":"ya29.go","token_type":"Bearer","refresh_token":"1//go-refresh","expiry":"2099-01-02T15:04:05.999999999+01:00"}"#,
	)
	.expect("Go token fixture should be writable.");

	let (tokens, _) = file_backed(&path);
	let credential = tokens.load().await.expect("Go-encoded token file should decode.");

	assert_eq!(credential.access_token.expose(), "ya29.go");
	assert_eq!(
		credential.refresh_token.as_ref().map(|secret| secret.expose()),
		Some("1//go-refresh")
	);
	assert!(tokens.is_valid(Some(&credential)));
	assert!(!tokens.needs_refresh(Some(&credential)));
}

#[tokio::test]
async fn malformed_files_are_treated_as_absent() {
	let path = temp_token_path("malformed");

	fs::create_dir_all(path.parent().expect("Temp path should have a parent."))
		.expect("Temp directory should be creatable.");
	fs::write(&path, "{ not json").expect("Malformed fixture should be writable.");

	let (tokens, _) = file_backed(&path);

	assert!(matches!(tokens.load().await, Err(Error::CredentialNotFound)));
	assert!(
		!tokens.status().await.expect("Malformed files should not fail status.").authenticated
	);
}

#[tokio::test]
async fn revocation_clears_the_file_and_blocks_the_secret() {
	let path = temp_token_path("revoke");
	let (tokens, backend) = file_backed(&path);
	let credential = credential_expiring_in("file-revoked", Duration::hours(1));

	tokens.save(credential.clone()).await.expect("Credential should persist.");

	let receipt = tokens.revoke(&credential).await;

	assert!(receipt.cleared);
	assert_eq!(receipt.fingerprint, credential.access_token.fingerprint());
	assert!(!path.exists(), "Revocation should remove the credential file.");
	assert!(tokens.is_revoked(&credential));

	// Restoring the same secret behind the facade's back must not make it usable again.
	backend.save(credential.clone()).await.expect("Backend save should succeed.");

	assert!(!tokens.is_usable(&credential));
	assert!(!tokens.status().await.expect("Status should be available.").authenticated);

	let second = tokens.revoke(&credential).await;

	assert!(second.cleared);
	assert!(!tokens.revoke(&credential).await.cleared, "Clearing an empty slot is not an error.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_leave_one_complete_credential() {
	let path = temp_token_path("concurrent");
	let (tokens, _) = file_backed(&path);
	let tokens = Arc::new(tokens);
	let credentials = (0..16)
		.map(|i| credential_expiring_in(&format!("writer-{i}"), Duration::hours(1)))
		.collect::<Vec<_>>();
	let mut writers = JoinSet::new();

	for credential in credentials.iter().cloned() {
		let tokens = tokens.clone();

		writers.spawn(async move { tokens.save(credential).await });
	}
	while let Some(joined) = writers.join_next().await {
		joined
			.expect("Writer task should not panic.")
			.expect("Concurrent save should succeed.");
	}

	let stored = tokens.load().await.expect("Final file should parse as a credential.");

	assert!(credentials.contains(&stored), "Stored credential must be one of the saved ones.");

	let leftovers = fs::read_dir(path.parent().expect("Token path should have a parent."))
		.expect("Token directory should be readable.")
		.count();

	assert_eq!(leftovers, 1, "Only the credential file should remain after concurrent saves.");
}

#[test]
fn credentials_without_expiry_are_never_valid() {
	let credential = Credential::builder()
		.access_token("no-expiry")
		.build()
		.expect("Credential without expiry should build.");
	let tokens = TokenStore::new(Arc::new(MemoryStore::default()));

	assert!(!tokens.is_valid(Some(&credential)));
	assert!(tokens.needs_refresh(Some(&credential)));
	assert!(!tokens.is_valid(None));
	assert!(!tokens.needs_refresh(None));
}
