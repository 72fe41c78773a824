// crates.io
use httpmock::prelude::*;
// self
use playlist_gate::{
	_preludet::*,
	auth::{Credential, ScopeSet},
	error::ExchangeError,
	provider::ProviderDescriptor,
};

const REDIRECT_URI: &str = "http://localhost:8080/api/auth/callback";

#[tokio::test]
async fn refresh_rotates_and_replaces_the_stored_credential() {
	let server = MockServer::start_async().await;
	let (flow, tokens, backend) = build_test_flow(&server.base_url(), REDIRECT_URI);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", "stale-refresh")
				.form_urlencoded_tuple("scope", ProviderDescriptor::YOUTUBE_READONLY_SCOPE);
			then.status(200)
				.header("content-type", "application/json")
				.body(
					"{\"access_token\":\"access-rotated\",\"refresh_token\":\"refresh-rotated\",\"token_type\":\"bearer\",\"expires_in\":3600}",
				);
		})
		.await;

	tokens
		.save(credential_expiring_in("stale", Duration::minutes(1)))
		.await
		.expect("Seed credential should persist.");

	let refreshed = flow.refresh().await.expect("Refresh should succeed.");

	mock.assert_async().await;

	assert_eq!(refreshed.access_token.expose(), "access-rotated");
	assert_eq!(
		refreshed.refresh_token.as_ref().map(|secret| secret.expose()),
		Some("refresh-rotated")
	);
	assert!(!refreshed.needs_refresh());
	assert_eq!(backend.snapshot(), Some(refreshed));
}

#[tokio::test]
async fn refresh_keeps_the_prior_secret_when_not_rotated() {
	let server = MockServer::start_async().await;
	let (flow, tokens, _) = build_test_flow(&server.base_url(), REDIRECT_URI);
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(
					"{\"access_token\":\"access-kept\",\"token_type\":\"bearer\",\"expires_in\":3600}",
				);
		})
		.await;

	tokens
		.save(credential_expiring_in("kept", Duration::minutes(1)))
		.await
		.expect("Seed credential should persist.");

	let refreshed = flow.refresh().await.expect("Refresh should succeed.");

	assert_eq!(refreshed.access_token.expose(), "access-kept");
	assert_eq!(
		refreshed.refresh_token.as_ref().map(|secret| secret.expose()),
		Some("kept-refresh")
	);
}

#[tokio::test]
async fn concurrent_refreshes_hit_the_provider_once() {
	let server = MockServer::start_async().await;
	let (flow, tokens, _) = build_test_flow(&server.base_url(), REDIRECT_URI);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(
					"{\"access_token\":\"access-singleflight\",\"refresh_token\":\"refresh-singleflight\",\"token_type\":\"bearer\",\"expires_in\":3600}",
				);
		})
		.await;

	tokens
		.save(credential_expiring_in("racing", Duration::seconds(30)))
		.await
		.expect("Seed credential should persist.");

	let (first, second): (Result<Credential>, Result<Credential>) =
		tokio::join!(flow.refresh(), flow.refresh());
	let first = first.expect("First refresh should succeed.");
	let second = second.expect("Second refresh should succeed.");

	assert_eq!(first.access_token.expose(), "access-singleflight");
	assert_eq!(second.access_token.expose(), "access-singleflight");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn rejected_refresh_secrets_revoke_the_credential() {
	let server = MockServer::start_async().await;
	let (flow, tokens, backend) = build_test_flow(&server.base_url(), REDIRECT_URI);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body(
					"{\"error\":\"invalid_grant\",\"error_description\":\"Token has been expired or revoked.\"}",
				);
		})
		.await;
	let credential = credential_expiring_in("doomed", Duration::minutes(10));

	tokens.save(credential.clone()).await.expect("Seed credential should persist.");

	let err = flow.refresh().await.expect_err("Rejected refresh secrets must fail.");

	mock.assert_async().await;

	assert!(matches!(err, Error::Exchange(ExchangeError::InvalidGrant { .. })));
	assert!(tokens.is_revoked(&credential));
	assert!(backend.snapshot().is_none());
	assert!(matches!(flow.refresh().await, Err(Error::CredentialNotFound)));
}

#[tokio::test]
async fn refresh_requires_a_refresh_secret() {
	let server = MockServer::start_async().await;
	let (flow, tokens, _) = build_test_flow(&server.base_url(), REDIRECT_URI);
	let credential = Credential::builder()
		.access_token("access-only")
		.expires_in(Duration::minutes(1))
		.scope(ScopeSet::default())
		.build()
		.expect("Credential without refresh secret should build.");

	assert!(matches!(flow.refresh().await, Err(Error::CredentialNotFound)));

	tokens.save(credential).await.expect("Seed credential should persist.");

	assert!(matches!(
		flow.refresh().await,
		Err(Error::Exchange(ExchangeError::MissingRefreshToken))
	));
}
