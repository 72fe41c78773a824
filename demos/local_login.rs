//! Authorizes through a temporary loopback listener and keeps the credential in memory.
//!
//! Pass a Google `credentials.json` path to use a real client; without one a placeholder client
//! is used, which is enough to inspect the consent URL.

// std
use std::{env, sync::Arc, time::Duration};
// crates.io
use color_eyre::Result;
use tokio_util::sync::CancellationToken;
use url::Url;
// self
use playlist_gate::{
	auth::ScopeSet,
	config::ClientIdentity,
	flow::{AuthorizationFlow, LocalListener},
	provider::ProviderDescriptor,
	store::{MemoryStore, TokenStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let identity = match env::args().nth(1) {
		Some(path) => ClientIdentity::from_file(path)?,
		None => ClientIdentity {
			client_id: "demo-client.apps.googleusercontent.com".into(),
			client_secret: Some("demo-secret".into()),
			redirect_uri: Url::parse("http://127.0.0.1:8765/callback")?,
			auth_uri: None,
			token_uri: None,
		},
	};
	let descriptor =
		identity.descriptor(ScopeSet::new([ProviderDescriptor::YOUTUBE_READONLY_SCOPE])?)?;
	let backend = Arc::new(MemoryStore::default());
	let tokens = Arc::new(TokenStore::new(backend.clone()));
	let listener = LocalListener::for_redirect(&identity.redirect_uri)?;
	let flow = AuthorizationFlow::new(descriptor, identity, tokens)?;
	let session = flow.start_local(listener).await?;

	println!("Send your browser to {}.", session.authorize_url());
	println!("Listening on {:?} (state {}).", session.local_addr(), session.request().state);

	let cancel = CancellationToken::new();
	let on_interrupt = cancel.clone();

	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			on_interrupt.cancel();
		}
	});

	match session.wait(cancel, Duration::from_secs(120)).await {
		Ok(credential) => println!(
			"Authorized; token expires at {:?} with scope `{}`.",
			credential.expiry, credential.scope
		),
		Err(e) => eprintln!("Authorization did not complete: {e}."),
	}

	println!(
		"Flow ended in {:?}; stored credential present: {}.",
		flow.state(),
		backend.snapshot().is_some()
	);

	Ok(())
}
