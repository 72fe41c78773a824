//! OAuth 2.0 access control for a playlist metadata API: a single-slot token store, the
//! authorization-code flow (with a transient local callback listener), a sliding-window rate
//! limiter, and the request gate that composes them in front of every route.

#![deny(clippy::all, missing_docs)]

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod flow;
pub mod gate;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod rate_limit;
pub mod store;

#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and fixtures shared by the integration tests.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{Credential, ScopeSet},
		config::ClientIdentity,
		flow::AuthorizationFlow,
		http::ReqwestHttpClient,
		provider::ProviderDescriptor,
		store::{MemoryStore, TokenStore},
	};

	/// Client identifier used by every fixture identity.
	pub const TEST_CLIENT_ID: &str = "client-it";
	/// Client secret used by every fixture identity.
	pub const TEST_CLIENT_SECRET: &str = "secret-it";

	/// Builds a reqwest HTTP client that also accepts the self-signed certificates some mock
	/// servers hand out.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Provider descriptor whose endpoints live under `base_url` (usually a mock server).
	pub fn test_descriptor(base_url: &str) -> ProviderDescriptor {
		let base = base_url.trim_end_matches('/');

		ProviderDescriptor::builder()
			.authorization_endpoint(
				Url::parse(&format!("{base}/authorize"))
					.expect("Mock authorization endpoint should parse successfully."),
			)
			.token_endpoint(
				Url::parse(&format!("{base}/token"))
					.expect("Mock token endpoint should parse successfully."),
			)
			.scope(
				ScopeSet::new([ProviderDescriptor::YOUTUBE_READONLY_SCOPE])
					.expect("Fixture scope should be valid."),
			)
			.authorize_param("access_type", "offline")
			.build()
			.expect("Provider descriptor should build successfully.")
	}

	/// Client identity pointing at the provided redirect target.
	pub fn test_identity(redirect_uri: &str) -> ClientIdentity {
		ClientIdentity {
			client_id: TEST_CLIENT_ID.into(),
			client_secret: Some(TEST_CLIENT_SECRET.into()),
			redirect_uri: Url::parse(redirect_uri)
				.expect("Redirect URI fixture should parse successfully."),
			auth_uri: None,
			token_uri: None,
		}
	}

	/// Builds a flow controller backed by an in-memory store and the mock provider at
	/// `base_url`.
	pub fn build_test_flow(
		base_url: &str,
		redirect_uri: &str,
	) -> (Arc<AuthorizationFlow>, Arc<TokenStore>, Arc<MemoryStore>) {
		let backend = Arc::new(MemoryStore::default());
		let tokens = Arc::new(TokenStore::new(backend.clone()));
		let flow = AuthorizationFlow::with_http_client(
			test_descriptor(base_url),
			test_identity(redirect_uri),
			tokens.clone(),
			test_reqwest_http_client(),
		)
		.expect("Authorization flow fixture should build successfully.");

		(Arc::new(flow), tokens, backend)
	}

	/// Credential fixture whose expiry sits `expires_in` away from now.
	pub fn credential_expiring_in(access: &str, expires_in: Duration) -> Credential {
		Credential::builder()
			.access_token(access)
			.refresh_token(format!("{access}-refresh"))
			.expiry(OffsetDateTime::now_utc() + expires_in)
			.scope(
				ScopeSet::new([ProviderDescriptor::YOUTUBE_READONLY_SCOPE])
					.expect("Fixture scope should be valid."),
			)
			.build()
			.expect("Credential fixture should build successfully.")
	}
}

mod _prelude {
	pub use std::{
		collections::{HashMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
