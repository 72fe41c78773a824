//! OAuth client identity loaded from the provider-issued credentials file.

// std
use std::{fs, path::Path};
// self
use crate::{_prelude::*, auth::ScopeSet, error::ConfigError, provider::ProviderDescriptor};

/// Registered OAuth client used for consent URLs and token-endpoint calls.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientIdentity {
	/// Public client identifier.
	pub client_id: String,
	/// Client secret; absent for public clients.
	pub client_secret: Option<String>,
	/// Redirect target registered with the provider (first entry of `redirect_uris`).
	pub redirect_uri: Url,
	/// Consent page override.
	pub auth_uri: Option<Url>,
	/// Token endpoint override.
	pub token_uri: Option<Url>,
}
impl ClientIdentity {
	/// Reads and parses the credentials file at `path`.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let bytes = fs::read(path).map_err(|source| ConfigError::ClientIdentityRead {
			path: path.to_path_buf(),
			source,
		})?;

		Self::from_json(&bytes)
	}

	/// Parses a credentials document of the form `{"web": {...}}`.
	pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_slice(bytes);
		let file: ClientSecretFile = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::ClientIdentityParse { source })?;
		let web = file.web;

		if web.client_id.trim().is_empty() {
			return Err(ConfigError::MissingField { field: "web.client_id" });
		}

		let redirect = web
			.redirect_uris
			.into_iter()
			.next()
			.filter(|uri| !uri.trim().is_empty())
			.ok_or(ConfigError::MissingField { field: "web.redirect_uris" })?;

		Ok(Self {
			client_id: web.client_id,
			client_secret: web.client_secret.filter(|secret| !secret.is_empty()),
			redirect_uri: parse_url("web.redirect_uris", &redirect)?,
			auth_uri: web
				.auth_uri
				.as_deref()
				.map(|raw| parse_url("web.auth_uri", raw))
				.transpose()?,
			token_uri: web
				.token_uri
				.as_deref()
				.map(|raw| parse_url("web.token_uri", raw))
				.transpose()?,
		})
	}

	/// Google descriptor for `scope`, honoring any endpoint overrides in this identity.
	pub fn descriptor(&self, scope: ScopeSet) -> Result<ProviderDescriptor, ConfigError> {
		ProviderDescriptor::google_builder(self.auth_uri.clone(), self.token_uri.clone())?
			.scope(scope)
			.build()
			.map_err(ConfigError::from)
	}
}
impl Debug for ClientIdentity {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientIdentity")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
			.field("redirect_uri", &self.redirect_uri.as_str())
			.field("auth_uri", &self.auth_uri.as_ref().map(Url::as_str))
			.field("token_uri", &self.token_uri.as_ref().map(Url::as_str))
			.finish()
	}
}

#[derive(Deserialize)]
struct ClientSecretFile {
	web: WebClient,
}

#[derive(Deserialize)]
struct WebClient {
	client_id: String,
	#[serde(default)]
	client_secret: Option<String>,
	#[serde(default)]
	redirect_uris: Vec<String>,
	#[serde(default)]
	auth_uri: Option<String>,
	#[serde(default)]
	token_uri: Option<String>,
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { field, source })
}
