//! Delegated-access credential, its validity rules, and a builder.

// crates.io
use serde::Deserializer;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
};

/// Token type assumed when the provider or persisted file omits one.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
}

/// Delegated-access grant persisted by the token store.
///
/// The JSON shape matches the token files written by Go's `oauth2.Token` encoder, so an
/// existing `token.json` keeps working. An expiry that is absent, `null`, or at or before the
/// Unix epoch (Go's zero time included) is treated as "no expiry" and never counts as valid.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the provider issued one.
	#[serde(
		default,
		skip_serializing_if = "Option::is_none",
		deserialize_with = "deserialize_refresh_token"
	)]
	pub refresh_token: Option<TokenSecret>,
	/// Absolute expiry instant.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub expiry: Option<OffsetDateTime>,
	/// Token type reported by the provider.
	#[serde(default = "default_token_type")]
	pub token_type: String,
	/// Scopes granted with this credential.
	#[serde(default, skip_serializing_if = "ScopeSet::is_empty")]
	pub scope: ScopeSet,
}
impl Credential {
	/// Window before expiry in which a refresh is recommended.
	pub const REFRESH_HORIZON: Duration = Duration::minutes(5);

	/// Returns a builder for assembling credentials.
	pub fn builder() -> CredentialBuilder {
		CredentialBuilder::default()
	}

	/// Expiry instant with the zero value filtered out.
	pub fn effective_expiry(&self) -> Option<OffsetDateTime> {
		self.expiry.filter(|expiry| *expiry > OffsetDateTime::UNIX_EPOCH)
	}

	/// Returns `true` if the credential is still valid at `now`.
	pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
		self.effective_expiry().is_some_and(|expiry| now < expiry)
	}

	/// Returns `true` if the credential is valid relative to the current clock.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` when expiry is unknown or closer than [`Self::REFRESH_HORIZON`].
	pub fn needs_refresh_at(&self, now: OffsetDateTime) -> bool {
		match self.effective_expiry() {
			Some(expiry) => expiry - now < Self::REFRESH_HORIZON,
			None => true,
		}
	}

	/// Same as [`Self::needs_refresh_at`] using the current clock.
	pub fn needs_refresh(&self) -> bool {
		self.needs_refresh_at(OffsetDateTime::now_utc())
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expiry", &self.expiry)
			.field("token_type", &self.token_type)
			.field("scope", &self.scope)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug, Default)]
pub struct CredentialBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	expiry: Option<OffsetDateTime>,
	token_type: Option<String>,
	scope: ScopeSet,
}
impl CredentialBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides an optional refresh secret, e.g. one carried over from a prior credential.
	pub fn maybe_refresh_token(mut self, token: Option<TokenSecret>) -> Self {
		self.refresh_token = token;

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expiry(mut self, instant: OffsetDateTime) -> Self {
		self.expiry = Some(instant);

		self
	}

	/// Sets the expiry relative to the current clock.
	pub fn expires_in(self, duration: Duration) -> Self {
		self.expiry(OffsetDateTime::now_utc() + duration)
	}

	/// Overrides the token type (defaults to `Bearer`).
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Sets the granted scopes.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		let access_token = self
			.access_token
			.filter(|token| !token.is_empty())
			.ok_or(CredentialBuilderError::MissingAccessToken)?;

		Ok(Credential {
			access_token,
			refresh_token: self.refresh_token.filter(|token| !token.is_empty()),
			expiry: self.expiry,
			token_type: self.token_type.unwrap_or_else(default_token_type),
			scope: self.scope,
		})
	}
}

fn default_token_type() -> String {
	DEFAULT_TOKEN_TYPE.into()
}

fn deserialize_refresh_token<'de, D>(deserializer: D) -> Result<Option<TokenSecret>, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = <Option<String>>::deserialize(deserializer)?;

	Ok(raw.filter(|value| !value.is_empty()).map(TokenSecret::new))
}
