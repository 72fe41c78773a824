//! Consent URL construction, state tokens, and callback parameters.

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*, auth::ScopeSet, config::ClientIdentity, provider::ProviderDescriptor,
};

const STATE_LEN: usize = 32;

/// In-flight authorization attempt returned when a consent URL is issued.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
	/// Opaque nonce that must round-trip through the redirect.
	pub state: String,
	/// Redirect target sent with the consent URL.
	pub redirect_uri: Url,
	/// Fully formed consent URL the user should visit.
	pub authorize_url: Url,
	/// Scopes requested from the provider.
	pub scope: ScopeSet,
	/// When the URL was issued.
	pub created_at: OffsetDateTime,
}
impl AuthorizationRequest {
	pub(crate) fn new(
		descriptor: &ProviderDescriptor,
		identity: &ClientIdentity,
		scope: ScopeSet,
	) -> Self {
		let state = random_string(STATE_LEN);
		let redirect_uri = identity.redirect_uri.clone();
		let authorize_url =
			build_authorize_url(descriptor, &identity.client_id, &redirect_uri, &scope, &state);

		Self { state, redirect_uri, authorize_url, scope, created_at: OffsetDateTime::now_utc() }
	}

	/// Returns `true` when `returned_state` is this request's nonce.
	pub fn state_matches(&self, returned_state: &str) -> bool {
		returned_state == self.state
	}

	/// Validates the returned `state` parameter after the authorization redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		if self.state_matches(returned_state) {
			Ok(())
		} else {
			Err(Error::InvalidCallback { reason: "state mismatch".into() })
		}
	}
}
impl Debug for AuthorizationRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationRequest")
			.field("state", &self.state)
			.field("redirect_uri", &self.redirect_uri.as_str())
			.field("authorize_url", &self.authorize_url.as_str())
			.field("scope", &self.scope)
			.field("created_at", &self.created_at)
			.finish()
	}
}

/// Parameters delivered to the redirect target.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
	/// Authorization code.
	#[serde(default)]
	pub code: Option<String>,
	/// Returned state nonce.
	#[serde(default)]
	pub state: Option<String>,
	/// Provider error code (e.g. `access_denied`).
	#[serde(default)]
	pub error: Option<String>,
	/// Provider error description.
	#[serde(default)]
	pub error_description: Option<String>,
}
impl CallbackParams {
	/// Successful callback carrying `code` and `state`.
	pub fn new(code: impl Into<String>, state: impl Into<String>) -> Self {
		Self { code: Some(code.into()), state: Some(state.into()), ..Default::default() }
	}

	/// Splits a callback with acceptable state into the authorization code or a rejection
	/// reason (provider error, missing code).
	pub(crate) fn into_code(self) -> Result<String, String> {
		if let Some(error) = self.error.filter(|error| !error.is_empty()) {
			return Err(match self.error_description {
				Some(description) => format!("provider returned {error}: {description}"),
				None => format!("provider returned {error}"),
			});
		}

		self.code.filter(|code| !code.is_empty()).ok_or_else(|| "missing authorization code".into())
	}
}
impl Debug for CallbackParams {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CallbackParams")
			.field("code", &self.code.as_ref().map(|_| "<redacted>"))
			.field("state", &self.state)
			.field("error", &self.error)
			.field("error_description", &self.error_description)
			.finish()
	}
}

fn build_authorize_url(
	descriptor: &ProviderDescriptor,
	client_id: &str,
	redirect_uri: &Url,
	scope: &ScopeSet,
	state: &str,
) -> Url {
	let mut url = descriptor.endpoints.authorization.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("response_type", "code");
	pairs.append_pair("client_id", client_id);
	pairs.append_pair("redirect_uri", redirect_uri.as_str());

	if !scope.is_empty() {
		pairs.append_pair("scope", &scope.normalized());
	}

	pairs.append_pair("state", state);

	for (key, value) in &descriptor.authorize_params {
		pairs.append_pair(key, value);
	}

	drop(pairs);

	url
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}
