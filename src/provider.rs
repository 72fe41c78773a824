//! Authorization-server descriptor: endpoints, default scopes, and consent-URL parameters.

// std
use std::net::IpAddr;
// self
use crate::{_prelude::*, auth::ScopeSet, error::ConfigError};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ProviderDescriptorError {
	/// Authorization endpoint is required for the authorization-code grant.
	#[error("Missing authorization endpoint.")]
	MissingAuthorizationEndpoint,
	/// Token endpoint is mandatory for exchanges and refreshes.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
}

/// Endpoint set declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Consent page the user is sent to.
	pub authorization: Url,
	/// Token endpoint used for exchanges and refreshes.
	pub token: Url,
}

/// Immutable provider descriptor consumed by the authorization flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Scopes requested when the caller does not ask for any.
	pub scope: ScopeSet,
	/// Extra query parameters appended to every consent URL.
	pub authorize_params: Vec<(String, String)>,
}
impl ProviderDescriptor {
	/// Google's consent page.
	pub const GOOGLE_AUTHORIZATION_ENDPOINT: &'static str =
		"https://accounts.google.com/o/oauth2/auth";
	/// Google's token endpoint.
	pub const GOOGLE_TOKEN_ENDPOINT: &'static str = "https://oauth2.googleapis.com/token";
	/// Read-only access to the user's YouTube account.
	pub const YOUTUBE_READONLY_SCOPE: &'static str =
		"https://www.googleapis.com/auth/youtube.readonly";

	/// Creates a new builder.
	pub fn builder() -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::default()
	}

	/// Google endpoints with the YouTube read-only scope, requesting offline access and
	/// forcing the consent prompt so a refresh token is always issued.
	pub fn google_youtube_readonly() -> Result<Self, ConfigError> {
		Self::google_builder(None, None)?
			.scope(ScopeSet::new([Self::YOUTUBE_READONLY_SCOPE])?)
			.build()
			.map_err(ConfigError::from)
	}

	/// Builder pre-seeded with Google endpoints and parameters; either endpoint may be
	/// overridden.
	pub fn google_builder(
		authorization: Option<Url>,
		token: Option<Url>,
	) -> Result<ProviderDescriptorBuilder, ConfigError> {
		let authorization = match authorization {
			Some(url) => url,
			None => parse_const("auth_uri", Self::GOOGLE_AUTHORIZATION_ENDPOINT)?,
		};
		let token = match token {
			Some(url) => url,
			None => parse_const("token_uri", Self::GOOGLE_TOKEN_ENDPOINT)?,
		};

		Ok(Self::builder()
			.authorization_endpoint(authorization)
			.token_endpoint(token)
			.authorize_param("access_type", "offline")
			.authorize_param("prompt", "consent"))
	}

	fn validate(&self) -> Result<(), ProviderDescriptorError> {
		validate_endpoint("authorization", &self.endpoints.authorization)?;
		validate_endpoint("token", &self.endpoints.token)?;

		Ok(())
	}
}

/// Builder for [`ProviderDescriptor`] values.
#[derive(Debug, Default)]
pub struct ProviderDescriptorBuilder {
	authorization_endpoint: Option<Url>,
	token_endpoint: Option<Url>,
	scope: ScopeSet,
	authorize_params: Vec<(String, String)>,
}
impl ProviderDescriptorBuilder {
	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the default requested scopes.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Appends (or replaces) an extra consent-URL parameter.
	pub fn authorize_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		let key = key.into();
		let value = value.into();

		match self.authorize_params.iter_mut().find(|(existing, _)| *existing == key) {
			Some(entry) => entry.1 = value,
			None => self.authorize_params.push((key, value)),
		}

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let authorization = self
			.authorization_endpoint
			.ok_or(ProviderDescriptorError::MissingAuthorizationEndpoint)?;
		let token = self.token_endpoint.ok_or(ProviderDescriptorError::MissingTokenEndpoint)?;
		let descriptor = ProviderDescriptor {
			endpoints: ProviderEndpoints { authorization, token },
			scope: self.scope,
			authorize_params: self.authorize_params,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

fn parse_const(field: &'static str, value: &str) -> Result<Url, ConfigError> {
	Url::parse(value).map_err(|source| ConfigError::InvalidUrl { field, source })
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ProviderDescriptorError> {
	if url.scheme() == "https" || (url.scheme() == "http" && is_loopback(url)) {
		Ok(())
	} else {
		Err(ProviderDescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

/// Returns `true` when `url` names `localhost` or a loopback IP.
pub(crate) fn is_loopback(url: &Url) -> bool {
	match url.host_str() {
		Some("localhost") => true,
		Some(host) => host
			.trim_start_matches('[')
			.trim_end_matches(']')
			.parse::<IpAddr>()
			.is_ok_and(|ip| ip.is_loopback()),
		None => false,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse descriptor URL fixture.")
	}

	#[test]
	fn rejects_missing_and_insecure_endpoints() {
		let err = ProviderDescriptor::builder()
			.token_endpoint(url("https://example.com/token"))
			.build()
			.expect_err("Missing authorization endpoint must be rejected.");

		assert_eq!(err, ProviderDescriptorError::MissingAuthorizationEndpoint);

		let err = ProviderDescriptor::builder()
			.authorization_endpoint(url("http://example.com/auth"))
			.token_endpoint(url("https://example.com/token"))
			.build()
			.expect_err("Plain HTTP on a public host must be rejected.");

		assert!(matches!(
			err,
			ProviderDescriptorError::InsecureEndpoint { endpoint: "authorization", .. }
		));
	}

	#[test]
	fn loopback_http_endpoints_are_accepted() {
		for base in ["http://127.0.0.1:9000", "http://localhost:9000", "http://[::1]:9000"] {
			ProviderDescriptor::builder()
				.authorization_endpoint(url(&format!("{base}/authorize")))
				.token_endpoint(url(&format!("{base}/token")))
				.build()
				.expect("Loopback endpoints should be accepted for local testing.");
		}
	}

	#[test]
	fn google_defaults_request_offline_consent() {
		let descriptor = ProviderDescriptor::google_youtube_readonly()
			.expect("Google descriptor should build successfully.");

		assert_eq!(
			descriptor.endpoints.authorization.as_str(),
			ProviderDescriptor::GOOGLE_AUTHORIZATION_ENDPOINT
		);
		assert_eq!(descriptor.endpoints.token.as_str(), ProviderDescriptor::GOOGLE_TOKEN_ENDPOINT);
		assert!(descriptor.scope.contains(ProviderDescriptor::YOUTUBE_READONLY_SCOPE));
		assert!(descriptor.authorize_params.contains(&("access_type".into(), "offline".into())));
		assert!(descriptor.authorize_params.contains(&("prompt".into(), "consent".into())));
	}

	#[test]
	fn authorize_params_replace_existing_keys() {
		let builder = ProviderDescriptor::builder()
			.authorize_param("prompt", "consent")
			.authorize_param("prompt", "select_account");

		assert_eq!(
			builder.authorize_params,
			vec![("prompt".to_owned(), "select_account".to_owned())]
		);
	}
}
