//! Token-endpoint facade over the `oauth2` crate.

// std
use std::time::Duration as StdDuration;
// crates.io
use oauth2::{
	AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, RedirectUrl, RefreshToken, RequestTokenError, Scope, TokenResponse,
	TokenUrl,
	basic::{
		BasicClient, BasicErrorResponse, BasicErrorResponseType, BasicRequestTokenError,
		BasicTokenResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, DEFAULT_TOKEN_TYPE, ScopeSet, TokenSecret},
	config::ClientIdentity,
	error::{ConfigError, ExchangeError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot},
	provider::ProviderDescriptor,
};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Authorization-code and refresh-token grants against one provider.
pub(crate) struct OAuthClient {
	oauth_client: ConfiguredBasicClient,
	http_client: ReqwestHttpClient,
}
impl OAuthClient {
	pub(crate) fn new(
		descriptor: &ProviderDescriptor,
		identity: &ClientIdentity,
		http_client: ReqwestHttpClient,
	) -> Result<Self> {
		let auth_url = AuthUrl::new(descriptor.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidUrl { field: "auth_uri", source })?;
		let token_url = TokenUrl::new(descriptor.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidUrl { field: "token_uri", source })?;
		let redirect_url = RedirectUrl::new(identity.redirect_uri.to_string())
			.map_err(|source| ConfigError::InvalidUrl { field: "redirect_uri", source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(identity.client_id.clone()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url)
			.set_redirect_uri(redirect_url)
			.set_auth_type(AuthType::RequestBody);

		if let Some(secret) = identity.client_secret.as_ref() {
			oauth_client = oauth_client.set_client_secret(ClientSecret::new(secret.clone()));
		}

		Ok(Self { oauth_client, http_client })
	}

	/// Exchanges an authorization code for a credential.
	pub(crate) async fn exchange_code(
		&self,
		code: &str,
		requested_scope: &ScopeSet,
	) -> Result<Credential> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.instrumented(meta.clone());
		let response = self
			.oauth_client
			.exchange_code(AuthorizationCode::new(code.to_owned()))
			.request_async(&instrumented)
			.await
			.map_err(|err| map_request_error(meta.take(), err))?;

		map_token_response(response, requested_scope, None)
	}

	/// Redeems `refresh_token`. When the provider does not rotate the refresh secret the
	/// prior one is carried into the new credential.
	pub(crate) async fn refresh(
		&self,
		refresh_token: &TokenSecret,
		requested_scope: &ScopeSet,
	) -> Result<Credential> {
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.instrumented(meta.clone());
		let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
		let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

		for scope in requested_scope.iter() {
			request = request.add_scope(Scope::new(scope.to_owned()));
		}

		let response = request
			.request_async(&instrumented)
			.await
			.map_err(|err| map_request_error(meta.take(), err))?;

		map_token_response(response, requested_scope, Some(refresh_token))
	}
}

fn map_token_response(
	response: BasicTokenResponse,
	requested_scope: &ScopeSet,
	prior_refresh: Option<&TokenSecret>,
) -> Result<Credential> {
	let expires_in = response.expires_in().ok_or(ExchangeError::MissingExpiresIn)?;
	let expiry = expiry_from(expires_in)?;
	let scope = match response.scopes() {
		Some(scopes) => ScopeSet::new(
			scopes.iter().map(|scope| scope.as_str()).filter(|scope| !scope.trim().is_empty()),
		)
		.map_err(|e| ExchangeError::MalformedCredential { reason: e.to_string() })?,
		None => requested_scope.clone(),
	};
	let refresh = response
		.refresh_token()
		.map(|token| TokenSecret::new(token.secret().to_owned()))
		.filter(|token| !token.is_empty())
		.or_else(|| prior_refresh.cloned());
	let token_type = match response.token_type() {
		BasicTokenType::Bearer => DEFAULT_TOKEN_TYPE.to_owned(),
		other => other.as_ref().to_owned(),
	};

	Credential::builder()
		.access_token(response.access_token().secret().to_owned())
		.maybe_refresh_token(refresh)
		.expiry(expiry)
		.token_type(token_type)
		.scope(scope)
		.build()
		.map_err(|e| ExchangeError::MalformedCredential { reason: e.to_string() }.into())
}

fn expiry_from(expires_in: StdDuration) -> Result<OffsetDateTime, ExchangeError> {
	let secs =
		i64::try_from(expires_in.as_secs()).map_err(|_| ExchangeError::ExpiresInOutOfRange)?;

	if secs <= 0 {
		return Err(ExchangeError::ExpiresInOutOfRange);
	}

	OffsetDateTime::now_utc()
		.checked_add(Duration::seconds(secs))
		.ok_or(ExchangeError::ExpiresInOutOfRange)
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<ReqwestError>>,
) -> Error {
	let meta = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(response, meta),
		RequestTokenError::Request(error) => map_transport_error(meta, error),
		RequestTokenError::Parse(error, _body) =>
			ExchangeError::TokenResponseParse { source: error, status: meta_status(meta) }.into(),
		RequestTokenError::Other(message) => ExchangeError::TokenEndpoint {
			message,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn map_server_response_error(
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let reason = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => response.error().as_ref().to_owned(),
	};

	match response.error() {
		BasicErrorResponseType::InvalidGrant => ExchangeError::InvalidGrant { reason }.into(),
		BasicErrorResponseType::InvalidClient | BasicErrorResponseType::UnauthorizedClient =>
			ExchangeError::InvalidClient { reason }.into(),
		_ => ExchangeError::TokenEndpoint {
			message: reason,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn map_transport_error(
	meta: Option<&ResponseMetadata>,
	err: HttpClientError<ReqwestError>,
) -> Error {
	match err {
		HttpClientError::Reqwest(inner) => map_reqwest_error(meta, *inner),
		HttpClientError::Http(inner) => ConfigError::from(inner).into(),
		HttpClientError::Io(inner) => ExchangeError::Io(inner).into(),
		HttpClientError::Other(message) => ExchangeError::TokenEndpoint {
			message: format!("HTTP client error: {message}"),
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
		_ => ExchangeError::TokenEndpoint {
			message: "HTTP client error".into(),
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

fn map_reqwest_error(meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return ExchangeError::TokenEndpoint {
			message: "request timed out".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	ExchangeError::from(err).into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn expires_in_must_be_positive() {
		assert!(matches!(expiry_from(StdDuration::ZERO), Err(ExchangeError::ExpiresInOutOfRange)));
		assert!(matches!(
			expiry_from(StdDuration::from_secs(u64::MAX)),
			Err(ExchangeError::ExpiresInOutOfRange)
		));

		let expiry =
			expiry_from(StdDuration::from_secs(3600)).expect("One hour should be accepted.");

		assert!(expiry > OffsetDateTime::now_utc() + Duration::minutes(59));
	}

	#[test]
	fn token_response_keeps_prior_refresh_and_requested_scope() {
		let response: BasicTokenResponse = serde_json::from_str(
			r#"{"access_token":"fresh","token_type":"bearer","expires_in":3599}"#,
		)
		.expect("Token response fixture should decode.");
		let scope = ScopeSet::new([ProviderDescriptor::YOUTUBE_READONLY_SCOPE])
			.expect("Scope fixture should be valid.");
		let prior = TokenSecret::new("prior-refresh");
		let credential = map_token_response(response, &scope, Some(&prior))
			.expect("Token response should map to a credential.");

		assert_eq!(credential.access_token.expose(), "fresh");
		assert_eq!(credential.refresh_token, Some(prior));
		assert_eq!(credential.token_type, "Bearer");
		assert_eq!(credential.scope, scope);
		assert!(credential.is_valid());
	}

	#[test]
	fn token_response_prefers_returned_values() {
		let response: BasicTokenResponse = serde_json::from_str(
			r#"{"access_token":"fresh","token_type":"Bearer","expires_in":60,"refresh_token":"rotated","scope":"openid email"}"#,
		)
		.expect("Token response fixture should decode.");
		let credential = map_token_response(
			response,
			&ScopeSet::default(),
			Some(&TokenSecret::new("prior-refresh")),
		)
		.expect("Token response should map to a credential.");

		assert_eq!(credential.refresh_token.as_ref().map(TokenSecret::expose), Some("rotated"));
		assert_eq!(credential.scope.normalized(), "email openid");
		assert!(credential.needs_refresh());
	}

	#[test]
	fn missing_expires_in_is_rejected() {
		let response: BasicTokenResponse =
			serde_json::from_str(r#"{"access_token":"fresh","token_type":"bearer"}"#)
				.expect("Token response fixture should decode.");
		let err = map_token_response(response, &ScopeSet::default(), None)
			.expect_err("Responses without expires_in must be rejected.");

		assert!(matches!(err, Error::Exchange(ExchangeError::MissingExpiresIn)));
	}
}
