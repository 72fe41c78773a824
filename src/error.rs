//! Crate-level error taxonomy shared by the limiter, token store, flow controller, and gate.

// std
use std::{path::PathBuf, time::Duration as StdDuration};
// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem; fatal when raised at startup.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Storage-layer failure other than a missing or malformed credential.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Code exchange or refresh against the token endpoint failed.
	#[error(transparent)]
	Exchange(#[from] ExchangeError),

	/// No credential is persisted (or the persisted one is unreadable).
	#[error("No stored credential is available.")]
	CredentialNotFound,
	/// The persisted credential is expired or was never valid.
	#[error("Stored credential is expired or has no expiry.")]
	CredentialInvalid,
	/// The credential was revoked by this process.
	#[error("Credential has been revoked.")]
	Revoked,
	/// The endpoint key exhausted its admission budget.
	#[error("Rate limit exceeded for `{key}`.")]
	RateLimited {
		/// Endpoint key that was rejected.
		key: String,
		/// Time until the next admission can succeed.
		retry_after: StdDuration,
	},
	/// The route requires delegated access and no usable credential exists.
	#[error("Delegated access is required: {cause}")]
	Unauthorized {
		/// Entry point the caller should visit to authorize.
		login_url: String,
		/// Why the stored credential was not usable.
		cause: Box<Error>,
	},
	/// A second authorization flow was attempted while one is active.
	#[error("An authorization flow is already in progress.")]
	AlreadyInProgress,
	/// No authorization flow is waiting for a callback.
	#[error("No authorization flow is awaiting a callback.")]
	NoPendingAuthorization,
	/// The callback carried no usable code or an unexpected state.
	#[error("Authorization callback rejected: {reason}.")]
	InvalidCallback {
		/// Human-readable rejection reason.
		reason: String,
	},
	/// Waiting for the user ended without a callback.
	#[error("Authorization flow was abandoned: {reason}.")]
	Abandoned {
		/// Why the wait ended (timeout, cancellation, listener failure).
		reason: &'static str,
	},
}
impl Error {
	/// Wraps `cause` as an [`Error::Unauthorized`] pointing at `login_url`.
	pub fn unauthorized(login_url: impl Into<String>, cause: Error) -> Self {
		Self::Unauthorized { login_url: login_url.into(), cause: Box::new(cause) }
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Client identity file could not be read.
	#[error("Unable to read client identity file {}.", .path.display())]
	ClientIdentityRead {
		/// File that failed to open.
		path: PathBuf,
		/// Underlying I/O failure.
		#[source]
		source: std::io::Error,
	},
	/// Client identity file is not the expected JSON document.
	#[error("Unable to parse client identity file at `{}`.", .source.path())]
	ClientIdentityParse {
		/// Structured parsing failure including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Client identity lacks a required value.
	#[error("Client identity is missing `{field}`.")]
	MissingField {
		/// Dotted name of the missing field.
		field: &'static str,
	},
	/// A configured URL cannot be parsed.
	#[error("The `{field}` value is not a valid URL.")]
	InvalidUrl {
		/// Field that held the URL.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Provider descriptor failed validation.
	#[error(transparent)]
	Provider(#[from] crate::provider::ProviderDescriptorError),
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Credential builder validation failed.
	#[error("Unable to build credential.")]
	CredentialBuild(#[from] crate::auth::CredentialBuilderError),
	/// Rate limiter window must be positive.
	#[error("Rate limit window must be greater than zero.")]
	InvalidWindow,
	/// Redirect target cannot be served by a local listener.
	#[error("Redirect target `{url}` does not name a local host and port.")]
	ListenerAddress {
		/// Offending redirect target.
		url: String,
	},
	/// Local callback listener could not bind its port.
	#[error("Unable to bind the callback listener on {addr}.")]
	ListenerBind {
		/// Address the listener tried to bind.
		addr: std::net::SocketAddr,
		/// Underlying I/O failure.
		#[source]
		source: std::io::Error,
	},
	/// CORS origin is not a valid header value.
	#[error("CORS origin `{origin}` is not a valid header value.")]
	CorsOrigin {
		/// Offending origin.
		origin: String,
	},
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
}
impl ConfigError {
	/// Wraps a transport builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures raised while talking to the token endpoint.
#[derive(Debug, ThisError)]
pub enum ExchangeError {
	/// Provider rejected the grant (bad, expired, or reused code or refresh token).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or the client is not authorized for the grant.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Provider returned an unexpected but well-formed response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying I/O failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned a non-positive or oversized `expires_in`.
	#[error("The expires_in value is outside the supported range.")]
	ExpiresInOutOfRange,
	/// Token response parsed but does not describe a usable credential.
	#[error("Token endpoint returned an unusable credential: {reason}")]
	MalformedCredential {
		/// What was wrong with the response.
		reason: String,
	},
	/// Stored credential has no refresh secret to rotate with.
	#[error("Stored credential is missing a refresh token.")]
	MissingRefreshToken,
}
impl ExchangeError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ExchangeError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "disk unplugged".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("disk unplugged"));

		let source = StdError::source(&error)
			.expect("Crate error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn unauthorized_keeps_cause_and_login_hint() {
		let error = Error::unauthorized("/login", Error::CredentialNotFound);

		match &error {
			Error::Unauthorized { login_url, cause } => {
				assert_eq!(login_url, "/login");
				assert!(matches!(**cause, Error::CredentialNotFound));
			},
			other => panic!("Unexpected error variant: {other:?}."),
		}

		assert!(error.to_string().contains("No stored credential"));
	}
}
