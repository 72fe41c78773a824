//! Per-request admission: rate check first, then (for delegated routes) a usable credential.

// self
use crate::{
	_prelude::*,
	auth::Credential,
	obs::{self, GateOutcome},
	rate_limit::{RateLimitDecision, SlidingWindowLimiter},
	store::TokenStore,
};

/// Access level a route requires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
	/// Only the rate limit applies (authorization endpoints).
	Public,
	/// A valid, unrevoked credential is required.
	Delegated,
}

/// An admitted request.
#[derive(Clone, Debug)]
pub struct Admission {
	/// Route key the request was admitted under.
	pub route: String,
	/// Credential attached for delegated routes.
	pub credential: Option<Credential>,
}

/// Composes the rate limiter and token store into admission decisions.
#[derive(Debug)]
pub struct RequestGate {
	limiter: Arc<SlidingWindowLimiter>,
	tokens: Arc<TokenStore>,
	login_url: String,
}
impl RequestGate {
	/// Creates a gate; `login_url` is reported to callers rejected as unauthorized.
	pub fn new(
		limiter: Arc<SlidingWindowLimiter>,
		tokens: Arc<TokenStore>,
		login_url: impl Into<String>,
	) -> Self {
		Self { limiter, tokens, login_url: login_url.into() }
	}

	/// Shared limiter.
	pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
		&self.limiter
	}

	/// Entry point reported in unauthorized rejections.
	pub fn login_url(&self) -> &str {
		&self.login_url
	}

	/// Decides whether a request for `route` may proceed.
	///
	/// Rate-limited requests fail with [`Error::RateLimited`] before the credential is
	/// consulted. Delegated routes without a usable credential fail with
	/// [`Error::Unauthorized`]; storage failures other than a missing credential propagate.
	pub async fn admit(&self, route: &str, access: Access) -> Result<Admission> {
		if let RateLimitDecision::Delay(directive) = self.limiter.evaluate(route) {
			tracing::debug!(route, retry_after = ?directive.retry_after, "Request rate limited.");
			obs::record_gate_decision(GateOutcome::RateLimited);

			return Err(Error::RateLimited {
				key: route.to_owned(),
				retry_after: directive.retry_after,
			});
		}

		let credential = match access {
			Access::Public => None,
			Access::Delegated => Some(self.delegated_credential().await.inspect_err(|e| {
				if matches!(e, Error::Unauthorized { .. }) {
					obs::record_gate_decision(GateOutcome::Unauthorized);
				}
			})?),
		};

		obs::record_gate_decision(GateOutcome::Admitted);

		Ok(Admission { route: route.to_owned(), credential })
	}

	async fn delegated_credential(&self) -> Result<Credential> {
		let credential = match self.tokens.load().await {
			Ok(credential) => credential,
			Err(e @ Error::CredentialNotFound) => return Err(self.unauthorized(e)),
			Err(e) => return Err(e),
		};

		if self.tokens.is_revoked(&credential) {
			return Err(self.unauthorized(Error::Revoked));
		}
		if !self.tokens.is_valid(Some(&credential)) {
			return Err(self.unauthorized(Error::CredentialInvalid));
		}

		Ok(credential)
	}

	fn unauthorized(&self, cause: Error) -> Error {
		Error::unauthorized(self.login_url.clone(), cause)
	}
}
