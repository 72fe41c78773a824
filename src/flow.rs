//! Authorization-code state machine, local callback sessions, and refresh.
//!
//! [`AuthorizationFlow`] owns at most one in-flight [`AuthorizationRequest`]. The consent
//! URL can be delivered to the user in one of two modes:
//!
//! - External: a web frontend receives the redirect and forwards the parameters through
//!   [`AuthorizationFlow::complete_external`].
//! - Local listener: [`AuthorizationFlow::start_local`] binds the redirect target on the
//!   loopback interface and [`LocalSession::wait`] blocks until the browser arrives, the
//!   caller cancels, or the timeout elapses.
//!
//! A callback whose `state` does not match the pending request is ignored: it is rejected
//! without touching the flow, which keeps waiting for the genuine redirect.

pub mod listener;
pub mod request;

pub use listener::{DEFAULT_SHUTDOWN_GRACE, LocalListener};
pub use request::{AuthorizationRequest, CallbackParams};

// std
use std::{net::SocketAddr, time::Duration as StdDuration};
// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	config::ClientIdentity,
	error::ExchangeError,
	flow::listener::BoundListener,
	http::ReqwestHttpClient,
	oauth::OAuthClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::ProviderDescriptor,
	store::TokenStore,
};

/// Lifecycle of the authorization-code grant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
	/// No attempt is in progress.
	#[default]
	Idle,
	/// A consent URL was issued; nothing is listening for the redirect yet.
	AwaitingUserAuthorization,
	/// The redirect is expected.
	AwaitingCallback,
	/// The authorization code is being redeemed.
	Exchanging,
	/// The last attempt produced and persisted a credential.
	Complete,
	/// The last attempt failed, was cancelled, or timed out.
	Failed,
}
impl FlowState {
	/// Returns `true` while a callback is expected or being exchanged.
	pub fn is_busy(self) -> bool {
		matches!(self, Self::AwaitingCallback | Self::Exchanging)
	}
}

/// How the pending request expects its redirect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackMode {
	/// A [`LocalSession`] is serving the redirect target.
	LocalListener,
	/// Another HTTP surface forwards the redirect parameters.
	External,
}

#[derive(Debug, Default)]
struct FlowSlot {
	state: FlowState,
	pending: Option<AuthorizationRequest>,
	mode: Option<CallbackMode>,
}
impl FlowSlot {
	fn transition(&mut self, next: FlowState) {
		tracing::info!(from = ?self.state, to = ?next, "Authorization flow transition.");

		self.state = next;

		if !matches!(next, FlowState::AwaitingUserAuthorization | FlowState::AwaitingCallback) {
			self.pending = None;
			self.mode = None;
		}
	}
}

/// Authorization-code flow controller for one client identity.
pub struct AuthorizationFlow {
	descriptor: ProviderDescriptor,
	identity: ClientIdentity,
	client: OAuthClient,
	tokens: Arc<TokenStore>,
	slot: Mutex<FlowSlot>,
	refresh_guard: AsyncMutex<()>,
}
impl AuthorizationFlow {
	/// Creates a controller using a default [`ReqwestHttpClient`].
	pub fn new(
		descriptor: ProviderDescriptor,
		identity: ClientIdentity,
		tokens: Arc<TokenStore>,
	) -> Result<Self> {
		Self::with_http_client(descriptor, identity, tokens, ReqwestHttpClient::new()?)
	}

	/// Creates a controller using the provided HTTP client.
	pub fn with_http_client(
		descriptor: ProviderDescriptor,
		identity: ClientIdentity,
		tokens: Arc<TokenStore>,
		http_client: ReqwestHttpClient,
	) -> Result<Self> {
		let client = OAuthClient::new(&descriptor, &identity, http_client)?;

		Ok(Self {
			descriptor,
			identity,
			client,
			tokens,
			slot: Mutex::new(FlowSlot::default()),
			refresh_guard: AsyncMutex::new(()),
		})
	}

	/// Current state.
	pub fn state(&self) -> FlowState {
		self.slot.lock().state
	}

	/// The pending request, if a URL has been issued and not yet consumed.
	pub fn pending_request(&self) -> Option<AuthorizationRequest> {
		self.slot.lock().pending.clone()
	}

	/// Client identity the flow authorizes as.
	pub fn identity(&self) -> &ClientIdentity {
		&self.identity
	}

	/// Token store this flow persists into.
	pub fn tokens(&self) -> &Arc<TokenStore> {
		&self.tokens
	}

	/// Issues a fresh consent URL and enters [`FlowState::AwaitingUserAuthorization`].
	///
	/// Rejected with [`Error::AlreadyInProgress`] while a callback is expected or being
	/// exchanged.
	pub fn build_authorization_url(&self) -> Result<AuthorizationRequest> {
		let mut slot = self.slot.lock();

		if slot.state.is_busy() {
			return Err(Error::AlreadyInProgress);
		}

		let request = self.new_request();

		slot.transition(FlowState::AwaitingUserAuthorization);
		slot.pending = Some(request.clone());

		Ok(request)
	}

	/// Issues (or re-issues the pending) consent URL for external callback delivery and
	/// enters [`FlowState::AwaitingCallback`].
	pub fn await_external_callback(&self) -> Result<AuthorizationRequest> {
		let mut slot = self.slot.lock();

		match (slot.state, slot.mode, slot.pending.as_ref()) {
			(FlowState::AwaitingCallback, Some(CallbackMode::External), Some(pending)) =>
				return Ok(pending.clone()),
			(state, ..) if state.is_busy() => return Err(Error::AlreadyInProgress),
			_ => {},
		}

		let request = match slot.pending.take() {
			Some(pending) if slot.state == FlowState::AwaitingUserAuthorization => pending,
			_ => self.new_request(),
		};

		slot.transition(FlowState::AwaitingCallback);
		slot.pending = Some(request.clone());
		slot.mode = Some(CallbackMode::External);

		Ok(request)
	}

	/// Delivers redirect parameters received by an external surface, then exchanges the code
	/// and persists the credential.
	///
	/// `state` is optional here but checked when present; a mismatch is ignored
	/// ([`Error::InvalidCallback`] is returned and the flow keeps waiting).
	pub async fn complete_external(&self, params: CallbackParams) -> Result<Credential> {
		let (code, request) = {
			let mut slot = self.slot.lock();
			let pending = match (slot.state, slot.mode, slot.pending.as_ref()) {
				(FlowState::AwaitingCallback, Some(CallbackMode::External), Some(pending)) =>
					pending,
				_ => return Err(Error::NoPendingAuthorization),
			};

			if let Some(returned) = params.state.as_deref() {
				if let Err(e) = pending.validate_state(returned) {
					tracing::warn!("Ignoring callback with a mismatched state.");

					return Err(e);
				}
			}

			Self::accept_callback(&mut slot, params)?
		};

		self.exchange(code, request).await
	}

	/// Binds the local callback listener and enters [`FlowState::AwaitingCallback`].
	pub async fn start_local(&self, listener: LocalListener) -> Result<LocalSession<'_>> {
		let request = {
			let mut slot = self.slot.lock();

			if slot.state.is_busy() {
				return Err(Error::AlreadyInProgress);
			}

			let request = self.new_request();

			slot.transition(FlowState::AwaitingCallback);
			slot.pending = Some(request.clone());
			slot.mode = Some(CallbackMode::LocalListener);

			request
		};
		let bound = match listener.bind(request.state.clone()).await {
			Ok(bound) => bound,
			Err(e) => {
				self.fail("callback listener could not bind");

				return Err(e.into());
			},
		};

		Ok(LocalSession { flow: self, request, listener: Some(bound), settled: false })
	}

	/// Returns a finished flow (`Complete` or `Failed`) to `Idle`, discarding an unconsumed
	/// URL as well. Busy flows are left untouched.
	pub fn reset(&self) -> Result<()> {
		let mut slot = self.slot.lock();

		if slot.state.is_busy() {
			return Err(Error::AlreadyInProgress);
		}

		slot.transition(FlowState::Idle);

		Ok(())
	}

	/// Redeems the stored refresh secret and replaces the stored credential.
	///
	/// Concurrent callers are serialized; a caller that waited behind a refresh that already
	/// rotated the credential receives that credential instead of refreshing again.
	pub async fn refresh(&self) -> Result<Credential> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result: Result<Credential> = span
			.wrap(async {
				let observed = self.tokens.load().await?;
				let _singleflight = self.refresh_guard.lock().await;
				let current = self.tokens.load().await?;

				if self.tokens.is_revoked(&current) {
					return Err(Error::Revoked);
				}
				if current.access_token != observed.access_token && current.is_valid() {
					tracing::debug!("Credential was refreshed by a concurrent caller.");

					return Ok(current);
				}

				let refresh_token =
					current.refresh_token.as_ref().ok_or(ExchangeError::MissingRefreshToken)?;
				let scope = if current.scope.is_empty() {
					self.descriptor.scope.clone()
				} else {
					current.scope.clone()
				};

				match self.client.refresh(refresh_token, &scope).await {
					Ok(refreshed) => {
						self.tokens.save(refreshed.clone()).await?;

						Ok(refreshed)
					},
					Err(e @ Error::Exchange(ExchangeError::InvalidGrant { .. })) => {
						tracing::warn!("Refresh secret was rejected; revoking the credential.");

						self.tokens.revoke(&current).await;

						Err(e)
					},
					Err(e) => Err(e),
				}
			})
			.await;

		record(KIND, &result);

		result
	}

	fn new_request(&self) -> AuthorizationRequest {
		AuthorizationRequest::new(&self.descriptor, &self.identity, self.descriptor.scope.clone())
	}

	/// Consumes the pending request for a callback whose state is acceptable.
	fn accept_callback(
		slot: &mut FlowSlot,
		params: CallbackParams,
	) -> Result<(String, AuthorizationRequest)> {
		let request = slot.pending.take().ok_or(Error::NoPendingAuthorization)?;

		match params.into_code() {
			Ok(code) => {
				slot.transition(FlowState::Exchanging);

				Ok((code, request))
			},
			Err(reason) => {
				tracing::warn!(%reason, "Authorization callback rejected.");

				slot.transition(FlowState::Failed);
				obs::record_flow_outcome(FlowKind::Authorization, FlowOutcome::Failure);

				Err(Error::InvalidCallback { reason })
			},
		}
	}

	async fn exchange(&self, code: String, request: AuthorizationRequest) -> Result<Credential> {
		const KIND: FlowKind = FlowKind::Authorization;

		let span = FlowSpan::new(KIND, "exchange");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result: Result<Credential> = span
			.wrap(async {
				let credential = self.client.exchange_code(&code, &request.scope).await?;

				self.tokens.save(credential.clone()).await?;

				Ok(credential)
			})
			.await;
		let next = if result.is_ok() { FlowState::Complete } else { FlowState::Failed };

		if let Err(e) = &result {
			tracing::error!(error = %e, "Authorization code exchange failed.");
		}

		self.slot.lock().transition(next);
		record(KIND, &result);

		result
	}

	fn fail(&self, reason: &'static str) {
		let mut slot = self.slot.lock();

		if slot.state.is_busy() {
			tracing::warn!(reason, "Authorization flow abandoned.");

			slot.transition(FlowState::Failed);
			obs::record_flow_outcome(FlowKind::Authorization, FlowOutcome::Failure);
		}
	}
}
impl Debug for AuthorizationFlow {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationFlow")
			.field("descriptor", &self.descriptor)
			.field("identity", &self.identity)
			.field("slot", &*self.slot.lock())
			.finish()
	}
}

/// Local-listener authorization attempt returned by [`AuthorizationFlow::start_local`].
///
/// Dropping an unfinished session (or its `wait` future) shuts the listener down and fails
/// the flow.
pub struct LocalSession<'a> {
	flow: &'a AuthorizationFlow,
	request: AuthorizationRequest,
	listener: Option<BoundListener>,
	settled: bool,
}
impl LocalSession<'_> {
	/// Consent URL the user must open.
	pub fn authorize_url(&self) -> &Url {
		&self.request.authorize_url
	}

	/// The pending request.
	pub fn request(&self) -> &AuthorizationRequest {
		&self.request
	}

	/// Address the callback listener actually bound.
	pub fn local_addr(&self) -> Option<SocketAddr> {
		self.listener.as_ref().map(|listener| listener.local_addr)
	}

	/// Waits for the redirect, then exchanges the code and persists the credential.
	///
	/// The listener is shut down (bounded by its grace period) before the exchange runs.
	/// Cancellation or timeout fails the flow with [`Error::Abandoned`].
	pub async fn wait(
		mut self,
		cancel: CancellationToken,
		timeout: StdDuration,
	) -> Result<Credential> {
		let result = self.wait_inner(cancel, timeout).await;

		self.settled = true;

		result
	}

	async fn wait_inner(
		&mut self,
		cancel: CancellationToken,
		timeout: StdDuration,
	) -> Result<Credential> {
		let Some(BoundListener { mut callbacks, server, .. }) = self.listener.take() else {
			return Err(Error::NoPendingAuthorization);
		};
		let outcome = tokio::select! {
			received = &mut callbacks => received.map_err(|_| "callback listener stopped"),
			_ = cancel.cancelled() => Err("cancelled"),
			_ = tokio::time::sleep(timeout) => Err("timed out"),
		};

		drop(callbacks);
		server.shutdown().await;

		let params = match outcome {
			Ok(params) => params,
			Err(reason) => {
				self.flow.fail(reason);

				return Err(Error::Abandoned { reason });
			},
		};
		let accepted = {
			let mut slot = self.flow.slot.lock();

			if slot.state != FlowState::AwaitingCallback
				|| slot.mode != Some(CallbackMode::LocalListener)
			{
				return Err(Error::NoPendingAuthorization);
			}

			AuthorizationFlow::accept_callback(&mut slot, params)
		};
		let (code, request) = accepted?;

		self.flow.exchange(code, request).await
	}
}
impl Drop for LocalSession<'_> {
	fn drop(&mut self) {
		if !self.settled {
			self.listener.take();
			self.flow.fail("session dropped");
		}
	}
}
impl Debug for LocalSession<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LocalSession")
			.field("request", &self.request)
			.field("local_addr", &self.local_addr())
			.finish()
	}
}

fn record<T>(kind: FlowKind, result: &Result<T>) {
	let outcome = if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure };

	obs::record_flow_outcome(kind, outcome);
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::build_test_flow;

	fn flow() -> Arc<AuthorizationFlow> {
		build_test_flow("https://accounts.example.com", "http://127.0.0.1:0/callback").0
	}

	#[test]
	fn url_issuance_follows_the_state_machine() {
		let flow = flow();

		assert_eq!(flow.state(), FlowState::Idle);

		let first = flow.build_authorization_url().expect("Idle flow should issue a URL.");

		assert_eq!(flow.state(), FlowState::AwaitingUserAuthorization);

		let second = flow.build_authorization_url().expect("URL can be re-issued before waiting.");

		assert_ne!(first.state, second.state);

		let awaiting = flow.await_external_callback().expect("Pending URL should be promoted.");

		assert_eq!(awaiting.state, second.state);
		assert_eq!(flow.state(), FlowState::AwaitingCallback);
		assert!(matches!(flow.build_authorization_url(), Err(Error::AlreadyInProgress)));
		assert!(matches!(flow.reset(), Err(Error::AlreadyInProgress)));

		let reissued = flow.await_external_callback().expect("Same URL should be re-issued.");

		assert_eq!(reissued, awaiting);
	}

	#[tokio::test]
	async fn mismatched_state_is_ignored_and_provider_errors_fail() {
		let flow = flow();
		let pending = flow.await_external_callback().expect("Flow should await a callback.");
		let err = flow
			.complete_external(CallbackParams::new("code", "forged"))
			.await
			.expect_err("Mismatched state must be rejected.");

		assert!(matches!(err, Error::InvalidCallback { .. }));
		assert_eq!(flow.state(), FlowState::AwaitingCallback);
		assert_eq!(flow.pending_request(), Some(pending.clone()));

		let denied = CallbackParams {
			state: Some(pending.state.clone()),
			error: Some("access_denied".into()),
			..Default::default()
		};
		let err = flow.complete_external(denied).await.expect_err("Provider errors must fail.");

		assert!(matches!(err, Error::InvalidCallback { .. }));
		assert_eq!(flow.state(), FlowState::Failed);
		assert!(flow.pending_request().is_none());
		assert!(matches!(
			flow.complete_external(CallbackParams::new("code", pending.state)).await,
			Err(Error::NoPendingAuthorization)
		));

		flow.reset().expect("Failed flows can be reset.");

		assert_eq!(flow.state(), FlowState::Idle);
	}

	#[tokio::test]
	async fn local_session_times_out_and_fails() {
		let flow = flow();
		let listener = LocalListener::for_redirect(
			&Url::parse("http://127.0.0.1:0/callback").expect("Redirect fixture should parse."),
		)
		.expect("Loopback redirect should be accepted.");
		let session = flow.start_local(listener).await.expect("Listener should bind.");

		assert_eq!(flow.state(), FlowState::AwaitingCallback);

		let again = LocalListener::for_redirect(&session.request().redirect_uri)
			.expect("Loopback redirect should be accepted.");

		assert!(matches!(flow.start_local(again).await, Err(Error::AlreadyInProgress)));

		let err = session
			.wait(CancellationToken::new(), StdDuration::from_millis(50))
			.await
			.expect_err("Waiting without a callback must time out.");

		assert!(matches!(err, Error::Abandoned { reason: "timed out" }));
		assert_eq!(flow.state(), FlowState::Failed);
	}
}
