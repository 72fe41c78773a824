//! Transient HTTP listener that receives the provider redirect on the loopback interface.

// std
use std::{
	net::{IpAddr, Ipv4Addr, SocketAddr},
	time::Duration as StdDuration,
};
// crates.io
use axum::{
	Router,
	extract::{Query, State},
	http::StatusCode,
	routing::get,
};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tokio_util::sync::CancellationToken;
// self
use crate::{_prelude::*, error::ConfigError, flow::CallbackParams};

/// Grace period granted to in-flight connections when the listener shuts down.
pub const DEFAULT_SHUTDOWN_GRACE: StdDuration = StdDuration::from_secs(1);

const SUCCESS_BODY: &str = "Authorization successful! You can close this window.";

/// Where and how the local callback listener is served.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalListener {
	addr: SocketAddr,
	path: String,
	grace: StdDuration,
}
impl LocalListener {
	/// Derives the bind address and callback path from the registered redirect target.
	///
	/// `localhost` binds `127.0.0.1`; any other host must be a loopback IP.
	pub fn for_redirect(redirect: &Url) -> Result<Self, ConfigError> {
		let invalid = || ConfigError::ListenerAddress { url: redirect.to_string() };
		let ip = match redirect.host_str() {
			Some("localhost") => IpAddr::V4(Ipv4Addr::LOCALHOST),
			Some(host) => host
				.trim_start_matches('[')
				.trim_end_matches(']')
				.parse::<IpAddr>()
				.ok()
				.filter(IpAddr::is_loopback)
				.ok_or_else(invalid)?,
			None => return Err(invalid()),
		};
		let port = redirect.port_or_known_default().ok_or_else(invalid)?;

		Ok(Self {
			addr: SocketAddr::new(ip, port),
			path: redirect.path().to_owned(),
			grace: DEFAULT_SHUTDOWN_GRACE,
		})
	}

	/// Overrides the bind address, keeping the callback path.
	pub fn with_addr(mut self, addr: SocketAddr) -> Self {
		self.addr = addr;

		self
	}

	/// Overrides the shutdown grace period.
	pub fn with_grace(mut self, grace: StdDuration) -> Self {
		self.grace = grace;

		self
	}

	/// Address the listener binds.
	pub fn addr(&self) -> SocketAddr {
		self.addr
	}

	/// Path the callback is served on.
	pub fn path(&self) -> &str {
		&self.path
	}

	pub(crate) async fn bind(self, expected_state: String) -> Result<BoundListener, ConfigError> {
		let listener = TcpListener::bind(self.addr)
			.await
			.map_err(|source| ConfigError::ListenerBind { addr: self.addr, source })?;
		let local_addr = listener
			.local_addr()
			.map_err(|source| ConfigError::ListenerBind { addr: self.addr, source })?;
		let (tx, rx) = oneshot::channel();
		let state = Arc::new(CallbackState { expected_state, tx: Mutex::new(Some(tx)) });
		let router = Router::new().route(&self.path, get(handle_callback)).with_state(state);
		let shutdown = CancellationToken::new();
		let signal = shutdown.clone();
		let handle = tokio::spawn(async move {
			axum::serve(listener, router).with_graceful_shutdown(signal.cancelled_owned()).await
		});

		tracing::info!(%local_addr, path = %self.path, "Callback listener started.");

		Ok(BoundListener {
			local_addr,
			callbacks: rx,
			server: ServerGuard { shutdown, handle: Some(handle), grace: self.grace },
		})
	}
}

/// Listener bound for one authorization attempt.
pub(crate) struct BoundListener {
	pub(crate) local_addr: SocketAddr,
	pub(crate) callbacks: oneshot::Receiver<CallbackParams>,
	pub(crate) server: ServerGuard,
}

/// Owns the serving task; dropping it aborts the task and releases the port.
pub(crate) struct ServerGuard {
	shutdown: CancellationToken,
	handle: Option<JoinHandle<std::io::Result<()>>>,
	grace: StdDuration,
}
impl ServerGuard {
	/// Signals graceful shutdown and waits up to the grace period before aborting.
	pub(crate) async fn shutdown(mut self) {
		self.shutdown.cancel();

		let Some(mut handle) = self.handle.take() else { return };

		match tokio::time::timeout(self.grace, &mut handle).await {
			Ok(Ok(Ok(()))) => tracing::debug!("Callback listener stopped."),
			Ok(Ok(Err(e))) => tracing::warn!(error = %e, "Callback listener stopped with error."),
			Ok(Err(e)) => tracing::warn!(error = %e, "Callback listener task failed."),
			Err(_) => {
				tracing::debug!("Callback listener grace period elapsed; aborting.");

				handle.abort();

				let _ = handle.await;
			},
		}
	}
}
impl Drop for ServerGuard {
	fn drop(&mut self) {
		self.shutdown.cancel();

		if let Some(handle) = self.handle.take() {
			handle.abort();
		}
	}
}

struct CallbackState {
	expected_state: String,
	tx: Mutex<Option<oneshot::Sender<CallbackParams>>>,
}

async fn handle_callback(
	State(state): State<Arc<CallbackState>>,
	Query(params): Query<CallbackParams>,
) -> (StatusCode, String) {
	if params.state.as_deref() != Some(state.expected_state.as_str()) {
		tracing::warn!("Ignoring callback with a missing or mismatched state.");

		return (StatusCode::BAD_REQUEST, "Invalid state parameter.".into());
	}

	let Some(tx) = state.tx.lock().take() else {
		return (StatusCode::CONFLICT, "Authorization was already received.".into());
	};
	let response = match params.clone().into_code() {
		Ok(_) => (StatusCode::OK, SUCCESS_BODY.into()),
		Err(reason) => (StatusCode::BAD_REQUEST, format!("Authorization failed: {reason}.")),
	};

	if tx.send(params).is_err() {
		tracing::warn!("Callback arrived after the flow stopped waiting.");
	}

	response
}
