//! Command-line entry point: serve the gated API, or authorize through a local listener.

// std
use std::{
	net::SocketAddr,
	path::{Path, PathBuf},
	sync::Arc,
	time::Duration,
};
// crates.io
use axum::Router;
use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use url::Url;
// self
use playlist_gate::{
	api::{self, ApiState},
	auth::ScopeSet,
	config::ClientIdentity,
	flow::{AuthorizationFlow, LocalListener},
	gate::RequestGate,
	provider::ProviderDescriptor,
	store::{FileStore, TokenStore},
};

#[derive(Debug, Parser)]
#[command(version, about = "OAuth access and rate control for the playlist API.")]
struct Cli {
	/// Provider-issued client credentials file.
	#[arg(
		long,
		global = true,
		env = "PLAYLIST_GATE_CLIENT_IDENTITY",
		default_value = "config/credentials.json"
	)]
	client_identity: PathBuf,
	/// Where the credential is persisted.
	#[arg(
		long,
		global = true,
		env = "PLAYLIST_GATE_TOKEN_FILE",
		default_value = "config/token.json"
	)]
	token_file: PathBuf,
	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Serve the authorization routes and the gated API.
	Serve(ServeArgs),
	/// Authorize in the browser through a temporary local callback listener.
	Login {
		/// Give up waiting for the browser after this many seconds.
		#[arg(long, default_value_t = 300)]
		timeout_secs: u64,
	},
	/// Print whether a usable credential is stored.
	Status,
	/// Revoke the stored credential.
	Revoke,
}

#[derive(Debug, Args)]
struct ServeArgs {
	/// Address the API binds.
	#[arg(long, env = "PLAYLIST_GATE_BIND", default_value = "127.0.0.1:8080")]
	bind: SocketAddr,
	/// Frontend origin allowed by CORS.
	#[arg(long, env = "PLAYLIST_GATE_CORS_ORIGIN", default_value = "http://localhost:5173")]
	cors_origin: String,
	/// Rate limit window in seconds.
	#[arg(long, default_value_t = 60)]
	window_secs: u64,
	/// Per-route limit override, e.g. `/auth/url=5`.
	#[arg(long = "limit", value_name = "ROUTE=N", value_parser = parse_limit)]
	limits: Vec<(String, usize)>,
	/// Entry point reported to unauthorized callers.
	#[arg(long, default_value = "/api/auth/url")]
	login_url: String,
	/// Page browsers land on after a successful callback.
	#[arg(long)]
	success_redirect: Option<Url>,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
		.init();

	let cli = Cli::parse();
	let tokens = Arc::new(TokenStore::new(Arc::new(FileStore::open(&cli.token_file))));

	match cli.command {
		Command::Serve(args) => serve(load_flow(&cli.client_identity, tokens)?, args).await,
		Command::Login { timeout_secs } => {
			let flow = load_flow(&cli.client_identity, tokens)?;

			login(&flow, Duration::from_secs(timeout_secs), &cli.token_file).await
		},
		Command::Status => {
			let status = tokens.status().await?;

			println!("{}", serde_json::to_string_pretty(&status)?);

			Ok(())
		},
		Command::Revoke => {
			let credential = tokens.load().await?;
			let receipt = tokens.revoke(&credential).await;

			println!(
				"Revoked credential {} (slot cleared: {}).",
				receipt.fingerprint, receipt.cleared
			);

			Ok(())
		},
	}
}

fn load_flow(client_identity: &Path, tokens: Arc<TokenStore>) -> Result<Arc<AuthorizationFlow>> {
	let identity = ClientIdentity::from_file(client_identity)?;
	let scope = ScopeSet::new([ProviderDescriptor::YOUTUBE_READONLY_SCOPE])?;
	let descriptor = identity.descriptor(scope)?;

	Ok(Arc::new(AuthorizationFlow::new(descriptor, identity, tokens)?))
}

async fn serve(flow: Arc<AuthorizationFlow>, args: ServeArgs) -> Result<()> {
	let limiter = api::default_limiter(Duration::from_secs(args.window_secs))?;

	for (route, limit) in args.limits {
		limiter.configure(route, limit);
	}

	let gate =
		Arc::new(RequestGate::new(Arc::new(limiter), flow.tokens().clone(), args.login_url));
	let mut state = ApiState::new(flow, gate.clone());

	if let Some(url) = args.success_redirect {
		state = state.with_success_redirect(url);
	}

	let routes = api::auth_routes(state).merge(api::protect(api::session_routes(), gate));
	let router = Router::new().nest("/api", routes).layer(api::cors(&args.cors_origin)?);
	let listener = TcpListener::bind(args.bind).await?;

	tracing::info!(addr = %listener.local_addr()?, "Serving playlist API.");

	axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

	tracing::info!("Server stopped.");

	Ok(())
}

async fn login(flow: &AuthorizationFlow, timeout: Duration, token_file: &Path) -> Result<()> {
	let listener = LocalListener::for_redirect(&flow.identity().redirect_uri)?;
	let session = flow.start_local(listener).await?;

	println!("Open this URL in your browser to authorize access:\n\n{}\n", session.authorize_url());

	let cancel = CancellationToken::new();
	let on_interrupt = cancel.clone();

	tokio::spawn(async move {
		shutdown_signal().await;
		on_interrupt.cancel();
	});

	session.wait(cancel, timeout).await?;

	println!("Authorization complete; credential saved to {}.", token_file.display());

	Ok(())
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %e, "Failed to listen for the interrupt signal.");

		std::future::pending::<()>().await;
	}
}

fn parse_limit(raw: &str) -> Result<(String, usize), String> {
	let (route, limit) =
		raw.split_once('=').ok_or_else(|| format!("expected ROUTE=N, got `{raw}`"))?;
	let limit = limit.trim().parse().map_err(|e| format!("invalid limit `{limit}`: {e}"))?;

	Ok((route.trim().to_owned(), limit))
}
