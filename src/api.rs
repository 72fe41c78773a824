//! HTTP surface: authorization routes, the gate middleware, and the error mapping.
//!
//! Every route passes the [`RequestGate`]. Routes mounted by [`auth_routes`] only consult the
//! rate limiter; routers wrapped with [`protect`] additionally require a usable credential,
//! which is attached to the request extensions for handlers to extract.

// std
use std::time::Duration as StdDuration;
// crates.io
use axum::{
	Extension, Json, Router,
	extract::{Query, Request, State},
	http::{HeaderValue, Method, StatusCode, header},
	middleware::{Next, from_fn_with_state},
	response::{IntoResponse, Redirect, Response},
	routing::{get, post},
};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
use tower_http::cors::CorsLayer;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	error::{ConfigError, ExchangeError},
	flow::{AuthorizationFlow, CallbackParams},
	gate::{Access, RequestGate},
	rate_limit::{RetryDirective, SlidingWindowLimiter},
};

/// Per-route admission budgets applied by [`default_limiter`].
pub const DEFAULT_ROUTE_LIMITS: &[(&str, usize)] = &[
	("/auth/status", 5),
	("/auth/url", 2),
	("/auth/callback", 3),
	("/auth/revoke", 2),
	("/auth/refresh", 2),
	("/session", 30),
];

const CALLBACK_SUCCESS_BODY: &str = "Authorization successful! You can close this window.";

/// Builds a limiter over `window` preloaded with [`DEFAULT_ROUTE_LIMITS`].
pub fn default_limiter(window: StdDuration) -> Result<SlidingWindowLimiter, ConfigError> {
	let limiter = SlidingWindowLimiter::new(window)?;

	for (route, limit) in DEFAULT_ROUTE_LIMITS {
		limiter.configure(*route, *limit);
	}

	Ok(limiter)
}

/// Shared handles for the authorization routes.
#[derive(Clone, Debug)]
pub struct ApiState {
	/// Flow controller issuing URLs and redeeming callbacks.
	pub flow: Arc<AuthorizationFlow>,
	/// Gate every route passes.
	pub gate: Arc<RequestGate>,
	/// Page a browser is sent to after a successful `GET /auth/callback`.
	pub success_redirect: Option<Url>,
}
impl ApiState {
	/// Bundles the flow and gate without a success redirect.
	pub fn new(flow: Arc<AuthorizationFlow>, gate: Arc<RequestGate>) -> Self {
		Self { flow, gate, success_redirect: None }
	}

	/// Sends browsers to `url` after a successful callback.
	pub fn with_success_redirect(mut self, url: Url) -> Self {
		self.success_redirect = Some(url);

		self
	}
}

/// Authorization routes, rate limited per path.
pub fn auth_routes(state: ApiState) -> Router {
	Router::new()
		.route("/auth/url", get(auth_url))
		.route("/auth/callback", get(callback_from_browser).post(callback_from_frontend))
		.route("/auth/status", get(auth_status))
		.route("/auth/revoke", post(revoke))
		.route("/auth/refresh", post(refresh))
		.route_layer(from_fn_with_state(state.gate.clone(), admit_public))
		.with_state(state)
}

/// Requires delegated access for every route of `router`.
///
/// Handlers can extract the admitted [`Credential`] with `Extension<Credential>`.
pub fn protect<S>(router: Router<S>, gate: Arc<RequestGate>) -> Router<S>
where
	S: 'static + Clone + Send + Sync,
{
	router.route_layer(from_fn_with_state(gate, admit_delegated))
}

/// `GET /session`: summary of the credential a protected request was admitted with.
pub fn session_routes() -> Router {
	Router::new().route("/session", get(session))
}

/// CORS layer allowing the frontend at `origin` to call the API with credentials.
pub fn cors(origin: &str) -> Result<CorsLayer, ConfigError> {
	let allowed = HeaderValue::from_str(origin)
		.map_err(|_| ConfigError::CorsOrigin { origin: origin.to_owned() })?;

	Ok(CorsLayer::new()
		.allow_origin(allowed)
		.allow_methods([Method::GET, Method::POST, Method::OPTIONS])
		.allow_headers([header::CONTENT_TYPE])
		.allow_credentials(true))
}

/// [`Error`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub Error);
impl From<Error> for ApiError {
	fn from(e: Error) -> Self {
		Self(e)
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let message = self.0.to_string();

		match self.0 {
			Error::RateLimited { retry_after, .. } => {
				let secs = RetryDirective::new(retry_after).retry_after_secs();

				(
					StatusCode::TOO_MANY_REQUESTS,
					[(header::RETRY_AFTER, secs.to_string())],
					Json(json!({ "error": "Too many requests", "message": message })),
				)
					.into_response()
			},
			Error::Unauthorized { login_url, .. } => (
				StatusCode::UNAUTHORIZED,
				Json(json!({ "error": "Unauthorized", "loginUrl": login_url })),
			)
				.into_response(),
			Error::InvalidCallback { .. }
			| Error::NoPendingAuthorization
			| Error::CredentialNotFound
			| Error::CredentialInvalid
			| Error::Revoked
			| Error::Exchange(ExchangeError::MissingRefreshToken) =>
				(StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response(),
			Error::AlreadyInProgress =>
				(StatusCode::CONFLICT, Json(json!({ "error": message }))).into_response(),
			e => {
				tracing::error!(error = %e, "Request failed.");

				let body = json!({ "error": "Internal server error" });

				(StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
			},
		}
	}
}

type ApiResult<T> = Result<T, ApiError>;

async fn admit_public(
	State(gate): State<Arc<RequestGate>>,
	request: Request,
	next: Next,
) -> ApiResult<Response> {
	let route = request.uri().path().to_owned();

	gate.admit(&route, Access::Public).await?;

	Ok(next.run(request).await)
}

async fn admit_delegated(
	State(gate): State<Arc<RequestGate>>,
	mut request: Request,
	next: Next,
) -> ApiResult<Response> {
	let route = request.uri().path().to_owned();
	let admission = gate.admit(&route, Access::Delegated).await?;

	if let Some(credential) = admission.credential {
		request.extensions_mut().insert(credential);
	}

	Ok(next.run(request).await)
}

async fn auth_url(State(state): State<ApiState>) -> ApiResult<Json<serde_json::Value>> {
	let request = state.flow.await_external_callback()?;

	Ok(Json(json!({ "url": request.authorize_url.as_str() })))
}

async fn callback_from_browser(
	State(state): State<ApiState>,
	Query(params): Query<CallbackParams>,
) -> ApiResult<Response> {
	complete(&state.flow, params).await?;

	Ok(match state.success_redirect {
		Some(url) => Redirect::to(url.as_str()).into_response(),
		None => (StatusCode::OK, CALLBACK_SUCCESS_BODY).into_response(),
	})
}

async fn callback_from_frontend(
	State(state): State<ApiState>,
	Json(params): Json<CallbackParams>,
) -> ApiResult<Json<serde_json::Value>> {
	let credential = complete(&state.flow, params).await?;

	Ok(Json(json!({ "status": "authorized", "expiry": format_expiry(&credential) })))
}

// The HTTP surface always requires the state nonce, unlike direct library callers.
async fn complete(flow: &AuthorizationFlow, params: CallbackParams) -> Result<Credential> {
	if params.state.as_deref().is_none_or(str::is_empty) {
		return Err(Error::InvalidCallback { reason: "missing state".into() });
	}

	flow.complete_external(params).await
}

async fn auth_status(State(state): State<ApiState>) -> ApiResult<Json<crate::store::AuthStatus>> {
	Ok(Json(state.flow.tokens().status().await?))
}

async fn revoke(State(state): State<ApiState>) -> ApiResult<Json<serde_json::Value>> {
	let tokens = state.flow.tokens();
	let credential = tokens.load().await?;

	if tokens.is_revoked(&credential) {
		return Err(Error::Revoked.into());
	}

	let receipt = tokens.revoke(&credential).await;

	Ok(Json(json!({ "revoked": true, "cleared": receipt.cleared })))
}

async fn refresh(State(state): State<ApiState>) -> ApiResult<Json<serde_json::Value>> {
	let credential = state.flow.refresh().await?;

	Ok(Json(json!({ "status": "refreshed", "expiry": format_expiry(&credential) })))
}

async fn session(Extension(credential): Extension<Credential>) -> Json<serde_json::Value> {
	Json(json!({
		"authenticated": true,
		"tokenType": credential.token_type.as_str(),
		"expiry": format_expiry(&credential),
		"scope": credential.scope.normalized(),
		"needsRefresh": credential.needs_refresh(),
	}))
}

fn format_expiry(credential: &Credential) -> Option<String> {
	credential.effective_expiry().and_then(|expiry| expiry.format(&Rfc3339).ok())
}
