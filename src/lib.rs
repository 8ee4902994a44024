//! authgate is an OAuth2 login gateway issuing short-lived RS256 session
//! tokens to CLI and web clients.
#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod error;
pub mod key;
pub mod login;
pub mod provider;
mod router;
pub mod session;
pub mod telemetry;
pub mod token;
mod well_known;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

pub use error::ServerError;

use config::Configuration;
use key::{KeyPair, KeyProvider};
use login::LoginOrchestrator;
use provider::HttpIdentityProvider;
use token::SessionTokenCodec;

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    authorization: Option<&str>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(authorization) = authorization {
        request = request.header(header::AUTHORIZATION, authorization);
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Configuration>,
    pub orchestrator: Arc<LoginOrchestrator>,
    pub keys: Arc<KeyPair>,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout, longer than any identity provider call.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(15)))
        // Remove session tokens from traces.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE, header::SET_COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    let mut router = Router::new()
        // `GET /` and `GET /status.json` go to `status`.
        .route("/", get(router::status::index))
        .route("/status.json", get(router::status::status))
        // `POST /auth` returns where to start a login.
        .route("/auth", post(router::auth::handler))
        // `GET /login` redirects to the identity provider.
        .route("/login", get(router::login::handler))
        // `GET /callback` is the provider redirect target.
        .route("/callback", get(router::callback::handler))
        // `GET /verify-user` checks a session token.
        .route("/verify-user", get(router::verify::handler))
        .route("/authorize", get(router::verify::handler))
        .route("/logout", get(router::logout::handler))
        .with_state(state.clone());

    if let Some(handle) = state.metrics.clone() {
        router = router.route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
    }

    router
        .nest("/.well-known", well_known::well_known(state))
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Build the application state from a configuration and a loaded keypair.
pub fn build_state(
    config: Arc<Configuration>,
    keys: Arc<KeyPair>,
    metrics: Option<PrometheusHandle>,
) -> Result<AppState, ServerError> {
    let provider = HttpIdentityProvider::new(
        config.provider.token_url(),
        config.provider.userinfo_url(),
        config.provider.timeout(),
    )?;
    let codec = SessionTokenCodec::new(Arc::clone(&keys), config.token.ttl())
        .with_key_id(config.token.key_id());
    let orchestrator = LoginOrchestrator::new(&config, Arc::new(provider), codec)?;

    Ok(AppState {
        config,
        orchestrator: Arc::new(orchestrator),
        keys,
        metrics,
    })
}

/// Initialize the application state.
///
/// Fails when the configuration or the keypair cannot be loaded: the
/// gateway never serves requests without a usable signing key.
pub fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>> {
    // read configuration file. let it in memory.
    let path = std::env::var("CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_default();
    let config = Configuration::default().path(path).read()?;

    let keys = KeyProvider::new(
        &config.token.private_key_path,
        &config.token.public_key_path,
    )
    .keys()
    .map_err(ServerError::KeyLoadFailed)?;

    let metrics = if config.telemetry.metrics {
        Some(telemetry::setup_metrics_recorder()?)
    } else {
        None
    };

    Ok(build_state(config, keys, metrics)?)
}
