//! Civica agent
//!
//! Long-running local companion that owns the credential lifecycle:
//! 1. Serves the OAuth loopback callback for browser sign-in
//! 2. Keeps the token pair fresh via the periodic refresh task
//! 3. Exposes /health and /metrics for operators
//!
//! The browser is driven by the operator; the agent hands out the
//! authorization URL on `/login/{provider}` and finishes the flow when the
//! provider redirects to `/callback`.

mod config;
mod metrics;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use civica_api::{ApiClient, ApiError};
use civica_auth::{OAuthFlow, PkceStore, ProfileCache, RedirectCallback, TokenStore};
use civica_sync::{
    AlwaysReady, BackoffPolicy, Constraints, PeriodicRefresh, RecurringTask, RefreshOutcome,
    refresh_now,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    flow: Arc<OAuthFlow>,
    tokens: Arc<TokenStore>,
    profile: Arc<ProfileCache>,
    api: ApiClient,
    refresh_task: Arc<PeriodicRefresh>,
    http: reqwest::Client,
    base_url: String,
    backoff: BackoffPolicy,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// The concurrency limit keeps a misbehaving local client from starving the
/// callback route.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/login/{provider}", post(login_handler))
        .route("/callback", get(callback_handler))
        .route("/refresh", post(refresh_handler))
        .route("/logout", post(logout_handler))
        .route("/quiz/today", get(quiz_today_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting civica-agent");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.agent.listen_addr,
        base_url = %config.api.base_url,
        data_dir = %config.storage.data_dir.display(),
        "configuration loaded"
    );

    tokio::fs::create_dir_all(&config.storage.data_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create data dir {}",
                config.storage.data_dir.display()
            )
        })?;

    let data_dir = &config.storage.data_dir;
    let pkce_store = Arc::new(
        PkceStore::open(data_dir.join("pkce.json"))
            .await
            .context("opening pkce store")?,
    );
    let tokens = Arc::new(
        TokenStore::open(data_dir.join("tokens.enc"), data_dir.join("tokens.key"))
            .await
            .context("opening token store")?,
    );
    let profile = Arc::new(
        ProfileCache::open(data_dir.join("profile.json"))
            .await
            .context("opening profile cache")?,
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.api.timeout_secs))
        .build()
        .context("building http client")?;

    let flow = Arc::new(OAuthFlow::new(
        http.clone(),
        config.api.base_url.clone(),
        config.api.client_kind.clone(),
        pkce_store,
        tokens.clone(),
        profile.clone(),
    ));

    let api = ApiClient::new(http.clone(), config.api.base_url.clone(), tokens.clone());

    let backoff = BackoffPolicy {
        base_delay: config.refresh.backoff_base(),
        max_retries: config.refresh.max_retries,
    };
    let refresh_task = Arc::new(PeriodicRefresh::new(
        http.clone(),
        config.api.base_url.clone(),
        tokens.clone(),
        profile.clone(),
        backoff.clone(),
        Arc::new(AlwaysReady),
    ));

    if config.refresh.auto_start {
        refresh_task.schedule(
            config.refresh.interval(),
            config.refresh.flex(),
            Constraints::default(),
        );
    }

    let state = AppState {
        flow,
        tokens,
        profile,
        api,
        refresh_task: refresh_task.clone(),
        http,
        base_url: config.api.base_url.clone(),
        backoff,
        started_at: Instant::now(),
        prometheus,
    };

    let app = build_router(state, config.agent.max_connections);

    let listener = TcpListener::bind(config.agent.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.agent.listen_addr))?;

    info!(addr = %config.agent.listen_addr, "agent running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving agent")?;

    refresh_task.cancel();
    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: token presence, flow state, refresh schedule, uptime.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let user = state.profile.load().await;
    let body = serde_json::json!({
        "status": "ok",
        "flow": state.flow.state().await.label(),
        "has_access_token": state.tokens.access_token().await.is_some(),
        "has_refresh_token": state.tokens.refresh_token().await.is_some(),
        "user": user.map(|u| u.username),
        "refresh_scheduled": state.refresh_task.is_scheduled(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Start a sign-in attempt and hand back the authorization URL.
async fn login_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Response {
    match state.flow.begin(&provider).await {
        Ok(authorization) => {
            info!(provider, "authorization URL issued, open it in a browser");
            axum::Json(serde_json::json!({
                "message": "open the authorization URL in a browser to continue",
                "authorizationUrl": authorization.authorization_url,
                "state": authorization.state,
            }))
            .into_response()
        }
        Err(e) => auth_error_response(&e),
    }
}

/// OAuth redirect target. Finishes the attempt and answers with a page the
/// browser can show.
async fn callback_handler(
    State(state): State<AppState>,
    Query(callback): Query<RedirectCallback>,
) -> Response {
    match state.flow.complete(callback).await {
        Ok(jwt) => {
            metrics::record_callback("success");
            Html(format!(
                "<html><body><h1>Signed in</h1>\
                 <p>Welcome, {}. You can close this window.</p></body></html>",
                jwt.user_info.username
            ))
            .into_response()
        }
        Err(e) => {
            metrics::record_callback("failure");
            warn!(error = %e, "sign-in callback failed");
            auth_error_response(&e)
        }
    }
}

/// Manual one-shot refresh with the configured backoff policy.
async fn refresh_handler(State(state): State<AppState>) -> impl IntoResponse {
    let outcome = refresh_now(
        &state.http,
        &state.base_url,
        &state.tokens,
        &state.profile,
        &state.backoff,
    )
    .await;

    let (status, outcome_label, detail) = match &outcome {
        RefreshOutcome::Success => (StatusCode::OK, "success", String::new()),
        RefreshOutcome::PermanentFailure(reason) => {
            (StatusCode::CONFLICT, "permanent_failure", reason.clone())
        }
        RefreshOutcome::RetriesExhausted(reason) => {
            (StatusCode::BAD_GATEWAY, "retries_exhausted", reason.clone())
        }
    };
    (
        status,
        axum::Json(serde_json::json!({ "outcome": outcome_label, "detail": detail })),
    )
}

/// Forget the stored credentials and profile.
async fn logout_handler(State(state): State<AppState>) -> Response {
    if let Err(e) = state.tokens.clear().await {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", &e.to_string());
    }
    if let Err(e) = state.profile.clear().await {
        warn!(error = %e, "profile cache clear failed on logout");
    }
    info!("logged out");
    axum::Json(serde_json::json!({ "message": "logged out" })).into_response()
}

/// Smoke route: fetch today's quiz through the authenticated client, proving
/// the stored tokens work end to end.
async fn quiz_today_handler(State(state): State<AppState>) -> Response {
    match state.api.today_quiz().await {
        Ok(envelope) => axum::Json(serde_json::json!({
            "message": envelope.message,
            "data": envelope.data,
        }))
        .into_response(),
        Err(e) => error_response(api_error_status(&e), e.label(), &e.to_string()),
    }
}

/// JSON error body shared by all handlers:
/// `{"error":{"type":"...","message":"..."}}`
fn error_response(status: StatusCode, error_type: &str, message: &str) -> Response {
    let body = serde_json::json!({
        "error": { "type": error_type, "message": message }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn auth_error_response(e: &civica_auth::Error) -> Response {
    use civica_auth::Error;
    let (status, error_type) = match e {
        Error::StateMismatch => (StatusCode::BAD_REQUEST, "state_mismatch"),
        Error::PkceMissing | Error::FlowState(_) => (StatusCode::BAD_REQUEST, "no_attempt"),
        Error::Provider(_) => (StatusCode::BAD_GATEWAY, "provider_error"),
        Error::InvalidCredentials(_) => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
        Error::Http(_) | Error::Api { .. } | Error::Exchange(_) | Error::UnexpectedResponse(_) => {
            (StatusCode::BAD_GATEWAY, "backend_error")
        }
        Error::Storage(_) | Error::Crypto(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage"),
    };
    error_response(status, error_type, &e.to_string())
}

fn api_error_status(e: &ApiError) -> StatusCode {
    match e {
        ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ApiError::Connectivity(_) | ApiError::Server { .. } | ApiError::Io(_) => {
            StatusCode::BAD_GATEWAY
        }
        ApiError::Validation(_) => StatusCode::BAD_REQUEST,
        ApiError::Authentication(_) => StatusCode::UNAUTHORIZED,
        ApiError::Authorization(_) => StatusCode::FORBIDDEN,
        ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        ApiError::Conflict(_) => StatusCode::CONFLICT,
        ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        ApiError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
