//! Authenticated request plumbing
//!
//! `ApiClient` sits between callers and `reqwest`: it attaches stored tokens
//! on the way out and captures rotated tokens on the way back, so neither
//! concern leaks into per-endpoint code.
//!
//! Rotation capture persists a pair only when the response carries both an
//! effective access token and a refresh token; a lone header leaves the
//! store untouched. That is deliberately narrower than
//! `TokenStore::update`: header inspection must never half-overwrite the
//! stored pair.

use std::sync::Arc;

use civica_auth::TokenStore;
use common::Envelope;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{ApiError, classify_status};
use crate::headers;

/// Authenticated HTTP client for the Civica backend.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenStore>,
}

impl ApiClient {
    pub fn new(http: reqwest::Client, base_url: String, tokens: Arc<TokenStore>) -> Self {
        Self {
            http,
            base_url,
            tokens,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET with query parameters.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Envelope<T>, ApiError> {
        self.request(reqwest::Method::GET, path, query, None).await
    }

    /// POST with query parameters and an optional JSON body.
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<Envelope<T>, ApiError> {
        self.request(reqwest::Method::POST, path, query, body).await
    }

    /// Issue one authenticated request and decode the response envelope.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<Envelope<T>, ApiError> {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        debug!(request_id, %method, path, "api request");
        let started = std::time::Instant::now();

        let mut builder = self
            .http
            .request(method, format!("{}{path}", self.base_url))
            .query(query);

        if let Some(access) = self.tokens.access_token().await {
            builder = builder.header(AUTHORIZATION, format!("Bearer {access}"));
        }
        if let Some(refresh) = self.tokens.refresh_token().await {
            builder = builder.header(headers::X_REFRESH, refresh);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let err = ApiError::from(e);
                metrics::counter!("api_requests_total", "outcome" => err.label()).increment(1);
                warn!(request_id, error = %err, "api request failed in transport");
                return Err(err);
            }
        };
        metrics::histogram!("api_request_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        self.capture_rotation(response.headers()).await;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Envelope<serde_json::Value>>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            let err = classify_status(status.as_u16(), &message);
            metrics::counter!("api_requests_total", "outcome" => err.label()).increment(1);
            debug!(request_id, status = status.as_u16(), error = %err, "api request rejected");
            return Err(err);
        }

        metrics::counter!("api_requests_total", "outcome" => "success").increment(1);
        response
            .json::<Envelope<T>>()
            .await
            .map_err(|e| ApiError::Io(format!("decoding response: {e}")))
    }

    /// Persist a rotated token pair delivered in response headers.
    ///
    /// `x-access-token` wins over `access_token` when both are present. A
    /// persist failure is logged, not surfaced, since the response itself already
    /// succeeded and the old pair keeps working until the next rotation.
    async fn capture_rotation(&self, response_headers: &HeaderMap) {
        let header_str = |name: &str| {
            response_headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };

        let access = header_str(headers::X_ACCESS_TOKEN).or_else(|| header_str(headers::ACCESS_TOKEN));
        let refresh = header_str(headers::REFRESH_TOKEN);

        if let (Some(access), Some(refresh)) = (access, refresh) {
            match self.tokens.save(&access, &refresh).await {
                Ok(()) => {
                    metrics::counter!("token_rotations_total").increment(1);
                    debug!("rotated token pair captured from response headers");
                }
                Err(e) => warn!(error = %e, "failed to persist rotated token pair"),
            }
        }
    }
}
