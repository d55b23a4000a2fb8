//! OAuth sign-in orchestrator
//!
//! Drives one sign-in attempt through its states:
//!
//! ```text
//! Idle → AwaitingAuthorizationUrl → AwaitingUserRedirect → ExchangingCode
//!      → Authenticated | Failed
//! ```
//!
//! `Failed` is terminal per attempt; a retry is a brand-new `begin()` with
//! freshly generated PKCE material, never a resumption. Only one attempt is
//! in flight at a time: the flow lock is held across each operation, and a
//! new `begin()` overwrites whatever the previous attempt left behind.
//!
//! The browser is an external collaborator: `begin()` hands back the
//! authorization URL, and the redirect comes back in through whatever
//! surface hosts the app (the agent's loopback `/callback` route).

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::pkce::{self, PkceStore};
use crate::profile::ProfileCache;
use crate::token::{self, JwtData, OAuthAuthorizationData};
use crate::token_store::TokenStore;

/// Where a sign-in attempt currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    AwaitingAuthorizationUrl { provider: String },
    AwaitingUserRedirect { provider: String },
    ExchangingCode { provider: String },
    Authenticated,
    Failed { reason: String },
}

impl FlowState {
    /// Status label for health reporting and logs.
    pub fn label(&self) -> &'static str {
        match self {
            FlowState::Idle => "idle",
            FlowState::AwaitingAuthorizationUrl { .. } => "awaiting_authorization_url",
            FlowState::AwaitingUserRedirect { .. } => "awaiting_user_redirect",
            FlowState::ExchangingCode { .. } => "exchanging_code",
            FlowState::Authenticated => "authenticated",
            FlowState::Failed { .. } => "failed",
        }
    }
}

/// Query parameters delivered by the provider redirect.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedirectCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// OAuth sign-in orchestrator. One instance per process, shared via `Arc`.
pub struct OAuthFlow {
    http: reqwest::Client,
    base_url: String,
    client_kind: String,
    pkce_store: Arc<PkceStore>,
    tokens: Arc<TokenStore>,
    profile: Arc<ProfileCache>,
    state: Mutex<FlowState>,
}

impl OAuthFlow {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        client_kind: String,
        pkce_store: Arc<PkceStore>,
        tokens: Arc<TokenStore>,
        profile: Arc<ProfileCache>,
    ) -> Self {
        Self {
            http,
            base_url,
            client_kind,
            pkce_store,
            tokens,
            profile,
            state: Mutex::new(FlowState::Idle),
        }
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> FlowState {
        self.state.lock().await.clone()
    }

    /// Start a sign-in attempt: generate and persist PKCE material, then ask
    /// the backend for an authorization URL.
    ///
    /// Any previous in-flight attempt is discarded (overwrite, not merge).
    /// On success the flow waits for the redirect; the returned value carries
    /// the URL to hand to the browser.
    pub async fn begin(&self, provider: &str) -> Result<OAuthAuthorizationData> {
        let mut state = self.state.lock().await;
        *state = FlowState::AwaitingAuthorizationUrl {
            provider: provider.to_owned(),
        };

        let pkce_data = pkce::generate();
        if let Err(e) = self.pkce_store.store(pkce_data.clone()).await {
            *state = FlowState::Failed {
                reason: e.to_string(),
            };
            return Err(e);
        }

        match token::fetch_authorize_url(
            &self.http,
            &self.base_url,
            provider,
            &pkce_data.code_verifier,
            &pkce_data.state,
        )
        .await
        {
            Ok(mut authorization) => {
                if authorization.code_challenge != pkce_data.code_challenge {
                    // Server recomputes the challenge; a disagreement points
                    // at an encoding bug, not an attack. The exchange still
                    // stands or falls on the verifier.
                    warn!(provider, "server challenge differs from local challenge");
                }
                authorization.code_verifier = pkce_data.code_verifier;
                *state = FlowState::AwaitingUserRedirect {
                    provider: provider.to_owned(),
                };
                info!(provider, "sign-in attempt started, awaiting redirect");
                Ok(authorization)
            }
            Err(e) => {
                let _ = self.pkce_store.clear().await;
                *state = FlowState::Failed {
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }

    /// Feed the provider redirect into the flow and finish the attempt.
    ///
    /// Rejects the redirect when no attempt is awaiting one, when the
    /// provider reported an error, when no PKCE material is stored, or when
    /// the echoed `state` differs from the stored one (anti-CSRF); in the
    /// mismatch case the exchange call is never issued. The PKCE slot is
    /// single-use: it is cleared whether the exchange succeeds or fails.
    pub async fn complete(&self, callback: RedirectCallback) -> Result<JwtData> {
        let mut state = self.state.lock().await;

        let provider = match &*state {
            FlowState::AwaitingUserRedirect { provider } => provider.clone(),
            other => {
                return Err(Error::FlowState(format!(
                    "redirect received while {}",
                    other.label()
                )));
            }
        };

        if let Some(provider_error) = callback.error {
            let _ = self.pkce_store.clear().await;
            *state = FlowState::Failed {
                reason: provider_error.clone(),
            };
            warn!(provider, error = %provider_error, "provider reported sign-in error");
            return Err(Error::Provider(provider_error));
        }

        let Some(stored) = self.pkce_store.load().await else {
            *state = FlowState::Failed {
                reason: "no pkce material for redirect".into(),
            };
            return Err(Error::PkceMissing);
        };

        let (code, callback_state) = match (callback.code, callback.state) {
            (Some(code), Some(callback_state)) => (code, callback_state),
            _ => {
                let _ = self.pkce_store.clear().await;
                *state = FlowState::Failed {
                    reason: "redirect missing code or state".into(),
                };
                return Err(Error::Provider("redirect missing code or state".into()));
            }
        };

        if callback_state != stored.state {
            let _ = self.pkce_store.clear().await;
            *state = FlowState::Failed {
                reason: "state mismatch".into(),
            };
            warn!(provider, "redirect state mismatch, rejecting exchange");
            return Err(Error::StateMismatch);
        }

        *state = FlowState::ExchangingCode {
            provider: provider.clone(),
        };

        let exchange = token::exchange_code(
            &self.http,
            &self.base_url,
            &provider,
            &code,
            &callback_state,
            &stored.code_verifier,
            &self.client_kind,
        )
        .await;

        // Single-use: the attempt is spent either way.
        let _ = self.pkce_store.clear().await;

        match exchange {
            Ok(jwt) => {
                if let Err(e) = self
                    .tokens
                    .save(&jwt.access_token, &jwt.refresh_token)
                    .await
                {
                    *state = FlowState::Failed {
                        reason: e.to_string(),
                    };
                    return Err(e);
                }
                if let Err(e) = self.profile.save(&jwt.user_info).await {
                    // Tokens are in; a stale profile row is not worth failing
                    // the sign-in over.
                    warn!(error = %e, "profile cache write failed after exchange");
                }
                *state = FlowState::Authenticated;
                info!(provider, user_id = %jwt.user_info.id, "sign-in complete");
                Ok(jwt)
            }
            Err(e) => {
                *state = FlowState::Failed {
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }
}
