//! Token refresh job with retry/backoff
//!
//! One run makes at most `1 + max_retries` refresh calls. A missing refresh
//! token fails the run immediately: there is nothing to refresh and retrying
//! cannot change that. A 401/403 from the refresh endpoint means the token
//! was revoked; that is equally permanent. Everything else backs off
//! exponentially from `base_delay` and gives up after the ceiling, leaving
//! the next scheduled period to try again.

use std::time::Duration;

use civica_auth::{ProfileCache, TokenStore, token};
use tracing::{debug, info, warn};

/// Retry policy for one refresh run.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry; doubles on each subsequent retry.
    pub base_delay: Duration,
    /// Retry ceiling. `3` means up to four calls per run.
    pub max_retries: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(60),
            max_retries: 3,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (1-based): base × 2^(retry−1).
    fn delay_before(&self, retry: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(retry - 1)
    }
}

/// Terminal outcome of one refresh run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New pair stored.
    Success,
    /// Not retryable: no refresh token, or the endpoint rejected it.
    PermanentFailure(String),
    /// Transient failures exhausted the retry ceiling; the next period
    /// starts over.
    RetriesExhausted(String),
}

/// Run one refresh cycle against the stored refresh token.
pub async fn run_refresh(
    http: &reqwest::Client,
    base_url: &str,
    tokens: &TokenStore,
    profile: &ProfileCache,
    policy: &BackoffPolicy,
) -> RefreshOutcome {
    let Some(refresh_token) = tokens.refresh_token().await else {
        debug!("no refresh token stored, nothing to refresh");
        metrics::counter!("token_refresh_total", "outcome" => "no_token").increment(1);
        return RefreshOutcome::PermanentFailure("no refresh token stored".into());
    };

    let mut last_error = String::new();
    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = policy.delay_before(attempt);
            warn!(
                attempt,
                delay_secs = delay.as_secs(),
                "token refresh retrying after transient failure"
            );
            tokio::time::sleep(delay).await;
        }

        match token::refresh(http, base_url, &refresh_token).await {
            Ok(jwt) => {
                if let Err(e) = tokens.save(&jwt.access_token, &jwt.refresh_token).await {
                    warn!(error = %e, "failed to persist refreshed token pair");
                    metrics::counter!("token_refresh_total", "outcome" => "store_error")
                        .increment(1);
                    return RefreshOutcome::RetriesExhausted(e.to_string());
                }
                if let Err(e) = profile.save(&jwt.user_info).await {
                    warn!(error = %e, "failed to update profile cache after refresh");
                }
                info!("token refresh succeeded");
                metrics::counter!("token_refresh_total", "outcome" => "success").increment(1);
                return RefreshOutcome::Success;
            }
            Err(e) if e.is_transient() => {
                last_error = e.to_string();
                debug!(attempt, error = %last_error, "transient refresh failure");
            }
            Err(e) => {
                warn!(error = %e, "refresh token rejected, giving up");
                metrics::counter!("token_refresh_total", "outcome" => "rejected").increment(1);
                return RefreshOutcome::PermanentFailure(e.to_string());
            }
        }
    }

    warn!(
        retries = policy.max_retries,
        error = %last_error,
        "token refresh gave up until next period"
    );
    metrics::counter!("token_refresh_total", "outcome" => "exhausted").increment(1);
    RefreshOutcome::RetriesExhausted(last_error)
}

/// Immediate one-shot refresh ("refresh now"), same policy, no periodicity.
pub async fn refresh_now(
    http: &reqwest::Client,
    base_url: &str,
    tokens: &TokenStore,
    profile: &ProfileCache,
    policy: &BackoffPolicy,
) -> RefreshOutcome {
    info!("manual refresh requested");
    run_refresh(http, base_url, tokens, profile, policy).await
}
