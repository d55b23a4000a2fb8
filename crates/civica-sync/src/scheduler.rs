//! Recurring refresh scheduling
//!
//! The host scheduler is an external collaborator behind the `RecurringTask`
//! trait; `PeriodicRefresh` is the tokio implementation the agent uses. Each
//! period sleeps `interval` minus a random slice of the flex window (the
//! latitude a batching host scheduler would take), checks host conditions
//! through the injected `HostProbe`, and runs one refresh cycle.
//!
//! Enqueueing is idempotent: scheduling while a task is live keeps the
//! existing schedule. Cancelling aborts future runs; a cycle already past
//! its probe check may still finish.

use std::sync::Arc;
use std::time::Duration;

use civica_auth::{ProfileCache, TokenStore};
use rand::RngExt;
use tracing::{debug, info};

use crate::refresh::{self, BackoffPolicy};

/// Default period between refresh runs.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

/// Default flex window the scheduler may pull a run forward by.
pub const DEFAULT_FLEX: Duration = Duration::from_secs(2 * 60 * 60);

/// Host conditions required before a scheduled run executes.
#[derive(Debug, Clone, Copy)]
pub struct Constraints {
    pub require_network: bool,
    pub forbid_low_battery: bool,
    pub forbid_low_storage: bool,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            require_network: true,
            forbid_low_battery: true,
            forbid_low_storage: true,
        }
    }
}

/// Host condition probe. The concrete host integration is injected; the
/// default says yes to everything, which is right for an always-on agent.
pub trait HostProbe: Send + Sync {
    fn network_available(&self) -> bool;
    fn battery_ok(&self) -> bool;
    fn storage_ok(&self) -> bool;
}

/// Probe for hosts without battery/storage pressure signals.
pub struct AlwaysReady;

impl HostProbe for AlwaysReady {
    fn network_available(&self) -> bool {
        true
    }
    fn battery_ok(&self) -> bool {
        true
    }
    fn storage_ok(&self) -> bool {
        true
    }
}

fn constraints_met(constraints: &Constraints, probe: &dyn HostProbe) -> bool {
    (!constraints.require_network || probe.network_available())
        && (!constraints.forbid_low_battery || probe.battery_ok())
        && (!constraints.forbid_low_storage || probe.storage_ok())
}

/// A background task that can be scheduled at most once at a time.
pub trait RecurringTask: Send + Sync {
    /// Start the periodic schedule. Returns `false` when a schedule is
    /// already active (keep-existing-if-present).
    fn schedule(&self, interval: Duration, flex: Duration, constraints: Constraints) -> bool;

    /// Abort future runs.
    fn cancel(&self);

    /// Whether a schedule is currently active.
    fn is_scheduled(&self) -> bool;
}

/// Tokio-backed periodic token refresh.
pub struct PeriodicRefresh {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenStore>,
    profile: Arc<ProfileCache>,
    policy: BackoffPolicy,
    probe: Arc<dyn HostProbe>,
    handle: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl PeriodicRefresh {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        tokens: Arc<TokenStore>,
        profile: Arc<ProfileCache>,
        policy: BackoffPolicy,
        probe: Arc<dyn HostProbe>,
    ) -> Self {
        Self {
            http,
            base_url,
            tokens,
            profile,
            policy,
            probe,
            handle: std::sync::Mutex::new(None),
        }
    }
}

impl RecurringTask for PeriodicRefresh {
    fn schedule(&self, interval: Duration, flex: Duration, constraints: Constraints) -> bool {
        let mut handle = self.handle.lock().expect("scheduler lock poisoned");
        if let Some(existing) = handle.as_ref()
            && !existing.is_finished()
        {
            debug!("periodic refresh already scheduled, keeping existing");
            return false;
        }

        let http = self.http.clone();
        let base_url = self.base_url.clone();
        let tokens = self.tokens.clone();
        let profile = self.profile.clone();
        let policy = self.policy.clone();
        let probe = self.probe.clone();

        *handle = Some(tokio::spawn(async move {
            loop {
                let flex_ms = flex.min(interval).as_millis() as u64;
                let jitter = if flex_ms == 0 {
                    Duration::ZERO
                } else {
                    Duration::from_millis(rand::rng().random_range(0..=flex_ms))
                };
                tokio::time::sleep(interval - jitter).await;

                if !constraints_met(&constraints, probe.as_ref()) {
                    debug!("host constraints unmet, skipping refresh run");
                    continue;
                }

                let outcome =
                    refresh::run_refresh(&http, &base_url, &tokens, &profile, &policy).await;
                debug!(?outcome, "periodic refresh run finished");
            }
        }));

        info!(
            interval_secs = interval.as_secs(),
            flex_secs = flex.as_secs(),
            "periodic refresh scheduled"
        );
        true
    }

    fn cancel(&self) {
        let mut handle = self.handle.lock().expect("scheduler lock poisoned");
        if let Some(existing) = handle.take() {
            existing.abort();
            info!("periodic refresh cancelled");
        }
    }

    fn is_scheduled(&self) -> bool {
        let handle = self.handle.lock().expect("scheduler lock poisoned");
        handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::routing::post;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Offline;

    impl HostProbe for Offline {
        fn network_available(&self) -> bool {
            false
        }
        fn battery_ok(&self) -> bool {
            true
        }
        fn storage_ok(&self) -> bool {
            true
        }
    }

    async fn refresh_backend() -> (String, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let router = axum::Router::new().route(
            "/auth/refresh",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({
                        "message": "ok",
                        "data": {
                            "accessToken": "at_fresh",
                            "refreshToken": "rt_fresh",
                            "userInfo": {
                                "id": "u1", "username": "casey",
                                "email": "casey@example.org"
                            }
                        }
                    }))
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}"), calls)
    }

    async fn periodic(
        base_url: String,
        dir: &tempfile::TempDir,
        probe: Arc<dyn HostProbe>,
    ) -> PeriodicRefresh {
        let tokens = Arc::new(
            TokenStore::open(dir.path().join("tokens.enc"), dir.path().join("tokens.key"))
                .await
                .unwrap(),
        );
        tokens.save("at_old", "rt_old").await.unwrap();
        let profile = Arc::new(
            ProfileCache::open(dir.path().join("profile.json"))
                .await
                .unwrap(),
        );
        PeriodicRefresh::new(
            reqwest::Client::new(),
            base_url,
            tokens,
            profile,
            BackoffPolicy {
                base_delay: Duration::from_millis(1),
                max_retries: 0,
            },
            probe,
        )
    }

    #[tokio::test]
    async fn schedule_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (base, _calls) = refresh_backend().await;
        let task = periodic(base, &dir, Arc::new(AlwaysReady)).await;

        assert!(!task.is_scheduled());
        assert!(task.schedule(Duration::from_secs(3600), Duration::ZERO, Constraints::default()));
        assert!(
            !task.schedule(Duration::from_secs(3600), Duration::ZERO, Constraints::default()),
            "second schedule must keep the existing one"
        );
        assert!(task.is_scheduled());

        task.cancel();
        assert!(!task.is_scheduled());
    }

    #[tokio::test]
    async fn schedule_after_cancel_starts_again() {
        let dir = tempfile::tempdir().unwrap();
        let (base, _calls) = refresh_backend().await;
        let task = periodic(base, &dir, Arc::new(AlwaysReady)).await;

        assert!(task.schedule(Duration::from_secs(3600), Duration::ZERO, Constraints::default()));
        task.cancel();
        assert!(
            task.schedule(Duration::from_secs(3600), Duration::ZERO, Constraints::default()),
            "cancel must free the slot"
        );
        task.cancel();
    }

    #[tokio::test]
    async fn periodic_runs_execute_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let (base, calls) = refresh_backend().await;
        let task = periodic(base, &dir, Arc::new(AlwaysReady)).await;

        task.schedule(Duration::from_millis(20), Duration::ZERO, Constraints::default());
        tokio::time::sleep(Duration::from_millis(200)).await;
        task.cancel();

        assert!(
            calls.load(Ordering::SeqCst) >= 2,
            "scheduler must run the job repeatedly, got {}",
            calls.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn unmet_constraints_skip_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let (base, calls) = refresh_backend().await;
        let task = periodic(base, &dir, Arc::new(Offline)).await;

        task.schedule(Duration::from_millis(20), Duration::ZERO, Constraints::default());
        tokio::time::sleep(Duration::from_millis(150)).await;
        task.cancel();

        assert_eq!(
            calls.load(Ordering::SeqCst),
            0,
            "offline probe must block every run"
        );
    }

    #[tokio::test]
    async fn constraints_can_waive_the_probe() {
        let dir = tempfile::tempdir().unwrap();
        let (base, calls) = refresh_backend().await;
        let task = periodic(base, &dir, Arc::new(Offline)).await;

        // Not requiring network makes the offline probe irrelevant
        let constraints = Constraints {
            require_network: false,
            ..Constraints::default()
        };
        task.schedule(Duration::from_millis(20), Duration::ZERO, constraints);
        tokio::time::sleep(Duration::from_millis(150)).await;
        task.cancel();

        assert!(calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn cancel_stops_future_runs() {
        let dir = tempfile::tempdir().unwrap();
        let (base, calls) = refresh_backend().await;
        let task = periodic(base, &dir, Arc::new(AlwaysReady)).await;

        task.schedule(Duration::from_millis(20), Duration::ZERO, Constraints::default());
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.cancel();

        let after_cancel = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            calls.load(Ordering::SeqCst),
            after_cancel,
            "no runs may start after cancel"
        );
    }

    #[test]
    fn constraint_check_combines_probe_answers() {
        let all = Constraints::default();
        assert!(constraints_met(&all, &AlwaysReady));
        assert!(!constraints_met(&all, &Offline));

        let none = Constraints {
            require_network: false,
            forbid_low_battery: false,
            forbid_low_storage: false,
        };
        assert!(constraints_met(&none, &Offline));
    }
}
