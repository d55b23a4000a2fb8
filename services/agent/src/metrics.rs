//! Prometheus metrics exposition
//!
//! The agent renders these on `/metrics`:
//!
//! - `api_requests_total` (counter): label `outcome`
//! - `api_request_duration_seconds` (histogram)
//! - `token_rotations_total` (counter)
//! - `token_refresh_total` (counter): label `outcome`
//! - `oauth_callbacks_total` (counter): label `outcome`

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `api_request_duration_seconds` gets explicit buckets so it renders as a
/// histogram (with `_bucket` lines usable in `histogram_quantile()`) rather
/// than the default summary. The range covers 5ms to 60s, matching the
/// configurable request timeout range.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "api_request_duration_seconds".to_string(),
            ),
            &[
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
            ],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Count a finished OAuth callback by outcome.
pub fn record_callback(outcome: &'static str) {
    metrics::counter!("oauth_callbacks_total", "outcome" => outcome).increment(1);
}
