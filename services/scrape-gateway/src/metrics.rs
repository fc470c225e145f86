//! Prometheus metrics exposition
//!
//! Gateway-level metrics:
//!
//! - `admin_requests_total` (counter): labels `status`, `method`
//!
//! The pool crate emits its own call and lifecycle metrics
//! (`pool_calls_total`, `pool_exhausted_total`, `credential_deactivations_total`,
//! `credential_reactivations_total`, `provider_call_duration_seconds`); this
//! module installs the recorder they all land in.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Configures `provider_call_duration_seconds` with explicit histogram buckets
/// so it renders as a Prometheus histogram (with `_bucket` lines for
/// `histogram_quantile()` queries) rather than the default summary. Bucket
/// boundaries cover the range from 5ms to 60s, matching the configurable
/// call timeout range.
///
/// The handle's `render()` method produces the Prometheus text exposition
/// format suitable for serving on a `/metrics` endpoint.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "provider_call_duration_seconds".to_string(),
            ),
            &[
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
            ],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed admin request with status code and method labels.
pub fn record_admin_request(status: u16, method: &str) {
    metrics::counter!(
        "admin_requests_total",
        "status" => status.to_string(),
        "method" => method.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::{PrometheusHandle, PrometheusRecorder};

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        // When no recorder is installed, metrics calls are no-ops.
        record_admin_request(200, "GET");
        record_admin_request(401, "POST");
    }

    /// Create an isolated recorder/handle pair for unit tests.
    /// Uses build_recorder() instead of install_recorder() to avoid the
    /// global recorder singleton constraint — only one global recorder can
    /// exist per process, and install_recorder() panics on a second call.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Full(
                    "provider_call_duration_seconds".to_string(),
                ),
                &[
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
                ],
            )
            .expect("failed to set histogram buckets")
            .build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn admin_counter_renders_with_labels() {
        let (recorder, handle) = isolated_recorder();
        metrics::with_local_recorder(&recorder, || {
            record_admin_request(201, "POST");
            record_admin_request(201, "POST");
        });

        let rendered = handle.render();
        assert!(
            rendered.contains("admin_requests_total"),
            "missing counter in: {rendered}"
        );
        assert!(rendered.contains(r#"status="201""#), "missing label: {rendered}");
        assert!(rendered.contains(r#"method="POST""#), "missing label: {rendered}");
    }

    #[test]
    fn call_duration_renders_as_histogram() {
        let (recorder, handle) = isolated_recorder();
        metrics::with_local_recorder(&recorder, || {
            metrics::histogram!("provider_call_duration_seconds", "provider" => "talentscan")
                .record(0.042);
        });

        let rendered = handle.render();
        assert!(
            rendered.contains("provider_call_duration_seconds_bucket"),
            "expected explicit buckets, got: {rendered}"
        );
    }
}
