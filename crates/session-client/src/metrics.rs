//! Session client metrics
//!
//! - `session_requests_total` (counter): labels `method`, `outcome`
//! - `session_request_duration_seconds` (histogram): label `outcome`
//! - `session_renewals_total` (counter): label `result` (`success`, `rejected`, `failure`, `discarded`)
//! - `session_retries_total` (counter)
//! - `session_redirects_total` (counter)
//!
//! Without an installed recorder every call is a no-op.

/// Histogram buckets for `session_request_duration_seconds`, 5ms to 60s.
pub const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Record a finished dispatch, including any renewal and replay it went through.
pub fn record_request(method: &str, outcome: &'static str, duration_secs: f64) {
    metrics::counter!("session_requests_total", "method" => method.to_string(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!("session_request_duration_seconds", "outcome" => outcome)
        .record(duration_secs);
}

/// Record the settlement of one renewal episode.
pub fn record_renewal(result: &'static str) {
    metrics::counter!("session_renewals_total", "result" => result).increment(1);
}

/// Record a request replayed with a renewed credential.
pub fn record_retry() {
    metrics::counter!("session_retries_total").increment(1);
}

/// Record a navigation to the login view.
pub fn record_redirect() {
    metrics::counter!("session_redirects_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

    /// Isolated recorder so tests don't fight over the global one.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full("session_request_duration_seconds".to_string()),
                DURATION_BUCKETS,
            )
            .expect("failed to set histogram buckets")
            .build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request("GET", "success", 0.01);
        record_renewal("success");
        record_retry();
        record_redirect();
    }

    #[test]
    fn request_counter_and_histogram_carry_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("GET", "success", 0.042);
        record_request("POST", "auth_exhausted", 1.5);

        let output = handle.render();
        assert!(output.contains("session_requests_total"));
        assert!(output.contains("method=\"GET\""));
        assert!(output.contains("outcome=\"auth_exhausted\""));
        assert!(output.contains("session_request_duration_seconds_bucket"));
    }

    #[test]
    fn renewal_retry_and_redirect_counters_render() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_renewal("success");
        record_renewal("failure");
        record_retry();
        record_redirect();

        let output = handle.render();
        assert!(output.contains("session_renewals_total{result=\"success\"} 1"));
        assert!(output.contains("session_renewals_total{result=\"failure\"} 1"));
        assert!(output.contains("session_retries_total 1"));
        assert!(output.contains("session_redirects_total 1"));
    }
}
