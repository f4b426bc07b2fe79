// crates/clinote-server/src/metrics.rs
//! Prometheus metrics: recorder init, metric descriptions, and helpers for
//! recording job and extraction activity.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder. Call once at startup, before
/// any metric is recorded. Returns `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    if metrics::set_global_recorder(recorder).is_err() {
        tracing::warn!("failed to set global metrics recorder (already set)");
        return false;
    }
    if PROMETHEUS_HANDLE.set(handle).is_err() {
        tracing::warn!("failed to store prometheus handle (already set)");
    }

    describe_metrics();
    tracing::info!("prometheus metrics initialized");
    true
}

fn describe_metrics() {
    describe_counter!("clinote_requests_total", "Total number of API requests");
    describe_histogram!("clinote_request_duration_seconds", "Duration of API requests in seconds");

    describe_counter!("clinote_jobs_total", "Total number of jobs by kind and outcome");
    describe_histogram!("clinote_job_duration_seconds", "Duration of completed jobs in seconds");

    describe_gauge!("clinote_mentions_extracted", "Mentions extracted in the last completed extraction job");
    describe_gauge!("clinote_notes_uploaded", "Notes uploaded in the last completed upload job");
}

pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_request(endpoint: &str, status: &str, duration: Duration) {
    counter!("clinote_requests_total", "endpoint" => endpoint.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!("clinote_request_duration_seconds", "endpoint" => endpoint.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_job(kind: &str, outcome: &str, duration: Duration) {
    counter!("clinote_jobs_total", "kind" => kind.to_string(), "outcome" => outcome.to_string())
        .increment(1);
    histogram!("clinote_job_duration_seconds", "kind" => kind.to_string()).record(duration.as_secs_f64());
}

pub fn record_extraction(mentions: u64) {
    gauge!("clinote_mentions_extracted").set(mentions as f64);
}

pub fn record_upload(notes: u64) {
    gauge!("clinote_notes_uploaded").set(notes as f64);
}

/// Timing helper for route handlers: `RequestTimer::new("jobs_get").finish_ok()`.
pub struct RequestTimer {
    endpoint: String,
    start: std::time::Instant,
}

impl RequestTimer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            start: std::time::Instant::now(),
        }
    }

    pub fn finish(self, status: &str) {
        record_request(&self.endpoint, status, self.start.elapsed());
    }

    pub fn finish_ok(self) {
        record_request(&self.endpoint, "200", self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_timer_does_not_panic() {
        let timer = RequestTimer::new("test_endpoint");
        std::thread::sleep(Duration::from_millis(1));
        timer.finish_ok();
    }
}
