//! Prometheus metrics for queue publishers and consumers

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the Prometheus recorder.
///
/// Call this once at startup. Subsequent calls are no-ops.
pub fn init_metrics() {
    let _ = PROMETHEUS_HANDLE.get_or_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install Prometheus recorder");
        info!("Prometheus metrics initialized");
        handle
    });
}

/// Render metrics in Prometheus exposition format
pub fn render_metrics() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_default()
}

/// Per-queue metrics helper
#[derive(Clone)]
pub struct QueueMetrics {
    queue_name: String,
}

impl QueueMetrics {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
        }
    }

    /// Record a message handed to the broker
    pub fn message_published(&self) {
        counter!(
            "job_queue_published_total",
            "queue" => self.queue_name.clone()
        )
        .increment(1);
    }

    /// Record a publish the broker (or serializer) rejected
    pub fn publish_failed(&self) {
        counter!(
            "job_queue_publish_failures_total",
            "queue" => self.queue_name.clone()
        )
        .increment(1);
    }

    /// Record a job acknowledged after successful processing
    pub fn job_processed(&self, duration: Duration) {
        counter!(
            "job_queue_jobs_total",
            "queue" => self.queue_name.clone(),
            "status" => "success"
        )
        .increment(1);

        histogram!(
            "job_queue_job_duration_seconds",
            "queue" => self.queue_name.clone()
        )
        .record(duration.as_secs_f64());
    }

    /// Record a failed processing attempt
    pub fn job_failed(&self) {
        counter!(
            "job_queue_jobs_total",
            "queue" => self.queue_name.clone(),
            "status" => "failed"
        )
        .increment(1);
    }

    /// Record a retry scheduled through the delay queue
    pub fn job_retried(&self) {
        counter!(
            "job_queue_jobs_retried_total",
            "queue" => self.queue_name.clone()
        )
        .increment(1);
    }

    /// Record a message routed to the dead-letter queue
    pub fn job_dead_lettered(&self) {
        counter!(
            "job_queue_jobs_dead_lettered_total",
            "queue" => self.queue_name.clone()
        )
        .increment(1);
    }

    /// Update the queue depth gauge (from admin introspection)
    pub fn queue_depth(&self, depth: u32) {
        gauge!(
            "job_queue_depth",
            "queue" => self.queue_name.clone()
        )
        .set(f64::from(depth));
    }
}
