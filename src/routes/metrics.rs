use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for the pipeline metrics.
pub fn describe_metrics() {
    metrics::describe_counter!("pipeline_jobs_total", "Total pipeline jobs started");
    metrics::describe_counter!("pipeline_jobs_completed", "Total pipeline jobs completed");
    metrics::describe_counter!("pipeline_jobs_failed", "Total pipeline jobs that ended in error");
    metrics::describe_gauge!("pipeline_jobs_in_flight", "Pipelines currently running");
    metrics::describe_histogram!(
        "pipeline_processing_seconds",
        "End-to-end time to run all stages of a job"
    );
    metrics::describe_histogram!("pipeline_stage_seconds", "Time spent in a single stage");
}

/// GET /metrics — Prometheus text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}
