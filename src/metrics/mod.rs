//! Prometheus metrics for ingestion and analysis
//!
//! Covers:
//! - Ingestion: items persisted per kind, fingerprint hits and misses, rate-gate sleeps
//! - Analysis: outcomes per model, completion latency
//! - Control surface: requests per route
//!
//! Call [`init_metrics`] once at startup. Until it succeeds every recording
//! function is a no-op, so library code and tests never need a registry.

use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Metrics Storage
// ============================================================================

struct PipelineMetrics {
    items_ingested: CounterVec,
    dedup_hits: CounterVec,
    dedup_misses: CounterVec,
    gate_sleeps: Counter,
    gate_sleep_seconds: Counter,
    stage_errors: CounterVec,
    analyses: CounterVec,
    completion_duration: HistogramVec,
    api_requests: CounterVec,
}

static METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Register all metrics with the default Prometheus registry
///
/// Idempotent: later calls return `Ok(())` without registering again.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = PipelineMetrics {
        items_ingested: register_counter_vec!(
            "snoolens_items_ingested_total",
            "Rows persisted by the ingestion engine",
            &["kind"]
        )?,
        dedup_hits: register_counter_vec!(
            "snoolens_fingerprint_hits_total",
            "Items skipped because their fingerprint already existed",
            &["namespace"]
        )?,
        dedup_misses: register_counter_vec!(
            "snoolens_fingerprint_misses_total",
            "Items whose fingerprint was reserved by this process",
            &["namespace"]
        )?,
        gate_sleeps: register_counter!(
            "snoolens_rate_gate_sleeps_total",
            "Number of cooperative rate-gate sleeps"
        )?,
        gate_sleep_seconds: register_counter!(
            "snoolens_rate_gate_sleep_seconds_total",
            "Seconds spent sleeping in the rate gate"
        )?,
        stage_errors: register_counter_vec!(
            "snoolens_stage_errors_total",
            "Errors recorded per pipeline stage",
            &["stage", "kind"]
        )?,
        analyses: register_counter_vec!(
            "snoolens_analyses_total",
            "Analysis attempts by model and outcome",
            &["llm", "outcome"]
        )?,
        completion_duration: register_histogram_vec!(
            "snoolens_completion_duration_seconds",
            "Wall-clock time of a single chat completion",
            &["llm"],
            vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
        )?,
        api_requests: register_counter_vec!(
            "snoolens_api_requests_total",
            "Control surface requests by route and status",
            &["route", "status"]
        )?,
    };

    METRICS
        .set(metrics)
        .map_err(|_| "Pipeline metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

pub fn metrics_initialized() -> bool {
    METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn record_item_ingested(kind: &str) {
    if let Some(m) = METRICS.get() {
        m.items_ingested.with_label_values(&[kind]).inc();
    }
}

/// Record whether a fingerprint reservation was won
pub fn record_fingerprint(namespace: &str, reserved: bool) {
    let Some(m) = METRICS.get() else {
        return;
    };
    if reserved {
        m.dedup_misses.with_label_values(&[namespace]).inc();
    } else {
        m.dedup_hits.with_label_values(&[namespace]).inc();
    }
}

pub fn record_gate_sleep(delay: Duration) {
    if let Some(m) = METRICS.get() {
        m.gate_sleeps.inc();
        m.gate_sleep_seconds.inc_by(delay.as_secs_f64());
    }
}

pub fn record_stage_error(stage: &str, kind: &str) {
    if let Some(m) = METRICS.get() {
        m.stage_errors.with_label_values(&[stage, kind]).inc();
    }
}

pub fn record_analysis(llm: &str, outcome: &str) {
    if let Some(m) = METRICS.get() {
        m.analyses.with_label_values(&[llm, outcome]).inc();
    }
}

pub fn record_completion_duration(llm: &str, elapsed: Duration) {
    if let Some(m) = METRICS.get() {
        m.completion_duration
            .with_label_values(&[llm])
            .observe(elapsed.as_secs_f64());
    }
}

pub fn record_api_request(route: &str, status: u16) {
    let Some(m) = METRICS.get() else {
        return;
    };
    let status_str = status.to_string();
    m.api_requests.with_label_values(&[route, &status_str]).inc();
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
        assert!(metrics_initialized());
    }

    #[test]
    fn test_encode_after_recording() {
        let _ = init_metrics();
        record_item_ingested("post");
        record_fingerprint("post_id", true);
        record_fingerprint("post_id", false);
        record_gate_sleep(Duration::from_secs(80));
        record_analysis("llama3", "analyzed");
        record_completion_duration("llama3", Duration::from_millis(1500));
        record_api_request("/login", 200);

        let text = encode_metrics().unwrap();
        assert!(text.contains("snoolens_items_ingested_total"));
        assert!(text.contains("snoolens_rate_gate_sleeps_total"));
    }

    #[test]
    fn test_recording_never_panics() {
        record_item_ingested("comment");
        record_stage_error("ingest_post", "not_found");
        record_fingerprint("comment_id", false);
    }
}
