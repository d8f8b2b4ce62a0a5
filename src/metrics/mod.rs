//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Submissions sent to the network
//! - Terminal outcomes and confirmation latency
//! - Status query classifications
//! - Tracker busy state

use crate::error::{TrackerError, TrackerResult};

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram_vec, Counter,
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref TX_SUBMITTED: Counter = register_counter!(
        "tracker_transactions_submitted_total",
        "Transactions accepted by the submission endpoint"
    ).unwrap();

    pub static ref TX_OUTCOMES: CounterVec = register_counter_vec!(
        "tracker_outcomes_total",
        "Terminal outcomes by kind",
        &["outcome"]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "tracker_submission_latency_seconds",
        "Time from submit() entry to terminal outcome",
        &["outcome"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 45.0, 60.0, 90.0]
    ).unwrap();

    pub static ref STATUS_QUERIES: CounterVec = register_counter_vec!(
        "tracker_status_queries_total",
        "getTransaction polls by classification",
        &["result"]
    ).unwrap();

    pub static ref TRACKER_BUSY: Gauge = register_gauge!(
        "tracker_busy",
        "Submission in flight (1=busy, 0=idle)"
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> TrackerResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TrackerError::Config(format!("Cannot bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| TrackerError::Internal(e.to_string()))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Render all registered metrics in the text exposition format
pub fn render() -> TrackerResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TrackerError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TrackerError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_submission() {
    TX_SUBMITTED.inc();
}

pub fn record_outcome(outcome: &str, latency_secs: f64) {
    TX_OUTCOMES.with_label_values(&[outcome]).inc();
    TX_LATENCY.with_label_values(&[outcome]).observe(latency_secs);
}

pub fn record_poll(result: &str) {
    STATUS_QUERIES.with_label_values(&[result]).inc();
}

pub fn set_busy(busy: bool) {
    TRACKER_BUSY.set(if busy { 1.0 } else { 0.0 });
}
