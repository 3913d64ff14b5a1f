//! Prometheus metrics
//!
//! Session-level series are recorded here; turn-level series come from
//! `duplex_voice_pipeline::telemetry` and share the same recorder.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;
use duplex_voice_pipeline::telemetry;

pub const SESSIONS_OPENED_TOTAL: &str = "duplex_voice_sessions_opened_total";
pub const SESSIONS_CLOSED_TOTAL: &str = "duplex_voice_sessions_closed_total";
pub const SESSIONS_ACTIVE: &str = "duplex_voice_sessions_active";

/// Install the global Prometheus recorder
///
/// Fails if a recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(SESSIONS_OPENED_TOTAL, "Sessions accepted");
    describe_counter!(SESSIONS_CLOSED_TOTAL, "Sessions ended, by outcome");
    describe_gauge!(SESSIONS_ACTIVE, "Sessions currently running");
    describe_counter!(telemetry::TURNS_COMPLETED_TOTAL, "Turns whose reply audio was fully streamed");
    describe_counter!(telemetry::TURNS_FAILED_TOTAL, "Turns abandoned, by failing stage");
    describe_counter!(
        telemetry::PERSISTENCE_FAILURES_TOTAL,
        "Artifact writes that failed, by direction"
    );
    describe_histogram!(
        telemetry::LLM_LATENCY_SECONDS,
        Unit::Seconds,
        "Time to generate the complete reply"
    );
    describe_histogram!(
        telemetry::TTS_FIRST_CHUNK_SECONDS,
        Unit::Seconds,
        "Time from synthesis request to first audio chunk"
    );
    describe_histogram!(
        telemetry::TURN_TOTAL_SECONDS,
        Unit::Seconds,
        "Time from final transcript to last audio chunk"
    );

    Ok(handle)
}

/// `GET /metrics`
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}

pub fn record_session_opened(active: usize) {
    metrics::counter!(SESSIONS_OPENED_TOTAL).increment(1);
    metrics::gauge!(SESSIONS_ACTIVE).set(active as f64);
}

/// `outcome` is `client_closed` or `failed`
pub fn record_session_closed(outcome: &'static str, active: usize) {
    metrics::counter!(SESSIONS_CLOSED_TOTAL, "outcome" => outcome).increment(1);
    metrics::gauge!(SESSIONS_ACTIVE).set(active as f64);
}
