//! Turn-level metrics
//!
//! Recorded through the `metrics` facade; they are no-ops until the server
//! installs a recorder.

use std::time::Duration;

use duplex_voice_core::TurnStage;

pub const LLM_LATENCY_SECONDS: &str = "duplex_voice_llm_latency_seconds";
pub const TTS_FIRST_CHUNK_SECONDS: &str = "duplex_voice_tts_first_chunk_seconds";
pub const TURN_TOTAL_SECONDS: &str = "duplex_voice_turn_total_seconds";
pub const TURNS_COMPLETED_TOTAL: &str = "duplex_voice_turns_completed_total";
pub const TURNS_FAILED_TOTAL: &str = "duplex_voice_turns_failed_total";
pub const PERSISTENCE_FAILURES_TOTAL: &str = "duplex_voice_persistence_failures_total";

/// Full reply generation time
pub fn record_llm_latency(elapsed: Duration) {
    metrics::histogram!(LLM_LATENCY_SECONDS).record(elapsed.as_secs_f64());
}

/// Time from synthesis request to first audio chunk
pub fn record_tts_first_chunk(elapsed: Duration) {
    metrics::histogram!(TTS_FIRST_CHUNK_SECONDS).record(elapsed.as_secs_f64());
}

pub fn record_turn_completed(elapsed: Duration) {
    metrics::counter!(TURNS_COMPLETED_TOTAL).increment(1);
    metrics::histogram!(TURN_TOTAL_SECONDS).record(elapsed.as_secs_f64());
}

pub fn record_turn_failed(stage: TurnStage) {
    metrics::counter!(TURNS_FAILED_TOTAL, "stage" => stage.as_str()).increment(1);
}

/// `direction` is `in` or `out`
pub fn record_persistence_failure(direction: &'static str) {
    metrics::counter!(PERSISTENCE_FAILURES_TOTAL, "direction" => direction).increment(1);
}
