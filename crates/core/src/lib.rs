//! Core traits and types for the duplex voice pipeline
//!
//! This crate provides foundational types used across all other crates:
//! - Capability traits for the external engines (transcription, LLM, TTS)
//! - Audio frame type and the PCM <-> WAV container codec
//! - Client control messages and transcript events
//! - Error types

pub mod audio;
pub mod control;
pub mod error;
pub mod traits;
pub mod transcript;

pub use audio::{
    decode_wav, encode_wav, pcm_duration, AudioFrame, BITS_PER_SAMPLE, CHANNELS, SAMPLE_RATE,
};
pub use control::ControlMessage;
pub use error::{Error, Result, TurnStage};
pub use transcript::TranscriptEvent;

pub use traits::{
    AudioChunkStream, NoiseReductionMode, ReplyGenerator, SpeechSynthesizer, SpeechTranscriber,
    TextDeltaStream, TranscriptionChannel, TranscriptionConfig, TranscriptionEvents,
    TranscriptionSink,
};
