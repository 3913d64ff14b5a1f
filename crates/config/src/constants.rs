//! Default endpoints and model identifiers

/// Upstream service endpoints
pub mod endpoints {
    /// OpenAI-compatible REST base (chat completions, audio speech)
    pub const API_BASE_DEFAULT: &str = "https://api.openai.com/v1";

    /// Realtime transcription socket
    pub const REALTIME_DEFAULT: &str = "wss://api.openai.com/v1/realtime";
}

/// Model defaults
pub mod models {
    pub const LLM_DEFAULT: &str = "gpt-4.1-mini";
    pub const TTS_DEFAULT: &str = "gpt-4o-mini-tts";
    pub const TTS_VOICE_DEFAULT: &str = "coral";
}

/// Synthesized audio delivery
pub mod audio {
    /// Bytes per outbound chunk. 500-1500 bytes (~10-30ms at 24kHz PCM16)
    /// balances latency and per-message overhead for a voice agent.
    pub const TTS_CHUNK_SIZE_DEFAULT: usize = 500;
}

/// Environment variable holding the upstream API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
