//! Streaming TTS client
//!
//! Requests raw PCM from the speech endpoint and re-slices the HTTP body into
//! fixed-size chunks, so the client receives evenly sized audio messages as
//! soon as the engine produces them.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::PipelineError;
use duplex_voice_config::Settings;
use duplex_voice_core::{AudioChunkStream, Error, Result, SpeechSynthesizer};

/// Speech endpoint configuration
#[derive(Clone)]
pub struct OpenAISpeechConfig {
    /// API base (OpenAI: https://api.openai.com/v1)
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    /// Delivery instructions (tone, pacing)
    pub instructions: String,
    /// Bytes per emitted chunk
    pub chunk_size: usize,
    pub connect_timeout: Duration,
}

impl Default for OpenAISpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini-tts".to_string(),
            voice: "coral".to_string(),
            instructions: "Speak in a cheerful and positive tone. language English".to_string(),
            chunk_size: 500,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for OpenAISpeechConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAISpeechConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}

impl OpenAISpeechConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            endpoint: settings.upstream.api_base.clone(),
            api_key: settings.credentials.api_key.clone().unwrap_or_default(),
            model: settings.tts.model.clone(),
            voice: settings.tts.voice.clone(),
            instructions: settings.tts.instructions.clone(),
            chunk_size: settings.tts.chunk_size,
            connect_timeout: settings.upstream.timeout(),
        }
    }
}

/// OpenAI-compatible `audio/speech` synthesizer
pub struct OpenAISpeech {
    config: OpenAISpeechConfig,
    client: Client,
}

impl OpenAISpeech {
    pub fn new(config: OpenAISpeechConfig) -> std::result::Result<Self, PipelineError> {
        if config.chunk_size == 0 {
            return Err(PipelineError::Configuration(
                "TTS chunk size must be positive".to_string(),
            ));
        }

        // No total timeout: the body streams for as long as the utterance lasts
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| PipelineError::Tts(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn speech_url(&self) -> String {
        format!("{}/audio/speech", self.config.endpoint.trim_end_matches('/'))
    }

    fn build_request<'a>(&'a self, text: &'a str) -> SpeechRequest<'a> {
        SpeechRequest {
            model: &self.config.model,
            voice: &self.config.voice,
            input: text,
            instructions: &self.config.instructions,
            response_format: "pcm",
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAISpeech {
    async fn synthesize_speech(&self, text: &str) -> Result<AudioChunkStream> {
        let response = self
            .client
            .post(self.speech_url())
            .bearer_auth(&self.config.api_key)
            .json(&self.build_request(text))
            .send()
            .await
            .map_err(|e| PipelineError::Tts(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Tts(format!("HTTP {}: {}", status, error_text)).into());
        }

        tracing::debug!(
            model = %self.config.model,
            voice = %self.config.voice,
            chars = text.len(),
            "Speech stream opened"
        );

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::from(PipelineError::Tts(e.to_string()))));

        Ok(rechunk(body, self.config.chunk_size))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Re-slice a byte stream into `chunk_size` pieces.
///
/// The final piece may be shorter. An error is forwarded after the bytes
/// buffered before it and ends the stream.
pub fn rechunk<S>(input: S, chunk_size: usize) -> AudioChunkStream
where
    S: Stream<Item = Result<Bytes>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        futures::pin_mut!(input);
        let mut buffer = BytesMut::new();

        while let Some(item) = input.next().await {
            match item {
                Ok(bytes) => {
                    buffer.extend_from_slice(&bytes);
                    while buffer.len() >= chunk_size {
                        yield Ok(buffer.split_to(chunk_size).freeze());
                    }
                }
                Err(e) => {
                    if !buffer.is_empty() {
                        yield Ok(buffer.split().freeze());
                    }
                    yield Err(e);
                    return;
                }
            }
        }

        if !buffer.is_empty() {
            yield Ok(buffer.freeze());
        }
    })
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    instructions: &'a str,
    response_format: &'static str,
}
