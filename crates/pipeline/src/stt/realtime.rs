//! Realtime transcription adapter
//!
//! One upstream WebSocket per session. After the handshake a single
//! `transcription_session.update` configures the engine; then two tasks
//! bridge the socket to the channel queues:
//!
//! - writer: `AudioFrame` → base64 `input_audio_buffer.append`
//! - reader: transcription events → [`TranscriptEvent`]
//!
//! Both tasks are owned by the returned [`TranscriptionChannel`] and aborted
//! when it closes.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

use duplex_voice_config::Settings;
use duplex_voice_core::{
    AudioFrame, Error, Result, SpeechTranscriber, TranscriptEvent, TranscriptionChannel,
    TranscriptionConfig,
};

const EVENT_DELTA: &str = "conversation.item.input_audio_transcription.delta";
const EVENT_COMPLETED: &str = "conversation.item.input_audio_transcription.completed";
const EVENT_SPEECH_STARTED: &str = "input_audio_buffer.speech_started";
const EVENT_SPEECH_STOPPED: &str = "input_audio_buffer.speech_stopped";
const EVENT_ERROR: &str = "error";

/// Upstream endpoint and credentials
#[derive(Clone)]
pub struct RealtimeConfig {
    /// Realtime socket (e.g. `wss://api.openai.com/v1/realtime`)
    pub url: String,
    pub api_key: String,
}

impl fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl RealtimeConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            url: settings.upstream.realtime_url.clone(),
            api_key: settings.credentials.api_key.clone().unwrap_or_default(),
        }
    }
}

/// OpenAI-compatible realtime transcription engine
#[derive(Debug, Clone)]
pub struct RealtimeTranscriber {
    config: RealtimeConfig,
}

impl RealtimeTranscriber {
    pub fn new(config: RealtimeConfig) -> Self {
        Self { config }
    }

    fn session_url(&self) -> String {
        let separator = if self.config.url.contains('?') { '&' } else { '?' };
        format!("{}{}intent=transcription", self.config.url, separator)
    }

    fn build_request(&self) -> Result<Request> {
        let mut request = self
            .session_url()
            .into_client_request()
            .map_err(|e| Error::UpstreamConnect(format!("invalid realtime url: {}", e)))?;

        let auth = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| Error::UpstreamConnect(format!("invalid API key: {}", e)))?;
        let headers = request.headers_mut();
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        Ok(request)
    }
}

#[async_trait]
impl SpeechTranscriber for RealtimeTranscriber {
    async fn stream_transcribe(
        &self,
        config: &TranscriptionConfig,
    ) -> Result<TranscriptionChannel> {
        let request = self.build_request()?;
        let (socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::UpstreamConnect(format!("realtime handshake failed: {}", e)))?;
        let (mut upstream_tx, upstream_rx) = socket.split();

        upstream_tx
            .send(Message::Text(session_update(config).to_string()))
            .await
            .map_err(|e| {
                Error::UpstreamConnect(format!("failed to configure transcription: {}", e))
            })?;

        tracing::info!(
            model = %config.model,
            language = %config.language,
            noise_reduction = ?config.noise_reduction_mode,
            "Transcription channel connected"
        );

        let (audio_tx, audio_rx) = mpsc::channel(config.queue_capacity);
        let (events_tx, events_rx) = mpsc::channel(config.queue_capacity);

        let writer = tokio::spawn(write_audio(upstream_tx, audio_rx));
        let reader = tokio::spawn(read_events(upstream_rx, events_tx));

        Ok(
            TranscriptionChannel::new(audio_tx, events_rx, config.push_timeout())
                .with_task(writer)
                .with_task(reader),
        )
    }

    fn name(&self) -> &str {
        "openai-realtime"
    }
}

/// The session configuration event sent right after the handshake
pub fn session_update(config: &TranscriptionConfig) -> serde_json::Value {
    let noise_reduction = match config.noise_reduction_mode.as_wire() {
        Some(kind) => json!({ "type": kind }),
        None => serde_json::Value::Null,
    };

    json!({
        "type": "transcription_session.update",
        "session": {
            "input_audio_format": "pcm16",
            "input_audio_transcription": {
                "model": config.model,
                "prompt": config.prompt,
                "language": config.language,
            },
            "turn_detection": {
                "type": "server_vad",
                "threshold": config.turn_detection_threshold,
                "prefix_padding_ms": config.prefix_padding_ms,
                "silence_duration_ms": config.silence_duration_ms,
            },
            "input_audio_noise_reduction": noise_reduction,
            "include": ["item.input_audio_transcription.logprobs"],
        }
    })
}

fn append_event(frame: &AudioFrame) -> String {
    json!({
        "type": "input_audio_buffer.append",
        "audio": BASE64.encode(&frame.data),
    })
    .to_string()
}

async fn write_audio<W>(mut upstream: W, mut audio_rx: mpsc::Receiver<AudioFrame>)
where
    W: Sink<Message> + Unpin,
    W::Error: fmt::Display,
{
    while let Some(frame) = audio_rx.recv().await {
        if let Err(e) = upstream.send(Message::Text(append_event(&frame))).await {
            tracing::warn!(error = %e, seq = frame.sequence, "Upstream audio write failed");
            return;
        }
    }
    let _ = upstream.close().await;
}

async fn read_events<R, E>(mut upstream: R, events_tx: mpsc::Sender<Result<TranscriptEvent>>)
where
    R: Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let reason = loop {
        let message = match upstream.next().await {
            Some(Ok(message)) => message,
            Some(Err(e)) => break format!("transcription socket error: {}", e),
            None => break "transcription socket ended".to_string(),
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(frame) => {
                break match frame {
                    Some(frame) => format!(
                        "transcription socket closed ({}): {}",
                        frame.code, frame.reason
                    ),
                    None => "transcription socket closed".to_string(),
                };
            }
            _ => continue,
        };

        match parse_server_event(&text) {
            Ok(Some(event)) => {
                if events_tx.send(Ok(event)).await.is_err() {
                    // Channel closed by the session
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed transcription event");
            }
        }
    };

    tracing::info!(reason = %reason, "Transcription upstream disconnected");
    let _ = events_tx.send(Err(Error::UpstreamDisconnected(reason))).await;
}

#[derive(Debug, Deserialize)]
struct ServerEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Map one upstream message to a transcript event, logging the ones that
/// only carry engine state
fn parse_server_event(text: &str) -> std::result::Result<Option<TranscriptEvent>, serde_json::Error> {
    let event: ServerEvent = serde_json::from_str(text)?;

    let transcript = match event.kind.as_str() {
        EVENT_DELTA => Some(TranscriptEvent::Delta(event.delta.unwrap_or_default())),
        EVENT_COMPLETED => {
            let transcript = event.transcript.unwrap_or_default();
            tracing::info!(transcript = %transcript, "Transcription completed");
            Some(TranscriptEvent::Completed(transcript))
        }
        EVENT_SPEECH_STARTED => {
            tracing::debug!("Speech started");
            None
        }
        EVENT_SPEECH_STOPPED => {
            tracing::debug!("Speech stopped");
            None
        }
        EVENT_ERROR => {
            let detail = event
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            tracing::error!(error = %detail, "Transcription engine reported an error");
            None
        }
        other => {
            tracing::trace!(event = other, "Ignoring transcription event");
            None
        }
    };

    Ok(transcript)
}
