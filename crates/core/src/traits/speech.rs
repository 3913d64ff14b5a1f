//! Speech processing traits

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{AudioFrame, Error, Result, TranscriptEvent};

/// Stream of synthesized audio chunks (raw PCM16 LE), in playback order
pub type AudioChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Server-side noise reduction applied by the transcription engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NoiseReductionMode {
    None,
    /// Close-talking microphones (headsets)
    #[default]
    NearField,
    /// Laptop or conference-room microphones
    FarField,
}

impl NoiseReductionMode {
    /// Wire tag, or `None` when noise reduction is disabled
    pub fn as_wire(&self) -> Option<&'static str> {
        match self {
            NoiseReductionMode::None => None,
            NoiseReductionMode::NearField => Some("near_field"),
            NoiseReductionMode::FarField => Some("far_field"),
        }
    }
}

/// Transcription session configuration, sent once when the channel opens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Transcription model
    #[serde(default = "default_model")]
    pub model: String,
    /// Target language (ISO-639-1)
    #[serde(default = "default_language")]
    pub language: String,
    /// Prompt biasing the transcription
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Server VAD speech probability threshold (0.0-1.0)
    #[serde(default = "default_threshold")]
    pub turn_detection_threshold: f32,
    /// Audio kept before detected speech start
    #[serde(default = "default_prefix_padding_ms")]
    pub prefix_padding_ms: u32,
    /// Silence needed to close an utterance
    #[serde(default = "default_silence_duration_ms")]
    pub silence_duration_ms: u32,
    #[serde(default)]
    pub noise_reduction_mode: NoiseReductionMode,
    /// Frames buffered between the inbound loop and the upstream writer
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Longest a push may wait for queue space before the upstream is
    /// considered stalled
    #[serde(default = "default_push_timeout_ms")]
    pub push_timeout_ms: u64,
}

fn default_model() -> String {
    "gpt-4o-mini-transcribe".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_prompt() -> String {
    "Transcribe the incoming audio in real time. language English".to_string()
}

fn default_threshold() -> f32 {
    0.5
}

fn default_prefix_padding_ms() -> u32 {
    300
}

fn default_silence_duration_ms() -> u32 {
    500
}

fn default_queue_capacity() -> usize {
    64
}

fn default_push_timeout_ms() -> u64 {
    2000
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            language: default_language(),
            prompt: default_prompt(),
            turn_detection_threshold: default_threshold(),
            prefix_padding_ms: default_prefix_padding_ms(),
            silence_duration_ms: default_silence_duration_ms(),
            noise_reduction_mode: NoiseReductionMode::default(),
            queue_capacity: default_queue_capacity(),
            push_timeout_ms: default_push_timeout_ms(),
        }
    }
}

impl TranscriptionConfig {
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

/// Audio side of a transcription channel
#[derive(Debug)]
pub struct TranscriptionSink {
    tx: mpsc::Sender<AudioFrame>,
    push_timeout: Duration,
}

impl TranscriptionSink {
    /// Forward one audio chunk upstream.
    ///
    /// Waits for queue space for at most the configured push timeout; a
    /// queue that stays full, or a closed channel, means the upstream is
    /// gone and is reported as [`Error::UpstreamDisconnected`].
    pub async fn push(&self, frame: AudioFrame) -> Result<()> {
        match tokio::time::timeout(self.push_timeout, self.tx.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::UpstreamDisconnected(
                "transcription channel closed".to_string(),
            )),
            Err(_) => Err(Error::UpstreamDisconnected(format!(
                "transcription queue saturated for {:?}",
                self.push_timeout
            ))),
        }
    }
}

/// Transcript side of a transcription channel
///
/// Lazy and unbounded: yields events until the upstream closes. Not
/// restartable; a new channel is needed after it ends.
#[derive(Debug)]
pub struct TranscriptionEvents {
    rx: mpsc::Receiver<Result<TranscriptEvent>>,
}

impl TranscriptionEvents {
    pub async fn next_event(&mut self) -> Option<Result<TranscriptEvent>> {
        self.rx.recv().await
    }
}

impl Stream for TranscriptionEvents {
    type Item = Result<TranscriptEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Live connection to a streaming transcription engine
///
/// Owns the background tasks bridging the queues to the engine. Closing the
/// channel (explicitly or by dropping it) aborts them.
#[derive(Debug)]
pub struct TranscriptionChannel {
    sink: TranscriptionSink,
    events: TranscriptionEvents,
    tasks: Vec<JoinHandle<()>>,
    closed: bool,
}

impl TranscriptionChannel {
    /// Build a channel from its queues.
    ///
    /// `audio_tx` feeds the upstream writer; `events_rx` is filled by the
    /// upstream reader.
    pub fn new(
        audio_tx: mpsc::Sender<AudioFrame>,
        events_rx: mpsc::Receiver<Result<TranscriptEvent>>,
        push_timeout: Duration,
    ) -> Self {
        Self {
            sink: TranscriptionSink {
                tx: audio_tx,
                push_timeout,
            },
            events: TranscriptionEvents { rx: events_rx },
            tasks: Vec::new(),
            closed: false,
        }
    }

    /// Attach a background task whose lifetime is bound to this channel
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.tasks.push(task);
        self
    }

    /// Borrow both halves at once, for concurrent push and read
    pub fn split(&mut self) -> (&TranscriptionSink, &mut TranscriptionEvents) {
        (&self.sink, &mut self.events)
    }

    pub async fn push(&self, frame: AudioFrame) -> Result<()> {
        self.sink.push(frame).await
    }

    pub async fn next_event(&mut self) -> Option<Result<TranscriptEvent>> {
        self.events.next_event().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the upstream connection. Idempotent; returns `true` on the
    /// call that actually closed it.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.events.rx.close();
        true
    }
}

impl Drop for TranscriptionChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Streaming Speech-to-Text interface
///
/// Implementations:
/// - `RealtimeTranscriber` - OpenAI-compatible realtime transcription socket
#[async_trait]
pub trait SpeechTranscriber: Send + Sync + 'static {
    /// Connect upstream and send the session configuration
    ///
    /// Fails with [`Error::UpstreamConnect`] if the handshake or the
    /// configuration step fails.
    async fn stream_transcribe(&self, config: &TranscriptionConfig)
        -> Result<TranscriptionChannel>;

    /// Get engine name for logging
    fn name(&self) -> &str;
}

/// Streaming Text-to-Speech interface
///
/// Implementations:
/// - `OpenAISpeech` - OpenAI-compatible audio speech endpoint, chunked
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync + 'static {
    /// Start synthesizing the full utterance
    ///
    /// Returns once the engine accepted the request; audio arrives as a
    /// chunk stream so playback can start before synthesis completes.
    async fn synthesize_speech(&self, text: &str) -> Result<AudioChunkStream>;

    /// Get model name for logging
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_and_receive() {
        let (audio_tx, mut audio_rx) = mpsc::channel(4);
        let (events_tx, events_rx) = mpsc::channel(4);
        let mut channel = TranscriptionChannel::new(audio_tx, events_rx, Duration::from_secs(1));

        channel.push(AudioFrame::new(vec![1u8, 2], 0)).await.unwrap();
        assert_eq!(audio_rx.recv().await.unwrap().data.as_ref(), &[1, 2]);

        events_tx
            .send(Ok(TranscriptEvent::Completed("hi".into())))
            .await
            .unwrap();
        let event = channel.next_event().await.unwrap().unwrap();
        assert_eq!(event, TranscriptEvent::Completed("hi".into()));
    }

    #[tokio::test]
    async fn test_saturated_queue_times_out() {
        let (audio_tx, _audio_rx) = mpsc::channel(1);
        let (_events_tx, events_rx) = mpsc::channel(1);
        let channel = TranscriptionChannel::new(audio_tx, events_rx, Duration::from_millis(20));

        channel.push(AudioFrame::new(vec![0u8; 2], 0)).await.unwrap();
        let err = channel.push(AudioFrame::new(vec![0u8; 2], 1)).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamDisconnected(_)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_releases_upstream() {
        let (audio_tx, _audio_rx) = mpsc::channel(1);
        let (events_tx, events_rx) = mpsc::channel::<Result<TranscriptEvent>>(1);
        let task = tokio::spawn(futures::future::pending::<()>());
        let mut channel = TranscriptionChannel::new(audio_tx, events_rx, Duration::from_secs(1))
            .with_task(task);

        assert!(channel.close());
        assert!(!channel.close());
        assert!(channel.is_closed());
        assert!(events_tx.is_closed());
    }

    #[test]
    fn test_noise_reduction_wire_tags() {
        assert_eq!(NoiseReductionMode::None.as_wire(), None);
        assert_eq!(NoiseReductionMode::NearField.as_wire(), Some("near_field"));
        assert_eq!(NoiseReductionMode::FarField.as_wire(), Some("far_field"));
    }

    #[test]
    fn test_config_defaults() {
        let config = TranscriptionConfig::default();
        assert_eq!(config.turn_detection_threshold, 0.5);
        assert_eq!(config.silence_duration_ms, 500);
        assert_eq!(config.noise_reduction_mode, NoiseReductionMode::NearField);
    }
}
