//! Inbound loop: client audio and control messages
//!
//! Audio chunks go both into the turn accumulator and to the transcription
//! channel. An end-of-turn control message flushes the accumulator to
//! `{seq}_in.wav`.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::fmt;
use std::mem;

use crate::connection::ClientMessage;
use duplex_voice_core::{AudioFrame, ControlMessage, Error, Result, TranscriptionSink};
use duplex_voice_pipeline::{telemetry, SessionArtifacts};

const SAMPLE_BYTES: usize = 2;

pub(crate) struct InboundLoop<'a> {
    session_id: &'a str,
    artifacts: &'a SessionArtifacts,
    sink: &'a TranscriptionSink,
    accumulator: Vec<u8>,
    turn_index: u64,
    frames: u64,
}

impl<'a> InboundLoop<'a> {
    pub(crate) fn new(
        session_id: &'a str,
        artifacts: &'a SessionArtifacts,
        sink: &'a TranscriptionSink,
    ) -> Self {
        Self {
            session_id,
            artifacts,
            sink,
            accumulator: Vec::new(),
            turn_index: 0,
            frames: 0,
        }
    }

    /// Completed input turns so far
    pub(crate) fn turns(&self) -> u64 {
        self.turn_index
    }

    /// Runs until the client closes (`Ok`) or the transcription channel
    /// stops accepting audio (`Err`, session-fatal)
    pub(crate) async fn run<S, E>(&mut self, mut incoming: S) -> Result<()>
    where
        S: Stream<Item = std::result::Result<ClientMessage, E>> + Unpin,
        E: fmt::Display,
    {
        while let Some(message) = incoming.next().await {
            let message = message.map_err(|e| Error::Client(e.to_string()))?;
            match message {
                ClientMessage::Audio(data) => self.on_audio(data).await?,
                ClientMessage::Text(text) => self.on_control(&text).await,
                ClientMessage::Close => {
                    tracing::debug!(session_id = self.session_id, "Client sent close");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn on_audio(&mut self, data: Bytes) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        // Every frame must hold whole samples so the turn stays encodable
        if data.len() % SAMPLE_BYTES != 0 {
            let err = Error::Protocol(format!(
                "audio frame of {} bytes splits a PCM16 sample",
                data.len()
            ));
            tracing::warn!(session_id = self.session_id, error = %err, "Dropping audio frame");
            return Ok(());
        }

        let frame = AudioFrame::new(data, self.frames);
        self.frames += 1;
        self.accumulator.extend_from_slice(&frame.data);
        self.sink.push(frame).await
    }

    async fn on_control(&mut self, text: &str) {
        match ControlMessage::parse(text) {
            Ok(ControlMessage::EndOfTurn) => self.end_turn().await,
            Ok(ControlMessage::Unknown(tag)) => {
                tracing::debug!(session_id = self.session_id, event = %tag, "Ignoring control event");
            }
            Err(e) => {
                tracing::warn!(session_id = self.session_id, error = %e, "Malformed control message");
            }
        }
    }

    async fn end_turn(&mut self) {
        let pcm = mem::take(&mut self.accumulator);
        let seq = self.turn_index;
        self.turn_index += 1;

        match self.artifacts.write_input(seq, &pcm).await {
            Ok(path) => {
                tracing::info!(
                    session_id = self.session_id,
                    turn = seq,
                    bytes = pcm.len(),
                    path = %path.display(),
                    "Input turn persisted"
                );
            }
            Err(e) => {
                tracing::warn!(
                    session_id = self.session_id,
                    turn = seq,
                    error = %e,
                    "Failed to persist input turn"
                );
                telemetry::record_persistence_failure("in");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_voice_core::{decode_wav, TranscriptionChannel};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn audio(bytes: &'static [u8]) -> std::result::Result<ClientMessage, String> {
        Ok(ClientMessage::Audio(Bytes::from_static(bytes)))
    }

    fn text(body: &str) -> std::result::Result<ClientMessage, String> {
        Ok(ClientMessage::Text(body.to_string()))
    }

    #[tokio::test]
    async fn test_audio_is_accumulated_and_forwarded() {
        let root = tempfile::tempdir().unwrap();
        let artifacts = SessionArtifacts::create(root.path(), "s").await.unwrap();
        let (audio_tx, mut audio_rx) = mpsc::channel(8);
        let (_events_tx, events_rx) = mpsc::channel(8);
        let mut channel = TranscriptionChannel::new(audio_tx, events_rx, Duration::from_secs(1));
        let (sink, _) = channel.split();

        let mut inbound = InboundLoop::new("s", &artifacts, sink);
        let messages = vec![
            audio(b"\x01\x00"),
            audio(b"\x02\x00"),
            text(r#"{"event":"end"}"#),
            audio(b"\x03\x00"),
            text("not json"),
            text(r#"{"event":"ping"}"#),
            text(r#"{"event":"end"}"#),
        ];
        inbound.run(futures::stream::iter(messages)).await.unwrap();

        assert_eq!(inbound.turns(), 2);
        assert_eq!(audio_rx.recv().await.unwrap().sequence, 0);
        assert_eq!(audio_rx.recv().await.unwrap().sequence, 1);
        assert_eq!(audio_rx.recv().await.unwrap().data.as_ref(), b"\x03\x00");

        let first = std::fs::read(artifacts.input_path(0)).unwrap();
        assert_eq!(decode_wav(&first).unwrap(), vec![1, 0, 2, 0]);
        let second = std::fs::read(artifacts.input_path(1)).unwrap();
        assert_eq!(decode_wav(&second).unwrap(), vec![3, 0]);
    }

    #[tokio::test]
    async fn test_empty_turn_still_consumes_a_sequence_number() {
        let root = tempfile::tempdir().unwrap();
        let artifacts = SessionArtifacts::create(root.path(), "s").await.unwrap();
        let (audio_tx, _audio_rx) = mpsc::channel(8);
        let (_events_tx, events_rx) = mpsc::channel(8);
        let mut channel = TranscriptionChannel::new(audio_tx, events_rx, Duration::from_secs(1));
        let (sink, _) = channel.split();

        let mut inbound = InboundLoop::new("s", &artifacts, sink);
        let messages = vec![text(r#"{"event":"end"}"#), text(r#"{"event":"end"}"#)];
        inbound.run(futures::stream::iter(messages)).await.unwrap();

        assert_eq!(inbound.turns(), 2);
        assert!(decode_wav(&std::fs::read(artifacts.input_path(1)).unwrap())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_odd_length_frame_is_dropped() {
        let root = tempfile::tempdir().unwrap();
        let artifacts = SessionArtifacts::create(root.path(), "s").await.unwrap();
        let (audio_tx, mut audio_rx) = mpsc::channel(8);
        let (_events_tx, events_rx) = mpsc::channel(8);
        let mut channel = TranscriptionChannel::new(audio_tx, events_rx, Duration::from_secs(1));
        let (sink, _) = channel.split();

        let mut inbound = InboundLoop::new("s", &artifacts, sink);
        let messages = vec![
            audio(b"\x01\x00\x02"),
            audio(b"\x04\x00"),
            text(r#"{"event":"end"}"#),
        ];
        inbound.run(futures::stream::iter(messages)).await.unwrap();

        assert_eq!(inbound.turns(), 1);
        let forwarded = audio_rx.recv().await.unwrap();
        assert_eq!(forwarded.data.as_ref(), b"\x04\x00");
        assert_eq!(forwarded.sequence, 0);
        let wav = std::fs::read(artifacts.input_path(0)).unwrap();
        assert_eq!(decode_wav(&wav).unwrap(), vec![4, 0]);
    }

    #[tokio::test]
    async fn test_closed_upstream_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let artifacts = SessionArtifacts::create(root.path(), "s").await.unwrap();
        let (audio_tx, audio_rx) = mpsc::channel(8);
        let (_events_tx, events_rx) = mpsc::channel(8);
        let mut channel = TranscriptionChannel::new(audio_tx, events_rx, Duration::from_secs(1));
        drop(audio_rx);
        let (sink, _) = channel.split();

        let mut inbound = InboundLoop::new("s", &artifacts, sink);
        let err = inbound
            .run(futures::stream::iter(vec![audio(b"\x00\x00")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamDisconnected(_)));
    }

    #[tokio::test]
    async fn test_client_close_stops_reading() {
        let root = tempfile::tempdir().unwrap();
        let artifacts = SessionArtifacts::create(root.path(), "s").await.unwrap();
        let (audio_tx, _audio_rx) = mpsc::channel(8);
        let (_events_tx, events_rx) = mpsc::channel(8);
        let mut channel = TranscriptionChannel::new(audio_tx, events_rx, Duration::from_secs(1));
        let (sink, _) = channel.split();

        let mut inbound = InboundLoop::new("s", &artifacts, sink);
        let messages = vec![Ok(ClientMessage::Close), text(r#"{"event":"end"}"#)];
        inbound.run(futures::stream::iter(messages)).await.unwrap();
        assert_eq!(inbound.turns(), 0);
    }
}
