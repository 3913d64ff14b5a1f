//! Outbound loop: transcripts in, synthesized audio out
//!
//! Final transcripts are handled one at a time. Each gets the next outbound
//! sequence number, runs through the turn orchestrator, and its audio is sent
//! to the client while being appended to `{seq}_out.pcm`.

use futures::{Sink, SinkExt};
use std::fmt;

use crate::connection::ServerMessage;
use duplex_voice_core::{Error, Result, TranscriptEvent, TranscriptionEvents};
use duplex_voice_pipeline::{SessionArtifacts, TurnOrchestrator};

pub(crate) struct OutboundLoop<'a> {
    session_id: &'a str,
    orchestrator: &'a TurnOrchestrator,
    artifacts: &'a SessionArtifacts,
    next_seq: u64,
}

impl<'a> OutboundLoop<'a> {
    pub(crate) fn new(
        session_id: &'a str,
        orchestrator: &'a TurnOrchestrator,
        artifacts: &'a SessionArtifacts,
    ) -> Self {
        Self {
            session_id,
            orchestrator,
            artifacts,
            next_seq: 0,
        }
    }

    /// Replies started so far, failed ones included
    pub(crate) fn turns(&self) -> u64 {
        self.next_seq
    }

    /// Runs until the transcription stream ends or the client stops
    /// accepting audio. Both are session-fatal, so this only returns `Err`.
    pub(crate) async fn run<K>(
        &mut self,
        events: &mut TranscriptionEvents,
        outgoing: &mut K,
    ) -> Result<()>
    where
        K: Sink<ServerMessage> + Unpin,
        K::Error: fmt::Display,
    {
        while let Some(event) = events.next_event().await {
            let text = match event {
                Ok(TranscriptEvent::Completed(text)) => text,
                Ok(TranscriptEvent::Delta(_)) => continue,
                Err(e) if e.is_session_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(session_id = self.session_id, error = %e, "Transcription error");
                    continue;
                }
            };

            let text = text.trim();
            if text.is_empty() {
                tracing::debug!(session_id = self.session_id, "Skipping empty transcript");
                continue;
            }

            let seq = self.next_seq;
            self.next_seq += 1;
            self.play_turn(seq, text, outgoing).await?;
        }

        Err(Error::UpstreamDisconnected(
            "transcription stream ended".to_string(),
        ))
    }

    /// Stream one reply. Only a client send failure escapes as an error.
    async fn play_turn<K>(&self, seq: u64, transcript: &str, outgoing: &mut K) -> Result<()>
    where
        K: Sink<ServerMessage> + Unpin,
        K::Error: fmt::Display,
    {
        let mut turn = match self.orchestrator.run(seq, transcript).await {
            Ok(turn) => turn,
            Err(e) => {
                tracing::info!(
                    session_id = self.session_id,
                    turn = seq,
                    error = %e,
                    "Turn abandoned, waiting for next transcript"
                );
                return Ok(());
            }
        };

        let mut recorder = self.artifacts.recorder(seq);
        let mut chunks = 0usize;

        let result = loop {
            match turn.next_chunk().await {
                Some(Ok(chunk)) => {
                    let (sent, ()) = tokio::join!(
                        outgoing.send(ServerMessage::Audio(chunk.clone())),
                        recorder.record(&chunk)
                    );
                    if let Err(e) = sent {
                        break Err(Error::Client(format!("failed to send audio: {}", e)));
                    }
                    chunks += 1;
                }
                Some(Err(e)) => {
                    tracing::info!(
                        session_id = self.session_id,
                        turn = seq,
                        error = %e,
                        chunks,
                        "Turn cut short"
                    );
                    break Ok(());
                }
                None => break Ok(()),
            }
        };

        recorder.finish().await;
        tracing::debug!(session_id = self.session_id, turn = seq, chunks, "Reply streamed");
        result
    }
}
