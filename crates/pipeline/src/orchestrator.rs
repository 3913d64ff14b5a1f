//! Turn Orchestrator
//!
//! Drives one conversational turn from a final transcript to streamed reply
//! audio:
//!
//! ```text
//! Idle → Transcribed → Generating → Synthesizing → Streaming → Done
//!                          └────────────┴─────────────┴──→ Errored { stage }
//! ```
//!
//! The reply is generated in full before synthesis starts. Synthesized audio
//! is handed out chunk by chunk through [`TurnStream`] so the caller can
//! forward it while synthesis is still running. Nothing is retried here.

use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;

use crate::telemetry;
use duplex_voice_core::{
    AudioChunkStream, Error, ReplyGenerator, Result, SpeechSynthesizer, TurnStage,
};

/// Turn lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    /// Final transcript accepted
    Transcribed,
    /// Waiting for the complete reply text
    Generating,
    /// Synthesis requested, no audio yet
    Synthesizing,
    /// At least one audio chunk delivered
    Streaming,
    Done,
    Errored { stage: TurnStage },
}

/// Inputs to the turn state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnEvent {
    TranscriptAccepted,
    GenerationStarted,
    ReplyReady,
    FirstChunk,
    AudioExhausted,
    Failed(TurnStage),
}

impl TurnState {
    /// Next state, or `None` if `event` is not valid in this state
    pub fn advance(self, event: TurnEvent) -> Option<TurnState> {
        use TurnEvent as E;
        use TurnState as S;

        match (self, event) {
            (S::Done | S::Errored { .. }, _) => None,
            (S::Idle, E::Failed(_)) => None,
            (_, E::Failed(stage)) => Some(S::Errored { stage }),
            (S::Idle, E::TranscriptAccepted) => Some(S::Transcribed),
            (S::Transcribed, E::GenerationStarted) => Some(S::Generating),
            (S::Generating, E::ReplyReady) => Some(S::Synthesizing),
            (S::Synthesizing, E::FirstChunk) => Some(S::Streaming),
            // A synthesizer may legitimately produce no audio
            (S::Synthesizing | S::Streaming, E::AudioExhausted) => Some(S::Done),
            (
                S::Idle | S::Transcribed | S::Generating | S::Synthesizing | S::Streaming,
                E::TranscriptAccepted
                | E::GenerationStarted
                | E::ReplyReady
                | E::FirstChunk
                | E::AudioExhausted,
            ) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Done | TurnState::Errored { .. })
    }
}

/// State and timings of one turn
#[derive(Debug)]
struct TurnProgress {
    seq: u64,
    state: TurnState,
    started: Instant,
}

impl TurnProgress {
    fn new(seq: u64) -> Self {
        Self {
            seq,
            state: TurnState::Idle,
            started: Instant::now(),
        }
    }

    fn transition(&mut self, event: TurnEvent) {
        match self.state.advance(event) {
            Some(next) => {
                tracing::debug!(seq = self.seq, from = ?self.state, to = ?next, "Turn transition");
                self.state = next;
            }
            None => {
                tracing::warn!(
                    seq = self.seq,
                    state = ?self.state,
                    event = ?event,
                    "Invalid turn transition ignored"
                );
            }
        }
    }

    fn fail(&mut self, stage: TurnStage, err: Error) -> Error {
        self.transition(TurnEvent::Failed(stage));
        telemetry::record_turn_failed(stage);
        tracing::warn!(seq = self.seq, stage = %stage, error = %err, "Turn failed");
        Error::pipeline(stage, err)
    }
}

/// Runs turns against the configured reply and speech engines
#[derive(Clone)]
pub struct TurnOrchestrator {
    llm: Arc<dyn ReplyGenerator>,
    tts: Arc<dyn SpeechSynthesizer>,
}

impl TurnOrchestrator {
    pub fn new(llm: Arc<dyn ReplyGenerator>, tts: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { llm, tts }
    }

    /// Generate and start speaking the reply for `transcript`.
    ///
    /// Fails with [`Error::Pipeline`] if generation or the synthesis
    /// request fails; the turn is then abandoned with no audio.
    pub async fn run(&self, seq: u64, transcript: &str) -> Result<TurnStream> {
        let mut turn = TurnProgress::new(seq);
        turn.transition(TurnEvent::TranscriptAccepted);
        tracing::info!(seq, transcript, "Turn started");

        turn.transition(TurnEvent::GenerationStarted);
        let llm_start = Instant::now();
        let reply = match self.generate(transcript).await {
            Ok(reply) => reply,
            Err(e) => return Err(turn.fail(TurnStage::Generating, e)),
        };
        telemetry::record_llm_latency(llm_start.elapsed());
        tracing::info!(
            seq,
            reply = %reply,
            llm_ms = llm_start.elapsed().as_millis() as u64,
            model = self.llm.model_name(),
            "Reply generated"
        );

        turn.transition(TurnEvent::ReplyReady);
        let tts_start = Instant::now();
        let chunks = match self.tts.synthesize_speech(&reply).await {
            Ok(chunks) => chunks,
            Err(e) => return Err(turn.fail(TurnStage::Synthesizing, e)),
        };

        Ok(TurnStream {
            turn,
            reply,
            chunks,
            tts_start,
        })
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut deltas = self.llm.generate_reply(prompt).await?;
        let mut reply = String::new();
        while let Some(delta) = deltas.next().await {
            reply.push_str(&delta?);
        }

        if reply.trim().is_empty() {
            return Err(Error::Llm("empty reply".to_string()));
        }
        Ok(reply)
    }
}

/// Reply audio of one turn, in playback order
pub struct TurnStream {
    turn: TurnProgress,
    reply: String,
    chunks: AudioChunkStream,
    tts_start: Instant,
}

impl TurnStream {
    pub fn seq(&self) -> u64 {
        self.turn.seq
    }

    pub fn state(&self) -> TurnState {
        self.turn.state
    }

    pub fn reply(&self) -> &str {
        &self.reply
    }

    /// Next audio chunk; `None` once the turn is over.
    ///
    /// A synthesis failure mid-stream is returned once as
    /// [`Error::Pipeline`] and ends the stream.
    pub async fn next_chunk(&mut self) -> Option<Result<Bytes>> {
        if self.turn.state.is_terminal() {
            return None;
        }

        loop {
            match self.chunks.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => {
                    if self.turn.state == TurnState::Synthesizing {
                        telemetry::record_tts_first_chunk(self.tts_start.elapsed());
                        self.turn.transition(TurnEvent::FirstChunk);
                    }
                    return Some(Ok(chunk));
                }
                Some(Err(e)) => return Some(Err(self.turn.fail(TurnStage::Streaming, e))),
                None => {
                    self.turn.transition(TurnEvent::AudioExhausted);
                    let elapsed = self.turn.started.elapsed();
                    telemetry::record_turn_completed(elapsed);
                    tracing::info!(
                        seq = self.turn.seq,
                        total_ms = elapsed.as_millis() as u64,
                        "Turn completed"
                    );
                    return None;
                }
            }
        }
    }
}
