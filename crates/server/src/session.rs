//! Session Management
//!
//! A session is one client connection: its artifact directory, its
//! transcription channel and the two loops that move audio in and out.
//!
//! ```text
//! client ──audio──► inbound ──frames──► transcription channel
//!                      │                        │
//!                 {seq}_in.wav           completed transcript
//!                                               ▼
//! client ◄──audio── outbound ◄──chunks── turn orchestrator
//!                      │
//!                {seq}_out.pcm
//! ```
//!
//! Both loops are polled by one task; when either finishes the other is
//! dropped in the same step, then the transcription channel is closed.

use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt, Stream};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::connection::{ClientMessage, ServerMessage};
use crate::inbound::InboundLoop;
use crate::metrics;
use crate::outbound::OutboundLoop;
use duplex_voice_config::Settings;
use duplex_voice_core::{Error, Result, SpeechTranscriber, TranscriptionChannel, TranscriptionConfig};
use duplex_voice_pipeline::{SessionArtifacts, TurnOrchestrator};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Directory created and transcription connected
    Open,
    /// Loops running
    Running,
    Closed,
}

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// The client closed the connection or stopped sending
    ClientClosed,
    /// A session-fatal error ended it; the client was sent a close frame
    Failed(Error),
}

impl SessionOutcome {
    fn label(&self) -> &'static str {
        match self {
            SessionOutcome::ClientClosed => "client_closed",
            SessionOutcome::Failed(_) => "failed",
        }
    }
}

/// Registry entry for a live session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Registry {
    sessions: RwLock<HashMap<String, SessionInfo>>,
}

/// Removes a session from the registry when dropped
struct RegistryGuard {
    registry: Arc<Registry>,
    id: String,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.sessions.write().remove(&self.id);
    }
}

/// One live session
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    artifacts: SessionArtifacts,
    channel: TranscriptionChannel,
    state: SessionState,
    _guard: RegistryGuard,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("dir", &self.artifacts.dir())
            .field("state", &self.state)
            .finish()
    }
}

impl Session {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn artifacts(&self) -> &SessionArtifacts {
        &self.artifacts
    }
}

/// Opens and runs sessions
pub struct SessionManager {
    registry: Arc<Registry>,
    max_sessions: usize,
    base_dir: PathBuf,
    transcription: TranscriptionConfig,
    transcriber: Arc<dyn SpeechTranscriber>,
    orchestrator: TurnOrchestrator,
}

impl SessionManager {
    pub fn new(
        settings: &Settings,
        transcriber: Arc<dyn SpeechTranscriber>,
        orchestrator: TurnOrchestrator,
    ) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            max_sessions: settings.server.max_sessions,
            base_dir: settings.storage.base_dir.clone(),
            transcription: settings.transcription.clone(),
            transcriber,
            orchestrator,
        }
    }

    /// Number of live sessions
    pub fn count(&self) -> usize {
        self.registry.sessions.read().len()
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        self.registry.sessions.read().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<SessionInfo> {
        self.registry.sessions.read().get(id).cloned()
    }

    /// Reserve a registry slot, create the session directory and connect
    /// the transcription channel.
    ///
    /// Fails with [`Error::Capacity`], [`Error::Storage`] or
    /// [`Error::UpstreamConnect`]; the slot is released on failure.
    pub async fn open(&self) -> Result<Session> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let guard = self.reserve(&id, created_at)?;

        let artifacts = SessionArtifacts::create(&self.base_dir, &id).await?;
        let channel = self.transcriber.stream_transcribe(&self.transcription).await?;

        tracing::info!(
            session_id = %id,
            dir = %artifacts.dir().display(),
            engine = self.transcriber.name(),
            "Session opened"
        );
        metrics::record_session_opened(self.count());

        Ok(Session {
            id,
            created_at,
            artifacts,
            channel,
            state: SessionState::Open,
            _guard: guard,
        })
    }

    fn reserve(&self, id: &str, created_at: DateTime<Utc>) -> Result<RegistryGuard> {
        let mut sessions = self.registry.sessions.write();
        if sessions.len() >= self.max_sessions {
            return Err(Error::Capacity(format!(
                "maximum of {} concurrent sessions reached",
                self.max_sessions
            )));
        }
        sessions.insert(
            id.to_string(),
            SessionInfo {
                id: id.to_string(),
                created_at,
            },
        );

        Ok(RegistryGuard {
            registry: Arc::clone(&self.registry),
            id: id.to_string(),
        })
    }

    /// Drive an open session until the client leaves or a fatal error
    pub async fn run<S, E, K>(
        &self,
        mut session: Session,
        incoming: S,
        mut outgoing: K,
    ) -> SessionOutcome
    where
        S: Stream<Item = std::result::Result<ClientMessage, E>> + Unpin + Send,
        E: fmt::Display,
        K: Sink<ServerMessage> + Unpin + Send,
        K::Error: fmt::Display,
    {
        session.state = SessionState::Running;

        let (result, input_turns, output_turns) = {
            let (sink, events) = session.channel.split();
            let mut inbound = InboundLoop::new(&session.id, &session.artifacts, sink);
            let mut outbound = OutboundLoop::new(&session.id, &self.orchestrator, &session.artifacts);

            let result = tokio::select! {
                result = inbound.run(incoming) => result,
                result = outbound.run(events, &mut outgoing) => result,
            };
            (result, inbound.turns(), outbound.turns())
        };

        session.channel.close();
        session.state = SessionState::Closed;

        let outcome = match result {
            Ok(()) => SessionOutcome::ClientClosed,
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "Session failed");
                close_client(&mut outgoing, &e).await;
                SessionOutcome::Failed(e)
            }
        };

        let id = session.id.clone();
        drop(session);
        tracing::info!(
            session_id = %id,
            outcome = outcome.label(),
            input_turns,
            output_turns,
            "Session closed"
        );
        metrics::record_session_closed(outcome.label(), self.count());

        outcome
    }

    /// Open a session for a new connection and run it
    pub async fn serve<S, E, K>(&self, incoming: S, mut outgoing: K) -> SessionOutcome
    where
        S: Stream<Item = std::result::Result<ClientMessage, E>> + Unpin + Send,
        E: fmt::Display,
        K: Sink<ServerMessage> + Unpin + Send,
        K::Error: fmt::Display,
    {
        match self.open().await {
            Ok(session) => self.run(session, incoming, outgoing).await,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to open session");
                close_client(&mut outgoing, &e).await;
                SessionOutcome::Failed(e)
            }
        }
    }
}

async fn close_client<K>(outgoing: &mut K, err: &Error)
where
    K: Sink<ServerMessage> + Unpin,
    K::Error: fmt::Display,
{
    let close = ServerMessage::internal_error(&err.to_string());
    if let Err(e) = outgoing.send(close).await {
        tracing::debug!(error = %e, "Client already gone, close frame not sent");
    }
}
