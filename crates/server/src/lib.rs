//! Duplex Voice Server
//!
//! Provides the WebSocket session endpoint and the HTTP health/metrics
//! endpoints.

pub mod connection;
pub mod http;
mod inbound;
pub mod metrics;
mod outbound;
pub mod session;
pub mod state;
pub mod websocket;

pub use connection::{ClientMessage, ServerMessage};
pub use http::create_router;
pub use metrics::init_metrics;
pub use session::{Session, SessionInfo, SessionManager, SessionOutcome, SessionState};
pub use state::AppState;

use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::SessionNotFound(_) => axum::http::StatusCode::NOT_FOUND,
        }
    }
}
