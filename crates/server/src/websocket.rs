//! WebSocket Handler
//!
//! Adapts an axum WebSocket to the session's message stream and sink.
//! Binary frames carry PCM audio, text frames carry JSON control messages.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{future, SinkExt, StreamExt};

use crate::connection::{ClientMessage, ServerMessage};
use crate::session::SessionOutcome;
use crate::state::AppState;

/// `GET /ws/audio`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (tx, rx) = socket.split();
    let outgoing = tx.with(|message: ServerMessage| future::ready(Ok::<_, axum::Error>(to_ws(message))));
    let incoming = rx.filter_map(|frame| future::ready(from_ws(frame)));

    match state.sessions.serve(incoming, outgoing).await {
        SessionOutcome::ClientClosed => {}
        SessionOutcome::Failed(e) => {
            tracing::debug!(error = %e, "WebSocket session ended with error");
        }
    }
}

fn to_ws(message: ServerMessage) -> Message {
    match message {
        ServerMessage::Audio(data) => Message::Binary(data.to_vec()),
        ServerMessage::Close { code, reason } => Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })),
    }
}

/// Ping and pong frames are answered by axum and never reach the session
fn from_ws(
    frame: Result<Message, axum::Error>,
) -> Option<Result<ClientMessage, axum::Error>> {
    let message = match frame {
        Ok(message) => message,
        Err(e) => return Some(Err(e)),
    };

    match message {
        Message::Binary(data) => Some(Ok(ClientMessage::Audio(data.into()))),
        Message::Text(text) => Some(Ok(ClientMessage::Text(text))),
        Message::Close(_) => Some(Ok(ClientMessage::Close)),
        Message::Ping(_) | Message::Pong(_) => None,
    }
}
