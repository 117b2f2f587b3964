//! `WebSocket` handler for the bidirectional control channel.
//!
//! Each connected client receives every dispatched simulation event as
//! a JSON text frame, in dispatch order, and may send control frames
//! (`{"action":"start"|"pause"|"resume"|"shutdown"}`) back. Malformed
//! frames and unknown actions are logged and ignored.
//!
//! Clients get no snapshot of prior state on connect; they see the
//! stream from their subscription point onward. A client that cannot
//! keep up with the broadcast is disconnected -- the simulation is never
//! blocked by a slow observer.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use scarab_core::control::ControlFrame;
use tracing::{debug, warn};

use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` connection.
///
/// # Route
///
/// `GET /`
pub async fn ws_control(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Drive one client connection: fan out broadcast frames and forward
/// control commands until the client disconnects or lags out.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("control client connected");

    let mut rx = state.subscribe();

    loop {
        tokio::select! {
            // A dispatched event frame to forward.
            result = rx.recv() => {
                match result {
                    Ok(frame) => {
                        let msg = Message::Text(frame.as_ref().into());
                        if socket.send(msg).await.is_err() {
                            debug!("control client disconnected (send failed)");
                            return;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "control client too slow, disconnecting");
                        return;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!("broadcast closed, ending connection");
                        return;
                    }
                }
            }
            // A frame from the client.
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match ControlFrame::parse(&text) {
                            Some(command) => state.submit_command(command),
                            None => warn!(frame = %text, "ignoring unusable control frame"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("control client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("control client disconnected");
                        return;
                    }
                    Some(Err(err)) => {
                        debug!(error = %err, "websocket error, ending connection");
                        return;
                    }
                    _ => {
                        // Binary and pong frames are ignored; the
                        // protocol is text-only.
                    }
                }
            }
        }
    }
}
