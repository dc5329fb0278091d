//! `WebSocket` transport for development clients.
//!
//! Clients connect to `GET /ws`. Each socket gets one [`Session`]: server
//! messages are forwarded as JSON text frames, and text frames from the
//! client are parsed as [`ClientEvent`]s. Closing the socket disconnects
//! the session, which leaves every room it joined.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use livequery_core::{ClientEvent, Session, TransportHandle};
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` connection.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_results(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let Some(transport) = state.hub.transport() else {
        return ApiError::Unavailable(String::from("hub is not initialized")).into_response();
    };
    ws.on_upgrade(move |socket| handle_ws(socket, transport))
}

/// Drive one socket until either side goes away.
async fn handle_ws(mut socket: WebSocket, transport: TransportHandle) {
    let mut session = match transport.connect().await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "rejecting WebSocket client");
            return;
        }
    };
    debug!(connection = %session.id(), "WebSocket client connected");

    loop {
        tokio::select! {
            // Outbound: results addressed to this connection.
            outbound = session.recv() => {
                let Some(message) = outbound else {
                    debug!("hub shut down, closing WebSocket");
                    if socket.send(Message::Close(None)).await.is_err() {
                        debug!("close frame not delivered");
                    }
                    break;
                };
                let json = match serde_json::to_string(&message) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!("Failed to serialize server message: {e}");
                        continue;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    debug!("WebSocket client disconnected (send failed)");
                    break;
                }
            }
            // Inbound: client events and control frames.
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => dispatch(&session, text.as_str()).await,
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        break;
                    }
                    _ => {
                        // Binary and pong frames carry no events.
                    }
                }
            }
        }
    }

    session.disconnect().await;
}

/// Parse a text frame and hand it to the session. Garbage is logged and
/// dropped; it never closes the connection.
async fn dispatch(session: &Session, text: &str) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => session.handle(event).await,
        Err(e) => warn!(connection = %session.id(), error = %e, "ignoring malformed client event"),
    }
}
