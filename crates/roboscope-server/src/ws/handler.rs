//! Signaling relay
//!
//! One message loop per viewer connection. Each message is handled
//! independently: malformed JSON, unknown types, or a session error during
//! dispatch never terminate the loop. The loop ends only when the WebSocket
//! closes, at which point the connection's session is removed and closed.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use roboscope_protocol::{ClientMessage, ServerMessage};

use crate::session::{Session, SessionConfig};
use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    // Outbound messages funnel through a channel so dispatch handlers and
    // the loop itself share one writer.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    tracing::info!("Viewer connected: {}", connection_id);

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let client_msg: ClientMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!("Ignoring malformed message from {}: {}", connection_id, e);
                        continue;
                    }
                };

                handle_client_message(&state, connection_id, &tx, client_msg).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::error!("WebSocket error on connection {}: {}", connection_id, e);
                break;
            }
            _ => {}
        }
    }

    // The viewer is gone; tear down whatever session it negotiated.
    state.sessions.remove(connection_id).await;
    send_task.abort();

    tracing::info!("Viewer disconnected: {}", connection_id);
}

async fn handle_client_message(
    state: &AppState,
    connection_id: Uuid,
    tx: &mpsc::UnboundedSender<String>,
    message: ClientMessage,
) {
    match message {
        ClientMessage::Offer { sdp } => {
            // Create-or-replace: a fresh offer always gets a fresh session.
            let session = Session::new(
                SessionConfig::from(&state.config),
                state.source.clone(),
                state.control.clone(),
            );
            state
                .sessions
                .replace(connection_id, session.clone())
                .await;

            match session.handle_offer(sdp).await {
                Ok(answer) => send(tx, &ServerMessage::Answer { sdp: answer.sdp }),
                Err(e) => {
                    tracing::error!("Offer from {} failed: {}", connection_id, e);
                    send(
                        tx,
                        &ServerMessage::Error {
                            message: e.to_string(),
                        },
                    );
                }
            }
        }
        ClientMessage::IceCandidate { candidate } => {
            match state.sessions.get(connection_id).await {
                Some(session) => session.add_ice_candidate(candidate).await,
                None => {
                    tracing::debug!(
                        "Dropping ICE candidate from {} with no session",
                        connection_id
                    );
                }
            }
        }
        ClientMessage::Ping => send(tx, &ServerMessage::Pong),
    }
}

fn send(tx: &mpsc::UnboundedSender<String>, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(json) => {
            if tx.send(json).is_err() {
                tracing::debug!("Viewer hung up before message could be sent");
            }
        }
        Err(e) => tracing::error!("Failed to serialize message: {}", e),
    }
}
