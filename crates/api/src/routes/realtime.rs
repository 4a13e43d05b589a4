//! Realtime WebSocket endpoint.
//!
//! Each socket is split into a writer task draining the connection's hub
//! queue and a reader task applying subscription frames. Whichever finishes
//! first tears the other down and the connection leaves every room.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::debug;

use crate::app::AppState;
use crate::services::RealtimeHub;

/// Query parameters of the WebSocket handshake.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectQuery {
    /// Joins the user's risk alert channel when present.
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// GET /ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
) -> Response {
    let user_id = query.user_id.filter(|id| !id.trim().is_empty());
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub, user_id))
}

async fn handle_socket(socket: WebSocket, hub: Arc<RealtimeHub>, user_id: Option<String>) {
    let (id, mut outbound) = hub.register(user_id);
    let (mut sink, mut stream) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Text(frame.to_string())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reader_hub = hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => reader_hub.handle_frame(id, &text),
                Ok(Message::Close(_)) => break,
                // Pings are answered by axum; binary frames are not part of the protocol
                Ok(_) => {}
                Err(e) => {
                    debug!(connection_id = %id, error = %e, "WebSocket read failed");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unregister(id);
}
