//! WebSocket endpoint for real-time notifications.
//!
//! One connection per user; the hub closes the prior connection when a new
//! one registers. Browser clients cannot set headers on the upgrade
//! request, so the bearer token is also accepted as `?token=`.
//!
//! Liveness: the write pump pings every 54 seconds; the read pump holds a
//! 60-second deadline that only a pong extends. A silent peer is
//! disconnected and must reconnect and re-fetch state.

use crate::auth::AuthUser;
use crate::hub::{NotificationHub, WsEvent};
use crate::server::AppState;
use crate::types::UserId;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant};
use tracing::{debug, info};

/// Server-side keep-alive ping interval.
const PING_INTERVAL: Duration = Duration::from_secs(54);

/// Read deadline, extended only by a pong.
const READ_DEADLINE: Duration = Duration::from_secs(60);

/// GET `/ws` (upgrade). Token via `Authorization` header or `?token=`.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn ws_handler(
    State(state): State<AppState>,
    user: AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    info!(user_id = %user.user_id, "WebSocket connection requested");
    ws.on_upgrade(move |socket| handle_socket(socket, user.user_id, state.hub.clone()))
}

async fn handle_socket(socket: WebSocket, user_id: UserId, hub: Arc<NotificationHub>) {
    let registration = hub.register(user_id);
    let connection_id = registration.connection_id;
    let mut outbound = registration.receiver;

    hub.unicast(
        user_id,
        &WsEvent::WsConnected {
            message: "Connected to real-time update hub".to_string(),
        },
    );

    let (mut sender, mut receiver) = socket.split();

    // Write pump: drain the hub's outbound buffer, pinging on the side.
    // The hub dropping our sender (replacement or backpressure) ends the
    // channel and closes the socket.
    let mut write_task = tokio::spawn(async move {
        let mut ping = interval(PING_INTERVAL);
        ping.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                frame = outbound.recv() => match frame {
                    Some(text) => {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    }
                },
                _ = ping.tick() => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }

        debug!(user_id = %user_id, "WebSocket write pump terminated");
    });

    // Read pump: watch for pongs and close, under the read deadline.
    let mut read_task = tokio::spawn(async move {
        let deadline = tokio::time::sleep(READ_DEADLINE);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                msg = receiver.next() => match msg {
                    Some(Ok(Message::Pong(_))) => {
                        deadline.as_mut().reset(Instant::now() + READ_DEADLINE);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(user_id = %user_id, "client closed WebSocket");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Inbound application messages are not part of the
                        // protocol; clients only listen.
                    }
                    Some(Err(e)) => {
                        debug!(user_id = %user_id, error = %e, "WebSocket read error");
                        break;
                    }
                },
                () = &mut deadline => {
                    debug!(user_id = %user_id, "WebSocket read deadline expired");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut write_task => read_task.abort(),
        _ = &mut read_task => write_task.abort(),
    }

    hub.unregister(user_id, connection_id);
    info!(user_id = %user_id, "WebSocket connection closed");
}
