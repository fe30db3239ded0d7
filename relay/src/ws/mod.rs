// WebSocket transport for local HUD display clients.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State as AxumState;
use axum::response::IntoResponse;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::app::{AppState, BridgeStatus};
use crate::utils::{monotonic_ms, now_epoch_ms};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HudHello {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub timestamp_ms: u64,
    pub monotonic_ms: u64,
    pub server_version: &'static str,
    pub capabilities: Vec<&'static str>,
    pub status: BridgeStatus,
}

pub async fn hud_handler(
    AxumState(app_state): AxumState<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(mut socket: WebSocket, app_state: AppState) {
    info!("hud client connected");
    let mut rx = app_state.hud_tx.subscribe();
    let mut shutdown = app_state.shutdown_rx.clone();
    let hello = HudHello {
        message_type: "hud_hello",
        timestamp_ms: now_epoch_ms(),
        monotonic_ms: monotonic_ms(app_state.start_instant),
        server_version: env!("CARGO_PKG_VERSION"),
        capabilities: vec!["hud_telemetry", "hud_message", "hud_status", "hud_lap", "hud_viewers"],
        status: app_state.status_rx.borrow().clone(),
    };

    if let Ok(payload) = serde_json::to_string(&hello) {
        if socket.send(Message::Text(payload)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            outbound = rx.recv() => {
                match outbound {
                    Ok(payload) => {
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "hud client lagging");
                        continue;
                    }
                    Err(_) => break,
                }
            }
            inbound = socket.next() => {
                match inbound {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(?err, "hud ws error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
    info!("hud client disconnected");
}
