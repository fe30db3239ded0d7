// Socket.IO-over-WebSocket client connection, one task per relay hop.
// Invariants: envelopes are written in queue order; nothing queued while disconnected is
// ever delivered after a reconnect; reconnect delay is constant.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use telemetry_core::packet::{self, OpenHandshake, Packet};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::bridge::BridgeInput;
use crate::constants::SOCKET_IO_PATH;
use crate::error::RelayError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Hop {
    Local,
    Cloud,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// One named event and its raw JSON payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub event: String,
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub hop: Hop,
    pub url: String,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
}

enum SessionEnd {
    Shutdown,
    Dropped,
}

/// Maps a configured base URL to the Engine.IO WebSocket endpoint.
pub fn socket_url(base: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        format!("ws://{base}")
    };
    if base.contains("/socket.io") {
        base
    } else {
        format!("{base}{SOCKET_IO_PATH}")
    }
}

pub async fn connection_loop(
    config: ConnectionConfig,
    mut outbound: mpsc::Receiver<Envelope>,
    inputs: mpsc::Sender<BridgeInput>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), RelayError> {
    let hop = config.hop;
    let url = socket_url(&config.url);

    loop {
        if *shutdown.borrow() {
            break;
        }

        publish_state(&inputs, hop, ConnectionState::Connecting).await?;
        debug!(?hop, %url, "connecting");
        let attempt = tokio::select! {
            _ = shutdown.changed() => {
                publish_state(&inputs, hop, ConnectionState::Disconnected).await?;
                break;
            }
            attempt = time::timeout(config.connect_timeout, handshake(&url)) => attempt,
        };

        match attempt {
            Ok(Ok((socket, open))) => {
                info!(?hop, %url, sid = %open.sid, "connected");
                discard_pending(&mut outbound);
                publish_state(&inputs, hop, ConnectionState::Connected).await?;
                let outcome =
                    run_session(hop, socket, &open, &mut outbound, &inputs, &mut shutdown).await;
                publish_state(&inputs, hop, ConnectionState::Disconnected).await?;
                match outcome {
                    Ok(SessionEnd::Shutdown) => break,
                    Ok(SessionEnd::Dropped) => warn!(?hop, "connection closed by peer"),
                    Err(RelayError::BridgeClosed) => return Err(RelayError::BridgeClosed),
                    Err(err) => warn!(?hop, ?err, "connection dropped"),
                }
            }
            Ok(Err(err)) => {
                publish_state(&inputs, hop, ConnectionState::Disconnected).await?;
                warn!(?hop, ?err, "connect failed");
            }
            Err(_) => {
                publish_state(&inputs, hop, ConnectionState::Disconnected).await?;
                warn!(?hop, err = ?RelayError::ConnectTimeout(config.connect_timeout), "connect failed");
            }
        }

        let mut discarded = discard_pending(&mut outbound);

        let delay = time::sleep(config.reconnect_delay);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                _ = &mut delay => break,
                _ = shutdown.changed() => return Ok(()),
                envelope = outbound.recv() => {
                    if envelope.is_none() {
                        return Ok(());
                    }
                    discarded += 1;
                }
            }
        }
        if discarded > 0 {
            debug!(?hop, discarded, "outbound discarded while disconnected");
        }
    }

    Ok(())
}

fn discard_pending(outbound: &mut mpsc::Receiver<Envelope>) -> usize {
    let mut discarded = 0;
    while outbound.try_recv().is_ok() {
        discarded += 1;
    }
    discarded
}

async fn publish_state(
    inputs: &mpsc::Sender<BridgeInput>,
    hop: Hop,
    state: ConnectionState,
) -> Result<(), RelayError> {
    inputs
        .send(BridgeInput::State { hop, state })
        .await
        .map_err(|_| RelayError::BridgeClosed)
}

async fn handshake(url: &str) -> Result<(WsStream, OpenHandshake), RelayError> {
    let (mut socket, _) = connect_async(url).await?;

    let open = loop {
        match next_packet(&mut socket).await? {
            Packet::Open(open) => break open,
            Packet::Ping(payload) => send_packet(&mut socket, &Packet::Pong(payload)).await?,
            Packet::Close => return Err(RelayError::Closed),
            _ => {}
        }
    };

    send_packet(&mut socket, &Packet::Connect(None)).await?;
    loop {
        match next_packet(&mut socket).await? {
            Packet::Connect(_) => return Ok((socket, open)),
            Packet::ConnectError(data) => return Err(RelayError::Rejected(data.to_string())),
            Packet::Ping(payload) => send_packet(&mut socket, &Packet::Pong(payload)).await?,
            Packet::Close | Packet::Disconnect => return Err(RelayError::Closed),
            _ => {}
        }
    }
}

async fn next_packet(socket: &mut WsStream) -> Result<Packet, RelayError> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => return Ok(packet::decode(&text)?),
            Some(Ok(Message::Close(_))) | None => return Err(RelayError::Closed),
            Some(Ok(_)) => continue,
            Some(Err(err)) => return Err(err.into()),
        }
    }
}

async fn send_packet(socket: &mut WsStream, packet: &Packet) -> Result<(), RelayError> {
    socket.send(Message::Text(packet.encode())).await?;
    Ok(())
}

async fn run_session(
    hop: Hop,
    mut socket: WsStream,
    open: &OpenHandshake,
    outbound: &mut mpsc::Receiver<Envelope>,
    inputs: &mpsc::Sender<BridgeInput>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<SessionEnd, RelayError> {
    let liveness = Duration::from_millis(open.ping_interval.saturating_add(open.ping_timeout));
    let deadline = time::sleep(liveness);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                close_socket(&mut socket).await;
                return Ok(SessionEnd::Shutdown);
            }
            _ = &mut deadline => return Err(RelayError::PingTimeout(liveness)),
            envelope = outbound.recv() => {
                let Some(envelope) = envelope else {
                    close_socket(&mut socket).await;
                    return Ok(SessionEnd::Shutdown);
                };
                send_packet(&mut socket, &Packet::event(envelope.event, envelope.data)).await?;
            }
            inbound = socket.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        deadline.as_mut().reset(Instant::now() + liveness);
                        match packet::decode(&text) {
                            Ok(Packet::Ping(payload)) => {
                                send_packet(&mut socket, &Packet::Pong(payload)).await?;
                            }
                            Ok(Packet::Event { name, data }) => {
                                inputs
                                    .send(BridgeInput::Event {
                                        hop,
                                        envelope: Envelope::new(name, data),
                                    })
                                    .await
                                    .map_err(|_| RelayError::BridgeClosed)?;
                            }
                            Ok(Packet::Close) | Ok(Packet::Disconnect) => return Ok(SessionEnd::Dropped),
                            Ok(_) => {}
                            Err(err) => debug!(?hop, ?err, "undecodable frame"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Dropped),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Err(err.into()),
                }
            }
        }
    }
}

async fn close_socket(socket: &mut WsStream) {
    let _ = send_packet(socket, &Packet::Disconnect).await;
    let _ = socket.close(None).await;
}
