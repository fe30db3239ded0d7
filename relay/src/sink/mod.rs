// HUD sinks: the display capability injected into the bridge.

use serde::Serialize;
use telemetry_core::model::messages::{HudTelemetry, ViewerSignal};
use telemetry_core::model::LapRecord;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::bridge::BridgeListener;
use crate::socket::{ConnectionState, Hop};
use crate::utils::now_epoch_ms;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
}

pub trait HudSink: Send + Sync {
    fn update_telemetry(&self, data: &HudTelemetry);

    fn show_message(&self, text: &str, severity: Severity);
}

/// Sink for headless runs: messages go to the log, telemetry is dropped.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl HudSink for LogSink {
    fn update_telemetry(&self, _data: &HudTelemetry) {}

    fn show_message(&self, text: &str, severity: Severity) {
        match severity {
            Severity::Info => info!(%text, "hud message"),
            Severity::Warning => warn!(%text, "hud message"),
        }
    }
}

#[derive(Serialize)]
struct HudFrame<'a, T: Serialize> {
    #[serde(rename = "type")]
    message_type: &'static str,
    timestamp_ms: u64,
    data: &'a T,
}

#[derive(Serialize)]
struct HudMessage<'a> {
    text: &'a str,
    severity: Severity,
}

#[derive(Serialize)]
struct HudStatus {
    hop: Hop,
    state: ConnectionState,
}

/// Fans HUD frames out to local display clients over the `/hud` websocket.
#[derive(Clone)]
pub struct BroadcastHudSink {
    tx: broadcast::Sender<String>,
}

impl BroadcastHudSink {
    pub fn new(tx: broadcast::Sender<String>) -> Self {
        Self { tx }
    }

    fn publish<T: Serialize>(&self, message_type: &'static str, data: &T) {
        let frame = HudFrame {
            message_type,
            timestamp_ms: now_epoch_ms(),
            data,
        };
        match serde_json::to_string(&frame) {
            // No subscribers is not an error; frames are live-only.
            Ok(payload) => {
                let _ = self.tx.send(payload);
            }
            Err(err) => debug!(?err, message_type, "hud frame encode failed"),
        }
    }
}

impl HudSink for BroadcastHudSink {
    fn update_telemetry(&self, data: &HudTelemetry) {
        self.publish("hud_telemetry", data);
    }

    fn show_message(&self, text: &str, severity: Severity) {
        self.publish("hud_message", &HudMessage { text, severity });
    }
}

impl BridgeListener for BroadcastHudSink {
    fn on_connection_state(&mut self, hop: Hop, state: ConnectionState) {
        self.publish("hud_status", &HudStatus { hop, state });
    }

    fn on_lap_completed(&mut self, lap: &LapRecord) {
        self.publish("hud_lap", lap);
    }

    fn on_viewers(&mut self, signal: &ViewerSignal) {
        self.publish("hud_viewers", signal);
    }
}
