// Application state and shared status snapshots for the relay.

use serde::Serialize;
use telemetry_core::model::messages::ViewerSignal;
use telemetry_core::model::LapRecord;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

use crate::bridge::BridgeInput;
use crate::rate::RateTarget;
use crate::socket::{ConnectionState, Hop};

#[derive(Clone)]
pub struct AppState {
    pub status_rx: watch::Receiver<BridgeStatus>,
    pub bridge_tx: mpsc::Sender<BridgeInput>,
    pub hud_tx: broadcast::Sender<String>,
    pub shutdown_rx: watch::Receiver<bool>,
    pub kill_switch: bool,
    pub start_instant: Instant,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatus {
    pub state: ConnectionState,
    pub last_inbound_ms: Option<u64>,
    pub last_outbound_ms: Option<u64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeCounters {
    pub forwarded_cloud: u64,
    pub forwarded_local: u64,
    pub dropped_disconnected: u64,
    pub dropped_queue_full: u64,
    pub laps_completed: u64,
    pub viewer_signals: u64,
    pub engineer_messages: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransition {
    pub at_ms: u64,
    pub hop: Hop,
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Read-only view of the bridge, republished after every input it handles.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub local: LinkStatus,
    pub cloud: LinkStatus,
    pub cloud_enabled: bool,
    pub session_id: Option<String>,
    pub sim_connected: Option<bool>,
    pub viewers: Option<ViewerSignal>,
    pub rate: RateTarget,
    pub counters: BridgeCounters,
    pub transitions: Vec<StateTransition>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLapsResponse {
    pub driver_id: String,
    pub laps: Vec<LapRecord>,
    pub clean_laps: Vec<LapRecord>,
    pub best_lap: Option<LapRecord>,
    pub fuel_per_lap: Option<f32>,
    pub pit_stops: u32,
}
