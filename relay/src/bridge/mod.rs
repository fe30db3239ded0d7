// Relay bridge actor: routes events between the local and cloud hops.
// Invariants: all bridge state is owned by one task; forwards to a hop that is not
// connected are dropped, never queued; listeners run in registration order.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use telemetry_core::model::messages::{
    self, EngineerUpdate, Incident, LapCompleted, RegisterRequest, SessionMetadata,
    TelemetryPayload, ViewerSignal,
};
use telemetry_core::model::LapRecord;
use telemetry_core::session::LapTracker;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::app::{BridgeCounters, BridgeStatus, DriverLapsResponse, LinkStatus, StateTransition};
use crate::constants::TRANSITION_HISTORY;
use crate::rate::RateController;
use crate::sink::{HudSink, Severity};
use crate::socket::{ConnectionState, Envelope, Hop};
use crate::utils::now_epoch_ms;

mod listener;
pub use listener::BridgeListener;

#[derive(Debug)]
pub enum BridgeInput {
    State {
        hop: Hop,
        state: ConnectionState,
    },
    Event {
        hop: Hop,
        envelope: Envelope,
    },
    QueryLaps {
        driver_id: String,
        reply: oneshot::Sender<DriverLapsResponse>,
    },
}

struct Link {
    tx: Option<mpsc::Sender<Envelope>>,
    state: ConnectionState,
    /// Last event received from the hop.
    last_inbound_ms: Option<u64>,
    /// Last envelope queued toward the hop.
    last_outbound_ms: Option<u64>,
}

impl Link {
    fn new(tx: Option<mpsc::Sender<Envelope>>) -> Self {
        Self {
            tx,
            state: ConnectionState::Disconnected,
            last_inbound_ms: None,
            last_outbound_ms: None,
        }
    }

    fn status(&self) -> LinkStatus {
        LinkStatus {
            state: self.state,
            last_inbound_ms: self.last_inbound_ms,
            last_outbound_ms: self.last_outbound_ms,
        }
    }
}

pub struct RelayBridge {
    tracker: LapTracker,
    session_id: Option<String>,
    sim_connected: Option<bool>,
    local: Link,
    cloud: Link,
    rate: RateController,
    hud: Option<Arc<dyn HudSink>>,
    hud_expected: bool,
    hud_missing_logged: bool,
    listeners: Vec<Box<dyn BridgeListener>>,
    counters: BridgeCounters,
    transitions: VecDeque<StateTransition>,
    status_tx: watch::Sender<BridgeStatus>,
}

impl RelayBridge {
    /// `cloud_tx` is `None` when the cloud hop is disabled.
    pub fn new(local_tx: mpsc::Sender<Envelope>, cloud_tx: Option<mpsc::Sender<Envelope>>) -> Self {
        let cloud_enabled = cloud_tx.is_some();
        let (status_tx, _) = watch::channel(BridgeStatus {
            cloud_enabled,
            ..BridgeStatus::default()
        });
        Self {
            tracker: LapTracker::new(),
            session_id: None,
            sim_connected: None,
            local: Link::new(Some(local_tx)),
            cloud: Link::new(cloud_tx),
            rate: RateController::new(),
            hud: None,
            hud_expected: false,
            hud_missing_logged: false,
            listeners: Vec::new(),
            counters: BridgeCounters::default(),
            transitions: VecDeque::with_capacity(TRANSITION_HISTORY),
            status_tx,
        }
    }

    pub fn with_hud(mut self, sink: Arc<dyn HudSink>) -> Self {
        self.hud = Some(sink);
        self
    }

    /// Marks the HUD as required so its absence is reported.
    pub fn expect_hud(mut self, expected: bool) -> Self {
        self.hud_expected = expected;
        self
    }

    pub fn subscribe(&mut self, listener: Box<dyn BridgeListener>) {
        self.listeners.push(listener);
    }

    pub fn status_receiver(&self) -> watch::Receiver<BridgeStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> BridgeStatus {
        BridgeStatus {
            local: self.local.status(),
            cloud: self.cloud.status(),
            cloud_enabled: self.cloud.tx.is_some(),
            session_id: self.session_id.clone(),
            sim_connected: self.sim_connected,
            viewers: self.rate.last_signal(),
            rate: self.rate.target(),
            counters: self.counters,
            transitions: self.transitions.iter().copied().collect(),
        }
    }

    pub fn tracker(&self) -> &LapTracker {
        &self.tracker
    }

    pub fn handle(&mut self, input: BridgeInput) {
        match input {
            BridgeInput::State { hop, state } => self.on_state(hop, state),
            BridgeInput::Event { hop, envelope } => {
                self.link_mut(hop).last_inbound_ms = Some(now_epoch_ms());
                match hop {
                    Hop::Local => self.on_local_event(envelope),
                    Hop::Cloud => self.on_cloud_event(envelope),
                }
            }
            BridgeInput::QueryLaps { driver_id, reply } => {
                let _ = reply.send(self.driver_laps(&driver_id));
            }
        }
        self.status_tx.send_replace(self.status());
    }

    /// Best-effort send; returns whether the envelope was queued on the hop.
    pub fn forward(&mut self, hop: Hop, envelope: Envelope) -> bool {
        let link = match hop {
            Hop::Local => &mut self.local,
            Hop::Cloud => &mut self.cloud,
        };
        let Some(tx) = link.tx.as_ref() else {
            self.counters.dropped_disconnected += 1;
            return false;
        };
        if link.state != ConnectionState::Connected {
            self.counters.dropped_disconnected += 1;
            debug!(?hop, event = %envelope.event, "dropped: hop not connected");
            return false;
        }
        match tx.try_send(envelope) {
            Ok(()) => {
                link.last_outbound_ms = Some(now_epoch_ms());
                match hop {
                    Hop::Local => self.counters.forwarded_local += 1,
                    Hop::Cloud => self.counters.forwarded_cloud += 1,
                }
                true
            }
            Err(TrySendError::Full(envelope)) => {
                self.counters.dropped_queue_full += 1;
                debug!(?hop, event = %envelope.event, "dropped: outbound queue full");
                false
            }
            Err(TrySendError::Closed(envelope)) => {
                self.counters.dropped_disconnected += 1;
                debug!(?hop, event = %envelope.event, "dropped: outbound queue closed");
                false
            }
        }
    }

    fn link_mut(&mut self, hop: Hop) -> &mut Link {
        match hop {
            Hop::Local => &mut self.local,
            Hop::Cloud => &mut self.cloud,
        }
    }

    fn on_state(&mut self, hop: Hop, state: ConnectionState) {
        let link = self.link_mut(hop);
        let from = link.state;
        if from == state {
            return;
        }
        link.state = state;

        info!(?hop, ?from, to = ?state, "connection state");
        if self.transitions.len() >= TRANSITION_HISTORY {
            self.transitions.pop_front();
        }
        self.transitions.push_back(StateTransition {
            at_ms: now_epoch_ms(),
            hop,
            from,
            to: state,
        });
        for listener in self.listeners.iter_mut() {
            listener.on_connection_state(hop, state);
        }

        if hop == Hop::Cloud && state == ConnectionState::Connected {
            self.register_session();
        }
    }

    fn on_local_event(&mut self, envelope: Envelope) {
        match envelope.event.as_str() {
            messages::TELEMETRY => {
                self.on_telemetry(&envelope.data);
                self.forward(Hop::Cloud, envelope);
            }
            messages::TELEMETRY_BASELINE
            | messages::TELEMETRY_CONTROLS
            | messages::EVENT
            | messages::STRATEGY_UPDATE => {
                self.forward(Hop::Cloud, envelope);
            }
            messages::INCIDENT => {
                match Incident::deserialize(&envelope.data) {
                    Ok(incident) => info!(
                        severity = ?incident.severity,
                        lap = incident.lap,
                        corner = incident.corner,
                        cars = ?incident.cars,
                        "incident"
                    ),
                    Err(err) => debug!(?err, "incident with unexpected shape"),
                }
                self.forward(Hop::Cloud, envelope);
            }
            messages::SESSION_METADATA => {
                match SessionMetadata::deserialize(&envelope.data) {
                    Ok(metadata) => self.on_session(metadata.session_id),
                    Err(err) => debug!(?err, "session_metadata without sessionId"),
                }
                self.forward(Hop::Cloud, envelope);
            }
            messages::SIM_STATUS => {
                let connected = envelope.data.get("simConnected").and_then(Value::as_bool);
                if connected.is_some() && connected != self.sim_connected {
                    info!(sim_connected = ?connected, "simulator status");
                }
                self.sim_connected = connected;
            }
            other => debug!(event = %other, "unhandled local event"),
        }
    }

    fn on_cloud_event(&mut self, envelope: Envelope) {
        match envelope.event.as_str() {
            messages::RELAY_VIEWERS => {
                match ViewerSignal::deserialize(&envelope.data) {
                    Ok(signal) => {
                        self.counters.viewer_signals += 1;
                        self.rate.observe(signal);
                        for listener in self.listeners.iter_mut() {
                            listener.on_viewers(&signal);
                        }
                    }
                    Err(err) => debug!(?err, "undecodable viewer signal"),
                }
                self.forward(Hop::Local, envelope);
            }
            messages::ENGINEER_UPDATE => {
                match serde_json::from_value::<EngineerUpdate>(envelope.data) {
                    Ok(update) => self.on_engineer_update(update),
                    Err(err) => debug!(?err, "undecodable engineer update"),
                }
            }
            other => debug!(event = %other, "unhandled cloud event"),
        }
    }

    fn on_session(&mut self, session_id: String) {
        if self.session_id.as_deref() == Some(session_id.as_str()) {
            self.register_session();
            return;
        }
        if self.session_id.is_some() {
            info!(%session_id, "session changed; resetting lap tracker");
            self.tracker.reset();
        } else {
            info!(%session_id, "session started");
        }
        self.session_id = Some(session_id);
        self.register_session();
    }

    fn register_session(&mut self) {
        let Some(session_id) = self.session_id.clone() else {
            return;
        };
        if self.cloud.state != ConnectionState::Connected {
            return;
        }
        match serde_json::to_value(RegisterRequest { session_id }) {
            Ok(data) => {
                self.forward(Hop::Cloud, Envelope::new(messages::RELAY_REGISTER, data));
            }
            Err(err) => warn!(?err, "register encode failed"),
        }
    }

    fn on_telemetry(&mut self, data: &Value) {
        let payload = match TelemetryPayload::deserialize(data) {
            Ok(payload) => payload,
            Err(err) => {
                debug!(?err, "telemetry not decodable for tracker");
                return;
            }
        };

        let fallback_time_ms = payload.fallback_time_ms();
        for car in &payload.cars {
            let Some(tick) = car.to_tick(fallback_time_ms) else {
                continue;
            };
            if !tick.has_valid_distance() {
                debug!(driver_id = %tick.driver_id, lap_dist_pct = tick.lap_dist_pct, "tick skipped");
                continue;
            }
            if let Some(lap) = self.tracker.process_tick(&tick) {
                self.on_lap_completed(lap);
            }
        }

        let Some(car) = payload.player_car() else {
            return;
        };
        let mut hud = car.to_hud();
        if hud.fuel_laps.is_none() {
            if let (Some(driver_id), Some(fuel_level)) = (car.driver_key(), car.fuel_level) {
                hud.fuel_laps = self.tracker.fuel_laps_remaining(&driver_id, fuel_level);
            }
        }
        match self.hud.as_ref() {
            Some(sink) => sink.update_telemetry(&hud),
            None => self.note_missing_hud(),
        }
    }

    fn on_lap_completed(&mut self, lap: LapRecord) {
        self.counters.laps_completed += 1;
        info!(
            driver_id = %lap.driver_id,
            lap_number = lap.lap_number,
            lap_time_ms = lap.lap_time_ms,
            clean = lap.is_clean(),
            "lap completed"
        );
        for listener in self.listeners.iter_mut() {
            listener.on_lap_completed(&lap);
        }

        let payload = LapCompleted {
            session_id: self.session_id.as_deref(),
            lap: &lap,
        };
        match serde_json::to_value(payload) {
            Ok(data) => {
                self.forward(Hop::Cloud, Envelope::new(messages::LAP_COMPLETED, data));
            }
            Err(err) => warn!(?err, "lap encode failed"),
        }
    }

    fn on_engineer_update(&mut self, update: EngineerUpdate) {
        for message in &update.updates {
            self.counters.engineer_messages += 1;
            let severity = if message.is_urgent() {
                Severity::Warning
            } else {
                Severity::Info
            };
            debug!(kind = %message.kind, priority = %message.priority, "engineer message");
            match self.hud.as_ref() {
                Some(sink) => sink.show_message(&message.message, severity),
                None => self.note_missing_hud(),
            }
        }
    }

    fn note_missing_hud(&mut self) {
        if self.hud_expected && !self.hud_missing_logged {
            warn!("hud enabled but no hud sink attached");
            self.hud_missing_logged = true;
        }
    }

    fn driver_laps(&self, driver_id: &str) -> DriverLapsResponse {
        DriverLapsResponse {
            driver_id: driver_id.to_string(),
            laps: self.tracker.driver_laps(driver_id).to_vec(),
            clean_laps: self
                .tracker
                .clean_laps(driver_id)
                .into_iter()
                .cloned()
                .collect(),
            best_lap: self.tracker.best_lap(driver_id).cloned(),
            fuel_per_lap: self.tracker.fuel_per_lap(driver_id),
            pit_stops: self.tracker.pit_stops(driver_id),
        }
    }
}

/// Drives the bridge until every input sender is gone.
pub async fn bridge_task(mut bridge: RelayBridge, mut inputs: mpsc::Receiver<BridgeInput>) {
    while let Some(input) = inputs.recv().await {
        bridge.handle(input);
    }
    let counters = bridge.counters;
    info!(?counters, "bridge stopped");
}
