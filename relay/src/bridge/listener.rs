// Capability-typed subscribers notified by the bridge within the same actor turn.

use telemetry_core::model::messages::ViewerSignal;
use telemetry_core::model::LapRecord;

use crate::socket::{ConnectionState, Hop};

/// Called in registration order; implementations must not block.
pub trait BridgeListener: Send {
    fn on_connection_state(&mut self, _hop: Hop, _state: ConnectionState) {}

    fn on_lap_completed(&mut self, _lap: &LapRecord) {}

    fn on_viewers(&mut self, _signal: &ViewerSignal) {}
}
