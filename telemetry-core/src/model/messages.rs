// Boundary message names and payload shapes exchanged with the simulator bridge and the cloud.
// Invariants: decoding is lenient (unknown fields ignored); forwarded payloads stay raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{LapRecord, TelemetryTick, TireWear};

pub const TELEMETRY: &str = "telemetry";
pub const TELEMETRY_BASELINE: &str = "telemetry:baseline";
pub const TELEMETRY_CONTROLS: &str = "telemetry:controls";
pub const EVENT: &str = "event";
pub const INCIDENT: &str = "incident";
pub const STRATEGY_UPDATE: &str = "strategy_update";
pub const SESSION_METADATA: &str = "session_metadata";
pub const SIM_STATUS: &str = "status";
pub const RELAY_REGISTER: &str = "relay:register";
pub const RELAY_VIEWERS: &str = "relay:viewers";
pub const RELAY_METRICS: &str = "relay:metrics";
pub const ENGINEER_UPDATE: &str = "engineer:update";
pub const LAP_COMPLETED: &str = "lap:completed";

/// Telemetry frame as sent by the simulator bridge. Each car decodes on its own;
/// a car that is not a JSON object is skipped instead of failing the frame.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPayload {
    #[serde(default, deserialize_with = "lenient::cars")]
    pub cars: Vec<CarTelemetry>,
    #[serde(default, deserialize_with = "lenient::float64")]
    pub timestamp: Option<f64>,
    /// Simulator session clock in seconds.
    #[serde(default, deserialize_with = "lenient::float64")]
    pub session_time: Option<f64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TrackPosition {
    #[serde(default, deserialize_with = "lenient::float32")]
    pub s: Option<f32>,
}

/// Numeric fields accept any JSON number (or numeric string); producers send
/// integers such as `gear` and `lap` as floats.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarTelemetry {
    #[serde(default)]
    pub driver_id: Option<Value>,
    #[serde(default)]
    pub car_id: Option<Value>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_player: Option<bool>,
    #[serde(default, deserialize_with = "lenient::float32")]
    pub speed: Option<f32>,
    #[serde(default, deserialize_with = "lenient::int32")]
    pub gear: Option<i32>,
    #[serde(default, deserialize_with = "lenient::float32")]
    pub rpm: Option<f32>,
    #[serde(default, deserialize_with = "lenient::int32")]
    pub lap: Option<i32>,
    #[serde(default, deserialize_with = "lenient::int32")]
    pub position: Option<i32>,
    #[serde(default, deserialize_with = "lenient::float32")]
    pub fuel_pct: Option<f32>,
    #[serde(default, deserialize_with = "lenient::float32")]
    pub fuel_laps: Option<f32>,
    #[serde(default, deserialize_with = "lenient::float32")]
    pub fuel_level: Option<f32>,
    #[serde(default, deserialize_with = "lenient::float32")]
    pub lap_dist_pct: Option<f32>,
    #[serde(default, deserialize_with = "lenient::object")]
    pub pos: Option<TrackPosition>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub in_pit: Option<bool>,
    #[serde(default, deserialize_with = "lenient::object")]
    pub tire_wear: Option<TireWear>,
    #[serde(default, deserialize_with = "lenient::uint64")]
    pub session_time_ms: Option<u64>,
}

impl CarTelemetry {
    /// Stable driver key: `driverId`, else `carId`, rendered as a string.
    pub fn driver_key(&self) -> Option<String> {
        let raw = self.driver_id.as_ref().or(self.car_id.as_ref())?;
        match raw {
            Value::String(value) => Some(value.clone()),
            Value::Number(value) => Some(value.to_string()),
            _ => None,
        }
    }

    pub fn lap_dist(&self) -> Option<f32> {
        self.lap_dist_pct
            .or_else(|| self.pos.as_ref().and_then(|pos| pos.s))
    }

    /// Builds a tracker tick; `fallback_time_ms` is used when the car has no own clock.
    pub fn to_tick(&self, fallback_time_ms: Option<u64>) -> Option<TelemetryTick> {
        Some(TelemetryTick {
            driver_id: self.driver_key()?,
            lap_dist_pct: self.lap_dist()?,
            current_lap_number: self.lap?,
            in_pit: self.in_pit.unwrap_or(false),
            fuel_level: self.fuel_level.unwrap_or(0.0),
            tire_wear: self.tire_wear.unwrap_or_default(),
            session_time_ms: self.session_time_ms.or(fallback_time_ms)?,
        })
    }

    pub fn to_hud(&self) -> HudTelemetry {
        HudTelemetry {
            speed: self.speed.unwrap_or(0.0),
            gear: self.gear.unwrap_or(0),
            rpm: self.rpm.unwrap_or(0.0),
            lap: self.lap.unwrap_or(0),
            position: self.position.unwrap_or(0),
            fuel_pct: self.fuel_pct.unwrap_or(0.0),
            fuel_laps: self.fuel_laps,
        }
    }
}

impl TelemetryPayload {
    /// The player's car, else the first car.
    pub fn player_car(&self) -> Option<&CarTelemetry> {
        self.cars
            .iter()
            .find(|car| car.is_player == Some(true))
            .or_else(|| self.cars.first())
    }

    pub fn fallback_time_ms(&self) -> Option<u64> {
        self.session_time
            .map(|secs| (secs * 1000.0).max(0.0) as u64)
            .or_else(|| self.timestamp.map(|ms| ms.max(0.0) as u64))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HudTelemetry {
    pub speed: f32,
    pub gear: i32,
    pub rpm: f32,
    pub lap: i32,
    pub position: i32,
    pub fuel_pct: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel_laps: Option<f32>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub session_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub session_id: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerSignal {
    #[serde(default)]
    pub viewer_count: i64,
    #[serde(default)]
    pub request_controls: bool,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineerUpdate {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub updates: Vec<EngineerMessage>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineerMessage {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub priority: String,
    pub message: String,
    #[serde(default)]
    pub spoken_message: Option<String>,
}

impl EngineerMessage {
    pub fn is_urgent(&self) -> bool {
        matches!(self.priority.as_str(), "critical" | "high")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentSeverity {
    Low,
    Med,
    High,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub cars: Vec<i64>,
    pub lap: i32,
    pub corner: i32,
    #[serde(default)]
    pub corner_name: Option<String>,
    pub track_position: f32,
    pub severity: IncidentSeverity,
    pub discipline_context: Value,
    #[serde(default)]
    pub raw_data: Option<Value>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LapCompleted<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
    #[serde(flatten)]
    pub lap: &'a LapRecord,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub heap_used: u64,
    pub heap_total: u64,
    pub rss: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CpuUsage {
    pub user: u64,
    pub system: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayMetrics {
    pub timestamp: u64,
    pub memory: MemoryUsage,
    pub cpu: CpuUsage,
    pub platform: String,
    pub arch: String,
    pub node_version: String,
    pub uptime: f64,
}

mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::CarTelemetry;

    fn number(value: &Value) -> Option<f64> {
        let number = match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        number.filter(|number| number.is_finite())
    }

    pub fn float64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(number))
    }

    pub fn float32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f32>, D::Error> {
        Ok(float64(deserializer)?.map(|number| number as f32))
    }

    pub fn int32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
        Ok(float64(deserializer)?.map(|number| number.round() as i32))
    }

    pub fn uint64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        Ok(float64(deserializer)?
            .filter(|number| *number >= 0.0)
            .map(|number| number.round() as u64))
    }

    pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            Some(Value::Bool(flag)) => Some(flag),
            Some(other) => number(&other).map(|number| number != 0.0),
            None => None,
        })
    }

    /// Nested objects that do not match their shape are dropped, not fatal.
    pub fn object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.and_then(|value| serde_json::from_value(value).ok()))
    }

    pub fn cars<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<CarTelemetry>, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        let Some(Value::Array(cars)) = value else {
            return Ok(Vec::new());
        };
        Ok(cars
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|car| serde_json::from_value(car).ok())
            .collect())
    }
}
