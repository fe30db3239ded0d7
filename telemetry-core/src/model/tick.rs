// Per-driver telemetry sample consumed once by the lap tracker.
// Invariants: lap_dist_pct is in [0, 1]; session_time_ms is non-decreasing per driver.

use serde::{Deserialize, Serialize};

/// Wear per corner, 0.0 = new, 1.0 = fully worn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TireWear {
    #[serde(default)]
    pub fl: f32,
    #[serde(default)]
    pub fr: f32,
    #[serde(default)]
    pub rl: f32,
    #[serde(default)]
    pub rr: f32,
}

impl TireWear {
    pub fn new(fl: f32, fr: f32, rl: f32, rr: f32) -> Self {
        Self { fl, fr, rl, rr }
    }

    /// Wear accumulated since `start`. Negative corners mean the tyre was replaced.
    pub fn delta_since(&self, start: &TireWear) -> TireWear {
        TireWear {
            fl: self.fl - start.fl,
            fr: self.fr - start.fr,
            rl: self.rl - start.rl,
            rr: self.rr - start.rr,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryTick {
    pub driver_id: String,
    pub lap_dist_pct: f32,
    pub current_lap_number: i32,
    pub in_pit: bool,
    pub fuel_level: f32,
    pub tire_wear: TireWear,
    pub session_time_ms: u64,
}

impl TelemetryTick {
    pub fn has_valid_distance(&self) -> bool {
        (0.0..=1.0).contains(&self.lap_dist_pct)
    }
}
