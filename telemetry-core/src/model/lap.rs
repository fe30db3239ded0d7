// Completed lap record produced by the lap tracker.

use serde::{Deserialize, Serialize};

use super::TireWear;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapFlags {
    pub is_out_lap: bool,
    pub is_in_lap: bool,
}

impl LapFlags {
    pub fn is_clean(&self) -> bool {
        !self.is_out_lap && !self.is_in_lap
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LapRecord {
    pub driver_id: String,
    pub lap_number: i32,
    pub lap_time_ms: u64,
    pub fuel_used: f32,
    pub tire_wear_delta: TireWear,
    pub flags: LapFlags,
}

impl LapRecord {
    pub fn is_clean(&self) -> bool {
        self.flags.is_clean()
    }
}
