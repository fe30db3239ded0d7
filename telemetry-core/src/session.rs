// Per-driver lap tracking derived from per-tick telemetry samples.
// Invariants: no I/O; ticks for one driver arrive in non-decreasing session time;
// lap history is append-only until reset.

use std::collections::HashMap;

use crate::model::{LapFlags, LapRecord, TelemetryTick, TireWear};

/// Minimum drop in `lap_dist_pct` between two ticks that counts as crossing the line.
/// Smaller backward moves are treated as jitter.
pub const LAP_WRAP_THRESHOLD: f32 = 0.5;

/// Clean laps kept in the rolling fuel average.
pub const FUEL_HISTORY_LAPS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Corroboration {
    /// Lap closed on distance wrap; the simulator's lap counter has not moved yet.
    AwaitingIncrement,
    /// Lap closed on the lap counter late in the lap; the distance wrap is still to come.
    AwaitingWrap,
}

#[derive(Clone, Debug)]
struct DriverLapState {
    last_lap_dist_pct: f32,
    last_lap_number: i32,
    was_in_pit: bool,
    lap_start_session_time_ms: u64,
    lap_start_fuel: f32,
    lap_start_tire_wear: TireWear,
    lap_started_in_pit: bool,
    pit_stops: u32,
    awaiting: Option<Corroboration>,
}

impl DriverLapState {
    fn start(tick: &TelemetryTick) -> Self {
        Self {
            last_lap_dist_pct: tick.lap_dist_pct,
            last_lap_number: tick.current_lap_number,
            was_in_pit: tick.in_pit,
            lap_start_session_time_ms: tick.session_time_ms,
            lap_start_fuel: tick.fuel_level,
            lap_start_tire_wear: tick.tire_wear,
            lap_started_in_pit: tick.in_pit,
            pit_stops: 0,
            awaiting: None,
        }
    }

    fn advance(&mut self, tick: &TelemetryTick) -> Option<LapRecord> {
        if tick.in_pit && !self.was_in_pit {
            self.pit_stops = self.pit_stops.saturating_add(1);
        }

        let wrapped = self.last_lap_dist_pct - tick.lap_dist_pct > LAP_WRAP_THRESHOLD;
        let incremented = tick.current_lap_number > self.last_lap_number;
        let corroborates = match self.awaiting {
            Some(Corroboration::AwaitingIncrement) => incremented && !wrapped,
            Some(Corroboration::AwaitingWrap) => wrapped && !incremented,
            None => false,
        };

        let record = if corroborates {
            self.awaiting = None;
            None
        } else if wrapped || incremented {
            let record = self.close_lap(tick);
            self.awaiting = match (wrapped, incremented) {
                (true, false) => Some(Corroboration::AwaitingIncrement),
                (false, true) if tick.lap_dist_pct > LAP_WRAP_THRESHOLD => {
                    Some(Corroboration::AwaitingWrap)
                }
                _ => None,
            };
            self.begin_lap(tick);
            Some(record)
        } else {
            match self.awaiting {
                Some(Corroboration::AwaitingIncrement) if tick.lap_dist_pct > LAP_WRAP_THRESHOLD => {
                    self.awaiting = None;
                }
                Some(Corroboration::AwaitingWrap) if tick.lap_dist_pct <= LAP_WRAP_THRESHOLD => {
                    self.awaiting = None;
                }
                _ => {}
            }
            None
        };

        self.last_lap_dist_pct = tick.lap_dist_pct;
        self.last_lap_number = tick.current_lap_number;
        self.was_in_pit = tick.in_pit;
        record
    }

    fn close_lap(&self, tick: &TelemetryTick) -> LapRecord {
        LapRecord {
            driver_id: tick.driver_id.clone(),
            lap_number: self.last_lap_number,
            lap_time_ms: tick
                .session_time_ms
                .saturating_sub(self.lap_start_session_time_ms),
            fuel_used: (self.lap_start_fuel - tick.fuel_level).max(0.0),
            tire_wear_delta: tick.tire_wear.delta_since(&self.lap_start_tire_wear),
            flags: LapFlags {
                is_out_lap: self.lap_started_in_pit,
                is_in_lap: tick.in_pit,
            },
        }
    }

    fn begin_lap(&mut self, tick: &TelemetryTick) {
        self.lap_start_session_time_ms = tick.session_time_ms;
        self.lap_start_fuel = tick.fuel_level;
        self.lap_start_tire_wear = tick.tire_wear;
        self.lap_started_in_pit = tick.in_pit;
    }
}

/// Turns a stream of per-driver ticks into completed laps.
///
/// The tracker does not validate input: callers must drop ticks whose
/// `lap_dist_pct` is outside `[0, 1]` and must call [`LapTracker::reset`] when the
/// session clock restarts. Non-monotonic `session_time_ms` for a driver yields
/// undefined lap times (saturated at zero).
#[derive(Clone, Debug, Default)]
pub struct LapTracker {
    drivers: HashMap<String, DriverLapState>,
    laps: HashMap<String, Vec<LapRecord>>,
}

impl LapTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lap closed by this tick, if any. The first tick for a driver never closes a lap.
    pub fn process_tick(&mut self, tick: &TelemetryTick) -> Option<LapRecord> {
        let Some(state) = self.drivers.get_mut(&tick.driver_id) else {
            self.drivers
                .insert(tick.driver_id.clone(), DriverLapState::start(tick));
            return None;
        };

        let record = state.advance(tick)?;
        self.laps
            .entry(tick.driver_id.clone())
            .or_default()
            .push(record.clone());
        Some(record)
    }

    pub fn driver_laps(&self, driver_id: &str) -> &[LapRecord] {
        self.laps
            .get(driver_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn clean_laps(&self, driver_id: &str) -> Vec<&LapRecord> {
        self.driver_laps(driver_id)
            .iter()
            .filter(|lap| lap.is_clean())
            .collect()
    }

    pub fn best_lap(&self, driver_id: &str) -> Option<&LapRecord> {
        self.driver_laps(driver_id)
            .iter()
            .filter(|lap| lap.is_clean() && lap.lap_time_ms > 0)
            .min_by_key(|lap| lap.lap_time_ms)
    }

    /// Mean fuel used over the most recent clean laps that burned fuel.
    pub fn fuel_per_lap(&self, driver_id: &str) -> Option<f32> {
        let recent: Vec<f32> = self
            .driver_laps(driver_id)
            .iter()
            .rev()
            .filter(|lap| lap.is_clean() && lap.fuel_used > 0.0)
            .take(FUEL_HISTORY_LAPS)
            .map(|lap| lap.fuel_used)
            .collect();
        if recent.is_empty() {
            return None;
        }
        Some(recent.iter().sum::<f32>() / recent.len() as f32)
    }

    pub fn fuel_laps_remaining(&self, driver_id: &str, fuel_level: f32) -> Option<f32> {
        let per_lap = self.fuel_per_lap(driver_id)?;
        if per_lap > 0.0 {
            Some(fuel_level / per_lap)
        } else {
            None
        }
    }

    pub fn pit_stops(&self, driver_id: &str) -> u32 {
        self.drivers
            .get(driver_id)
            .map(|state| state.pit_stops)
            .unwrap_or(0)
    }

    pub fn drivers(&self) -> impl Iterator<Item = &str> {
        self.drivers.keys().map(String::as_str)
    }

    pub fn reset(&mut self) {
        self.drivers.clear();
        self.laps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(driver: &str, pct: f32, lap: i32, in_pit: bool, fuel: f32, time_ms: u64) -> TelemetryTick {
        TelemetryTick {
            driver_id: driver.to_string(),
            lap_dist_pct: pct,
            current_lap_number: lap,
            in_pit,
            fuel_level: fuel,
            tire_wear: TireWear::default(),
            session_time_ms: time_ms,
        }
    }

    #[test]
    fn first_tick_never_closes_a_lap() {
        let mut tracker = LapTracker::new();
        assert!(tracker.process_tick(&tick("d1", 0.99, 5, false, 40.0, 0)).is_none());
        assert!(tracker.driver_laps("d1").is_empty());
    }

    #[test]
    fn basic_crossing_produces_record() {
        let mut tracker = LapTracker::new();
        tracker.process_tick(&tick("d1", 0.95, 1, false, 50.0, 10_000));
        let record = tracker
            .process_tick(&tick("d1", 0.05, 2, false, 48.0, 100_000))
            .expect("lap closed");

        assert_eq!(record.lap_number, 1);
        assert_eq!(record.lap_time_ms, 90_000);
        assert!((record.fuel_used - 2.0).abs() < 1e-4);
        assert!(record.flags.is_clean());
        assert_eq!(tracker.driver_laps("d1"), &[record]);
    }

    #[test]
    fn out_lap_flagged_when_lap_started_in_pit() {
        let mut tracker = LapTracker::new();
        tracker.process_tick(&tick("d1", 0.90, 1, true, 50.0, 0));
        let record = tracker
            .process_tick(&tick("d1", 0.02, 2, false, 49.0, 80_000))
            .unwrap();
        assert!(record.flags.is_out_lap);
        assert!(!record.flags.is_in_lap);
    }

    #[test]
    fn in_lap_flagged_when_closing_tick_in_pit() {
        let mut tracker = LapTracker::new();
        tracker.process_tick(&tick("d1", 0.90, 1, false, 50.0, 0));
        let record = tracker
            .process_tick(&tick("d1", 0.02, 2, true, 49.0, 80_000))
            .unwrap();
        assert!(record.flags.is_in_lap);
        assert!(!record.flags.is_out_lap);
    }

    #[test]
    fn clean_laps_exclude_out_lap() {
        let mut tracker = LapTracker::new();
        tracker.process_tick(&tick("d1", 0.95, 1, true, 60.0, 0));
        tracker.process_tick(&tick("d1", 0.03, 2, false, 58.0, 95_000));
        tracker.process_tick(&tick("d1", 0.50, 2, false, 57.0, 140_000));
        tracker.process_tick(&tick("d1", 0.98, 2, false, 56.1, 184_000));
        tracker.process_tick(&tick("d1", 0.01, 3, false, 56.0, 186_000));

        let laps = tracker.driver_laps("d1");
        assert_eq!(laps.len(), 2);
        let clean = tracker.clean_laps("d1");
        assert_eq!(clean.len(), 1);
        assert_eq!(clean[0].lap_number, 2);
        assert_eq!(clean[0].lap_time_ms, 91_000);
    }

    #[test]
    fn unknown_driver_queries_are_empty() {
        let tracker = LapTracker::new();
        assert!(tracker.driver_laps("nonexistent").is_empty());
        assert!(tracker.clean_laps("nonexistent").is_empty());
        assert!(tracker.best_lap("nonexistent").is_none());
        assert!(tracker.fuel_per_lap("nonexistent").is_none());
        assert_eq!(tracker.pit_stops("nonexistent"), 0);
    }

    #[test]
    fn reset_forgets_drivers() {
        let mut tracker = LapTracker::new();
        tracker.process_tick(&tick("d1", 0.95, 1, false, 50.0, 0));
        tracker.process_tick(&tick("d1", 0.05, 2, false, 48.0, 90_000));
        assert_eq!(tracker.driver_laps("d1").len(), 1);

        tracker.reset();
        assert!(tracker.driver_laps("d1").is_empty());
        assert_eq!(tracker.drivers().count(), 0);
        // Would be a crossing against the old state; after reset it is a first tick again.
        assert!(tracker.process_tick(&tick("d1", 0.01, 3, false, 47.0, 95_000)).is_none());
        tracker.reset();
        tracker.reset();
        assert!(tracker.driver_laps("d1").is_empty());
    }

    #[test]
    fn small_backward_jitter_is_not_a_crossing() {
        let mut tracker = LapTracker::new();
        tracker.process_tick(&tick("d1", 0.40, 1, false, 50.0, 0));
        assert!(tracker.process_tick(&tick("d1", 0.38, 1, false, 50.0, 16)).is_none());
        assert!(tracker.process_tick(&tick("d1", 0.41, 1, false, 50.0, 33)).is_none());
        assert!(tracker.driver_laps("d1").is_empty());
    }

    #[test]
    fn late_lap_counter_is_corroboration_not_a_second_lap() {
        let mut tracker = LapTracker::new();
        tracker.process_tick(&tick("d1", 0.97, 4, false, 30.0, 0));
        let record = tracker.process_tick(&tick("d1", 0.01, 4, false, 29.0, 1_000));
        assert_eq!(record.map(|lap| lap.lap_number), Some(4));
        assert!(tracker.process_tick(&tick("d1", 0.02, 5, false, 29.0, 1_100)).is_none());
        assert_eq!(tracker.driver_laps("d1").len(), 1);
    }

    #[test]
    fn early_lap_counter_is_corroborated_by_wrap() {
        let mut tracker = LapTracker::new();
        tracker.process_tick(&tick("d1", 0.98, 4, false, 30.0, 0));
        let record = tracker.process_tick(&tick("d1", 0.995, 5, false, 29.0, 500));
        assert_eq!(record.map(|lap| lap.lap_number), Some(4));
        assert!(tracker.process_tick(&tick("d1", 0.004, 5, false, 29.0, 600)).is_none());
        assert_eq!(tracker.driver_laps("d1").len(), 1);
    }

    #[test]
    fn stuck_lap_counter_still_closes_every_wrap() {
        let mut tracker = LapTracker::new();
        tracker.process_tick(&tick("d1", 0.90, 0, false, 30.0, 0));
        assert!(tracker.process_tick(&tick("d1", 0.05, 0, false, 29.0, 10_000)).is_some());
        tracker.process_tick(&tick("d1", 0.60, 0, false, 28.5, 50_000));
        tracker.process_tick(&tick("d1", 0.95, 0, false, 28.1, 90_000));
        assert!(tracker.process_tick(&tick("d1", 0.02, 0, false, 28.0, 95_000)).is_some());
        assert_eq!(tracker.driver_laps("d1").len(), 2);
    }

    #[test]
    fn drivers_are_tracked_independently() {
        let mut tracker = LapTracker::new();
        tracker.process_tick(&tick("a", 0.95, 1, false, 50.0, 0));
        tracker.process_tick(&tick("b", 0.10, 1, false, 50.0, 0));
        assert!(tracker.process_tick(&tick("a", 0.05, 2, false, 49.0, 90_000)).is_some());
        assert!(tracker.process_tick(&tick("b", 0.20, 1, false, 49.5, 90_000)).is_none());
        assert_eq!(tracker.driver_laps("a").len(), 1);
        assert!(tracker.driver_laps("b").is_empty());
    }

    #[test]
    fn tire_wear_delta_is_per_corner() {
        let mut tracker = LapTracker::new();
        let mut first = tick("d1", 0.95, 1, false, 50.0, 0);
        first.tire_wear = TireWear::new(0.10, 0.12, 0.05, 0.06);
        let mut second = tick("d1", 0.05, 2, false, 48.0, 90_000);
        second.tire_wear = TireWear::new(0.13, 0.16, 0.06, 0.08);

        tracker.process_tick(&first);
        let delta = tracker.process_tick(&second).unwrap().tire_wear_delta;
        assert!((delta.fl - 0.03).abs() < 1e-5);
        assert!((delta.fr - 0.04).abs() < 1e-5);
        assert!((delta.rl - 0.01).abs() < 1e-5);
        assert!((delta.rr - 0.02).abs() < 1e-5);
    }

    #[test]
    fn refuel_does_not_report_negative_fuel_use() {
        let mut tracker = LapTracker::new();
        tracker.process_tick(&tick("d1", 0.95, 1, false, 5.0, 0));
        let record = tracker
            .process_tick(&tick("d1", 0.05, 2, true, 60.0, 120_000))
            .unwrap();
        assert_eq!(record.fuel_used, 0.0);
    }

    #[test]
    fn fuel_average_uses_last_three_clean_laps() {
        let mut tracker = LapTracker::new();
        let burns = [3.0_f32, 2.0, 2.5, 2.0, 1.0];
        let mut fuel = 60.0_f32;
        let mut time_ms = 0_u64;
        tracker.process_tick(&tick("d1", 0.95, 1, false, fuel, time_ms));
        for (lap, burn) in burns.iter().enumerate() {
            fuel -= burn;
            time_ms += 90_000;
            tracker.process_tick(&tick("d1", 0.05, lap as i32 + 2, false, fuel, time_ms));
            tracker.process_tick(&tick("d1", 0.95, lap as i32 + 2, false, fuel, time_ms + 80_000));
            time_ms += 80_000;
        }

        let avg = tracker.fuel_per_lap("d1").unwrap();
        assert!((avg - (2.5 + 2.0 + 1.0) / 3.0).abs() < 1e-4);
        let remaining = tracker.fuel_laps_remaining("d1", 11.0).unwrap();
        assert!((remaining - 11.0 / avg).abs() < 1e-3);
    }

    #[test]
    fn pit_entries_are_counted() {
        let mut tracker = LapTracker::new();
        tracker.process_tick(&tick("d1", 0.10, 1, false, 50.0, 0));
        tracker.process_tick(&tick("d1", 0.20, 1, true, 50.0, 1_000));
        tracker.process_tick(&tick("d1", 0.21, 1, true, 50.0, 2_000));
        tracker.process_tick(&tick("d1", 0.30, 1, false, 50.0, 3_000));
        tracker.process_tick(&tick("d1", 0.40, 1, true, 50.0, 4_000));
        assert_eq!(tracker.pit_stops("d1"), 2);
    }

    #[test]
    fn best_lap_ignores_dirty_laps() {
        let mut tracker = LapTracker::new();
        tracker.process_tick(&tick("d1", 0.95, 1, true, 50.0, 0));
        tracker.process_tick(&tick("d1", 0.05, 2, false, 49.0, 60_000));
        tracker.process_tick(&tick("d1", 0.95, 2, false, 48.0, 140_000));
        tracker.process_tick(&tick("d1", 0.05, 3, false, 47.0, 150_000));
        tracker.process_tick(&tick("d1", 0.95, 3, false, 46.0, 230_000));
        tracker.process_tick(&tick("d1", 0.05, 4, false, 45.0, 238_000));

        let best = tracker.best_lap("d1").unwrap();
        assert_eq!(best.lap_number, 3);
        assert_eq!(best.lap_time_ms, 88_000);
    }
}
