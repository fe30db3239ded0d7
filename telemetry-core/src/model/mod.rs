// Core data models for per-tick samples, completed laps, and boundary messages.

mod lap;
pub mod messages;
mod tick;

pub use lap::{LapFlags, LapRecord};
pub use tick::{TelemetryTick, TireWear};
