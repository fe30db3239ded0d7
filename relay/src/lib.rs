// Crate root for the PitBox telemetry relay modules.

pub mod app;
pub mod bridge;
pub mod config;
pub mod constants;
pub mod error;
pub mod http;
pub mod metrics;
pub mod process;
pub mod rate;
pub mod sink;
pub mod socket;
pub mod tasks;
pub mod utils;
pub mod ws;
