// Shared utility helpers for timestamps.

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

pub fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub fn monotonic_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

pub fn runtime_version() -> String {
    format!("{}/{}", crate::constants::RUNTIME_NAME, env!("CARGO_PKG_VERSION"))
}
