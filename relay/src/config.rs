// Environment-driven relay configuration.

use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::constants::{
    DEFAULT_CLOUD_URL, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_DEBUG_PORT, DEFAULT_LOCAL_BRIDGE_URL,
    DEFAULT_METRICS_INTERVAL_SECS, DEFAULT_OUTBOUND_QUEUE, DEFAULT_RECONNECT_DELAY_MS,
};

#[derive(Clone, Debug, PartialEq)]
pub struct RelayConfig {
    pub local_url: String,
    pub cloud_url: String,
    pub kill_switch: bool,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub metrics_interval_secs: u64,
    pub outbound_queue: usize,
    pub sim_bridge_cmd: Option<String>,
    pub hud_enabled: bool,
    pub debug_bind: IpAddr,
    pub debug_port: u16,
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse_u64 = |key: &str, default: u64| {
            lookup(key)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        let flag = |key: &str, default: bool| match lookup(key) {
            Some(value) => matches!(value.trim(), "1" | "true" | "yes"),
            None => default,
        };

        Self {
            local_url: lookup("LOCAL_BRIDGE_URL").unwrap_or_else(|| DEFAULT_LOCAL_BRIDGE_URL.to_string()),
            cloud_url: lookup("BLACKBOX_SERVER_URL").unwrap_or_else(|| DEFAULT_CLOUD_URL.to_string()),
            kill_switch: flag("RELAY_KILL_SWITCH", false),
            reconnect_delay: Duration::from_millis(parse_u64(
                "RECONNECT_DELAY_MS",
                DEFAULT_RECONNECT_DELAY_MS,
            )),
            connect_timeout: Duration::from_millis(parse_u64(
                "CONNECT_TIMEOUT_MS",
                DEFAULT_CONNECT_TIMEOUT_MS,
            )),
            metrics_interval_secs: parse_u64("METRICS_INTERVAL_SECS", DEFAULT_METRICS_INTERVAL_SECS)
                .max(1),
            outbound_queue: lookup("OUTBOUND_QUEUE")
                .and_then(|value| value.trim().parse::<usize>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_OUTBOUND_QUEUE),
            sim_bridge_cmd: lookup("SIM_BRIDGE_CMD").filter(|value| !value.trim().is_empty()),
            hud_enabled: flag("HUD_ENABLED", true),
            debug_bind: lookup("RELAY_DEBUG_BIND")
                .and_then(|value| value.parse::<IpAddr>().ok())
                .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            debug_port: lookup("RELAY_DEBUG_PORT")
                .and_then(|value| value.parse::<u16>().ok())
                .unwrap_or(DEFAULT_DEBUG_PORT),
        }
    }
}
