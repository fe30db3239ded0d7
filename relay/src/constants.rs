// Shared constants for relay timing, queue sizes, and defaults.

pub const DEFAULT_LOCAL_BRIDGE_URL: &str = "http://127.0.0.1:9999";
pub const DEFAULT_CLOUD_URL: &str = "http://localhost:3000";
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_METRICS_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;
pub const DEFAULT_DEBUG_PORT: u16 = 8765;
pub const BRIDGE_INPUT_QUEUE: usize = 1_024;
pub const HUD_BROADCAST_CAP: usize = 64;
pub const TRANSITION_HISTORY: usize = 32;
pub const STALE_ACTIVITY_MS: u64 = 5_000;
pub const STALE_CHECK_INTERVAL_MS: u64 = 1_000;
pub const SOCKET_IO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";
pub const RUNTIME_NAME: &str = "pitbox-relay";
