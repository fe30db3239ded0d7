// HTTP response payload types.

use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub kill_switch: bool,
    pub version: &'static str,
    pub timestamp: u64,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
}
