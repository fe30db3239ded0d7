// HTTP handlers and routing for the local debug surface.

use axum::extract::{Path, State as AxumState};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::oneshot;

use crate::app::{AppState, DriverLapsResponse};
use crate::bridge::BridgeInput;
use crate::utils::now_epoch_ms;
use crate::ws::hud_handler;

mod types;
use types::*;

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/debug/health", get(health))
        .route("/debug/status", get(status))
        .route("/debug/laps/:driver_id", get(driver_laps))
        .route("/hud", get(hud_handler))
        .with_state(app_state)
}

async fn health(AxumState(app_state): AxumState<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: if app_state.kill_switch {
            "kill_switch_active"
        } else {
            "healthy"
        },
        kill_switch: app_state.kill_switch,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: now_epoch_ms(),
    })
}

async fn status(AxumState(app_state): AxumState<AppState>) -> impl IntoResponse {
    let status = app_state.status_rx.borrow().clone();
    Json(status)
}

async fn driver_laps(
    AxumState(app_state): AxumState<AppState>,
    Path(driver_id): Path<String>,
) -> Result<Json<DriverLapsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let unavailable = || {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "bridge unavailable",
            }),
        )
    };
    let (reply, response) = oneshot::channel();
    app_state
        .bridge_tx
        .send(BridgeInput::QueryLaps { driver_id, reply })
        .await
        .map_err(|_| unavailable())?;
    let laps = response.await.map_err(|_| unavailable())?;
    Ok(Json(laps))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tokio::sync::{broadcast, mpsc, watch};
    use tokio::time::Instant;
    use tower::ServiceExt;

    use super::*;
    use crate::bridge::{bridge_task, RelayBridge};

    fn app_state(kill_switch: bool) -> AppState {
        let (local_tx, _local_rx) = mpsc::channel(4);
        let bridge = RelayBridge::new(local_tx, None);
        let status_rx = bridge.status_receiver();
        let (bridge_tx, bridge_rx) = mpsc::channel(8);
        tokio::spawn(bridge_task(bridge, bridge_rx));
        let (hud_tx, _) = broadcast::channel(4);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        AppState {
            status_rx,
            bridge_tx,
            hud_tx,
            shutdown_rx,
            kill_switch,
            start_instant: Instant::now(),
        }
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_reports_kill_switch() {
        let (status, body) = get_json(router(app_state(true)), "/debug/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "kill_switch_active");
        assert_eq!(body["killSwitch"], true);

        let (_, body) = get_json(router(app_state(false)), "/debug/health").await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn unknown_driver_has_no_laps() {
        let (status, body) = get_json(router(app_state(false)), "/debug/laps/nobody").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["driverId"], "nobody");
        assert_eq!(body["laps"], serde_json::json!([]));
        assert_eq!(body["cleanLaps"], serde_json::json!([]));
        assert_eq!(body["bestLap"], Value::Null);
        assert_eq!(body["pitStops"], 0);
    }

    #[tokio::test]
    async fn status_snapshot_starts_disconnected() {
        let (status, body) = get_json(router(app_state(false)), "/debug/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["local"]["state"], "disconnected");
        assert_eq!(body["cloudEnabled"], false);
        assert_eq!(body["local"]["lastInboundMs"], Value::Null);
        assert_eq!(body["counters"]["droppedDisconnected"], 0);
        assert_eq!(body["rate"]["baselineIntervalMs"], 250);
        assert!(body.get("cloud_enabled").is_none());
    }
}
