// PitBox relay: bridges the local simulator feed to the cloud and the HUD.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{error, info, warn};

use pitbox_relay::app::AppState;
use pitbox_relay::bridge::{self, RelayBridge};
use pitbox_relay::config::RelayConfig;
use pitbox_relay::constants::{BRIDGE_INPUT_QUEUE, HUD_BROADCAST_CAP, STALE_CHECK_INTERVAL_MS};
use pitbox_relay::http;
use pitbox_relay::process;
use pitbox_relay::sink::{BroadcastHudSink, LogSink};
use pitbox_relay::socket::{self, ConnectionConfig, Envelope, Hop};
use pitbox_relay::tasks;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = RelayConfig::from_env();
    let addr = SocketAddr::new(config.debug_bind, config.debug_port);
    let start_instant = Instant::now();
    info!(
        local = %config.local_url,
        cloud = %config.cloud_url,
        kill_switch = config.kill_switch,
        "starting relay"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (bridge_tx, bridge_rx) = mpsc::channel(BRIDGE_INPUT_QUEUE);
    let (hud_tx, _) = broadcast::channel::<String>(HUD_BROADCAST_CAP);
    let (local_tx, local_rx) = mpsc::channel::<Envelope>(config.outbound_queue);
    let (cloud_tx, cloud_rx) = if config.kill_switch {
        warn!("kill switch active; cloud relay disabled");
        (None, None)
    } else {
        let (tx, rx) = mpsc::channel::<Envelope>(config.outbound_queue);
        (Some(tx), Some(rx))
    };

    let mut relay = RelayBridge::new(local_tx, cloud_tx.clone()).expect_hud(config.hud_enabled);
    if config.hud_enabled {
        let hud_sink = BroadcastHudSink::new(hud_tx.clone());
        relay = relay.with_hud(Arc::new(hud_sink.clone()));
        relay.subscribe(Box::new(hud_sink));
    } else {
        relay = relay.with_hud(Arc::new(LogSink));
    }
    let status_rx = relay.status_receiver();

    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    if let Some(command_line) = config.sim_bridge_cmd.as_deref() {
        match process::spawn_sim_bridge(command_line) {
            Ok(child) => handles.push(tokio::spawn(process::supervise(child, shutdown_rx.clone()))),
            Err(err) => {
                error!(?err, command = %command_line, "simulation bridge failed to start; running without telemetry");
            }
        }
    }

    let bridge_handle = tokio::spawn(bridge::bridge_task(relay, bridge_rx));

    let local_config = ConnectionConfig {
        hop: Hop::Local,
        url: config.local_url.clone(),
        connect_timeout: config.connect_timeout,
        reconnect_delay: config.reconnect_delay,
    };
    let local_inputs = bridge_tx.clone();
    let local_shutdown = shutdown_rx.clone();
    handles.push(tokio::spawn(async move {
        if let Err(err) =
            socket::connection_loop(local_config, local_rx, local_inputs, local_shutdown).await
        {
            warn!(?err, "local connection loop exited");
        }
    }));

    if let Some(cloud_rx) = cloud_rx {
        let cloud_config = ConnectionConfig {
            hop: Hop::Cloud,
            url: config.cloud_url.clone(),
            connect_timeout: config.connect_timeout,
            reconnect_delay: config.reconnect_delay,
        };
        let cloud_inputs = bridge_tx.clone();
        let cloud_shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(err) =
                socket::connection_loop(cloud_config, cloud_rx, cloud_inputs, cloud_shutdown).await
            {
                warn!(?err, "cloud connection loop exited");
            }
        }));
    }

    handles.push(tokio::spawn(tasks::stale_watch_task(
        status_rx.clone(),
        Duration::from_millis(STALE_CHECK_INTERVAL_MS),
        shutdown_rx.clone(),
    )));

    if let Some(metrics_tx) = cloud_tx {
        handles.push(tokio::spawn(tasks::metrics_report_task(
            status_rx.clone(),
            metrics_tx,
            Duration::from_secs(config.metrics_interval_secs),
            start_instant,
            shutdown_rx.clone(),
        )));
    }

    let app_state = AppState {
        status_rx,
        bridge_tx: bridge_tx.clone(),
        hud_tx,
        shutdown_rx: shutdown_rx.clone(),
        kill_switch: config.kill_switch,
        start_instant,
    };

    match axum::Server::try_bind(&addr) {
        Ok(builder) => {
            let app = http::router(app_state);
            let mut server_shutdown = shutdown_rx.clone();
            info!(%addr, "starting debug server");
            handles.push(tokio::spawn(async move {
                let server = builder
                    .serve(app.into_make_service())
                    .with_graceful_shutdown(async move {
                        let _ = server_shutdown.changed().await;
                    });
                if let Err(err) = server.await {
                    warn!(?err, "debug server exited");
                }
            }));
        }
        Err(err) => {
            error!(?err, %addr, "debug server bind failed; continuing without it");
            drop(app_state);
        }
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(?err, "ctrl_c listener failed");
    }
    info!("shutting down");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        if let Err(err) = handle.await {
            warn!(?err, "task join failed");
        }
    }

    drop(bridge_tx);
    if time::timeout(Duration::from_secs(2), bridge_handle).await.is_err() {
        warn!("bridge did not stop in time");
    }
    info!("relay stopped");
}
