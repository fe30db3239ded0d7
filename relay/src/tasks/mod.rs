// Background tasks for the periodic metrics report and local link staleness warnings.

use std::time::Duration;

use telemetry_core::model::messages::RELAY_METRICS;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::app::{BridgeStatus, LinkStatus};
use crate::constants::STALE_ACTIVITY_MS;
use crate::metrics::ProcessSampler;
use crate::socket::{ConnectionState, Envelope};
use crate::utils::now_epoch_ms;

pub async fn metrics_report_task(
    status_rx: watch::Receiver<BridgeStatus>,
    cloud_tx: mpsc::Sender<Envelope>,
    period: Duration,
    start: Instant,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sampler = ProcessSampler::new();
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; nothing is reported at startup.
    interval.tick().await;
    info!(period_secs = period.as_secs_f64(), "metrics reporter started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                let status = status_rx.borrow().clone();
                if !should_report(&status) {
                    debug!("cloud not connected; metrics skipped");
                    continue;
                }

                let metrics = sampler.sample(start);
                let data = match serde_json::to_value(&metrics) {
                    Ok(data) => data,
                    Err(err) => {
                        warn!(?err, "metrics encode failed");
                        continue;
                    }
                };
                match cloud_tx.try_send(Envelope::new(RELAY_METRICS, data)) {
                    Ok(()) => debug!(rss = metrics.memory.rss, "metrics sent"),
                    Err(TrySendError::Full(_)) => debug!("cloud queue full; metrics dropped"),
                    Err(TrySendError::Closed(_)) => break,
                }
            }
        }
    }
    info!("metrics reporter stopped");
}

pub fn should_report(status: &BridgeStatus) -> bool {
    status.cloud_enabled && status.cloud.state == ConnectionState::Connected
}

/// Watches the local hop for inbound silence; runs whether or not the cloud hop exists.
pub async fn stale_watch_task(
    status_rx: watch::Receiver<BridgeStatus>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut last_warn_ms: Option<u64> = None;
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = interval.tick() => {
                let local = status_rx.borrow().local;
                if let Some(age_ms) = stale_warning(&local, now_epoch_ms(), &mut last_warn_ms) {
                    warn!(age_ms, "local telemetry stale while connected");
                }
            }
        }
    }
    debug!("stale watch stopped");
}

/// Age of the last inbound event on a connected link once it exceeds the stale threshold.
/// Outbound traffic toward the link does not count.
pub fn stale_age_ms(link: &LinkStatus, now_ms: u64) -> Option<u64> {
    if link.state != ConnectionState::Connected {
        return None;
    }
    let age = now_ms.saturating_sub(link.last_inbound_ms?);
    (age >= STALE_ACTIVITY_MS).then_some(age)
}

/// Stale age to report now, at most once per stale threshold.
pub fn stale_warning(link: &LinkStatus, now_ms: u64, last_warn_ms: &mut Option<u64>) -> Option<u64> {
    let age_ms = stale_age_ms(link, now_ms)?;
    if let Some(prev) = *last_warn_ms {
        if now_ms.saturating_sub(prev) < STALE_ACTIVITY_MS {
            return None;
        }
    }
    *last_warn_ms = Some(now_ms);
    Some(age_ms)
}
