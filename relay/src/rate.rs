// Viewer-driven target send rates relayed to the simulator bridge.
// Invariants: every signal is observed once, in arrival order; no coalescing.

use serde::Serialize;
use telemetry_core::model::messages::ViewerSignal;
use tracing::info;

pub const BASELINE_INTERVAL_MS: u64 = 250;
pub const CONTROLS_INTERVAL_MS: u64 = 1_000 / 15;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateTarget {
    pub baseline_interval_ms: u64,
    pub controls_interval_ms: Option<u64>,
}

impl Default for RateTarget {
    fn default() -> Self {
        Self {
            baseline_interval_ms: BASELINE_INTERVAL_MS,
            controls_interval_ms: None,
        }
    }
}

/// Controls stream only runs while a viewer asks for it; the baseline always does.
pub fn target_for(signal: &ViewerSignal) -> RateTarget {
    RateTarget {
        baseline_interval_ms: BASELINE_INTERVAL_MS,
        controls_interval_ms: signal.request_controls.then_some(CONTROLS_INTERVAL_MS),
    }
}

#[derive(Debug, Default)]
pub struct RateController {
    target: RateTarget,
    last_signal: Option<ViewerSignal>,
    observed: u64,
}

impl RateController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, signal: ViewerSignal) -> RateTarget {
        let next = target_for(&signal);
        let count_changed = self
            .last_signal
            .map(|last| last.viewer_count != signal.viewer_count)
            .unwrap_or(true);
        if count_changed || next != self.target {
            info!(
                viewers = signal.viewer_count,
                controls = signal.request_controls,
                "viewer signal"
            );
        }
        self.target = next;
        self.last_signal = Some(signal);
        self.observed += 1;
        next
    }

    pub fn target(&self) -> RateTarget {
        self.target
    }

    pub fn last_signal(&self) -> Option<ViewerSignal> {
        self.last_signal
    }

    pub fn observed(&self) -> u64 {
        self.observed
    }
}
