// Process resource sampling for the relay metrics report.

use std::env::consts;

#[cfg(unix)]
use nix::sys::resource::{getrusage, UsageWho};
#[cfg(unix)]
use nix::sys::time::TimeVal;
use sysinfo::{Pid, System};
use telemetry_core::model::messages::{CpuUsage, MemoryUsage, RelayMetrics};
use tokio::time::Instant;
#[cfg(unix)]
use tracing::debug;

use crate::utils::{now_epoch_ms, runtime_version};

pub struct ProcessSampler {
    system: System,
    pid: Option<Pid>,
}

impl ProcessSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// Resident and virtual bytes; zeros when the process table is unavailable.
    pub fn memory(&mut self) -> MemoryUsage {
        let Some(pid) = self.pid else {
            return MemoryUsage {
                heap_used: 0,
                heap_total: 0,
                rss: 0,
            };
        };
        self.system.refresh_process(pid);
        let (rss, virtual_bytes) = self
            .system
            .process(pid)
            .map(|process| (process.memory(), process.virtual_memory()))
            .unwrap_or((0, 0));
        MemoryUsage {
            heap_used: rss,
            heap_total: virtual_bytes,
            rss,
        }
    }

    pub fn sample(&mut self, start: Instant) -> RelayMetrics {
        RelayMetrics {
            timestamp: now_epoch_ms(),
            memory: self.memory(),
            cpu: cpu_usage(),
            platform: consts::OS.to_string(),
            arch: consts::ARCH.to_string(),
            node_version: runtime_version(),
            uptime: start.elapsed().as_secs_f64(),
        }
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Cumulative user/system CPU time in microseconds.
#[cfg(unix)]
pub fn cpu_usage() -> CpuUsage {
    match getrusage(UsageWho::RUSAGE_SELF) {
        Ok(usage) => CpuUsage {
            user: timeval_micros(usage.user_time()),
            system: timeval_micros(usage.system_time()),
        },
        Err(err) => {
            debug!(?err, "getrusage failed");
            CpuUsage { user: 0, system: 0 }
        }
    }
}

#[cfg(not(unix))]
pub fn cpu_usage() -> CpuUsage {
    CpuUsage { user: 0, system: 0 }
}

#[cfg(unix)]
fn timeval_micros(tv: TimeVal) -> u64 {
    (tv.tv_sec().max(0) as u64)
        .saturating_mul(1_000_000)
        .saturating_add(tv.tv_usec().max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_reports_platform_and_runtime() {
        let mut sampler = ProcessSampler::new();
        let metrics = sampler.sample(Instant::now());
        assert_eq!(metrics.platform, consts::OS);
        assert_eq!(metrics.arch, consts::ARCH);
        assert!(metrics.node_version.starts_with("pitbox-relay/"));
        assert!(metrics.uptime >= 0.0);
        assert_eq!(metrics.memory.heap_used, metrics.memory.rss);
    }

    #[test]
    fn payload_uses_wire_field_names() {
        let mut sampler = ProcessSampler::new();
        let value = serde_json::to_value(sampler.sample(Instant::now())).unwrap();
        for key in ["timestamp", "memory", "cpu", "platform", "arch", "nodeVersion", "uptime"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert!(value["memory"].get("heapUsed").is_some());
        assert!(value["memory"].get("heapTotal").is_some());
        assert!(value["cpu"].get("system").is_some());
    }

    #[cfg(unix)]
    #[test]
    fn cpu_time_is_monotonic() {
        let first = cpu_usage();
        let mut acc = 0u64;
        for i in 0..200_000u64 {
            acc = acc.wrapping_add(i * i);
        }
        assert!(acc > 0);
        let second = cpu_usage();
        assert!(second.user + second.system >= first.user + first.system);
    }

    #[cfg(unix)]
    #[test]
    fn timeval_converts_to_micros() {
        use nix::sys::time::TimeValLike;

        assert_eq!(timeval_micros(TimeVal::microseconds(2_500_001)), 2_500_001);
        assert_eq!(timeval_micros(TimeVal::seconds(0)), 0);
    }
}
