use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use pushgate_common::{Result, time::unix_seconds};

use crate::metrics::registry::{GaugeMetric, MetricsRegistry};

pub struct SystemMetrics {
    start_time: Instant,
    uptime_seconds: Arc<GaugeMetric>,
    process_resident_memory_bytes: Arc<GaugeMetric>,
}

impl SystemMetrics {
    pub fn register(registry: &MetricsRegistry, started_at: DateTime<Utc>) -> Result<Self> {
        let start_time_seconds = registry.register_gauge(
            "process_start_time_seconds",
            "Start time of the process since unix epoch in seconds",
            &[],
        )?;
        start_time_seconds.set(&[], unix_seconds(&started_at));

        Ok(Self {
            start_time: Instant::now(),
            uptime_seconds: registry.register_gauge(
                "pushgate_uptime_seconds",
                "Process uptime in seconds",
                &[],
            )?,
            process_resident_memory_bytes: registry.register_gauge(
                "process_resident_memory_bytes",
                "Resident memory size of the process in bytes",
                &[],
            )?,
        })
    }

    pub fn refresh(&self) {
        self.uptime_seconds
            .set(&[], self.start_time.elapsed().as_secs_f64());

        if let Some(resident_bytes) = read_resident_memory_bytes() {
            self.process_resident_memory_bytes
                .set(&[], resident_bytes as f64);
        }
    }
}

#[cfg(target_os = "linux")]
fn read_resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|kb| kb.parse::<u64>().ok())
        .and_then(|kb| kb.checked_mul(1024))
}

#[cfg(not(target_os = "linux"))]
fn read_resident_memory_bytes() -> Option<u64> {
    None
}
