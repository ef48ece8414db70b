use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pushgate_common::Result;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::Aggregate;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_series: usize,
    /// Families that lost some series but not all, with what remains.
    /// Sorted by name.
    pub shrunk_families: Vec<(String, usize)>,
    /// Sorted by name.
    pub removed_families: Vec<String>,
}

impl Aggregate {
    pub fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Instant::now())
    }

    /// Drops every series whose last push is older than the TTL as of `now`.
    /// A no-op when no TTL is configured.
    pub fn sweep_at(&self, now: Instant) -> Result<SweepReport> {
        let Some(ttl) = self.options.metric_ttl() else {
            return Ok(SweepReport::default());
        };

        let report = self.store.expire(ttl, now)?;
        if report.expired_series > 0 {
            debug!(
                expired_series = report.expired_series,
                removed_families = report.removed_families.len(),
                "expired stale series"
            );
            self.observer.record_expired(report.expired_series);
            for (family, series) in &report.shrunk_families {
                self.observer.set_family_series(family, *series);
            }
            for family in &report.removed_families {
                self.observer.remove_family(family);
            }
            if let Ok(families) = self.store.len() {
                self.observer.set_family_count(families);
            }
        }
        Ok(report)
    }
}

/// Runs [`Aggregate::sweep`] every `period` until `shutdown` resolves.
pub fn spawn_sweeper<F>(aggregate: Arc<Aggregate>, period: Duration, shutdown: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("expiry sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = aggregate.sweep() {
                        warn!(error = %err, "expiry sweep failed");
                    }
                }
            }
        }
    })
}
