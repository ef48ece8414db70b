use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::{Duration, Instant},
};

use pushgate_common::{PushgateError, Result};

use crate::{
    expiry::SweepReport,
    family::{PreparedFamily, StoredFamily},
    merge::combine,
};

/// One family and the lock that guards its content.
pub struct FamilyHandle {
    state: RwLock<FamilyState>,
}

struct FamilyState {
    family: StoredFamily,
    /// Set when the sweeper removed this handle from the map. A writer that
    /// looked the handle up before the removal must go back to the map.
    evicted: bool,
}

impl FamilyHandle {
    fn new(family: StoredFamily) -> Self {
        Self {
            state: RwLock::new(FamilyState {
                family,
                evicted: false,
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, FamilyState>> {
        self.state
            .read()
            .map_err(|_| PushgateError::Internal("metric family lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, FamilyState>> {
        self.state
            .write()
            .map_err(|_| PushgateError::Internal("metric family lock poisoned".to_string()))
    }
}

/// Result of [`FamilyStore::get_or_create`].
pub enum Slot {
    /// The name was new; the family was stored as-is.
    Created { series: usize },
    /// The name exists; merge the returned family into the handle.
    Existing(Arc<FamilyHandle>, PreparedFamily),
}

/// Name → family map with two-level locking.
///
/// The outer lock covers only the map structure and is never held across a
/// merge or an encode. Each family's content sits behind its own lock, so
/// pushes to different families run concurrently. Locks are always taken
/// outer before inner.
#[derive(Default)]
pub struct FamilyStore {
    families: RwLock<HashMap<String, Arc<FamilyHandle>>>,
}

impl FamilyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.families_read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    #[cfg(test)]
    pub fn family_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.families_read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Number of series stored for `name`, if the family exists.
    #[cfg(test)]
    pub fn series_count(&self, name: &str) -> Result<Option<usize>> {
        let handle = self.families_read()?.get(name).cloned();
        match handle {
            Some(handle) => Ok(Some(handle.read()?.family.series.len())),
            None => Ok(None),
        }
    }

    /// Inserts `family` if its name is new, otherwise hands back the existing
    /// handle (not locked) together with the family to merge.
    pub fn get_or_create(&self, family: PreparedFamily, now: Instant) -> Result<Slot> {
        let mut families = self.families_write()?;
        if let Some(existing) = families.get(&family.name) {
            return Ok(Slot::Existing(Arc::clone(existing), family));
        }

        let series = family.metrics.len();
        let name = family.name.clone();
        families.insert(name, Arc::new(FamilyHandle::new(StoredFamily::new(family, now))));
        Ok(Slot::Created { series })
    }

    /// Stores or merges one prepared family and returns its series count.
    pub fn save(&self, family: PreparedFamily, now: Instant) -> Result<usize> {
        let mut family = family;
        loop {
            match self.get_or_create(family, now)? {
                Slot::Created { series } => return Ok(series),
                Slot::Existing(handle, incoming) => {
                    let mut state = handle.write()?;
                    if state.evicted {
                        family = incoming;
                        continue;
                    }
                    combine(&mut state.family, incoming, now)?;
                    return Ok(state.family.series.len());
                }
            }
        }
    }

    /// Visits every non-empty family in name order under its read lock.
    ///
    /// Handles are snapshotted under the outer lock, which is released
    /// before the first family is visited.
    pub fn for_each_sorted<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&StoredFamily) -> Result<()>,
    {
        let mut handles = self.snapshot()?;
        handles.sort_by(|left, right| left.0.cmp(&right.0));

        for (_, handle) in handles {
            let state = handle.read()?;
            if state.evicted || state.family.series.is_empty() {
                continue;
            }
            visit(&state.family)?;
        }
        Ok(())
    }

    /// Drops series not refreshed within `ttl` and evicts families left empty.
    pub fn expire(&self, ttl: Duration, now: Instant) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut emptied = Vec::new();

        for (name, handle) in self.snapshot()? {
            let mut state = handle.write()?;
            if state.evicted {
                continue;
            }
            let before = state.family.series.len();
            state
                .family
                .series
                .retain(|series| now.saturating_duration_since(series.last_refreshed) <= ttl);
            let after = state.family.series.len();
            report.expired_series += before - after;
            if after == 0 {
                drop(state);
                emptied.push((name, handle));
            } else if after < before {
                report.shrunk_families.push((name, after));
            }
        }

        report.shrunk_families.sort();
        if emptied.is_empty() {
            return Ok(report);
        }

        let mut families = self.families_write()?;
        for (name, handle) in emptied {
            let still_mapped = families
                .get(&name)
                .is_some_and(|current| Arc::ptr_eq(current, &handle));
            if !still_mapped {
                continue;
            }
            let mut state = handle.write()?;
            // A push may have landed between the two passes.
            if !state.family.series.is_empty() {
                continue;
            }
            state.evicted = true;
            families.remove(&name);
            report.removed_families.push(name);
        }

        report.removed_families.sort();
        Ok(report)
    }

    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.families.write();
            panic!("family map poisoned on purpose");
        }));
    }

    fn snapshot(&self) -> Result<Vec<(String, Arc<FamilyHandle>)>> {
        Ok(self
            .families_read()?
            .iter()
            .map(|(name, handle)| (name.clone(), Arc::clone(handle)))
            .collect())
    }

    fn families_read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Arc<FamilyHandle>>>> {
        self.families
            .read()
            .map_err(|_| PushgateError::Internal("family map lock poisoned".to_string()))
    }

    fn families_write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<String, Arc<FamilyHandle>>>> {
        self.families
            .write()
            .map_err(|_| PushgateError::Internal("family map lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, thread};

    use pushgate_expfmt::{LabelPair, Metric, MetricType, MetricValue};

    use super::*;

    fn counter_family(name: &str, job: &str, value: f64) -> PreparedFamily {
        PreparedFamily {
            name: name.to_string(),
            help: None,
            metric_type: MetricType::Counter,
            metrics: vec![Metric::new(
                vec![LabelPair::new("job", job)],
                MetricValue::Counter(value),
            )],
        }
    }

    fn two_series_family(name: &str) -> PreparedFamily {
        PreparedFamily {
            name: name.to_string(),
            help: None,
            metric_type: MetricType::Counter,
            metrics: ["x", "y"]
                .into_iter()
                .map(|job| Metric::new(vec![LabelPair::new("job", job)], MetricValue::Counter(1.0)))
                .collect(),
        }
    }

    fn names_visited(store: &FamilyStore) -> Vec<String> {
        let mut names = Vec::new();
        store
            .for_each_sorted(|family| {
                names.push(family.name.clone());
                Ok(())
            })
            .unwrap();
        names
    }

    #[test]
    fn get_or_create_inserts_then_returns_handle() {
        let store = FamilyStore::new();
        let now = Instant::now();
        assert!(matches!(
            store.get_or_create(counter_family("a", "x", 1.0), now).unwrap(),
            Slot::Created { series: 1 }
        ));
        assert!(matches!(
            store.get_or_create(counter_family("a", "x", 1.0), now).unwrap(),
            Slot::Existing(..)
        ));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn visits_families_in_name_order() {
        let store = FamilyStore::new();
        let now = Instant::now();
        for name in ["zeta", "alpha", "mid"] {
            store.save(counter_family(name, "x", 1.0), now).unwrap();
        }
        assert_eq!(names_visited(&store), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn failed_merge_propagates_and_releases_lock() {
        let store = FamilyStore::new();
        let now = Instant::now();
        store.save(counter_family("a", "x", 1.0), now).unwrap();

        let mut gauge = counter_family("a", "x", 1.0);
        gauge.metric_type = MetricType::Gauge;
        gauge.metrics[0].value = MetricValue::Gauge(1.0);
        assert!(matches!(
            store.save(gauge, now),
            Err(PushgateError::TypeMismatch { .. })
        ));

        assert_eq!(store.save(counter_family("a", "y", 1.0), now).unwrap(), 2);
    }

    #[test]
    fn expire_drops_stale_series_and_empty_families() {
        let store = FamilyStore::new();
        let start = Instant::now();
        store.save(counter_family("old", "x", 1.0), start).unwrap();
        store.save(counter_family("mixed", "x", 1.0), start).unwrap();
        store
            .save(counter_family("mixed", "y", 1.0), start + Duration::from_secs(5))
            .unwrap();

        let report = store
            .expire(Duration::from_secs(2), start + Duration::from_secs(6))
            .unwrap();

        assert_eq!(report.expired_series, 2);
        assert_eq!(report.removed_families, vec!["old".to_string()]);
        assert_eq!(report.shrunk_families, vec![("mixed".to_string(), 1)]);
        assert_eq!(store.family_names().unwrap(), vec!["mixed".to_string()]);
        assert_eq!(store.series_count("mixed").unwrap(), Some(1));
    }

    #[test]
    fn save_after_eviction_recreates_family() {
        let store = FamilyStore::new();
        let start = Instant::now();
        store.save(counter_family("a", "x", 1.0), start).unwrap();

        let Slot::Existing(handle, pending) = store
            .get_or_create(counter_family("a", "x", 2.0), start)
            .unwrap()
        else {
            panic!("family should exist");
        };
        store
            .expire(Duration::from_secs(1), start + Duration::from_secs(5))
            .unwrap();
        assert!(handle.read().unwrap().evicted);

        assert_eq!(store.save(pending, start + Duration::from_secs(5)).unwrap(), 1);
        assert_eq!(store.series_count("a").unwrap(), Some(1));
    }

    #[test]
    fn concurrent_pushes_to_one_family_all_land() {
        let store = Arc::new(FamilyStore::new());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..100 {
                        store
                            .save(counter_family("hits", "x", 1.0), Instant::now())
                            .unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let mut total = 0.0;
        store
            .for_each_sorted(|family| {
                total = family.series[0].metric.value.as_scalar().unwrap();
                Ok(())
            })
            .unwrap();
        assert_eq!(total, 800.0);
    }

    #[test]
    fn visiting_one_family_does_not_block_pushes_to_others() {
        let store = Arc::new(FamilyStore::new());
        let now = Instant::now();
        store.save(counter_family("a", "x", 1.0), now).unwrap();
        store.save(counter_family("b", "x", 1.0), now).unwrap();

        let (done, finished) = mpsc::channel();
        store
            .for_each_sorted(|family| {
                if family.name != "a" {
                    return Ok(());
                }
                let store = Arc::clone(&store);
                let done = done.clone();
                thread::spawn(move || {
                    let b = store.save(counter_family("b", "y", 1.0), Instant::now());
                    let c = store.save(counter_family("c", "x", 1.0), Instant::now());
                    let _ = done.send((b.unwrap(), c.unwrap()));
                });
                let saved = finished
                    .recv_timeout(Duration::from_secs(5))
                    .expect("pushes to b and c waited on a");
                assert_eq!(saved, (2, 1));
                Ok(())
            })
            .unwrap();

        assert_eq!(store.family_names().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn visits_never_observe_a_half_merged_family() {
        let store = Arc::new(FamilyStore::new());
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..500 {
                    store.save(two_series_family("hits"), Instant::now()).unwrap();
                }
            })
        };

        while !writer.is_finished() {
            store
                .for_each_sorted(|family| {
                    let values: Vec<_> = family
                        .series
                        .iter()
                        .map(|series| series.metric.value.as_scalar())
                        .collect();
                    assert_eq!(values.len(), 2);
                    assert_eq!(values[0], values[1]);
                    Ok(())
                })
                .unwrap();
        }
        writer.join().unwrap();

        let mut totals = Vec::new();
        store
            .for_each_sorted(|family| {
                totals.extend(family.series.iter().map(|s| s.metric.value.as_scalar()));
                Ok(())
            })
            .unwrap();
        assert_eq!(totals, vec![Some(500.0), Some(500.0)]);
    }
}
