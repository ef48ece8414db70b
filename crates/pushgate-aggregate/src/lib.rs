//! pushgate-aggregate: the in-memory aggregate behind the push gateway.
//!
//! Pushed families are normalized, validated and merged into a store keyed
//! by family name; scrapes render the merged state.
//!
//! # Architecture
//!
//! ```text
//! Aggregate
//!   ├── ingest()     ← decode → normalize labels → validate all → sort/coalesce → save each
//!   ├── render()     → for_each_sorted → encode under the family read lock
//!   └── sweep_at()   → drop series older than the TTL, evict emptied families
//!
//! FamilyStore
//!   ├── RwLock<HashMap<name, Arc<FamilyHandle>>>   (outer: map structure only)
//!   └── FamilyHandle = RwLock<StoredFamily>        (inner: one family's series)
//! ```

pub mod expiry;
pub mod family;
pub mod ingest;
pub mod labels;
pub mod merge;
pub mod observer;
pub mod options;
pub mod render;
pub mod store;
pub mod validate;

use std::sync::Arc;

use pushgate_common::Result;
use pushgate_expfmt::MetricFamily;

pub use expiry::{SweepReport, spawn_sweeper};
pub use family::{PreparedFamily, Series, StoredFamily};
pub use labels::{PathLabels, normalize_labels, parse_label_path};
pub use observer::{AggregateObserver, NoopObserver};
pub use options::AggregateOptions;
pub use store::FamilyStore;

pub struct Aggregate {
    store: FamilyStore,
    options: AggregateOptions,
    observer: Arc<dyn AggregateObserver>,
}

impl Aggregate {
    pub fn new(options: AggregateOptions) -> Self {
        Self::with_observer(options, Arc::new(NoopObserver))
    }

    pub fn with_observer(options: AggregateOptions, observer: Arc<dyn AggregateObserver>) -> Self {
        Self {
            store: FamilyStore::new(),
            options,
            observer,
        }
    }

    pub fn options(&self) -> &AggregateOptions {
        &self.options
    }

    pub fn store(&self) -> &FamilyStore {
        &self.store
    }

    /// Number of families currently held.
    pub fn len(&self) -> Result<usize> {
        self.store.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.store.len()? == 0)
    }

    /// Copies the current aggregate out, families sorted by name.
    pub fn families(&self) -> Result<Vec<MetricFamily>> {
        let mut families = Vec::new();
        self.store.for_each_sorted(|family| {
            families.push(family.to_metric_family());
            Ok(())
        })?;
        Ok(families)
    }
}
