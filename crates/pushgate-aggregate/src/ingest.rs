use std::time::Instant;

use pushgate_common::{PushgateError, Result};
use pushgate_expfmt::{MetricFamily, parse_text};
use tracing::{debug, warn};

use crate::{
    Aggregate,
    family::PreparedFamily,
    labels::{PathLabels, normalize_labels},
    validate::validate_family,
};

impl Aggregate {
    /// Decodes a text exposition body and pushes every family in it.
    pub fn ingest(&self, body: &[u8], path_labels: &PathLabels) -> Result<()> {
        let families = match parse_text(body) {
            Ok(families) => families,
            Err(err) => {
                let err = PushgateError::Decode(err.to_string());
                self.observer.record_push_error(err.error_code());
                return Err(err);
            }
        };
        self.push(families, path_labels)
    }

    /// Pushes already decoded families.
    ///
    /// Every family is normalized and validated before any of them is
    /// saved; one invalid family rejects the whole push. A family that
    /// fails to merge (type or bucket mismatch) is skipped while the others
    /// are still saved, and the first such error is returned.
    pub fn push(&self, families: Vec<MetricFamily>, path_labels: &PathLabels) -> Result<()> {
        let prepared = match self.prepare(families, path_labels) {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(error = %err, "rejected push");
                self.observer.record_push_error(err.error_code());
                return Err(err);
            }
        };

        let now = Instant::now();
        let mut first_error = None;
        for family in prepared {
            let name = family.name.clone();
            match self.store.save(family, now) {
                Ok(series) => self.observer.set_family_series(&name, series),
                Err(err) => {
                    warn!(family = %name, error = %err, "failed to merge metric family");
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Ok(families) = self.store.len() {
            self.observer.set_family_count(families);
        }

        let job = path_labels.get("job").map(String::as_str).unwrap_or("");
        match first_error {
            None => {
                debug!(job, "push accepted");
                self.observer.record_push(job);
                Ok(())
            }
            Some(err) => {
                self.observer.record_push_error(err.error_code());
                Err(err)
            }
        }
    }

    fn prepare(
        &self,
        families: Vec<MetricFamily>,
        path_labels: &PathLabels,
    ) -> Result<Vec<PreparedFamily>> {
        let mut validated = Vec::with_capacity(families.len());
        for mut family in families {
            for metric in &mut family.metrics {
                normalize_labels(&mut metric.labels, path_labels, &self.options);
            }
            let metric_type = validate_family(&family)?;
            validated.push((family, metric_type));
        }

        validated
            .into_iter()
            .map(|(family, metric_type)| PreparedFamily::from_validated(family, metric_type))
            .collect()
    }
}
