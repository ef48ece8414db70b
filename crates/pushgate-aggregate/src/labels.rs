use std::collections::BTreeMap;

use pushgate_common::{PushgateError, Result};
use pushgate_expfmt::LabelPair;

use crate::options::AggregateOptions;

/// Labels taken from the push URL, e.g. `job` in `/metrics/job/<job>`.
pub type PathLabels = BTreeMap<String, String>;

/// Splits the label part of a push path into name/value pairs.
///
/// `"/job/batch/instance/a"` yields `{job: batch, instance: a}`. An empty
/// path yields no labels; an odd number of segments is rejected.
pub fn parse_label_path(path: &str) -> Result<PathLabels> {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return Ok(PathLabels::new());
    }

    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() % 2 != 0 {
        return Err(PushgateError::OddLabelParts);
    }

    Ok(parts
        .chunks_exact(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect())
}

/// Rewrites `labels` into its canonical form: path labels overlaid (they
/// always win), ignored names dropped, sorted by name.
pub fn normalize_labels(
    labels: &mut Vec<LabelPair>,
    overlay: &PathLabels,
    options: &AggregateOptions,
) {
    for (name, value) in overlay {
        match labels.iter_mut().find(|label| &label.name == name) {
            Some(label) => label.value.clone_from(value),
            None => labels.push(LabelPair::new(name, value)),
        }
    }

    labels.retain(|label| !options.is_ignored(&label.name));
    labels.sort_by(|left, right| left.name.cmp(&right.name));
}
