use pushgate_expfmt::{LabelPair, MetricType};

#[derive(Debug, Clone)]
pub struct MetricDescriptor {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub variable_labels: Vec<String>,
}

impl MetricDescriptor {
    pub fn new(name: &str, help: &str, metric_type: MetricType, variable_labels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            help: help.to_string(),
            metric_type,
            variable_labels: variable_labels.iter().map(|label| (*label).to_string()).collect(),
        }
    }

    /// Pads or truncates `values` to one value per variable label.
    pub(crate) fn label_values(&self, values: &[&str]) -> Vec<String> {
        (0..self.variable_labels.len())
            .map(|index| values.get(index).copied().unwrap_or_default().to_string())
            .collect()
    }

    pub(crate) fn label_pairs(&self, values: &[String]) -> Vec<LabelPair> {
        self.variable_labels
            .iter()
            .zip(values)
            .map(|(name, value)| LabelPair::new(name, value))
            .collect()
    }
}
