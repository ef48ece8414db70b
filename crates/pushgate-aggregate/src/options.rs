use std::time::Duration;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Process-wide aggregation settings, fixed at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Lowercased, sorted and de-duplicated.
    ignored_labels: Vec<String>,
    metric_ttl: Option<Duration>,
    sweep_interval: Option<Duration>,
}

impl AggregateOptions {
    pub fn new<I, S>(ignored_labels: I, metric_ttl: Option<Duration>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ignored_labels: Vec<String> = ignored_labels
            .into_iter()
            .map(|label| label.as_ref().trim().to_lowercase())
            .filter(|label| !label.is_empty())
            .collect();
        ignored_labels.sort();
        ignored_labels.dedup();

        Self {
            ignored_labels,
            metric_ttl,
            sweep_interval: None,
        }
    }

    /// Overrides the period of the expiry sweeper.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    pub fn ignored_labels(&self) -> &[String] {
        &self.ignored_labels
    }

    pub fn metric_ttl(&self) -> Option<Duration> {
        self.metric_ttl
    }

    /// Case-insensitive membership test against the ignored label set.
    pub fn is_ignored(&self, label_name: &str) -> bool {
        if self.ignored_labels.is_empty() {
            return false;
        }
        self.ignored_labels
            .binary_search(&label_name.to_lowercase())
            .is_ok()
    }

    /// Sweep period, or `None` when expiry is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        let ttl = self.metric_ttl?;
        Some(
            self.sweep_interval
                .unwrap_or_else(|| ttl.clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL)),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::AggregateOptions;

    #[test]
    fn normalizes_ignored_labels() {
        let options = AggregateOptions::new(["Instance", "job", " JOB ", ""], None);
        assert_eq!(options.ignored_labels(), ["instance", "job"]);
        assert!(options.is_ignored("INSTANCE"));
        assert!(options.is_ignored("Job"));
        assert!(!options.is_ignored("region"));
    }

    #[test]
    fn sweep_interval_follows_ttl() {
        assert_eq!(AggregateOptions::new([""; 0], None).sweep_interval(), None);

        let short = AggregateOptions::new([""; 0], Some(Duration::from_millis(10)));
        assert_eq!(short.sweep_interval(), Some(Duration::from_secs(1)));

        let long = AggregateOptions::new([""; 0], Some(Duration::from_secs(3600)));
        assert_eq!(long.sweep_interval(), Some(Duration::from_secs(60)));

        let custom = long.with_sweep_interval(Duration::from_secs(5));
        assert_eq!(custom.sweep_interval(), Some(Duration::from_secs(5)));
    }
}
