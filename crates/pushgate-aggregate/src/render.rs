use std::collections::BTreeMap;
use std::io::Write;

use pushgate_common::Result;
use pushgate_expfmt::{Encoder, Format, MetricType};
use tracing::warn;

use crate::Aggregate;

impl Aggregate {
    /// Writes the whole aggregate to `writer`, families sorted by name and
    /// series sorted by label set.
    ///
    /// Each family is encoded under its own read lock, so pushes to other
    /// families proceed while a scrape is streaming. A write error aborts the
    /// render and is returned.
    pub fn render<W: Write>(&self, writer: W, format: Format) -> Result<()> {
        let mut encoder = Encoder::new(writer, format);
        let mut distribution: BTreeMap<MetricType, usize> =
            MetricType::ALL.iter().map(|metric_type| (*metric_type, 0)).collect();

        let rendered = self.store.for_each_sorted(|family| {
            *distribution.entry(family.metric_type).or_default() += 1;
            encoder.encode_parts(family.header(), family.metrics())?;
            Ok(())
        });
        let finished = rendered.and_then(|()| {
            encoder.finish()?;
            Ok(())
        });

        if let Err(err) = finished {
            warn!(error = %err, "render aborted");
            return Err(err);
        }

        self.observer.set_type_distribution(&distribution);
        Ok(())
    }

    /// Renders into a byte buffer.
    pub fn render_to_vec(&self, format: Format) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.render(&mut buffer, format)?;
        Ok(buffer)
    }
}
