pub mod collectors;
pub mod registry;
pub mod types;

pub use collectors::{api::ApiMetrics, gateway::GatewayMetrics, system::SystemMetrics};
pub use registry::{CounterMetric, GaugeMetric, HistogramMetric, MetricsRegistry};
pub use types::MetricDescriptor;
