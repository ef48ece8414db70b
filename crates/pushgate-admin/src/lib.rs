//! pushgate-admin: the gateway's view of itself.
//!
//! Self-metrics live in a [`metrics::MetricsRegistry`] separate from the
//! pushed aggregate and are served, together with health probes, on the
//! lifecycle listener.

pub mod handlers;
pub mod metrics;
pub mod router;

pub use handlers::metrics::track_api_metrics;
pub use router::{AdminState, SelfMetrics, lifecycle_router};
