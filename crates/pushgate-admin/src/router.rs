use std::sync::Arc;

use axum::{Router, routing::get};
use chrono::Utc;
use pushgate_aggregate::Aggregate;
use pushgate_common::Result;

use crate::{
    handlers,
    metrics::{ApiMetrics, GatewayMetrics, MetricsRegistry, SystemMetrics},
};

pub struct AdminState {
    pub aggregate: Arc<Aggregate>,
    pub registry: Arc<MetricsRegistry>,
    pub system_metrics: Arc<SystemMetrics>,
}

/// Self-metric collectors, registered before the aggregate exists so the
/// gateway collector can be handed to it as its observer.
pub struct SelfMetrics {
    pub registry: Arc<MetricsRegistry>,
    pub api: Arc<ApiMetrics>,
    pub gateway: Arc<GatewayMetrics>,
    pub system: Arc<SystemMetrics>,
}

impl SelfMetrics {
    pub fn register() -> Result<Self> {
        let registry = Arc::new(MetricsRegistry::new());
        let api = Arc::new(ApiMetrics::register(registry.as_ref())?);
        let gateway = Arc::new(GatewayMetrics::register(registry.as_ref())?);
        let system = Arc::new(SystemMetrics::register(registry.as_ref(), Utc::now())?);

        Ok(Self {
            registry,
            api,
            gateway,
            system,
        })
    }
}

impl AdminState {
    pub fn new(aggregate: Arc<Aggregate>, metrics: &SelfMetrics) -> Self {
        Self {
            aggregate,
            registry: Arc::clone(&metrics.registry),
            system_metrics: Arc::clone(&metrics.system),
        }
    }
}

pub fn lifecycle_router(state: Arc<AdminState>) -> Router {
    Router::new()
        .route("/healthy", get(handlers::health::healthy))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::metrics::self_metrics))
        .with_state(state)
}
