use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use http::{HeaderValue, Method};
use pushgate_aggregate::Aggregate;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers;

pub const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Allowed CORS origins; empty allows any origin.
    pub cors_domains: Vec<String>,
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_domains: Vec::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

pub fn api_router(aggregate: Arc<Aggregate>, config: &ApiConfig) -> Router {
    Router::new()
        .route(
            "/metrics",
            get(handlers::scrape::scrape)
                .post(handlers::push::push)
                .put(handlers::push::push),
        )
        .route(
            "/metrics/{*labels}",
            post(handlers::push::push_labeled).put(handlers::push::push_labeled),
        )
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(build_cors_layer(&config.cors_domains))
        .layer(TraceLayer::new_for_http())
        .with_state(aggregate)
}

fn build_cors_layer(cors_domains: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::OPTIONS];
    if cors_domains.is_empty() || cors_domains.iter().any(|domain| domain == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = cors_domains
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    }
}
