use std::{sync::Arc, time::Instant};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::Response,
};
use pushgate_expfmt::Format;

use crate::{handlers::AdminApiError, metrics::ApiMetrics, router::AdminState};

pub async fn self_metrics(
    State(state): State<Arc<AdminState>>,
    headers: HeaderMap,
) -> Result<Response, AdminApiError> {
    let format = Format::negotiate(
        headers
            .get(header::ACCEPT)
            .and_then(|value| value.to_str().ok()),
    );

    state.system_metrics.refresh();
    let payload = state.registry.render(format)?;

    let mut response = Response::new(Body::from(payload));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(format.content_type()),
    );

    Ok(response)
}

/// Records method, status and latency of every request passing through.
pub async fn track_api_metrics(
    State(metrics): State<Arc<ApiMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let started_at = Instant::now();
    let method = request.method().as_str().to_string();

    let response = next.run(request).await;
    let status = response.status().as_u16();
    metrics.record_request(&method, status, started_at.elapsed());

    response
}
