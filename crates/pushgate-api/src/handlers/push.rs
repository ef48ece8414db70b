use std::sync::Arc;

use axum::extract::{Path, State};
use bytes::Bytes;
use http::StatusCode;
use pushgate_aggregate::{Aggregate, PathLabels, parse_label_path};
use pushgate_common::PushgateError;

use crate::error::ApiError;

/// `POST|PUT /metrics`
pub async fn push(
    State(aggregate): State<Arc<Aggregate>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    ingest(aggregate, body, PathLabels::new()).await?;
    Ok(StatusCode::ACCEPTED)
}

/// `POST|PUT /metrics/<label>/<value>...`, e.g. `/metrics/job/batch`.
pub async fn push_labeled(
    State(aggregate): State<Arc<Aggregate>>,
    Path(labels): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let path_labels = parse_label_path(&labels)?;
    ingest(aggregate, body, path_labels).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Decodes and merges on the blocking pool. The merge waits on family locks
/// that a streaming scrape may hold until its body is drained, and draining
/// needs a free async worker.
async fn ingest(
    aggregate: Arc<Aggregate>,
    body: Bytes,
    path_labels: PathLabels,
) -> Result<(), ApiError> {
    tokio::task::spawn_blocking(move || aggregate.ingest(&body, &path_labels))
        .await
        .map_err(|err| PushgateError::Internal(format!("push task failed: {err}")))??;
    Ok(())
}
