pub mod health;
pub mod metrics;

use axum::{Json, http::StatusCode, response::IntoResponse};
use pushgate_common::PushgateError;

pub struct AdminApiError(pub PushgateError);

impl From<PushgateError> for AdminApiError {
    fn from(value: PushgateError) -> Self {
        Self(value)
    }
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> axum::response::Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        (
            status,
            Json(serde_json::json!({
                "code": self.0.error_code(),
                "message": self.0.to_string(),
            })),
        )
            .into_response()
    }
}
