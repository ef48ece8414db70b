use axum::response::{IntoResponse, Response};
use http::{StatusCode, header};
use pushgate_common::PushgateError;

/// Maps gateway errors onto HTTP: anything the client caused is a 400,
/// the rest is a 500. The body is the error message as plain text.
pub struct ApiError(pub PushgateError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.0.to_string(),
        )
            .into_response()
    }
}

impl From<PushgateError> for ApiError {
    fn from(err: PushgateError) -> Self {
        ApiError(err)
    }
}
