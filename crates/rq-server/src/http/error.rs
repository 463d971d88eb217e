//! Mapping from the core error taxonomy to HTTP responses.
//!
//! Internal failures (database, IO, decryption) surface as a generic 500
//! body; stack traces and driver messages never reach the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

pub struct ApiError(pub rq_core::Error);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<rq_core::Error> for ApiError {
    fn from(err: rq_core::Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use rq_core::Error::*;

        let (status, message) = match &self.0 {
            MissingInput(_) | InvalidInput(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            NotConfigured(_) => (StatusCode::SERVICE_UNAVAILABLE, self.0.to_string()),
            NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            Unauthorized => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            Conflict(_) => (StatusCode::CONFLICT, self.0.to_string()),
            UpstreamTimeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "an upstream dependency timed out".to_string(),
            ),
            UpstreamUnavailable(_) | Git(_) => (
                StatusCode::BAD_GATEWAY,
                "an upstream dependency is unavailable".to_string(),
            ),
            Parse(_) | QueryGen(_) | Decryption(_) | Database(_) | Io(_) | Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };

        if status.is_server_error() {
            error!(status = %status, error = %self.0, "request failed");
        } else {
            warn!(status = %status, error = %self.0, "request rejected");
        }

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
