//! API error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use quotehub_core::Error as CoreError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Wraps core errors so handlers can use `?`.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::InvalidInput(_) | CoreError::InvalidConfigValue(_) => {
                StatusCode::BAD_REQUEST
            }
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::CalendarUnknown { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Cancelled => StatusCode::CONFLICT,
            CoreError::MarketData(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!("API error: {}", self.0);
        } else {
            tracing::debug!("API rejection: {}", self.0);
        }

        let body = Json(json!({
            "success": false,
            "error": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
