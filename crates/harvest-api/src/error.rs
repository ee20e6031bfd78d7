//! API Error Type
//!
//! Maps domain and storage errors to HTTP status codes with a JSON body.
//! Internal error detail is logged server-side and never sent to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use harvest_core::PlanError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// Storage failures and engine invariant violations. The detail is
    /// logged, the client sees a generic message.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// A validator failure is an engine defect; surface it loudly as a 500.
impl From<PlanError> for AppError {
    fn from(err: PlanError) -> Self {
        Self::Internal(anyhow::Error::new(err))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::BadRequest(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            Self::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            success: false,
            error: message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let resp = AppError::NotFound("no plans yet".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_bad_request_maps_to_422() {
        let resp = AppError::BadRequest("bad date".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_internal_maps_to_500() {
        let resp = AppError::Internal(anyhow::anyhow!("db connection failed")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_plan_error_is_internal() {
        let err: AppError = PlanError::ReentryTooSoon {
            symbol: "SPY".to_string(),
            lot_index: 0,
        }
        .into();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
