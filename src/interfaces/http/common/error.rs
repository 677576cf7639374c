//! HTTP error envelope
//!
//! Every failure leaves the API as
//! `{"errors": [{"code", "message", "more_info"}], "trace": "<request id>"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::domain::DomainError;

/// One entry of the `errors` array
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub more_info: String,
}

/// Error response body
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub errors: Vec<ErrorDetail>,
    /// Correlation id of the failed request
    pub trace: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub more_info: String,
    pub trace: String,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        more_info: impl Into<String>,
        trace: &str,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            more_info: more_info.into(),
            trace: trace.to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>, more_info: impl Into<String>, trace: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message, more_info, trace)
    }

    pub fn not_found(trace: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "not_found",
            "Not found",
            "Reservation does not exist or is deleted.",
            trace,
        )
    }

    pub fn unauthorized(more_info: impl Into<String>, trace: &str) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "not_authorized",
            "Not authorized",
            more_info,
            trace,
        )
    }

    pub fn unavailable(message: impl Into<String>, more_info: impl Into<String>, trace: &str) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "service_unavailable",
            message,
            more_info,
            trace,
        )
    }

    /// Map a domain failure; internal causes are logged, never returned.
    pub fn from_domain(err: DomainError, trace: &str) -> Self {
        match err {
            DomainError::Validation(msg) => Self::bad_request("Invalid Input", msg, trace),
            DomainError::Conflict { .. } => Self::new(
                StatusCode::CONFLICT,
                "conflict",
                "Overlap detected",
                "The requested reservation overlaps with an existing reservation.",
                trace,
            ),
            DomainError::NotFound { .. } => Self::not_found(trace),
            DomainError::Unauthorized(msg) => Self::unauthorized(msg, trace),
            DomainError::Internal(cause) => {
                error!(trace = %trace, error = %cause, "Request failed");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                    "not provided",
                    trace,
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            errors: vec![ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
                more_info: self.more_info,
            }],
            trace: self.trace,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn domain_errors_map_to_status_and_code() {
        let cases = [
            (DomainError::Validation("x".into()), StatusCode::BAD_REQUEST, "bad_request"),
            (
                DomainError::Conflict { conflicting_id: Some(Uuid::nil()) },
                StatusCode::CONFLICT,
                "conflict",
            ),
            (
                DomainError::reservation_not_found(Uuid::nil()),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                DomainError::Unauthorized("x".into()),
                StatusCode::UNAUTHORIZED,
                "not_authorized",
            ),
            (
                DomainError::Internal("db down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
            ),
        ];
        for (err, status, code) in cases {
            let api = ApiError::from_domain(err, "t-1");
            assert_eq!(api.status, status);
            assert_eq!(api.code, code);
            assert_eq!(api.trace, "t-1");
        }
    }

    #[test]
    fn both_conflict_sources_look_identical() {
        let advisory = ApiError::from_domain(
            DomainError::Conflict { conflicting_id: Some(Uuid::new_v4()) },
            "t",
        );
        let guard = ApiError::from_domain(DomainError::Conflict { conflicting_id: None }, "t");
        assert_eq!(advisory.message, guard.message);
        assert_eq!(advisory.more_info, guard.more_info);
    }

    #[test]
    fn internal_cause_is_not_exposed() {
        let api = ApiError::from_domain(DomainError::Internal("password=hunter2".into()), "t");
        assert!(!api.more_info.contains("hunter2"));
        assert!(!api.message.contains("hunter2"));
    }
}
