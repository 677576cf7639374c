//! Status and health probe handlers

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{DomainError, ReservationRepository};
use crate::interfaces::http::common::{ApiError, ErrorBody};
use crate::interfaces::http::modules::request_id::RequestId;

const AUTHORS: [&str; 3] = ["Felix Miller", "Nik Wachsmann", "Ben Stahl"];
const API_VERSION: &str = "3.0.0";

/// Health check state
#[derive(Clone)]
pub struct HealthState {
    pub repo: Arc<dyn ReservationRepository>,
    /// Upper bound for the database ping
    pub probe_timeout: Duration,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub authors: Vec<String>,
    pub api_version: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DatabaseHealth {
    pub connected: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DatabasesHealth {
    pub reservations: DatabaseHealth,
}

/// Combined liveness and readiness
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub live: bool,
    pub ready: bool,
    pub databases: DatabasesHealth,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LivenessResponse {
    pub live: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub ready: bool,
}

impl HealthState {
    async fn probe_database(&self) -> Result<(), DomainError> {
        match tokio::time::timeout(self.probe_timeout, self.repo.ping()).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::Internal(format!(
                "database did not answer within {:?}",
                self.probe_timeout
            ))),
        }
    }
}

fn probe_failed(what: &str, err: DomainError, trace: &str) -> ApiError {
    tracing::error!(trace = %trace, error = %err, "{} check failed", what);
    ApiError::unavailable(format!("{} check failed", what), err.to_string(), trace)
}

#[utoipa::path(
    get,
    path = "/api/v3/reservations/status",
    tag = "Health",
    responses((status = 200, description = "Service information", body = StatusResponse))
)]
pub async fn service_status() -> Json<StatusResponse> {
    Json(StatusResponse {
        authors: AUTHORS.iter().map(|a| a.to_string()).collect(),
        api_version: API_VERSION.to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/api/v3/reservations/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service and database are up", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = ErrorBody)
    )
)]
pub async fn health_check(
    State(state): State<HealthState>,
    RequestId(trace): RequestId,
) -> Result<Json<HealthResponse>, ApiError> {
    state
        .probe_database()
        .await
        .map_err(|e| probe_failed("Database", e, &trace))?;

    Ok(Json(HealthResponse {
        live: true,
        ready: true,
        databases: DatabasesHealth {
            reservations: DatabaseHealth { connected: true },
        },
    }))
}

#[utoipa::path(
    get,
    path = "/api/v3/reservations/health/live",
    tag = "Health",
    responses((status = 200, description = "Web server answers", body = LivenessResponse))
)]
pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { live: true })
}

#[utoipa::path(
    get,
    path = "/api/v3/reservations/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready to serve requests", body = ReadinessResponse),
        (status = 503, description = "Database unreachable", body = ErrorBody)
    )
)]
pub async fn readiness(
    State(state): State<HealthState>,
    RequestId(trace): RequestId,
) -> Result<Json<ReadinessResponse>, ApiError> {
    state
        .probe_database()
        .await
        .map_err(|e| probe_failed("Readiness", e, &trace))?;

    Ok(Json(ReadinessResponse { ready: true }))
}
