//! Reservation HTTP handlers

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::application::ReservationService;
use crate::interfaces::http::common::{ApiError, ErrorBody, ValidatedJson};
use crate::interfaces::http::middleware::CurrentActor;
use crate::interfaces::http::modules::request_id::RequestId;

use super::dto::*;

/// Path under which single reservations are served
pub const RESERVATIONS_PATH: &str = "/api/v3/reservations/reservations";

/// Application state for reservation handlers.
#[derive(Clone)]
pub struct ReservationAppState {
    pub service: Arc<ReservationService>,
}

fn location(id: Uuid) -> String {
    format!("{}/{}", RESERVATIONS_PATH, id)
}

fn created(dto: ReservationDto) -> Response {
    (
        StatusCode::CREATED,
        [(header::LOCATION, location(dto.id))],
        Json(dto),
    )
        .into_response()
}

/// Malformed ids answer 400 on writes
fn parse_write_id(raw: &str, trace: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError::bad_request("Invalid reservation UUID", format!("'{}' is not a UUID", raw), trace))
}

#[utoipa::path(
    get,
    path = "/api/v3/reservations/reservations",
    tag = "Reservations",
    params(ListQuery),
    responses(
        (status = 200, description = "Matching reservations", body = ReservationListResponse),
        (status = 400, description = "Malformed filter", body = ErrorBody)
    )
)]
pub async fn list_reservations(
    State(state): State<ReservationAppState>,
    RequestId(trace): RequestId,
    Query(query): Query<ListQuery>,
) -> Result<Json<ReservationListResponse>, ApiError> {
    let filter = query
        .to_filter()
        .map_err(|e| ApiError::from_domain(e, &trace))?;
    let reservations = state
        .service
        .list(&filter)
        .await
        .map_err(|e| ApiError::from_domain(e, &trace))?;

    Ok(Json(ReservationListResponse {
        reservations: reservations.into_iter().map(ReservationDto::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v3/reservations/reservations",
    tag = "Reservations",
    security((), ("bearer_auth" = [])),
    request_body = ReservationBody,
    responses(
        (status = 201, description = "Reservation created", body = ReservationDto),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 409, description = "Overlaps an existing reservation", body = ErrorBody)
    )
)]
pub async fn create_reservation(
    State(state): State<ReservationAppState>,
    RequestId(trace): RequestId,
    CurrentActor(actor): CurrentActor,
    ValidatedJson(body): ValidatedJson<ReservationBody>,
) -> Result<Response, ApiError> {
    let draft = body.to_draft().map_err(|e| ApiError::from_domain(e, &trace))?;
    let reservation = state
        .service
        .create(&draft, &actor)
        .await
        .map_err(|e| ApiError::from_domain(e, &trace))?;

    Ok(created(reservation.into()))
}

#[utoipa::path(
    get,
    path = "/api/v3/reservations/reservations/{id}",
    tag = "Reservations",
    params(("id" = String, Path, description = "Reservation UUID")),
    responses(
        (status = 200, description = "Reservation in any state", body = ReservationDto),
        (status = 404, description = "Reservation not found", body = ErrorBody)
    )
)]
pub async fn get_reservation(
    State(state): State<ReservationAppState>,
    RequestId(trace): RequestId,
    Path(id): Path<String>,
) -> Result<Json<ReservationDto>, ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::not_found(&trace))?;
    let reservation = state
        .service
        .get(id)
        .await
        .map_err(|e| ApiError::from_domain(e, &trace))?;

    Ok(Json(reservation.into()))
}

#[utoipa::path(
    put,
    path = "/api/v3/reservations/reservations/{id}",
    tag = "Reservations",
    security((), ("bearer_auth" = [])),
    params(("id" = String, Path, description = "Reservation UUID")),
    request_body = ReservationBody,
    responses(
        (status = 200, description = "Reservation updated or restored", body = ReservationDto),
        (status = 201, description = "Reservation created under this id", body = ReservationDto),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Existing reservation requires authentication", body = ErrorBody),
        (status = 404, description = "Reservation is deleted", body = ErrorBody),
        (status = 409, description = "Overlaps an existing reservation", body = ErrorBody)
    )
)]
pub async fn update_reservation(
    State(state): State<ReservationAppState>,
    RequestId(trace): RequestId,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    ValidatedJson(body): ValidatedJson<ReservationBody>,
) -> Result<Response, ApiError> {
    let id = parse_write_id(&id, &trace)?;
    let update = body.to_update().map_err(|e| ApiError::from_domain(e, &trace))?;

    let outcome = state
        .service
        .update(id, &update, &actor)
        .await
        .map_err(|e| ApiError::from_domain(e, &trace))?;

    let was_created = outcome.is_created();
    let dto = ReservationDto::from(outcome.into_reservation());
    Ok(if was_created {
        created(dto)
    } else {
        Json(dto).into_response()
    })
}

#[utoipa::path(
    delete,
    path = "/api/v3/reservations/reservations/{id}",
    tag = "Reservations",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Reservation UUID"), DeleteQuery),
    responses(
        (status = 204, description = "Reservation deleted"),
        (status = 400, description = "Malformed id", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody),
        (status = 404, description = "Reservation not found or already deleted", body = ErrorBody)
    )
)]
pub async fn delete_reservation(
    State(state): State<ReservationAppState>,
    RequestId(trace): RequestId,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, ApiError> {
    let id = parse_write_id(&id, &trace)?;
    state
        .service
        .delete(id, query.is_permanent(), &actor)
        .await
        .map_err(|e| ApiError::from_domain(e, &trace))?;

    Ok(StatusCode::NO_CONTENT)
}
