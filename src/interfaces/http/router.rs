//! API Router with Swagger UI

use std::sync::Arc;
use std::time::Duration;

use axum::{
    handler::Handler,
    middleware,
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::application::ReservationService;
use crate::interfaces::http::common::{ErrorBody, ErrorDetail};
use crate::interfaces::http::middleware::{optional_auth, require_auth, AuthState};
use crate::interfaces::http::modules::health::{self, HealthState};
use crate::interfaces::http::modules::metrics::{http_metrics_middleware, prometheus_metrics, MetricsState};
use crate::interfaces::http::modules::request_id::request_id_middleware;
use crate::interfaces::http::modules::reservations::{self, ReservationAppState};

/// Mount point of every API route
pub const API_BASE: &str = "/api/v3/reservations";

/// Security scheme modifier for OpenAPI
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Bearer token issued by the identity provider"))
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::service_status,
        health::health_check,
        health::liveness,
        health::readiness,
        // Reservations
        reservations::list_reservations,
        reservations::create_reservation,
        reservations::get_reservation,
        reservations::update_reservation,
        reservations::delete_reservation,
    ),
    components(
        schemas(
            ErrorBody,
            ErrorDetail,
            health::StatusResponse,
            health::HealthResponse,
            health::DatabasesHealth,
            health::DatabaseHealth,
            health::LivenessResponse,
            health::ReadinessResponse,
            reservations::ReservationBody,
            reservations::ReservationDto,
            reservations::ReservationListResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Service status, liveness and readiness probes"),
        (name = "Reservations", description = "Room reservations: create, update, restore, delete"),
    ),
    info(
        title = "Biletado Reservations API",
        version = "3.0.0",
        description = "Room reservations with overlap protection and soft deletion",
    )
)]
pub struct ApiDoc;

/// Create the API router with all routes
pub fn create_api_router(
    service: Arc<ReservationService>,
    auth: AuthState,
    prometheus: Option<PrometheusHandle>,
    probe_timeout: Duration,
) -> Router {
    let health_state = HealthState {
        repo: service.repository().clone(),
        probe_timeout,
    };
    let reservation_state = ReservationAppState { service };

    let optional = middleware::from_fn_with_state(auth.clone(), optional_auth);
    let required = middleware::from_fn_with_state(auth, require_auth);

    // Auth is layered per handler: reads are open, writes carry the principal
    // when present, deletes need one.
    let reservation_routes = Router::new()
        .route(
            "/reservations",
            get(reservations::list_reservations)
                .post(reservations::create_reservation.layer(optional.clone())),
        )
        .route(
            "/reservations/{id}",
            get(reservations::get_reservation)
                .put(reservations::update_reservation.layer(optional))
                .delete(reservations::delete_reservation.layer(required)),
        )
        .with_state(reservation_state);

    let health_routes = Router::new()
        .route("/status", get(health::service_status))
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(health_state);

    let mut app = Router::new()
        .nest(API_BASE, reservation_routes.merge(health_routes))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    if let Some(handle) = prometheus {
        app = app.merge(
            Router::new()
                .route("/metrics", get(prometheus_metrics))
                .with_state(MetricsState { handle }),
        );
    }

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    app.layer(middleware::from_fn(http_metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
