//! Authentication middleware for Axum

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::domain::reservation::Actor;
use crate::infrastructure::crypto::{AuthError, TokenClaims, TokenVerifier};
use crate::interfaces::http::common::ApiError;
use crate::interfaces::http::modules::request_id::RequestId;

/// Authentication state shared by the auth layers
#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<TokenVerifier>,
}

impl AuthState {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self {
            verifier: Arc::new(verifier),
        }
    }
}

/// Principal extracted from a verified bearer token
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: &TokenClaims) -> Option<Self> {
        claims.principal().map(|id| Self {
            user_id: id.to_string(),
        })
    }
}

/// Acting principal of the request, [`Actor::Anonymous`] when no valid token was sent
pub struct CurrentActor(pub Actor);

impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CurrentActor(
            parts
                .extensions
                .get::<AuthenticatedUser>()
                .map(|u| Actor::Principal(u.user_id.clone()))
                .unwrap_or(Actor::Anonymous),
        ))
    }
}

fn extract_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn bearer_token(request: &Request<Body>) -> Result<String, AuthError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingToken)?;
    extract_token(auth_header)
        .map(String::from)
        .ok_or(AuthError::InvalidToken)
}

// Takes the token by value: `Body` is not `Sync`, so no request borrow may
// live across the verification await.
async fn authenticate(
    auth_state: &AuthState,
    token: Result<String, AuthError>,
) -> Result<AuthenticatedUser, AuthError> {
    let claims = auth_state.verifier.verify(&token?).await?;
    AuthenticatedUser::from_claims(&claims).ok_or(AuthError::InvalidToken)
}

/// Rejects requests without a valid bearer token
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match authenticate(&auth_state, bearer_token(&request)).await {
        Ok(user) => {
            debug!(user_id = %user.user_id, "Authenticated request");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(error) => {
            let trace = RequestId::from_extensions(request.extensions());
            auth_error_response(error, &trace.0)
        }
    }
}

/// Attaches the principal when a valid token is present; anonymous otherwise
pub async fn optional_auth(
    State(auth_state): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match authenticate(&auth_state, bearer_token(&request)).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
        }
        Err(AuthError::MissingToken) => {}
        Err(error) => debug!("Ignoring unusable token: {}", error),
    }

    next.run(request).await
}

fn auth_error_response(error: AuthError, trace: &str) -> Response {
    if let AuthError::KeysUnavailable(cause) = &error {
        warn!(trace = %trace, error = %cause, "Cannot verify token");
    }
    ApiError::unauthorized(error.to_string(), trace).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{middleware, Router};
    use tower::Service;

    use crate::infrastructure::crypto::{create_token, JwtConfig};

    const SECRET: &str = "middleware-secret";

    async fn whoami(CurrentActor(actor): CurrentActor) -> String {
        actor.to_string()
    }

    fn app() -> Router {
        let state = AuthState::new(TokenVerifier::new(JwtConfig::with_secret(SECRET)).unwrap());
        let protected = Router::new()
            .route("/protected", get(whoami))
            .layer(middleware::from_fn_with_state(state.clone(), require_auth));
        let open = Router::new()
            .route("/open", get(whoami))
            .layer(middleware::from_fn_with_state(state, optional_auth));
        protected.merge(open)
    }

    fn bearer(sub: &str) -> String {
        let token = create_token(&TokenClaims::new(sub, chrono::Duration::hours(1)), SECRET).unwrap();
        format!("Bearer {}", token)
    }

    async fn call(uri: &str, auth: Option<&str>) -> (StatusCode, String) {
        let mut req = Request::builder().uri(uri);
        if let Some(value) = auth {
            req = req.header(header::AUTHORIZATION, value);
        }
        let resp = app()
            .into_service()
            .call(req.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn require_auth_rejects_missing_and_bad_tokens() {
        let (status, body) = call("/protected", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("not_authorized"));

        let (status, _) = call("/protected", Some("Bearer garbage")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call("/protected", Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn require_auth_passes_principal() {
        let (status, body) = call("/protected", Some(&bearer("alice"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "alice");
    }

    #[tokio::test]
    async fn optional_auth_falls_back_to_anonymous() {
        assert_eq!(call("/open", None).await, (StatusCode::OK, "anonymous".into()));
        assert_eq!(
            call("/open", Some("Bearer garbage")).await,
            (StatusCode::OK, "anonymous".into())
        );
        assert_eq!(
            call("/open", Some(&bearer("bob"))).await,
            (StatusCode::OK, "bob".into())
        );
    }
}
