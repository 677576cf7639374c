//! JWT Token handling
//!
//! Tokens are issued elsewhere (Keycloak in production). This module only
//! verifies them, either against a shared HS256 secret or against the
//! identity provider's published RS256 key set.

use std::time::{Duration, Instant};

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication token")]
    MissingToken,
    #[error("Invalid authentication token")]
    InvalidToken,
    #[error("Token has expired")]
    ExpiredToken,
    #[error("Signing keys unavailable: {0}")]
    KeysUnavailable(String),
}

/// Where verification keys come from
#[derive(Clone, Debug)]
pub enum KeySource {
    /// Shared HS256 secret
    Secret(String),
    /// JWKS document, fetched lazily and cached
    Jwks {
        url: String,
        timeout: Duration,
        /// Unknown `kid`s refetch the set at most once per this interval
        min_refetch: Duration,
    },
}

pub const DEFAULT_MIN_REFETCH: Duration = Duration::from_secs(30);

/// JWT configuration
#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub keys: KeySource,
    /// Expected `iss`; not checked when `None`
    pub issuer: Option<String>,
}

impl JwtConfig {
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            keys: KeySource::Secret(secret.into()),
            issuer: None,
        }
    }

    /// Keycloak realm certificate endpoint
    pub fn keycloak(host: &str, realm: &str, timeout: Duration) -> Self {
        Self {
            keys: KeySource::Jwks {
                url: format!(
                    "http://{}/auth/realms/{}/protocol/openid-connect/certs",
                    host, realm
                ),
                timeout,
                min_refetch: DEFAULT_MIN_REFETCH,
            },
            issuer: None,
        }
    }

    /// Change the JWKS refetch interval; no effect on a shared secret
    pub fn with_min_refetch(mut self, interval: Duration) -> Self {
        if let KeySource::Jwks { min_refetch, .. } = &mut self.keys {
            *min_refetch = interval;
        }
        self
    }
}

/// JWT TokenClaims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl TokenClaims {
    /// Claims for `subject`, valid for `ttl` from now
    pub fn new(subject: &str, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: Some(subject.to_string()),
            preferred_username: None,
            exp: (now + ttl).timestamp(),
            iat: Some(now.timestamp()),
            iss: None,
        }
    }

    /// Principal id: `sub`, falling back to `preferred_username`
    pub fn principal(&self) -> Option<&str> {
        self.sub
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.preferred_username.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Sign claims with an HS256 secret
pub fn create_token(claims: &TokenClaims, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> AuthError {
    match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        _ => {
            debug!("Token rejected: {}", e);
            AuthError::InvalidToken
        }
    }
}

/// Verifies bearer tokens against the configured key source.
pub struct TokenVerifier {
    config: JwtConfig,
    http: reqwest::Client,
    jwks: RwLock<Option<JwkSet>>,
    last_fetch: Mutex<Option<Instant>>,
}

impl TokenVerifier {
    pub fn new(config: JwtConfig) -> Result<Self, AuthError> {
        let timeout = match &config.keys {
            KeySource::Jwks { timeout, .. } => *timeout,
            KeySource::Secret(_) => Duration::from_secs(3),
        };
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::KeysUnavailable(e.to_string()))?;
        Ok(Self {
            config,
            http,
            jwks: RwLock::new(None),
            last_fetch: Mutex::new(None),
        })
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.validate_aud = false;
        if let Some(issuer) = &self.config.issuer {
            validation.set_issuer(&[issuer]);
        }
        validation
    }

    /// Verify and decode a token
    pub async fn verify(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let claims = match &self.config.keys {
            KeySource::Secret(secret) => {
                decode::<TokenClaims>(
                    token,
                    &DecodingKey::from_secret(secret.as_bytes()),
                    &self.validation(Algorithm::HS256),
                )
                .map_err(map_jwt_error)?
                .claims
            }
            KeySource::Jwks {
                url, min_refetch, ..
            } => {
                let header = decode_header(token).map_err(map_jwt_error)?;
                if header.alg != Algorithm::RS256 {
                    debug!(alg = ?header.alg, "Token algorithm not accepted for JWKS keys");
                    return Err(AuthError::InvalidToken);
                }
                let kid = header.kid.ok_or(AuthError::InvalidToken)?;
                let jwk = self.key_for(url, &kid, *min_refetch).await?;
                if matches!(jwk.common.key_algorithm, Some(ref alg) if *alg != KeyAlgorithm::RS256) {
                    return Err(AuthError::InvalidToken);
                }
                let key = DecodingKey::from_jwk(&jwk).map_err(map_jwt_error)?;
                decode::<TokenClaims>(token, &key, &self.validation(Algorithm::RS256))
                    .map_err(map_jwt_error)?
                    .claims
            }
        };

        if claims.principal().is_none() {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Cached key for `kid`, refetching the set when it is unknown and the
    /// last fetch is older than `min_refetch`
    async fn key_for(&self, url: &str, kid: &str, min_refetch: Duration) -> Result<Jwk, AuthError> {
        if let Some(jwk) = self.cached(kid).await {
            return Ok(jwk);
        }

        let mut last_fetch = self.last_fetch.lock().await;
        // Another request may have refreshed the set while this one waited.
        if let Some(jwk) = self.cached(kid).await {
            return Ok(jwk);
        }
        let have_keys = self.jwks.read().await.is_some();
        if let (true, Some(at)) = (have_keys, *last_fetch) {
            if at.elapsed() < min_refetch {
                debug!(kid = %kid, "Unknown key, JWKS refetch throttled");
                return Err(AuthError::InvalidToken);
            }
        }
        *last_fetch = Some(Instant::now());

        let fresh = self.fetch_jwks(url).await?;
        let found = fresh.find(kid).cloned();
        *self.jwks.write().await = Some(fresh);
        drop(last_fetch);
        found.ok_or_else(|| {
            warn!(kid = %kid, "Token signed with unknown key");
            AuthError::InvalidToken
        })
    }

    async fn cached(&self, kid: &str) -> Option<Jwk> {
        self.jwks
            .read()
            .await
            .as_ref()
            .and_then(|set| set.find(kid).cloned())
    }

    async fn fetch_jwks(&self, url: &str) -> Result<JwkSet, AuthError> {
        debug!(url = %url, "Fetching JWKS");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::KeysUnavailable(e.to_string()))?;
        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::KeysUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{routing::get, Json, Router};

    const SECRET: &str = "unit-test-secret";

    #[tokio::test]
    async fn verifies_hs256_token() {
        let verifier = TokenVerifier::new(JwtConfig::with_secret(SECRET)).unwrap();
        let token = create_token(&TokenClaims::new("alice", chrono::Duration::hours(1)), SECRET).unwrap();

        let claims = verifier.verify(&token).await.unwrap();
        assert_eq!(claims.principal(), Some("alice"));
    }

    #[tokio::test]
    async fn rejects_wrong_secret_and_garbage() {
        let verifier = TokenVerifier::new(JwtConfig::with_secret(SECRET)).unwrap();
        let token = create_token(&TokenClaims::new("alice", chrono::Duration::hours(1)), "other").unwrap();

        assert!(matches!(verifier.verify(&token).await, Err(AuthError::InvalidToken)));
        assert!(matches!(verifier.verify("not-a-jwt").await, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn expired_token_is_reported_as_such() {
        let verifier = TokenVerifier::new(JwtConfig::with_secret(SECRET)).unwrap();
        let token = create_token(&TokenClaims::new("alice", chrono::Duration::hours(-2)), SECRET).unwrap();

        assert!(matches!(verifier.verify(&token).await, Err(AuthError::ExpiredToken)));
    }

    #[tokio::test]
    async fn issuer_is_checked_only_when_configured() {
        let mut claims = TokenClaims::new("alice", chrono::Duration::hours(1));
        claims.iss = Some("http://elsewhere".into());
        let token = create_token(&claims, SECRET).unwrap();

        let lenient = TokenVerifier::new(JwtConfig::with_secret(SECRET)).unwrap();
        assert!(lenient.verify(&token).await.is_ok());

        let mut config = JwtConfig::with_secret(SECRET);
        config.issuer = Some("http://keycloak/auth/realms/biletado".into());
        let strict = TokenVerifier::new(config).unwrap();
        assert!(matches!(strict.verify(&token).await, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn principal_falls_back_to_preferred_username() {
        let mut claims = TokenClaims::new("", chrono::Duration::hours(1));
        assert_eq!(claims.principal(), None);
        claims.preferred_username = Some("bob".into());
        assert_eq!(claims.principal(), Some("bob"));
        claims.sub = Some("id-1".into());
        assert_eq!(claims.principal(), Some("id-1"));
    }

    #[test]
    fn keycloak_url_points_at_realm_certs() {
        let config = JwtConfig::keycloak("keycloak:8080", "biletado", Duration::from_secs(3));
        match config.keys {
            KeySource::Jwks { url, .. } => assert_eq!(
                url,
                "http://keycloak:8080/auth/realms/biletado/protocol/openid-connect/certs"
            ),
            KeySource::Secret(_) => panic!("expected JWKS source"),
        }
    }

    const JWKS_SIGNING_KEY: &str = include_str!("testdata/jwks_signing_key.pem");
    const JWKS_MODULUS: &str = "shX5Y4YG4uOwYHkNLB5xM9CRaeuslMXthm6DGeTJoVoKvDjXwSvF5RcKPLuhG_0rmeyvfWzvHnJtAQEdd374h6uzJgjn2pQBPxPfmCAAMVgsphkR5GEsA1tACoBMArcjyagg7vNhaNZ4_-d2dN5oppdtZgKJQOlx43ch_OO7VQD3uxsYhIAcgAGk9O5_U76xblB_0yRm9DoFCzQe4IPo6fXcKOIrdKWADLpmnHMDSsWA6zKOO1jcm2APP6RVawpAor-e7-aso1iXJqbC_qiwuqQ82mD0ve4K_oXZYvNetWS_wOPZeFakh3qZGS1IGTnAySxikdZ1PuF46wRHA0VfOw";

    async fn serve_jwks(hits: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/certs",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({
                        "keys": [{
                            "kty": "RSA",
                            "kid": "k1",
                            "alg": "RS256",
                            "use": "sig",
                            "n": JWKS_MODULUS,
                            "e": "AQAB"
                        }]
                    }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/certs", addr)
    }

    fn jwks_verifier(url: String, min_refetch: Duration) -> TokenVerifier {
        let config = JwtConfig {
            keys: KeySource::Jwks {
                url,
                timeout: Duration::from_secs(3),
                min_refetch: DEFAULT_MIN_REFETCH,
            },
            issuer: None,
        };
        TokenVerifier::new(config.with_min_refetch(min_refetch)).unwrap()
    }

    fn signed_with_kid(kid: &str) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(
            &header,
            &TokenClaims::new("carol", chrono::Duration::hours(1)),
            &EncodingKey::from_rsa_pem(JWKS_SIGNING_KEY.as_bytes()).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn jwks_keys_are_cached_and_refetched_for_unknown_kid() {
        let hits = Arc::new(AtomicUsize::new(0));
        let verifier = jwks_verifier(serve_jwks(hits.clone()).await, Duration::ZERO);

        let token = signed_with_kid("k1");
        assert_eq!(verifier.verify(&token).await.unwrap().principal(), Some("carol"));
        assert!(verifier.verify(&token).await.is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let unknown = signed_with_kid("rotated");
        assert!(matches!(verifier.verify(&unknown).await, Err(AuthError::InvalidToken)));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_kid_refetches_at_most_once_per_interval() {
        let hits = Arc::new(AtomicUsize::new(0));
        let verifier = jwks_verifier(serve_jwks(hits.clone()).await, Duration::from_secs(3600));

        assert!(verifier.verify(&signed_with_kid("k1")).await.is_ok());
        for kid in ["a", "b", "c"] {
            assert!(matches!(
                verifier.verify(&signed_with_kid(kid)).await,
                Err(AuthError::InvalidToken)
            ));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(verifier.verify(&signed_with_kid("k1")).await.is_ok());
    }

    #[tokio::test]
    async fn jwks_source_accepts_only_rs256() {
        let hits = Arc::new(AtomicUsize::new(0));
        let verifier = jwks_verifier(serve_jwks(hits.clone()).await, Duration::ZERO);

        // HS256 signed with the public modulus must not pass as a key-set token.
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("k1".into());
        let forged = encode(
            &header,
            &TokenClaims::new("mallory", chrono::Duration::hours(1)),
            &EncodingKey::from_secret(JWKS_MODULUS.as_bytes()),
        )
        .unwrap();

        assert!(matches!(verifier.verify(&forged).await, Err(AuthError::InvalidToken)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_jwks_reports_keys_unavailable() {
        let verifier = TokenVerifier::new(JwtConfig {
            keys: KeySource::Jwks {
                url: "http://127.0.0.1:1/certs".into(),
                timeout: Duration::from_millis(500),
                min_refetch: DEFAULT_MIN_REFETCH,
            },
            issuer: None,
        })
        .unwrap();

        assert!(matches!(
            verifier.verify(&signed_with_kid("k1")).await,
            Err(AuthError::KeysUnavailable(_))
        ));
    }
}
