//! Token verification

pub mod jwt;

pub use jwt::{create_token, AuthError, JwtConfig, KeySource, TokenClaims, TokenVerifier};
