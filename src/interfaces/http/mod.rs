//! HTTP REST API interfaces
//!
//! - `common`: Error envelope and validated JSON extractor
//! - `middleware`: Bearer token authentication
//! - `modules`: Reservation, health and metrics endpoints
//! - `router`: API router with Swagger documentation

pub mod common;
pub mod middleware;
pub mod modules;
pub mod router;

pub use router::create_api_router;
