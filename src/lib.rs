//! # Biletado Reservations
//!
//! Room reservation service: overlap validation, soft deletion, restore and
//! permanent removal behind a REST API.
//!
//! ## Architecture
//!
//! - **domain**: Reservation model, overlap rules and the repository port
//! - **application**: `ReservationService` lifecycle operations and auditing
//! - **infrastructure**: SeaORM and in-memory stores, token verification
//! - **interfaces**: Axum REST API with Swagger documentation
//! - **server**: Process runtime shared by the CLI

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod server;
pub mod shared;

pub use config::{default_config_path, AppConfig};

// Re-export database types for easy access
pub use infrastructure::{init_database, DatabaseConfig, InMemoryReservationRepository};

// Re-export API router
pub use interfaces::http::create_api_router;
