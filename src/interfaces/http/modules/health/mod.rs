//! Status, liveness and readiness probes

pub mod handlers;

pub use handlers::*;
