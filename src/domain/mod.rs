pub mod reservation;

pub use reservation::{Reservation, ReservationRepository};

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

pub use crate::shared::errors::DomainError;
