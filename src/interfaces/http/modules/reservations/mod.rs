//! Reservation CRUD endpoints

pub mod dto;
pub mod handlers;

pub use dto::{ReservationBody, ReservationDto, ReservationListResponse};
pub use handlers::*;
