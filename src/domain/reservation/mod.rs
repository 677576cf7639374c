//! Reservation aggregate
//!
//! Contains the Reservation entity, overlap validation, and the repository
//! interface.

pub mod model;
pub mod overlap;
pub mod repository;

pub use model::{
    parse_iso_date, Actor, DateRange, Reservation, ReservationDraft, ReservationFilter,
    ReservationState, ReservationUpdate,
};
pub use overlap::{find_conflict, first_conflict};
pub use repository::{ReservationRepository, ReservationTransaction};
