//! Reservation repository interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::model::{DateRange, Reservation, ReservationFilter};
use crate::domain::DomainResult;

/// Persistence for reservations.
///
/// Implementations must reject, on their own, any committed write that would
/// leave two live reservations of one room overlapping, and report it as
/// [`DomainError::Conflict`](crate::domain::DomainError::Conflict).
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Find reservation by ID, in any state
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Reservation>>;

    /// Find reservations matching the filter (ordering unspecified)
    async fn find_all(&self, filter: &ReservationFilter) -> DomainResult<Vec<Reservation>>;

    /// Open an atomic unit of work
    async fn begin(&self) -> DomainResult<Box<dyn ReservationTransaction>>;

    /// Check that the backing store answers
    async fn ping(&self) -> DomainResult<()>;
}

/// One atomic unit of work over the reservation store.
///
/// Reads observe the transaction's own writes. Dropping the transaction
/// without calling [`commit`](Self::commit) discards every write.
#[async_trait]
pub trait ReservationTransaction: Send {
    async fn find_by_id(&mut self, id: Uuid) -> DomainResult<Option<Reservation>>;

    /// Any live reservation of `room_id` overlapping `period`, skipping `exclude`
    async fn find_overlapping(
        &mut self,
        room_id: Uuid,
        period: DateRange,
        exclude: Option<Uuid>,
    ) -> DomainResult<Option<Reservation>>;

    async fn insert(&mut self, reservation: &Reservation) -> DomainResult<()>;

    /// Replace every field of an existing row, `deleted_at` included
    async fn replace(&mut self, reservation: &Reservation) -> DomainResult<()>;

    async fn soft_delete(&mut self, id: Uuid, at: DateTime<Utc>) -> DomainResult<()>;

    async fn hard_delete(&mut self, id: Uuid) -> DomainResult<()>;

    async fn commit(self: Box<Self>) -> DomainResult<()>;
}
