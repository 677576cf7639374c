//! Overlap validation
//!
//! Decides whether a candidate period collides with a live reservation of the
//! same room. The check is advisory: it gives callers a precise conflict
//! before writing, while the store's own guard stays authoritative.

use uuid::Uuid;

use super::model::{DateRange, Reservation};
use super::repository::ReservationTransaction;
use crate::domain::DomainResult;

/// First live reservation in `room_id` overlapping `period`, ignoring `exclude`.
pub fn first_conflict<'a, I>(
    candidates: I,
    room_id: Uuid,
    period: DateRange,
    exclude: Option<Uuid>,
) -> Option<&'a Reservation>
where
    I: IntoIterator<Item = &'a Reservation>,
{
    candidates.into_iter().find(|r| {
        r.is_live()
            && r.room_id == room_id
            && Some(r.id) != exclude
            && r.period.overlaps(&period)
    })
}

/// Run the store's overlap query inside `tx`.
pub async fn find_conflict(
    tx: &mut dyn ReservationTransaction,
    room_id: Uuid,
    period: DateRange,
    exclude: Option<Uuid>,
) -> DomainResult<Option<Reservation>> {
    tx.find_overlapping(room_id, period, exclude).await
}
