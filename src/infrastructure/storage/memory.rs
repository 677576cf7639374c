//! In-memory reservation store
//!
//! Transactions stage their writes locally and remember the committed row
//! they saw for every id they touch. Commit locks only the rooms and ids the
//! staged writes touch, rejects writes whose row changed underneath, re-checks the
//! no-overlap invariant against committed rows, then applies everything at
//! once.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::debug;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::reservation::{
    first_conflict, DateRange, Reservation, ReservationFilter, ReservationRepository,
    ReservationTransaction,
};
use crate::domain::{DomainError, DomainResult};

#[derive(Default)]
struct Shared {
    rows: DashMap<Uuid, Reservation>,
    room_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    id_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

fn lock_entry(locks: &DashMap<Uuid, Arc<Mutex<()>>>, key: Uuid) -> Arc<Mutex<()>> {
    locks
        .entry(key)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// In-memory storage for development and testing
#[derive(Clone, Default)]
pub struct InMemoryReservationRepository {
    shared: Arc<Shared>,
}

impl InMemoryReservationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReservationRepository for InMemoryReservationRepository {
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Reservation>> {
        Ok(self.shared.rows.get(&id).map(|r| r.value().clone()))
    }

    async fn find_all(&self, filter: &ReservationFilter) -> DomainResult<Vec<Reservation>> {
        let mut rows: Vec<Reservation> = self
            .shared
            .rows
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(|r| (r.period.start(), r.id));
        Ok(rows)
    }

    async fn begin(&self) -> DomainResult<Box<dyn ReservationTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            shared: Arc::clone(&self.shared),
            pending: HashMap::new(),
            observed: HashMap::new(),
        }))
    }

    async fn ping(&self) -> DomainResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Pending {
    Insert(Reservation),
    Replace(Reservation),
    Remove,
}

impl Pending {
    fn row(&self) -> Option<&Reservation> {
        match self {
            Pending::Insert(r) | Pending::Replace(r) => Some(r),
            Pending::Remove => None,
        }
    }
}

struct InMemoryTransaction {
    shared: Arc<Shared>,
    pending: HashMap<Uuid, Pending>,
    /// Committed row as first seen by this transaction, `None` when absent
    observed: HashMap<Uuid, Option<Reservation>>,
}

impl InMemoryTransaction {
    fn observe(&mut self, id: Uuid) {
        if !self.observed.contains_key(&id) {
            let committed = self.shared.rows.get(&id).map(|r| r.value().clone());
            self.observed.insert(id, committed);
        }
    }

    fn current(&self, id: Uuid) -> Option<Reservation> {
        match self.pending.get(&id) {
            Some(p) => p.row().cloned(),
            None => self.shared.rows.get(&id).map(|r| r.value().clone()),
        }
    }

    /// Committed rows with this transaction's writes laid over them.
    fn merged_view(&self) -> Vec<Reservation> {
        let mut view: Vec<Reservation> = self
            .shared
            .rows
            .iter()
            .filter(|r| !self.pending.contains_key(r.key()))
            .map(|r| r.value().clone())
            .collect();
        view.extend(self.pending.values().filter_map(|p| p.row().cloned()));
        view
    }

    fn touched_rooms(&self) -> BTreeSet<Uuid> {
        let mut rooms = BTreeSet::new();
        for (id, pending) in &self.pending {
            if let Some(row) = pending.row() {
                rooms.insert(row.room_id);
            }
            if let Some(committed) = self.shared.rows.get(id) {
                rooms.insert(committed.room_id);
            }
        }
        rooms
    }

    async fn lock_touched(&self) -> Vec<OwnedMutexGuard<()>> {
        // Rooms then ids, each in BTreeSet order, for every committer.
        let mut guards = Vec::new();
        for room in self.touched_rooms() {
            guards.push(lock_entry(&self.shared.room_locks, room).lock_owned().await);
        }
        let ids: BTreeSet<Uuid> = self.pending.keys().copied().collect();
        for id in ids {
            guards.push(lock_entry(&self.shared.id_locks, id).lock_owned().await);
        }
        guards
    }

    /// Every staged write must still see the committed row it was decided on.
    ///
    /// Erasing only needs the row to exist; any other write needs it unchanged.
    fn verify_observed(&self) -> DomainResult<()> {
        for (id, pending) in &self.pending {
            let committed = self.shared.rows.get(id).map(|r| r.value().clone());
            let seen = self.observed.get(id).cloned().flatten();
            if committed == seen {
                continue;
            }
            let err = match (pending, committed) {
                (Pending::Remove, Some(_)) => continue,
                // Another transaction created the same id first.
                (Pending::Insert(_), Some(_)) => DomainError::Conflict {
                    conflicting_id: None,
                },
                (_, Some(row)) if row.is_live() => DomainError::Conflict {
                    conflicting_id: None,
                },
                _ => DomainError::reservation_not_found(*id),
            };
            debug!("Reservation {} changed since it was read; rejecting commit", id);
            return Err(err);
        }
        Ok(())
    }

    fn verify_against_committed(&self) -> DomainResult<()> {
        self.verify_observed()?;

        let view = self.merged_view();
        for row in self.pending.values().filter_map(Pending::row) {
            if !row.is_live() {
                continue;
            }
            if first_conflict(&view, row.room_id, row.period, Some(row.id)).is_some() {
                return Err(DomainError::Conflict {
                    conflicting_id: None,
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ReservationTransaction for InMemoryTransaction {
    async fn find_by_id(&mut self, id: Uuid) -> DomainResult<Option<Reservation>> {
        self.observe(id);
        Ok(self.current(id))
    }

    async fn find_overlapping(
        &mut self,
        room_id: Uuid,
        period: DateRange,
        exclude: Option<Uuid>,
    ) -> DomainResult<Option<Reservation>> {
        let view = self.merged_view();
        Ok(first_conflict(&view, room_id, period, exclude).cloned())
    }

    async fn insert(&mut self, reservation: &Reservation) -> DomainResult<()> {
        self.observe(reservation.id);
        if self.current(reservation.id).is_some() {
            return Err(DomainError::Conflict {
                conflicting_id: None,
            });
        }
        let pending = if self.shared.rows.contains_key(&reservation.id) {
            Pending::Replace(reservation.clone())
        } else {
            Pending::Insert(reservation.clone())
        };
        self.pending.insert(reservation.id, pending);
        Ok(())
    }

    async fn replace(&mut self, reservation: &Reservation) -> DomainResult<()> {
        self.observe(reservation.id);
        if self.current(reservation.id).is_none() {
            return Err(DomainError::reservation_not_found(reservation.id));
        }
        let pending = match self.pending.get(&reservation.id) {
            Some(Pending::Insert(_)) => Pending::Insert(reservation.clone()),
            _ => Pending::Replace(reservation.clone()),
        };
        self.pending.insert(reservation.id, pending);
        Ok(())
    }

    async fn soft_delete(&mut self, id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        self.observe(id);
        let mut row = self
            .current(id)
            .filter(Reservation::is_live)
            .ok_or_else(|| DomainError::reservation_not_found(id))?;
        row.deleted_at = Some(at);
        self.replace(&row).await
    }

    async fn hard_delete(&mut self, id: Uuid) -> DomainResult<()> {
        self.observe(id);
        if self.current(id).is_none() {
            return Err(DomainError::reservation_not_found(id));
        }
        if matches!(self.pending.get(&id), Some(Pending::Insert(_))) {
            self.pending.remove(&id);
        } else {
            self.pending.insert(id, Pending::Remove);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> DomainResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let _guards = self.lock_touched().await;
        self.verify_against_committed()?;

        for (id, pending) in &self.pending {
            match pending {
                Pending::Insert(r) | Pending::Replace(r) => {
                    self.shared.rows.insert(*id, r.clone());
                }
                Pending::Remove => {
                    self.shared.rows.remove(id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn range(a: &str, b: &str) -> DateRange {
        DateRange::new(
            NaiveDate::parse_from_str(a, "%Y-%m-%d").unwrap(),
            NaiveDate::parse_from_str(b, "%Y-%m-%d").unwrap(),
        )
        .unwrap()
    }

    async fn insert_committed(repo: &InMemoryReservationRepository, r: &Reservation) -> DomainResult<()> {
        let mut tx = repo.begin().await?;
        tx.insert(r).await?;
        tx.commit().await
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible() {
        let repo = InMemoryReservationRepository::new();
        let r = Reservation::new(Uuid::new_v4(), Uuid::new_v4(), range("2025-03-01", "2025-03-05"));

        let mut tx = repo.begin().await.unwrap();
        tx.insert(&r).await.unwrap();
        assert_eq!(tx.find_by_id(r.id).await.unwrap(), Some(r.clone()));
        assert!(repo.find_by_id(r.id).await.unwrap().is_none());
        drop(tx);

        assert!(repo.find_by_id(r.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_rejects_overlap_without_advisory_check() {
        let repo = InMemoryReservationRepository::new();
        let room = Uuid::new_v4();
        let first = Reservation::new(Uuid::new_v4(), room, range("2025-03-01", "2025-03-05"));
        let second = Reservation::new(Uuid::new_v4(), room, range("2025-03-04", "2025-03-06"));

        insert_committed(&repo, &first).await.unwrap();
        let err = insert_committed(&repo, &second).await.unwrap_err();

        assert!(matches!(err, DomainError::Conflict { conflicting_id: None }));
        assert!(repo.find_by_id(second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn racing_transactions_cannot_both_commit() {
        let repo = InMemoryReservationRepository::new();
        let room = Uuid::new_v4();
        let a = Reservation::new(Uuid::new_v4(), room, range("2025-03-01", "2025-03-05"));
        let b = Reservation::new(Uuid::new_v4(), room, range("2025-03-03", "2025-03-08"));

        // Both pass the advisory check before either commits.
        let mut tx_a = repo.begin().await.unwrap();
        let mut tx_b = repo.begin().await.unwrap();
        assert!(tx_a.find_overlapping(room, a.period, None).await.unwrap().is_none());
        assert!(tx_b.find_overlapping(room, b.period, None).await.unwrap().is_none());
        tx_a.insert(&a).await.unwrap();
        tx_b.insert(&b).await.unwrap();

        tx_a.commit().await.unwrap();
        assert!(matches!(
            tx_b.commit().await,
            Err(DomainError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn soft_deleted_rows_free_the_slot() {
        let repo = InMemoryReservationRepository::new();
        let room = Uuid::new_v4();
        let first = Reservation::new(Uuid::new_v4(), room, range("2025-03-01", "2025-03-05"));
        insert_committed(&repo, &first).await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        tx.soft_delete(first.id, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        let again = Reservation::new(Uuid::new_v4(), room, range("2025-03-01", "2025-03-05"));
        insert_committed(&repo, &again).await.unwrap();

        let live = repo.find_all(&ReservationFilter::default()).await.unwrap();
        assert_eq!(live, vec![again]);
        let all = repo
            .find_all(&ReservationFilter {
                include_deleted: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn hard_delete_removes_row() {
        let repo = InMemoryReservationRepository::new();
        let r = Reservation::new(Uuid::new_v4(), Uuid::new_v4(), range("2025-03-01", "2025-03-05"));
        insert_committed(&repo, &r).await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        tx.hard_delete(r.id).await.unwrap();
        assert!(tx.find_by_id(r.id).await.unwrap().is_none());
        tx.commit().await.unwrap();

        assert!(repo.find_by_id(r.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replace_after_concurrent_hard_delete_is_not_found() {
        let repo = InMemoryReservationRepository::new();
        let r = Reservation::new(Uuid::new_v4(), Uuid::new_v4(), range("2025-03-01", "2025-03-05"));
        insert_committed(&repo, &r).await.unwrap();

        let mut updater = repo.begin().await.unwrap();
        let mut moved = r.clone();
        moved.period = range("2025-04-01", "2025-04-05");
        updater.replace(&moved).await.unwrap();

        let mut deleter = repo.begin().await.unwrap();
        deleter.hard_delete(r.id).await.unwrap();
        deleter.commit().await.unwrap();

        assert!(matches!(
            updater.commit().await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn second_of_two_racing_soft_deletes_is_not_found() {
        let repo = InMemoryReservationRepository::new();
        let r = Reservation::new(Uuid::new_v4(), Uuid::new_v4(), range("2025-03-01", "2025-03-05"));
        insert_committed(&repo, &r).await.unwrap();

        let mut first = repo.begin().await.unwrap();
        let mut second = repo.begin().await.unwrap();
        assert!(first.find_by_id(r.id).await.unwrap().unwrap().is_live());
        assert!(second.find_by_id(r.id).await.unwrap().unwrap().is_live());

        let first_at = Utc::now() - chrono::Duration::minutes(5);
        first.soft_delete(r.id, first_at).await.unwrap();
        second.soft_delete(r.id, Utc::now()).await.unwrap();

        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await,
            Err(DomainError::NotFound { .. })
        ));

        let stored = repo.find_by_id(r.id).await.unwrap().unwrap();
        assert_eq!(stored.deleted_at, Some(first_at));
    }

    #[tokio::test]
    async fn update_read_before_concurrent_soft_delete_cannot_revive_row() {
        let repo = InMemoryReservationRepository::new();
        let r = Reservation::new(Uuid::new_v4(), Uuid::new_v4(), range("2025-03-01", "2025-03-05"));
        insert_committed(&repo, &r).await.unwrap();

        let mut updater = repo.begin().await.unwrap();
        let seen = updater.find_by_id(r.id).await.unwrap().unwrap();
        assert!(seen.is_live());

        let mut deleter = repo.begin().await.unwrap();
        deleter.soft_delete(r.id, Utc::now()).await.unwrap();
        deleter.commit().await.unwrap();

        let mut moved = seen.clone();
        moved.period = range("2025-03-02", "2025-03-06");
        updater.replace(&moved).await.unwrap();
        assert!(matches!(
            updater.commit().await,
            Err(DomainError::NotFound { .. })
        ));

        let stored = repo.find_by_id(r.id).await.unwrap().unwrap();
        assert!(!stored.is_live());
        assert_eq!(stored.period, r.period);
    }

    #[tokio::test]
    async fn soft_delete_of_deleted_row_is_not_found() {
        let repo = InMemoryReservationRepository::new();
        let mut r = Reservation::new(Uuid::new_v4(), Uuid::new_v4(), range("2025-03-01", "2025-03-05"));
        r.deleted_at = Some(Utc::now());
        insert_committed(&repo, &r).await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        assert!(matches!(
            tx.soft_delete(r.id, Utc::now()).await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn permanent_delete_survives_concurrent_soft_delete() {
        let repo = InMemoryReservationRepository::new();
        let r = Reservation::new(Uuid::new_v4(), Uuid::new_v4(), range("2025-03-01", "2025-03-05"));
        insert_committed(&repo, &r).await.unwrap();

        let mut eraser = repo.begin().await.unwrap();
        eraser.find_by_id(r.id).await.unwrap();
        let mut deleter = repo.begin().await.unwrap();
        deleter.soft_delete(r.id, Utc::now()).await.unwrap();
        deleter.commit().await.unwrap();

        eraser.hard_delete(r.id).await.unwrap();
        eraser.commit().await.unwrap();
        assert!(repo.find_by_id(r.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn racing_inserts_of_one_id_conflict() {
        let repo = InMemoryReservationRepository::new();
        let id = Uuid::new_v4();
        let a = Reservation::new(id, Uuid::new_v4(), range("2025-03-01", "2025-03-05"));
        let b = Reservation::new(id, Uuid::new_v4(), range("2025-04-01", "2025-04-05"));

        let mut tx_a = repo.begin().await.unwrap();
        let mut tx_b = repo.begin().await.unwrap();
        assert!(tx_a.find_by_id(id).await.unwrap().is_none());
        assert!(tx_b.find_by_id(id).await.unwrap().is_none());
        tx_a.insert(&a).await.unwrap();
        tx_b.insert(&b).await.unwrap();

        tx_a.commit().await.unwrap();
        assert!(matches!(
            tx_b.commit().await,
            Err(DomainError::Conflict { conflicting_id: None })
        ));
        assert_eq!(repo.find_by_id(id).await.unwrap(), Some(a));
    }
}
