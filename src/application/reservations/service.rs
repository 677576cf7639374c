//! Reservation lifecycle service
//!
//! Runs the Absent / Active / Deleted state machine. Each operation opens one
//! unit of work on the store, checks for overlaps inside it, writes, commits
//! and then records an audit event. The whole operation is bounded by the
//! request timeout; when it elapses the open transaction is dropped and
//! nothing is written.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::audit::{AuditAction, AuditEvent, AuditSink};
use crate::domain::reservation::{
    find_conflict, Actor, DateRange, Reservation, ReservationDraft, ReservationFilter,
    ReservationRepository, ReservationState, ReservationTransaction, ReservationUpdate,
};
use crate::domain::{DomainError, DomainResult};

/// What an update against a missing id does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingUpdatePolicy {
    /// Create the reservation under the requested id
    #[default]
    Upsert,
    /// Answer NotFound
    Reject,
}

/// Result of [`ReservationService::update`]
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated(Reservation),
    Restored(Reservation),
    /// The id was unknown and the reservation was created under it
    Created(Reservation),
}

impl UpdateOutcome {
    pub fn into_reservation(self) -> Reservation {
        match self {
            UpdateOutcome::Updated(r) | UpdateOutcome::Restored(r) | UpdateOutcome::Created(r) => r,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, UpdateOutcome::Created(_))
    }
}

/// Service for reservation lifecycle operations
pub struct ReservationService {
    repo: Arc<dyn ReservationRepository>,
    audit: Arc<dyn AuditSink>,
    request_timeout: Duration,
    missing_update: MissingUpdatePolicy,
}

impl ReservationService {
    pub fn new(repo: Arc<dyn ReservationRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            repo,
            audit,
            request_timeout: Duration::from_secs(5),
            missing_update: MissingUpdatePolicy::default(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_missing_update(mut self, policy: MissingUpdatePolicy) -> Self {
        self.missing_update = policy;
        self
    }

    pub fn repository(&self) -> &Arc<dyn ReservationRepository> {
        &self.repo
    }

    async fn within_deadline<T, F>(&self, operation: &'static str, fut: F) -> DomainResult<T>
    where
        F: Future<Output = DomainResult<T>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "Reservation operation timed out; transaction rolled back"
                );
                Err(DomainError::Internal(format!(
                    "{} timed out after {:?}",
                    operation, self.request_timeout
                )))
            }
        };
        record_operation(operation, &result, start);
        result
    }

    /// Get a reservation in any state
    pub async fn get(&self, id: Uuid) -> DomainResult<Reservation> {
        self.within_deadline("get", async {
            self.repo
                .find_by_id(id)
                .await?
                .ok_or_else(|| DomainError::reservation_not_found(id))
        })
        .await
    }

    pub async fn list(&self, filter: &ReservationFilter) -> DomainResult<Vec<Reservation>> {
        self.within_deadline("list", self.repo.find_all(filter)).await
    }

    /// Create a reservation under a fresh id
    pub async fn create(&self, draft: &ReservationDraft, actor: &Actor) -> DomainResult<Reservation> {
        let (room_id, period) = draft.validate()?;
        let id = Uuid::new_v4();

        let created = self
            .within_deadline("create", async {
                let mut tx = self.repo.begin().await?;
                let reservation = insert_checked(tx.as_mut(), id, room_id, period).await?;
                tx.commit().await?;
                Ok::<_, DomainError>(reservation)
            })
            .await?;

        self.record(AuditAction::Create, created.id, actor);
        Ok(created)
    }

    /// Replace the fields of `id`, restore it, or create it under that id
    pub async fn update(
        &self,
        id: Uuid,
        update: &ReservationUpdate,
        actor: &Actor,
    ) -> DomainResult<UpdateOutcome> {
        let outcome = self
            .within_deadline("update", async {
                let mut tx = self.repo.begin().await?;
                let outcome = match tx.find_by_id(id).await? {
                    None => self.create_missing(tx.as_mut(), id, &update.draft).await?,
                    Some(current) => replace_existing(tx.as_mut(), current, update, actor).await?,
                };
                tx.commit().await?;
                Ok::<_, DomainError>(outcome)
            })
            .await?;

        let action = match &outcome {
            UpdateOutcome::Updated(_) => AuditAction::Update,
            UpdateOutcome::Restored(_) => AuditAction::Restore,
            UpdateOutcome::Created(_) => AuditAction::Create,
        };
        self.record(action, id, actor);
        Ok(outcome)
    }

    /// Soft delete, or erase with `permanent`
    pub async fn delete(&self, id: Uuid, permanent: bool, actor: &Actor) -> DomainResult<()> {
        if actor.is_anonymous() {
            return Err(DomainError::Unauthorized(
                "authentication required to delete a reservation".to_string(),
            ));
        }

        let action = self
            .within_deadline("delete", async {
                let mut tx = self.repo.begin().await?;
                let current = tx
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| DomainError::reservation_not_found(id))?;

                let action = match (permanent, current.state()) {
                    (true, _) => {
                        tx.hard_delete(id).await?;
                        AuditAction::PermanentDelete
                    }
                    (false, ReservationState::Active) => {
                        tx.soft_delete(id, Utc::now()).await?;
                        AuditAction::SoftDelete
                    }
                    (false, ReservationState::Deleted) => {
                        return Err(DomainError::reservation_not_found(id));
                    }
                };
                tx.commit().await?;
                Ok::<_, DomainError>(action)
            })
            .await?;

        self.record(action, id, actor);
        Ok(())
    }

    async fn create_missing(
        &self,
        tx: &mut dyn ReservationTransaction,
        id: Uuid,
        draft: &ReservationDraft,
    ) -> DomainResult<UpdateOutcome> {
        if self.missing_update == MissingUpdatePolicy::Reject {
            return Err(DomainError::reservation_not_found(id));
        }
        let (room_id, period) = draft.validate()?;
        let reservation = insert_checked(tx, id, room_id, period).await?;
        Ok(UpdateOutcome::Created(reservation))
    }

    fn record(&self, action: AuditAction, id: Uuid, actor: &Actor) {
        self.audit.record(AuditEvent::reservation(action, id, actor));
    }
}

/// Record operation latency and outcome to Prometheus.
fn record_operation<T>(operation: &'static str, result: &DomainResult<T>, start: Instant) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(DomainError::Validation(_)) => "invalid",
        Err(DomainError::Conflict { .. }) => "conflict",
        Err(DomainError::NotFound { .. }) => "not_found",
        Err(DomainError::Unauthorized(_)) => "unauthorized",
        Err(DomainError::Internal(_)) => "error",
    };
    metrics::histogram!("reservation_operation_duration_seconds", "operation" => operation)
        .record(start.elapsed().as_secs_f64());
    metrics::counter!("reservation_operations_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
}

async fn ensure_free(
    tx: &mut dyn ReservationTransaction,
    room_id: Uuid,
    period: DateRange,
    exclude: Option<Uuid>,
) -> DomainResult<()> {
    if let Some(existing) = find_conflict(tx, room_id, period, exclude).await? {
        info!(
            room_id = %room_id,
            conflicting_id = %existing.id,
            "Rejected overlapping reservation"
        );
        return Err(DomainError::Conflict {
            conflicting_id: Some(existing.id),
        });
    }
    Ok(())
}

async fn insert_checked(
    tx: &mut dyn ReservationTransaction,
    id: Uuid,
    room_id: Uuid,
    period: DateRange,
) -> DomainResult<Reservation> {
    ensure_free(tx, room_id, period, None).await?;
    let reservation = Reservation::new(id, room_id, period);
    tx.insert(&reservation).await?;
    Ok(reservation)
}

async fn replace_existing(
    tx: &mut dyn ReservationTransaction,
    current: Reservation,
    update: &ReservationUpdate,
    actor: &Actor,
) -> DomainResult<UpdateOutcome> {
    if actor.is_anonymous() {
        return Err(DomainError::Unauthorized(
            "authentication required to modify an existing reservation".to_string(),
        ));
    }

    let restoring = current.state() == ReservationState::Deleted;
    if restoring && !update.clears_deleted_at {
        return Err(DomainError::reservation_not_found(current.id));
    }

    let (room_id, period) = update.draft.validate()?;
    ensure_free(tx, room_id, period, Some(current.id)).await?;

    let replacement = Reservation::new(current.id, room_id, period);
    tx.replace(&replacement).await?;

    Ok(if restoring {
        UpdateOutcome::Restored(replacement)
    } else {
        UpdateOutcome::Updated(replacement)
    })
}
