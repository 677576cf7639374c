//! SeaORM implementation of ReservationRepository
//!
//! Writes are conditional on the lifecycle state the transaction read, so a
//! row that was soft deleted or restored concurrently is never overwritten.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use sea_orm::prelude::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, SqlErr, Statement, TransactionTrait,
};
use uuid::Uuid;

use crate::domain::reservation::{
    DateRange, Reservation, ReservationFilter, ReservationRepository, ReservationTransaction,
};
use crate::domain::{DomainError, DomainResult};
use crate::infrastructure::database::entities::reservation;
use crate::infrastructure::database::migrator::OVERLAP_GUARD;

pub struct SeaOrmReservationRepository {
    db: DatabaseConnection,
}

impl SeaOrmReservationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn model_to_domain(m: reservation::Model) -> DomainResult<Reservation> {
    let period = DateRange::new(m.start_date, m.end_date).map_err(|_| {
        DomainError::Internal(format!(
            "stored reservation {} has an unordered date range",
            m.id
        ))
    })?;
    Ok(Reservation {
        id: m.id,
        room_id: m.room_id,
        period,
        deleted_at: m.deleted_at,
    })
}

fn domain_to_active(r: &Reservation) -> reservation::ActiveModel {
    reservation::ActiveModel {
        id: Set(r.id),
        room_id: Set(r.room_id),
        start_date: Set(r.period.start()),
        end_date: Set(r.period.end()),
        deleted_at: Set(r.deleted_at),
    }
}

/// Overlap rejections raised by the database surface as the same conflict
/// the advisory check reports.
fn db_err(e: DbErr) -> DomainError {
    if e.to_string().contains(OVERLAP_GUARD) {
        debug!("Database overlap guard rejected write: {}", e);
        return DomainError::Conflict {
            conflicting_id: None,
        };
    }
    if let Some(SqlErr::UniqueConstraintViolation(detail)) = e.sql_err() {
        debug!("Duplicate reservation id rejected: {}", detail);
        return DomainError::Conflict {
            conflicting_id: None,
        };
    }
    DomainError::Internal(format!("Database error: {}", e))
}

fn live_overlap_query(
    room_id: Uuid,
    period: DateRange,
    exclude: Option<Uuid>,
) -> sea_orm::Select<reservation::Entity> {
    let mut query = reservation::Entity::find()
        .filter(reservation::Column::RoomId.eq(room_id))
        .filter(reservation::Column::DeletedAt.is_null())
        .filter(reservation::Column::StartDate.lt(period.end()))
        .filter(reservation::Column::EndDate.gt(period.start()));
    if let Some(id) = exclude {
        query = query.filter(reservation::Column::Id.ne(id));
    }
    query
}

// ── ReservationRepository impl ──────────────────────────────────

#[async_trait]
impl ReservationRepository for SeaOrmReservationRepository {
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Reservation>> {
        reservation::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(db_err)?
            .map(model_to_domain)
            .transpose()
    }

    async fn find_all(&self, filter: &ReservationFilter) -> DomainResult<Vec<Reservation>> {
        let mut query = reservation::Entity::find();
        if !filter.include_deleted {
            query = query.filter(reservation::Column::DeletedAt.is_null());
        }
        if let Some(room_id) = filter.room_id {
            query = query.filter(reservation::Column::RoomId.eq(room_id));
        }
        if let Some(after) = filter.after {
            query = query.filter(reservation::Column::EndDate.gt(after));
        }
        if let Some(before) = filter.before {
            query = query.filter(reservation::Column::StartDate.lt(before));
        }

        let models = query
            .order_by_asc(reservation::Column::StartDate)
            .order_by_asc(reservation::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        models.into_iter().map(model_to_domain).collect()
    }

    async fn begin(&self) -> DomainResult<Box<dyn ReservationTransaction>> {
        let txn = self.db.begin().await.map_err(db_err)?;
        Ok(Box::new(SeaOrmReservationTransaction {
            txn,
            observed_deleted: HashMap::new(),
        }))
    }

    async fn ping(&self) -> DomainResult<()> {
        self.db
            .execute(Statement::from_string(
                self.db.get_database_backend(),
                "SELECT 1".to_string(),
            ))
            .await
            .map(|_| ())
            .map_err(db_err)
    }
}

// ── ReservationTransaction impl ─────────────────────────────────

pub struct SeaOrmReservationTransaction {
    txn: DatabaseTransaction,
    /// Whether each row read so far was soft deleted
    observed_deleted: HashMap<Uuid, bool>,
}

impl SeaOrmReservationTransaction {
    /// Error for a conditional write that matched no row.
    async fn lost_row(&self, id: Uuid) -> DomainResult<DomainError> {
        let current = reservation::Entity::find_by_id(id)
            .one(&self.txn)
            .await
            .map_err(db_err)?;
        Ok(match current {
            Some(m) if m.deleted_at.is_none() => DomainError::Conflict {
                conflicting_id: None,
            },
            _ => DomainError::reservation_not_found(id),
        })
    }
}

#[async_trait]
impl ReservationTransaction for SeaOrmReservationTransaction {
    async fn find_by_id(&mut self, id: Uuid) -> DomainResult<Option<Reservation>> {
        let found = reservation::Entity::find_by_id(id)
            .one(&self.txn)
            .await
            .map_err(db_err)?
            .map(model_to_domain)
            .transpose()?;
        if let Some(r) = &found {
            self.observed_deleted.insert(r.id, !r.is_live());
        }
        Ok(found)
    }

    async fn find_overlapping(
        &mut self,
        room_id: Uuid,
        period: DateRange,
        exclude: Option<Uuid>,
    ) -> DomainResult<Option<Reservation>> {
        live_overlap_query(room_id, period, exclude)
            .one(&self.txn)
            .await
            .map_err(db_err)?
            .map(model_to_domain)
            .transpose()
    }

    async fn insert(&mut self, r: &Reservation) -> DomainResult<()> {
        debug!("Inserting reservation: {}", r.id);
        reservation::Entity::insert(domain_to_active(r))
            .exec_without_returning(&self.txn)
            .await
            .map_err(db_err)?;
        self.observed_deleted.insert(r.id, !r.is_live());
        Ok(())
    }

    async fn replace(&mut self, r: &Reservation) -> DomainResult<()> {
        debug!("Replacing reservation: {}", r.id);
        let mut query = reservation::Entity::update_many()
            .col_expr(reservation::Column::RoomId, Expr::value(r.room_id))
            .col_expr(reservation::Column::StartDate, Expr::value(r.period.start()))
            .col_expr(reservation::Column::EndDate, Expr::value(r.period.end()))
            .col_expr(reservation::Column::DeletedAt, Expr::value(r.deleted_at))
            .filter(reservation::Column::Id.eq(r.id));
        query = match self.observed_deleted.get(&r.id) {
            Some(true) => query.filter(reservation::Column::DeletedAt.is_not_null()),
            Some(false) => query.filter(reservation::Column::DeletedAt.is_null()),
            None => query,
        };

        let result = query.exec(&self.txn).await.map_err(db_err)?;
        if result.rows_affected == 0 {
            return Err(self.lost_row(r.id).await?);
        }
        self.observed_deleted.insert(r.id, !r.is_live());
        Ok(())
    }

    async fn soft_delete(&mut self, id: Uuid, at: DateTime<Utc>) -> DomainResult<()> {
        debug!("Soft-deleting reservation: {}", id);
        let result = reservation::Entity::update_many()
            .col_expr(reservation::Column::DeletedAt, Expr::value(at))
            .filter(reservation::Column::Id.eq(id))
            .filter(reservation::Column::DeletedAt.is_null())
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        if result.rows_affected == 0 {
            return Err(DomainError::reservation_not_found(id));
        }
        self.observed_deleted.insert(id, true);
        Ok(())
    }

    async fn hard_delete(&mut self, id: Uuid) -> DomainResult<()> {
        debug!("Deleting reservation permanently: {}", id);
        let result = reservation::Entity::delete_by_id(id)
            .exec(&self.txn)
            .await
            .map_err(db_err)?;
        if result.rows_affected == 0 {
            return Err(DomainError::reservation_not_found(id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> DomainResult<()> {
        self.txn.commit().await.map_err(db_err)
    }
}
