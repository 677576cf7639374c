//! Reject overlapping live reservations inside the database
//!
//! PostgreSQL gets a GiST exclusion constraint over `(room_id, [from, to))`.
//! SQLite gets BEFORE INSERT / BEFORE UPDATE triggers that abort with the
//! same name, so adapters can recognise the failure on either backend.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{ConnectionTrait, DbBackend};

/// Name carried by every overlap rejection raised by the database.
pub const OVERLAP_GUARD: &str = "reservations_no_overlap";

#[derive(DeriveMigrationName)]
pub struct Migration;

const PG_UP: [&str; 2] = [
    "CREATE EXTENSION IF NOT EXISTS btree_gist",
    r#"ALTER TABLE reservations
        ADD CONSTRAINT reservations_no_overlap
        EXCLUDE USING gist (room_id WITH =, daterange("from", "to", '[)') WITH &&)
        WHERE (deleted_at IS NULL)"#,
];

const PG_DOWN: [&str; 1] = ["ALTER TABLE reservations DROP CONSTRAINT IF EXISTS reservations_no_overlap"];

const SQLITE_UP: [&str; 2] = [
    r#"CREATE TRIGGER IF NOT EXISTS reservations_no_overlap_insert
        BEFORE INSERT ON reservations
        WHEN NEW.deleted_at IS NULL
        BEGIN
            SELECT RAISE(ABORT, 'reservations_no_overlap')
            WHERE EXISTS (
                SELECT 1 FROM reservations r
                WHERE r.room_id = NEW.room_id
                  AND r.deleted_at IS NULL
                  AND r.id <> NEW.id
                  AND r."from" < NEW."to"
                  AND r."to" > NEW."from"
            );
        END"#,
    r#"CREATE TRIGGER IF NOT EXISTS reservations_no_overlap_update
        BEFORE UPDATE ON reservations
        WHEN NEW.deleted_at IS NULL
        BEGIN
            SELECT RAISE(ABORT, 'reservations_no_overlap')
            WHERE EXISTS (
                SELECT 1 FROM reservations r
                WHERE r.room_id = NEW.room_id
                  AND r.deleted_at IS NULL
                  AND r.id <> NEW.id
                  AND r."from" < NEW."to"
                  AND r."to" > NEW."from"
            );
        END"#,
];

const SQLITE_DOWN: [&str; 2] = [
    "DROP TRIGGER IF EXISTS reservations_no_overlap_insert",
    "DROP TRIGGER IF EXISTS reservations_no_overlap_update",
];

fn statements(backend: DbBackend, up: bool) -> Result<&'static [&'static str], DbErr> {
    match (backend, up) {
        (DbBackend::Postgres, true) => Ok(&PG_UP),
        (DbBackend::Postgres, false) => Ok(&PG_DOWN),
        (DbBackend::Sqlite, true) => Ok(&SQLITE_UP),
        (DbBackend::Sqlite, false) => Ok(&SQLITE_DOWN),
        (other, _) => Err(DbErr::Migration(format!(
            "overlap guard is not available for {:?}",
            other
        ))),
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        for sql in statements(manager.get_database_backend(), true)? {
            db.execute_unprepared(sql).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        for sql in statements(manager.get_database_backend(), false)? {
            db.execute_unprepared(sql).await?;
        }
        Ok(())
    }
}
