//! Reservation domain entity

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::domain::{DomainError, DomainResult};

/// Half-open calendar interval `[start, end)`.
///
/// Cannot be constructed with `start >= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> DomainResult<Self> {
        if start >= end {
            return Err(DomainError::Validation(
                "'from' date must be before 'to' date".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Two half-open ranges overlap iff each starts before the other ends.
    /// Adjacent ranges (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Lifecycle state of a persisted reservation.
///
/// The third state, absent, is represented by the row not existing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationState {
    Active,
    Deleted,
}

/// Room reservation
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    /// Unique reservation ID
    pub id: Uuid,
    /// Booked room
    pub room_id: Uuid,
    /// Booked dates
    pub period: DateRange,
    /// Soft-deletion timestamp, `None` while live
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn new(id: Uuid, room_id: Uuid, period: DateRange) -> Self {
        Self {
            id,
            room_id,
            period,
            deleted_at: None,
        }
    }

    pub fn state(&self) -> ReservationState {
        if self.deleted_at.is_some() {
            ReservationState::Deleted
        } else {
            ReservationState::Active
        }
    }

    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Whether `self` and `other` compete for the same room on the same days.
    ///
    /// Only live reservations take part in the no-overlap invariant.
    pub fn conflicts_with(&self, other: &Reservation) -> bool {
        self.id != other.id
            && self.is_live()
            && other.is_live()
            && self.room_id == other.room_id
            && self.period.overlaps(&other.period)
    }
}

/// Reservation fields as supplied by a caller, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReservationDraft {
    pub room_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl ReservationDraft {
    pub fn new(room_id: Uuid, from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            room_id: Some(room_id),
            from: Some(from),
            to: Some(to),
        }
    }

    /// Require every field and an ordered range.
    pub fn validate(&self) -> DomainResult<(Uuid, DateRange)> {
        let missing: Vec<&str> = [
            ("room_id", self.room_id.is_none()),
            ("from", self.from.is_none()),
            ("to", self.to.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        match (self.room_id, self.from, self.to) {
            (Some(room_id), Some(from), Some(to)) => Ok((room_id, DateRange::new(from, to)?)),
            _ => Err(DomainError::Validation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            ))),
        }
    }
}

/// Update request: full replacement of the reservation fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReservationUpdate {
    pub draft: ReservationDraft,
    /// `deleted_at` was explicitly sent as `null`
    pub clears_deleted_at: bool,
}

/// Query filter for listing reservations
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReservationFilter {
    pub include_deleted: bool,
    pub room_id: Option<Uuid>,
    /// Keep reservations ending strictly after this date
    pub after: Option<NaiveDate>,
    /// Keep reservations starting strictly before this date
    pub before: Option<NaiveDate>,
}

impl ReservationFilter {
    pub fn matches(&self, r: &Reservation) -> bool {
        (self.include_deleted || r.is_live())
            && self.room_id.map_or(true, |room| r.room_id == room)
            && self.after.map_or(true, |after| r.period.end() > after)
            && self.before.map_or(true, |before| r.period.start() < before)
    }
}

/// Who performs a mutation, as recorded in audit events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Principal(String),
    Anonymous,
}

impl Actor {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Actor::Anonymous)
    }
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Principal(id) => write!(f, "{}", id),
            Actor::Anonymous => write!(f, "anonymous"),
        }
    }
}

/// Parse an ISO-8601 date, a naive datetime, or an RFC 3339 timestamp,
/// keeping only the calendar date.
pub fn parse_iso_date(s: &str) -> DomainResult<NaiveDate> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt.date());
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.date_naive())
        .map_err(|_| DomainError::Validation(format!("invalid date: '{}'", s)))
}

// ── Tests ──────────────────────────────────────────────────────
