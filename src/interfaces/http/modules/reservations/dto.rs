//! Reservation DTOs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::domain::reservation::{
    parse_iso_date, Reservation, ReservationDraft, ReservationFilter, ReservationUpdate,
};
use crate::domain::{DomainError, DomainResult};

fn validate_uuid(value: &str) -> Result<(), ValidationError> {
    Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| ValidationError::new("uuid").with_message("must be a UUID".into()))
}

fn validate_date(value: &str) -> Result<(), ValidationError> {
    parse_iso_date(value)
        .map(|_| ())
        .map_err(|_| ValidationError::new("date").with_message("must be an ISO 8601 date".into()))
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Body of create and update requests
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct ReservationBody {
    #[validate(custom(function = "validate_uuid"))]
    #[schema(example = "0b4f8c3e-3d0b-4c1e-9f6a-8d2b5e7a1c90")]
    pub room_id: Option<String>,
    #[validate(custom(function = "validate_date"))]
    #[schema(example = "2025-03-01")]
    pub from: Option<String>,
    #[validate(custom(function = "validate_date"))]
    #[schema(example = "2025-03-05")]
    pub to: Option<String>,
    /// Send `null` to restore a deleted reservation; other values are ignored
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>, nullable)]
    pub deleted_at: Option<Option<serde_json::Value>>,
}

impl ReservationBody {
    pub fn to_draft(&self) -> DomainResult<ReservationDraft> {
        let room_id = self
            .room_id
            .as_deref()
            .map(|s| {
                Uuid::parse_str(s)
                    .map_err(|_| DomainError::Validation(format!("invalid room_id '{}'", s)))
            })
            .transpose()?;
        Ok(ReservationDraft {
            room_id,
            from: self.from.as_deref().map(parse_iso_date).transpose()?,
            to: self.to.as_deref().map(parse_iso_date).transpose()?,
        })
    }

    pub fn to_update(&self) -> DomainResult<ReservationUpdate> {
        Ok(ReservationUpdate {
            draft: self.to_draft()?,
            clears_deleted_at: matches!(self.deleted_at, Some(None)),
        })
    }
}

/// Reservation as exposed by the API
#[derive(Debug, Serialize, ToSchema)]
pub struct ReservationDto {
    pub id: Uuid,
    pub room_id: Uuid,
    #[schema(value_type = String, format = Date, example = "2025-03-01")]
    pub from: NaiveDate,
    #[schema(value_type = String, format = Date, example = "2025-03-05")]
    pub to: NaiveDate,
    /// Present only for soft-deleted reservations
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<Reservation> for ReservationDto {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            room_id: r.room_id,
            from: r.period.start(),
            to: r.period.end(),
            deleted_at: r.deleted_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReservationListResponse {
    pub reservations: Vec<ReservationDto>,
}

/// `true` only for the case-insensitive string "true"
fn flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Query parameters of `GET /reservations`
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Include soft-deleted reservations when `true`
    pub include_deleted: Option<String>,
    /// Only reservations of this room
    pub room_id: Option<String>,
    /// Only reservations ending after this date
    pub after: Option<String>,
    /// Only reservations starting before this date
    pub before: Option<String>,
}

impl ListQuery {
    pub fn to_filter(&self) -> DomainResult<ReservationFilter> {
        let room_id = match self.room_id.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(
                Uuid::parse_str(s)
                    .map_err(|_| DomainError::Validation(format!("invalid room_id '{}'", s)))?,
            ),
            None => None,
        };
        Ok(ReservationFilter {
            include_deleted: flag(self.include_deleted.as_deref()),
            room_id,
            after: self
                .after
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(parse_iso_date)
                .transpose()?,
            before: self
                .before
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(parse_iso_date)
                .transpose()?,
        })
    }
}

/// Query parameters of `DELETE /reservations/{id}`
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeleteQuery {
    /// Erase instead of soft-deleting when `true`
    pub permanent: Option<String>,
}

impl DeleteQuery {
    pub fn is_permanent(&self) -> bool {
        flag(self.permanent.as_deref())
    }
}
