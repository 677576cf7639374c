use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Not found: {entity} with {field}={value}")]
    NotFound {
        entity: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Validation: {0}")]
    Validation(String),

    /// The candidate period intersects a live reservation in the same room.
    ///
    /// `conflicting_id` is known when the advisory check found the row and
    /// empty when the store's own guard rejected the write.
    #[error("Reservation overlaps with an existing reservation")]
    Conflict { conflicting_id: Option<Uuid> },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn reservation_not_found(id: Uuid) -> Self {
        DomainError::NotFound {
            entity: "Reservation",
            field: "id",
            value: id.to_string(),
        }
    }
}
