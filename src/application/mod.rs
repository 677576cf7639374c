pub mod reservations;

// Re-export key types for convenience
pub use reservations::{
    AuditAction, AuditEvent, AuditSink, MissingUpdatePolicy, ReservationService,
    TracingAuditSink, UpdateOutcome,
};
