pub mod audit;
pub mod service;

pub use audit::{AuditAction, AuditEvent, AuditSink, TracingAuditSink};
pub use service::{MissingUpdatePolicy, ReservationService, UpdateOutcome};
