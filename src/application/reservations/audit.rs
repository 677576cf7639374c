//! Audit trail for reservation mutations
//!
//! Every committed transition produces one [`AuditEvent`]. The default sink
//! writes it as a structured `tracing` event on the `audit` target, so log
//! shippers can route the trail separately from application logs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::reservation::Actor;

/// Mutation recorded in the trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Restore,
    SoftDelete,
    PermanentDelete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Restore => "restore",
            AuditAction::SoftDelete => "soft_delete",
            AuditAction::PermanentDelete => "permanent_delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub resource_type: &'static str,
    pub resource_id: Uuid,
    /// Principal id, or `anonymous`
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn reservation(action: AuditAction, id: Uuid, actor: &Actor) -> Self {
        Self {
            action,
            resource_type: "reservation",
            resource_id: id,
            user_id: actor.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Destination for audit events
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes audit events through `tracing` on the `audit` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let json = match serde_json::to_string(&event) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(target: "audit", error = %e, "Failed to serialize audit event");
                return;
            }
        };

        tracing::info!(
            target: "audit",
            audit_event = %json,
            action = event.action.as_str(),
            resource_type = event.resource_type,
            resource_id = %event.resource_id,
            user_id = %event.user_id,
            timestamp = %event.timestamp,
            "Reservation {}",
            event.action.as_str()
        );
    }
}

/// Keeps events in memory for assertions
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: std::sync::Mutex<Vec<AuditEvent>>,
}

#[cfg(test)]
impl RecordingAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn actions(&self) -> Vec<AuditAction> {
        self.events().into_iter().map(|e| e.action).collect()
    }
}

#[cfg(test)]
impl AuditSink for RecordingAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}
