// SPDX-License-Identifier: MIT OR Apache-2.0
//! Append-only audit trail for every state-changing Service call and every
//! blast-radius query (§4.8, §4.9).

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rollup_blast::RiskLevel;
use rollup_core::model::TenantId;
use rollup_error::{ErrorCode, Severity};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The Service facade operation an [`AuditEvent`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Create,
    Update,
    Delete,
    Run,
    BlastRadius,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure { code: ErrorCode },
}

/// A single recorded audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    /// Caller identity; the Service facade has no notion of a user account,
    /// so this is whatever the caller presents (API key id, CLI user, etc).
    pub actor: String,
    pub tenant_id: TenantId,
    pub operation: AuditOperation,
    pub resource_id: Option<Uuid>,
    pub outcome: AuditOutcome,
    pub severity: Severity,
}

/// Maps a computed blast-radius risk level to an audit severity. Plain
/// mutating operations use [`Severity::Info`] on success and
/// [`Severity::Error`] on failure instead; only blast-radius queries scale
/// by risk.
#[must_use]
pub fn severity_for_risk_level(level: RiskLevel) -> Severity {
    match level {
        RiskLevel::Low => Severity::Info,
        RiskLevel::Medium => Severity::Warning,
        RiskLevel::High => Severity::Error,
        RiskLevel::Critical => Severity::Critical,
    }
}

/// A swappable destination for audit events. The executor and Service
/// facade depend on this trait rather than a concrete log, so a production
/// deployment can swap in a durable sink without touching caller code.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// In-process, append-only [`AuditSink`] backed by a `Vec` behind a mutex.
/// The default sink wired by the Service facade in the absence of an
/// external one.
#[derive(Default)]
pub struct InMemoryAuditSink {
    log: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events in the order they were received.
    #[must_use]
    pub fn entries(&self) -> Vec<AuditEvent> {
        self.log.lock().expect("audit log mutex poisoned").clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.log.lock().expect("audit log mutex poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            operation = ?event.operation,
            tenant_id = %event.tenant_id,
            severity = ?event.severity,
            outcome = ?event.outcome,
            "audit event"
        );
        self.log.lock().expect("audit log mutex poisoned").push(event);
    }
}

/// Builds and records a plain success/failure event on `sink`, scaling
/// severity by outcome rather than risk level. Used for `create`/`update`/
/// `delete`/`run`.
pub fn record_operation(
    sink: &dyn AuditSink,
    actor: impl Into<String>,
    tenant_id: TenantId,
    operation: AuditOperation,
    resource_id: Option<Uuid>,
    outcome: AuditOutcome,
) {
    let severity = match &outcome {
        AuditOutcome::Success => Severity::Info,
        AuditOutcome::Failure { .. } => Severity::Error,
    };
    sink.record(AuditEvent { timestamp: Utc::now(), actor: actor.into(), tenant_id, operation, resource_id, outcome, severity });
}

/// Builds and records a blast-radius query event, scaling severity by the
/// computed risk level rather than by success/failure.
pub fn record_blast_radius(
    sink: &dyn AuditSink,
    actor: impl Into<String>,
    tenant_id: TenantId,
    execution_id: Uuid,
    outcome: AuditOutcome,
    risk_level: Option<RiskLevel>,
) {
    let severity = match (&outcome, risk_level) {
        (AuditOutcome::Success, Some(level)) => severity_for_risk_level(level),
        (AuditOutcome::Success, None) => Severity::Info,
        (AuditOutcome::Failure { .. }, _) => Severity::Error,
    };
    sink.record(AuditEvent {
        timestamp: Utc::now(),
        actor: actor.into(),
        tenant_id,
        operation: AuditOperation::BlastRadius,
        resource_id: Some(execution_id),
        outcome,
        severity,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_events_are_retained_in_order() {
        let sink = InMemoryAuditSink::new();
        let tenant = Uuid::new_v4();
        record_operation(&sink, "operator-1", tenant, AuditOperation::Create, Some(Uuid::new_v4()), AuditOutcome::Success);
        record_operation(
            &sink,
            "operator-1",
            tenant,
            AuditOperation::Update,
            Some(Uuid::new_v4()),
            AuditOutcome::Failure { code: ErrorCode::ResVersionConflict },
        );
        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].operation, AuditOperation::Create);
        assert_eq!(entries[0].severity, Severity::Info);
        assert_eq!(entries[1].severity, Severity::Error);
    }

    #[test]
    fn blast_radius_severity_follows_risk_level_not_outcome() {
        let sink = InMemoryAuditSink::new();
        let tenant = Uuid::new_v4();
        record_blast_radius(&sink, "operator-1", tenant, Uuid::new_v4(), AuditOutcome::Success, Some(RiskLevel::Critical));
        let entries = sink.entries();
        assert_eq!(entries[0].severity, Severity::Critical);
    }
}
