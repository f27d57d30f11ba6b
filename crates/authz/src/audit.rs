//! Audit events emitted by the engine.
//!
//! Emission is fire-and-forget: a sink failure is logged and swallowed, it
//! never changes an authorization decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use warden_core::{RoleId, TenantId, UserId};
use warden_events::{Event, EventBus};

use crate::{DataScopeLevel, PermissionLevel};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDenied {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub resource_code: String,
    pub required: PermissionLevel,
    pub resolved: PermissionLevel,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDenied {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub resource: String,
    pub action: String,
    pub allowed_scopes: Vec<DataScopeLevel>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChanged {
    pub tenant_id: TenantId,
    pub role_id: RoleId,
    pub module_code: String,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermissionsReplaced {
    pub tenant_id: TenantId,
    pub role_id: RoleId,
    pub permission_count: usize,
    pub occurred_at: DateTime<Utc>,
}

/// All audit events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEvent {
    PermissionDenied(PermissionDenied),
    ScopeDenied(ScopeDenied),
    RoleCreated(RoleChanged),
    RoleUpdated(RoleChanged),
    RoleDeleted(RoleChanged),
    RolePermissionsReplaced(RolePermissionsReplaced),
}

impl Event for AuditEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::PermissionDenied(_) => "authz.permission.denied",
            AuditEvent::ScopeDenied(_) => "authz.scope.denied",
            AuditEvent::RoleCreated(_) => "authz.role.created",
            AuditEvent::RoleUpdated(_) => "authz.role.updated",
            AuditEvent::RoleDeleted(_) => "authz.role.deleted",
            AuditEvent::RolePermissionsReplaced(_) => "authz.role.permissions_replaced",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn tenant_id(&self) -> TenantId {
        match self {
            AuditEvent::PermissionDenied(e) => e.tenant_id,
            AuditEvent::ScopeDenied(e) => e.tenant_id,
            AuditEvent::RoleCreated(e) | AuditEvent::RoleUpdated(e) | AuditEvent::RoleDeleted(e) => e.tenant_id,
            AuditEvent::RolePermissionsReplaced(e) => e.tenant_id,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AuditEvent::PermissionDenied(e) => e.occurred_at,
            AuditEvent::ScopeDenied(e) => e.occurred_at,
            AuditEvent::RoleCreated(e) | AuditEvent::RoleUpdated(e) | AuditEvent::RoleDeleted(e) => e.occurred_at,
            AuditEvent::RolePermissionsReplaced(e) => e.occurred_at,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("audit sink failure: {0}")]
pub struct AuditError(pub String);

/// Collaborator that persists audit events.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent) -> Result<(), AuditError>;
}

impl<T> AuditSink for std::sync::Arc<T>
where
    T: AuditSink + ?Sized,
{
    fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        (**self).emit(event)
    }
}

/// Emit and swallow failures. The only way resolvers talk to a sink.
pub(crate) fn emit_quietly(sink: &dyn AuditSink, event: AuditEvent) {
    let event_type = event.event_type();
    if let Err(err) = sink.emit(event) {
        warn!(event_type, error = %err, "dropping audit event");
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Publishes audit events onto an event bus; a subscriber persists them.
#[derive(Debug, Clone)]
pub struct EventBusAuditSink<B> {
    bus: B,
}

impl<B> EventBusAuditSink<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

impl<B> AuditSink for EventBusAuditSink<B>
where
    B: EventBus<AuditEvent>,
{
    fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.bus
            .publish(event)
            .map_err(|e| AuditError(format!("{e:?}")))
    }
}
