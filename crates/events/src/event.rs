use chrono::{DateTime, Utc};

use warden_core::TenantId;

/// A domain-agnostic event.
///
/// Events are immutable facts. Every event belongs to exactly one tenant so
/// sinks can partition audit trails without inspecting payloads.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "authz.permission.denied").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Tenant the event belongs to.
    fn tenant_id(&self) -> TenantId;

    /// When the event occurred.
    fn occurred_at(&self) -> DateTime<Utc>;
}
