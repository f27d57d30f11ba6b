//! `warden-authz`: hierarchical authorization engine.
//!
//! Resource trees, role permissions with max-precedence resolution, row-level
//! data scopes and field masking. Pure computation over a storage
//! collaborator: no network, no async.

pub mod audit;
pub mod catalog;
pub mod field;
pub mod filter;
pub mod masking;
pub mod permission;
pub mod resolver;
pub mod resource;
pub mod role;
pub mod role_store;
pub mod scope;
pub mod storage;

/// A flat record as seen by scope checks and field masking.
pub type Record = serde_json::Map<String, serde_json::Value>;

pub use audit::{AuditError, AuditEvent, AuditSink, EventBusAuditSink, NoopAuditSink};
pub use catalog::{ResourceCatalog, ResourceTree};
pub use field::{FieldAccessLevel, FieldAccessResolver, FieldCategory, FieldContext, FieldRule, MaskedField, Masker};
pub use filter::{Condition, DataFilter};
pub use masking::MaskingStrategy;
pub use permission::PermissionLevel;
pub use resolver::{
    AuthzError, EffectivePermission, EffectivePermissionSet, PermissionCheck, PermissionResolver, ResolverOptions,
};
pub use resource::{Resource, ResourceNode, ResourceType};
pub use role::{
    NewRole, ResourceGrant, Role, RolePermission, RoleTemplate, RoleUpdate, RoleWithPermissions,
    UserModuleRoleAssignment,
};
pub use role_store::RoleService;
pub use scope::{DataScopeLevel, DataScopeResolver, DataScopeRule, ScopeFieldMap, UserDataScope, ANY_ACTION};
pub use storage::{AuthzStorage, InMemoryAuthzStore, StorageError};
