//! Storage collaborator contract.
//!
//! The engine never talks SQL. It needs keyed lookups plus a handful of
//! composite writes, and each write method below is **one atomic unit**: an
//! implementation must commit all of its rows or none of them, and concurrent
//! readers must never observe a role with a partial permission set.

pub mod in_memory;

pub use in_memory::InMemoryAuthzStore;

use std::sync::Arc;

use thiserror::Error;

use warden_core::{DomainError, RoleId, TemplateId, TenantId, UserId};

use crate::resolver::EffectivePermissionSet;
use crate::role::{Role, RolePermission, RoleTemplate, UserModuleRoleAssignment};
use crate::scope::UserDataScope;
use crate::Resource;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error("role {role_id} is still assigned to {assignments} user(s)")]
    RoleInUse { role_id: RoleId, assignments: usize },

    #[error("role {0} not found")]
    MissingRole(RoleId),

    #[error("duplicate: {0}")]
    Duplicate(String),
}

impl From<StorageError> for DomainError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Backend(msg) => DomainError::Storage(msg),
            StorageError::RoleInUse { .. } => DomainError::Conflict(value.to_string()),
            StorageError::Duplicate(_) => DomainError::Conflict(value.to_string()),
            StorageError::MissingRole(_) => DomainError::NotFound(value.to_string()),
        }
    }
}

/// Keyed lookups and atomic writes the resolvers depend on.
///
/// Every tenant-owned lookup takes the tenant explicitly; adapters must not
/// return rows belonging to another tenant. Resources and templates are
/// global seed data.
pub trait AuthzStorage: Send + Sync {
    // ── catalog ────────────────────────────────────────────────────────────
    fn modules(&self) -> Result<Vec<String>, StorageError>;

    /// `None` means the module is unknown.
    fn resources_by_module(&self, module_code: &str) -> Result<Option<Vec<Resource>>, StorageError>;

    // ── roles ──────────────────────────────────────────────────────────────
    fn role(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Option<Role>, StorageError>;

    fn roles_by_module(&self, tenant_id: TenantId, module_code: &str) -> Result<Vec<Role>, StorageError>;

    fn role_permissions(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Vec<RolePermission>, StorageError>;

    fn templates(&self) -> Result<Vec<RoleTemplate>, StorageError>;

    fn template(&self, template_id: &TemplateId) -> Result<Option<RoleTemplate>, StorageError>;

    // ── assignments ────────────────────────────────────────────────────────
    fn user_assignments(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<UserModuleRoleAssignment>, StorageError>;

    fn role_assignees(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Vec<UserId>, StorageError>;

    // ── data scope ─────────────────────────────────────────────────────────
    fn user_data_scope(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<UserDataScope>, StorageError>;

    // ── derived cache ──────────────────────────────────────────────────────
    fn effective_permissions(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Option<EffectivePermissionSet>, StorageError>;

    // ── atomic writes ──────────────────────────────────────────────────────

    /// Insert the role row, then replace its permission set.
    fn insert_role(&self, role: Role, permissions: Vec<RolePermission>) -> Result<(), StorageError>;

    /// Overwrite the role row and, when given, replace its permission set.
    fn update_role(&self, role: Role, permissions: Option<Vec<RolePermission>>) -> Result<(), StorageError>;

    /// Delete-all then insert-all for one role.
    fn replace_role_permissions(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        permissions: Vec<RolePermission>,
    ) -> Result<(), StorageError>;

    /// Delete the role and its permissions, failing with `RoleInUse` if any
    /// assignment references it. The check and the delete share one
    /// transaction.
    fn delete_role_if_unassigned(&self, tenant_id: TenantId, role_id: RoleId) -> Result<(), StorageError>;

    fn insert_assignment(
        &self,
        tenant_id: TenantId,
        assignment: UserModuleRoleAssignment,
    ) -> Result<(), StorageError>;

    /// Returns whether a row was removed.
    fn delete_assignment(
        &self,
        tenant_id: TenantId,
        assignment: &UserModuleRoleAssignment,
    ) -> Result<bool, StorageError>;

    fn upsert_user_data_scope(&self, scope: UserDataScope) -> Result<(), StorageError>;

    /// Last writer wins.
    fn put_effective_permissions(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        set: EffectivePermissionSet,
    ) -> Result<(), StorageError>;

    fn clear_effective_permissions(&self, tenant_id: TenantId, user_id: UserId) -> Result<(), StorageError>;
}

impl<S> AuthzStorage for Arc<S>
where
    S: AuthzStorage + ?Sized,
{
    fn modules(&self) -> Result<Vec<String>, StorageError> {
        (**self).modules()
    }

    fn resources_by_module(&self, module_code: &str) -> Result<Option<Vec<Resource>>, StorageError> {
        (**self).resources_by_module(module_code)
    }

    fn role(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Option<Role>, StorageError> {
        (**self).role(tenant_id, role_id)
    }

    fn roles_by_module(&self, tenant_id: TenantId, module_code: &str) -> Result<Vec<Role>, StorageError> {
        (**self).roles_by_module(tenant_id, module_code)
    }

    fn role_permissions(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Vec<RolePermission>, StorageError> {
        (**self).role_permissions(tenant_id, role_id)
    }

    fn templates(&self) -> Result<Vec<RoleTemplate>, StorageError> {
        (**self).templates()
    }

    fn template(&self, template_id: &TemplateId) -> Result<Option<RoleTemplate>, StorageError> {
        (**self).template(template_id)
    }

    fn user_assignments(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<UserModuleRoleAssignment>, StorageError> {
        (**self).user_assignments(tenant_id, user_id)
    }

    fn role_assignees(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Vec<UserId>, StorageError> {
        (**self).role_assignees(tenant_id, role_id)
    }

    fn user_data_scope(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<UserDataScope>, StorageError> {
        (**self).user_data_scope(tenant_id, user_id)
    }

    fn effective_permissions(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Option<EffectivePermissionSet>, StorageError> {
        (**self).effective_permissions(tenant_id, user_id)
    }

    fn insert_role(&self, role: Role, permissions: Vec<RolePermission>) -> Result<(), StorageError> {
        (**self).insert_role(role, permissions)
    }

    fn update_role(&self, role: Role, permissions: Option<Vec<RolePermission>>) -> Result<(), StorageError> {
        (**self).update_role(role, permissions)
    }

    fn replace_role_permissions(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        permissions: Vec<RolePermission>,
    ) -> Result<(), StorageError> {
        (**self).replace_role_permissions(tenant_id, role_id, permissions)
    }

    fn delete_role_if_unassigned(&self, tenant_id: TenantId, role_id: RoleId) -> Result<(), StorageError> {
        (**self).delete_role_if_unassigned(tenant_id, role_id)
    }

    fn insert_assignment(
        &self,
        tenant_id: TenantId,
        assignment: UserModuleRoleAssignment,
    ) -> Result<(), StorageError> {
        (**self).insert_assignment(tenant_id, assignment)
    }

    fn delete_assignment(
        &self,
        tenant_id: TenantId,
        assignment: &UserModuleRoleAssignment,
    ) -> Result<bool, StorageError> {
        (**self).delete_assignment(tenant_id, assignment)
    }

    fn upsert_user_data_scope(&self, scope: UserDataScope) -> Result<(), StorageError> {
        (**self).upsert_user_data_scope(scope)
    }

    fn put_effective_permissions(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        set: EffectivePermissionSet,
    ) -> Result<(), StorageError> {
        (**self).put_effective_permissions(tenant_id, user_id, set)
    }

    fn clear_effective_permissions(&self, tenant_id: TenantId, user_id: UserId) -> Result<(), StorageError> {
        (**self).clear_effective_permissions(tenant_id, user_id)
    }
}
