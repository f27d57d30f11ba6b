use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{Entity, RoleId, TemplateId, TenantId, UserId};

use crate::PermissionLevel;

/// A permission level granted on one resource code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceGrant {
    pub resource_code: String,
    pub permission_level: PermissionLevel,
}

impl ResourceGrant {
    pub fn new(resource_code: impl Into<String>, permission_level: PermissionLevel) -> Self {
        Self {
            resource_code: resource_code.into(),
            permission_level,
        }
    }
}

/// Tenant-scoped role. Always bound to exactly one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub tenant_id: TenantId,
    pub module_code: String,
    pub name: String,
    pub description: Option<String>,
    pub is_custom: bool,
    pub based_on_template: Option<TemplateId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// One row of a role's permission set.
///
/// At most one row exists per `(role_id, resource_code)`; writes replace the
/// whole set, they never append.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RolePermission {
    pub role_id: RoleId,
    pub resource_code: String,
    pub permission_level: PermissionLevel,
}

impl RolePermission {
    pub fn from_grant(role_id: RoleId, grant: &ResourceGrant) -> Self {
        Self {
            role_id,
            resource_code: grant.resource_code.clone(),
            permission_level: grant.permission_level,
        }
    }
}

/// Centrally maintained seed role, copied into tenants on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTemplate {
    pub id: TemplateId,
    pub module_code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub default_permissions: Vec<ResourceGrant>,
}

/// Grants `role_id` (in `module_code`) to `user_id`.
///
/// A user may hold several roles in the same module; precedence is resolved
/// when checking, not when storing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserModuleRoleAssignment {
    pub user_id: UserId,
    pub module_code: String,
    pub role_id: RoleId,
}

/// Input for `RoleService::create_role`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub module_code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub based_on_template: Option<TemplateId>,
    #[serde(default)]
    pub permissions: Option<Vec<ResourceGrant>>,
}

/// Input for `RoleService::update_role`. `None` leaves a field untouched;
/// `Some(permissions)` replaces the full permission set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<ResourceGrant>>,
}

/// A role together with its current permission rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<RolePermission>,
}
