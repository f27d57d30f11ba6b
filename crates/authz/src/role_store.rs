//! Role management: the write side of the engine.
//!
//! Every mutation goes through one atomic storage call, so readers see either
//! the old role or the new one, never a role with a partial permission set.
//! Writes that change what a user can do drop that user's cached effective
//! permissions afterwards.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use warden_core::{DomainError, DomainResult, RoleId, TemplateId, TenantId, UserId};

use crate::audit::{AuditEvent, AuditSink, NoopAuditSink, RoleChanged, RolePermissionsReplaced, emit_quietly};
use crate::role::{
    NewRole, ResourceGrant, Role, RolePermission, RoleTemplate, RoleUpdate, RoleWithPermissions,
    UserModuleRoleAssignment,
};
use crate::scope::{DataScopeLevel, UserDataScope};
use crate::storage::AuthzStorage;

fn required_name(name: &str) -> DomainResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("role name cannot be empty"));
    }
    Ok(trimmed.to_string())
}

/// Creates, edits, clones and deletes tenant roles and their assignments.
pub struct RoleService<S> {
    storage: S,
    audit: Arc<dyn AuditSink>,
}

impl<S> RoleService<S>
where
    S: AuthzStorage,
{
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            audit: Arc::new(NoopAuditSink),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    fn module_codes(&self, module_code: &str) -> DomainResult<HashSet<String>> {
        let resources = self
            .storage
            .resources_by_module(module_code)?
            .ok_or_else(|| DomainError::not_found(format!("module '{module_code}'")))?;
        Ok(resources.into_iter().map(|r| r.code).collect())
    }

    fn load_role(&self, tenant_id: TenantId, role_id: RoleId) -> DomainResult<Role> {
        self.storage
            .role(tenant_id, role_id)?
            .ok_or_else(|| DomainError::not_found(format!("role {role_id}")))
    }

    fn load_template(&self, template_id: &TemplateId) -> DomainResult<RoleTemplate> {
        self.storage
            .template(template_id)?
            .ok_or_else(|| DomainError::not_found(format!("role template '{template_id}'")))
    }

    /// Turn grants into rows, rejecting duplicates and codes the module's
    /// catalog does not know.
    fn permission_rows(
        &self,
        module_code: &str,
        role_id: RoleId,
        grants: &[ResourceGrant],
    ) -> DomainResult<Vec<RolePermission>> {
        let known = self.module_codes(module_code)?;
        let mut seen = HashSet::with_capacity(grants.len());

        for grant in grants {
            if !seen.insert(grant.resource_code.as_str()) {
                return Err(DomainError::validation(format!(
                    "resource '{}' listed more than once",
                    grant.resource_code
                )));
            }
            if !known.contains(&grant.resource_code) {
                return Err(DomainError::validation(format!(
                    "resource '{}' is not part of module '{module_code}'",
                    grant.resource_code
                )));
            }
        }

        Ok(grants.iter().map(|g| RolePermission::from_grant(role_id, g)).collect())
    }

    fn invalidate_assignees(&self, tenant_id: TenantId, role_id: RoleId) {
        let assignees = match self.storage.role_assignees(tenant_id, role_id) {
            Ok(users) => users,
            Err(err) => {
                warn!(%tenant_id, %role_id, error = %err, "could not list role assignees for cache invalidation");
                return;
            }
        };
        for user_id in assignees {
            self.invalidate_user(tenant_id, user_id);
        }
    }

    fn invalidate_user(&self, tenant_id: TenantId, user_id: UserId) {
        if let Err(err) = self.storage.clear_effective_permissions(tenant_id, user_id) {
            warn!(%tenant_id, %user_id, error = %err, "could not invalidate effective permissions");
        }
    }

    fn role_changed(role: &Role) -> RoleChanged {
        RoleChanged {
            tenant_id: role.tenant_id,
            role_id: role.id,
            module_code: role.module_code.clone(),
            name: role.name.clone(),
            occurred_at: Utc::now(),
        }
    }

    fn insert(&self, role: Role, permissions: Vec<RolePermission>) -> DomainResult<Role> {
        let count = permissions.len();
        self.storage.insert_role(role.clone(), permissions)?;

        info!(
            tenant_id = %role.tenant_id, role_id = %role.id, module = %role.module_code,
            name = %role.name, permissions = count, "role created"
        );
        emit_quietly(self.audit.as_ref(), AuditEvent::RoleCreated(Self::role_changed(&role)));
        Ok(role)
    }

    /// Roles of one module, sorted by name. Unknown modules are `NotFound`.
    pub fn roles_by_module(&self, tenant_id: TenantId, module_code: &str) -> DomainResult<Vec<Role>> {
        if self.storage.resources_by_module(module_code)?.is_none() {
            return Err(DomainError::not_found(format!("module '{module_code}'")));
        }
        Ok(self.storage.roles_by_module(tenant_id, module_code)?)
    }

    pub fn role_with_permissions(&self, tenant_id: TenantId, role_id: RoleId) -> DomainResult<RoleWithPermissions> {
        let role = self.load_role(tenant_id, role_id)?;
        let permissions = self.storage.role_permissions(tenant_id, role_id)?;
        Ok(RoleWithPermissions { role, permissions })
    }

    /// Create a custom role. Without explicit permissions, a role based on a
    /// template starts from the template's defaults.
    pub fn create_role(&self, tenant_id: TenantId, input: NewRole) -> DomainResult<Role> {
        let name = required_name(&input.name)?;
        if input.module_code.trim().is_empty() {
            return Err(DomainError::validation("role module cannot be empty"));
        }

        let template = match &input.based_on_template {
            Some(id) => {
                let template = self.load_template(id)?;
                if template.module_code != input.module_code {
                    return Err(DomainError::validation(format!(
                        "template '{id}' belongs to module '{}', not '{}'",
                        template.module_code, input.module_code
                    )));
                }
                Some(template)
            }
            None => None,
        };

        let grants = match (input.permissions, &template) {
            (Some(grants), _) => grants,
            (None, Some(template)) => template.default_permissions.clone(),
            (None, None) => Vec::new(),
        };

        let now = Utc::now();
        let role = Role {
            id: RoleId::new(),
            tenant_id,
            module_code: input.module_code,
            name,
            description: input.description,
            is_custom: true,
            based_on_template: input.based_on_template,
            created_at: now,
            updated_at: now,
        };
        let rows = self.permission_rows(&role.module_code, role.id, &grants)?;
        self.insert(role, rows)
    }

    /// Copy a template's default permissions verbatim into a new role.
    /// The role counts as custom only when it was given its own name.
    pub fn create_from_template(
        &self,
        tenant_id: TenantId,
        template_id: &TemplateId,
        custom_name: Option<&str>,
    ) -> DomainResult<Role> {
        let template = self.load_template(template_id)?;
        let name = match custom_name {
            Some(name) => required_name(name)?,
            None => template.name.clone(),
        };

        let now = Utc::now();
        let role = Role {
            id: RoleId::new(),
            tenant_id,
            module_code: template.module_code.clone(),
            name,
            description: template.description.clone(),
            is_custom: custom_name.is_some(),
            based_on_template: Some(template.id.clone()),
            created_at: now,
            updated_at: now,
        };
        let rows = self.permission_rows(&role.module_code, role.id, &template.default_permissions)?;
        self.insert(role, rows)
    }

    /// Edit name/description and optionally replace the permission set, as
    /// one atomic write.
    pub fn update_role(&self, tenant_id: TenantId, role_id: RoleId, update: RoleUpdate) -> DomainResult<Role> {
        let mut role = self.load_role(tenant_id, role_id)?;

        if let Some(name) = &update.name {
            role.name = required_name(name)?;
        }
        if let Some(description) = update.description {
            role.description = Some(description);
        }
        role.updated_at = Utc::now();

        let rows = match &update.permissions {
            Some(grants) => Some(self.permission_rows(&role.module_code, role.id, grants)?),
            None => None,
        };
        let permissions_replaced = rows.is_some();

        self.storage.update_role(role.clone(), rows)?;

        info!(%tenant_id, %role_id, name = %role.name, permissions_replaced, "role updated");
        emit_quietly(self.audit.as_ref(), AuditEvent::RoleUpdated(Self::role_changed(&role)));
        // Cached sets carry role names.
        self.invalidate_assignees(tenant_id, role_id);
        Ok(role)
    }

    /// Deep copy of a role and its permission rows under a new name.
    pub fn clone_role(&self, tenant_id: TenantId, role_id: RoleId, new_name: &str) -> DomainResult<Role> {
        let source = self.role_with_permissions(tenant_id, role_id)?;
        let name = required_name(new_name)?;

        let now = Utc::now();
        let role = Role {
            id: RoleId::new(),
            tenant_id,
            module_code: source.role.module_code.clone(),
            name,
            description: source.role.description.clone(),
            is_custom: true,
            based_on_template: source.role.based_on_template.clone(),
            created_at: now,
            updated_at: now,
        };
        let rows = source
            .permissions
            .iter()
            .map(|p| RolePermission {
                role_id: role.id,
                resource_code: p.resource_code.clone(),
                permission_level: p.permission_level,
            })
            .collect();
        self.insert(role, rows)
    }

    /// Delete an unassigned role. A role still held by any user is a
    /// `Conflict` and stays untouched.
    pub fn delete_role(&self, tenant_id: TenantId, role_id: RoleId) -> DomainResult<()> {
        let role = self.load_role(tenant_id, role_id)?;
        self.storage.delete_role_if_unassigned(tenant_id, role_id)?;

        info!(%tenant_id, %role_id, name = %role.name, "role deleted");
        emit_quietly(self.audit.as_ref(), AuditEvent::RoleDeleted(Self::role_changed(&role)));
        Ok(())
    }

    /// Replace the role's whole permission set.
    pub fn set_role_permissions(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        grants: &[ResourceGrant],
    ) -> DomainResult<Vec<RolePermission>> {
        let role = self.load_role(tenant_id, role_id)?;
        let rows = self.permission_rows(&role.module_code, role_id, grants)?;
        self.storage.replace_role_permissions(tenant_id, role_id, rows.clone())?;

        info!(%tenant_id, %role_id, permissions = rows.len(), "role permissions replaced");
        emit_quietly(
            self.audit.as_ref(),
            AuditEvent::RolePermissionsReplaced(RolePermissionsReplaced {
                tenant_id,
                role_id,
                permission_count: rows.len(),
                occurred_at: Utc::now(),
            }),
        );
        self.invalidate_assignees(tenant_id, role_id);
        Ok(rows)
    }

    /// Give `user_id` the role; the assignment's module is the role's module.
    pub fn assign_role(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        role_id: RoleId,
    ) -> DomainResult<UserModuleRoleAssignment> {
        let role = self.load_role(tenant_id, role_id)?;
        let assignment = UserModuleRoleAssignment {
            user_id,
            module_code: role.module_code,
            role_id,
        };
        self.storage.insert_assignment(tenant_id, assignment.clone())?;

        info!(%tenant_id, %user_id, %role_id, module = %assignment.module_code, "role assigned");
        self.invalidate_user(tenant_id, user_id);
        Ok(assignment)
    }

    /// Returns whether the user held the role.
    pub fn revoke_role(&self, tenant_id: TenantId, user_id: UserId, role_id: RoleId) -> DomainResult<bool> {
        let role = self.load_role(tenant_id, role_id)?;
        let assignment = UserModuleRoleAssignment {
            user_id,
            module_code: role.module_code,
            role_id,
        };
        let removed = self.storage.delete_assignment(tenant_id, &assignment)?;

        if removed {
            info!(%tenant_id, %user_id, %role_id, "role revoked");
            self.invalidate_user(tenant_id, user_id);
        }
        Ok(removed)
    }

    pub fn set_user_data_scope(&self, scope: UserDataScope) -> DomainResult<()> {
        if scope.direct_reports.contains(&scope.user_id) {
            return Err(DomainError::validation("a user cannot be their own direct report"));
        }
        if scope.scopes.contains(&DataScopeLevel::None) && scope.scopes.len() > 1 {
            return Err(DomainError::validation("scope 'none' cannot be combined with other scopes"));
        }

        let (tenant_id, user_id) = (scope.tenant_id, scope.user_id);
        self.storage.upsert_user_data_scope(scope)?;
        info!(%tenant_id, %user_id, "user data scope updated");
        Ok(())
    }

    /// Stored org position, or an entitlement-free scope for unknown users.
    pub fn user_data_scope(&self, tenant_id: TenantId, user_id: UserId) -> DomainResult<UserDataScope> {
        Ok(self
            .storage
            .user_data_scope(tenant_id, user_id)?
            .unwrap_or_else(|| UserDataScope::new(tenant_id, user_id)))
    }

    /// Templates, optionally limited to one module, sorted by module then id.
    pub fn list_templates(&self, module_code: Option<&str>) -> DomainResult<Vec<RoleTemplate>> {
        let mut templates: Vec<RoleTemplate> = self
            .storage
            .templates()?
            .into_iter()
            .filter(|t| module_code.map_or(true, |m| t.module_code == m))
            .collect();
        templates.sort_by(|a, b| a.module_code.cmp(&b.module_code).then_with(|| a.id.cmp(&b.id)));
        Ok(templates)
    }
}

#[cfg(test)]
mod tests {
    use warden_events::{EventBus, InMemoryEventBus};

    use super::*;
    use crate::audit::EventBusAuditSink;
    use crate::storage::InMemoryAuthzStore;
    use crate::{PermissionLevel, Resource, ResourceType};

    fn res(code: &str, parent: Option<&str>, order: i32) -> Resource {
        Resource {
            code: code.to_string(),
            module_code: "wms".to_string(),
            parent_code: parent.map(str::to_string),
            resource_type: ResourceType::Data,
            is_leaf: parent.is_some(),
            display_order: order,
            name: code.to_string(),
        }
    }

    fn store() -> Arc<InMemoryAuthzStore> {
        let store = Arc::new(InMemoryAuthzStore::new());
        store
            .register_module(
                "wms",
                vec![
                    res("wms_inventory", None, 1),
                    res("wms_inventory_tracking", Some("wms_inventory"), 1),
                    res("wms_inventory_adjust", Some("wms_inventory"), 2),
                ],
            )
            .unwrap();
        store
            .register_template(RoleTemplate {
                id: TemplateId::new("wms_viewer"),
                module_code: "wms".to_string(),
                name: "WMS Viewer".to_string(),
                description: Some("Read-only warehouse access".to_string()),
                default_permissions: vec![ResourceGrant::new("wms_inventory_tracking", PermissionLevel::ViewOnly)],
            })
            .unwrap();
        store
    }

    fn new_role(name: &str, grants: Vec<ResourceGrant>) -> NewRole {
        NewRole {
            name: name.to_string(),
            module_code: "wms".to_string(),
            permissions: Some(grants),
            ..NewRole::default()
        }
    }

    #[test]
    fn create_role_with_permissions() {
        let store = store();
        let service = RoleService::new(store.clone());
        let tenant = TenantId::new();

        let role = service
            .create_role(tenant, new_role("Pickers", vec![ResourceGrant::new("wms_inventory_adjust", PermissionLevel::Manage)]))
            .unwrap();

        assert!(role.is_custom);
        let loaded = service.role_with_permissions(tenant, role.id).unwrap();
        assert_eq!(loaded.permissions.len(), 1);
        assert_eq!(loaded.permissions[0].permission_level, PermissionLevel::Manage);
        assert_eq!(service.roles_by_module(tenant, "wms").unwrap(), vec![role]);
    }

    #[test]
    fn create_role_validates_input() {
        let service = RoleService::new(store());
        let tenant = TenantId::new();

        assert!(matches!(
            service.create_role(tenant, new_role("  ", vec![])),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            service.create_role(
                tenant,
                new_role(
                    "Dupes",
                    vec![
                        ResourceGrant::new("wms_inventory", PermissionLevel::ViewOnly),
                        ResourceGrant::new("wms_inventory", PermissionLevel::Manage),
                    ]
                )
            ),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            service.create_role(tenant, new_role("Stray", vec![ResourceGrant::new("fin_ledger", PermissionLevel::Manage)])),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            service.create_role(
                tenant,
                NewRole {
                    name: "Ghost".into(),
                    module_code: "hr".into(),
                    ..NewRole::default()
                }
            ),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_name_in_module_conflicts() {
        let service = RoleService::new(store());
        let tenant = TenantId::new();

        service.create_role(tenant, new_role("Auditors", vec![])).unwrap();
        assert!(matches!(
            service.create_role(tenant, new_role("auditors", vec![])),
            Err(DomainError::Conflict(_))
        ));
        // Other tenants are independent.
        assert!(service.create_role(TenantId::new(), new_role("Auditors", vec![])).is_ok());
    }

    #[test]
    fn template_copies_defaults_and_sets_custom_flag() {
        let service = RoleService::new(store());
        let tenant = TenantId::new();
        let template = TemplateId::new("wms_viewer");

        let stock = service.create_from_template(tenant, &template, None).unwrap();
        assert!(!stock.is_custom);
        assert_eq!(stock.name, "WMS Viewer");
        assert_eq!(stock.based_on_template, Some(template.clone()));

        let named = service.create_from_template(tenant, &template, Some("Night Shift")).unwrap();
        assert!(named.is_custom);

        let perms = service.role_with_permissions(tenant, named.id).unwrap().permissions;
        assert_eq!(perms.len(), 1);
        assert_eq!(perms[0].resource_code, "wms_inventory_tracking");
        assert_eq!(perms[0].permission_level, PermissionLevel::ViewOnly);

        assert!(matches!(
            service.create_from_template(tenant, &TemplateId::new("nope"), None),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn based_on_template_without_permissions_uses_defaults() {
        let service = RoleService::new(store());
        let tenant = TenantId::new();

        let role = service
            .create_role(
                tenant,
                NewRole {
                    name: "Viewer Plus".into(),
                    module_code: "wms".into(),
                    based_on_template: Some(TemplateId::new("wms_viewer")),
                    ..NewRole::default()
                },
            )
            .unwrap();
        assert_eq!(service.role_with_permissions(tenant, role.id).unwrap().permissions.len(), 1);
    }

    #[test]
    fn delete_is_guarded_by_assignments() {
        let store = store();
        let service = RoleService::new(store.clone());
        let tenant = TenantId::new();
        let user = UserId::new();

        let role = service
            .create_role(tenant, new_role("Leads", vec![ResourceGrant::new("wms_inventory", PermissionLevel::Manage)]))
            .unwrap();
        service.assign_role(tenant, user, role.id).unwrap();

        assert!(matches!(service.delete_role(tenant, role.id), Err(DomainError::Conflict(_))));
        let still_there = service.role_with_permissions(tenant, role.id).unwrap();
        assert_eq!(still_there.permissions.len(), 1);

        assert!(service.revoke_role(tenant, user, role.id).unwrap());
        assert!(!service.revoke_role(tenant, user, role.id).unwrap());
        service.delete_role(tenant, role.id).unwrap();
        assert!(matches!(
            service.role_with_permissions(tenant, role.id),
            Err(DomainError::NotFound(_))
        ));
        assert!(store.role_permissions(tenant, role.id).unwrap().is_empty());
    }

    #[test]
    fn clone_deep_copies_permissions() {
        let service = RoleService::new(store());
        let tenant = TenantId::new();

        let source = service
            .create_role(tenant, new_role("Source", vec![ResourceGrant::new("wms_inventory", PermissionLevel::ViewOnly)]))
            .unwrap();
        let copy = service.clone_role(tenant, source.id, "Copy").unwrap();

        service.set_role_permissions(tenant, source.id, &[]).unwrap();

        let copied = service.role_with_permissions(tenant, copy.id).unwrap().permissions;
        assert_eq!(copied.len(), 1);
        assert_eq!(copied[0].role_id, copy.id);
    }

    #[test]
    fn update_replaces_permissions_and_drops_cached_sets() {
        let store = store();
        let service = RoleService::new(store.clone());
        let tenant = TenantId::new();
        let user = UserId::new();

        let role = service
            .create_role(tenant, new_role("Ops", vec![ResourceGrant::new("wms_inventory", PermissionLevel::ViewOnly)]))
            .unwrap();
        service.assign_role(tenant, user, role.id).unwrap();

        let resolver = crate::PermissionResolver::new(store.clone());
        resolver.calculate_effective_permissions(tenant, user).unwrap();
        assert!(resolver.cached_effective_permissions(tenant, user).unwrap().is_some());

        let updated = service
            .update_role(
                tenant,
                role.id,
                RoleUpdate {
                    name: Some("Operations".into()),
                    permissions: Some(vec![ResourceGrant::new("wms_inventory_adjust", PermissionLevel::Manage)]),
                    ..RoleUpdate::default()
                },
            )
            .unwrap();

        assert_eq!(updated.name, "Operations");
        assert!(resolver.cached_effective_permissions(tenant, user).unwrap().is_none());
        let perms = service.role_with_permissions(tenant, role.id).unwrap().permissions;
        assert_eq!(perms.len(), 1);
        assert_eq!(perms[0].resource_code, "wms_inventory_adjust");
    }

    #[test]
    fn rename_alone_drops_cached_sets() {
        let store = store();
        let service = RoleService::new(store.clone());
        let tenant = TenantId::new();
        let user = UserId::new();

        let role = service
            .create_role(tenant, new_role("Ops", vec![ResourceGrant::new("wms_inventory", PermissionLevel::ViewOnly)]))
            .unwrap();
        service.assign_role(tenant, user, role.id).unwrap();

        let resolver = crate::PermissionResolver::new(store.clone());
        let before = resolver.calculate_effective_permissions(tenant, user).unwrap();
        assert_eq!(before.entries[0].granted_by_role, "Ops");

        service
            .update_role(
                tenant,
                role.id,
                RoleUpdate {
                    name: Some("Floor Ops".into()),
                    ..RoleUpdate::default()
                },
            )
            .unwrap();

        assert!(resolver.cached_effective_permissions(tenant, user).unwrap().is_none());
        let after = resolver.calculate_effective_permissions(tenant, user).unwrap();
        assert_eq!(after.entries[0].granted_by_role, "Floor Ops");
    }

    #[test]
    fn assign_twice_conflicts() {
        let service = RoleService::new(store());
        let tenant = TenantId::new();
        let user = UserId::new();
        let role = service.create_role(tenant, new_role("Once", vec![])).unwrap();

        let assignment = service.assign_role(tenant, user, role.id).unwrap();
        assert_eq!(assignment.module_code, "wms");
        assert!(matches!(service.assign_role(tenant, user, role.id), Err(DomainError::Conflict(_))));
        assert!(matches!(
            service.assign_role(TenantId::new(), user, role.id),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn user_data_scope_is_validated() {
        let service = RoleService::new(store());
        let tenant = TenantId::new();
        let user = UserId::new();

        let mut own_report = UserDataScope::new(tenant, user);
        own_report.direct_reports.insert(user);
        assert!(matches!(service.set_user_data_scope(own_report), Err(DomainError::Validation(_))));

        let mixed = UserDataScope::new(tenant, user).with_scopes([DataScopeLevel::None, DataScopeLevel::Own]);
        assert!(matches!(service.set_user_data_scope(mixed), Err(DomainError::Validation(_))));

        assert!(service.user_data_scope(tenant, user).unwrap().scopes.is_empty());
        let scope = UserDataScope::new(tenant, user).with_scopes([DataScopeLevel::Team]);
        service.set_user_data_scope(scope.clone()).unwrap();
        assert_eq!(service.user_data_scope(tenant, user).unwrap(), scope);
    }

    #[test]
    fn templates_are_listed_per_module() {
        let service = RoleService::new(store());
        assert_eq!(service.list_templates(Some("wms")).unwrap().len(), 1);
        assert!(service.list_templates(Some("hr")).unwrap().is_empty());
        assert_eq!(service.list_templates(None).unwrap().len(), 1);
    }

    #[test]
    fn role_writes_are_audited() {
        let bus = Arc::new(InMemoryEventBus::<AuditEvent>::new());
        let sub = bus.subscribe();
        let service = RoleService::new(store()).with_audit(Arc::new(EventBusAuditSink::new(bus.clone())));
        let tenant = TenantId::new();

        let role = service.create_role(tenant, new_role("Audited", vec![])).unwrap();
        service.set_role_permissions(tenant, role.id, &[]).unwrap();
        service.delete_role(tenant, role.id).unwrap();

        let events = sub.drain();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], AuditEvent::RoleCreated(_)));
        assert!(matches!(events[1], AuditEvent::RolePermissionsReplaced(_)));
        assert!(matches!(events[2], AuditEvent::RoleDeleted(_)));
    }
}
