use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use warden_core::{RoleId, TemplateId, TenantId, UserId};

use super::{AuthzStorage, StorageError};
use crate::resolver::EffectivePermissionSet;
use crate::role::{Role, RolePermission, RoleTemplate, UserModuleRoleAssignment};
use crate::scope::UserDataScope;
use crate::Resource;

#[derive(Debug, Default)]
struct State {
    modules: BTreeMap<String, Vec<Resource>>,
    templates: BTreeMap<TemplateId, RoleTemplate>,
    roles: HashMap<(TenantId, RoleId), Role>,
    permissions: HashMap<(TenantId, RoleId), Vec<RolePermission>>,
    assignments: HashMap<TenantId, Vec<UserModuleRoleAssignment>>,
    scopes: HashMap<(TenantId, UserId), UserDataScope>,
    effective: HashMap<(TenantId, UserId), EffectivePermissionSet>,
}

impl State {
    fn name_taken(&self, role: &Role) -> bool {
        self.roles.values().any(|r| {
            r.tenant_id == role.tenant_id
                && r.id != role.id
                && r.module_code == role.module_code
                && r.name.eq_ignore_ascii_case(&role.name)
        })
    }

    fn assignment_count(&self, tenant_id: TenantId, role_id: RoleId) -> usize {
        self.assignments
            .get(&tenant_id)
            .map(|rows| rows.iter().filter(|a| a.role_id == role_id).count())
            .unwrap_or(0)
    }
}

/// In-memory storage for tests/dev.
///
/// Every write takes the single write lock for its whole duration, which is
/// what makes the composite writes atomic here. `set_unavailable(true)`
/// makes every call fail with `StorageError::Backend` to exercise
/// fail-closed paths.
#[derive(Debug, Default)]
pub struct InMemoryAuthzStore {
    state: RwLock<State>,
    unavailable: AtomicBool,
}

impl InMemoryAuthzStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the resource rows of a module.
    pub fn register_module(
        &self,
        module_code: impl Into<String>,
        resources: Vec<Resource>,
    ) -> Result<(), StorageError> {
        let mut state = self.write()?;
        state.modules.insert(module_code.into(), resources);
        Ok(())
    }

    pub fn register_template(&self, template: RoleTemplate) -> Result<(), StorageError> {
        let mut state = self.write()?;
        state.templates.insert(template.id.clone(), template);
        Ok(())
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("storage unavailable".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StorageError> {
        self.check_available()?;
        self.state
            .read()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StorageError> {
        self.check_available()?;
        self.state
            .write()
            .map_err(|_| StorageError::Backend("lock poisoned".to_string()))
    }
}

impl AuthzStorage for InMemoryAuthzStore {
    fn modules(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.read()?.modules.keys().cloned().collect())
    }

    fn resources_by_module(&self, module_code: &str) -> Result<Option<Vec<Resource>>, StorageError> {
        Ok(self.read()?.modules.get(module_code).cloned())
    }

    fn role(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Option<Role>, StorageError> {
        Ok(self.read()?.roles.get(&(tenant_id, role_id)).cloned())
    }

    fn roles_by_module(&self, tenant_id: TenantId, module_code: &str) -> Result<Vec<Role>, StorageError> {
        let state = self.read()?;
        let mut roles: Vec<Role> = state
            .roles
            .values()
            .filter(|r| r.tenant_id == tenant_id && r.module_code == module_code)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    fn role_permissions(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Vec<RolePermission>, StorageError> {
        Ok(self
            .read()?
            .permissions
            .get(&(tenant_id, role_id))
            .cloned()
            .unwrap_or_default())
    }

    fn templates(&self) -> Result<Vec<RoleTemplate>, StorageError> {
        Ok(self.read()?.templates.values().cloned().collect())
    }

    fn template(&self, template_id: &TemplateId) -> Result<Option<RoleTemplate>, StorageError> {
        Ok(self.read()?.templates.get(template_id).cloned())
    }

    fn user_assignments(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Vec<UserModuleRoleAssignment>, StorageError> {
        let state = self.read()?;
        Ok(state
            .assignments
            .get(&tenant_id)
            .map(|rows| rows.iter().filter(|a| a.user_id == user_id).cloned().collect())
            .unwrap_or_default())
    }

    fn role_assignees(&self, tenant_id: TenantId, role_id: RoleId) -> Result<Vec<UserId>, StorageError> {
        let state = self.read()?;
        Ok(state
            .assignments
            .get(&tenant_id)
            .map(|rows| rows.iter().filter(|a| a.role_id == role_id).map(|a| a.user_id).collect())
            .unwrap_or_default())
    }

    fn user_data_scope(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<UserDataScope>, StorageError> {
        Ok(self.read()?.scopes.get(&(tenant_id, user_id)).cloned())
    }

    fn effective_permissions(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> Result<Option<EffectivePermissionSet>, StorageError> {
        Ok(self.read()?.effective.get(&(tenant_id, user_id)).cloned())
    }

    fn insert_role(&self, role: Role, permissions: Vec<RolePermission>) -> Result<(), StorageError> {
        let mut state = self.write()?;
        let key = (role.tenant_id, role.id);

        if state.roles.contains_key(&key) {
            return Err(StorageError::Duplicate(format!("role id {}", role.id)));
        }
        if state.name_taken(&role) {
            return Err(StorageError::Duplicate(format!(
                "role name '{}' in module '{}'",
                role.name, role.module_code
            )));
        }

        state.roles.insert(key, role);
        state.permissions.insert(key, permissions);
        Ok(())
    }

    fn update_role(&self, role: Role, permissions: Option<Vec<RolePermission>>) -> Result<(), StorageError> {
        let mut state = self.write()?;
        let key = (role.tenant_id, role.id);

        if !state.roles.contains_key(&key) {
            return Err(StorageError::MissingRole(role.id));
        }
        if state.name_taken(&role) {
            return Err(StorageError::Duplicate(format!(
                "role name '{}' in module '{}'",
                role.name, role.module_code
            )));
        }

        state.roles.insert(key, role);
        if let Some(permissions) = permissions {
            state.permissions.insert(key, permissions);
        }
        Ok(())
    }

    fn replace_role_permissions(
        &self,
        tenant_id: TenantId,
        role_id: RoleId,
        permissions: Vec<RolePermission>,
    ) -> Result<(), StorageError> {
        let mut state = self.write()?;
        let key = (tenant_id, role_id);

        if !state.roles.contains_key(&key) {
            return Err(StorageError::MissingRole(role_id));
        }

        state.permissions.insert(key, permissions);
        Ok(())
    }

    fn delete_role_if_unassigned(&self, tenant_id: TenantId, role_id: RoleId) -> Result<(), StorageError> {
        let mut state = self.write()?;
        let key = (tenant_id, role_id);

        if !state.roles.contains_key(&key) {
            return Err(StorageError::MissingRole(role_id));
        }

        let assignments = state.assignment_count(tenant_id, role_id);
        if assignments > 0 {
            return Err(StorageError::RoleInUse { role_id, assignments });
        }

        state.roles.remove(&key);
        state.permissions.remove(&key);
        Ok(())
    }

    fn insert_assignment(
        &self,
        tenant_id: TenantId,
        assignment: UserModuleRoleAssignment,
    ) -> Result<(), StorageError> {
        let mut state = self.write()?;

        if !state.roles.contains_key(&(tenant_id, assignment.role_id)) {
            return Err(StorageError::MissingRole(assignment.role_id));
        }

        let rows = state.assignments.entry(tenant_id).or_default();
        if rows.contains(&assignment) {
            return Err(StorageError::Duplicate(format!(
                "user {} already holds role {}",
                assignment.user_id, assignment.role_id
            )));
        }

        rows.push(assignment);
        Ok(())
    }

    fn delete_assignment(
        &self,
        tenant_id: TenantId,
        assignment: &UserModuleRoleAssignment,
    ) -> Result<bool, StorageError> {
        let mut state = self.write()?;
        let Some(rows) = state.assignments.get_mut(&tenant_id) else {
            return Ok(false);
        };

        let before = rows.len();
        rows.retain(|a| a != assignment);
        Ok(rows.len() != before)
    }

    fn upsert_user_data_scope(&self, scope: UserDataScope) -> Result<(), StorageError> {
        let mut state = self.write()?;
        state.scopes.insert((scope.tenant_id, scope.user_id), scope);
        Ok(())
    }

    fn put_effective_permissions(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        set: EffectivePermissionSet,
    ) -> Result<(), StorageError> {
        let mut state = self.write()?;
        state.effective.insert((tenant_id, user_id), set);
        Ok(())
    }

    fn clear_effective_permissions(&self, tenant_id: TenantId, user_id: UserId) -> Result<(), StorageError> {
        let mut state = self.write()?;
        state.effective.remove(&(tenant_id, user_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::PermissionLevel;

    fn role(tenant_id: TenantId, name: &str) -> Role {
        Role {
            id: RoleId::new(),
            tenant_id,
            module_code: "wms".to_string(),
            name: name.to_string(),
            description: None,
            is_custom: true,
            based_on_template: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn perm(role_id: RoleId, code: &str, level: PermissionLevel) -> RolePermission {
        RolePermission {
            role_id,
            resource_code: code.to_string(),
            permission_level: level,
        }
    }

    #[test]
    fn lookups_are_tenant_isolated() {
        let store = InMemoryAuthzStore::new();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        let r = role(tenant_a, "Viewer");
        let role_id = r.id;

        store.insert_role(r, vec![perm(role_id, "wms_stock", PermissionLevel::ViewOnly)]).unwrap();

        assert!(store.role(tenant_a, role_id).unwrap().is_some());
        assert!(store.role(tenant_b, role_id).unwrap().is_none());
        assert!(store.role_permissions(tenant_b, role_id).unwrap().is_empty());
        assert!(store.roles_by_module(tenant_b, "wms").unwrap().is_empty());
    }

    #[test]
    fn duplicate_role_name_in_module_is_rejected() {
        let store = InMemoryAuthzStore::new();
        let tenant_id = TenantId::new();

        store.insert_role(role(tenant_id, "Viewer"), vec![]).unwrap();
        let err = store.insert_role(role(tenant_id, "viewer"), vec![]).unwrap_err();

        assert!(matches!(err, StorageError::Duplicate(_)));
    }

    #[test]
    fn replace_overwrites_the_whole_permission_set() {
        let store = InMemoryAuthzStore::new();
        let tenant_id = TenantId::new();
        let r = role(tenant_id, "Clerk");
        let role_id = r.id;
        store
            .insert_role(
                r,
                vec![
                    perm(role_id, "a", PermissionLevel::Manage),
                    perm(role_id, "b", PermissionLevel::ViewOnly),
                ],
            )
            .unwrap();

        store
            .replace_role_permissions(tenant_id, role_id, vec![perm(role_id, "c", PermissionLevel::ViewOnly)])
            .unwrap();

        let rows = store.role_permissions(tenant_id, role_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].resource_code, "c");
    }

    #[test]
    fn delete_is_refused_while_assigned() {
        let store = InMemoryAuthzStore::new();
        let tenant_id = TenantId::new();
        let r = role(tenant_id, "Picker");
        let role_id = r.id;
        store.insert_role(r, vec![perm(role_id, "a", PermissionLevel::ViewOnly)]).unwrap();
        store
            .insert_assignment(
                tenant_id,
                UserModuleRoleAssignment {
                    user_id: UserId::new(),
                    module_code: "wms".to_string(),
                    role_id,
                },
            )
            .unwrap();

        let err = store.delete_role_if_unassigned(tenant_id, role_id).unwrap_err();

        assert_eq!(err, StorageError::RoleInUse { role_id, assignments: 1 });
        assert!(store.role(tenant_id, role_id).unwrap().is_some());
        assert_eq!(store.role_permissions(tenant_id, role_id).unwrap().len(), 1);
    }

    #[test]
    fn unavailable_store_fails_every_call() {
        let store = InMemoryAuthzStore::new();
        store.set_unavailable(true);

        assert!(matches!(store.modules(), Err(StorageError::Backend(_))));
        assert!(matches!(
            store.user_assignments(TenantId::new(), UserId::new()),
            Err(StorageError::Backend(_))
        ));
    }
}
