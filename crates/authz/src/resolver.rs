//! Permission resolution: role assignments → effective level per resource.
//!
//! - No IO beyond the storage collaborator
//! - No panics
//! - Fail closed: every miss or storage failure resolves to a deny

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use warden_core::{DomainError, DomainResult, RoleId, TenantId, UserId};

use crate::audit::{AuditEvent, AuditSink, NoopAuditSink, PermissionDenied, emit_quietly};
use crate::catalog::ResourceTree;
use crate::role::{Role, RolePermission};
use crate::storage::AuthzStorage;
use crate::PermissionLevel;

/// Typed "no" from the multi-resource combinators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: '{required}' required on '{resource}'")]
    Forbidden { resource: String, required: PermissionLevel },

    #[error("forbidden: '{required}' required on any of {resources:?}")]
    ForbiddenAny { resources: Vec<String>, required: PermissionLevel },

    #[error("no resources given to check")]
    EmptyRequirement,
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Forbidden { resource, required } => DomainError::denied(resource, required.as_str()),
            AuthzError::ForbiddenAny { resources, required } => {
                DomainError::denied(resources.join(","), required.as_str())
            }
            AuthzError::EmptyRequirement => DomainError::validation("no resources given to check"),
        }
    }
}

/// Outcome of a single permission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionCheck {
    pub resource_code: String,
    pub required: PermissionLevel,
    pub allowed: bool,
    /// Resolved (max) level; `NoAccess` when nothing matched.
    pub level: PermissionLevel,
    /// Name of the role that supplied `level`.
    pub granted_by_role: Option<String>,
    pub granted_by_role_id: Option<RoleId>,
    /// Set when the grant was inherited from an ancestor: the checked child.
    pub inherited_by: Option<String>,
    /// Set when the grant was inherited: the granting ancestor.
    pub inherited_from: Option<String>,
}

impl PermissionCheck {
    fn denied(resource_code: &str, required: PermissionLevel) -> Self {
        Self {
            resource_code: resource_code.to_string(),
            required,
            allowed: false,
            level: PermissionLevel::NoAccess,
            granted_by_role: None,
            granted_by_role_id: None,
            inherited_by: None,
            inherited_from: None,
        }
    }

    fn inherited(child: &str, from: PermissionCheck) -> Self {
        Self {
            resource_code: child.to_string(),
            required: from.required,
            allowed: from.allowed,
            level: from.level,
            granted_by_role: from.granted_by_role,
            granted_by_role_id: from.granted_by_role_id,
            inherited_by: Some(child.to_string()),
            inherited_from: Some(from.resource_code),
        }
    }
}

/// Resolved level of one resource for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermission {
    pub module_code: String,
    pub resource_code: String,
    pub level: PermissionLevel,
    pub granted_by_role: String,
    pub granted_by_role_id: RoleId,
}

/// Materialized effective permissions of a user.
///
/// A derived cache: safe to recompute at any time, never authoritative over
/// live role assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissionSet {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub computed_at: DateTime<Utc>,
    pub entries: Vec<EffectivePermission>,
}

/// Resolver behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Let `check_inherited` fall back to catalog ancestors.
    pub inherit_from_parent: bool,
    /// Publish `PermissionDenied` audit events.
    pub audit_denials: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            inherit_from_parent: true,
            audit_denials: true,
        }
    }
}

/// One permission row together with the role that carries it.
#[derive(Debug, Clone)]
struct Grant {
    role: Role,
    permission: RolePermission,
}

/// Pick the highest level; equal levels go to the lexically smallest role
/// name so the reported granting role is stable.
fn strongest<'a>(grants: impl Iterator<Item = &'a Grant>) -> Option<&'a Grant> {
    let mut best: Option<&'a Grant> = None;
    for g in grants {
        best = match best {
            Some(b)
                if b.permission.permission_level > g.permission.permission_level
                    || (b.permission.permission_level == g.permission.permission_level
                        && b.role.name <= g.role.name) =>
            {
                Some(b)
            }
            _ => Some(g),
        };
    }
    best
}

/// Resolve `resource_code` over `grants`. With a module, only roles of that
/// module count: codes are unique per module, not across modules.
fn decide(
    module_code: Option<&str>,
    resource_code: &str,
    required: PermissionLevel,
    grants: &[Grant],
) -> PermissionCheck {
    let matching = grants.iter().filter(|g| {
        g.permission.resource_code == resource_code && module_code.map_or(true, |m| g.role.module_code == m)
    });
    let Some(best) = strongest(matching) else {
        return PermissionCheck::denied(resource_code, required);
    };

    let level = best.permission.permission_level;
    PermissionCheck {
        resource_code: resource_code.to_string(),
        required,
        // `no_access` rows never grant anything, whatever was asked for.
        allowed: level != PermissionLevel::NoAccess && level.satisfies(required),
        level,
        granted_by_role: Some(best.role.name.clone()),
        granted_by_role_id: Some(best.role.id),
        inherited_by: None,
        inherited_from: None,
    }
}

/// Computes effective permissions from role assignments.
///
/// Super-admin bypass is a caller concern: check the capability before
/// calling in, so this type stays a pure policy evaluator.
pub struct PermissionResolver<S> {
    storage: S,
    audit: Arc<dyn AuditSink>,
    options: ResolverOptions,
}

impl<S> PermissionResolver<S>
where
    S: AuthzStorage,
{
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            audit: Arc::new(NoopAuditSink),
            options: ResolverOptions::default(),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> ResolverOptions {
        self.options
    }

    /// Every permission row reachable from the user's assignments.
    fn grants(&self, tenant_id: TenantId, user_id: UserId) -> DomainResult<Vec<Grant>> {
        let assignments = self.storage.user_assignments(tenant_id, user_id)?;
        let mut seen = HashSet::new();
        let mut grants = Vec::new();

        for assignment in assignments {
            if !seen.insert(assignment.role_id) {
                continue;
            }

            let Some(role) = self.storage.role(tenant_id, assignment.role_id)? else {
                warn!(%tenant_id, %user_id, role_id = %assignment.role_id, "assignment references a missing role; ignoring");
                continue;
            };
            if role.module_code != assignment.module_code {
                warn!(
                    %tenant_id, %user_id, role_id = %role.id,
                    role_module = %role.module_code, assignment_module = %assignment.module_code,
                    "assignment module does not match role module; ignoring"
                );
                continue;
            }

            for permission in self.storage.role_permissions(tenant_id, role.id)? {
                grants.push(Grant {
                    role: role.clone(),
                    permission,
                });
            }
        }

        Ok(grants)
    }

    fn audit_denial(&self, tenant_id: TenantId, user_id: UserId, check: &PermissionCheck) {
        if check.allowed || !self.options.audit_denials {
            return;
        }
        emit_quietly(
            self.audit.as_ref(),
            AuditEvent::PermissionDenied(PermissionDenied {
                tenant_id,
                user_id,
                resource_code: check.resource_code.clone(),
                required: check.required,
                resolved: check.level,
                occurred_at: Utc::now(),
            }),
        );
    }

    fn fail_closed(&self, tenant_id: TenantId, user_id: UserId, resource_code: &str, err: &DomainError) {
        warn!(%tenant_id, %user_id, resource = resource_code, error = %err, "permission lookup failed; denying");
    }

    fn try_check(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        module_code: Option<&str>,
        resource_code: &str,
        required: PermissionLevel,
    ) -> DomainResult<PermissionCheck> {
        let grants = self.grants(tenant_id, user_id)?;
        let check = decide(module_code, resource_code, required, &grants);

        debug!(
            %tenant_id, %user_id, module = module_code, resource = resource_code, %required,
            level = %check.level, allowed = check.allowed, "permission check"
        );
        self.audit_denial(tenant_id, user_id, &check);
        Ok(check)
    }

    fn check(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        module_code: Option<&str>,
        resource_code: &str,
        required: PermissionLevel,
    ) -> PermissionCheck {
        match self.try_check(tenant_id, user_id, module_code, resource_code, required) {
            Ok(check) => check,
            Err(err) => {
                self.fail_closed(tenant_id, user_id, resource_code, &err);
                let check = PermissionCheck::denied(resource_code, required);
                self.audit_denial(tenant_id, user_id, &check);
                check
            }
        }
    }

    /// Check `required` on `resource_code`, propagating structural failures.
    pub fn try_check_permission(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        resource_code: &str,
        required: PermissionLevel,
    ) -> DomainResult<PermissionCheck> {
        self.try_check(tenant_id, user_id, None, resource_code, required)
    }

    /// Check `required` on `resource_code`.
    ///
    /// The highest level among all of the user's matching roles wins. Zero
    /// matching rows, and any storage failure, yield `allowed: false` at
    /// `no_access`.
    ///
    /// Rows match by resource code across every module the user holds roles
    /// in. When a code is reused by several modules, use
    /// `check_module_permission` instead.
    pub fn check_permission(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        resource_code: &str,
        required: PermissionLevel,
    ) -> PermissionCheck {
        self.check(tenant_id, user_id, None, resource_code, required)
    }

    /// `try_check_permission` restricted to roles of `module_code`.
    pub fn try_check_module_permission(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        module_code: &str,
        resource_code: &str,
        required: PermissionLevel,
    ) -> DomainResult<PermissionCheck> {
        self.try_check(tenant_id, user_id, Some(module_code), resource_code, required)
    }

    /// `check_permission` restricted to roles of `module_code`.
    pub fn check_module_permission(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        module_code: &str,
        resource_code: &str,
        required: PermissionLevel,
    ) -> PermissionCheck {
        self.check(tenant_id, user_id, Some(module_code), resource_code, required)
    }

    /// Coarse "can enter module" gate: any role assignment in the module.
    pub fn check_module_access(&self, tenant_id: TenantId, user_id: UserId, module_code: &str) -> bool {
        match self.storage.user_assignments(tenant_id, user_id) {
            Ok(assignments) => assignments.iter().any(|a| a.module_code == module_code),
            Err(err) => {
                warn!(%tenant_id, %user_id, module = module_code, error = %err, "module access lookup failed; denying");
                false
            }
        }
    }

    /// Distinct modules where the user holds any role, sorted.
    pub fn accessible_modules(&self, tenant_id: TenantId, user_id: UserId) -> DomainResult<Vec<String>> {
        let modules: BTreeSet<String> = self
            .storage
            .user_assignments(tenant_id, user_id)?
            .into_iter()
            .map(|a| a.module_code)
            .collect();
        Ok(modules.into_iter().collect())
    }

    /// Resolved level for every resource the user has a row for, optionally
    /// limited to one module. Sorted by module then resource code.
    pub fn effective_permissions(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        module_code: Option<&str>,
    ) -> DomainResult<Vec<EffectivePermission>> {
        let grants = self.grants(tenant_id, user_id)?;

        let mut by_resource: BTreeMap<(&str, &str), Vec<&Grant>> = BTreeMap::new();
        for g in &grants {
            if module_code.is_some_and(|m| g.role.module_code != m) {
                continue;
            }
            by_resource
                .entry((g.role.module_code.as_str(), g.permission.resource_code.as_str()))
                .or_default()
                .push(g);
        }

        Ok(by_resource
            .into_iter()
            .filter_map(|((module, resource), group)| {
                strongest(group.into_iter()).map(|best| EffectivePermission {
                    module_code: module.to_string(),
                    resource_code: resource.to_string(),
                    level: best.permission.permission_level,
                    granted_by_role: best.role.name.clone(),
                    granted_by_role_id: best.role.id,
                })
            })
            .collect())
    }

    /// Child first; if denied, a granting parent is inherited by the child.
    pub fn check_hierarchical(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        parent_code: &str,
        child_code: &str,
        required: PermissionLevel,
    ) -> PermissionCheck {
        let grants = match self.grants(tenant_id, user_id) {
            Ok(grants) => grants,
            Err(err) => {
                self.fail_closed(tenant_id, user_id, child_code, &err);
                let check = PermissionCheck::denied(child_code, required);
                self.audit_denial(tenant_id, user_id, &check);
                return check;
            }
        };

        let child = decide(None, child_code, required, &grants);
        if child.allowed {
            return child;
        }

        let parent = decide(None, parent_code, required, &grants);
        let check = if parent.allowed {
            debug!(%tenant_id, %user_id, parent = parent_code, child = child_code, "permission inherited from parent");
            PermissionCheck::inherited(child_code, parent)
        } else {
            child
        };

        self.audit_denial(tenant_id, user_id, &check);
        check
    }

    /// Like `check_hierarchical`, but walks every catalog ancestor of
    /// `resource_code`, nearest first. Unknown modules or resources deny.
    pub fn check_inherited(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        module_code: &str,
        resource_code: &str,
        required: PermissionLevel,
    ) -> PermissionCheck {
        let outcome = self.resolve_inherited(tenant_id, user_id, module_code, resource_code, required);
        let check = outcome.unwrap_or_else(|err| {
            self.fail_closed(tenant_id, user_id, resource_code, &err);
            PermissionCheck::denied(resource_code, required)
        });
        self.audit_denial(tenant_id, user_id, &check);
        check
    }

    fn resolve_inherited(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        module_code: &str,
        resource_code: &str,
        required: PermissionLevel,
    ) -> DomainResult<PermissionCheck> {
        let grants = self.grants(tenant_id, user_id)?;
        let direct = decide(Some(module_code), resource_code, required, &grants);
        if direct.allowed || !self.options.inherit_from_parent {
            return Ok(direct);
        }

        let resources = self
            .storage
            .resources_by_module(module_code)?
            .ok_or_else(|| DomainError::not_found(format!("module '{module_code}'")))?;
        let tree = ResourceTree::build(module_code, resources)?;
        if !tree.contains(resource_code) {
            return Err(DomainError::not_found(format!(
                "resource '{resource_code}' in module '{module_code}'"
            )));
        }

        for ancestor in tree.ancestors(resource_code) {
            let check = decide(Some(module_code), &ancestor.code, required, &grants);
            if check.allowed {
                debug!(%tenant_id, %user_id, resource = resource_code, ancestor = %ancestor.code, "permission inherited from ancestor");
                return Ok(PermissionCheck::inherited(resource_code, check));
            }
        }
        Ok(direct)
    }

    /// Allow on the first resource that passes.
    pub fn require_any<R: AsRef<str>>(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        resource_codes: &[R],
        required: PermissionLevel,
    ) -> Result<PermissionCheck, AuthzError> {
        if resource_codes.is_empty() {
            return Err(AuthzError::EmptyRequirement);
        }

        for code in resource_codes {
            let check = self.check_permission(tenant_id, user_id, code.as_ref(), required);
            if check.allowed {
                return Ok(check);
            }
        }

        Err(AuthzError::ForbiddenAny {
            resources: resource_codes.iter().map(|c| c.as_ref().to_string()).collect(),
            required,
        })
    }

    /// Every resource must pass; fails fast naming the first one that does not.
    pub fn require_all<R: AsRef<str>>(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        resource_codes: &[R],
        required: PermissionLevel,
    ) -> Result<Vec<PermissionCheck>, AuthzError> {
        if resource_codes.is_empty() {
            return Err(AuthzError::EmptyRequirement);
        }

        let mut checks = Vec::with_capacity(resource_codes.len());
        for code in resource_codes {
            let check = self.check_permission(tenant_id, user_id, code.as_ref(), required);
            if !check.allowed {
                return Err(AuthzError::Forbidden {
                    resource: code.as_ref().to_string(),
                    required,
                });
            }
            checks.push(check);
        }
        Ok(checks)
    }

    /// Recompute and store the user's effective permissions (idempotent,
    /// last writer wins).
    pub fn calculate_effective_permissions(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> DomainResult<EffectivePermissionSet> {
        let set = EffectivePermissionSet {
            tenant_id,
            user_id,
            computed_at: Utc::now(),
            entries: self.effective_permissions(tenant_id, user_id, None)?,
        };
        self.storage.put_effective_permissions(tenant_id, user_id, set.clone())?;

        debug!(%tenant_id, %user_id, entries = set.entries.len(), "effective permissions materialized");
        Ok(set)
    }

    /// Previously materialized set, if any. For rendering only.
    pub fn cached_effective_permissions(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> DomainResult<Option<EffectivePermissionSet>> {
        Ok(self.storage.effective_permissions(tenant_id, user_id)?)
    }

    pub fn invalidate_effective_permissions(&self, tenant_id: TenantId, user_id: UserId) -> DomainResult<()> {
        Ok(self.storage.clear_effective_permissions(tenant_id, user_id)?)
    }
}
