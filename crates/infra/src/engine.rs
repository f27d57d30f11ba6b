//! `AuthzEngine`: every resolver wired against one storage and one audit sink.
//!
//! The resolvers stay usable on their own; the engine only adds the lookups
//! that need more than one of them (a user's stored org position, the role
//! names a field rule may require) and fails closed where a decision must be
//! produced even though a lookup failed.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use warden_authz::{
    AuditEvent, AuditSink, AuthzStorage, DataFilter, DataScopeResolver, DataScopeRule, EventBusAuditSink,
    FieldAccessResolver, FieldContext, FieldRule, InMemoryAuthzStore, PermissionResolver, Record, ResourceCatalog,
    ResourceNode, RoleService, UserDataScope,
};
use warden_core::{DomainResult, TenantId, UserId};
use warden_events::InMemoryEventBus;

use crate::config::AuthzConfig;
use crate::seed;

pub struct AuthzEngine<S> {
    storage: S,
    catalog: ResourceCatalog<S>,
    permissions: PermissionResolver<S>,
    roles: RoleService<S>,
    scopes: Arc<DataScopeResolver>,
    fields: FieldAccessResolver,
}

impl<S> AuthzEngine<S>
where
    S: AuthzStorage + Clone,
{
    pub fn new(
        storage: S,
        audit: Arc<dyn AuditSink>,
        config: &AuthzConfig,
        scope_rules: Vec<DataScopeRule>,
        field_rules: Vec<FieldRule>,
    ) -> DomainResult<Self> {
        let scopes = Arc::new(DataScopeResolver::new(scope_rules)?.with_audit(audit.clone(), config.audit_denials));
        let fields = FieldAccessResolver::new(field_rules, scopes.clone())?.with_currency_symbol(config.currency_symbol.clone());

        Ok(Self {
            catalog: ResourceCatalog::new(storage.clone()),
            permissions: PermissionResolver::new(storage.clone())
                .with_audit(audit.clone())
                .with_options(config.resolver_options()),
            roles: RoleService::new(storage.clone()).with_audit(audit),
            storage,
            scopes,
            fields,
        })
    }

    pub fn catalog(&self) -> &ResourceCatalog<S> {
        &self.catalog
    }

    pub fn permissions(&self) -> &PermissionResolver<S> {
        &self.permissions
    }

    pub fn roles(&self) -> &RoleService<S> {
        &self.roles
    }

    pub fn scopes(&self) -> &DataScopeResolver {
        &self.scopes
    }

    pub fn fields(&self) -> &FieldAccessResolver {
        &self.fields
    }

    /// For registering custom maskers.
    pub fn fields_mut(&mut self) -> &mut FieldAccessResolver {
        &mut self.fields
    }

    /// Stored org position of a user; entitlement-free when none is stored.
    pub fn user_scope(&self, tenant_id: TenantId, user_id: UserId) -> DomainResult<UserDataScope> {
        self.roles.user_data_scope(tenant_id, user_id)
    }

    /// Field context carrying the user's stored scope and the names of the
    /// roles they hold, plus caller-supplied permission strings.
    pub fn field_context<I, P>(&self, tenant_id: TenantId, user_id: UserId, permissions: I) -> DomainResult<FieldContext>
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let mut roles = Vec::new();
        for assignment in self.storage.user_assignments(tenant_id, user_id)? {
            if let Some(role) = self.storage.role(tenant_id, assignment.role_id)? {
                roles.push(role.name);
            }
        }

        Ok(FieldContext::new(self.user_scope(tenant_id, user_id)?)
            .with_roles(roles)
            .with_permissions(permissions))
    }

    /// Scope filter for a user looked up from storage. A failed lookup
    /// compiles to the always-false filter.
    pub fn compile_filter(&self, tenant_id: TenantId, user_id: UserId, resource: &str, action: &str) -> DataFilter {
        match self.user_scope(tenant_id, user_id) {
            Ok(scope) => self.scopes.compile_filter(resource, action, &scope),
            Err(err) => {
                warn!(%tenant_id, %user_id, resource, action, error = %err, "user scope lookup failed; denying all rows");
                DataFilter::deny_all()
            }
        }
    }

    /// Every registered module's hierarchy, keyed by module code.
    pub fn catalog_snapshot(&self) -> DomainResult<BTreeMap<String, Vec<ResourceNode>>> {
        let mut out = BTreeMap::new();
        for module in self.catalog.modules()? {
            let nodes = self.catalog.hierarchy(&module)?;
            out.insert(module, nodes);
        }
        Ok(out)
    }

    /// Ownership check for a user looked up from storage; lookup failures deny.
    pub fn can_access(&self, tenant_id: TenantId, user_id: UserId, resource: &str, action: &str, record: &Record) -> bool {
        match self.user_scope(tenant_id, user_id) {
            Ok(scope) => self.scopes.can_access(resource, action, &scope, record),
            Err(err) => {
                warn!(%tenant_id, %user_id, resource, action, error = %err, "user scope lookup failed; denying");
                false
            }
        }
    }
}

pub type InMemoryEngine = AuthzEngine<Arc<InMemoryAuthzStore>>;

/// Seeded in-memory engine plus the handles tests and tools need.
pub struct InMemoryDeployment {
    pub engine: InMemoryEngine,
    pub store: Arc<InMemoryAuthzStore>,
    pub audit_bus: Arc<InMemoryEventBus<AuditEvent>>,
}

impl InMemoryEngine {
    /// Process start-up: install logging from `config`, then build the
    /// seeded engine. Logging setup is a no-op after the first call.
    pub fn bootstrap(config: &AuthzConfig) -> anyhow::Result<InMemoryDeployment> {
        warden_observability::init(&config.log_config());
        Self::in_memory(config)
    }

    /// Build a seeded in-memory engine. Rule files named by `config` replace
    /// the built-in rule sets.
    pub fn in_memory(config: &AuthzConfig) -> anyhow::Result<InMemoryDeployment> {
        let store = Arc::new(InMemoryAuthzStore::new());
        seed::seed_store(&store).context("failed to seed the in-memory store")?;

        let scope_rules = match &config.scope_rules_path {
            Some(path) => seed::load_scope_rules(path)?,
            None => seed::scope_rules(),
        };
        let field_rules = match &config.field_rules_path {
            Some(path) => seed::load_field_rules(path)?,
            None => seed::field_rules(),
        };

        let audit_bus: Arc<InMemoryEventBus<AuditEvent>> = Arc::new(InMemoryEventBus::new());
        let audit: Arc<dyn AuditSink> = Arc::new(EventBusAuditSink::new(audit_bus.clone()));

        let engine = AuthzEngine::new(store.clone(), audit, config, scope_rules, field_rules)
            .context("invalid authorization rules")?;

        info!(
            scope_rules = engine.scopes.rules().len(),
            field_rules = engine.fields.rules().len(),
            "in-memory authorization engine ready"
        );
        Ok(InMemoryDeployment {
            engine,
            store,
            audit_bus,
        })
    }
}
