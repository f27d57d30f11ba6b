//! Data-scope (row-level) resolution.
//!
//! Rules say which breadth of rows a `(resource, action)` may reach; the
//! user's org position says which rows that breadth covers. Output is either
//! an ownership check on one record or a compiled `DataFilter`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use warden_core::{DepartmentId, DomainError, DomainResult, Entity, TeamId, TenantId, UserId};

use crate::audit::{AuditEvent, AuditSink, NoopAuditSink, ScopeDenied, emit_quietly};
use crate::filter::{Condition, DataFilter};
use crate::Record;

/// Breadth of rows a user may reach.
///
/// Ordered `None < Own < Team < Department < Tenant < Global`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataScopeLevel {
    None,
    Own,
    Team,
    Department,
    Tenant,
    Global,
}

impl DataScopeLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            DataScopeLevel::None => "none",
            DataScopeLevel::Own => "own",
            DataScopeLevel::Team => "team",
            DataScopeLevel::Department => "department",
            DataScopeLevel::Tenant => "tenant",
            DataScopeLevel::Global => "global",
        }
    }
}

impl core::fmt::Display for DataScopeLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wildcard action matching every action of a resource.
pub const ANY_ACTION: &str = "*";

/// Scope rule for a `(resource, action)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataScopeRule {
    pub resource: String,
    pub action: String,
    /// Scopes in priority order.
    pub scopes: Vec<DataScopeLevel>,
    /// Extra field equalities AND-ed into every decision.
    #[serde(default)]
    pub conditions: BTreeMap<String, Value>,
    #[serde(default)]
    pub priority: i32,
}

impl DataScopeRule {
    pub fn new(resource: impl Into<String>, action: impl Into<String>, scopes: Vec<DataScopeLevel>, priority: i32) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            scopes,
            conditions: BTreeMap::new(),
            priority,
        }
    }

    pub fn with_condition(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    fn applies_to(&self, resource: &str, action: &str) -> bool {
        self.resource == resource && (self.action == action || self.action == ANY_ACTION)
    }

    fn validate(&self) -> DomainResult<()> {
        if self.resource.trim().is_empty() {
            return Err(DomainError::validation("scope rule resource cannot be empty"));
        }
        if self.action.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "scope rule for '{}' has an empty action",
                self.resource
            )));
        }
        if self.scopes.is_empty() {
            return Err(DomainError::validation(format!(
                "scope rule for '{}'/'{}' lists no scopes",
                self.resource, self.action
            )));
        }
        Ok(())
    }
}

/// A user's position in the tenant's org chart plus the scopes they are
/// broadly entitled to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDataScope {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
    #[serde(default)]
    pub team_id: Option<TeamId>,
    #[serde(default)]
    pub managed_departments: BTreeSet<DepartmentId>,
    #[serde(default)]
    pub managed_teams: BTreeSet<TeamId>,
    #[serde(default)]
    pub direct_reports: BTreeSet<UserId>,
    #[serde(default)]
    pub scopes: BTreeSet<DataScopeLevel>,
}

impl UserDataScope {
    /// A user with no entitlements (every rule resolves to `none`).
    pub fn new(tenant_id: TenantId, user_id: UserId) -> Self {
        Self {
            tenant_id,
            user_id,
            department_id: None,
            team_id: None,
            managed_departments: BTreeSet::new(),
            managed_teams: BTreeSet::new(),
            direct_reports: BTreeSet::new(),
            scopes: BTreeSet::new(),
        }
    }

    pub fn with_scopes(mut self, scopes: impl IntoIterator<Item = DataScopeLevel>) -> Self {
        self.scopes.extend(scopes);
        self
    }

    pub fn in_department(mut self, department_id: DepartmentId) -> Self {
        self.department_id = Some(department_id);
        self
    }

    pub fn in_team(mut self, team_id: TeamId) -> Self {
        self.team_id = Some(team_id);
        self
    }

    fn departments(&self) -> Vec<Value> {
        self.department_id
            .iter()
            .chain(self.managed_departments.iter())
            .map(|d| d.to_string())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .map(Value::String)
            .collect()
    }

    fn teams(&self) -> Vec<Value> {
        self.team_id
            .iter()
            .chain(self.managed_teams.iter())
            .map(|t| t.to_string())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .map(Value::String)
            .collect()
    }

    fn reports(&self) -> Vec<Value> {
        self.direct_reports
            .iter()
            .map(|u| Value::String(u.to_string()))
            .collect()
    }
}

impl Entity for UserDataScope {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.user_id
    }
}

/// Record field names the scope checks read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFieldMap {
    pub tenant: String,
    pub department: String,
    pub team: String,
    /// Owner/creator/user fields; any of them identifies the record's owner.
    pub owner: Vec<String>,
}

impl Default for ScopeFieldMap {
    fn default() -> Self {
        Self {
            tenant: "tenant_id".to_string(),
            department: "department_id".to_string(),
            team: "team_id".to_string(),
            owner: vec![
                "user_id".to_string(),
                "created_by".to_string(),
                "owner_id".to_string(),
            ],
        }
    }
}

fn field_is(record: &Record, field: &str, expected: &str) -> bool {
    record.get(field).and_then(Value::as_str) == Some(expected)
}

fn field_in(record: &Record, field: &str, candidates: &[Value]) -> bool {
    record.get(field).is_some_and(|v| candidates.contains(v))
}

/// Resolves data scopes against a fixed, priority-ordered rule set.
pub struct DataScopeResolver {
    rules: Vec<DataScopeRule>,
    fields: ScopeFieldMap,
    audit: Arc<dyn AuditSink>,
    audit_denials: bool,
}

impl core::fmt::Debug for DataScopeResolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DataScopeResolver")
            .field("rules", &self.rules.len())
            .field("fields", &self.fields)
            .finish()
    }
}

impl DataScopeResolver {
    /// Validate and index the rules: priority descending, exact actions ahead
    /// of `*` on equal priority, declaration order after that.
    pub fn new(mut rules: Vec<DataScopeRule>) -> DomainResult<Self> {
        for rule in &rules {
            rule.validate()?;
        }
        rules.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| (a.action == ANY_ACTION).cmp(&(b.action == ANY_ACTION)))
        });

        Ok(Self {
            rules,
            fields: ScopeFieldMap::default(),
            audit: Arc::new(NoopAuditSink),
            audit_denials: true,
        })
    }

    /// Parse a JSON array of rules.
    pub fn from_json(json: &str) -> DomainResult<Self> {
        let rules: Vec<DataScopeRule> = serde_json::from_str(json)
            .map_err(|e| DomainError::validation(format!("malformed scope rules: {e}")))?;
        Self::new(rules)
    }

    pub fn with_fields(mut self, fields: ScopeFieldMap) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>, audit_denials: bool) -> Self {
        self.audit = audit;
        self.audit_denials = audit_denials;
        self
    }

    pub fn rules(&self) -> &[DataScopeRule] {
        &self.rules
    }

    fn rule_for(&self, resource: &str, action: &str) -> Option<&DataScopeRule> {
        self.rules.iter().find(|r| r.applies_to(resource, action))
    }

    /// Scopes of the highest-priority matching rule, intersected with the
    /// user's entitlements. Lower-priority rules are not merged in. No rule
    /// or an empty intersection yields `[None]`.
    pub fn allowed_scopes(&self, resource: &str, action: &str, user: &UserDataScope) -> Vec<DataScopeLevel> {
        let Some(rule) = self.rule_for(resource, action) else {
            debug!(resource, action, "no scope rule; resolving to none");
            return vec![DataScopeLevel::None];
        };

        let mut allowed = Vec::new();
        for scope in &rule.scopes {
            if *scope != DataScopeLevel::None && user.scopes.contains(scope) && !allowed.contains(scope) {
                allowed.push(*scope);
            }
        }

        if allowed.is_empty() {
            vec![DataScopeLevel::None]
        } else {
            allowed
        }
    }

    fn scope_matches(&self, scope: DataScopeLevel, user: &UserDataScope, record: &Record) -> bool {
        match scope {
            DataScopeLevel::Global => true,
            DataScopeLevel::Tenant => field_is(record, &self.fields.tenant, &user.tenant_id.to_string()),
            DataScopeLevel::Department => field_in(record, &self.fields.department, &user.departments()),
            DataScopeLevel::Team => field_in(record, &self.fields.team, &user.teams()),
            DataScopeLevel::Own => {
                let me = user.user_id.to_string();
                let reports = user.reports();
                self.fields
                    .owner
                    .iter()
                    .any(|f| field_is(record, f, &me) || field_in(record, f, &reports))
            }
            DataScopeLevel::None => false,
        }
    }

    fn conditions_hold(rule: Option<&DataScopeRule>, record: &Record) -> bool {
        rule.map_or(true, |r| {
            r.conditions
                .iter()
                .all(|(field, expected)| record.get(field) == Some(expected))
        })
    }

    fn evaluate(&self, scopes: &[DataScopeLevel], rule: Option<&DataScopeRule>, user: &UserDataScope, record: &Record) -> bool {
        Self::conditions_hold(rule, record) && scopes.iter().any(|s| self.scope_matches(*s, user, record))
    }

    /// Whether `user` may reach `record` for `(resource, action)`.
    /// Short-circuits on the first satisfied scope.
    pub fn can_access(&self, resource: &str, action: &str, user: &UserDataScope, record: &Record) -> bool {
        let scopes = self.allowed_scopes(resource, action, user);
        let allowed = self.evaluate(&scopes, self.rule_for(resource, action), user, record);

        if !allowed && self.audit_denials {
            emit_quietly(
                self.audit.as_ref(),
                AuditEvent::ScopeDenied(ScopeDenied {
                    tenant_id: user.tenant_id,
                    user_id: user.user_id,
                    resource: resource.to_string(),
                    action: action.to_string(),
                    allowed_scopes: scopes,
                    occurred_at: Utc::now(),
                }),
            );
        }
        allowed
    }

    /// Compile the allowed scopes into a storage-agnostic filter.
    ///
    /// Branches are OR-ed; rule conditions are AND-ed on top. `[None]` compiles
    /// to an always-false filter, never to an absent one.
    pub fn compile_filter(&self, resource: &str, action: &str, user: &UserDataScope) -> DataFilter {
        let scopes = self.allowed_scopes(resource, action, user);
        let rule = self.rule_for(resource, action);

        let branches: Vec<Condition> = scopes.iter().map(|s| self.branch(*s, user)).collect();
        let mut clauses = vec![Condition::any(branches)];
        if let Some(rule) = rule {
            clauses.extend(
                rule.conditions
                    .iter()
                    .map(|(field, value)| Condition::eq(field.clone(), value.clone())),
            );
        }

        let filter = DataFilter::compile(scopes, Condition::all(clauses));
        debug!(resource, action, user_id = %user.user_id, conditions = ?filter.conditions, "compiled scope filter");
        filter
    }

    fn branch(&self, scope: DataScopeLevel, user: &UserDataScope) -> Condition {
        match scope {
            DataScopeLevel::Global => Condition::Always,
            DataScopeLevel::Tenant => Condition::eq(self.fields.tenant.clone(), user.tenant_id.to_string()),
            DataScopeLevel::Department => Condition::one_of(self.fields.department.clone(), user.departments()),
            DataScopeLevel::Team => Condition::one_of(self.fields.team.clone(), user.teams()),
            DataScopeLevel::Own => {
                let me = user.user_id.to_string();
                let reports = user.reports();
                Condition::any(
                    self.fields
                        .owner
                        .iter()
                        .flat_map(|f| {
                            [
                                Condition::eq(f.clone(), me.clone()),
                                Condition::one_of(f.clone(), reports.clone()),
                            ]
                        })
                        .collect(),
                )
            }
            DataScopeLevel::None => Condition::Never,
        }
    }

    /// In-memory filtering of an already-fetched, small result set.
    ///
    /// Large sets must be filtered in storage with `compile_filter`.
    pub fn apply_scoping(
        &self,
        records: Vec<Record>,
        resource: &str,
        action: &str,
        user: &UserDataScope,
    ) -> Vec<Record> {
        let scopes = self.allowed_scopes(resource, action, user);
        if scopes == [DataScopeLevel::None] {
            return Vec::new();
        }
        let rule = self.rule_for(resource, action);
        records
            .into_iter()
            .filter(|r| self.evaluate(&scopes, rule, user, r))
            .collect()
    }
}
