//! Field-level access and masking.
//!
//! Field rules are an additive redaction layer over resource access that has
//! already been granted: a field with no rule is fully visible. Resource
//! permissions stay default-deny.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use warden_core::{DomainError, DomainResult};

use crate::masking::{self, MaskingStrategy, REDACTED};
use crate::scope::{DataScopeLevel, DataScopeResolver, UserDataScope};
use crate::Record;

/// Action used when a field rule's scope requirement is checked.
pub const FIELD_READ_ACTION: &str = "read";

/// Ordered from most to least visible.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldAccessLevel {
    Full,
    Read,
    Masked,
    Partial,
    Hidden,
    Denied,
}

impl FieldAccessLevel {
    /// Hidden and denied fields are dropped from output entirely.
    pub fn is_visible(self) -> bool {
        !matches!(self, FieldAccessLevel::Hidden | FieldAccessLevel::Denied)
    }

    pub fn is_masked(self) -> bool {
        matches!(self, FieldAccessLevel::Masked | FieldAccessLevel::Partial)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCategory {
    #[default]
    General,
    Personal,
    Sensitive,
    Financial,
    Confidential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    #[serde(default)]
    pub id: String,
    pub resource: String,
    pub field: String,
    /// Any one suffices; empty means no requirement.
    #[serde(default)]
    pub required_permissions: Vec<String>,
    #[serde(default)]
    pub required_roles: Option<Vec<String>>,
    #[serde(default)]
    pub required_scopes: Option<Vec<DataScopeLevel>>,
    pub access_level: FieldAccessLevel,
    #[serde(default)]
    pub masking_strategy: Option<MaskingStrategy>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub category: FieldCategory,
}

impl FieldRule {
    pub fn new(
        id: impl Into<String>,
        resource: impl Into<String>,
        field: impl Into<String>,
        access_level: FieldAccessLevel,
        priority: i32,
    ) -> Self {
        Self {
            id: id.into(),
            resource: resource.into(),
            field: field.into(),
            required_permissions: Vec::new(),
            required_roles: None,
            required_scopes: None,
            access_level,
            masking_strategy: None,
            priority,
            category: FieldCategory::General,
        }
    }

    pub fn requiring_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.required_permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    pub fn requiring_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.required_roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    pub fn requiring_scopes(mut self, scopes: impl IntoIterator<Item = DataScopeLevel>) -> Self {
        self.required_scopes = Some(scopes.into_iter().collect());
        self
    }

    pub fn masked_with(mut self, strategy: MaskingStrategy) -> Self {
        self.masking_strategy = Some(strategy);
        self
    }

    pub fn in_category(mut self, category: FieldCategory) -> Self {
        self.category = category;
        self
    }

    fn validate(&self) -> DomainResult<()> {
        if self.resource.trim().is_empty() {
            return Err(DomainError::validation(format!("field rule '{}' has an empty resource", self.id)));
        }
        if self.field.trim().is_empty() {
            return Err(DomainError::validation(format!("field rule '{}' has an empty field name", self.id)));
        }
        Ok(())
    }
}

/// Who is looking at the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldContext {
    pub permissions: BTreeSet<String>,
    pub roles: BTreeSet<String>,
    pub scope: UserDataScope,
}

impl FieldContext {
    pub fn new(scope: UserDataScope) -> Self {
        Self {
            permissions: BTreeSet::new(),
            roles: BTreeSet::new(),
            scope,
        }
    }

    pub fn with_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.permissions.extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn with_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }
}

/// Result of masking one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaskedField {
    /// `None` when the field must not appear in output at all.
    pub value: Option<Value>,
    pub display_value: Option<String>,
    pub access_level: FieldAccessLevel,
    pub is_original: bool,
    pub masking_applied: bool,
    pub reason: Option<String>,
}

/// Custom masking function registered by name.
pub type Masker = Arc<dyn Fn(&Value) -> String + Send + Sync>;

pub struct FieldAccessResolver {
    rules: Vec<FieldRule>,
    scopes: Arc<DataScopeResolver>,
    maskers: HashMap<String, Masker>,
    currency_symbol: String,
}

impl core::fmt::Debug for FieldAccessResolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FieldAccessResolver")
            .field("rules", &self.rules.len())
            .field("maskers", &self.maskers.keys().collect::<Vec<_>>())
            .field("currency_symbol", &self.currency_symbol)
            .finish()
    }
}

impl FieldAccessResolver {
    /// Rules are evaluated by priority descending, declaration order on ties.
    pub fn new(mut rules: Vec<FieldRule>, scopes: Arc<DataScopeResolver>) -> DomainResult<Self> {
        for rule in &rules {
            rule.validate()?;
        }
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));

        Ok(Self {
            rules,
            scopes,
            maskers: HashMap::new(),
            currency_symbol: "$".to_string(),
        })
    }

    pub fn from_json(json: &str, scopes: Arc<DataScopeResolver>) -> DomainResult<Self> {
        let rules: Vec<FieldRule> = serde_json::from_str(json)
            .map_err(|e| DomainError::validation(format!("malformed field rules: {e}")))?;
        Self::new(rules, scopes)
    }

    pub fn with_currency_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.currency_symbol = symbol.into();
        self
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    /// Register a masker for `MaskingStrategy::Custom(name)`. Replaces any
    /// previous masker of the same name.
    pub fn register_masker<F>(&mut self, name: impl Into<String>, masker: F)
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.maskers.insert(name.into(), Arc::new(masker));
    }

    fn rule_passes(&self, rule: &FieldRule, ctx: &FieldContext) -> bool {
        let permissions_ok =
            rule.required_permissions.is_empty() || rule.required_permissions.iter().any(|p| ctx.permissions.contains(p));

        let roles_ok = match &rule.required_roles {
            Some(roles) if !roles.is_empty() => roles.iter().any(|r| ctx.roles.contains(r)),
            _ => true,
        };

        let scopes_ok = match &rule.required_scopes {
            Some(required) if !required.is_empty() => {
                let allowed = self.scopes.allowed_scopes(&rule.resource, FIELD_READ_ACTION, &ctx.scope);
                required
                    .iter()
                    .any(|s| *s != DataScopeLevel::None && allowed.contains(s))
            }
            _ => true,
        };

        permissions_ok && roles_ok && scopes_ok
    }

    fn resolve(&self, resource: &str, field: &str, ctx: &FieldContext) -> (FieldAccessLevel, Option<&FieldRule>) {
        let mut candidates = self
            .rules
            .iter()
            .filter(|r| r.resource == resource && r.field == field)
            .peekable();

        if candidates.peek().is_none() {
            return (FieldAccessLevel::Full, None);
        }

        for rule in candidates {
            if self.rule_passes(rule, ctx) {
                debug!(resource, field, rule = %rule.id, level = ?rule.access_level, "field rule matched");
                return (rule.access_level, Some(rule));
            }
        }

        debug!(resource, field, "no field rule satisfied; denying");
        (FieldAccessLevel::Denied, None)
    }

    /// Access level of `field` on `resource` for the caller.
    ///
    /// A field with no rules at all is `Full`: field rules only ever narrow
    /// what resource access already allows. A field that has rules, none of
    /// which the caller satisfies, is `Denied`.
    pub fn field_access(&self, resource: &str, field: &str, ctx: &FieldContext) -> FieldAccessLevel {
        self.resolve(resource, field, ctx).0
    }

    pub fn mask_field(&self, resource: &str, field: &str, value: &Value, ctx: &FieldContext) -> MaskedField {
        let (level, rule) = self.resolve(resource, field, ctx);

        match level {
            FieldAccessLevel::Full | FieldAccessLevel::Read => MaskedField {
                value: Some(value.clone()),
                display_value: Some(masking::display(value)),
                access_level: level,
                is_original: true,
                masking_applied: false,
                reason: None,
            },
            FieldAccessLevel::Hidden | FieldAccessLevel::Denied => MaskedField {
                value: None,
                display_value: None,
                access_level: level,
                is_original: false,
                masking_applied: false,
                reason: Some(match level {
                    FieldAccessLevel::Hidden => format!("field '{field}' is hidden"),
                    _ => format!("access to field '{field}' is denied"),
                }),
            },
            FieldAccessLevel::Masked | FieldAccessLevel::Partial => {
                let strategy = rule
                    .and_then(|r| r.masking_strategy.clone())
                    .unwrap_or(if level == FieldAccessLevel::Partial {
                        MaskingStrategy::Partial
                    } else {
                        MaskingStrategy::Asterisk
                    });
                let masked = self.apply_strategy(&strategy, value);
                MaskedField {
                    value: Some(Value::String(masked.clone())),
                    display_value: Some(masked),
                    access_level: level,
                    is_original: false,
                    masking_applied: true,
                    reason: Some(format!("field '{field}' is masked")),
                }
            }
        }
    }

    fn apply_strategy(&self, strategy: &MaskingStrategy, value: &Value) -> String {
        let masked = match strategy {
            MaskingStrategy::Custom(name) => match self.maskers.get(name) {
                Some(masker) => masker(value),
                None => {
                    warn!(masker = %name, "custom masker not registered; redacting");
                    REDACTED.to_string()
                }
            },
            builtin => masking::apply(builtin, value, &self.currency_symbol).unwrap_or_else(masking::redacted),
        };

        // A masker must never hand back the raw value.
        let raw = masking::display(value);
        if masked != raw {
            masked
        } else if raw == REDACTED {
            masking::asterisk(&raw)
        } else {
            masking::redacted()
        }
    }

    /// Mask every key of a flat record. Hidden and denied keys are removed,
    /// not nulled.
    pub fn mask_object(&self, resource: &str, record: &Record, ctx: &FieldContext) -> Record {
        let mut out = Record::new();
        for (field, value) in record {
            if let Some(masked) = self.mask_field(resource, field, value, ctx).value {
                out.insert(field.clone(), masked);
            }
        }
        out
    }

    /// Fields a UI may render at all.
    pub fn visible_fields<F: AsRef<str>>(&self, resource: &str, fields: &[F], ctx: &FieldContext) -> Vec<String> {
        fields
            .iter()
            .filter(|f| self.field_access(resource, f.as_ref(), ctx).is_visible())
            .map(|f| f.as_ref().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use warden_core::{TenantId, UserId};

    use super::*;
    use crate::scope::DataScopeRule;

    fn scopes() -> Arc<DataScopeResolver> {
        Arc::new(
            DataScopeResolver::new(vec![DataScopeRule::new(
                "employees",
                "read",
                vec![DataScopeLevel::Department, DataScopeLevel::Own],
                0,
            )])
            .unwrap(),
        )
    }

    fn ctx() -> FieldContext {
        FieldContext::new(UserDataScope::new(TenantId::new(), UserId::new()))
    }

    fn ssn_resolver() -> FieldAccessResolver {
        FieldAccessResolver::new(
            vec![
                FieldRule::new("user_ssn_denied", "users", "ssn", FieldAccessLevel::Denied, 0),
                FieldRule::new("user_ssn_hr", "users", "ssn", FieldAccessLevel::Full, 100)
                    .requiring_permissions(["hr.pii.read"]),
            ],
            scopes(),
        )
        .unwrap()
    }

    #[test]
    fn ssn_is_denied_without_hr_permission() {
        let resolver = ssn_resolver();
        let user = ctx();

        assert_eq!(resolver.field_access("users", "ssn", &user), FieldAccessLevel::Denied);

        let row = json!({"name": "Ada", "ssn": "123-45-6789"}).as_object().cloned().unwrap();
        let masked = resolver.mask_object("users", &row, &user);
        assert!(!masked.contains_key("ssn"));
        assert_eq!(masked.get("name"), Some(&json!("Ada")));
    }

    #[test]
    fn ssn_is_visible_with_hr_permission() {
        let resolver = ssn_resolver();
        let hr = ctx().with_permissions(["hr.pii.read"]);

        let masked = resolver.mask_field("users", "ssn", &json!("123-45-6789"), &hr);
        assert_eq!(masked.access_level, FieldAccessLevel::Full);
        assert!(masked.is_original);
        assert_eq!(masked.value, Some(json!("123-45-6789")));
    }

    #[test]
    fn field_without_rules_is_full() {
        let resolver = ssn_resolver();
        assert_eq!(resolver.field_access("users", "email", &ctx()), FieldAccessLevel::Full);
        assert_eq!(resolver.field_access("orders", "ssn", &ctx()), FieldAccessLevel::Full);
    }

    #[test]
    fn unsatisfied_rules_deny() {
        let resolver = FieldAccessResolver::new(
            vec![FieldRule::new("salary_hr", "employees", "salary", FieldAccessLevel::Read, 0).requiring_roles(["HR"])],
            scopes(),
        )
        .unwrap();

        assert_eq!(resolver.field_access("employees", "salary", &ctx()), FieldAccessLevel::Denied);
        assert_eq!(
            resolver.field_access("employees", "salary", &ctx().with_roles(["HR"])),
            FieldAccessLevel::Read
        );
    }

    #[test]
    fn scope_requirement_uses_allowed_scopes() {
        let resolver = FieldAccessResolver::new(
            vec![
                FieldRule::new("salary_dept", "employees", "salary", FieldAccessLevel::Full, 10)
                    .requiring_scopes([DataScopeLevel::Department]),
                FieldRule::new("salary_masked", "employees", "salary", FieldAccessLevel::Masked, 0)
                    .masked_with(MaskingStrategy::Currency),
            ],
            scopes(),
        )
        .unwrap();

        let manager = {
            let mut c = ctx();
            c.scope = c.scope.clone().with_scopes([DataScopeLevel::Department]);
            c
        };
        assert_eq!(resolver.field_access("employees", "salary", &manager), FieldAccessLevel::Full);

        let staff = ctx();
        let masked = resolver.mask_field("employees", "salary", &json!(85000), &staff);
        assert_eq!(masked.access_level, FieldAccessLevel::Masked);
        assert_eq!(masked.display_value.as_deref(), Some("$*****"));
        assert!(masked.masking_applied);
    }

    #[test]
    fn partial_level_defaults_to_partial_strategy() {
        let resolver = FieldAccessResolver::new(
            vec![FieldRule::new("phone", "contacts", "phone", FieldAccessLevel::Partial, 0)],
            scopes(),
        )
        .unwrap();

        let masked = resolver.mask_field("contacts", "phone", &json!("5551234567"), &ctx());
        assert_eq!(masked.value, Some(json!("55******67")));
    }

    #[test]
    fn custom_masker_is_used_and_missing_one_redacts() {
        let mut resolver = FieldAccessResolver::new(
            vec![
                FieldRule::new("iban", "accounts", "iban", FieldAccessLevel::Masked, 0)
                    .masked_with(MaskingStrategy::Custom("iban".into())),
                FieldRule::new("bic", "accounts", "bic", FieldAccessLevel::Masked, 0)
                    .masked_with(MaskingStrategy::Custom("unknown".into())),
            ],
            scopes(),
        )
        .unwrap();
        resolver.register_masker("iban", |v: &Value| {
            let s = masking::display(v);
            format!("****{}", &s[s.len().saturating_sub(4)..])
        });

        let user = ctx();
        assert_eq!(
            resolver.mask_field("accounts", "iban", &json!("DE89370400440532013000"), &user).value,
            Some(json!("****3000"))
        );
        assert_eq!(
            resolver.mask_field("accounts", "bic", &json!("COBADEFFXXX"), &user).value,
            Some(json!(REDACTED))
        );
    }

    #[test]
    fn hidden_fields_are_not_visible() {
        let resolver = FieldAccessResolver::new(
            vec![FieldRule::new("notes", "orders", "internal_notes", FieldAccessLevel::Hidden, 0)],
            scopes(),
        )
        .unwrap();

        let user = ctx();
        assert_eq!(
            resolver.visible_fields("orders", &["id", "internal_notes", "total"], &user),
            vec!["id".to_string(), "total".to_string()]
        );
        let hidden = resolver.mask_field("orders", "internal_notes", &json!("vip"), &user);
        assert_eq!(hidden.value, None);
        assert!(hidden.reason.is_some());
    }

    #[test]
    fn rules_load_from_json() {
        let resolver = FieldAccessResolver::from_json(
            r#"[{"id": "email_domain", "resource": "users", "field": "email",
                 "access_level": "masked", "masking_strategy": "domain", "category": "personal"}]"#,
            scopes(),
        )
        .unwrap();

        let masked = resolver.mask_field("users", "email", &json!("ada@example.com"), &ctx());
        assert_eq!(masked.value, Some(json!("***@example.com")));
        assert!(matches!(
            FieldAccessResolver::from_json(r#"[{"resource": "users", "field": "", "access_level": "full"}]"#, scopes()),
            Err(DomainError::Validation(_))
        ));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            any::<f64>().prop_filter("finite", |f| f.is_finite()).prop_map(Value::from),
            ".{0,24}".prop_map(Value::from),
            Just(Value::from(REDACTED)),
        ]
    }

    fn arb_strategy() -> impl Strategy<Value = MaskingStrategy> {
        prop_oneof![
            Just(MaskingStrategy::Asterisk),
            Just(MaskingStrategy::Dots),
            Just(MaskingStrategy::Redacted),
            Just(MaskingStrategy::Partial),
            Just(MaskingStrategy::Initials),
            Just(MaskingStrategy::Domain),
            Just(MaskingStrategy::Currency),
            Just(MaskingStrategy::Custom("identity".into())),
            Just(MaskingStrategy::Custom("missing".into())),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: a masked, partial, hidden or denied field never yields its raw value.
        #[test]
        fn masking_never_leaks_raw_value(
            value in arb_value(),
            strategy in arb_strategy(),
            level in prop_oneof![
                Just(FieldAccessLevel::Masked),
                Just(FieldAccessLevel::Partial),
                Just(FieldAccessLevel::Hidden),
                Just(FieldAccessLevel::Denied),
            ],
        ) {
            let mut resolver = FieldAccessResolver::new(
                vec![FieldRule::new("r", "things", "secret", level, 0).masked_with(strategy)],
                scopes(),
            ).unwrap();
            // A hostile masker that returns its input unchanged.
            resolver.register_masker("identity", masking::display);

            let masked = resolver.mask_field("things", "secret", &value, &ctx());
            prop_assert_ne!(masked.value.as_ref(), Some(&value));
            prop_assert_ne!(masked.display_value, Some(masking::display(&value)));

            let mut row = Record::new();
            row.insert("secret".to_string(), value.clone());
            let out = resolver.mask_object("things", &row, &ctx());
            prop_assert_eq!(out.contains_key("secret"), level.is_masked());
        }
    }
}
