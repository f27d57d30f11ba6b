//! Declarative row filters compiled from data scopes.
//!
//! A `DataFilter` is storage-agnostic: adapters translate `predicate` (or the
//! rendered `conditions`) into their own query language. `matches` evaluates
//! the same predicate in memory. Comparisons are exact JSON equality, the
//! same as the rendered `field = 'literal'` form, so both agree row for row.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::{DataScopeLevel, Record};

/// Boolean predicate over a flat record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Always,
    Never,
    Eq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Any { of: Vec<Condition> },
    All { of: Vec<Condition> },
}

impl Condition {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `IN` over `values`; an empty set can match nothing.
    pub fn one_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        if values.is_empty() {
            return Condition::Never;
        }
        Condition::In {
            field: field.into(),
            values,
        }
    }

    /// OR with constant folding.
    pub fn any(of: Vec<Condition>) -> Self {
        let mut kept = Vec::with_capacity(of.len());
        for c in of {
            match c {
                Condition::Always => return Condition::Always,
                Condition::Never => {}
                Condition::Any { of } => kept.extend(of),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Condition::Never,
            1 => kept.remove(0),
            _ => Condition::Any { of: kept },
        }
    }

    /// AND with constant folding.
    pub fn all(of: Vec<Condition>) -> Self {
        let mut kept = Vec::with_capacity(of.len());
        for c in of {
            match c {
                Condition::Never => return Condition::Never,
                Condition::Always => {}
                Condition::All { of } => kept.extend(of),
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Condition::Always,
            1 => kept.remove(0),
            _ => Condition::All { of: kept },
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Condition::Always => true,
            Condition::Never => false,
            Condition::Eq { field, value } => record.get(field).is_some_and(|v| v == value),
            Condition::In { field, values } => record.get(field).is_some_and(|v| values.contains(v)),
            Condition::Any { of } => of.iter().any(|c| c.matches(record)),
            Condition::All { of } => of.iter().all(|c| c.matches(record)),
        }
    }

    /// SQL-flavoured rendering for logs and simple adapters.
    pub fn render(&self) -> String {
        match self {
            Condition::Always => "1 = 1".to_string(),
            Condition::Never => "1 = 0".to_string(),
            Condition::Eq { field, value: Value::Null } => format!("{field} IS NULL"),
            Condition::Eq { field, value } => format!("{field} = {}", render_literal(value)),
            Condition::In { field, values } => {
                let list: Vec<String> = values.iter().map(render_literal).collect();
                format!("{field} IN ({})", list.join(", "))
            }
            Condition::Any { of } => {
                let parts: Vec<String> = of.iter().map(Condition::render).collect();
                format!("({})", parts.join(" OR "))
            }
            Condition::All { of } => {
                let parts: Vec<String> = of.iter().map(Condition::render).collect();
                format!("({})", parts.join(" AND "))
            }
        }
    }
}

fn render_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

/// Compiled scope filter for one `(resource, action, user)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataFilter {
    /// Scopes the filter was compiled from.
    pub scopes: Vec<DataScopeLevel>,
    /// Field constraints that must all hold: a scalar means equality, an
    /// array means `IN`. OR-ed scope branches only appear in `predicate`.
    pub filters: BTreeMap<String, Value>,
    /// Rendered predicates, AND-ed. `["1 = 0"]` when nothing may match.
    pub conditions: Vec<String>,
    /// Full predicate.
    pub predicate: Condition,
    /// True when the filter matches zero rows by construction.
    pub deny_all: bool,
}

impl DataFilter {
    pub fn compile(scopes: Vec<DataScopeLevel>, predicate: Condition) -> Self {
        let members: Vec<&Condition> = match &predicate {
            Condition::Always => Vec::new(),
            Condition::All { of } => of.iter().collect(),
            other => vec![other],
        };

        let mut filters = BTreeMap::new();
        for member in &members {
            match member {
                Condition::Eq { field, value } => {
                    filters.insert(field.clone(), value.clone());
                }
                Condition::In { field, values } => {
                    filters.insert(field.clone(), Value::Array(values.clone()));
                }
                _ => {}
            }
        }

        let deny_all = predicate == Condition::Never;
        let conditions = members.iter().map(|c| c.render()).collect();

        Self {
            scopes,
            filters,
            conditions,
            predicate,
            deny_all,
        }
    }

    /// A filter that matches nothing.
    pub fn deny_all() -> Self {
        Self::compile(vec![DataScopeLevel::None], Condition::Never)
    }

    /// True for global access (no row restriction).
    pub fn is_unrestricted(&self) -> bool {
        self.predicate == Condition::Always
    }

    pub fn is_empty_set(&self) -> bool {
        self.deny_all
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.predicate.matches(record)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn folding_removes_constants() {
        assert_eq!(Condition::any(vec![Condition::Never, Condition::Always]), Condition::Always);
        assert_eq!(Condition::any(vec![Condition::Never]), Condition::Never);
        assert_eq!(Condition::all(vec![Condition::Always, Condition::Never]), Condition::Never);
        assert_eq!(Condition::all(vec![]), Condition::Always);
        assert_eq!(
            Condition::any(vec![Condition::Never, Condition::eq("a", 1)]),
            Condition::eq("a", 1)
        );
    }

    #[test]
    fn empty_in_matches_nothing() {
        assert_eq!(Condition::one_of("team_id", vec![]), Condition::Never);
    }

    #[test]
    fn deny_all_renders_false_and_matches_nothing() {
        let filter = DataFilter::deny_all();
        assert!(filter.is_empty_set());
        assert_eq!(filter.conditions, vec!["1 = 0".to_string()]);
        assert!(!filter.matches(&record(json!({}))));
        assert!(!filter.matches(&record(json!({"tenant_id": "x"}))));
    }

    #[test]
    fn renders_sql_like_predicates() {
        let c = Condition::any(vec![
            Condition::eq("owner_id", "o'brien"),
            Condition::one_of("team_id", vec![json!("t1"), json!("t2")]),
        ]);
        assert_eq!(c.render(), "(owner_id = 'o''brien' OR team_id IN ('t1', 't2'))");
        assert_eq!(Condition::eq("deleted_at", Value::Null).render(), "deleted_at IS NULL");
    }

    #[test]
    fn compile_collects_top_level_constraints() {
        let filter = DataFilter::compile(
            vec![DataScopeLevel::Tenant],
            Condition::all(vec![Condition::eq("tenant_id", "t"), Condition::eq("status", "open")]),
        );
        assert_eq!(filter.filters.get("tenant_id"), Some(&json!("t")));
        assert_eq!(filter.filters.get("status"), Some(&json!("open")));
        assert_eq!(filter.conditions.len(), 2);
        assert!(filter.matches(&record(json!({"tenant_id": "t", "status": "open"}))));
        assert!(!filter.matches(&record(json!({"tenant_id": "t", "status": "closed"}))));
    }

    #[test]
    fn matching_is_exact_like_rendered_equality() {
        let id = warden_core::UserId::new().to_string();
        let filter = DataFilter::compile(vec![DataScopeLevel::Own], Condition::eq("owner_id", id.clone()));

        assert_eq!(filter.conditions, vec![format!("owner_id = '{id}'")]);
        assert!(filter.matches(&record(json!({"owner_id": id.clone()}))));
        assert!(!filter.matches(&record(json!({"owner_id": id.to_uppercase()}))));
        assert!(!Condition::one_of("team_id", vec![json!(id.clone())])
            .matches(&record(json!({"team_id": id.to_uppercase()}))));
    }
}
