//! Environment configuration.
//!
//! Every key is optional. A malformed value is a `Validation` error, never a
//! silent fallback to something more permissive.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use warden_authz::ResolverOptions;
use warden_core::{DomainError, DomainResult};
use warden_observability::{LogConfig, LogFormat};

pub const LOG_FORMAT: &str = "WARDEN_LOG_FORMAT";
pub const INHERIT_FROM_PARENT: &str = "WARDEN_INHERIT_FROM_PARENT";
pub const AUDIT_DENIALS: &str = "WARDEN_AUDIT_DENIALS";
pub const DEFAULT_CURRENCY_SYMBOL: &str = "WARDEN_DEFAULT_CURRENCY_SYMBOL";
pub const SCOPE_RULES: &str = "WARDEN_SCOPE_RULES";
pub const FIELD_RULES: &str = "WARDEN_FIELD_RULES";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthzConfig {
    pub log_format: LogFormat,
    /// Let `check_inherited` walk catalog ancestors.
    pub inherit_from_parent: bool,
    /// Publish denials to the audit bus.
    pub audit_denials: bool,
    /// Prefix for bare numbers under the `currency` masking strategy.
    pub currency_symbol: String,
    /// JSON file with scope rules; built-in rules when unset.
    pub scope_rules_path: Option<PathBuf>,
    /// JSON file with field rules; built-in rules when unset.
    pub field_rules_path: Option<PathBuf>,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            inherit_from_parent: true,
            audit_denials: true,
            currency_symbol: "$".to_string(),
            scope_rules_path: None,
            field_rules_path: None,
        }
    }
}

fn parse_bool(key: &str, raw: &str) -> DomainResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(DomainError::validation(format!("{key}: expected a boolean, got '{other}'"))),
    }
}

impl AuthzConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> DomainResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup (environment, test map).
    pub fn from_lookup<F>(lookup: F) -> DomainResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(format) = lookup(LOG_FORMAT) {
            config.log_format = format.parse()?;
        }
        if let Some(raw) = lookup(INHERIT_FROM_PARENT) {
            config.inherit_from_parent = parse_bool(INHERIT_FROM_PARENT, &raw)?;
        }
        if let Some(raw) = lookup(AUDIT_DENIALS) {
            config.audit_denials = parse_bool(AUDIT_DENIALS, &raw)?;
        }
        if let Some(symbol) = lookup(DEFAULT_CURRENCY_SYMBOL) {
            let symbol = symbol.trim();
            if symbol.is_empty() || symbol.chars().any(|c| c.is_ascii_digit()) {
                return Err(DomainError::validation(format!(
                    "{DEFAULT_CURRENCY_SYMBOL}: '{symbol}' is not a currency symbol"
                )));
            }
            config.currency_symbol = symbol.to_string();
        }
        config.scope_rules_path = lookup(SCOPE_RULES).filter(|p| !p.trim().is_empty()).map(PathBuf::from);
        config.field_rules_path = lookup(FIELD_RULES).filter(|p| !p.trim().is_empty()).map(PathBuf::from);

        debug!(?config, "authorization config loaded");
        Ok(config)
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig::default().with_format(self.log_format)
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            inherit_from_parent: self.inherit_from_parent,
            audit_denials: self.audit_denials,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = AuthzConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AuthzConfig::default());
        assert!(config.resolver_options().inherit_from_parent);
    }

    #[test]
    fn values_are_parsed() {
        let config = AuthzConfig::from_lookup(lookup(&[
            (LOG_FORMAT, "pretty"),
            (INHERIT_FROM_PARENT, "false"),
            (AUDIT_DENIALS, "0"),
            (DEFAULT_CURRENCY_SYMBOL, "€"),
            (SCOPE_RULES, "/etc/warden/scopes.json"),
        ]))
        .unwrap();

        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(!config.inherit_from_parent);
        assert!(!config.audit_denials);
        assert_eq!(config.currency_symbol, "€");
        assert_eq!(config.scope_rules_path, Some(PathBuf::from("/etc/warden/scopes.json")));
        assert_eq!(config.field_rules_path, None);
    }

    #[test]
    fn malformed_values_are_rejected() {
        for pairs in [
            [(INHERIT_FROM_PARENT, "sometimes")],
            [(AUDIT_DENIALS, "")],
            [(LOG_FORMAT, "xml")],
            [(DEFAULT_CURRENCY_SYMBOL, "4")],
        ] {
            assert!(matches!(
                AuthzConfig::from_lookup(lookup(&pairs)),
                Err(DomainError::Validation(_))
            ));
        }
    }
}
