use core::str::FromStr;

use serde::{Deserialize, Serialize};

use warden_core::DomainError;

/// Permission level a role grants on a resource.
///
/// Totally ordered: `NoAccess < ViewOnly < Manage`. Holding a level implies
/// every lower level, so `Manage` satisfies a `ViewOnly` requirement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    #[default]
    NoAccess,
    ViewOnly,
    Manage,
}

impl PermissionLevel {
    /// Numeric precedence (`manage` = 3 > `view_only` = 2 > `no_access` = 1).
    pub fn rank(self) -> u8 {
        match self {
            PermissionLevel::NoAccess => 1,
            PermissionLevel::ViewOnly => 2,
            PermissionLevel::Manage => 3,
        }
    }

    /// Whether a resolved level satisfies `required`.
    pub fn satisfies(self, required: PermissionLevel) -> bool {
        self >= required
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PermissionLevel::NoAccess => "no_access",
            PermissionLevel::ViewOnly => "view_only",
            PermissionLevel::Manage => "manage",
        }
    }
}

impl core::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the wire names. Unknown strings are rejected rather than mapped to
/// some default level.
impl FromStr for PermissionLevel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "no_access" => Ok(PermissionLevel::NoAccess),
            "view_only" => Ok(PermissionLevel::ViewOnly),
            "manage" => Ok(PermissionLevel::Manage),
            other => Err(DomainError::validation(format!(
                "unknown permission level '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manage_implies_view_only_implies_no_access() {
        assert!(PermissionLevel::Manage.satisfies(PermissionLevel::ViewOnly));
        assert!(PermissionLevel::Manage.satisfies(PermissionLevel::NoAccess));
        assert!(PermissionLevel::ViewOnly.satisfies(PermissionLevel::NoAccess));
        assert!(!PermissionLevel::ViewOnly.satisfies(PermissionLevel::Manage));
        assert!(!PermissionLevel::NoAccess.satisfies(PermissionLevel::ViewOnly));
    }

    #[test]
    fn ordering_matches_rank() {
        let mut levels = vec![
            PermissionLevel::Manage,
            PermissionLevel::NoAccess,
            PermissionLevel::ViewOnly,
        ];
        levels.sort();
        let ranks: Vec<u8> = levels.iter().map(|l| l.rank()).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn literal_strings_parse_to_the_same_order() {
        let manage: PermissionLevel = "manage".parse().unwrap();
        let view: PermissionLevel = " View_Only ".parse().unwrap();
        assert!(manage.satisfies(view));
        assert_eq!("no_access".parse::<PermissionLevel>().unwrap(), PermissionLevel::NoAccess);
    }

    #[test]
    fn unknown_literal_is_rejected() {
        assert!(matches!(
            "admin".parse::<PermissionLevel>(),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&PermissionLevel::ViewOnly).unwrap();
        assert_eq!(json, "\"view_only\"");
    }
}
