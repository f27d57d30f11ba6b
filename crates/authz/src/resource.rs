use serde::{Deserialize, Serialize};

/// Kind of a permission-checkable unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Menu,
    Api,
    Report,
    Widget,
    Data,
}

/// A permission-checkable unit inside a module (menu item, API route, report, ...).
///
/// `code` is unique within `module_code`. A `None` parent marks a root.
/// Non-leaf resources drive navigation; enforcement targets leaves unless a
/// caller explicitly checks a section (see `PermissionResolver::check_hierarchical`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub code: String,
    pub module_code: String,
    #[serde(default)]
    pub parent_code: Option<String>,
    pub resource_type: ResourceType,
    pub is_leaf: bool,
    pub display_order: i32,
    #[serde(default)]
    pub name: String,
}

impl Resource {
    pub fn is_root(&self) -> bool {
        self.parent_code.is_none()
    }
}

/// A resource placed in its module tree.
///
/// `level` starts at 1 for roots. `path` is the chain of `display_order`
/// values from the root down to this node, so sorting nodes by `path` yields
/// a pre-order walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceNode {
    #[serde(flatten)]
    pub resource: Resource,
    pub level: usize,
    pub path: Vec<i32>,
}
