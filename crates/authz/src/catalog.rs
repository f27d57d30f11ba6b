//! Resource catalog: per-module resource trees.
//!
//! Trees are stored as an arena (`Vec<Resource>`) with a code → index map and
//! a parent → children index. Walks are iterative, so a malformed catalog can
//! never recurse forever.

use std::collections::HashMap;

use tracing::debug;

use warden_core::{DomainError, DomainResult};

use crate::storage::AuthzStorage;
use crate::{Resource, ResourceNode};

/// Validated resource tree of a single module.
#[derive(Debug, Clone)]
pub struct ResourceTree {
    module_code: String,
    nodes: Vec<Resource>,
    index: HashMap<String, usize>,
    roots: Vec<usize>,
    children: Vec<Vec<usize>>,
}

impl ResourceTree {
    /// Build and validate a tree from the module's rows.
    ///
    /// Rejects rows from another module, duplicate codes, parents that do not
    /// exist, more than one root, siblings sharing a display order and cycles
    /// (nodes unreachable from the root).
    pub fn build(module_code: &str, resources: Vec<Resource>) -> DomainResult<Self> {
        let mut index = HashMap::with_capacity(resources.len());
        for (idx, r) in resources.iter().enumerate() {
            if r.module_code != module_code {
                return Err(DomainError::validation(format!(
                    "resource '{}' belongs to module '{}', not '{}'",
                    r.code, r.module_code, module_code
                )));
            }
            if index.insert(r.code.clone(), idx).is_some() {
                return Err(DomainError::validation(format!(
                    "duplicate resource code '{}' in module '{}'",
                    r.code, module_code
                )));
            }
        }

        let mut roots = Vec::new();
        let mut children = vec![Vec::new(); resources.len()];
        for (idx, r) in resources.iter().enumerate() {
            match &r.parent_code {
                None => roots.push(idx),
                Some(parent) => {
                    let Some(&parent_idx) = index.get(parent) else {
                        return Err(DomainError::validation(format!(
                            "resource '{}' references unknown parent '{}'",
                            r.code, parent
                        )));
                    };
                    children[parent_idx].push(idx);
                }
            }
        }

        if roots.len() > 1 {
            let codes: Vec<&str> = roots.iter().map(|&idx| resources[idx].code.as_str()).collect();
            return Err(DomainError::validation(format!(
                "module '{}' has {} root resources ({}); exactly one is allowed",
                module_code,
                roots.len(),
                codes.join(", ")
            )));
        }

        let order = |a: &usize, b: &usize| {
            let (ra, rb) = (&resources[*a], &resources[*b]);
            ra.display_order
                .cmp(&rb.display_order)
                .then_with(|| ra.code.cmp(&rb.code))
        };
        roots.sort_by(order);
        for list in &mut children {
            list.sort_by(order);
            // Paths are built from display orders; equal siblings would collide.
            if let Some(pair) = list
                .windows(2)
                .find(|w| resources[w[0]].display_order == resources[w[1]].display_order)
            {
                let (a, b) = (&resources[pair[0]], &resources[pair[1]]);
                return Err(DomainError::validation(format!(
                    "resources '{}' and '{}' share display order {} under '{}'",
                    a.code,
                    b.code,
                    a.display_order,
                    a.parent_code.as_deref().unwrap_or_default()
                )));
            }
        }

        let tree = Self {
            module_code: module_code.to_string(),
            nodes: resources,
            index,
            roots,
            children,
        };

        let reachable = tree.preorder_indices().len();
        if reachable != tree.nodes.len() {
            return Err(DomainError::validation(format!(
                "resource tree of module '{}' contains a cycle ({} of {} resources unreachable from a root)",
                module_code,
                tree.nodes.len() - reachable,
                tree.nodes.len()
            )));
        }

        Ok(tree)
    }

    pub fn module_code(&self) -> &str {
        &self.module_code
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&Resource> {
        self.index.get(code).map(|&idx| &self.nodes[idx])
    }

    pub fn contains(&self, code: &str) -> bool {
        self.index.contains_key(code)
    }

    /// Direct children in display order.
    pub fn children(&self, code: &str) -> Vec<&Resource> {
        self.index
            .get(code)
            .map(|&idx| self.children[idx].iter().map(|&c| &self.nodes[c]).collect())
            .unwrap_or_default()
    }

    /// Parent chain of `code`, nearest first. Empty for roots and unknown codes.
    pub fn ancestors(&self, code: &str) -> Vec<&Resource> {
        let mut out = Vec::new();
        let Some(mut current) = self.get(code) else {
            return out;
        };

        while let Some(parent_code) = &current.parent_code {
            let Some(parent) = self.get(parent_code) else {
                break;
            };
            // Validated trees are acyclic; the bound only guards hand-built ones.
            if out.len() >= self.nodes.len() {
                break;
            }
            out.push(parent);
            current = parent;
        }
        out
    }

    /// Resources in display order (pre-order), optionally leaves only.
    pub fn resources(&self, include_non_leaf: bool) -> Vec<Resource> {
        self.preorder_indices()
            .into_iter()
            .map(|(idx, _)| &self.nodes[idx])
            .filter(|r| include_non_leaf || r.is_leaf)
            .cloned()
            .collect()
    }

    /// Pre-order walk with computed `level` and `path`.
    pub fn hierarchy(&self) -> Vec<ResourceNode> {
        let mut paths: Vec<Vec<i32>> = vec![Vec::new(); self.nodes.len()];
        let mut out = Vec::with_capacity(self.nodes.len());

        for (idx, parent) in self.preorder_indices() {
            let mut path = match parent {
                Some(p) => paths[p].clone(),
                None => Vec::new(),
            };
            path.push(self.nodes[idx].display_order);
            paths[idx] = path.clone();

            out.push(ResourceNode {
                resource: self.nodes[idx].clone(),
                level: path.len(),
                path,
            });
        }
        out
    }

    /// `(node, parent)` pairs in pre-order, using an explicit stack.
    fn preorder_indices(&self) -> Vec<(usize, Option<usize>)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<(usize, Option<usize>)> =
            self.roots.iter().rev().map(|&r| (r, None)).collect();

        while let Some((idx, parent)) = stack.pop() {
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            out.push((idx, parent));
            for &child in self.children[idx].iter().rev() {
                stack.push((child, Some(idx)));
            }
        }
        out
    }
}

/// Read-only catalog service over the storage collaborator.
#[derive(Debug, Clone)]
pub struct ResourceCatalog<S> {
    storage: S,
}

impl<S> ResourceCatalog<S>
where
    S: AuthzStorage,
{
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Modules with a registered catalog.
    pub fn modules(&self) -> DomainResult<Vec<String>> {
        Ok(self.storage.modules()?)
    }

    /// Load and validate the tree of `module_code`.
    pub fn tree(&self, module_code: &str) -> DomainResult<ResourceTree> {
        let resources = self
            .storage
            .resources_by_module(module_code)?
            .ok_or_else(|| DomainError::not_found(format!("module '{module_code}'")))?;

        debug!(module = module_code, resources = resources.len(), "loaded resource catalog");
        ResourceTree::build(module_code, resources)
    }

    /// Resources of a module ordered by display order.
    pub fn list_resources(&self, module_code: &str, include_non_leaf: bool) -> DomainResult<Vec<Resource>> {
        Ok(self.tree(module_code)?.resources(include_non_leaf))
    }

    /// Module tree with `level`/`path`, in pre-order.
    pub fn hierarchy(&self, module_code: &str) -> DomainResult<Vec<ResourceNode>> {
        Ok(self.tree(module_code)?.hierarchy())
    }

    /// Parent chain of a resource, nearest first.
    pub fn ancestors(&self, module_code: &str, code: &str) -> DomainResult<Vec<Resource>> {
        let tree = self.tree(module_code)?;
        if !tree.contains(code) {
            return Err(DomainError::not_found(format!(
                "resource '{code}' in module '{module_code}'"
            )));
        }
        Ok(tree.ancestors(code).into_iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResourceType;
    use crate::storage::InMemoryAuthzStore;

    fn res(code: &str, parent: Option<&str>, order: i32, leaf: bool) -> Resource {
        Resource {
            code: code.to_string(),
            module_code: "wms".to_string(),
            parent_code: parent.map(str::to_string),
            resource_type: if leaf { ResourceType::Api } else { ResourceType::Menu },
            is_leaf: leaf,
            display_order: order,
            name: code.to_string(),
        }
    }

    fn wms() -> Vec<Resource> {
        vec![
            res("wms_inventory_tracking", Some("wms_inventory"), 1, true),
            res("wms_root", None, 1, false),
            res("wms_outbound", Some("wms_root"), 2, false),
            res("wms_inventory", Some("wms_root"), 1, false),
            res("wms_inventory_adjust", Some("wms_inventory"), 2, true),
            res("wms_outbound_pick", Some("wms_outbound"), 1, true),
        ]
    }

    #[test]
    fn hierarchy_is_preorder_with_levels_and_paths() {
        let tree = ResourceTree::build("wms", wms()).unwrap();
        let nodes = tree.hierarchy();

        let codes: Vec<&str> = nodes.iter().map(|n| n.resource.code.as_str()).collect();
        assert_eq!(
            codes,
            vec![
                "wms_root",
                "wms_inventory",
                "wms_inventory_tracking",
                "wms_inventory_adjust",
                "wms_outbound",
                "wms_outbound_pick",
            ]
        );
        assert_eq!(nodes[0].level, 1);
        assert_eq!(nodes[2].level, 3);
        assert_eq!(nodes[2].path, vec![1, 1, 1]);
        assert_eq!(nodes[5].path, vec![1, 2, 1]);
    }

    #[test]
    fn sorting_by_path_reproduces_preorder() {
        let tree = ResourceTree::build("wms", wms()).unwrap();
        let nodes = tree.hierarchy();
        let mut sorted = nodes.clone();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(sorted, nodes);
    }

    #[test]
    fn leaves_only_listing_skips_sections() {
        let tree = ResourceTree::build("wms", wms()).unwrap();
        let leaves = tree.resources(false);
        assert!(leaves.iter().all(|r| r.is_leaf));
        assert_eq!(leaves.len(), 3);
        assert_eq!(tree.resources(true).len(), 6);
    }

    #[test]
    fn ancestors_are_nearest_first() {
        let tree = ResourceTree::build("wms", wms()).unwrap();
        let chain: Vec<&str> = tree
            .ancestors("wms_inventory_tracking")
            .iter()
            .map(|r| r.code.as_str())
            .collect();
        assert_eq!(chain, vec!["wms_inventory", "wms_root"]);
        assert!(tree.ancestors("wms_root").is_empty());
    }

    #[test]
    fn cycle_is_rejected() {
        let rows = vec![
            res("root", None, 1, false),
            res("a", Some("b"), 1, false),
            res("b", Some("a"), 1, true),
        ];
        let err = ResourceTree::build("wms", rows).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("cycle")));
    }

    #[test]
    fn multiple_roots_are_rejected() {
        let rows = vec![res("wms_inventory", None, 1, false), res("wms_outbound", None, 2, false)];
        let err = ResourceTree::build("wms", rows).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("root")));
    }

    #[test]
    fn empty_catalog_builds() {
        let tree = ResourceTree::build("wms", Vec::new()).unwrap();
        assert!(tree.is_empty());
        assert!(tree.hierarchy().is_empty());
    }

    #[test]
    fn siblings_sharing_display_order_are_rejected() {
        let rows = vec![
            res("root", None, 1, false),
            res("a", Some("root"), 1, false),
            res("a1", Some("a"), 1, true),
            res("b", Some("root"), 1, true),
        ];
        let err = ResourceTree::build("wms", rows).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("display order")));

        // Same order under different parents is fine.
        let rows = vec![
            res("root", None, 1, false),
            res("a", Some("root"), 1, false),
            res("a1", Some("a"), 1, true),
            res("b", Some("root"), 2, true),
        ];
        assert!(ResourceTree::build("wms", rows).is_ok());
    }

    #[test]
    fn dangling_parent_is_rejected() {
        let rows = vec![res("orphan", Some("missing"), 1, true)];
        assert!(matches!(
            ResourceTree::build("wms", rows),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn duplicate_code_is_rejected() {
        let rows = vec![res("root", None, 1, false), res("root", None, 2, false)];
        assert!(matches!(
            ResourceTree::build("wms", rows),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn unknown_module_is_not_found() {
        let catalog = ResourceCatalog::new(InMemoryAuthzStore::new());
        assert!(matches!(
            catalog.list_resources("finance", true),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn catalog_lists_registered_module() {
        let store = InMemoryAuthzStore::new();
        store.register_module("wms", wms()).unwrap();
        let catalog = ResourceCatalog::new(store);

        assert_eq!(catalog.modules().unwrap(), vec!["wms".to_string()]);
        assert_eq!(catalog.hierarchy("wms").unwrap().len(), 6);
        assert_eq!(catalog.ancestors("wms", "wms_outbound_pick").unwrap().len(), 2);
    }
}
