//! Seed data: module catalogs, role templates and the built-in rule sets.
//!
//! Rule sets can be replaced by JSON files (see `AuthzConfig`).

use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::info;

use warden_authz::{
    DataScopeLevel, DataScopeRule, FieldAccessLevel, FieldCategory, FieldRule, InMemoryAuthzStore, MaskingStrategy,
    PermissionLevel, Resource, ResourceGrant, ResourceType, RoleTemplate, StorageError, ANY_ACTION,
};
use warden_core::TemplateId;

fn node(module: &str, code: &str, parent: Option<&str>, kind: ResourceType, order: i32, name: &str) -> Resource {
    Resource {
        code: code.to_string(),
        module_code: module.to_string(),
        parent_code: parent.map(str::to_string),
        resource_type: kind,
        is_leaf: !matches!(kind, ResourceType::Menu),
        display_order: order,
        name: name.to_string(),
    }
}

pub fn wms_catalog() -> Vec<Resource> {
    use ResourceType::*;
    vec![
        node("wms", "wms_root", None, Menu, 1, "Warehouse"),
        node("wms", "wms_inventory", Some("wms_root"), Menu, 1, "Inventory"),
        node("wms", "wms_inventory_tracking", Some("wms_inventory"), Data, 1, "Stock tracking"),
        node("wms", "wms_inventory_adjust", Some("wms_inventory"), Api, 2, "Stock adjustments"),
        node("wms", "wms_inventory_valuation", Some("wms_inventory"), Report, 3, "Valuation report"),
        node("wms", "wms_orders", Some("wms_root"), Menu, 2, "Orders"),
        node("wms", "wms_orders_picking", Some("wms_orders"), Data, 1, "Picking lists"),
        node("wms", "wms_orders_dashboard", Some("wms_orders"), Widget, 2, "Fulfilment dashboard"),
    ]
}

pub fn finance_catalog() -> Vec<Resource> {
    use ResourceType::*;
    vec![
        node("finance", "fin_root", None, Menu, 1, "Finance"),
        node("finance", "fin_ledger", Some("fin_root"), Menu, 1, "General ledger"),
        node("finance", "fin_journal_entries", Some("fin_ledger"), Data, 1, "Journal entries"),
        node("finance", "fin_trial_balance", Some("fin_ledger"), Report, 2, "Trial balance"),
        node("finance", "fin_invoices", Some("fin_root"), Menu, 2, "Invoices"),
        node("finance", "fin_invoices_list", Some("fin_invoices"), Data, 1, "Invoice list"),
        node("finance", "fin_invoices_issue", Some("fin_invoices"), Api, 2, "Issue invoice"),
    ]
}

pub fn hr_catalog() -> Vec<Resource> {
    use ResourceType::*;
    vec![
        node("hr", "hr_people", None, Menu, 1, "People"),
        node("hr", "hr_employees", Some("hr_people"), Data, 1, "Employees"),
        node("hr", "hr_payroll", Some("hr_people"), Data, 2, "Payroll"),
        node("hr", "hr_headcount", Some("hr_people"), Widget, 3, "Headcount"),
    ]
}

/// Every built-in module with its catalog.
pub fn module_catalogs() -> Vec<(&'static str, Vec<Resource>)> {
    vec![("finance", finance_catalog()), ("hr", hr_catalog()), ("wms", wms_catalog())]
}

fn template(id: &'static str, module: &str, name: &str, description: &str, grants: Vec<ResourceGrant>) -> RoleTemplate {
    RoleTemplate {
        id: TemplateId::new(id),
        module_code: module.to_string(),
        name: name.to_string(),
        description: Some(description.to_string()),
        default_permissions: grants,
    }
}

/// Viewer, operator and manager templates for each built-in module.
///
/// Viewers read every leaf, operators manage data leaves, managers manage
/// everything including section menus.
pub fn role_templates() -> Vec<RoleTemplate> {
    let mut templates = Vec::new();

    for (module, catalog) in module_catalogs() {
        let leaves: Vec<&Resource> = catalog.iter().filter(|r| r.is_leaf).collect();
        let title = match module {
            "wms" => "WMS",
            "finance" => "Finance",
            _ => "HR",
        };

        let viewer = leaves
            .iter()
            .map(|r| ResourceGrant::new(r.code.clone(), PermissionLevel::ViewOnly))
            .collect();
        let operator = leaves
            .iter()
            .map(|r| {
                let level = if r.resource_type == ResourceType::Data || r.resource_type == ResourceType::Api {
                    PermissionLevel::Manage
                } else {
                    PermissionLevel::ViewOnly
                };
                ResourceGrant::new(r.code.clone(), level)
            })
            .collect();
        let manager = catalog
            .iter()
            .map(|r| ResourceGrant::new(r.code.clone(), PermissionLevel::Manage))
            .collect();

        let (viewer_id, operator_id, manager_id) = match module {
            "wms" => ("wms_viewer", "wms_operator", "wms_manager"),
            "finance" => ("finance_viewer", "finance_operator", "finance_manager"),
            _ => ("hr_viewer", "hr_operator", "hr_manager"),
        };
        templates.push(template(viewer_id, module, &format!("{title} Viewer"), "Read-only access", viewer));
        templates.push(template(operator_id, module, &format!("{title} Operator"), "Day-to-day operations", operator));
        templates.push(template(manager_id, module, &format!("{title} Manager"), "Full module control", manager));
    }

    templates
}

pub fn scope_rules() -> Vec<DataScopeRule> {
    use DataScopeLevel::{Department, Global, Own, Team, Tenant};
    vec![
        DataScopeRule::new("wms_orders_picking", "read", vec![Tenant, Department, Team, Own], 10),
        DataScopeRule::new("wms_orders_picking", ANY_ACTION, vec![Team, Own], 0),
        DataScopeRule::new("fin_invoices_list", "read", vec![Tenant, Department, Own], 10),
        DataScopeRule::new("fin_invoices_list", "update", vec![Department, Own], 10).with_condition("status", "draft"),
        DataScopeRule::new("hr_employees", "read", vec![Global, Tenant, Department, Own], 10),
        DataScopeRule::new("hr_employees", ANY_ACTION, vec![Department, Own], 0),
        DataScopeRule::new("hr_payroll", ANY_ACTION, vec![Own], 0),
    ]
}

pub fn field_rules() -> Vec<FieldRule> {
    vec![
        FieldRule::new("employee_ssn_denied", "hr_employees", "ssn", FieldAccessLevel::Denied, 0)
            .in_category(FieldCategory::Sensitive),
        FieldRule::new("employee_ssn_hr", "hr_employees", "ssn", FieldAccessLevel::Full, 100)
            .requiring_permissions(["hr.pii.read"])
            .in_category(FieldCategory::Sensitive),
        FieldRule::new("employee_salary_masked", "hr_employees", "salary", FieldAccessLevel::Masked, 0)
            .masked_with(MaskingStrategy::Currency)
            .in_category(FieldCategory::Financial),
        FieldRule::new("employee_salary_manager", "hr_employees", "salary", FieldAccessLevel::Read, 50)
            .requiring_scopes([DataScopeLevel::Department])
            .in_category(FieldCategory::Financial),
        FieldRule::new("employee_email", "hr_employees", "email", FieldAccessLevel::Masked, 0)
            .masked_with(MaskingStrategy::Domain)
            .in_category(FieldCategory::Personal),
        FieldRule::new("employee_email_hr", "hr_employees", "email", FieldAccessLevel::Full, 10)
            .requiring_roles(["HR Manager"])
            .in_category(FieldCategory::Personal),
        FieldRule::new("employee_phone", "hr_employees", "phone", FieldAccessLevel::Partial, 0)
            .in_category(FieldCategory::Personal),
        FieldRule::new("employee_notes", "hr_employees", "internal_notes", FieldAccessLevel::Hidden, 0)
            .in_category(FieldCategory::Confidential),
        FieldRule::new("invoice_iban", "fin_invoices_list", "iban", FieldAccessLevel::Partial, 0)
            .in_category(FieldCategory::Financial),
    ]
}

/// Register the built-in catalogs and templates.
pub fn seed_store(store: &InMemoryAuthzStore) -> Result<(), StorageError> {
    let catalogs = module_catalogs();
    let modules = catalogs.len();
    for (module, resources) in catalogs {
        store.register_module(module, resources)?;
    }

    let templates = role_templates();
    let template_count = templates.len();
    for template in templates {
        store.register_template(template)?;
    }

    info!(modules, templates = template_count, "seeded authorization catalog");
    Ok(())
}

fn read_json(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read rule file {}", path.display()))
}

/// Scope rules from a JSON array file.
pub fn load_scope_rules(path: &Path) -> anyhow::Result<Vec<DataScopeRule>> {
    let raw = read_json(path)?;
    serde_json::from_str(&raw).with_context(|| format!("malformed scope rules in {}", path.display()))
}

/// Field rules from a JSON array file.
pub fn load_field_rules(path: &Path) -> anyhow::Result<Vec<FieldRule>> {
    let raw = read_json(path)?;
    serde_json::from_str(&raw).with_context(|| format!("malformed field rules in {}", path.display()))
}
