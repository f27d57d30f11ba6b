//! `warden-core`: identifiers and the error model shared by the authorization engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{DepartmentId, RoleId, TeamId, TemplateId, TenantId, UserId};
