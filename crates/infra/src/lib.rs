//! Infrastructure layer: configuration, seed data and engine wiring.

pub mod config;
pub mod engine;
pub mod seed;


pub use config::AuthzConfig;
pub use engine::{AuthzEngine, InMemoryDeployment, InMemoryEngine};
