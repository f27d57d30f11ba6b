//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Roles and user scope records are entities (mutated through the role
/// service); resources and rules are plain values and do not implement this.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
