//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Store adapters key their tables by this id, so every record that is fetched
/// by id (principals, organizations, positions) implements it.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
