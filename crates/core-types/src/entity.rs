use std::fmt::Debug;
use std::hash::Hash;

/// Anything the dashboard caches by record identity.
pub trait CachedEntity: Clone + Debug + Send + Sync + 'static {
    type Id: Clone + Debug + Eq + Hash + Send + Sync + 'static;

    fn id(&self) -> &Self::Id;

    /// Overlay `newer` onto `self`. Relation and expansion data that `newer`
    /// does not carry is kept from `self`.
    fn merge(&mut self, newer: Self);
}
