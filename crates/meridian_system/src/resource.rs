//! Type-keyed resource storage.
//!
//! [`Resources`] holds at most one value per Rust type. The server uses it
//! for mutable build-time state (for example a tool registry that is frozen
//! into a provider at `ready()`), and the flow engine wraps it as the
//! per-call state bag that stages use to hand values to later stages.
//!
//! Unlike [`Providers`](crate::provider::Providers), resources are owned
//! exclusively: mutable access goes through `&mut Resources`, so there is no
//! locking and no shared ownership.
//!
//! # Example
//!
//! ```
//! use meridian_system::resource::Resources;
//!
//! struct Attempts(u32);
//!
//! let mut resources = Resources::new();
//! resources.insert(Attempts(0));
//!
//! if let Some(attempts) = resources.get_mut::<Attempts>() {
//!     attempts.0 += 1;
//! }
//!
//! assert_eq!(resources.get::<Attempts>().map(|a| a.0), Some(1));
//! ```

use core::any::{Any, TypeId};
use hashbrown::HashMap;

/// A value that can be stored in [`Resources`].
///
/// Blanket-implemented for every `Send + Sync + 'static` type.
pub trait Resource: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Resource for T {}

/// Unique identifier for a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId {
    type_id: TypeId,
    type_name: &'static str,
}

impl ResourceId {
    /// Creates a `ResourceId` for the given type.
    #[must_use]
    pub fn of<T: Resource>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: core::any::type_name::<T>(),
        }
    }

    /// Returns the type name for diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Container holding at most one value per type.
#[derive(Default)]
pub struct Resources {
    storage: HashMap<TypeId, (ResourceId, Box<dyn Any + Send + Sync>)>,
}

impl Resources {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            storage: HashMap::new(),
        }
    }

    /// Inserts a value, returning the previous value of the same type.
    pub fn insert<T: Resource>(&mut self, resource: T) -> Option<T> {
        let id = ResourceId::of::<T>();
        self.storage
            .insert(id.type_id, (id, Box::new(resource)))
            .and_then(|(_, old)| old.downcast::<T>().ok().map(|boxed| *boxed))
    }

    /// Returns a shared reference to the value of type `T`, if present.
    #[must_use]
    pub fn get<T: Resource>(&self) -> Option<&T> {
        self.storage
            .get(&TypeId::of::<T>())
            .and_then(|(_, value)| value.downcast_ref::<T>())
    }

    /// Returns a mutable reference to the value of type `T`, if present.
    pub fn get_mut<T: Resource>(&mut self) -> Option<&mut T> {
        self.storage
            .get_mut(&TypeId::of::<T>())
            .and_then(|(_, value)| value.downcast_mut::<T>())
    }

    /// Removes and returns the value of type `T`.
    pub fn remove<T: Resource>(&mut self) -> Option<T> {
        self.storage
            .remove(&TypeId::of::<T>())
            .and_then(|(_, value)| value.downcast::<T>().ok().map(|boxed| *boxed))
    }

    /// Returns true if a value of type `T` is stored.
    #[must_use]
    pub fn contains<T: Resource>(&self) -> bool {
        self.storage.contains_key(&TypeId::of::<T>())
    }

    /// Returns the identifiers of every stored value.
    pub fn ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.storage.values().map(|(id, _)| *id)
    }

    /// Removes every value.
    pub fn clear(&mut self) {
        self.storage.clear();
    }

    /// Returns the number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

impl core::fmt::Debug for Resources {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set()
            .entries(self.ids().map(|id| id.type_name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Counter {
        value: i32,
    }

    #[derive(Debug, PartialEq)]
    struct Label(&'static str);

    #[test]
    fn insert_and_get() {
        let mut resources = Resources::new();
        assert!(resources.insert(Counter { value: 3 }).is_none());

        assert_eq!(resources.get::<Counter>(), Some(&Counter { value: 3 }));
        assert!(resources.get::<Label>().is_none());
    }

    #[test]
    fn insert_replaces_and_returns_old() {
        let mut resources = Resources::new();
        resources.insert(Counter { value: 1 });

        let old = resources.insert(Counter { value: 2 });
        assert_eq!(old, Some(Counter { value: 1 }));
        assert_eq!(resources.len(), 1);
    }

    #[test]
    fn get_mut_modifies_in_place() {
        let mut resources = Resources::new();
        resources.insert(Counter { value: 0 });

        resources.get_mut::<Counter>().unwrap().value += 5;
        assert_eq!(resources.get::<Counter>().unwrap().value, 5);
    }

    #[test]
    fn remove_takes_ownership() {
        let mut resources = Resources::new();
        resources.insert(Label("x"));

        assert_eq!(resources.remove::<Label>(), Some(Label("x")));
        assert!(!resources.contains::<Label>());
        assert!(resources.is_empty());
    }

    #[test]
    fn debug_lists_type_names() {
        let mut resources = Resources::new();
        resources.insert(Label("x"));

        assert!(format!("{resources:?}").contains("Label"));
    }
}
