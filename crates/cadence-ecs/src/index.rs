//! Component index: which entities currently carry which component types.
//!
//! Each component type owns a candidate set. An entity is a member of a
//! type's set iff it currently has an instance of that type attached. A
//! reverse map (entity -> attached types) makes destruction cleanup O(k) in
//! the number of types on the entity.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{ComponentKey, EntityId};

/// Candidate sets per component type plus the entity -> types reverse map.
#[derive(Debug, Default)]
pub struct ComponentIndex {
    candidates: FxHashMap<ComponentKey, FxHashSet<EntityId>>,
    by_entity: FxHashMap<EntityId, Vec<ComponentKey>>,
}

impl ComponentIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `entity` now carries a component of type `key`.
    /// Registering the same pair twice is a no-op.
    pub fn register_component(&mut self, entity: EntityId, key: ComponentKey) {
        let inserted = self.candidates.entry(key).or_default().insert(entity);
        if inserted {
            self.by_entity.entry(entity).or_default().push(key);
        }
    }

    /// Records that `entity` no longer carries a component of type `key`.
    pub fn unregister_component(&mut self, entity: EntityId, key: ComponentKey) {
        let removed = self
            .candidates
            .get_mut(&key)
            .is_some_and(|set| set.remove(&entity));
        if !removed {
            return;
        }
        if let Some(keys) = self.by_entity.get_mut(&entity) {
            keys.retain(|k| *k != key);
            if keys.is_empty() {
                self.by_entity.remove(&entity);
            }
        }
    }

    /// Removes `entity` from every candidate set it belongs to and clears its
    /// reverse mapping. Returns the types it carried.
    pub fn remove_entity(&mut self, entity: EntityId) -> Vec<ComponentKey> {
        let keys = self.by_entity.remove(&entity).unwrap_or_default();
        for key in &keys {
            if let Some(set) = self.candidates.get_mut(key) {
                set.remove(&entity);
            }
        }
        keys
    }

    /// Entities currently carrying `key`, if any ever did.
    pub fn candidates(&self, key: ComponentKey) -> Option<&FxHashSet<EntityId>> {
        self.candidates.get(&key)
    }

    /// Size of the candidate set of `key` (0 when unknown).
    pub fn candidate_count(&self, key: ComponentKey) -> usize {
        self.candidates.get(&key).map_or(0, FxHashSet::len)
    }

    /// Returns `true` if `entity` carries a component of type `key`.
    pub fn has(&self, entity: EntityId, key: ComponentKey) -> bool {
        self.candidates
            .get(&key)
            .is_some_and(|set| set.contains(&entity))
    }

    /// Component types attached to `entity`.
    pub fn keys_of(&self, entity: EntityId) -> &[ComponentKey] {
        self.by_entity
            .get(&entity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityRegistry;

    struct A;
    struct B;
    struct C;

    fn entities(n: usize) -> Vec<EntityId> {
        let mut reg = EntityRegistry::new();
        (0..n).map(|_| reg.spawn(None)).collect()
    }

    #[test]
    fn test_membership_tracks_attach_and_detach() {
        let e = entities(1)[0];
        let mut index = ComponentIndex::new();
        let a = ComponentKey::of::<A>();

        index.register_component(e, a);
        assert!(index.has(e, a));
        assert_eq!(index.candidate_count(a), 1);

        index.unregister_component(e, a);
        assert!(!index.has(e, a));
        assert_eq!(index.candidate_count(a), 0);
        assert!(index.keys_of(e).is_empty());
    }

    #[test]
    fn test_double_register_keeps_single_reverse_entry() {
        let e = entities(1)[0];
        let mut index = ComponentIndex::new();
        let a = ComponentKey::of::<A>();

        index.register_component(e, a);
        index.register_component(e, a);
        assert_eq!(index.keys_of(e), &[a]);
    }

    #[test]
    fn test_remove_entity_clears_every_candidate_set() {
        let ids = entities(2);
        let (e, other) = (ids[0], ids[1]);
        let mut index = ComponentIndex::new();
        let (a, b, c) = (
            ComponentKey::of::<A>(),
            ComponentKey::of::<B>(),
            ComponentKey::of::<C>(),
        );
        index.register_component(e, a);
        index.register_component(e, b);
        index.register_component(other, a);
        index.register_component(other, c);

        let removed = index.remove_entity(e);
        assert_eq!(removed.len(), 2);
        assert!(!index.has(e, a));
        assert!(!index.has(e, b));
        assert!(index.has(other, a));
        assert_eq!(index.candidate_count(a), 1);
        assert_eq!(index.candidate_count(b), 0);

        // Second removal is harmless.
        assert!(index.remove_entity(e).is_empty());
    }

    #[test]
    fn test_unregister_unknown_pair_is_noop() {
        let ids = entities(2);
        let mut index = ComponentIndex::new();
        let a = ComponentKey::of::<A>();
        index.register_component(ids[0], a);
        index.unregister_component(ids[1], a);
        index.unregister_component(ids[0], ComponentKey::of::<B>());
        assert!(index.has(ids[0], a));
    }
}
