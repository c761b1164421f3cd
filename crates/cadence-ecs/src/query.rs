//! Multi-component queries seeded from the smallest candidate set.
//!
//! A [`Query`] is defined once from a tuple of required component types and
//! an optional list of excluded types. Defining it does not scan anything;
//! [`Query::run`] returns a lazy iterator that reflects every index mutation
//! made before the call.
//!
//! ```ignore
//! let movers = Query::<(Transform, Spin)>::new().without::<Frozen>();
//! for (entity, (transform, spin)) in movers.run(&world) {
//!     // ...
//! }
//! ```

use std::collections::hash_set;
use std::marker::PhantomData;

use crate::{Component, ComponentKey, ComponentStorage, EntityId, World};

/// Tuple of component types a query requires, and how to fetch them.
pub trait QueryData {
    /// Borrowed components yielded per match, in declaration order.
    type Item<'w>;

    /// Appends the required component keys, in declaration order.
    fn push_keys(keys: &mut Vec<ComponentKey>);

    /// Fetches the components of `entity`, or `None` if one is missing.
    fn fetch<'w>(storage: &'w ComponentStorage, entity: EntityId) -> Option<Self::Item<'w>>;
}

impl QueryData for () {
    type Item<'w> = ();

    fn push_keys(_keys: &mut Vec<ComponentKey>) {}

    fn fetch<'w>(_storage: &'w ComponentStorage, _entity: EntityId) -> Option<Self::Item<'w>> {
        Some(())
    }
}

macro_rules! impl_query_data {
    ($($name:ident),+) => {
        impl<$($name: Component),+> QueryData for ($($name,)+) {
            type Item<'w> = ($(&'w $name,)+);

            fn push_keys(keys: &mut Vec<ComponentKey>) {
                $(keys.push(ComponentKey::of::<$name>());)+
            }

            fn fetch<'w>(
                storage: &'w ComponentStorage,
                entity: EntityId,
            ) -> Option<Self::Item<'w>> {
                Some(($(storage.get::<$name>(entity)?,)+))
            }
        }
    };
}

impl_query_data!(A);
impl_query_data!(A, B);
impl_query_data!(A, B, C);
impl_query_data!(A, B, C, D);
impl_query_data!(A, B, C, D, E);
impl_query_data!(A, B, C, D, E, F);

/// A reusable query over entities carrying every type of `D` and none of the
/// excluded types.
pub struct Query<D: QueryData> {
    has: Vec<ComponentKey>,
    not: Vec<ComponentKey>,
    _marker: PhantomData<fn() -> D>,
}

impl<D: QueryData> Query<D> {
    /// Defines a query requiring every component type of `D`.
    pub fn new() -> Self {
        let mut has = Vec::new();
        D::push_keys(&mut has);
        Self {
            has,
            not: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Excludes entities carrying a `C`.
    pub fn without<C: Component>(mut self) -> Self {
        self.not.push(ComponentKey::of::<C>());
        self
    }

    /// Required component types in declaration order.
    pub fn required(&self) -> &[ComponentKey] {
        &self.has
    }

    /// Excluded component types.
    pub fn excluded(&self) -> &[ComponentKey] {
        &self.not
    }

    /// Lazily yields `(entity, components)` for every match in `world`.
    pub fn run<'w, 'q>(&'q self, world: &'w World) -> QueryIter<'w, 'q, D> {
        QueryIter {
            world,
            query: self,
            source: self.seed(world),
        }
    }

    /// First match, if any.
    pub fn some<'w>(&self, world: &'w World) -> Option<(EntityId, D::Item<'w>)> {
        self.run(world).next()
    }

    /// Number of matches.
    pub fn count(&self, world: &World) -> usize {
        self.run(world).count()
    }

    /// Ids of every match, collected so the caller can mutate afterwards.
    pub fn entities(&self, world: &World) -> Vec<EntityId> {
        self.run(world).map(|(entity, _)| entity).collect()
    }

    fn seed<'w>(&self, world: &'w World) -> Source<'w> {
        if self.has.is_empty() {
            return Source::All(Box::new(world.entities().iter()));
        }

        let index = world.index();
        let mut smallest: Option<&'w rustc_hash::FxHashSet<EntityId>> = None;
        for key in &self.has {
            let Some(set) = index.candidates(*key) else {
                return Source::Empty;
            };
            if smallest.is_none_or(|s| set.len() < s.len()) {
                smallest = Some(set);
            }
        }
        match smallest {
            Some(set) => Source::Candidates(set.iter()),
            None => Source::Empty,
        }
    }

    fn accepts(&self, world: &World, entity: EntityId) -> bool {
        let index = world.index();
        world.entities().contains(entity)
            && self.has.iter().all(|key| index.has(entity, *key))
            && !self.not.iter().any(|key| index.has(entity, *key))
    }
}

impl<D: QueryData> Default for Query<D> {
    fn default() -> Self {
        Self::new()
    }
}

enum Source<'w> {
    Candidates(hash_set::Iter<'w, EntityId>),
    All(Box<dyn Iterator<Item = EntityId> + 'w>),
    Empty,
}

/// Iterator returned by [`Query::run`].
pub struct QueryIter<'w, 'q, D: QueryData> {
    world: &'w World,
    query: &'q Query<D>,
    source: Source<'w>,
}

impl<'w, D: QueryData> Iterator for QueryIter<'w, '_, D> {
    type Item = (EntityId, D::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entity = match &mut self.source {
                Source::Candidates(iter) => *iter.next()?,
                Source::All(iter) => iter.next()?,
                Source::Empty => return None,
            };
            if !self.query.accepts(self.world, entity) {
                continue;
            }
            if let Some(item) = D::fetch(self.world.storage(), entity) {
                return Some((entity, item));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct A(u32);
    #[derive(Debug, PartialEq)]
    struct B(u32);
    #[derive(Debug, PartialEq)]
    struct C;

    #[test]
    fn test_query_matches_entities_with_all_required() {
        let mut world = World::default();
        let both = world.spawn();
        world.insert(both, A(1)).unwrap();
        world.insert(both, B(2)).unwrap();
        let only_a = world.spawn();
        world.insert(only_a, A(3)).unwrap();

        let query = Query::<(A, B)>::new();
        let results: Vec<_> = query.run(&world).collect();
        assert_eq!(results.len(), 1);
        let (entity, (a, b)) = results[0];
        assert_eq!(entity, both);
        assert_eq!(a, &A(1));
        assert_eq!(b, &B(2));
    }

    #[test]
    fn test_exclusion_and_removal_are_seen_on_next_run() {
        let mut world = World::default();
        let e = world.spawn();
        world.insert(e, A(1)).unwrap();
        world.insert(e, B(1)).unwrap();

        let plain = Query::<(A, B)>::new();
        let without_c = Query::<(A, B)>::new().without::<C>();
        assert_eq!(plain.count(&world), 1);
        assert_eq!(without_c.count(&world), 1);

        world.insert(e, C).unwrap();
        assert_eq!(plain.count(&world), 1);
        assert_eq!(without_c.count(&world), 0);

        world.remove::<B>(e);
        assert_eq!(plain.count(&world), 0);
        assert!(plain.some(&world).is_none());
    }

    #[test]
    fn test_query_seeds_from_smallest_candidate_set() {
        let mut world = World::default();
        for i in 0..10 {
            let e = world.spawn();
            world.insert(e, A(i)).unwrap();
        }
        let rare = world.spawn();
        world.insert(rare, A(99)).unwrap();
        world.insert(rare, B(7)).unwrap();

        let query = Query::<(A, B)>::new();
        match query.seed(&world) {
            Source::Candidates(iter) => assert_eq!(iter.len(), 1),
            _ => panic!("expected candidate seeding"),
        }
        assert_eq!(query.entities(&world), vec![rare]);
    }

    #[test]
    fn test_unknown_required_type_yields_nothing() {
        let mut world = World::default();
        let e = world.spawn();
        world.insert(e, A(1)).unwrap();
        assert_eq!(Query::<(A, C)>::new().count(&world), 0);
    }

    #[test]
    fn test_empty_query_scans_all_world_entities() {
        let mut world = World::default();
        let a = world.spawn();
        let b = world.spawn();
        world.insert(b, C).unwrap();

        let all = Query::<()>::new().entities(&world);
        assert!(all.contains(&a));
        assert!(all.contains(&b));
        assert!(all.contains(&world.root()));

        let without_c = Query::<()>::new().without::<C>().entities(&world);
        assert!(without_c.contains(&a));
        assert!(!without_c.contains(&b));
    }

    #[test]
    fn test_despawned_entities_are_not_yielded() {
        let mut world = World::default();
        let e = world.spawn();
        world.insert(e, A(1)).unwrap();
        world.despawn(e).unwrap();
        assert_eq!(Query::<(A,)>::new().count(&world), 0);
    }

    #[test]
    fn test_components_yield_in_declaration_order() {
        let mut world = World::default();
        let e = world.spawn();
        world.insert(e, B(2)).unwrap();
        world.insert(e, A(1)).unwrap();

        let (_, (b, a)) = Query::<(B, A)>::new().some(&world).unwrap();
        assert_eq!((b.0, a.0), (2, 1));
        assert_eq!(
            Query::<(B, A)>::new().required(),
            &[ComponentKey::of::<B>(), ComponentKey::of::<A>()]
        );
    }
}
