//! Typed component storage, one column per component type.

use std::any::{Any, TypeId};
use std::hash::{Hash, Hasher};

use rustc_hash::FxHashMap;

use crate::EntityId;

/// Marker for values that can be attached to an entity.
///
/// Every `'static` type qualifies; an entity holds at most one instance per type.
pub trait Component: 'static {}

impl<T: 'static> Component for T {}

/// Key identifying a component type in the index and in storage.
///
/// Equality and hashing use the [`TypeId`] only; the name is carried for
/// error messages and logs.
#[derive(Debug, Clone, Copy)]
pub struct ComponentKey {
    id: TypeId,
    name: &'static str,
}

impl ComponentKey {
    /// Key of component type `T`.
    pub fn of<T: Component>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Fully qualified type name of the component.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ComponentKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ComponentKey {}

impl Hash for ComponentKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Type-erased view of a column so storage can drop an entity's components
/// without knowing their concrete types.
trait ErasedColumn {
    fn remove_entity(&mut self, entity: EntityId) -> bool;
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

type Column<T> = FxHashMap<EntityId, T>;

impl<T: Component> ErasedColumn for Column<T> {
    fn remove_entity(&mut self, entity: EntityId) -> bool {
        self.remove(&entity).is_some()
    }

    fn len(&self) -> usize {
        FxHashMap::len(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// All component instances of one world.
#[derive(Default)]
pub struct ComponentStorage {
    columns: FxHashMap<ComponentKey, Box<dyn ErasedColumn>>,
}

impl ComponentStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the `T` of `entity`, returning the previous value.
    pub fn insert<T: Component>(&mut self, entity: EntityId, component: T) -> Option<T> {
        self.column_or_create::<T>().insert(entity, component)
    }

    /// Removes and returns the `T` of `entity`.
    pub fn remove<T: Component>(&mut self, entity: EntityId) -> Option<T> {
        self.column_mut::<T>()?.remove(&entity)
    }

    /// Shared access to the `T` of `entity`.
    pub fn get<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.column::<T>()?.get(&entity)
    }

    /// Exclusive access to the `T` of `entity`.
    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.column_mut::<T>()?.get_mut(&entity)
    }

    /// Number of live `T` instances.
    pub fn count_of(&self, key: ComponentKey) -> usize {
        self.columns.get(&key).map_or(0, |c| c.len())
    }

    /// Drops the components listed in `keys` from `entity`. Returns how many
    /// instances were actually removed.
    pub(crate) fn remove_keys(&mut self, entity: EntityId, keys: &[ComponentKey]) -> usize {
        keys.iter()
            .filter(|key| {
                self.columns
                    .get_mut(*key)
                    .is_some_and(|column| column.remove_entity(entity))
            })
            .count()
    }

    pub(crate) fn column<T: Component>(&self) -> Option<&Column<T>> {
        self.columns
            .get(&ComponentKey::of::<T>())?
            .as_any()
            .downcast_ref::<Column<T>>()
    }

    pub(crate) fn column_mut<T: Component>(&mut self) -> Option<&mut Column<T>> {
        self.columns
            .get_mut(&ComponentKey::of::<T>())?
            .as_any_mut()
            .downcast_mut::<Column<T>>()
    }

    fn column_or_create<T: Component>(&mut self) -> &mut Column<T> {
        let column = self
            .columns
            .entry(ComponentKey::of::<T>())
            .or_insert_with(|| Box::new(Column::<T>::default()));
        match column.as_any_mut().downcast_mut::<Column<T>>() {
            Some(typed) => typed,
            // Keys are derived from `TypeId::of::<T>()`, so the column under
            // this key always holds `T`.
            None => unreachable!("component column type mismatch"),
        }
    }
}
