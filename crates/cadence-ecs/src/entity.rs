//! Entity registry: generational identities plus the parent/child hierarchy.

use slotmap::SlotMap;

use crate::WorldError;

slotmap::new_key_type! {
    /// Opaque, generational entity identity.
    ///
    /// A despawned id is never confused with a later entity occupying the same
    /// slot: the generation differs.
    pub struct EntityId;
}

#[derive(Debug, Default)]
struct EntityNode {
    parent: Option<EntityId>,
    children: Vec<EntityId>,
}

/// The set of live entities of one world and their hierarchy.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    nodes: SlotMap<EntityId, EntityNode>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new entity, optionally attached as the last child of `parent`.
    ///
    /// A dead `parent` is ignored and the entity is created at the top level;
    /// callers that need a hard failure check [`contains`](Self::contains) first.
    pub(crate) fn spawn(&mut self, parent: Option<EntityId>) -> EntityId {
        let parent = parent.filter(|p| self.nodes.contains_key(*p));
        let id = self.nodes.insert(EntityNode {
            parent,
            children: Vec::new(),
        });
        if let Some(p) = parent
            && let Some(node) = self.nodes.get_mut(p)
        {
            node.children.push(id);
        }
        id
    }

    /// Returns `true` if the entity is alive in this registry.
    pub fn contains(&self, entity: EntityId) -> bool {
        self.nodes.contains_key(entity)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no entity is alive.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates all live entities.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.nodes.keys()
    }

    /// Parent of `entity`, or `None` for top-level and dead entities.
    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        self.nodes.get(entity).and_then(|n| n.parent)
    }

    /// Children of `entity` in attachment order.
    pub fn children(&self, entity: EntityId) -> &[EntityId] {
        self.nodes
            .get(entity)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Returns `true` if `ancestor` is `entity` itself or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: EntityId, entity: EntityId) -> bool {
        let mut cursor = Some(entity);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Moves `child` under `parent` (or to the top level for `None`).
    ///
    /// Rejects cycles before touching any link.
    pub(crate) fn set_parent(
        &mut self,
        child: EntityId,
        parent: Option<EntityId>,
    ) -> Result<(), WorldError> {
        if !self.contains(child) {
            return Err(WorldError::EntityNotFound(child));
        }
        if let Some(p) = parent {
            if !self.contains(p) {
                return Err(WorldError::EntityNotFound(p));
            }
            if self.is_ancestor_or_self(child, p) {
                return Err(WorldError::HierarchyCycle { child, parent: p });
            }
        }
        if self.parent(child) == parent {
            return Ok(());
        }

        self.detach_from_parent(child);
        if let Some(p) = parent
            && let Some(node) = self.nodes.get_mut(p)
        {
            node.children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = parent;
        }
        Ok(())
    }

    /// Collects `entity` and all its descendants, children before parents.
    pub(crate) fn subtree_post_order(&self, entity: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        if !self.contains(entity) {
            return out;
        }
        // Explicit stack: (entity, children already pushed).
        let mut stack = vec![(entity, false)];
        while let Some((current, expanded)) = stack.pop() {
            if expanded {
                out.push(current);
                continue;
            }
            stack.push((current, true));
            for &child in self.children(current).iter().rev() {
                stack.push((child, false));
            }
        }
        out
    }

    /// Removes a single entity. Its children must already be gone.
    pub(crate) fn remove(&mut self, entity: EntityId) -> bool {
        self.detach_from_parent(entity);
        self.nodes.remove(entity).is_some()
    }

    fn detach_from_parent(&mut self, child: EntityId) {
        let Some(old_parent) = self.parent(child) else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(old_parent) {
            node.children.retain(|c| *c != child);
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_records_parent_and_children() {
        let mut reg = EntityRegistry::new();
        let parent = reg.spawn(None);
        let a = reg.spawn(Some(parent));
        let b = reg.spawn(Some(parent));

        assert_eq!(reg.parent(a), Some(parent));
        assert_eq!(reg.children(parent), &[a, b]);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_set_parent_rejects_self_and_descendants() {
        let mut reg = EntityRegistry::new();
        let root = reg.spawn(None);
        let mid = reg.spawn(Some(root));
        let leaf = reg.spawn(Some(mid));

        assert_eq!(
            reg.set_parent(root, Some(leaf)),
            Err(WorldError::HierarchyCycle {
                child: root,
                parent: leaf
            })
        );
        assert!(matches!(
            reg.set_parent(mid, Some(mid)),
            Err(WorldError::HierarchyCycle { .. })
        ));
        // Nothing moved.
        assert_eq!(reg.parent(root), None);
        assert_eq!(reg.children(mid), &[leaf]);
    }

    #[test]
    fn test_set_parent_moves_between_parents() {
        let mut reg = EntityRegistry::new();
        let a = reg.spawn(None);
        let b = reg.spawn(None);
        let child = reg.spawn(Some(a));

        reg.set_parent(child, Some(b)).unwrap();
        assert!(reg.children(a).is_empty());
        assert_eq!(reg.children(b), &[child]);

        reg.set_parent(child, None).unwrap();
        assert_eq!(reg.parent(child), None);
        assert!(reg.children(b).is_empty());
    }

    #[test]
    fn test_subtree_post_order_lists_children_first() {
        let mut reg = EntityRegistry::new();
        let root = reg.spawn(None);
        let a = reg.spawn(Some(root));
        let a1 = reg.spawn(Some(a));
        let b = reg.spawn(Some(root));

        let order = reg.subtree_post_order(root);
        assert_eq!(order, vec![a1, a, b, root]);
    }

    #[test]
    fn test_removed_id_is_not_reused() {
        let mut reg = EntityRegistry::new();
        let a = reg.spawn(None);
        assert!(reg.remove(a));
        let b = reg.spawn(None);
        assert_ne!(a, b);
        assert!(!reg.contains(a));
        assert!(reg.contains(b));
    }
}
