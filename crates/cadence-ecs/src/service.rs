//! World-scoped services looked up by type.

use std::any::{Any, TypeId};

use rustc_hash::FxHashMap;

use crate::World;

/// A long-lived collaborator attached to a [`World`].
///
/// `attach` runs once when the service is added (before it becomes visible
/// to lookups) and `detach` once when it is removed.
pub trait Service: Any {
    /// Called once when the service is added.
    fn attach(&mut self, _world: &mut World) {}

    /// Called once when the service is removed.
    fn detach(&mut self, _world: &mut World) {}
}

pub(crate) type DetachFn = fn(Box<dyn Any>, &mut World);

struct ServiceEntry {
    name: &'static str,
    service: Box<dyn Any>,
    detach: DetachFn,
}

fn detach_erased<S: Service>(service: Box<dyn Any>, world: &mut World) {
    if let Ok(mut service) = service.downcast::<S>() {
        service.detach(world);
    }
}

/// Attached services, in attach order.
#[derive(Default)]
pub(crate) struct Services {
    entries: FxHashMap<TypeId, ServiceEntry>,
    order: Vec<TypeId>,
}

impl Services {
    pub(crate) fn contains<S: Service>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<S>())
    }

    pub(crate) fn insert<S: Service>(&mut self, service: S) {
        self.put_back(Box::new(service));
    }

    pub(crate) fn get<S: Service>(&self) -> Option<&S> {
        self.entries
            .get(&TypeId::of::<S>())?
            .service
            .downcast_ref::<S>()
    }

    pub(crate) fn get_mut<S: Service>(&mut self) -> Option<&mut S> {
        self.entries
            .get_mut(&TypeId::of::<S>())?
            .service
            .downcast_mut::<S>()
    }

    pub(crate) fn remove<S: Service>(&mut self) -> Option<S> {
        let id = TypeId::of::<S>();
        let entry = self.entries.remove(&id)?;
        self.order.retain(|other| *other != id);
        entry.service.downcast::<S>().ok().map(|boxed| *boxed)
    }

    /// Takes `S` out without detaching it, for [`World::service_scope`].
    pub(crate) fn take<S: Service>(&mut self) -> Option<Box<S>> {
        let entry = self.entries.remove(&TypeId::of::<S>())?;
        entry.service.downcast::<S>().ok()
    }

    /// Returns a service taken with [`take`](Self::take) to its slot.
    pub(crate) fn put_back<S: Service>(&mut self, service: Box<S>) {
        let id = TypeId::of::<S>();
        self.entries.insert(
            id,
            ServiceEntry {
                name: std::any::type_name::<S>(),
                service,
                detach: detach_erased::<S>,
            },
        );
        if !self.order.contains(&id) {
            self.order.push(id);
        }
    }

    /// Removes the most recently attached service, returning its detach hook.
    pub(crate) fn pop(&mut self) -> Option<(&'static str, Box<dyn Any>, DetachFn)> {
        while let Some(id) = self.order.pop() {
            if let Some(entry) = self.entries.remove(&id) {
                return Some((entry.name, entry.service, entry.detach));
            }
        }
        None
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
