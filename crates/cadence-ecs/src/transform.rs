//! Hierarchical transforms with lazy, version-based world-space caching.
//!
//! Every [`Transform`] carries a `local_version` that its mutators bump by
//! exactly one whenever the local state actually changes. That counter is the
//! only dirtiness signal. A cached world transform remembers the local version
//! and the parent cache revision it was composed from, so a read re-derives a
//! link only when its own local state moved or anything above it was
//! recomposed. A fully fresh chain is answered from the cache by reference.

use glam::{Mat4, Quat, Vec3};
use rustc_hash::FxHashMap;

use crate::{EntityId, EntityRegistry, WorldError};

/// Translation, rotation and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trs {
    /// Translation.
    pub translation: Vec3,
    /// Orientation as a unit quaternion.
    pub rotation: Quat,
    /// Per-axis scale.
    pub scale: Vec3,
}

impl Trs {
    /// No translation, no rotation, unit scale.
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Creates a transform from its parts.
    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Pure translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Composes `child` (expressed in this transform's space) into this space.
    pub fn compose(&self, child: &Trs) -> Trs {
        Trs {
            translation: self.translation + self.rotation * (self.scale * child.translation),
            rotation: (self.rotation * child.rotation).normalize(),
            scale: self.scale * child.scale,
        }
    }

    /// Interpolates from `from` to `to`; `t` is clamped to `[0, 1]`.
    pub fn lerp(from: &Trs, to: &Trs, t: f32) -> Trs {
        let t = t.clamp(0.0, 1.0);
        Trs {
            translation: from.translation.lerp(to.translation, t),
            rotation: from.rotation.slerp(to.rotation, t),
            scale: from.scale.lerp(to.scale, t),
        }
    }

    /// Maps a point from this transform's local space into its parent space.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.translation + self.rotation * (self.scale * point)
    }

    /// Column-major affine matrix, e.g. for upload to a renderer.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for Trs {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy)]
struct WorldCache {
    world: Trs,
    /// `local_version` of the owning transform when `world` was composed.
    local_version: u64,
    /// Parent identity and parent cache revision composed against.
    ancestry: Option<(EntityId, u64)>,
    /// Drawn from `ResolveScratch` every time `world` is recomposed, so no
    /// two cache states of one world share a revision.
    revision: u64,
}

/// Spatial component: local state, its previous fixed-step snapshot and the
/// cached world transform.
#[derive(Debug, Clone)]
pub struct Transform {
    local: Trs,
    previous: Trs,
    local_version: u64,
    cache: Option<WorldCache>,
}

impl Transform {
    /// Creates a transform whose local and previous state are `local`.
    pub fn new(local: Trs) -> Self {
        Self {
            local,
            previous: local,
            local_version: 0,
            cache: None,
        }
    }

    /// Creates a pure translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(Trs::from_translation(translation))
    }

    /// Local state.
    pub fn local(&self) -> &Trs {
        &self.local
    }

    /// Local state as of the start of the current fixed step.
    pub fn previous(&self) -> &Trs {
        &self.previous
    }

    /// Monotonic counter bumped by every mutation of the local state.
    pub fn local_version(&self) -> u64 {
        self.local_version
    }

    /// Local translation.
    pub fn translation(&self) -> Vec3 {
        self.local.translation
    }

    /// Local rotation.
    pub fn rotation(&self) -> Quat {
        self.local.rotation
    }

    /// Local scale.
    pub fn scale(&self) -> Vec3 {
        self.local.scale
    }

    /// Replaces the whole local state.
    pub fn set_local(&mut self, local: Trs) {
        if self.local != local {
            self.local = local;
            self.local_version += 1;
        }
    }

    /// Sets the local translation.
    pub fn set_translation(&mut self, translation: Vec3) {
        self.set_local(Trs {
            translation,
            ..self.local
        });
    }

    /// Sets the local rotation.
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.set_local(Trs {
            rotation,
            ..self.local
        });
    }

    /// Sets the local scale.
    pub fn set_scale(&mut self, scale: Vec3) {
        self.set_local(Trs {
            scale,
            ..self.local
        });
    }

    /// Offsets the local translation.
    pub fn translate(&mut self, delta: Vec3) {
        self.set_translation(self.local.translation + delta);
    }

    /// Applies `rotation` on top of the current local rotation.
    pub fn rotate(&mut self, rotation: Quat) {
        self.set_rotation((rotation * self.local.rotation).normalize());
    }

    /// Copies the local state into the previous snapshot.
    ///
    /// Not a local mutation: the version is left untouched.
    pub(crate) fn snapshot_previous(&mut self) {
        self.previous = self.local;
    }

    /// Local state interpolated between previous and current.
    fn local_at(&self, alpha: f32) -> Trs {
        if alpha <= 0.0 || self.previous == self.local {
            self.local
        } else {
            Trs::lerp(&self.previous, &self.local, alpha)
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new(Trs::IDENTITY)
    }
}

/// Column of transforms as held by component storage.
pub(crate) type TransformColumn = FxHashMap<EntityId, Transform>;

/// Scratch state reused across world-transform reads.
#[derive(Debug, Default)]
pub(crate) struct ResolveScratch {
    pub(crate) chain: Vec<EntityId>,
    last_revision: u64,
}

/// Collects the transform-bearing ancestry of `entity`, root first, into
/// `chain`. Ancestors without a transform contribute identity and are skipped.
fn collect_chain(
    column: &TransformColumn,
    entities: &EntityRegistry,
    entity: EntityId,
    chain: &mut Vec<EntityId>,
) {
    chain.clear();
    let mut cursor = Some(entity);
    while let Some(current) = cursor {
        if column.contains_key(&current) {
            chain.push(current);
        }
        cursor = entities.parent(current);
    }
    chain.reverse();
}

fn missing_transform(entity: EntityId) -> WorldError {
    WorldError::MissingComponent {
        entity,
        component: std::any::type_name::<Transform>(),
    }
}

/// Brings the cached world transform of every link from the root down to
/// `entity` up to date and returns the leaf's cached world transform.
pub(crate) fn resolve_world<'c>(
    column: &'c mut TransformColumn,
    entities: &EntityRegistry,
    entity: EntityId,
    scratch: &mut ResolveScratch,
) -> Result<&'c Trs, WorldError> {
    if !column.contains_key(&entity) {
        return Err(missing_transform(entity));
    }
    collect_chain(column, entities, entity, &mut scratch.chain);

    let mut parent: Option<(EntityId, Trs, u64)> = None;
    let mut parent_recomputed = false;
    for &link in scratch.chain.iter() {
        let Some(transform) = column.get_mut(&link) else {
            continue;
        };
        let ancestry = parent.map(|(id, _, revision)| (id, revision));
        let stale = parent_recomputed
            || transform.cache.is_none_or(|cache| {
                cache.local_version != transform.local_version || cache.ancestry != ancestry
            });

        if stale {
            let world = match &parent {
                Some((_, parent_world, _)) => parent_world.compose(&transform.local),
                None => transform.local,
            };
            scratch.last_revision += 1;
            transform.cache = Some(WorldCache {
                world,
                local_version: transform.local_version,
                ancestry,
                revision: scratch.last_revision,
            });
        }
        parent_recomputed = stale;

        if let Some(cache) = transform.cache {
            parent = Some((link, cache.world, cache.revision));
        }
    }

    column
        .get(&entity)
        .and_then(|transform| transform.cache.as_ref())
        .map(|cache| &cache.world)
        .ok_or_else(|| missing_transform(entity))
}

/// Writes the world transform of `entity` at interpolation point `alpha` into
/// `out`.
///
/// With `alpha == 0` the (refreshed) cached transform is copied. Otherwise
/// every link whose previous and current local state differ is interpolated
/// before composing; unchanged links compose their local state as is.
pub(crate) fn resolve_world_interpolated(
    column: &mut TransformColumn,
    entities: &EntityRegistry,
    entity: EntityId,
    alpha: f32,
    out: &mut Trs,
    scratch: &mut ResolveScratch,
) -> Result<(), WorldError> {
    let cached = *resolve_world(column, entities, entity, scratch)?;
    let alpha = alpha.clamp(0.0, 1.0);
    if alpha <= 0.0 {
        *out = cached;
        return Ok(());
    }

    // The chain still holds the ancestry from the refresh above.
    let mut world: Option<Trs> = None;
    for link in scratch.chain.iter() {
        let Some(transform) = column.get(link) else {
            continue;
        };
        let local = transform.local_at(alpha);
        world = Some(match world {
            Some(parent) => parent.compose(&local),
            None => local,
        });
    }
    *out = world.unwrap_or(cached);
    Ok(())
}

/// Copies every transform's local state into its previous snapshot.
pub(crate) fn snapshot_all(column: &mut TransformColumn) {
    for transform in column.values_mut() {
        transform.snapshot_previous();
    }
}
