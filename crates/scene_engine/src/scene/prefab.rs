//! Prefabs: serializable scene-object templates
//!
//! A prefab wraps a non-instantiated clone of a scene-object subtree plus
//! a structural hash bumped on every content update. Instances carry the
//! prefab's UUID as their link UUID and the hash they were built from, so
//! staleness is a cheap comparison.

use log::warn;
use uuid::Uuid;

use crate::assets::ResourceManager;

use super::handle::SceneObjectHandle;
use super::object::SceneObjectFlags;
use super::prefab_utility::PrefabUtility;

/// A reusable scene-object template
pub struct Prefab {
    uuid: Uuid,
    root: SceneObjectHandle,
    hash: u32,
    is_scene: bool,
}

impl Prefab {
    /// Create a prefab from a live subtree
    ///
    /// Clears and regenerates the link ids of the source subtree, clones
    /// it into internal storage (inert, stripped of don't-save children),
    /// and stamps a freshly minted UUID onto the prefab, the source
    /// object and the stored root. Returns `None` for a dead handle.
    pub fn create(source: &SceneObjectHandle, is_scene: bool) -> Option<Prefab> {
        if source.resolve().is_none() {
            warn!("prefab creation from a dead scene object handle");
            return None;
        }
        let mut prefab = Prefab {
            uuid: Uuid::new_v4(),
            root: SceneObjectHandle::null(),
            hash: 0,
            is_scene,
        };
        prefab.initialize(source);
        Some(prefab)
    }

    /// Rebuild a prefab from persisted parts
    pub(crate) fn from_stored(
        uuid: Uuid,
        root: SceneObjectHandle,
        hash: u32,
        is_scene: bool,
    ) -> Self {
        Self {
            uuid,
            root,
            hash,
            is_scene,
        }
    }

    fn initialize(&mut self, source: &SceneObjectHandle) {
        PrefabUtility::clear_prefab_ids(source, true, true);
        PrefabUtility::generate_prefab_ids(source);
        source.set_prefab_link(Some(self.uuid));
        source.set_prefab_hash(self.hash);

        let stored = source.clone_object(false);
        strip_dont_save(&stored);
        stored.set_prefab_link(Some(self.uuid));
        stored.set_prefab_hash(self.hash);

        if !self.root.is_null() && !self.root.is_destroyed() {
            self.root.destroy(true);
        }
        self.root = stored;
    }

    /// Replace the stored content with the current state of `source`
    ///
    /// Increments the structural hash, which is the change signal
    /// consumed by [`PrefabUtility::update_from_prefab`].
    pub fn update(&mut self, source: &SceneObjectHandle) {
        if source.resolve().is_none() {
            warn!("prefab update from a dead scene object handle");
            return;
        }
        self.hash = self.hash.wrapping_add(1);
        self.initialize(source);
    }

    /// Identity of this prefab
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Structural version counter, bumped on every update
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Whether this prefab represents a whole scene rather than a
    /// reusable object group
    pub fn is_scene(&self) -> bool {
        self.is_scene
    }

    /// The stored canonical hierarchy
    pub fn root(&self) -> SceneObjectHandle {
        self.root.clone()
    }

    /// Produce a live (instantiated) copy of the stored content
    ///
    /// Nested child-prefab instances inside the stored content are
    /// refreshed first, so the produced hierarchy reflects the current
    /// versions of nested templates. The copy is detached; the caller
    /// parents it.
    pub fn instantiate(&self, resources: &ResourceManager) -> SceneObjectHandle {
        PrefabUtility::refresh_instances(resources, &self.root, false);
        let copy = self.root.clone_object(false);
        copy.instantiate();
        copy
    }

    /// Produce an inert copy of the stored content
    pub fn clone_inert(&self) -> SceneObjectHandle {
        self.root.clone_object(false)
    }
}

fn strip_dont_save(object: &SceneObjectHandle) {
    for child in object.children() {
        if child.flags().contains(SceneObjectFlags::DONT_SAVE) {
            child.destroy(true);
        } else {
            strip_dont_save(&child);
        }
    }
}
