//! Prefab resource tracking and persistence
//!
//! Resources are registered and looked up by UUID. A lookup always
//! returns a handle; callers check `is_loaded` before trusting it, since
//! a miss yields an unloaded handle rather than an error. Prefab content
//! persists as ron text files built from the intermediate representation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::scene::prefab::Prefab;
use crate::scene::registry::ResolveMode;
use crate::scene::scene_manager::SceneManager;
use crate::serialization::scene as scene_codec;
use crate::serialization::value::SerializedObject;

/// Errors produced by resource operations
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The resource file could not be read or written
    #[error("resource io error: {0}")]
    Io(#[from] std::io::Error),

    /// The resource file could not be parsed
    #[error("resource parse error: {0}")]
    Parse(String),

    /// No resource with the given identity is registered
    #[error("resource {0} is not registered")]
    NotRegistered(Uuid),

    /// Decoding stored prefab content failed
    #[error("resource decode error: {0}")]
    Decode(#[from] crate::core::error::SceneError),
}

/// Handle to a registered resource
///
/// May point at an unloaded resource; `is_loaded` is the check callers
/// make before trusting `get`.
pub struct ResourceHandle<T> {
    uuid: Uuid,
    resource: Option<Rc<RefCell<T>>>,
}

impl<T> ResourceHandle<T> {
    fn loaded(uuid: Uuid, resource: Rc<RefCell<T>>) -> Self {
        Self {
            uuid,
            resource: Some(resource),
        }
    }

    fn unloaded(uuid: Uuid) -> Self {
        Self {
            uuid,
            resource: None,
        }
    }

    /// Identity of the resource this handle refers to
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Whether the resource is resident
    ///
    /// The `block` flag requests a blocking load in loaders that stream
    /// from disk; lookups here resolve immediately, so it is accepted and
    /// ignored.
    pub fn is_loaded(&self, _block: bool) -> bool {
        self.resource.is_some()
    }

    /// The resident resource, `None` when unloaded
    pub fn get(&self) -> Option<Rc<RefCell<T>>> {
        self.resource.clone()
    }
}

impl<T> Clone for ResourceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            uuid: self.uuid,
            resource: self.resource.clone(),
        }
    }
}

/// Serialized form of a prefab resource
#[derive(Serialize, Deserialize)]
struct PrefabFile {
    uuid: Uuid,
    hash: u32,
    is_scene: bool,
    root: SerializedObject,
}

/// Tracks prefab resources by UUID
///
/// Owns the resident prefabs; everything else refers to them through
/// [`ResourceHandle`]s.
#[derive(Default)]
pub struct ResourceManager {
    prefabs: RefCell<HashMap<Uuid, Rc<RefCell<Prefab>>>>,
}

impl ResourceManager {
    /// Create an empty resource manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prefab under its own UUID
    pub fn add(&self, prefab: Prefab) -> ResourceHandle<Prefab> {
        let uuid = prefab.uuid();
        let resource = Rc::new(RefCell::new(prefab));
        self.prefabs
            .borrow_mut()
            .insert(uuid, Rc::clone(&resource));
        debug!("registered prefab resource {uuid}");
        ResourceHandle::loaded(uuid, resource)
    }

    /// Look up a prefab resource
    ///
    /// Always returns a handle; a miss yields an unloaded one.
    pub fn load_from_uuid(&self, uuid: Uuid) -> ResourceHandle<Prefab> {
        match self.prefabs.borrow().get(&uuid) {
            Some(resource) => ResourceHandle::loaded(uuid, Rc::clone(resource)),
            None => ResourceHandle::unloaded(uuid),
        }
    }

    /// Whether a resource with this identity is resident
    pub fn is_registered(&self, uuid: Uuid) -> bool {
        self.prefabs.borrow().contains_key(&uuid)
    }

    /// Number of resident prefab resources
    pub fn prefab_count(&self) -> usize {
        self.prefabs.borrow().len()
    }

    /// Evict every prefab no outstanding handle refers to
    ///
    /// Stored content of evicted prefabs is destroyed immediately.
    /// Returns the number of evicted resources.
    pub fn unload_all_unused(&self) -> usize {
        let unused: Vec<Uuid> = self
            .prefabs
            .borrow()
            .iter()
            .filter(|(_, resource)| Rc::strong_count(resource) == 1)
            .map(|(uuid, _)| *uuid)
            .collect();
        for uuid in &unused {
            let removed = self.prefabs.borrow_mut().remove(uuid);
            if let Some(resource) = removed {
                let root = resource.borrow().root();
                if !root.is_destroyed() {
                    root.destroy(true);
                }
                debug!("unloaded prefab resource {uuid}");
            }
        }
        if !unused.is_empty() {
            info!("unloaded {} unused prefab resource(s)", unused.len());
        }
        unused.len()
    }

    /// Persist a registered prefab as a ron file
    ///
    /// # Errors
    ///
    /// Returns an error when the prefab is not registered or the file
    /// cannot be written.
    pub fn save_prefab(&self, uuid: Uuid, path: impl AsRef<Path>) -> Result<(), ResourceError> {
        let resource = self
            .load_from_uuid(uuid)
            .get()
            .ok_or(ResourceError::NotRegistered(uuid))?;
        let file = {
            let prefab = resource.borrow();
            PrefabFile {
                uuid: prefab.uuid(),
                hash: prefab.hash(),
                is_scene: prefab.is_scene(),
                root: scene_codec::encode_scene_object(&prefab.root()),
            }
        };
        let text = ron::ser::to_string_pretty(&file, ron::ser::PrettyConfig::default())
            .map_err(|err| ResourceError::Parse(err.to_string()))?;
        std::fs::write(path, text)?;
        info!("saved prefab resource {uuid}");
        Ok(())
    }

    /// Load a prefab from a ron file, registering it by its stored UUID
    ///
    /// The stored hierarchy is decoded into `scene`'s registry as inert
    /// content.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed, or the
    /// stored hierarchy fails to decode.
    pub fn load_prefab(
        &self,
        scene: &SceneManager,
        path: impl AsRef<Path>,
    ) -> Result<ResourceHandle<Prefab>, ResourceError> {
        let text = std::fs::read_to_string(path)?;
        let file: PrefabFile =
            ron::from_str(&text).map_err(|err| ResourceError::Parse(err.to_string()))?;

        let ctx = scene.context();
        ctx.registry
            .borrow_mut()
            .start_deserialization(ResolveMode::USE_NEW_IDS);
        let decoded = scene_codec::decode_scene_object(ctx, &file.root);
        ctx.registry.borrow_mut().end_deserialization();
        let root = decoded?;

        let prefab = Prefab::from_stored(file.uuid, root, file.hash, file.is_scene);
        info!("loaded prefab resource {}", file.uuid);
        Ok(self.add(prefab))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_resource_reads_as_unloaded() {
        let resources = ResourceManager::new();
        let handle = resources.load_from_uuid(Uuid::new_v4());
        assert!(!handle.is_loaded(false));
        assert!(handle.get().is_none());
    }

    #[test]
    fn test_empty_manager_has_nothing_to_unload() {
        let resources = ResourceManager::new();
        assert_eq!(resources.unload_all_unused(), 0);
        assert_eq!(resources.prefab_count(), 0);
    }
}
