//! Scene-graph and game-object core
//!
//! Provides the object identity layer (registry + weak handles), the
//! scene-object tree with its transform hierarchy and activation state,
//! the component lifecycle state machine driven by the scene manager's
//! run state, and prefab templating with structural diffing.
//!
//! ## Architecture
//!
//! ```text
//! SceneManager (run state, dispatch lists)
//!      ↓ owns
//! SceneObject tree (transforms, activation)
//!      ↓ owns
//! Components (behavior units)
//!      ↕ registered in
//! ObjectRegistry (identity, deferred destruction, sessions)
//! ```
//!
//! Prefab, PrefabDiff and PrefabUtility operate on whole subtrees through
//! the registry's deserialization-session protocol, so cross-references
//! stay intact across diff and instantiate cycles.

pub mod component;
pub mod handle;
pub mod object;
pub mod prefab;
pub mod prefab_diff;
pub mod prefab_utility;
pub mod registry;
pub mod scene_manager;
pub mod scene_object;

pub use component::{Component, ComponentCore, ReflectComponent};
pub use handle::{ComponentHandle, GameObjectHandle, SceneObjectHandle};
pub use object::{
    ComponentFlags, InstanceId, LinkId, Mobility, ObjectCore, SceneObjectDiffFlags,
    SceneObjectFlags, TransformChangedFlags, LINK_ID_NONE,
};
pub use prefab::Prefab;
pub use prefab_diff::{PrefabComponentDiff, PrefabDiff, PrefabObjectDiff};
pub use prefab_utility::PrefabUtility;
pub use registry::{ObjectOwner, ObjectRegistry, ResolveMode, SessionCallback};
pub use scene_manager::{ComponentListType, RunState, SceneManager, SceneManagerId, SceneStats};
pub use scene_object::SceneObject;

#[cfg(test)]
mod tests;
