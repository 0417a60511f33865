//! # Scene Engine
//!
//! The scene-graph and game-object core of a modular game engine.
//!
//! ## Features
//!
//! - **Handle-Based Identity**: process-unique instance ids resolved
//!   through shared indirection records, with deferred destruction
//! - **Transform Hierarchy**: lazy world-transform caching with dirty
//!   flagging and a change counter for cheap external change detection
//! - **Component Lifecycle**: a run-state machine (Running / Paused /
//!   Stopped) driving partitioned dispatch lists
//! - **Prefabs**: serializable templates with structural diffing, so
//!   instance overrides survive template updates
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! fn main() {
//!     let scene = SceneManager::new();
//!     let player = scene.create_object("player", SceneObjectFlags::empty());
//!     player.set_translation(Vec3::new(0.0, 1.0, 0.0));
//!
//!     scene.set_state(RunState::Running);
//!     scene.update(1.0 / 60.0);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod core;
pub mod foundation;
pub mod scene;
pub mod serialization;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{ResourceHandle, ResourceManager},
        core::{SceneConfig, SceneError},
        foundation::math::{Aabb, Mat4, Quat, Transform, Vec3},
        scene::{
            Component, ComponentCore, ComponentFlags, ComponentHandle, GameObjectHandle,
            Mobility, Prefab, PrefabDiff, PrefabUtility, ReflectComponent, RunState,
            SceneManager, SceneObjectFlags, SceneObjectHandle, TransformChangedFlags,
        },
        serialization::{DecodeContext, SerializedObject, SerializedValue},
    };
}
