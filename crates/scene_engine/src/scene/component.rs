//! Component trait and shared component state
//!
//! Components are behavior units owned by exactly one scene object. Their
//! lifecycle callbacks are capability-style trait methods, every one with
//! a default no-op body, so a concrete component only overrides what it
//! cares about. Which callbacks actually fire is governed by the scene
//! manager's run state, the owner's activation, and the per-component
//! always-run override.
//!
//! Callback ordering on creation: `on_created` fires as soon as the
//! component is attached to an instantiated hierarchy, regardless of run
//! state. `on_initialized` and `on_enabled` follow immediately unless the
//! global state is Stopped (and the component lacks the always-run flag),
//! in which case the component is parked until the state changes. On
//! destruction, `on_disabled` fires if the component is currently enabled,
//! then `on_destroyed` fires, at the moment the component is actually torn
//! down rather than when a deferred destroy was requested.

use std::any::Any;
use std::rc::{Rc, Weak};

use log::warn;

use crate::core::error::SceneError;
use crate::foundation::math::{Aabb, Vec3};
use crate::serialization::type_registry::DecodeContext;
use crate::serialization::value::SerializedObject;

use super::handle::{ComponentHandle, GameObjectHandle, SceneObjectHandle};
use super::object::{ComponentFlags, LinkId, ObjectCore, TransformChangedFlags};
use super::scene_manager::{self, SceneContext, SceneManagerId};

/// Upcast support for downcasting trait objects to concrete components
pub trait AsAny: Any {
    /// Borrow as `Any`
    fn as_any(&self) -> &dyn Any;
    /// Mutably borrow as `Any`
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// State shared by every component, embedded in each concrete type
#[derive(Debug)]
pub struct ComponentCore {
    object: ObjectCore,
    owner: SceneObjectHandle,
    flags: ComponentFlags,
    notify_flags: TransformChangedFlags,
    scene_manager_id: SceneManagerId,
    ctx: Weak<SceneContext>,
}

impl ComponentCore {
    /// Create an unattached core with the given display name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            object: ObjectCore::new(name),
            owner: SceneObjectHandle::null(),
            flags: ComponentFlags::empty(),
            notify_flags: TransformChangedFlags::empty(),
            scene_manager_id: SceneManagerId::NONE,
            ctx: Weak::new(),
        }
    }

    /// Builder: set behavior flags
    pub fn with_flags(mut self, flags: ComponentFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Builder: opt in to transform-changed notifications
    pub fn with_notify_flags(mut self, notify_flags: TransformChangedFlags) -> Self {
        self.notify_flags = notify_flags;
        self
    }

    /// The scene object this component is attached to
    pub fn owner(&self) -> &SceneObjectHandle {
        &self.owner
    }

    /// Behavior flags
    pub fn flags(&self) -> ComponentFlags {
        self.flags
    }

    /// Replace the behavior flags
    pub fn set_flags(&mut self, flags: ComponentFlags) {
        self.flags = flags;
    }

    /// Whether this component ignores the global pause/stop state
    pub fn always_run(&self) -> bool {
        self.flags.contains(ComponentFlags::ALWAYS_RUN)
    }

    /// Which transform-changed notifications this component wants
    pub fn notify_flags(&self) -> TransformChangedFlags {
        self.notify_flags
    }

    /// Replace the transform-changed opt-in mask
    pub fn set_notify_flags(&mut self, notify_flags: TransformChangedFlags) {
        self.notify_flags = notify_flags;
    }

    /// Shared identity state
    pub fn object(&self) -> &ObjectCore {
        &self.object
    }

    pub(crate) fn object_mut(&mut self) -> &mut ObjectCore {
        &mut self.object
    }

    pub(crate) fn scene_manager_id(&self) -> SceneManagerId {
        self.scene_manager_id
    }

    pub(crate) fn set_scene_manager_id(&mut self, id: SceneManagerId) {
        self.scene_manager_id = id;
    }

    pub(crate) fn context(&self) -> Option<Rc<SceneContext>> {
        self.ctx.upgrade()
    }

    pub(crate) fn attach(
        &mut self,
        handle: &GameObjectHandle,
        owner: SceneObjectHandle,
        ctx: Weak<SceneContext>,
    ) {
        self.object.attach_registration(handle);
        self.owner = owner;
        self.ctx = ctx;
    }
}

/// Behavior unit attached to a scene object
///
/// Implementors embed a [`ComponentCore`] and expose it through `core` /
/// `core_mut`; everything else defaults to a no-op.
pub trait Component: AsAny {
    /// Shared component state
    fn core(&self) -> &ComponentCore;

    /// Shared component state, mutably
    fn core_mut(&mut self) -> &mut ComponentCore;

    /// Stable reflective type name, matching the registered decoder
    fn type_key(&self) -> &'static str;

    /// Encode this component's own fields to the intermediate form
    fn encode(&self) -> SerializedObject;

    /// Apply a partial field tree produced by diffing
    ///
    /// Only fields present in `patch` change; handle fields resolve
    /// through `ctx` at the end of the surrounding session.
    ///
    /// # Errors
    ///
    /// Returns an error when a present field holds the wrong value kind.
    fn apply_patch(
        &mut self,
        patch: &SerializedObject,
        ctx: &mut DecodeContext<'_>,
    ) -> Result<(), SceneError>;

    /// Fired once when the component joins an instantiated hierarchy
    fn on_created(&mut self) {}

    /// Fired when resources are acquired, before the first enable
    fn on_initialized(&mut self) {}

    /// Fired when the component starts receiving updates
    fn on_enabled(&mut self) {}

    /// Fired when the component stops receiving updates
    fn on_disabled(&mut self) {}

    /// Fired when the component is torn down
    fn on_destroyed(&mut self) {}

    /// Fired when the owner's transform, parent or mobility changes,
    /// filtered by the core's notify mask
    fn on_transform_changed(&mut self, _flags: TransformChangedFlags) {}

    /// Per-frame update
    fn update(&mut self, _dt: f32) {}

    /// Per-fixed-step update
    fn fixed_update(&mut self, _dt: f32) {}

    /// Report world-space bounds
    ///
    /// The default reports a zero-volume point at the owner's position and
    /// returns `false`, meaning "no real bounds".
    fn calculate_bounds(&self, bounds: &mut Aabb) -> bool {
        let position = self.core().owner().world_position();
        *bounds = Aabb::from_center_extents(position, Vec3::zeros());
        false
    }
}

/// Decode support for a concrete component type
///
/// The narrow slice of the reflection framework the scene-graph core
/// depends on: each concrete type knows how to rebuild itself from the
/// intermediate form.
pub trait ReflectComponent: Component + Sized {
    /// Stable reflective type name
    const TYPE_KEY: &'static str;

    /// Rebuild a component from its encoded fields
    ///
    /// # Errors
    ///
    /// Returns an error when required fields are missing or malformed.
    fn decode(data: &SerializedObject, ctx: &mut DecodeContext<'_>) -> Result<Self, SceneError>;
}

impl ComponentHandle {
    /// Display name of the component, empty when destroyed
    pub fn name(&self) -> String {
        self.resolve()
            .map(|rc| rc.borrow().core().object().name().to_string())
            .unwrap_or_default()
    }

    /// Prefab-scoped link id
    pub fn link_id(&self) -> LinkId {
        self.resolve().map_or(super::object::LINK_ID_NONE, |rc| {
            rc.borrow().core().object().link_id()
        })
    }

    pub(crate) fn set_link_id(&self, link_id: LinkId) {
        if let Some(rc) = self.resolve() {
            rc.borrow_mut().core_mut().object_mut().set_link_id(link_id);
        }
    }

    /// The scene object this component is attached to
    pub fn owner(&self) -> SceneObjectHandle {
        self.resolve()
            .map(|rc| rc.borrow().core().owner().clone())
            .unwrap_or_else(SceneObjectHandle::null)
    }

    /// Whether this component ignores the global pause/stop state
    pub fn always_run(&self) -> bool {
        self.resolve()
            .is_some_and(|rc| rc.borrow().core().always_run())
    }

    /// Run a closure against the concrete component type
    ///
    /// Returns `None` when the handle is dead or the type does not match.
    pub fn with<C: Component, R>(&self, f: impl FnOnce(&C) -> R) -> Option<R> {
        let rc = self.resolve()?;
        let borrowed = rc.borrow();
        let concrete = (*borrowed).as_any().downcast_ref::<C>()?;
        Some(f(concrete))
    }

    /// Run a closure against the concrete component type, mutably
    pub fn with_mut<C: Component, R>(&self, f: impl FnOnce(&mut C) -> R) -> Option<R> {
        let rc = self.resolve()?;
        let mut borrowed = rc.borrow_mut();
        let concrete = (*borrowed).as_any_mut().downcast_mut::<C>()?;
        Some(f(concrete))
    }

    /// Destroy this component, immediately or at the end of the frame
    ///
    /// Destroying a dead handle logs and does nothing.
    pub fn destroy(&self, immediate: bool) {
        let Some(rc) = self.resolve() else {
            warn!("destroy requested for a dead component handle");
            return;
        };
        let ctx = rc.borrow().core().context();
        let Some(ctx) = ctx else {
            warn!("destroy requested for a detached component");
            return;
        };
        scene_manager::destroy_component_internal(&ctx, self, immediate);
    }
}
