//! Scene objects: positionable nodes of the scene-object tree
//!
//! A scene object owns its child objects and components (ownership is
//! logical; the registry holds the actual allocations), carries a local
//! transform plus a lazily recomputed world transform guarded by dirty
//! flags, and derives its effective activation from its own flag and its
//! ancestors. All access goes through [`SceneObjectHandle`]; the struct
//! itself is only reachable by resolving a handle.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use log::{debug, error, warn};
use uuid::Uuid;

use crate::foundation::math::{look_rotation, Mat4, Quat, Transform, Vec3};
use crate::serialization::scene as scene_codec;

use super::component::Component;
use super::handle::{ComponentHandle, InstanceData, SceneObjectHandle};
use super::object::{
    InstanceId, LinkId, Mobility, ObjectCore, SceneObjectFlags, TransformChangedFlags,
};
use super::prefab_diff::PrefabDiff;
use super::registry::{ObjectOwner, ResolveMode};
use super::scene_manager::{self, RunState, SceneContext};

/// A positionable node in the scene-object tree
///
/// Created through [`crate::scene::SceneManager::create_object`] or the
/// clone and prefab machinery, never directly.
pub struct SceneObject {
    core: ObjectCore,
    ctx: Weak<SceneContext>,

    parent: SceneObjectHandle,
    children: Vec<SceneObjectHandle>,
    components: Vec<ComponentHandle>,

    local: Transform,
    cached_local_matrix: Mat4,
    cached_world: Transform,
    cached_world_matrix: Mat4,
    local_dirty: bool,
    world_dirty: bool,
    transform_hash: u32,

    active_self: bool,
    active_hierarchy: bool,
    mobility: Mobility,
    flags: SceneObjectFlags,
    instantiated: bool,

    prefab_link: Option<Uuid>,
    prefab_hash: u32,
    prefab_diff: Option<PrefabDiff>,
}

impl SceneObject {
    pub(crate) fn new(
        name: impl Into<String>,
        flags: SceneObjectFlags,
        ctx: Weak<SceneContext>,
    ) -> Self {
        Self {
            core: ObjectCore::new(name),
            ctx,
            parent: SceneObjectHandle::null(),
            children: Vec::new(),
            components: Vec::new(),
            local: Transform::identity(),
            cached_local_matrix: Mat4::identity(),
            cached_world: Transform::identity(),
            cached_world_matrix: Mat4::identity(),
            local_dirty: false,
            world_dirty: true,
            transform_hash: 0,
            active_self: true,
            active_hierarchy: true,
            mobility: Mobility::Movable,
            flags,
            instantiated: false,
            prefab_link: None,
            prefab_hash: 0,
            prefab_diff: None,
        }
    }

    /// Register a fresh scene object with the context's registry
    pub(crate) fn create_internal(
        ctx: &Rc<SceneContext>,
        name: &str,
        flags: SceneObjectFlags,
        original_id: InstanceId,
    ) -> SceneObjectHandle {
        let object = Rc::new(RefCell::new(Self::new(name, flags, Rc::downgrade(ctx))));
        let handle = ctx
            .registry
            .borrow_mut()
            .register_object(ObjectOwner::SceneObject(Rc::clone(&object)), original_id);
        object.borrow_mut().core.attach_registration(&handle);
        SceneObjectHandle::from(handle)
    }

    /// Shared identity state
    pub fn core(&self) -> &ObjectCore {
        &self.core
    }

    /// Local transform relative to the parent
    pub fn local_transform(&self) -> &Transform {
        &self.local
    }

    /// Attached components, in attach order
    pub fn components(&self) -> &[ComponentHandle] {
        &self.components
    }

    /// Child objects, in attach order
    pub fn children(&self) -> &[SceneObjectHandle] {
        &self.children
    }

    /// Behavior flags
    pub fn flags(&self) -> SceneObjectFlags {
        self.flags
    }

    /// Mobility tier
    pub fn mobility(&self) -> Mobility {
        self.mobility
    }

    /// Explicitly set activation flag
    pub fn active_self(&self) -> bool {
        self.active_self
    }

    /// Derived activation: self AND all ancestors
    pub fn active_hierarchy(&self) -> bool {
        self.active_hierarchy
    }

    /// UUID of the prefab this object is an instance of
    pub fn prefab_link(&self) -> Option<Uuid> {
        self.prefab_link
    }

    /// Structural hash of the prefab version this instance was built from
    pub fn prefab_hash(&self) -> u32 {
        self.prefab_hash
    }

    /// Stored delta against the source prefab, if one was recorded
    pub fn prefab_diff(&self) -> Option<&PrefabDiff> {
        self.prefab_diff.as_ref()
    }

    pub(crate) fn set_instance_id(&mut self, id: InstanceId) {
        self.core.set_instance_id(id);
    }

    pub(crate) fn replace_record(&mut self, record: Rc<RefCell<InstanceData>>) {
        let id = self.core.instance_id();
        self.core.replace_instance_data(record, id);
    }

    pub(crate) fn set_local_parts(&mut self, position: Vec3, rotation: Quat, scale: Vec3) {
        self.local = Transform::new(position, rotation, scale);
        self.local_dirty = true;
        self.world_dirty = true;
    }

    pub(crate) fn set_mobility_silent(&mut self, mobility: Mobility) {
        self.mobility = mobility;
    }

    pub(crate) fn set_active_silent(&mut self, active_self: bool) {
        self.active_self = active_self;
        self.active_hierarchy = active_self;
    }

    pub(crate) fn set_prefab_link(&mut self, link: Option<Uuid>) {
        self.prefab_link = link;
    }

    pub(crate) fn set_prefab_hash(&mut self, hash: u32) {
        self.prefab_hash = hash;
    }

    pub(crate) fn set_link_id(&mut self, link_id: LinkId) {
        self.core.set_link_id(link_id);
    }

    pub(crate) fn push_component(&mut self, component: ComponentHandle) {
        self.components.push(component);
    }

    pub(crate) fn push_child(&mut self, child: SceneObjectHandle) {
        self.children.push(child);
    }

    fn update_local_matrix(&mut self) {
        self.cached_local_matrix = self.local.to_matrix();
        self.local_dirty = false;
    }

    fn update_world_cache(&mut self, parent_world: Option<&Transform>) {
        if self.local_dirty {
            self.update_local_matrix();
        }
        match parent_world {
            Some(parent) => {
                self.cached_world = parent.combine(&self.local);
                self.cached_world_matrix = self.cached_world.to_matrix();
            }
            None => {
                self.cached_world = self.local.clone();
                self.cached_world_matrix = self.cached_local_matrix;
            }
        }
        self.world_dirty = false;
    }

    /// Remove `child` from the child list, preserving order
    ///
    /// # Panics
    ///
    /// Panics when `child` is not actually a child; that indicates
    /// corrupted hierarchy state.
    fn remove_child_handle(&mut self, child: &SceneObjectHandle) {
        let index = self
            .children
            .iter()
            .position(|candidate| candidate.instance_id() == child.instance_id())
            .unwrap_or_else(|| {
                panic!(
                    "object {} is not a child of {}",
                    child.instance_id(),
                    self.core.instance_id()
                )
            });
        self.children.remove(index);
    }
}

impl SceneObjectHandle {
    // ---- identity ----------------------------------------------------

    /// Display name, empty when destroyed
    pub fn name(&self) -> String {
        self.resolve()
            .map(|rc| rc.borrow().core.name().to_string())
            .unwrap_or_default()
    }

    /// Rename the object
    pub fn set_name(&self, name: &str) {
        if let Some(rc) = self.resolve() {
            rc.borrow_mut().core.set_name(name);
        }
    }

    /// Prefab-scoped link id
    pub fn link_id(&self) -> LinkId {
        self.resolve()
            .map_or(super::object::LINK_ID_NONE, |rc| rc.borrow().core.link_id())
    }

    pub(crate) fn set_link_id(&self, link_id: LinkId) {
        if let Some(rc) = self.resolve() {
            rc.borrow_mut().set_link_id(link_id);
        }
    }

    /// Behavior flags
    pub fn flags(&self) -> SceneObjectFlags {
        self.resolve()
            .map_or(SceneObjectFlags::empty(), |rc| rc.borrow().flags)
    }

    /// Set the given flags, leaving others untouched
    pub fn add_flags(&self, flags: SceneObjectFlags) {
        if let Some(rc) = self.resolve() {
            rc.borrow_mut().flags.insert(flags);
        }
    }

    /// Clear the given flags, leaving others untouched
    pub fn remove_flags(&self, flags: SceneObjectFlags) {
        if let Some(rc) = self.resolve() {
            rc.borrow_mut().flags.remove(flags);
        }
    }

    /// UUID of the prefab this object is an instance of
    pub fn prefab_link(&self) -> Option<Uuid> {
        self.resolve().and_then(|rc| rc.borrow().prefab_link)
    }

    pub(crate) fn set_prefab_link(&self, link: Option<Uuid>) {
        if let Some(rc) = self.resolve() {
            rc.borrow_mut().prefab_link = link;
        }
    }

    /// Structural hash of the prefab version this instance was built from
    pub fn prefab_hash(&self) -> u32 {
        self.resolve().map_or(0, |rc| rc.borrow().prefab_hash)
    }

    pub(crate) fn set_prefab_hash(&self, hash: u32) {
        if let Some(rc) = self.resolve() {
            rc.borrow_mut().prefab_hash = hash;
        }
    }

    pub(crate) fn prefab_diff_clone(&self) -> Option<PrefabDiff> {
        self.resolve().and_then(|rc| rc.borrow().prefab_diff.clone())
    }

    pub(crate) fn set_prefab_diff(&self, diff: Option<PrefabDiff>) {
        if let Some(rc) = self.resolve() {
            rc.borrow_mut().prefab_diff = diff;
        }
    }

    /// Whether this object's components have been announced to the scene
    /// manager
    pub fn is_instantiated(&self) -> bool {
        self.resolve().is_some_and(|rc| rc.borrow().instantiated)
    }

    pub(crate) fn context(&self) -> Option<Rc<SceneContext>> {
        self.resolve().and_then(|rc| {
            let ctx = rc.borrow().ctx.upgrade();
            ctx
        })
    }

    // ---- hierarchy ---------------------------------------------------

    /// The parent object, null for roots
    pub fn parent(&self) -> SceneObjectHandle {
        self.resolve()
            .map(|rc| rc.borrow().parent.clone())
            .unwrap_or_else(SceneObjectHandle::null)
    }

    /// Number of child objects
    pub fn child_count(&self) -> usize {
        self.resolve().map_or(0, |rc| rc.borrow().children.len())
    }

    /// Child at `index`
    ///
    /// # Panics
    ///
    /// Panics when `index` is out of range.
    pub fn child(&self, index: usize) -> SceneObjectHandle {
        let Some(rc) = self.resolve() else {
            panic!("child access through a dead handle");
        };
        let object = rc.borrow();
        assert!(
            index < object.children.len(),
            "child index {index} out of range ({} children)",
            object.children.len()
        );
        object.children[index].clone()
    }

    /// Snapshot of the child list
    pub fn children(&self) -> Vec<SceneObjectHandle> {
        self.resolve()
            .map(|rc| rc.borrow().children.clone())
            .unwrap_or_default()
    }

    /// Find a child by name, optionally searching the whole subtree
    ///
    /// Misses are expected: logs at debug level and returns a null handle.
    pub fn find_child(&self, name: &str, recursive: bool) -> SceneObjectHandle {
        for child in self.children() {
            if child.name() == name {
                return child;
            }
            if recursive {
                let found = child.find_child(name, true);
                if !found.is_null() {
                    return found;
                }
            }
        }
        debug!("no child named '{name}' under object {}", self.instance_id());
        SceneObjectHandle::null()
    }

    /// Reparent this object
    ///
    /// No-op when `parent` is destroyed or is this object itself. When
    /// `keep_world_transform` is set (forced for non-movable objects), the
    /// local transform is recomputed so the world transform is preserved
    /// across the move. Fires a combined parent-and-transform change
    /// notification, then re-derives hierarchy activation.
    pub fn set_parent(&self, parent: &SceneObjectHandle, keep_world_transform: bool) {
        let Some(rc) = self.resolve() else {
            warn!("set_parent on a dead scene object handle");
            return;
        };
        if !parent.is_null() && parent.is_destroyed() {
            warn!("cannot parent object {} to a destroyed object", self.instance_id());
            return;
        }
        if !parent.is_null() && parent.instance_id() == self.instance_id() {
            return;
        }
        let (current_parent, movable) = {
            let object = rc.borrow();
            (object.parent.clone(), object.mobility.is_movable())
        };
        if current_parent == *parent {
            return;
        }
        // Reject reparenting under our own subtree
        let mut ancestor = parent.clone();
        while !ancestor.is_null() {
            if ancestor.instance_id() == self.instance_id() {
                warn!("cannot parent object {} under its own descendant", self.instance_id());
                return;
            }
            ancestor = ancestor.parent();
        }

        let keep_world = keep_world_transform || !movable;
        let world = keep_world.then(|| self.world_transform());

        if let Some(old_rc) = current_parent.resolve() {
            old_rc.borrow_mut().remove_child_handle(self);
        }
        if let Some(new_rc) = parent.resolve() {
            new_rc.borrow_mut().push_child(self.clone());
        }
        rc.borrow_mut().parent = parent.clone();

        if let Some(world) = world {
            let local = if parent.is_null() {
                world
            } else {
                world.relative_to(&parent.world_transform())
            };
            let mut object = rc.borrow_mut();
            object.local = local;
            object.local_dirty = true;
        }

        self.notify_transform_changed(
            TransformChangedFlags::PARENT | TransformChangedFlags::TRANSFORM,
        );

        let parent_active = parent.is_null() || parent.active();
        self.set_active_hierarchy_internal(parent_active, true);
    }

    // ---- transform ---------------------------------------------------

    /// Monotonically increasing change counter for cheap external change
    /// detection
    pub fn transform_hash(&self) -> u32 {
        self.resolve().map_or(0, |rc| rc.borrow().transform_hash)
    }

    /// Mobility tier
    pub fn mobility(&self) -> Mobility {
        self.resolve().map_or(Mobility::Movable, |rc| rc.borrow().mobility)
    }

    /// Change the mobility tier, notifying interested components
    pub fn set_mobility(&self, mobility: Mobility) {
        let Some(rc) = self.resolve() else {
            return;
        };
        rc.borrow_mut().mobility = mobility;
        self.notify_transform_changed(TransformChangedFlags::MOBILITY);
    }

    /// Local translation relative to the parent
    pub fn translation(&self) -> Vec3 {
        self.resolve()
            .map_or_else(Vec3::zeros, |rc| rc.borrow().local.position)
    }

    /// Local rotation relative to the parent
    pub fn rotation(&self) -> Quat {
        self.resolve()
            .map_or_else(Quat::identity, |rc| rc.borrow().local.rotation)
    }

    /// Local scale relative to the parent
    pub fn scale(&self) -> Vec3 {
        self.resolve()
            .map_or_else(|| Vec3::new(1.0, 1.0, 1.0), |rc| rc.borrow().local.scale)
    }

    /// Copy of the full local transform
    pub fn local_transform(&self) -> Transform {
        self.resolve()
            .map(|rc| rc.borrow().local.clone())
            .unwrap_or_default()
    }

    /// World-space transform, recomputed lazily
    pub fn world_transform(&self) -> Transform {
        let Some(rc) = self.resolve() else {
            return Transform::identity();
        };
        let (dirty, parent, movable) = {
            let object = rc.borrow();
            (
                object.world_dirty,
                object.parent.clone(),
                object.mobility.is_movable(),
            )
        };
        if dirty {
            // Non-movable objects never inherit the parent transform
            let parent_world =
                (movable && !parent.is_destroyed()).then(|| parent.world_transform());
            rc.borrow_mut().update_world_cache(parent_world.as_ref());
        }
        let world = rc.borrow().cached_world.clone();
        world
    }

    /// World-space position
    pub fn world_position(&self) -> Vec3 {
        self.world_transform().position
    }

    /// World-space rotation
    pub fn world_rotation(&self) -> Quat {
        self.world_transform().rotation
    }

    /// Cached world matrix, recomputed lazily
    pub fn world_matrix(&self) -> Mat4 {
        let _ = self.world_transform();
        self.resolve()
            .map_or_else(Mat4::identity, |rc| rc.borrow().cached_world_matrix)
    }

    /// Inverse of the world matrix
    pub fn inv_world_matrix(&self) -> Mat4 {
        self.world_transform().inverse().to_matrix()
    }

    /// Cached local matrix, recomputed lazily
    pub fn local_matrix(&self) -> Mat4 {
        let Some(rc) = self.resolve() else {
            return Mat4::identity();
        };
        {
            let mut object = rc.borrow_mut();
            if object.local_dirty {
                object.update_local_matrix();
            }
        }
        let matrix = rc.borrow().cached_local_matrix;
        matrix
    }

    fn mutate_local(&self, mutate: impl FnOnce(&mut Transform)) {
        let Some(rc) = self.resolve() else {
            warn!("transform mutation on a dead scene object handle");
            return;
        };
        {
            let mut object = rc.borrow_mut();
            if !object.mobility.is_movable() {
                return;
            }
            mutate(&mut object.local);
            object.local_dirty = true;
        }
        self.notify_transform_changed(TransformChangedFlags::TRANSFORM);
    }

    /// Set the local translation
    pub fn set_translation(&self, translation: Vec3) {
        self.mutate_local(|local| local.position = translation);
    }

    /// Set the local rotation
    pub fn set_rotation(&self, rotation: Quat) {
        self.mutate_local(|local| local.rotation = rotation);
    }

    /// Set the local scale
    pub fn set_scale(&self, scale: Vec3) {
        self.mutate_local(|local| local.scale = scale);
    }

    /// Translate by `delta` in parent space
    pub fn move_by(&self, delta: Vec3) {
        self.mutate_local(|local| local.position += delta);
    }

    /// Translate by `delta` rotated into this object's local orientation
    pub fn move_relative(&self, delta: Vec3) {
        self.mutate_local(|local| {
            let rotated = local.rotation * delta;
            local.position += rotated;
        });
    }

    /// Apply `rotation` on top of the current local rotation
    pub fn rotate(&self, rotation: Quat) {
        self.mutate_local(|local| local.rotation = rotation * local.rotation);
    }

    /// Rotate around the local Z axis
    pub fn roll(&self, angle: f32) {
        self.mutate_local(|local| {
            local.rotation = local.rotation * Quat::from_axis_angle(&Vec3::z_axis(), angle);
        });
    }

    /// Rotate around the local Y axis
    pub fn yaw(&self, angle: f32) {
        self.mutate_local(|local| {
            local.rotation = local.rotation * Quat::from_axis_angle(&Vec3::y_axis(), angle);
        });
    }

    /// Rotate around the local X axis
    pub fn pitch(&self, angle: f32) {
        self.mutate_local(|local| {
            local.rotation = local.rotation * Quat::from_axis_angle(&Vec3::x_axis(), angle);
        });
    }

    /// Set the world-space translation
    pub fn set_world_translation(&self, position: Vec3) {
        let parent = self.parent();
        let local = if parent.is_destroyed() {
            position
        } else {
            parent.world_transform().inverse().transform_point(position)
        };
        self.set_translation(local);
    }

    /// Set the world-space rotation
    pub fn set_world_rotation(&self, rotation: Quat) {
        let parent = self.parent();
        let local = if parent.is_destroyed() {
            rotation
        } else {
            parent.world_transform().rotation.inverse() * rotation
        };
        self.set_rotation(local);
    }

    /// Orient the object so its forward axis points at `target`
    pub fn look_at(&self, target: Vec3, up: Vec3) {
        let direction = target - self.world_position();
        self.set_forward(direction, up);
    }

    /// Orient the object so its forward axis points along `direction`
    pub fn set_forward(&self, direction: Vec3, up: Vec3) {
        self.set_world_rotation(look_rotation(direction, up));
    }

    /// Restore transform fields bypassing the mobility gate
    ///
    /// Used by diff application, which must reproduce recorded state even
    /// on anchored objects.
    pub(crate) fn restore_local_parts(
        &self,
        position: Option<Vec3>,
        rotation: Option<Quat>,
        scale: Option<Vec3>,
    ) {
        let Some(rc) = self.resolve() else {
            return;
        };
        {
            let mut object = rc.borrow_mut();
            if let Some(position) = position {
                object.local.position = position;
            }
            if let Some(rotation) = rotation {
                object.local.rotation = rotation;
            }
            if let Some(scale) = scale {
                object.local.scale = scale;
            }
            object.local_dirty = true;
        }
        self.notify_transform_changed(TransformChangedFlags::TRANSFORM);
    }

    /// Deliver a transform-changed notification
    ///
    /// Non-movable objects strip the transform bit from what their
    /// components see, but force their dirty flags and bump the hash so
    /// externally driven repositioning of anchors still invalidates
    /// caches. Components receive the callback only if they opted in via
    /// their notify mask and either carry the always-run flag or the
    /// global state is Running. The mobility bit is local to this object
    /// and is stripped before recursing into children.
    pub fn notify_transform_changed(&self, flags: TransformChangedFlags) {
        if flags.is_empty() {
            return;
        }
        let Some(rc) = self.resolve() else {
            return;
        };
        let ctx = {
            let object = rc.borrow();
            object.ctx.upgrade()
        };
        let (delivered, child_flags, components, children) = {
            let mut object = rc.borrow_mut();
            let mut delivered = flags;
            if !object.mobility.is_movable() {
                delivered.remove(TransformChangedFlags::TRANSFORM);
                object.local_dirty = true;
            }
            object.world_dirty = true;
            object.transform_hash = object.transform_hash.wrapping_add(1);
            let child_flags = flags.difference(TransformChangedFlags::MOBILITY);
            (
                delivered,
                child_flags,
                object.components.clone(),
                object.children.clone(),
            )
        };

        if !delivered.is_empty() {
            let global_running = ctx
                .as_ref()
                .is_some_and(|ctx| ctx.state.get() == RunState::Running);
            for handle in &components {
                let Some(component) = handle.resolve() else {
                    continue;
                };
                // A component that drove this change from its own callback
                // is still borrowed; it needs no notification
                let Ok(borrowed) = component.try_borrow() else {
                    continue;
                };
                let wants = borrowed.core().notify_flags().intersects(delivered);
                let always_run = borrowed.core().always_run();
                drop(borrowed);
                if wants && (always_run || global_running) {
                    component.borrow_mut().on_transform_changed(delivered);
                }
            }
        }

        if !child_flags.is_empty() {
            for child in &children {
                child.notify_transform_changed(child_flags);
            }
        }
    }

    // ---- activation --------------------------------------------------

    /// Explicitly set activation flag
    pub fn active_self(&self) -> bool {
        self.resolve().is_some_and(|rc| rc.borrow().active_self)
    }

    /// Derived activation: self AND all ancestors active
    pub fn active(&self) -> bool {
        self.resolve().is_some_and(|rc| rc.borrow().active_hierarchy)
    }

    /// Set the explicit activation flag and re-derive hierarchy state
    pub fn set_active(&self, active: bool) {
        let Some(rc) = self.resolve() else {
            warn!("set_active on a dead scene object handle");
            return;
        };
        let parent = {
            let mut object = rc.borrow_mut();
            object.active_self = active;
            object.parent.clone()
        };
        let parent_active = parent.is_null() || parent.active();
        self.set_active_hierarchy_internal(parent_active, true);
    }

    /// Recompute derived activation from `parent_active`
    ///
    /// Children always re-derive even when this node's own state did not
    /// change, since a no-op here can still mean first-time propagation.
    pub(crate) fn set_active_hierarchy_internal(&self, parent_active: bool, trigger_events: bool) {
        let Some(rc) = self.resolve() else {
            return;
        };
        let ctx = rc.borrow().ctx.upgrade();
        let (changed, new_state, components, children) = {
            let mut object = rc.borrow_mut();
            let new_state = parent_active && object.active_self;
            let changed = new_state != object.active_hierarchy;
            object.active_hierarchy = new_state;
            (
                changed,
                new_state,
                object.components.clone(),
                object.children.clone(),
            )
        };

        if changed && trigger_events {
            if let Some(ctx) = &ctx {
                for component in &components {
                    if new_state {
                        scene_manager::notify_component_activated(ctx, component);
                    } else {
                        scene_manager::notify_component_deactivated(ctx, component);
                    }
                }
            }
        }

        for child in &children {
            child.set_active_hierarchy_internal(new_state, trigger_events);
        }
    }

    // ---- components --------------------------------------------------

    /// Snapshot of the attached components
    pub fn components(&self) -> Vec<ComponentHandle> {
        self.resolve()
            .map(|rc| rc.borrow().components.clone())
            .unwrap_or_default()
    }

    /// First attached component of the concrete type `C`
    pub fn component_of<C: Component>(&self) -> Option<ComponentHandle> {
        self.components()
            .into_iter()
            .find(|handle| handle.with::<C, _>(|_| ()).is_some())
    }

    /// Attach a component to this object
    ///
    /// Fires `on_created` (and, depending on run state, `on_initialized`
    /// and `on_enabled`) once this hierarchy is instantiated.
    pub fn add_component<C: Component + 'static>(&self, component: C) -> ComponentHandle {
        let Some(rc) = self.resolve() else {
            warn!("add_component on a dead scene object handle");
            return ComponentHandle::null();
        };
        let ctx = rc.borrow().ctx.upgrade();
        let Some(ctx) = ctx else {
            warn!("add_component on an object with no scene context");
            return ComponentHandle::null();
        };

        let component: Rc<RefCell<dyn Component>> = Rc::new(RefCell::new(component));
        let handle = ctx
            .registry
            .borrow_mut()
            .register_object(ObjectOwner::Component(Rc::clone(&component)), 0);
        component
            .borrow_mut()
            .core_mut()
            .attach(&handle, self.clone(), Rc::downgrade(&ctx));

        let component_handle = ComponentHandle::from(handle);
        let instantiated = {
            let mut object = rc.borrow_mut();
            object.components.push(component_handle.clone());
            object.instantiated
        };
        if instantiated {
            scene_manager::notify_component_created(&ctx, &component_handle);
        }
        component_handle
    }

    // ---- lifecycle ---------------------------------------------------

    /// Announce this hierarchy's components to the scene manager
    ///
    /// Objects flagged with `DONT_INSTANTIATE` are skipped along with
    /// their whole subtree. Instantiating twice is a no-op.
    pub fn instantiate(&self) {
        let Some(rc) = self.resolve() else {
            return;
        };
        let ctx = rc.borrow().ctx.upgrade();
        let (skip, was_instantiated, components, children) = {
            let mut object = rc.borrow_mut();
            if object.flags.contains(SceneObjectFlags::DONT_INSTANTIATE) {
                (true, true, Vec::new(), Vec::new())
            } else {
                let was = object.instantiated;
                object.instantiated = true;
                (
                    false,
                    was,
                    object.components.clone(),
                    object.children.clone(),
                )
            }
        };
        if skip {
            debug!("skipping instantiate of object {}", self.instance_id());
            return;
        }
        if !was_instantiated {
            if let Some(ctx) = &ctx {
                for component in &components {
                    scene_manager::notify_component_created(ctx, component);
                }
            }
        }
        for child in &children {
            child.instantiate();
        }
    }

    /// Destroy this object, immediately or at the end of the frame
    ///
    /// Detaches from the parent, then either tears the subtree down right
    /// away (children first, components back to front) or enqueues with
    /// the registry's destroy queue. Destroying a dead handle logs and
    /// does nothing.
    pub fn destroy(&self, immediate: bool) {
        let Some(rc) = self.resolve() else {
            warn!("destroy requested for a dead scene object handle");
            return;
        };
        let parent = rc.borrow().parent.clone();
        if let Some(parent_rc) = parent.resolve() {
            parent_rc.borrow_mut().remove_child_handle(self);
        }
        rc.borrow_mut().parent = SceneObjectHandle::null();
        self.destroy_internal(immediate);
    }

    pub(crate) fn destroy_internal(&self, immediate: bool) {
        let Some(rc) = self.resolve() else {
            return;
        };
        let ctx = rc.borrow().ctx.upgrade();
        let Some(ctx) = ctx else {
            return;
        };
        if immediate {
            let children = rc.borrow().children.clone();
            for child in &children {
                child.destroy_internal(true);
            }
            rc.borrow_mut().children.clear();

            // Components are destroyed back to front; each is removed from
            // its owning list before its destroyed callback fires
            loop {
                let component = rc.borrow().components.last().cloned();
                let Some(component) = component else {
                    break;
                };
                scene_manager::destroy_component_internal(&ctx, &component, true);
            }

            rc.borrow_mut().core.mark_destroyed();
            ctx.registry
                .borrow_mut()
                .unregister_object(self.as_game_object());
        } else {
            ctx.registry
                .borrow_mut()
                .queue_for_destroy(self.as_game_object());
        }
    }

    /// Attach a decoded child without firing notifications
    pub(crate) fn attach_child_internal(&self, child: &SceneObjectHandle) {
        if let Some(rc) = self.resolve() {
            rc.borrow_mut().push_child(child.clone());
        }
        if let Some(child_rc) = child.resolve() {
            child_rc.borrow_mut().parent = self.clone();
        }
    }

    pub(crate) fn remove_component_entry(&self, component: &ComponentHandle) {
        if let Some(rc) = self.resolve() {
            let mut object = rc.borrow_mut();
            if let Some(index) = object
                .components
                .iter()
                .position(|candidate| candidate.instance_id() == component.instance_id())
            {
                object.components.remove(index);
            }
        }
    }

    // ---- cloning -----------------------------------------------------

    /// Produce a structurally identical, identity-distinct copy of this
    /// subtree
    ///
    /// The copy is detached and inert; when `instantiate` is set its
    /// components are announced to the scene manager before returning.
    pub fn clone_object(&self, instantiate: bool) -> SceneObjectHandle {
        let Some(ctx) = self.context() else {
            warn!("clone of a dead scene object handle");
            return SceneObjectHandle::null();
        };
        let encoded = scene_codec::encode_scene_object(self);
        ctx.registry
            .borrow_mut()
            .start_deserialization(ResolveMode::USE_NEW_IDS | ResolveMode::RESTORE_EXTERNAL);
        let result = scene_codec::decode_scene_object(&ctx, &encoded);
        ctx.registry.borrow_mut().end_deserialization();

        match result {
            Ok(copy) => {
                if instantiate {
                    copy.instantiate();
                }
                copy
            }
            Err(err) => {
                error!("clone of object {} failed: {err}", self.instance_id());
                SceneObjectHandle::null()
            }
        }
    }
}
