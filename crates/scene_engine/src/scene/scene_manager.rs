//! Scene manager: run-state machine and component dispatch
//!
//! Owns the root of the scene-object tree, the object registry, the
//! component type table and the global run state. Components live in
//! three disjoint lists (active, inactive, uninitialized); each entry is
//! tagged with a packed id (2-bit list tag, 30-bit index) so membership
//! changes are O(1) swap-removals. Which list a component sits in is
//! driven by the global state, its owner's activation, and the
//! per-component always-run override.

use std::cell::{Cell, RefCell, RefMut};
use std::rc::Rc;

use log::warn;

use crate::core::config::SceneConfig;
use crate::serialization::type_registry::ComponentTypeRegistry;

use super::component::ReflectComponent;
use super::handle::{ComponentHandle, GameObjectHandle, SceneObjectHandle};
use super::object::{InstanceId, SceneObjectFlags};
use super::registry::ObjectRegistry;
use super::scene_object::SceneObject;

/// Global run state of the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// All callbacks fire
    Running,
    /// All callbacks except per-frame `update` fire
    Paused,
    /// Only `on_created` and `on_destroyed` fire
    Stopped,
}

/// Which of the scene manager's component lists an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ComponentListType {
    /// Not in any list
    None = 0,
    /// Receiving updates
    Active = 1,
    /// Initialized but not updating
    Inactive = 2,
    /// Created while stopped, waiting for initialization
    Uninitialized = 3,
}

impl ComponentListType {
    /// Decode a 2-bit list tag
    pub fn from_tag(tag: u32) -> Self {
        match tag & 0b11 {
            1 => Self::Active,
            2 => Self::Inactive,
            3 => Self::Uninitialized,
            _ => Self::None,
        }
    }
}

/// Packed (list tag, index) membership id carried by every component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneManagerId(u32);

impl SceneManagerId {
    /// Id meaning "not in any list"
    pub const NONE: Self = Self(0);

    /// Raw packed bits
    pub fn bits(self) -> u32 {
        self.0
    }
}

const INDEX_BITS: u32 = 30;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;

/// Per-frame bookkeeping counters
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneStats {
    /// Components currently receiving updates
    pub active_components: usize,
    /// Components initialized but not updating
    pub inactive_components: usize,
    /// Components waiting for initialization
    pub uninitialized_components: usize,
    /// Total `update` callbacks dispatched
    pub updates_dispatched: u64,
    /// Total `fixed_update` callbacks dispatched
    pub fixed_updates_dispatched: u64,
}

#[derive(Default)]
pub(crate) struct ComponentLists {
    active: Vec<ComponentHandle>,
    inactive: Vec<ComponentHandle>,
    uninitialized: Vec<ComponentHandle>,
}

impl ComponentLists {
    fn list_mut(&mut self, which: ComponentListType) -> &mut Vec<ComponentHandle> {
        match which {
            ComponentListType::Active => &mut self.active,
            ComponentListType::Inactive => &mut self.inactive,
            ComponentListType::Uninitialized => &mut self.uninitialized,
            ComponentListType::None => unreachable!("ComponentListType::None has no list"),
        }
    }
}

/// Shared state reachable from every object in one scene
pub(crate) struct SceneContext {
    pub(crate) registry: RefCell<ObjectRegistry>,
    pub(crate) types: RefCell<ComponentTypeRegistry>,
    pub(crate) state: Cell<RunState>,
    pub(crate) lists: RefCell<ComponentLists>,
    pub(crate) config: SceneConfig,
    pub(crate) stats: RefCell<SceneStats>,
}

fn manager_id(component: &ComponentHandle) -> SceneManagerId {
    component
        .resolve()
        .map_or(SceneManagerId::NONE, |rc| rc.borrow().core().scene_manager_id())
}

fn set_manager_id(component: &ComponentHandle, id: SceneManagerId) {
    if let Some(rc) = component.resolve() {
        rc.borrow_mut().core_mut().set_scene_manager_id(id);
    }
}

fn current_list(component: &ComponentHandle) -> ComponentListType {
    SceneManager::decode_component_id(manager_id(component)).1
}

fn add_to_list(ctx: &SceneContext, component: &ComponentHandle, which: ComponentListType) {
    let id = {
        let mut lists = ctx.lists.borrow_mut();
        let list = lists.list_mut(which);
        list.push(component.clone());
        SceneManager::encode_component_id(u32::try_from(list.len() - 1).unwrap_or(INDEX_MASK), which)
    };
    set_manager_id(component, id);
}

/// Swap-remove a component from whichever list it is in
///
/// # Panics
///
/// Panics when the component's packed id does not decode to its actual
/// position, which means the list accounting is corrupted.
fn remove_from_list(ctx: &SceneContext, component: &ComponentHandle) {
    let (index, which) = SceneManager::decode_component_id(manager_id(component));
    if which == ComponentListType::None {
        return;
    }
    let moved = {
        let mut lists = ctx.lists.borrow_mut();
        let list = lists.list_mut(which);
        let index = index as usize;
        assert!(
            index < list.len() && list[index].instance_id() == component.instance_id(),
            "component list accounting is corrupted"
        );
        list.swap_remove(index);
        (index < list.len()).then(|| (list[index].clone(), index))
    };
    set_manager_id(component, SceneManagerId::NONE);
    if let Some((moved, index)) = moved {
        set_manager_id(
            &moved,
            SceneManager::encode_component_id(u32::try_from(index).unwrap_or(0), which),
        );
    }
}

fn fire_enabled(component: &ComponentHandle) {
    if let Some(rc) = component.resolve() {
        rc.borrow_mut().on_enabled();
    }
}

fn fire_disabled(component: &ComponentHandle) {
    if let Some(rc) = component.resolve() {
        rc.borrow_mut().on_disabled();
    }
}

/// A component joined an instantiated hierarchy
pub(crate) fn notify_component_created(ctx: &Rc<SceneContext>, component: &ComponentHandle) {
    let Some(rc) = component.resolve() else {
        return;
    };
    rc.borrow_mut().on_created();

    let (owner_active, always_run) = {
        let borrowed = rc.borrow();
        (
            borrowed.core().owner().active(),
            borrowed.core().always_run(),
        )
    };
    let state = ctx.state.get();

    if state == RunState::Stopped && !always_run {
        add_to_list(ctx, component, ComponentListType::Uninitialized);
        return;
    }
    rc.borrow_mut().on_initialized();
    if owner_active {
        // While paused the component becomes logically enabled but sits
        // in the inactive list, so no dispatch reaches it until resume
        let list = if always_run || state == RunState::Running {
            ComponentListType::Active
        } else {
            ComponentListType::Inactive
        };
        add_to_list(ctx, component, list);
        rc.borrow_mut().on_enabled();
    } else {
        add_to_list(ctx, component, ComponentListType::Inactive);
    }
}

/// A component's owner became active
pub(crate) fn notify_component_activated(ctx: &Rc<SceneContext>, component: &ComponentHandle) {
    if current_list(component) != ComponentListType::Inactive {
        // Uninitialized components wait for the next state transition
        return;
    }
    let always_run = component.always_run();
    match ctx.state.get() {
        RunState::Running => {
            remove_from_list(ctx, component);
            add_to_list(ctx, component, ComponentListType::Active);
            fire_enabled(component);
        }
        RunState::Paused => {
            // Enabled but parked until the scene resumes; always-run
            // components keep updating through the pause
            if always_run {
                remove_from_list(ctx, component);
                add_to_list(ctx, component, ComponentListType::Active);
            }
            fire_enabled(component);
        }
        RunState::Stopped => {
            if always_run {
                remove_from_list(ctx, component);
                add_to_list(ctx, component, ComponentListType::Active);
                fire_enabled(component);
            }
        }
    }
}

/// A component's owner became inactive
pub(crate) fn notify_component_deactivated(ctx: &Rc<SceneContext>, component: &ComponentHandle) {
    if current_list(component) != ComponentListType::Active {
        return;
    }
    remove_from_list(ctx, component);
    add_to_list(ctx, component, ComponentListType::Inactive);
    fire_disabled(component);
}

/// A component is being torn down
pub(crate) fn notify_component_destroyed(ctx: &Rc<SceneContext>, component: &ComponentHandle) {
    let which = current_list(component);
    if which == ComponentListType::None {
        // Never announced: no callbacks owed
        return;
    }
    remove_from_list(ctx, component);
    let Some(rc) = component.resolve() else {
        return;
    };
    if which == ComponentListType::Active {
        rc.borrow_mut().on_disabled();
    }
    rc.borrow_mut().on_destroyed();
}

/// Tear down or enqueue a single component
pub(crate) fn destroy_component_internal(
    ctx: &Rc<SceneContext>,
    component: &ComponentHandle,
    immediate: bool,
) {
    if immediate {
        // Detach from the owner before any callback can observe us
        component.owner().remove_component_entry(component);
        notify_component_destroyed(ctx, component);
        if let Some(rc) = component.resolve() {
            rc.borrow_mut().core_mut().object_mut().mark_destroyed();
        }
        ctx.registry
            .borrow_mut()
            .unregister_object(component.as_game_object());
    } else {
        ctx.registry
            .borrow_mut()
            .queue_for_destroy(component.as_game_object());
    }
}

pub(crate) fn set_state_internal(ctx: &Rc<SceneContext>, new_state: RunState) {
    let old_state = ctx.state.get();
    if old_state == new_state {
        return;
    }
    ctx.state.set(new_state);

    if old_state == RunState::Stopped {
        // Bounce the components that stayed active while stopped (the
        // always-run ones), refreshing their enabled state
        let active = ctx.lists.borrow().active.clone();
        for component in &active {
            if component.owner().active() {
                fire_disabled(component);
                fire_enabled(component);
            }
        }

        // Promote inactive components whose owners are active
        let inactive = ctx.lists.borrow().inactive.clone();
        for component in &inactive {
            if component.owner().active() && current_list(component) == ComponentListType::Inactive
            {
                remove_from_list(ctx, component);
                add_to_list(ctx, component, ComponentListType::Active);
                fire_enabled(component);
            }
        }

        // Drain the uninitialized list entirely
        let uninitialized = std::mem::take(&mut ctx.lists.borrow_mut().uninitialized);
        for component in &uninitialized {
            set_manager_id(component, SceneManagerId::NONE);
        }
        for component in &uninitialized {
            let Some(rc) = component.resolve() else {
                continue;
            };
            rc.borrow_mut().on_initialized();
            if component.owner().active() {
                add_to_list(ctx, component, ComponentListType::Active);
                rc.borrow_mut().on_enabled();
            } else {
                add_to_list(ctx, component, ComponentListType::Inactive);
            }
        }
    } else if new_state == RunState::Running {
        // Owners may have changed activation while paused; sweep the
        // inactive list for anything that should be running. Components
        // parked by the pause stayed logically enabled, so promotion is
        // silent.
        let inactive = ctx.lists.borrow().inactive.clone();
        for component in &inactive {
            if component.owner().active() && current_list(component) == ComponentListType::Inactive
            {
                remove_from_list(ctx, component);
                add_to_list(ctx, component, ComponentListType::Active);
            }
        }
    }

    match new_state {
        RunState::Running => {}
        RunState::Paused => {
            // Demote silently; components stay logically enabled
            let active = ctx.lists.borrow().active.clone();
            for component in &active {
                if !component.always_run() {
                    remove_from_list(ctx, component);
                    add_to_list(ctx, component, ComponentListType::Inactive);
                }
            }
        }
        RunState::Stopped => {
            let active = ctx.lists.borrow().active.clone();
            for component in &active {
                fire_disabled(component);
                if component.always_run() {
                    // Always-run components never leave the logically
                    // enabled state
                    fire_enabled(component);
                } else {
                    remove_from_list(ctx, component);
                    add_to_list(ctx, component, ComponentListType::Inactive);
                }
            }
        }
    }
}

pub(crate) fn flush_destroy_queue(ctx: &Rc<SceneContext>) {
    let queued_count = ctx.registry.borrow().queued_destroy_count();
    if queued_count > ctx.config.destroy_queue_warn_threshold {
        warn!("destroy queue holds {queued_count} objects, above the configured threshold");
    }
    let queued = ctx.registry.borrow_mut().take_queued_destroys();
    for handle in queued {
        if handle.is_destroyed() {
            continue;
        }
        if handle.scene_object().is_some() {
            SceneObjectHandle::from(handle).destroy_internal(true);
        } else if handle.component().is_some() {
            destroy_component_internal(ctx, &ComponentHandle::from(handle), true);
        }
    }
}

/// Owner of one scene: the object tree root, registry, type table, run
/// state and the component dispatch lists
pub struct SceneManager {
    ctx: Rc<SceneContext>,
    root: SceneObjectHandle,
}

impl Default for SceneManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneManager {
    /// Create a scene with default configuration
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    /// Create a scene with custom configuration
    ///
    /// The scene starts Stopped; move it to Running or Paused through
    /// [`SceneManager::set_state`].
    pub fn with_config(config: SceneConfig) -> Self {
        let ctx = Rc::new(SceneContext {
            registry: RefCell::new(ObjectRegistry::new()),
            types: RefCell::new(ComponentTypeRegistry::new()),
            state: Cell::new(RunState::Stopped),
            lists: RefCell::new(ComponentLists::default()),
            config,
            stats: RefCell::new(SceneStats::default()),
        });
        let root = SceneObject::create_internal(
            &ctx,
            "SceneRoot",
            SceneObjectFlags::INTERNAL | SceneObjectFlags::DONT_SAVE,
            0,
        );
        root.instantiate();
        Self { ctx, root }
    }

    /// Pack a list index and list tag into a membership id
    ///
    /// # Panics
    ///
    /// Panics when `index` does not fit into 30 bits.
    pub fn encode_component_id(index: u32, list_type: ComponentListType) -> SceneManagerId {
        assert!(index <= INDEX_MASK, "component list index out of range");
        SceneManagerId((list_type as u32) << INDEX_BITS | index)
    }

    /// Unpack a membership id into (index, list tag)
    pub fn decode_component_id(id: SceneManagerId) -> (u32, ComponentListType) {
        (
            id.bits() & INDEX_MASK,
            ComponentListType::from_tag(id.bits() >> INDEX_BITS),
        )
    }

    /// Root of the scene-object tree
    pub fn root(&self) -> SceneObjectHandle {
        self.root.clone()
    }

    /// Current global run state
    pub fn state(&self) -> RunState {
        self.ctx.state.get()
    }

    /// Transition the global run state, migrating components between the
    /// dispatch lists and firing lifecycle callbacks as required
    pub fn set_state(&self, state: RunState) {
        set_state_internal(&self.ctx, state);
    }

    /// Create an instantiated scene object parented to the root
    pub fn create_object(&self, name: &str, flags: SceneObjectFlags) -> SceneObjectHandle {
        let handle = SceneObject::create_internal(&self.ctx, name, flags, 0);
        handle.set_parent(&self.root, false);
        handle.instantiate();
        handle
    }

    /// Register a concrete component type for decoding
    pub fn register_component_type<C: ReflectComponent + 'static>(&self) {
        self.ctx.types.borrow_mut().register::<C>();
    }

    /// Per-frame update pass
    ///
    /// Calls `update` on every active component, then flushes the destroy
    /// queue. Components are visited in current list order, which is NOT
    /// a stable priority ordering; callers must not rely on it.
    pub fn update(&self, dt: f32) {
        let snapshot = self.ctx.lists.borrow().active.clone();
        let mut dispatched = 0u64;
        for component in &snapshot {
            if current_list(component) != ComponentListType::Active {
                continue;
            }
            if let Some(rc) = component.resolve() {
                rc.borrow_mut().update(dt);
                dispatched += 1;
            }
        }
        if self.ctx.config.enable_stats {
            self.ctx.stats.borrow_mut().updates_dispatched += dispatched;
        }
        flush_destroy_queue(&self.ctx);
    }

    /// Per-fixed-step update pass
    ///
    /// Calls `fixed_update` on every active component. Does not flush the
    /// destroy queue.
    pub fn fixed_update(&self, dt: f32) {
        let snapshot = self.ctx.lists.borrow().active.clone();
        let mut dispatched = 0u64;
        for component in &snapshot {
            if current_list(component) != ComponentListType::Active {
                continue;
            }
            if let Some(rc) = component.resolve() {
                rc.borrow_mut().fixed_update(dt);
                dispatched += 1;
            }
        }
        if self.ctx.config.enable_stats {
            self.ctx.stats.borrow_mut().fixed_updates_dispatched += dispatched;
        }
    }

    /// Finalize every queued destruction now
    pub fn destroy_queued_objects(&self) {
        flush_destroy_queue(&self.ctx);
    }

    /// Look up a live object by instance id
    pub fn try_get_object(&self, id: InstanceId) -> Option<GameObjectHandle> {
        self.ctx.registry.borrow().try_get_object(id)
    }

    /// Look up a live object, returning a null handle on miss
    pub fn get_object(&self, id: InstanceId) -> GameObjectHandle {
        self.ctx.registry.borrow().get_object(id)
    }

    /// Enqueue an object for end-of-frame destruction
    pub fn queue_for_destroy(&self, handle: &GameObjectHandle) {
        self.ctx.registry.borrow_mut().queue_for_destroy(handle);
    }

    /// Subscribe to object destruction
    pub fn on_object_destroyed(&self, callback: impl FnMut(InstanceId) + 'static) {
        self.ctx.registry.borrow_mut().on_object_destroyed(callback);
    }

    /// Direct mutable access to the object registry
    ///
    /// For advanced use such as driving a deserialization session by
    /// hand. The borrow must not be held across calls back into the scene.
    pub fn registry_mut(&self) -> RefMut<'_, ObjectRegistry> {
        self.ctx.registry.borrow_mut()
    }

    /// Scene configuration
    pub fn config(&self) -> &SceneConfig {
        &self.ctx.config
    }

    /// Current bookkeeping counters and list sizes
    pub fn stats(&self) -> SceneStats {
        let mut stats = *self.ctx.stats.borrow();
        let lists = self.ctx.lists.borrow();
        stats.active_components = lists.active.len();
        stats.inactive_components = lists.inactive.len();
        stats.uninitialized_components = lists.uninitialized.len();
        stats
    }

    pub(crate) fn context(&self) -> &Rc<SceneContext> {
        &self.ctx
    }
}

impl Drop for SceneManager {
    fn drop(&mut self) {
        // Registry teardown contract: queued destructions are finalized
        self.destroy_queued_objects();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_id_roundtrip() {
        let id = SceneManager::encode_component_id(5, ComponentListType::Active);
        assert_eq!(
            SceneManager::decode_component_id(id),
            (5, ComponentListType::Active)
        );

        for (index, list) in [
            (0, ComponentListType::None),
            (1, ComponentListType::Active),
            (77, ComponentListType::Inactive),
            (INDEX_MASK, ComponentListType::Uninitialized),
        ] {
            let id = SceneManager::encode_component_id(index, list);
            assert_eq!(SceneManager::decode_component_id(id), (index, list));
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_component_index_overflow_panics() {
        let _ = SceneManager::encode_component_id(1 << 30, ComponentListType::Active);
    }

    #[test]
    fn test_none_id_decodes_to_no_list() {
        assert_eq!(
            SceneManager::decode_component_id(SceneManagerId::NONE),
            (0, ComponentListType::None)
        );
    }

    #[test]
    fn test_scene_starts_stopped_with_root() {
        let scene = SceneManager::new();
        assert_eq!(scene.state(), RunState::Stopped);
        assert!(!scene.root().is_destroyed());
        assert!(scene.root().flags().contains(SceneObjectFlags::INTERNAL));
    }
}
