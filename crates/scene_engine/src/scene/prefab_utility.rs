//! Prefab instance maintenance
//!
//! Link-id bookkeeping and the instance refresh path that solves the
//! "instance override survives template update" problem: stale instances
//! are torn down and rebuilt from current prefab content, their recorded
//! overrides are replayed on top, and identity linkage is restored so
//! handles held elsewhere keep tracking the rebuilt objects.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{error, warn};

use crate::assets::ResourceManager;
use crate::serialization::scene as scene_codec;

use super::handle::{GameObjectHandle, InstanceData, SceneObjectHandle};
use super::object::{InstanceId, LinkId, LINK_ID_NONE};
use super::prefab::Prefab;
use super::prefab_diff::PrefabDiff;
use super::registry::ResolveMode;

/// Identity captured from an object about to be torn down
struct CapturedIdentity {
    record: Rc<RefCell<InstanceData>>,
    instance_id: InstanceId,
}

fn capture(handle: &GameObjectHandle) -> Option<CapturedIdentity> {
    handle.data().map(|record| CapturedIdentity {
        record: Rc::clone(record),
        instance_id: handle.instance_id(),
    })
}

/// Stateless helpers for prefab link-id and instance management
pub struct PrefabUtility;

impl PrefabUtility {
    /// Assign unique, monotonically increasing link ids to every
    /// not-yet-linked object and component in the subtree
    ///
    /// Recursion stops at nested prefab boundaries; their id space
    /// belongs to their own template.
    ///
    /// # Panics
    ///
    /// Panics when the link-id space is exhausted. Wraparound would break
    /// structural matching, so it is a fatal internal error.
    pub fn generate_prefab_ids(root: &SceneObjectHandle) {
        let mut max_existing = None;
        scan_max_link_id(root, &mut max_existing);
        let mut next = max_existing.map_or(0, |max: LinkId| max + 1);
        assign_link_ids(root, &mut next);
    }

    /// Reset link ids to the unlinked sentinel
    ///
    /// Always clears the root's components; clears the root object itself
    /// only when `clear_root` is set, and descends into children only when
    /// `recursive` is set. Nested prefab instances lose only their root's
    /// id; their interior belongs to their own template.
    pub fn clear_prefab_ids(root: &SceneObjectHandle, recursive: bool, clear_root: bool) {
        if clear_root {
            root.set_link_id(LINK_ID_NONE);
        }
        for component in root.components() {
            component.set_link_id(LINK_ID_NONE);
        }
        if recursive {
            for child in root.children() {
                if child.prefab_link().is_none() {
                    Self::clear_prefab_ids(&child, true, true);
                } else {
                    child.set_link_id(LINK_ID_NONE);
                }
            }
        }
    }

    /// Record each nested instance's delta against its source prefab
    ///
    /// Call this before updating a template so the overrides survive the
    /// next [`PrefabUtility::update_from_prefab`].
    pub fn record_prefab_diff(resources: &ResourceManager, object: &SceneObjectHandle) {
        let top = nearest_linked_ancestor(object);
        let mut instances = Vec::new();
        collect_instances(&top, true, &mut instances);
        for instance in &instances {
            let Some(link) = instance.prefab_link() else {
                continue;
            };
            let resource = resources.load_from_uuid(link);
            if !resource.is_loaded(false) {
                warn!("prefab {link} is not loaded, skipping diff recording");
                continue;
            }
            let Some(prefab) = resource.get() else {
                continue;
            };
            let diff = PrefabDiff::create(&prefab.borrow().root(), instance);
            instance.set_prefab_diff(diff);
        }
    }

    /// Rebuild every stale prefab instance at or below `object`
    ///
    /// Walks up to the nearest prefab-linked ancestor first, refreshes
    /// stale instances bottom-up (children before the parents that would
    /// tear them down), and instantiates the rebuilt content once at the
    /// end, only if the top-level object was itself already instantiated.
    pub fn update_from_prefab(resources: &ResourceManager, object: &SceneObjectHandle) {
        let top = nearest_linked_ancestor(object);
        let was_instantiated = top.is_instantiated();
        Self::refresh_instances(resources, &top, true);
        if was_instantiated {
            top.instantiate();
        }
    }

    /// Refresh stale instances at or below `root`, bottom-up
    ///
    /// Does not instantiate anything; callers decide when the rebuilt
    /// content goes live.
    pub(crate) fn refresh_instances(
        resources: &ResourceManager,
        root: &SceneObjectHandle,
        include_root: bool,
    ) {
        let mut instances = Vec::new();
        collect_instances(root, include_root, &mut instances);
        for instance in &instances {
            if instance.is_destroyed() {
                continue;
            }
            let Some(link) = instance.prefab_link() else {
                continue;
            };
            let resource = resources.load_from_uuid(link);
            if !resource.is_loaded(false) {
                warn!("prefab {link} is not loaded, skipping instance refresh");
                continue;
            }
            let Some(prefab) = resource.get() else {
                continue;
            };
            if prefab.borrow().hash() == instance.prefab_hash() {
                continue;
            }
            update_single_instance(instance, &prefab);
        }
    }
}

fn nearest_linked_ancestor(object: &SceneObjectHandle) -> SceneObjectHandle {
    let mut current = object.parent();
    while !current.is_null() {
        if current.prefab_link().is_some() {
            return current;
        }
        current = current.parent();
    }
    object.clone()
}

/// Collect prefab-instance roots in post-order, children before parents
fn collect_instances(
    object: &SceneObjectHandle,
    include_self: bool,
    out: &mut Vec<SceneObjectHandle>,
) {
    for child in object.children() {
        collect_instances(&child, true, out);
    }
    if include_self && object.prefab_link().is_some() {
        out.push(object.clone());
    }
}

fn consider_link_id(id: LinkId, max: &mut Option<LinkId>) {
    if id != LINK_ID_NONE && max.map_or(true, |current| id > current) {
        *max = Some(id);
    }
}

fn scan_max_link_id(object: &SceneObjectHandle, max: &mut Option<LinkId>) {
    consider_link_id(object.link_id(), max);
    for component in object.components() {
        consider_link_id(component.link_id(), max);
    }
    for child in object.children() {
        if child.prefab_link().is_none() {
            scan_max_link_id(&child, max);
        } else {
            consider_link_id(child.link_id(), max);
        }
    }
}

fn allocate_link_id(next: &mut LinkId) -> LinkId {
    assert!(*next != LINK_ID_NONE, "prefab link id space exhausted");
    let id = *next;
    *next += 1;
    id
}

fn assign_link_ids(object: &SceneObjectHandle, next: &mut LinkId) {
    if object.link_id() == LINK_ID_NONE {
        object.set_link_id(allocate_link_id(next));
    }
    for component in object.components() {
        if component.link_id() == LINK_ID_NONE {
            component.set_link_id(allocate_link_id(next));
        }
    }
    for child in object.children() {
        if child.prefab_link().is_none() {
            assign_link_ids(&child, next);
        } else if child.link_id() == LINK_ID_NONE {
            // Nested instance roots join this id space; their interior
            // belongs to their own template
            child.set_link_id(allocate_link_id(next));
        }
    }
}

/// Capture linkage within one prefab boundary, stopping at nested
/// instances (their own refresh pass preserved their interiors)
fn collect_linkage(object: &SceneObjectHandle, out: &mut HashMap<LinkId, CapturedIdentity>) {
    for component in object.components() {
        let link = component.link_id();
        if link != LINK_ID_NONE {
            if let Some(identity) = capture(component.as_game_object()) {
                out.insert(link, identity);
            }
        }
    }
    for child in object.children() {
        let link = child.link_id();
        if link != LINK_ID_NONE {
            if let Some(identity) = capture(child.as_game_object()) {
                out.insert(link, identity);
            }
        }
        if child.prefab_link().is_none() {
            collect_linkage(&child, out);
        }
    }
}

fn restore_linkage(
    ctx: &Rc<super::scene_manager::SceneContext>,
    object: &SceneObjectHandle,
    linkage: &mut HashMap<LinkId, CapturedIdentity>,
) {
    for component in object.components() {
        let link = component.link_id();
        if let Some(identity) = linkage.remove(&link) {
            ctx.registry.borrow_mut().adopt_record(
                component.as_game_object(),
                identity.record,
                identity.instance_id,
            );
        }
    }
    for child in object.children() {
        let link = child.link_id();
        let nested = child.prefab_link().is_some();
        if let Some(identity) = linkage.remove(&link) {
            ctx.registry.borrow_mut().adopt_record(
                child.as_game_object(),
                identity.record,
                identity.instance_id,
            );
        }
        if !nested {
            restore_linkage(ctx, &child, linkage);
        }
    }
}

/// Tear down one stale instance and rebuild it from current prefab
/// content, replaying its recorded overrides and restoring identity
fn update_single_instance(instance: &SceneObjectHandle, prefab: &Rc<RefCell<Prefab>>) {
    let Some(ctx) = instance.context() else {
        return;
    };
    let (prefab_root, prefab_hash) = {
        let borrowed = prefab.borrow();
        (borrowed.root(), borrowed.hash())
    };

    let parent = instance.parent();
    let root_link_id = instance.link_id();
    let diff = instance.prefab_diff_clone();

    // Capture identity so handles held elsewhere keep working after the
    // rebuild
    let root_identity = capture(instance.as_game_object());
    let mut linkage = HashMap::new();
    collect_linkage(instance, &mut linkage);

    let encoded = scene_codec::encode_scene_object(&prefab_root);

    ctx.registry
        .borrow_mut()
        .start_deserialization(ResolveMode::USE_NEW_IDS | ResolveMode::RESTORE_EXTERNAL);
    instance.destroy(true);
    let new_root = match scene_codec::decode_scene_object(&ctx, &encoded) {
        Ok(handle) => handle,
        Err(err) => {
            error!("failed to rebuild prefab instance: {err}");
            ctx.registry.borrow_mut().end_deserialization();
            return;
        }
    };
    // The recorded overrides join the same session so their embedded
    // references resolve against the fresh clone
    if let Some(diff) = &diff {
        diff.apply(&new_root);
    }
    ctx.registry.borrow_mut().end_deserialization();

    if let Some(identity) = root_identity {
        ctx.registry
            .borrow_mut()
            .adopt_record(new_root.as_game_object(), identity.record, identity.instance_id);
    }
    restore_linkage(&ctx, &new_root, &mut linkage);

    // Placement is not part of the diff: restore parent and link id
    new_root.set_link_id(root_link_id);
    new_root.set_prefab_hash(prefab_hash);
    new_root.set_prefab_diff(diff);
    if !parent.is_null() {
        new_root.set_parent(&parent, false);
    }
}
