//! Structural deltas between a prefab and one of its instances
//!
//! A diff mirrors the prefab hierarchy: per-object scalar overrides, the
//! children and components that were added or removed, field-level
//! component diffs, and nested child diffs. Matching is purely by link
//! id; names and types are never consulted. Link ids are assumed stable
//! and non-reused within one prefab lineage, so a recycled id across
//! independent edits could mismatch entities. That hazard is accepted
//! behavior, not something this module tries to repair.

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, warn};

use crate::foundation::math::{Quat, Vec3};
use crate::serialization::diff::generate_diff;
use crate::serialization::scene as scene_codec;
use crate::serialization::type_registry::DecodeContext;
use crate::serialization::value::SerializedObject;

use super::handle::{ComponentHandle, GameObjectHandle, InstanceData, SceneObjectHandle};
use super::object::{InstanceId, LinkId, SceneObjectDiffFlags, SceneObjectFlags, LINK_ID_NONE};
use super::registry::ResolveMode;
use super::scene_manager::{self, SceneContext};

/// Field-level delta for one component matched by link id
#[derive(Debug, Clone)]
pub struct PrefabComponentDiff {
    /// Link id of the component within the prefab
    pub id: LinkId,
    /// Partial field tree: only the fields that changed
    pub data: SerializedObject,
}

/// Delta for one object of the prefab hierarchy
#[derive(Debug, Clone, Default)]
pub struct PrefabObjectDiff {
    /// Link id of the object within the prefab
    pub id: LinkId,
    /// Which scalar fields changed
    pub so_flags: SceneObjectDiffFlags,
    /// Overridden name, when the NAME bit is set
    pub name: Option<String>,
    /// Overridden local translation, when the TRANSLATION bit is set
    pub translation: Option<Vec3>,
    /// Overridden local rotation, when the ROTATION bit is set
    pub rotation: Option<Quat>,
    /// Overridden local scale, when the SCALE bit is set
    pub scale: Option<Vec3>,
    /// Overridden explicit active flag, when the ACTIVE bit is set
    pub active: Option<bool>,
    /// Children added on the instance, in serialized form
    pub added_children: Vec<SerializedObject>,
    /// Link ids of prefab children removed on the instance
    pub removed_children: Vec<LinkId>,
    /// Components added on the instance, in serialized form
    pub added_components: Vec<SerializedObject>,
    /// Link ids of prefab components removed on the instance
    pub removed_components: Vec<LinkId>,
    /// Field diffs of components present on both sides
    pub component_diffs: Vec<PrefabComponentDiff>,
    /// Nested diffs of children present on both sides
    pub child_diffs: Vec<PrefabObjectDiff>,
}

impl PrefabObjectDiff {
    fn is_empty(&self) -> bool {
        self.so_flags.is_empty()
            && self.added_children.is_empty()
            && self.removed_children.is_empty()
            && self.added_components.is_empty()
            && self.removed_components.is_empty()
            && self.component_diffs.is_empty()
            && self.child_diffs.is_empty()
    }
}

/// Top-level delta between a prefab's canonical hierarchy and one
/// instantiated, locally modified copy of it
#[derive(Debug, Clone)]
pub struct PrefabDiff {
    root: PrefabObjectDiff,
}

/// Find a direct child carrying `link_id`
pub(crate) fn find_child_by_link(
    parent: &SceneObjectHandle,
    link_id: LinkId,
) -> Option<SceneObjectHandle> {
    if link_id == LINK_ID_NONE {
        return None;
    }
    parent
        .children()
        .into_iter()
        .find(|child| child.link_id() == link_id)
}

/// Find a direct component carrying `link_id`
pub(crate) fn find_component_by_link(
    owner: &SceneObjectHandle,
    link_id: LinkId,
) -> Option<ComponentHandle> {
    if link_id == LINK_ID_NONE {
        return None;
    }
    owner
        .components()
        .into_iter()
        .find(|component| component.link_id() == link_id)
}

/// Temporary rename of an instance object's indirection record, so handle
/// fields encode identically on both sides of the comparison. Only the
/// record is touched; the registry's id map stays untouched.
struct IdRename {
    record: Rc<RefCell<InstanceData>>,
    original: InstanceId,
    staged: InstanceId,
}

impl IdRename {
    fn stage(&self) {
        self.record.borrow_mut().instance_id = self.staged;
    }

    fn restore(&self) {
        self.record.borrow_mut().instance_id = self.original;
    }
}

fn push_rename(out: &mut Vec<IdRename>, instance: &GameObjectHandle, staged: InstanceId) {
    if let Some(record) = instance.data() {
        out.push(IdRename {
            record: Rc::clone(record),
            original: instance.instance_id(),
            staged,
        });
    }
}

fn collect_renames(
    prefab: &SceneObjectHandle,
    instance: &SceneObjectHandle,
    out: &mut Vec<IdRename>,
) {
    for prefab_component in prefab.components() {
        if let Some(instance_component) =
            find_component_by_link(instance, prefab_component.link_id())
        {
            push_rename(
                out,
                instance_component.as_game_object(),
                prefab_component.instance_id(),
            );
        }
    }
    for prefab_child in prefab.children() {
        if let Some(instance_child) = find_child_by_link(instance, prefab_child.link_id()) {
            push_rename(
                out,
                instance_child.as_game_object(),
                prefab_child.instance_id(),
            );
            collect_renames(&prefab_child, &instance_child, out);
        }
    }
}

fn encode_payload(component: &ComponentHandle) -> SerializedObject {
    component
        .resolve()
        .map_or_else(|| SerializedObject::new(""), |rc| rc.borrow().encode())
}

fn generate_object_diff(
    prefab: &SceneObjectHandle,
    instance: &SceneObjectHandle,
) -> Option<PrefabObjectDiff> {
    let mut diff = PrefabObjectDiff {
        id: instance.link_id(),
        ..PrefabObjectDiff::default()
    };

    if instance.name() != prefab.name() {
        diff.so_flags.insert(SceneObjectDiffFlags::NAME);
        diff.name = Some(instance.name());
    }
    let prefab_local = prefab.local_transform();
    let instance_local = instance.local_transform();
    if instance_local.position != prefab_local.position {
        diff.so_flags.insert(SceneObjectDiffFlags::TRANSLATION);
        diff.translation = Some(instance_local.position);
    }
    if instance_local.rotation != prefab_local.rotation {
        diff.so_flags.insert(SceneObjectDiffFlags::ROTATION);
        diff.rotation = Some(instance_local.rotation);
    }
    if instance_local.scale != prefab_local.scale {
        diff.so_flags.insert(SceneObjectDiffFlags::SCALE);
        diff.scale = Some(instance_local.scale);
    }
    if instance.active_self() != prefab.active_self() {
        diff.so_flags.insert(SceneObjectDiffFlags::ACTIVE);
        diff.active = Some(instance.active_self());
    }

    for prefab_child in prefab.children() {
        let link_id = prefab_child.link_id();
        if link_id == LINK_ID_NONE {
            continue;
        }
        match find_child_by_link(instance, link_id) {
            Some(instance_child) => {
                if let Some(child_diff) = generate_object_diff(&prefab_child, &instance_child) {
                    diff.child_diffs.push(child_diff);
                }
            }
            None => diff.removed_children.push(link_id),
        }
    }
    for instance_child in instance.children() {
        if instance_child.link_id() == LINK_ID_NONE
            && !instance_child.flags().contains(SceneObjectFlags::DONT_SAVE)
        {
            diff.added_children
                .push(scene_codec::encode_scene_object(&instance_child));
        }
    }

    for prefab_component in prefab.components() {
        let link_id = prefab_component.link_id();
        if link_id == LINK_ID_NONE {
            continue;
        }
        match find_component_by_link(instance, link_id) {
            Some(instance_component) => {
                let prefab_fields = encode_payload(&prefab_component);
                let instance_fields = encode_payload(&instance_component);
                if let Some(data) = generate_diff(&prefab_fields, &instance_fields) {
                    diff.component_diffs
                        .push(PrefabComponentDiff { id: link_id, data });
                }
            }
            None => diff.removed_components.push(link_id),
        }
    }
    for instance_component in instance.components() {
        if instance_component.link_id() == LINK_ID_NONE {
            diff.added_components
                .push(scene_codec::encode_component(&instance_component));
        }
    }

    if diff.is_empty() {
        None
    } else {
        Some(diff)
    }
}

impl PrefabDiff {
    /// Compute the delta between a prefab hierarchy and an instance of it
    ///
    /// Returns `None` when the two roots are not instances of the same
    /// prefab, or when nothing differs anywhere in the tree. While
    /// comparing, every instance object's id is temporarily renamed to
    /// its structurally matching prefab object's id, so embedded handle
    /// fields compare as identical instead of "different because it is a
    /// different clone"; original ids are restored before returning.
    pub fn create(
        prefab_root: &SceneObjectHandle,
        instance_root: &SceneObjectHandle,
    ) -> Option<PrefabDiff> {
        let prefab_link = prefab_root.prefab_link();
        if prefab_link.is_none() || prefab_link != instance_root.prefab_link() {
            warn!("prefab diff requested across unrelated prefabs");
            return None;
        }

        let mut renames = Vec::new();
        push_rename(
            &mut renames,
            instance_root.as_game_object(),
            prefab_root.instance_id(),
        );
        collect_renames(prefab_root, instance_root, &mut renames);

        for rename in &renames {
            rename.stage();
        }
        let root = generate_object_diff(prefab_root, instance_root);
        for rename in &renames {
            rename.restore();
        }

        root.map(|root| PrefabDiff { root })
    }

    /// The root object delta
    pub fn root(&self) -> &PrefabObjectDiff {
        &self.root
    }

    /// Replay this delta onto a subtree structurally analogous to the
    /// original prefab
    ///
    /// Runs under a registry deserialization session (joining the active
    /// one if the caller already started it). Per node: scalar overrides
    /// first, then removals, then additions (added entries land at the
    /// end of their collections), then component field diffs, then child
    /// recursion by link id. Added content is decoded but deliberately
    /// not instantiated; the caller instantiates the whole result once
    /// every diff in the batch has been applied.
    pub fn apply(&self, target: &SceneObjectHandle) {
        let Some(ctx) = target.context() else {
            warn!("prefab diff applied to a dead handle");
            return;
        };
        let owns_session = !ctx.registry.borrow().deserialization_active();
        if owns_session {
            ctx.registry
                .borrow_mut()
                .start_deserialization(ResolveMode::USE_NEW_IDS | ResolveMode::RESTORE_EXTERNAL);
        }
        apply_object_diff(&ctx, &self.root, target);
        if owns_session {
            ctx.registry.borrow_mut().end_deserialization();
        }
    }
}

fn apply_object_diff(ctx: &Rc<SceneContext>, diff: &PrefabObjectDiff, target: &SceneObjectHandle) {
    if diff.so_flags.contains(SceneObjectDiffFlags::NAME) {
        if let Some(name) = &diff.name {
            target.set_name(name);
        }
    }
    let translation = diff
        .so_flags
        .contains(SceneObjectDiffFlags::TRANSLATION)
        .then_some(diff.translation)
        .flatten();
    let rotation = diff
        .so_flags
        .contains(SceneObjectDiffFlags::ROTATION)
        .then_some(diff.rotation)
        .flatten();
    let scale = diff
        .so_flags
        .contains(SceneObjectDiffFlags::SCALE)
        .then_some(diff.scale)
        .flatten();
    if translation.is_some() || rotation.is_some() || scale.is_some() {
        target.restore_local_parts(translation, rotation, scale);
    }
    if diff.so_flags.contains(SceneObjectDiffFlags::ACTIVE) {
        if let Some(active) = diff.active {
            target.set_active(active);
        }
    }

    // Removals strictly before additions; consumers depend on added
    // entries landing at the end of their collections
    for link_id in &diff.removed_components {
        match find_component_by_link(target, *link_id) {
            Some(component) => scene_manager::destroy_component_internal(ctx, &component, true),
            None => debug!("removed component {link_id} not present on target"),
        }
    }
    for link_id in &diff.removed_children {
        match find_child_by_link(target, *link_id) {
            Some(child) => child.destroy(true),
            None => debug!("removed child {link_id} not present on target"),
        }
    }

    for data in &diff.added_components {
        if let Err(err) = scene_codec::decode_component_into(ctx, target, data) {
            warn!("failed to re-add component from diff: {err}");
        }
    }
    for data in &diff.added_children {
        match scene_codec::decode_scene_object(ctx, data) {
            Ok(child) => {
                target.attach_child_internal(&child);
                child.set_active_hierarchy_internal(target.active(), false);
            }
            Err(err) => warn!("failed to re-add child from diff: {err}"),
        }
    }

    for component_diff in &diff.component_diffs {
        match find_component_by_link(target, component_diff.id) {
            Some(component) => {
                if let Some(rc) = component.resolve() {
                    let mut registry = ctx.registry.borrow_mut();
                    let mut decode_ctx = DecodeContext::new(&mut registry);
                    if let Err(err) = rc
                        .borrow_mut()
                        .apply_patch(&component_diff.data, &mut decode_ctx)
                    {
                        warn!("failed to patch component {}: {err}", component_diff.id);
                    }
                }
            }
            None => debug!("diffed component {} not present on target", component_diff.id),
        }
    }

    for child_diff in &diff.child_diffs {
        match find_child_by_link(target, child_diff.id) {
            Some(child) => apply_object_diff(ctx, child_diff, &child),
            None => debug!("diffed child {} not present on target", child_diff.id),
        }
    }
}
