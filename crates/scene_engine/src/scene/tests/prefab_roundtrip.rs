//! Prefab templating, structural diffing and instance refresh

use std::rc::Rc;

use crate::assets::ResourceManager;
use crate::scene::{
    Prefab, PrefabDiff, PrefabUtility, SceneManager, SceneObjectDiffFlags, SceneObjectFlags,
    LINK_ID_NONE,
};
use crate::serialization::value::SerializedValue;

use super::Spinner;

fn scene_with_spinner() -> SceneManager {
    let scene = SceneManager::new();
    scene.register_component_type::<Spinner>();
    scene
}

#[test]
fn test_prefab_create_stamps_identity() {
    let scene = scene_with_spinner();
    let source = scene.create_object("turret", SceneObjectFlags::empty());
    let barrel = scene.create_object("barrel", SceneObjectFlags::empty());
    barrel.set_parent(&source, false);
    source.add_component(Spinner::new(1.0));

    let prefab = Prefab::create(&source, false).unwrap();
    assert_eq!(source.prefab_link(), Some(prefab.uuid()));
    assert_eq!(prefab.root().prefab_link(), Some(prefab.uuid()));
    assert_eq!(prefab.hash(), 0);
    assert!(!prefab.is_scene());

    // Link ids cover the whole subtree and survive the stored clone
    assert_ne!(source.link_id(), LINK_ID_NONE);
    assert_ne!(barrel.link_id(), LINK_ID_NONE);
    assert_ne!(source.components()[0].link_id(), LINK_ID_NONE);
    assert_eq!(prefab.root().child_count(), 1);
    assert_eq!(prefab.root().child(0).link_id(), barrel.link_id());
}

#[test]
fn test_prefab_update_bumps_hash() {
    let scene = scene_with_spinner();
    let source = scene.create_object("crate", SceneObjectFlags::empty());
    let mut prefab = Prefab::create(&source, false).unwrap();
    assert_eq!(prefab.hash(), 0);

    prefab.update(&source);
    assert_eq!(prefab.hash(), 1);
    assert_eq!(source.prefab_link(), Some(prefab.uuid()));
}

#[test]
fn test_prefab_strips_dont_save_children() {
    let scene = scene_with_spinner();
    let source = scene.create_object("level", SceneObjectFlags::empty());
    let keep = scene.create_object("keep", SceneObjectFlags::empty());
    keep.set_parent(&source, false);
    let debug = scene.create_object("debug", SceneObjectFlags::DONT_SAVE);
    debug.set_parent(&source, false);

    let prefab = Prefab::create(&source, false).unwrap();
    // The source keeps its child; only the stored copy is stripped
    assert_eq!(source.child_count(), 2);
    assert_eq!(prefab.root().child_count(), 1);
    assert_eq!(prefab.root().child(0).name(), "keep");
}

#[test]
fn test_unmodified_instance_yields_no_diff() {
    let scene = scene_with_spinner();
    let resources = ResourceManager::new();
    let source = scene.create_object("emitter", SceneObjectFlags::empty());
    let nozzle = scene.create_object("nozzle", SceneObjectFlags::empty());
    nozzle.set_parent(&source, false);
    nozzle.add_component(Spinner::new(1.0));

    let prefab = Prefab::create(&source, false).unwrap();
    let instance = prefab.instantiate(&resources);
    instance.set_parent(&scene.root(), false);

    assert!(PrefabDiff::create(&prefab.root(), &instance).is_none());
}

#[test]
fn test_internal_references_compare_equal_across_clones() {
    let scene = scene_with_spinner();
    let resources = ResourceManager::new();
    let source = scene.create_object("launcher", SceneObjectFlags::empty());
    let nozzle = scene.create_object("nozzle", SceneObjectFlags::empty());
    nozzle.set_parent(&source, false);
    let spinner = source.add_component(Spinner::new(1.0));
    spinner
        .with_mut::<Spinner, _>(|s| s.target = nozzle.as_game_object().clone())
        .unwrap();

    let prefab = Prefab::create(&source, false).unwrap();
    let instance = prefab.instantiate(&resources);
    instance.set_parent(&scene.root(), false);

    // The instance's reference points at its own clone of the nozzle; the
    // temporary id rename makes it compare equal to the template's
    assert!(PrefabDiff::create(&prefab.root(), &instance).is_none());
}

#[test]
fn test_diff_rejects_unrelated_roots() {
    let scene = scene_with_spinner();
    let a = scene.create_object("a", SceneObjectFlags::empty());
    let b = scene.create_object("b", SceneObjectFlags::empty());
    let prefab_a = Prefab::create(&a, false).unwrap();
    let _prefab_b = Prefab::create(&b, false).unwrap();

    assert!(PrefabDiff::create(&prefab_a.root(), &b).is_none());
}

#[test]
fn test_prefab_diff_round_trip() {
    let scene = scene_with_spinner();
    let resources = ResourceManager::new();

    let source = scene.create_object("emitter", SceneObjectFlags::empty());
    let nozzle = scene.create_object("nozzle", SceneObjectFlags::empty());
    nozzle.set_parent(&source, false);
    nozzle.add_component(Spinner::new(1.0));

    let prefab = Prefab::create(&source, false).unwrap();

    let instance = prefab.instantiate(&resources);
    instance.set_parent(&scene.root(), false);
    instance.set_name("emitter prime");
    let instance_nozzle = instance.child(0);
    let spinner = instance_nozzle.components()[0].clone();
    spinner.with_mut::<Spinner, _>(|s| s.speed = 2.0).unwrap();

    let diff = PrefabDiff::create(&prefab.root(), &instance).expect("difference detected");
    let root_diff = diff.root();
    assert!(root_diff.so_flags.contains(SceneObjectDiffFlags::NAME));
    assert_eq!(root_diff.name.as_deref(), Some("emitter prime"));
    assert_eq!(root_diff.child_diffs.len(), 1);

    let child_diff = &root_diff.child_diffs[0];
    assert_eq!(child_diff.id, instance_nozzle.link_id());
    assert_eq!(child_diff.component_diffs.len(), 1);
    assert_eq!(child_diff.component_diffs[0].id, spinner.link_id());
    assert_eq!(
        child_diff.component_diffs[0]
            .data
            .get("speed")
            .and_then(SerializedValue::as_float),
        Some(2.0)
    );

    // Replaying the delta onto a fresh instantiation reproduces the
    // overrides
    let fresh = prefab.instantiate(&resources);
    fresh.set_parent(&scene.root(), false);
    diff.apply(&fresh);
    assert_eq!(fresh.name(), "emitter prime");
    let fresh_speed = fresh.child(0).components()[0]
        .with::<Spinner, _>(|s| s.speed)
        .unwrap();
    assert!((fresh_speed - 2.0).abs() < f32::EPSILON);
}

#[test]
fn test_diff_apply_removes_before_adding() {
    let scene = scene_with_spinner();
    let resources = ResourceManager::new();
    let source = scene.create_object("rack", SceneObjectFlags::empty());
    source.add_component(Spinner::new(1.0));
    source.add_component(Spinner::new(2.0));
    let prefab = Prefab::create(&source, false).unwrap();

    let instance = prefab.instantiate(&resources);
    instance.set_parent(&scene.root(), false);
    let removed_link = instance.components()[0].link_id();
    let kept_link = instance.components()[1].link_id();
    instance.components()[0].destroy(true);
    instance.add_component(Spinner::new(9.0));

    let diff = PrefabDiff::create(&prefab.root(), &instance).unwrap();
    assert_eq!(diff.root().removed_components, vec![removed_link]);
    assert_eq!(diff.root().added_components.len(), 1);

    let fresh = prefab.instantiate(&resources);
    fresh.set_parent(&scene.root(), false);
    diff.apply(&fresh);

    let components = fresh.components();
    assert_eq!(components.len(), 2);
    assert_eq!(components[0].link_id(), kept_link);
    // The re-added component lands at the end, unlinked
    assert_eq!(components[1].link_id(), LINK_ID_NONE);
    let speed = components[1].with::<Spinner, _>(|s| s.speed).unwrap();
    assert!((speed - 9.0).abs() < f32::EPSILON);
}

#[test]
fn test_diff_records_added_and_removed_children() {
    let scene = scene_with_spinner();
    let resources = ResourceManager::new();
    let source = scene.create_object("squad", SceneObjectFlags::empty());
    let scout = scene.create_object("scout", SceneObjectFlags::empty());
    scout.set_parent(&source, false);
    let prefab = Prefab::create(&source, false).unwrap();

    let instance = prefab.instantiate(&resources);
    instance.set_parent(&scene.root(), false);
    let scout_link = instance.child(0).link_id();
    instance.child(0).destroy(true);
    let recruit = scene.create_object("recruit", SceneObjectFlags::empty());
    recruit.set_parent(&instance, false);

    let diff = PrefabDiff::create(&prefab.root(), &instance).unwrap();
    assert_eq!(diff.root().removed_children, vec![scout_link]);
    assert_eq!(diff.root().added_children.len(), 1);

    let fresh = prefab.instantiate(&resources);
    fresh.set_parent(&scene.root(), false);
    diff.apply(&fresh);
    assert_eq!(fresh.child_count(), 1);
    assert_eq!(fresh.child(0).name(), "recruit");
    assert_eq!(fresh.child(0).link_id(), LINK_ID_NONE);
}

#[test]
fn test_update_from_prefab_preserves_overrides_and_handles() {
    let scene = scene_with_spinner();
    let resources = ResourceManager::new();

    let template = scene.create_object("tower", SceneObjectFlags::empty());
    let gun = scene.create_object("gun", SceneObjectFlags::empty());
    gun.set_parent(&template, false);
    gun.add_component(Spinner::new(1.0));

    let prefab = Prefab::create(&template, false).unwrap();
    let resource = resources.add(prefab);
    let uuid = resource.uuid();

    let instance = resource.get().unwrap().borrow().instantiate(&resources);
    instance.set_parent(&scene.root(), false);
    instance.set_name("tower east");

    // Handles held before the refresh must keep tracking the rebuilt
    // objects afterwards
    let old_gun = instance.child(0);
    let old_spinner = old_gun.components()[0].clone();

    // Record the override, then advance the template
    PrefabUtility::record_prefab_diff(&resources, &instance);
    gun.components()[0]
        .with_mut::<Spinner, _>(|s| s.speed = 5.0)
        .unwrap();
    resource.get().unwrap().borrow_mut().update(&template);
    assert_ne!(
        instance.prefab_hash(),
        resource.get().unwrap().borrow().hash()
    );

    PrefabUtility::update_from_prefab(&resources, &instance);

    assert_eq!(instance.name(), "tower east");
    assert_eq!(
        instance.prefab_hash(),
        resource.get().unwrap().borrow().hash()
    );
    assert_eq!(instance.prefab_link(), Some(uuid));

    // The template change reached the rebuilt instance through the stale
    // handles captured before the refresh
    let speed = old_spinner.with::<Spinner, _>(|s| s.speed).unwrap();
    assert!((speed - 5.0).abs() < f32::EPSILON);
    assert_eq!(old_gun.name(), "gun");
    assert!(Rc::ptr_eq(
        &old_gun.parent().resolve().unwrap(),
        &instance.resolve().unwrap()
    ));
    assert!(instance.is_instantiated());
}

#[test]
fn test_refreshed_instance_can_be_destroyed_through_old_handles() {
    let scene = scene_with_spinner();
    let resources = ResourceManager::new();

    let template = scene.create_object("mine", SceneObjectFlags::empty());
    template.add_component(Spinner::new(1.0));
    let resource = resources.add(Prefab::create(&template, false).unwrap());

    let instance = resource.get().unwrap().borrow().instantiate(&resources);
    instance.set_parent(&scene.root(), false);
    let id = instance.instance_id();
    let root_children_before = scene.root().child_count();

    resource.get().unwrap().borrow_mut().update(&template);
    PrefabUtility::update_from_prefab(&resources, &instance);

    // The rebuilt object answers to the old identity
    assert_eq!(instance.instance_id(), id);
    assert!(scene.try_get_object(id).is_some());

    // Tearing down through the pre-refresh handle leaves the tree clean
    instance.destroy(true);
    assert!(instance.is_destroyed());
    assert!(scene.try_get_object(id).is_none());
    assert_eq!(scene.root().child_count(), root_children_before - 1);
}

#[test]
fn test_nested_instance_roots_join_outer_id_space() {
    let scene = scene_with_spinner();
    let resources = ResourceManager::new();

    let wheel_template = scene.create_object("wheel", SceneObjectFlags::empty());
    wheel_template.add_component(Spinner::new(1.0));
    let wheel_resource = resources.add(Prefab::create(&wheel_template, false).unwrap());

    let cart = scene.create_object("cart", SceneObjectFlags::empty());
    let wheel = wheel_resource.get().unwrap().borrow().instantiate(&resources);
    wheel.set_parent(&cart, false);
    let inner_spinner_link = wheel.components()[0].link_id();

    let cart_prefab = Prefab::create(&cart, false).unwrap();

    // The nested root carries an id in the outer space; its interior
    // keeps the inner template's ids
    assert_ne!(wheel.link_id(), LINK_ID_NONE);
    assert_eq!(wheel.components()[0].link_id(), inner_spinner_link);
    assert_eq!(wheel.prefab_link(), Some(wheel_resource.uuid()));

    // A fresh instance matches the outer template across the nesting
    // boundary, so nothing diffs
    let instance = cart_prefab.instantiate(&resources);
    instance.set_parent(&scene.root(), false);
    assert!(PrefabDiff::create(&cart_prefab.root(), &instance).is_none());
}

#[test]
fn test_instantiate_refreshes_stale_nested_instances() {
    let scene = scene_with_spinner();
    let resources = ResourceManager::new();

    let wheel_template = scene.create_object("wheel", SceneObjectFlags::empty());
    wheel_template.add_component(Spinner::new(1.0));
    let wheel_resource = resources.add(Prefab::create(&wheel_template, false).unwrap());

    let cart = scene.create_object("cart", SceneObjectFlags::empty());
    let wheel = wheel_resource.get().unwrap().borrow().instantiate(&resources);
    wheel.set_parent(&cart, false);
    let cart_prefab = Prefab::create(&cart, false).unwrap();

    // Advance the inner template after the outer prefab stored its copy
    wheel_template.components()[0]
        .with_mut::<Spinner, _>(|s| s.speed = 7.0)
        .unwrap();
    wheel_resource
        .get()
        .unwrap()
        .borrow_mut()
        .update(&wheel_template);

    // Instantiating the outer prefab refreshes the stale nested copy
    // before producing the new hierarchy
    let instance = cart_prefab.instantiate(&resources);
    instance.set_parent(&scene.root(), false);
    let speed = instance.child(0).components()[0]
        .with::<Spinner, _>(|s| s.speed)
        .unwrap();
    assert!((speed - 7.0).abs() < f32::EPSILON);
    assert_eq!(
        instance.child(0).prefab_hash(),
        wheel_resource.get().unwrap().borrow().hash()
    );
}

#[test]
fn test_unload_all_unused_evicts_unreferenced_prefabs() {
    let scene = scene_with_spinner();
    let resources = ResourceManager::new();
    let source = scene.create_object("crate", SceneObjectFlags::empty());
    let prefab = Prefab::create(&source, false).unwrap();
    let stored_root = prefab.root();
    let uuid = {
        let handle = resources.add(prefab);
        handle.uuid()
    };

    assert!(resources.load_from_uuid(uuid).is_loaded(false));
    let evicted = resources.unload_all_unused();
    assert_eq!(evicted, 1);
    assert!(!resources.load_from_uuid(uuid).is_loaded(false));
    assert!(stored_root.is_destroyed());
}

#[test]
fn test_prefab_save_load_roundtrip() {
    let scene = scene_with_spinner();
    let resources = ResourceManager::new();
    let source = scene.create_object("pickup", SceneObjectFlags::empty());
    source.add_component(Spinner::new(3.0));
    let glow = scene.create_object("glow", SceneObjectFlags::empty());
    glow.set_parent(&source, false);

    let prefab = Prefab::create(&source, false).unwrap();
    let uuid = prefab.uuid();
    resources.add(prefab);

    let path = std::env::temp_dir().join("scene_engine_prefab_roundtrip.ron");
    resources.save_prefab(uuid, &path).unwrap();

    let other_scene = scene_with_spinner();
    let other_resources = ResourceManager::new();
    let handle = other_resources.load_prefab(&other_scene, &path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(handle.uuid(), uuid);
    let restored = handle.get().unwrap();
    let root = restored.borrow().root();
    assert_eq!(root.name(), "pickup");
    assert_eq!(root.prefab_link(), Some(uuid));
    assert_eq!(root.child_count(), 1);
    assert_eq!(root.child(0).name(), "glow");
    let speed = root.components()[0].with::<Spinner, _>(|s| s.speed).unwrap();
    assert!((speed - 3.0).abs() < f32::EPSILON);
}
