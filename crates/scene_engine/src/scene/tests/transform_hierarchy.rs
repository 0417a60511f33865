//! Transform caching, mobility gating and activation propagation

use approx::assert_relative_eq;

use crate::foundation::math::{Quat, Vec3};
use crate::scene::{Mobility, RunState, SceneManager, SceneObjectFlags, TransformChangedFlags};

use super::{log_entries, new_log, Recorder};

const EPSILON: f32 = 1e-5;

#[test]
fn test_world_matrix_reflects_translation() {
    let scene = SceneManager::new();
    let object = scene.create_object("mover", SceneObjectFlags::empty());

    object.set_translation(Vec3::new(1.0, 2.0, 3.0));
    let matrix = object.world_matrix();
    assert_relative_eq!(matrix.m14, 1.0, epsilon = EPSILON);
    assert_relative_eq!(matrix.m24, 2.0, epsilon = EPSILON);
    assert_relative_eq!(matrix.m34, 3.0, epsilon = EPSILON);

    // Unchanged on repeated reads without further mutation
    assert_eq!(object.world_matrix(), matrix);
}

#[test]
fn test_transform_hash_tracks_mutations() {
    let scene = SceneManager::new();
    let object = scene.create_object("counter", SceneObjectFlags::empty());

    let initial = object.transform_hash();
    object.set_translation(Vec3::new(1.0, 0.0, 0.0));
    let after_move = object.transform_hash();
    assert!(after_move > initial);

    object.rotate(Quat::from_axis_angle(&Vec3::y_axis(), 0.5));
    let after_rotate = object.transform_hash();
    assert!(after_rotate > after_move);

    object.move_by(Vec3::new(0.0, 1.0, 0.0));
    assert!(object.transform_hash() > after_rotate);
}

#[test]
fn test_immovable_rejects_mutation() {
    let scene = SceneManager::new();
    let object = scene.create_object("anchor", SceneObjectFlags::empty());
    object.set_mobility(Mobility::Immovable);

    let hash = object.transform_hash();
    object.set_translation(Vec3::new(5.0, 0.0, 0.0));
    object.yaw(1.0);
    assert_eq!(object.transform_hash(), hash);
    assert_eq!(object.translation(), Vec3::zeros());
}

#[test]
fn test_child_inherits_parent_world_transform() {
    let scene = SceneManager::new();
    let parent = scene.create_object("parent", SceneObjectFlags::empty());
    let child = scene.create_object("child", SceneObjectFlags::empty());
    child.set_parent(&parent, false);

    parent.set_translation(Vec3::new(10.0, 0.0, 0.0));
    child.set_translation(Vec3::new(1.0, 0.0, 0.0));

    assert_relative_eq!(
        child.world_position(),
        Vec3::new(11.0, 0.0, 0.0),
        epsilon = EPSILON
    );
}

#[test]
fn test_set_parent_preserves_world_transform() {
    let scene = SceneManager::new();
    let parent = scene.create_object("dock", SceneObjectFlags::empty());
    parent.set_translation(Vec3::new(10.0, 0.0, 0.0));
    let child = scene.create_object("cargo", SceneObjectFlags::empty());
    child.set_translation(Vec3::new(1.0, 0.0, 0.0));

    child.set_parent(&parent, true);
    assert_relative_eq!(
        child.world_position(),
        Vec3::new(1.0, 0.0, 0.0),
        epsilon = EPSILON
    );
    assert_relative_eq!(
        child.translation(),
        Vec3::new(-9.0, 0.0, 0.0),
        epsilon = EPSILON
    );
}

#[test]
fn test_set_parent_rejects_cycles_and_self() {
    let scene = SceneManager::new();
    let a = scene.create_object("a", SceneObjectFlags::empty());
    let b = scene.create_object("b", SceneObjectFlags::empty());
    b.set_parent(&a, false);

    // Reparenting to self is a no-op
    a.set_parent(&a, false);
    assert_ne!(a.parent().instance_id(), a.instance_id());

    // Reparenting under our own descendant is rejected
    a.set_parent(&b, false);
    assert_ne!(a.parent().instance_id(), b.instance_id());
    assert_eq!(b.parent().instance_id(), a.instance_id());
}

#[test]
fn test_immovable_does_not_inherit_parent_transform() {
    let scene = SceneManager::new();
    let parent = scene.create_object("platform", SceneObjectFlags::empty());
    parent.set_translation(Vec3::new(10.0, 0.0, 0.0));
    let child = scene.create_object("bolt", SceneObjectFlags::empty());
    child.set_parent(&parent, false);
    child.set_translation(Vec3::new(1.0, 0.0, 0.0));

    child.set_mobility(Mobility::Immovable);
    // The cached local matrix is used directly as the world matrix
    assert_relative_eq!(
        child.world_position(),
        Vec3::new(1.0, 0.0, 0.0),
        epsilon = EPSILON
    );
}

#[test]
fn test_activation_propagates_down_three_levels() {
    let scene = SceneManager::new();
    let a = scene.create_object("a", SceneObjectFlags::empty());
    let b = scene.create_object("b", SceneObjectFlags::empty());
    let c = scene.create_object("c", SceneObjectFlags::empty());
    b.set_parent(&a, false);
    c.set_parent(&b, false);

    a.set_active(false);
    assert!(!a.active());
    assert!(!b.active());
    assert!(!c.active());
    // Explicit flags are untouched by ancestor deactivation
    assert!(b.active_self());
    assert!(c.active_self());

    a.set_active(true);
    assert!(b.active());
    assert!(c.active());
}

#[test]
fn test_reparenting_rederives_activation() {
    let scene = SceneManager::new();
    let dark = scene.create_object("dark", SceneObjectFlags::empty());
    dark.set_active(false);
    let lamp = scene.create_object("lamp", SceneObjectFlags::empty());
    assert!(lamp.active());

    lamp.set_parent(&dark, false);
    assert!(!lamp.active());
    assert!(lamp.active_self());

    lamp.set_parent(&scene.root(), false);
    assert!(lamp.active());
}

#[test]
fn test_deactivation_disables_components() {
    let scene = SceneManager::new();
    let log = new_log();
    let object = scene.create_object("gate", SceneObjectFlags::empty());
    object.add_component(Recorder::new("r", &log));
    scene.set_state(RunState::Running);
    log.borrow_mut().clear();

    object.set_active(false);
    assert_eq!(log_entries(&log), vec!["r:disabled"]);

    object.set_active(true);
    assert_eq!(log_entries(&log), vec!["r:disabled", "r:enabled"]);
}

#[test]
fn test_transform_notifications_respect_opt_in_and_run_state() {
    let scene = SceneManager::new();
    let log = new_log();
    let object = scene.create_object("beacon", SceneObjectFlags::empty());
    object.add_component(Recorder::notifying(
        "watcher",
        &log,
        TransformChangedFlags::TRANSFORM,
    ));
    object.add_component(Recorder::new("deaf", &log));

    // Stopped: no delivery to components without the always-run flag
    object.set_translation(Vec3::new(1.0, 0.0, 0.0));
    assert!(log_entries(&log).iter().all(|e| !e.contains("transform")));

    scene.set_state(RunState::Running);
    log.borrow_mut().clear();
    object.set_translation(Vec3::new(2.0, 0.0, 0.0));
    assert_eq!(
        log_entries(&log),
        vec![format!(
            "watcher:transform:{}",
            TransformChangedFlags::TRANSFORM.bits()
        )]
    );
}

#[test]
fn test_mobility_change_is_not_delivered_to_children() {
    let scene = SceneManager::new();
    let log = new_log();
    let parent = scene.create_object("pivot", SceneObjectFlags::empty());
    let child = scene.create_object("arm", SceneObjectFlags::empty());
    child.set_parent(&parent, false);
    parent.add_component(Recorder::notifying(
        "pw",
        &log,
        TransformChangedFlags::MOBILITY,
    ));
    child.add_component(Recorder::notifying(
        "cw",
        &log,
        TransformChangedFlags::MOBILITY | TransformChangedFlags::TRANSFORM,
    ));
    scene.set_state(RunState::Running);
    log.borrow_mut().clear();

    parent.set_mobility(Mobility::Static);
    assert_eq!(
        log_entries(&log),
        vec![format!(
            "pw:transform:{}",
            TransformChangedFlags::MOBILITY.bits()
        )]
    );
}

#[test]
fn test_find_child_by_name() {
    let scene = SceneManager::new();
    let body = scene.create_object("body", SceneObjectFlags::empty());
    let arm = scene.create_object("arm", SceneObjectFlags::empty());
    arm.set_parent(&body, false);
    let hand = scene.create_object("hand", SceneObjectFlags::empty());
    hand.set_parent(&arm, false);

    assert_eq!(body.find_child("arm", false).instance_id(), arm.instance_id());
    assert!(body.find_child("hand", false).is_null());
    assert_eq!(body.find_child("hand", true).instance_id(), hand.instance_id());
    assert!(body.find_child("missing", true).is_null());
}

#[test]
#[should_panic(expected = "out of range")]
fn test_child_index_out_of_range_panics() {
    let scene = SceneManager::new();
    let object = scene.create_object("lonely", SceneObjectFlags::empty());
    let _ = object.child(0);
}
