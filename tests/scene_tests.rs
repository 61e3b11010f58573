//! Scene Tests
//!
//! Tests for:
//! - Node hierarchy and world matrix updates
//! - Property resolution on nodes (transform, material, morph targets)
//! - Animation settings: time scale, constant delta, global disable
//! - Lifecycle events, sync roots and per-target overrides
//! - Nodes linked to bones through a full `update`

use std::sync::Arc;

use glam::{Mat4, Vec3};

use kinema::{
    AnimationPropertiesOverride, AnimationSettings, AnimatorEvent, Color3, Curve, DataType, KinemaError, Keyframe,
    LoopMode, MaterialProps, Scene, Skeleton, TargetId, TransformNode,
};

const EPSILON: f32 = 1e-5;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn slide(to_frame: f32) -> Arc<Curve> {
    Arc::new(
        Curve::new(
            "slide",
            "position",
            10.0,
            DataType::Vector3,
            LoopMode::Cycle,
            vec![
                Keyframe::new(0.0, Vec3::ZERO),
                Keyframe::new(to_frame, Vec3::new(to_frame, 0.0, 0.0)),
            ],
        )
        .unwrap(),
    )
}

fn x_of(scene: &Scene, target: TargetId) -> f32 {
    let TargetId::Node(handle) = target else {
        panic!("expected a node target");
    };
    scene.node(handle).unwrap().transform.position.x
}

// ============================================================================
// Hierarchy
// ============================================================================

#[test]
fn world_matrix_follows_parent_chain() {
    let mut scene = Scene::new();
    let mut parent = TransformNode::new("parent");
    parent.transform.position = Vec3::new(1.0, 0.0, 0.0);
    parent.transform.scale = Vec3::splat(2.0);
    let parent = scene.add_node(parent);

    let mut child = TransformNode::new("child");
    child.transform.position = Vec3::new(0.0, 1.0, 0.0);
    let child = scene.add_to_parent(child, parent);

    scene.update_matrix_world();
    let world = scene.node(child).unwrap().transform.world_matrix_as_mat4();
    assert!(world.w_axis.truncate().abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), EPSILON));
}

#[test]
fn attach_reparents_and_updates_world() {
    let mut scene = Scene::new();
    let mut anchor = TransformNode::new("anchor");
    anchor.transform.position = Vec3::new(0.0, 0.0, 5.0);
    let anchor = scene.add_node(anchor);
    let loose = scene.add_node(TransformNode::new("loose"));
    assert_eq!(scene.root_nodes.len(), 2);

    scene.attach(loose, anchor);
    assert_eq!(scene.root_nodes, vec![anchor]);
    assert_eq!(scene.node(loose).unwrap().parent(), Some(anchor));

    scene.update_matrix_world();
    let world = scene.node(loose).unwrap().transform.world_matrix_as_mat4();
    assert!(world.w_axis.truncate().abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), EPSILON));
}

#[test]
fn remove_node_drops_subtree() {
    let mut scene = Scene::new();
    let root = scene.add_node(TransformNode::new("root"));
    let child = scene.add_to_parent(TransformNode::new("child"), root);
    let grandchild = scene.add_to_parent(TransformNode::new("grandchild"), child);

    scene.remove_node(child);
    assert!(scene.node(child).is_none());
    assert!(scene.node(grandchild).is_none());
    assert!(scene.node(root).unwrap().children().is_empty());
}

#[test]
fn find_node_by_id_uses_string_id() {
    let mut scene = Scene::new();
    let mut node = TransformNode::new("display name");
    node.id = "mesh-7".to_string();
    let handle = scene.add_node(node);
    assert_eq!(scene.find_node_by_id("mesh-7"), Some(handle));
    assert_eq!(scene.find_node_by_id("display name"), None);
}

#[test]
fn orphaned_child_becomes_root() -> anyhow::Result<()> {
    init_logging();
    let mut scene = Scene::new();
    let gone = scene.add_node(TransformNode::new("gone"));
    scene.remove_node(gone);

    let child = scene.add_to_parent(TransformNode::new("child"), gone);
    let node = scene.node(child).ok_or_else(|| anyhow::anyhow!("child missing"))?;
    assert!(node.parent().is_none());
    assert_eq!(scene.root_nodes, vec![child]);
    Ok(())
}

#[test]
fn attach_to_self_is_ignored() -> anyhow::Result<()> {
    init_logging();
    let mut scene = Scene::new();
    let parent = scene.add_node(TransformNode::new("parent"));
    let child = scene.add_to_parent(TransformNode::new("child"), parent);

    scene.attach(child, child);
    let node = scene.node(child).ok_or_else(|| anyhow::anyhow!("child missing"))?;
    assert_eq!(node.parent(), Some(parent));
    Ok(())
}

// ============================================================================
// Node properties
// ============================================================================

#[test]
fn material_color_animates() {
    let mut scene = Scene::new();
    let node = scene.add_node(TransformNode::new("lamp").with_material(MaterialProps::default()));
    let curve = Arc::new(
        Curve::new(
            "glow",
            "material.diffuseColor",
            10.0,
            DataType::Color3,
            LoopMode::Cycle,
            vec![Keyframe::new(0.0, Color3::BLACK), Keyframe::new(10.0, Color3::new(1.0, 0.5, 0.0))],
        )
        .unwrap(),
    );
    scene
        .begin_direct_animation(&[TargetId::Node(node)], &[curve], 0.0, 10.0, false, 1.0)
        .unwrap();

    scene.animate(0.0);
    scene.animate(500.0);
    let color = scene.node(node).unwrap().material.unwrap().diffuse_color;
    assert!(approx(color.r, 0.5) && approx(color.g, 0.25) && approx(color.b, 0.0));
}

#[test]
fn morph_influence_animates_by_index() {
    let mut scene = Scene::new();
    let node = scene.add_node(TransformNode::new("face").with_morph_targets(3));
    let curve = Arc::new(
        Curve::new(
            "smile",
            "morphTargets.1.influence",
            10.0,
            DataType::Float,
            LoopMode::Cycle,
            vec![Keyframe::new(0.0, 0.0_f32), Keyframe::new(10.0, 1.0_f32)],
        )
        .unwrap(),
    );
    scene
        .begin_direct_animation(&[TargetId::Node(node)], &[curve], 0.0, 10.0, false, 1.0)
        .unwrap();

    scene.animate(0.0);
    scene.animate(300.0);
    let influences = &scene.node(node).unwrap().morph_influences;
    assert!(approx(influences[1], 0.3));
    assert_eq!(influences[0], 0.0);
    assert_eq!(influences[2], 0.0);
}

#[test]
fn euler_rotation_animates() {
    let mut scene = Scene::new();
    let node = scene.add_node(TransformNode::new("spinner"));
    let curve = Arc::new(
        Curve::new(
            "spin",
            "rotation",
            10.0,
            DataType::Vector3,
            LoopMode::Cycle,
            vec![Keyframe::new(0.0, Vec3::ZERO), Keyframe::new(10.0, Vec3::new(0.0, 1.0, 0.0))],
        )
        .unwrap(),
    );
    scene
        .begin_direct_animation(&[TargetId::Node(node)], &[curve], 0.0, 10.0, false, 1.0)
        .unwrap();

    scene.animate(0.0);
    scene.animate(500.0);
    let euler = scene.node(node).unwrap().transform.rotation_euler();
    assert!(euler.abs_diff_eq(Vec3::new(0.0, 0.5, 0.0), 1e-4), "got {euler}");
}

#[test]
fn material_path_without_material_fails_at_bind() {
    let mut scene = Scene::new();
    let node = scene.add_node(TransformNode::new("bare"));
    let curve = Arc::new(
        Curve::new(
            "fade",
            "material.alpha",
            10.0,
            DataType::Float,
            LoopMode::Cycle,
            vec![Keyframe::new(0.0, 1.0_f32), Keyframe::new(10.0, 0.0_f32)],
        )
        .unwrap(),
    );
    let result = scene.begin_direct_animation(&[TargetId::Node(node)], &[curve], 0.0, 10.0, false, 1.0);
    assert!(matches!(result, Err(KinemaError::PropertyNotFound { .. })));
    assert_eq!(scene.animator().playback_count(), 0);
}

#[test]
fn external_target_is_unknown_to_scene() {
    let mut scene = Scene::new();
    let result = scene.begin_direct_animation(&[TargetId::External(3)], &[slide(10.0)], 0.0, 10.0, false, 1.0);
    assert!(matches!(result, Err(KinemaError::UnknownTarget(_))));
}

// ============================================================================
// Settings
// ============================================================================

#[test]
fn time_scale_speeds_up_everything() {
    let mut scene = Scene::new();
    let target = TargetId::Node(scene.add_node(TransformNode::new("n")));
    scene.settings_mut().animation_time_scale = 2.0;
    scene
        .begin_direct_animation(&[target], &[slide(100.0)], 0.0, 100.0, true, 1.0)
        .unwrap();

    scene.animate(0.0);
    scene.animate(500.0);
    assert!(approx(x_of(&scene, target), 10.0));
}

#[test]
fn constant_delta_ignores_real_frame_time() {
    let mut scene = Scene::with_settings(AnimationSettings::deterministic());
    let target = TargetId::Node(scene.add_node(TransformNode::new("n")));
    scene
        .begin_direct_animation(&[target], &[slide(100.0)], 0.0, 100.0, true, 1.0)
        .unwrap();

    scene.animate(3.0);
    for _ in 0..10 {
        scene.animate(1000.0);
    }
    // Ten ticks of 16 ms at 10 fps.
    assert!(approx(x_of(&scene, target), 1.6), "got {}", x_of(&scene, target));
}

#[test]
fn disabled_animations_do_not_tick() {
    let mut scene = Scene::new();
    let target = TargetId::Node(scene.add_node(TransformNode::new("n")));
    scene
        .begin_direct_animation(&[target], &[slide(100.0)], 0.0, 100.0, true, 1.0)
        .unwrap();
    scene.animate(0.0);
    scene.settings_mut().animations_enabled = false;
    scene.animate(1000.0);
    assert_eq!(x_of(&scene, target), 0.0);
    assert_eq!(scene.animator().clock().elapsed_ms, 0.0);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn looping_playback_reports_each_wrap() {
    let mut scene = Scene::new();
    let target = TargetId::Node(scene.add_node(TransformNode::new("n")));
    let handle = scene
        .begin_direct_animation(&[target], &[slide(10.0)], 0.0, 10.0, true, 1.0)
        .unwrap();

    scene.animate(0.0);
    assert!(scene.animate(500.0).is_empty());
    assert_eq!(scene.animate(600.0), vec![AnimatorEvent::PlaybackLooped(handle)]);
    assert!(scene.animate(100.0).is_empty());
}

#[test]
fn finished_playback_reports_end() {
    let mut scene = Scene::new();
    let target = TargetId::Node(scene.add_node(TransformNode::new("n")));
    let handle = scene
        .begin_direct_animation(&[target], &[slide(10.0)], 0.0, 10.0, false, 1.0)
        .unwrap();

    scene.animate(0.0);
    let events = scene.animate(1500.0);
    assert!(events.contains(&AnimatorEvent::PlaybackEnded(handle)));
    assert!(approx(x_of(&scene, target), 10.0));
}

#[test]
fn reset_restores_bind_time_value() {
    let mut scene = Scene::new();
    let mut node = TransformNode::new("n");
    node.transform.position = Vec3::new(0.0, 7.0, 0.0);
    let target = TargetId::Node(scene.add_node(node));
    let handle = scene
        .begin_direct_animation(&[target], &[slide(10.0)], 0.0, 10.0, true, 1.0)
        .unwrap();

    scene.animate(0.0);
    scene.animate(400.0);
    assert!(approx(x_of(&scene, target), 4.0));

    scene.reset_playback(handle);
    let TargetId::Node(h) = target else { unreachable!() };
    assert_eq!(scene.node(h).unwrap().transform.position, Vec3::new(0.0, 7.0, 0.0));
}

#[test]
fn synced_playback_follows_root_progress() {
    let mut scene = Scene::new();
    let leader = TargetId::Node(scene.add_node(TransformNode::new("leader")));
    let follower = TargetId::Node(scene.add_node(TransformNode::new("follower")));

    let follow = scene
        .begin_direct_animation(&[follower], &[slide(100.0)], 0.0, 100.0, true, 1.0)
        .unwrap();
    let lead = scene
        .begin_direct_animation(&[leader], &[slide(10.0)], 0.0, 10.0, true, 1.0)
        .unwrap();
    scene.animator_mut().sync_with(follow, Some(lead));

    scene.animate(0.0);
    scene.animate(500.0);
    assert!(approx(x_of(&scene, leader), 5.0));
    // Half of the leader's range maps to half of the follower's.
    assert!(approx(x_of(&scene, follower), 50.0), "got {}", x_of(&scene, follower));
}

#[test]
fn loop_mode_override_applies_per_target() {
    let mut scene = Scene::new();
    let mut node = TransformNode::new("held");
    node.animation_override = Some(AnimationPropertiesOverride {
        loop_mode: Some(LoopMode::Constant),
        ..AnimationPropertiesOverride::default()
    });
    let held = TargetId::Node(scene.add_node(node));
    let free = TargetId::Node(scene.add_node(TransformNode::new("free")));

    let curve = slide(10.0);
    scene
        .begin_direct_animation(&[held], &[Arc::clone(&curve)], 0.0, 10.0, true, 1.0)
        .unwrap();
    scene
        .begin_direct_animation(&[free], &[curve], 0.0, 10.0, true, 1.0)
        .unwrap();

    scene.animate(0.0);
    scene.animate(1300.0);
    assert!(approx(x_of(&scene, held), 10.0));
    assert!(approx(x_of(&scene, free), 3.0));
}

#[test]
fn begin_animation_uses_node_curves() {
    let mut scene = Scene::new();
    let mut node = TransformNode::new("n");
    node.animations.push(slide(10.0));
    let target = TargetId::Node(scene.add_node(node));

    let first = scene.begin_animation(target, 0.0, 10.0, true, 1.0).unwrap();
    let second = scene.begin_animation(target, 0.0, 10.0, true, 2.0).unwrap();
    assert!(!scene.animator().is_active(first));
    assert_eq!(scene.playbacks_for_target(target), vec![second]);

    scene.animate(0.0);
    scene.animate(200.0);
    assert!(approx(x_of(&scene, target), 4.0));
}

// ============================================================================
// Linked bones
// ============================================================================

#[test]
fn animated_node_drives_linked_bone() {
    let mut scene = Scene::new();
    let driver = scene.add_node(TransformNode::new("driver"));

    let mut skeleton = Skeleton::new("rig", "rig");
    let root = skeleton.add_bone("root", None, Mat4::IDENTITY).unwrap();
    skeleton.add_bone("tip", Some(root), Mat4::from_translation(Vec3::Y)).unwrap();
    let key = scene.add_skeleton(skeleton);
    scene
        .skeleton_mut(key)
        .unwrap()
        .bone_mut(root)
        .unwrap()
        .link_transform_node(Some(driver));

    scene
        .begin_direct_animation(&[TargetId::Node(driver)], &[slide(10.0)], 0.0, 10.0, false, 1.0)
        .unwrap();
    scene.update(0.0);
    let prepared = scene.skeleton(key).unwrap().prepare_count();

    scene.update(500.0);
    let skeleton = scene.skeleton(key).unwrap();
    assert_eq!(skeleton.prepare_count(), prepared + 1);
    let tip = skeleton.bone(1).unwrap().absolute_transform().w_axis.truncate();
    assert!(tip.abs_diff_eq(Vec3::new(5.0, 1.0, 0.0), EPSILON), "tip at {tip}");
}

#[test]
fn static_linked_node_keeps_skeleton_clean() {
    let mut scene = Scene::new();
    let driver = scene.add_node(TransformNode::new("driver"));
    let mut skeleton = Skeleton::new("rig", "rig");
    skeleton.add_bone("root", None, Mat4::IDENTITY).unwrap();
    let key = scene.add_skeleton(skeleton);
    scene
        .skeleton_mut(key)
        .unwrap()
        .bone_mut(0)
        .unwrap()
        .link_transform_node(Some(driver));

    scene.update(16.0);
    let prepared = scene.skeleton(key).unwrap().prepare_count();
    scene.update(16.0);
    scene.update(16.0);
    assert_eq!(scene.skeleton(key).unwrap().prepare_count(), prepared);
}
