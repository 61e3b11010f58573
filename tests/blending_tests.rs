//! Blending Tests
//!
//! Tests for:
//! - Late-binding resolution of weighted scalar writes (conservation and renormalization)
//! - Quaternion override and additive blends staying unit length
//! - Additive curves layered on a static pose
//! - Blend ramps from the pre-animation value
//! - Partial stops and playback groups sharing a property

use std::sync::Arc;

use glam::{Quat, Vec3};

use kinema::animation::{AdditiveOptions, LateBindingCompositor};
use kinema::{
    AnimationValue, AnimatorEvent, Curve, DataType, Keyframe, LoopMode, MatrixInterpolation, PlaybackGroup,
    PlaybackOptions, PropertyKey, Scene, TargetId, TransformNode,
};

const EPSILON: f32 = 1e-5;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

/// A looping curve that holds `value` for ten frames.
fn hold(name: &str, value: f32) -> Arc<Curve> {
    Arc::new(
        Curve::new(
            name,
            "visibility",
            10.0,
            DataType::Float,
            LoopMode::Cycle,
            vec![Keyframe::new(0.0, value), Keyframe::new(10.0, value)],
        )
        .unwrap(),
    )
}

fn slide(name: &str, from: Vec3, to: Vec3) -> Arc<Curve> {
    Arc::new(
        Curve::new(
            name,
            "position",
            10.0,
            DataType::Vector3,
            LoopMode::Cycle,
            vec![Keyframe::new(0.0, from), Keyframe::new(10.0, to)],
        )
        .unwrap(),
    )
}

fn setup() -> (Scene, TargetId) {
    let mut scene = Scene::new();
    let handle = scene.add_node(TransformNode::new("blended"));
    (scene, TargetId::Node(handle))
}

fn visibility(scene: &Scene, target: TargetId) -> f32 {
    let TargetId::Node(handle) = target else {
        panic!("expected a node target");
    };
    scene.node(handle).unwrap().visibility
}

fn position(scene: &Scene, target: TargetId) -> Vec3 {
    let TargetId::Node(handle) = target else {
        panic!("expected a node target");
    };
    scene.node(handle).unwrap().transform.position
}

fn weighted(weight: f32) -> PlaybackOptions {
    PlaybackOptions::range(0.0, 10.0).looping(true).weighted(weight)
}

// ============================================================================
// Scalar blends
// ============================================================================

#[test]
fn partial_weights_keep_share_of_original() {
    let (mut scene, target) = setup();
    // visibility starts at 1.0
    scene.begin_playback(&[target], &[hold("a", 4.0)], weighted(0.25)).unwrap();
    scene.begin_playback(&[target], &[hold("b", 8.0)], weighted(0.5)).unwrap();

    scene.animate(0.0);
    let expected = 1.0 * 0.25 + 4.0 * 0.25 + 8.0 * 0.5;
    assert!(approx(visibility(&scene, target), expected), "got {}", visibility(&scene, target));

    // The original is the bind-time value, so later ticks are stable.
    scene.animate(100.0);
    assert!(approx(visibility(&scene, target), expected));
}

#[test]
fn overweight_blend_is_renormalized() {
    let (mut scene, target) = setup();
    scene.begin_playback(&[target], &[hold("a", 4.0)], weighted(0.75)).unwrap();
    scene.begin_playback(&[target], &[hold("b", 8.0)], weighted(0.75)).unwrap();

    scene.animate(0.0);
    assert!(approx(visibility(&scene, target), 6.0), "got {}", visibility(&scene, target));
}

#[test]
fn uneven_overweight_blend_uses_weight_ratio() {
    let (mut scene, target) = setup();
    scene.begin_playback(&[target], &[hold("a", 0.0)], weighted(1.0)).unwrap();
    scene.begin_playback(&[target], &[hold("b", 9.0)], weighted(0.5)).unwrap();

    scene.animate(0.0);
    assert!(approx(visibility(&scene, target), 3.0), "got {}", visibility(&scene, target));
}

#[test]
fn zero_total_weight_leaves_original_untouched() {
    let (mut scene, target) = setup();
    scene.begin_playback(&[target], &[hold("a", 4.0)], weighted(0.0)).unwrap();
    scene.begin_playback(&[target], &[hold("b", 8.0)], weighted(0.0)).unwrap();

    scene.animate(0.0);
    scene.animate(100.0);
    assert_eq!(visibility(&scene, target), 1.0);
}

#[test]
fn weight_change_takes_effect_next_tick() {
    let (mut scene, target) = setup();
    let handle = scene.begin_playback(&[target], &[hold("a", 5.0)], weighted(1.0)).unwrap();

    scene.animate(0.0);
    assert!(approx(visibility(&scene, target), 5.0));

    scene.animator_mut().playback_mut(handle).unwrap().set_weight(Some(0.5));
    scene.animate(100.0);
    assert!(approx(visibility(&scene, target), 3.0));
}

// ============================================================================
// Quaternion blends
// ============================================================================

#[test]
fn quaternion_blend_stays_normalized() {
    let target = TargetId::External(7);
    let key = PropertyKey(0);
    let original = Quat::from_rotation_x(0.3);
    let a = Quat::from_rotation_y(1.2);
    let b = Quat::from_rotation_z(-2.0);
    let delta = Quat::from_rotation_x(0.8);

    let weights = [0.0, 0.1, 0.35, 0.5, 0.8, 1.0];
    for &w1 in &weights {
        for &w2 in &weights {
            for &wa in &weights {
                let mut compositor = LateBindingCompositor::new();
                compositor.register(target, key, a.into(), w1, false, original.into());
                compositor.register(target, key, b.into(), w2, false, original.into());
                compositor.register(target, key, delta.into(), wa, true, original.into());

                let resolved = compositor
                    .holder(target, key)
                    .unwrap()
                    .resolve(MatrixInterpolation::Decompose)
                    .as_quat()
                    .unwrap();
                assert!(
                    (resolved.length() - 1.0).abs() < EPSILON,
                    "|q| = {} for weights {w1}/{w2}/{wa}",
                    resolved.length()
                );
            }
        }
    }
}

#[test]
fn single_full_weight_quaternion_wins() {
    let target = TargetId::External(1);
    let key = PropertyKey(0);
    let wanted = Quat::from_rotation_y(0.7);

    let mut compositor = LateBindingCompositor::new();
    compositor.register(target, key, wanted.into(), 1.0, false, Quat::IDENTITY.into());
    let resolved = compositor
        .holder(target, key)
        .unwrap()
        .resolve(MatrixInterpolation::Decompose)
        .as_quat()
        .unwrap();
    assert!(resolved.abs_diff_eq(wanted, 1e-5));
}

// ============================================================================
// Additive layers
// ============================================================================

#[test]
fn additive_round_trip_reproduces_source_animation() {
    let (mut scene, target) = setup();
    let start = Vec3::new(1.0, 2.0, 3.0);
    let end = Vec3::new(4.0, 6.0, 3.0);
    let source = slide("walk", start, end);
    let additive = Arc::new(source.to_additive(&AdditiveOptions::default(), Some("walk_additive")).unwrap());

    let TargetId::Node(handle) = target else { unreachable!() };
    scene.node_mut(handle).unwrap().transform.position = start;

    let options = PlaybackOptions::range(0.0, 10.0).weighted(1.0).additive(true);
    scene.begin_playback(&[target], &[additive], options).unwrap();

    scene.animate(0.0);
    assert!(position(&scene, target).abs_diff_eq(start, EPSILON));

    scene.animate(500.0);
    let expected = source.evaluate(5.0).as_vec3().unwrap();
    assert!(position(&scene, target).abs_diff_eq(expected, EPSILON));

    scene.animate(500.0);
    assert!(position(&scene, target).abs_diff_eq(end, EPSILON), "got {}", position(&scene, target));
}

#[test]
fn additive_layer_adds_on_top_of_override() {
    let (mut scene, target) = setup();
    scene.begin_playback(&[target], &[hold("base", 2.0)], weighted(1.0)).unwrap();

    let offset = hold("offset", 0.5);
    let options = PlaybackOptions::range(0.0, 10.0).looping(true).weighted(0.5).additive(true);
    scene.begin_playback(&[target], &[offset], options).unwrap();

    scene.animate(0.0);
    assert!(approx(visibility(&scene, target), 2.25), "got {}", visibility(&scene, target));
}

// ============================================================================
// Blend ramps
// ============================================================================

#[test]
fn blend_ramp_starts_from_current_value() {
    let (mut scene, target) = setup();
    let mut curve = (*slide("enter", Vec3::new(8.0, 0.0, 0.0), Vec3::new(8.0, 0.0, 0.0))).clone();
    curve.enable_blending = true;
    curve.blending_speed = 0.25;
    scene
        .begin_direct_animation(&[target], &[Arc::new(curve)], 0.0, 10.0, true, 1.0)
        .unwrap();

    let mut seen = Vec::new();
    for _ in 0..6 {
        scene.animate(16.0);
        seen.push(position(&scene, target).x);
    }
    let expected = [0.0, 2.0, 4.0, 6.0, 8.0, 8.0];
    for (got, want) in seen.iter().zip(expected) {
        assert!(approx(*got, want), "ramp {seen:?}");
    }
}

// ============================================================================
// Partial stop
// ============================================================================

#[test]
fn partial_stop_removes_only_named_curve() {
    let (mut scene, target) = setup();
    let moving = scene
        .begin_direct_animation(
            &[target],
            &[slide("move", Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0))],
            0.0,
            10.0,
            true,
            1.0,
        )
        .unwrap();
    let fading = scene
        .begin_direct_animation(&[target], &[hold("fade", 0.5)], 0.0, 10.0, true, 1.0)
        .unwrap();

    scene.animate(0.0);
    scene.animate(200.0);
    scene.stop_animation(target, Some("move"), None);

    assert!(!scene.animator().is_active(moving));
    assert!(scene.animator().is_active(fading));
    let frozen = position(&scene, target);

    scene.animate(300.0);
    assert_eq!(position(&scene, target), frozen);
    assert!(approx(visibility(&scene, target), 0.5));
    assert!(scene.animator().playback(fading).unwrap().has_curve("fade"));
}

#[test]
fn stop_with_unmatched_name_is_noop() {
    let (mut scene, target) = setup();
    let handle = scene
        .begin_direct_animation(&[target], &[hold("fade", 0.5)], 0.0, 10.0, true, 1.0)
        .unwrap();
    scene.stop_animation(target, Some("missing"), None);
    assert!(scene.animator().is_active(handle));
}

#[test]
fn stopped_playback_reports_end_once() {
    let (mut scene, target) = setup();
    let handle = scene
        .begin_direct_animation(&[target], &[hold("fade", 0.5)], 0.0, 10.0, true, 1.0)
        .unwrap();
    scene.stop_animation(target, None, None);
    scene.stop_animation(target, None, None);

    let events = scene.animate(16.0);
    let ends = events
        .iter()
        .filter(|e| **e == AnimatorEvent::PlaybackEnded(handle))
        .count();
    assert_eq!(ends, 1);
}

// ============================================================================
// Playback groups
// ============================================================================

#[test]
fn group_weights_blend_against_each_other() {
    let (mut scene, target) = setup();

    let mut low = PlaybackGroup::new("low");
    low.add_targeted_curve(hold("low", 2.0), target);
    let mut high = PlaybackGroup::new("high");
    high.add_targeted_curve(hold("high", 6.0), target);

    let low = scene.animator_mut().add_group(low);
    let high = scene.animator_mut().add_group(high);
    scene.animator_mut().set_group_weight(low, Some(0.5));
    scene.animator_mut().set_group_weight(high, Some(0.5));

    scene.start_group(low, true, 1.0).unwrap();
    scene.start_group(high, true, 1.0).unwrap();
    scene.animate(0.0);
    assert!(approx(visibility(&scene, target), 4.0), "got {}", visibility(&scene, target));

    scene.animator_mut().set_group_weight(high, Some(1.0));
    scene.animate(16.0);
    let expected = (2.0 * 0.5 + 6.0) / 1.5;
    assert!(approx(visibility(&scene, target), expected), "got {}", visibility(&scene, target));
}

#[test]
fn group_ends_after_every_member() {
    let mut scene = Scene::new();
    let a = TargetId::Node(scene.add_node(TransformNode::new("a")));
    let b = TargetId::Node(scene.add_node(TransformNode::new("b")));

    let mut group = PlaybackGroup::new("intro");
    group.add_targeted_curve(hold("a", 1.0), a);
    group.add_targeted_curve(slide("b", Vec3::ZERO, Vec3::X), b);
    let handle = scene.animator_mut().add_group(group);
    scene.start_group(handle, false, 1.0).unwrap();

    scene.animate(0.0);
    let events = scene.animate(2000.0);
    assert!(events.contains(&AnimatorEvent::GroupEnded(handle)));
    assert!(!scene.animator().group(handle).unwrap().is_playing());
}

#[test]
fn additive_values_stay_typed() {
    let additive = slide("s", Vec3::ONE, Vec3::splat(3.0))
        .to_additive(&AdditiveOptions::default(), None)
        .unwrap();
    assert_eq!(additive.keys()[1].value, AnimationValue::Vector3(Vec3::splat(2.0)));
    assert_eq!(additive.data_type(), DataType::Vector3);
}
