//! Swings a two-bone arm back and forth and prints the skinning buffer.
//!
//! Run with `RUST_LOG=debug` to see the animator's logging.

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use kinema::{AnimatorEvent, Curve, DataType, Keyframe, LoopMode, Scene, Skeleton};

fn swing(from: f32, to: f32) -> anyhow::Result<Arc<Curve>> {
    let pose = |angle: f32| Mat4::from_rotation_translation(Quat::from_rotation_z(angle), Vec3::Y);
    let curve = Curve::new(
        "swing",
        "_matrix",
        30.0,
        DataType::Matrix,
        LoopMode::Cycle,
        vec![
            Keyframe::new(0.0, pose(from)),
            Keyframe::new(15.0, pose(to)),
            Keyframe::new(30.0, pose(from)),
        ],
    )?;
    Ok(Arc::new(curve))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut skeleton = Skeleton::new("arm", "arm");
    let shoulder = skeleton.add_bone("shoulder", None, Mat4::IDENTITY)?;
    let elbow = skeleton.add_bone("elbow", Some(shoulder), Mat4::from_translation(Vec3::Y))?;
    skeleton.add_bone("wrist", Some(elbow), Mat4::from_translation(Vec3::Y))?;
    skeleton.create_animation_range("swing", 0.0, 30.0);

    if let Some(bone) = skeleton.bone_mut(elbow) {
        bone.animations.push(swing(-0.5, 0.5)?);
    }

    let mut scene = Scene::new();
    let key = scene.add_skeleton(skeleton);
    let handles = scene.begin_skeleton_range(key, "swing", true, 1.0)?;
    log::info!("Started {} playbacks on skeleton {key:?}", handles.len());

    // Two seconds at 60 fps.
    for frame in 0..120 {
        for event in scene.update(1000.0 / 60.0) {
            if let AnimatorEvent::PlaybackLooped(handle) = event {
                println!("frame {frame}: {handle:?} looped");
            }
        }

        if frame % 30 == 0
            && let Some(skeleton) = scene.skeleton(key)
        {
            let wrist = &skeleton.transform_matrices()[32..48];
            println!("frame {frame}: wrist skin translation = {:?}", &wrist[12..15]);
        }
    }

    Ok(())
}
