use std::sync::Arc;

use glam::Mat4;
use kinema_animation::{
    AnimationHost, AnimationPropertiesOverride, AnimationSettings, AnimationValue, Animator, AnimatorEvent, Curve,
    DataType, GroupHandle, PlaybackHandle, PlaybackOptions, PropertyKey, PropertyPath, TargetId,
};
use kinema_core::{KinemaError, NodeHandle, Result, SkeletonKey};
use slotmap::SlotMap;

use crate::node::TransformNode;
use crate::property::{BoneProperty, NodeProperty};
use crate::skeleton::Skeleton;
use crate::transform_system;

/// Node and skeleton storage plus the animator driving them.
///
/// The scene is the [`AnimationHost`] for its own animator: property paths
/// resolve against its nodes and bones, and writes land directly in them.
pub struct Scene {
    pub nodes: SlotMap<NodeHandle, TransformNode>,
    pub root_nodes: Vec<NodeHandle>,
    pub skeletons: SlotMap<SkeletonKey, Skeleton>,

    animator: Animator,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(AnimationSettings::default())
    }

    #[must_use]
    pub fn with_settings(settings: AnimationSettings) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            root_nodes: Vec::new(),
            skeletons: SlotMap::with_key(),
            animator: Animator::new(settings),
        }
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    pub fn add_node(&mut self, node: TransformNode) -> NodeHandle {
        let handle = self.nodes.insert(node);
        self.root_nodes.push(handle);
        handle
    }

    pub fn add_to_parent(&mut self, mut child: TransformNode, parent: NodeHandle) -> NodeHandle {
        if !self.nodes.contains_key(parent) {
            log::warn!("Parent node not found; '{}' added as a root", child.name);
            return self.add_node(child);
        }
        child.parent = Some(parent);
        let handle = self.nodes.insert(child);
        self.nodes[parent].children.push(handle);
        handle
    }

    /// Re-parents `child` under `parent`.
    pub fn attach(&mut self, child: NodeHandle, parent: NodeHandle) {
        if child == parent {
            log::warn!("Cannot attach node to itself");
            return;
        }
        if !self.nodes.contains_key(child) || !self.nodes.contains_key(parent) {
            log::warn!("Attach skipped: unknown node");
            return;
        }

        match self.nodes[child].parent {
            Some(old) => {
                if let Some(n) = self.nodes.get_mut(old) {
                    n.children.retain(|&c| c != child);
                }
            }
            None => self.root_nodes.retain(|&r| r != child),
        }

        self.nodes[parent].children.push(child);
        let node = &mut self.nodes[child];
        node.parent = Some(parent);
        node.transform.mark_dirty();
    }

    /// Removes a node and its subtree, stopping every playback on them.
    pub fn remove_node(&mut self, handle: NodeHandle) {
        let Some(node) = self.nodes.get(handle) else {
            return;
        };
        for child in node.children.clone() {
            self.remove_node(child);
        }

        match self.nodes.get(handle).and_then(TransformNode::parent) {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(parent) {
                    p.children.retain(|&c| c != handle);
                }
            }
            None => self.root_nodes.retain(|&r| r != handle),
        }

        self.animator.stop_target(TargetId::Node(handle), None, None);
        self.nodes.remove(handle);
    }

    #[inline]
    #[must_use]
    pub fn node(&self, handle: NodeHandle) -> Option<&TransformNode> {
        self.nodes.get(handle)
    }

    #[inline]
    pub fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut TransformNode> {
        self.nodes.get_mut(handle)
    }

    #[must_use]
    pub fn find_node_by_id(&self, id: &str) -> Option<NodeHandle> {
        self.nodes.iter().find(|(_, n)| n.id == id).map(|(h, _)| h)
    }

    /// Rebuilds node world matrices.
    pub fn update_matrix_world(&mut self) {
        transform_system::update_hierarchy(&mut self.nodes, &self.root_nodes);
    }

    // ========================================================================
    // Skeletons
    // ========================================================================

    /// Adds a skeleton and resolves serialized bone links against node ids.
    pub fn add_skeleton(&mut self, mut skeleton: Skeleton) -> SkeletonKey {
        for index in 0..skeleton.len() {
            let pending = skeleton.bone(index).and_then(|b| b.pending_link_id.clone());
            let Some(id) = pending else { continue };
            match self.find_node_by_id(&id) {
                Some(node) => {
                    if let Some(bone) = skeleton.bone_mut(index) {
                        bone.link_transform_node(Some(node));
                    }
                }
                None => log::warn!("Skeleton '{}': linked node '{id}' not found", skeleton.name),
            }
        }
        self.skeletons.insert(skeleton)
    }

    #[inline]
    #[must_use]
    pub fn skeleton(&self, key: SkeletonKey) -> Option<&Skeleton> {
        self.skeletons.get(key)
    }

    #[inline]
    pub fn skeleton_mut(&mut self, key: SkeletonKey) -> Option<&mut Skeleton> {
        self.skeletons.get_mut(key)
    }

    /// Serializes a skeleton, writing linked nodes by their string id.
    pub fn skeleton_to_json(&self, key: SkeletonKey) -> Result<String> {
        let skeleton = self
            .skeletons
            .get(key)
            .ok_or_else(|| KinemaError::UnknownTarget(format!("{key:?}")))?;
        skeleton.to_json(|h| self.nodes.get(h).map(|n| n.id.clone()))
    }

    /// Copies linked node transforms into their bones, then rebuilds every
    /// dirty skeleton's buffer.
    pub fn prepare_skeletons(&mut self) {
        for skeleton in self.skeletons.values_mut() {
            for index in 0..skeleton.len() {
                let Some(node) = skeleton.bone(index).and_then(|b| b.linked_transform_node()) else {
                    continue;
                };
                let Some(node) = self.nodes.get(node) else {
                    continue;
                };
                let t = &node.transform;
                let local = Mat4::from_scale_rotation_translation(t.scale, t.rotation, t.position);
                if skeleton.bone(index).is_some_and(|b| b.local_matrix() != local)
                    && let Some(bone) = skeleton.bone_mut(index)
                {
                    bone.set_local_matrix(local);
                }
            }
            skeleton.prepare();
        }
    }

    // ========================================================================
    // Animation
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn animator(&self) -> &Animator {
        &self.animator
    }

    #[inline]
    pub fn animator_mut(&mut self) -> &mut Animator {
        &mut self.animator
    }

    #[inline]
    pub fn settings_mut(&mut self) -> &mut AnimationSettings {
        self.animator.settings_mut()
    }

    /// Lends the animator out so it can use the scene as its host.
    fn with_animator<R>(&mut self, f: impl FnOnce(&mut Animator, &mut Scene) -> R) -> R {
        let mut animator = std::mem::take(&mut self.animator);
        let result = f(&mut animator, self);
        self.animator = animator;
        result
    }

    /// Runs one animation pass and returns the lifecycle events it produced.
    pub fn animate(&mut self, delta_ms: f64) -> Vec<AnimatorEvent> {
        self.with_animator(|animator, scene| {
            animator.tick(scene, delta_ms);
            animator.drain_events()
        })
    }

    /// Full frame: animate, update node matrices, prepare skeletons.
    pub fn update(&mut self, delta_ms: f64) -> Vec<AnimatorEvent> {
        let events = self.animate(delta_ms);
        self.update_matrix_world();
        self.prepare_skeletons();
        events
    }

    fn target_curves(&self, target: TargetId) -> Result<Vec<Arc<Curve>>> {
        match target {
            TargetId::Node(h) => self
                .nodes
                .get(h)
                .map(|n| n.animations.clone())
                .ok_or_else(|| KinemaError::UnknownTarget(target.to_string())),
            TargetId::Bone { skeleton, index } => self
                .skeletons
                .get(skeleton)
                .and_then(|s| s.bone(index as usize))
                .map(|b| b.animations.clone())
                .ok_or_else(|| KinemaError::UnknownBone(target.to_string())),
            TargetId::External(_) => Err(KinemaError::UnknownTarget(target.to_string())),
        }
    }

    /// Starts a playback with explicit options. The other `begin_*` helpers
    /// are shorthands for this.
    pub fn begin_playback(
        &mut self,
        targets: &[TargetId],
        curves: &[Arc<Curve>],
        options: PlaybackOptions,
    ) -> Result<PlaybackHandle> {
        self.with_animator(|animator, scene| animator.begin(scene, targets, curves, options))
    }

    /// Plays the curves attached to `target`, stopping whatever already
    /// plays on it.
    pub fn begin_animation(
        &mut self,
        target: TargetId,
        from: f32,
        to: f32,
        loop_animation: bool,
        speed_ratio: f32,
    ) -> Result<PlaybackHandle> {
        let curves = self.target_curves(target)?;
        let options = PlaybackOptions::range(from, to).looping(loop_animation).speed(speed_ratio);
        self.animator.stop_target(target, None, None);
        self.begin_playback(&[target], &curves, options)
    }

    /// Plays `curves` on every target in `targets` without stopping anything.
    pub fn begin_direct_animation(
        &mut self,
        targets: &[TargetId],
        curves: &[Arc<Curve>],
        from: f32,
        to: f32,
        loop_animation: bool,
        speed_ratio: f32,
    ) -> Result<PlaybackHandle> {
        let options = PlaybackOptions::range(from, to).looping(loop_animation).speed(speed_ratio);
        self.begin_playback(targets, curves, options)
    }

    /// Plays the target's own curves at `weight`, blended through the
    /// compositor with anything else weighted on the same properties.
    pub fn begin_weighted_animation(
        &mut self,
        target: TargetId,
        from: f32,
        to: f32,
        weight: f32,
        loop_animation: bool,
        speed_ratio: f32,
    ) -> Result<PlaybackHandle> {
        let curves = self.target_curves(target)?;
        let options = PlaybackOptions::range(from, to)
            .looping(loop_animation)
            .speed(speed_ratio)
            .weighted(weight);
        self.begin_playback(&[target], &curves, options)
    }

    /// Starts every animated bone of a skeleton on the same range.
    pub fn begin_skeleton_animation(
        &mut self,
        key: SkeletonKey,
        from: f32,
        to: f32,
        loop_animation: bool,
        speed_ratio: f32,
    ) -> Result<Vec<PlaybackHandle>> {
        let skeleton = self
            .skeletons
            .get(key)
            .ok_or_else(|| KinemaError::UnknownTarget(format!("{key:?}")))?;
        let animated: Vec<u32> = skeleton
            .bones()
            .iter()
            .filter(|b| !b.animations.is_empty())
            .map(|b| b.index() as u32)
            .collect();

        let mut handles = Vec::with_capacity(animated.len());
        for index in animated {
            let target = TargetId::Bone { skeleton: key, index };
            handles.push(self.begin_animation(target, from, to, loop_animation, speed_ratio)?);
        }
        Ok(handles)
    }

    /// Starts a skeleton's named animation range.
    pub fn begin_skeleton_range(
        &mut self,
        key: SkeletonKey,
        range: &str,
        loop_animation: bool,
        speed_ratio: f32,
    ) -> Result<Vec<PlaybackHandle>> {
        let range = self
            .skeletons
            .get(key)
            .and_then(|s| s.animation_range(range))
            .ok_or_else(|| KinemaError::UnknownRange(range.to_string()))?;
        self.begin_skeleton_animation(key, range.from, range.to, loop_animation, speed_ratio)
    }

    /// Stops curves on `target`; see [`Animator::stop_filtered`] for the
    /// selector rules.
    pub fn stop_animation(&mut self, target: TargetId, name: Option<&str>, mask: Option<&dyn Fn(TargetId) -> bool>) {
        self.animator.stop_target(target, name, mask);
    }

    #[must_use]
    pub fn playbacks_for_target(&self, target: TargetId) -> Vec<PlaybackHandle> {
        self.animator.playbacks_for_target(target)
    }

    pub fn go_to_frame(&mut self, handle: PlaybackHandle, frame: f32) {
        self.with_animator(|animator, scene| animator.go_to_frame(scene, handle, frame));
    }

    pub fn reset_playback(&mut self, handle: PlaybackHandle) {
        self.with_animator(|animator, scene| animator.reset(scene, handle));
    }

    pub fn start_group(&mut self, group: GroupHandle, loop_animation: bool, speed_ratio: f32) -> Result<()> {
        self.with_animator(|animator, scene| animator.start_group(scene, group, loop_animation, speed_ratio, None))
    }

    pub fn play_group(&mut self, group: GroupHandle, loop_animation: Option<bool>) -> Result<()> {
        self.with_animator(|animator, scene| animator.play_group(scene, group, loop_animation))
    }

    pub fn reset_group(&mut self, group: GroupHandle) {
        self.with_animator(|animator, scene| animator.reset_group(scene, group));
    }

    pub fn go_to_frame_group(&mut self, group: GroupHandle, frame: f32) {
        self.with_animator(|animator, scene| animator.go_to_frame_group(scene, group, frame));
    }
}

fn property_not_found(target: TargetId, path: &PropertyPath) -> KinemaError {
    KinemaError::PropertyNotFound {
        path: path.to_string(),
        target: target.to_string(),
    }
}

impl AnimationHost for Scene {
    fn resolve_property(&self, target: TargetId, path: &PropertyPath) -> Result<PropertyKey> {
        match target {
            TargetId::Node(h) => {
                let node = self
                    .nodes
                    .get(h)
                    .ok_or_else(|| KinemaError::UnknownTarget(target.to_string()))?;
                NodeProperty::parse(path)
                    .filter(|p| node.has_property(*p))
                    .map(NodeProperty::key)
                    .ok_or_else(|| property_not_found(target, path))
            }
            TargetId::Bone { skeleton, index } => {
                let skeleton = self
                    .skeletons
                    .get(skeleton)
                    .ok_or_else(|| KinemaError::UnknownTarget(target.to_string()))?;
                if skeleton.bone(index as usize).is_none() {
                    return Err(KinemaError::UnknownBone(target.to_string()));
                }
                BoneProperty::parse(path)
                    .map(BoneProperty::key)
                    .ok_or_else(|| property_not_found(target, path))
            }
            TargetId::External(_) => Err(KinemaError::UnknownTarget(target.to_string())),
        }
    }

    fn property_data_type(&self, target: TargetId, key: PropertyKey) -> Option<DataType> {
        match target {
            TargetId::Node(_) => NodeProperty::from_key(key).map(NodeProperty::data_type),
            TargetId::Bone { .. } => BoneProperty::from_key(key).map(BoneProperty::data_type),
            TargetId::External(_) => None,
        }
    }

    fn read_property(&self, target: TargetId, key: PropertyKey) -> Option<AnimationValue> {
        match target {
            TargetId::Node(h) => self.nodes.get(h)?.read(NodeProperty::from_key(key)?),
            TargetId::Bone { skeleton, index } => self
                .skeletons
                .get(skeleton)?
                .read_bone(index as usize, BoneProperty::from_key(key)?),
            TargetId::External(_) => None,
        }
    }

    fn write_property(&mut self, target: TargetId, key: PropertyKey, value: &AnimationValue) {
        match target {
            TargetId::Node(h) => {
                if let (Some(node), Some(property)) = (self.nodes.get_mut(h), NodeProperty::from_key(key)) {
                    node.write(property, value);
                }
            }
            TargetId::Bone { skeleton, index } => {
                if let (Some(skeleton), Some(property)) = (self.skeletons.get_mut(skeleton), BoneProperty::from_key(key)) {
                    skeleton.write_bone(index as usize, property, value);
                }
            }
            TargetId::External(_) => {}
        }
    }

    fn properties_override(&self, target: TargetId) -> Option<AnimationPropertiesOverride> {
        match target {
            TargetId::Node(h) => self.nodes.get(h)?.animation_override,
            TargetId::Bone { skeleton, .. } => self.skeletons.get(skeleton)?.animation_override,
            TargetId::External(_) => None,
        }
    }
}
