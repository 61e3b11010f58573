use std::sync::Arc;

use glam::{Mat3, Mat4, Quat, Vec3};
use kinema_animation::{AnimationPropertiesOverride, AnimationValue, Curve, CurveDocument, CurveRange, RangeDocument};
use kinema_core::{KinemaError, NodeHandle, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::bone::{Bone, Space};
use crate::property::BoneProperty;

/// A bone hierarchy plus the flattened matrix buffer handed to skinning.
///
/// Bones are stored parents-before-children; [`Skeleton::add_bone`] rejects a
/// parent index that is not already present. The buffer holds one 4x4 per
/// bone (column-major, pre-multiplied by the bone's inverse bind transform)
/// followed by one identity slot used by unskinned vertices.
#[derive(Debug, Clone)]
pub struct Skeleton {
    pub name: String,
    pub id: String,

    bones: Vec<Bone>,
    dirty: bool,
    pose_matrix: Option<Mat4>,

    transform_matrices: Vec<f32>,
    /// Mirror the buffer into an RGBA32F texture layout on every prepare.
    pub use_texture_to_store_bone_matrices: bool,
    texture_data: Vec<f32>,
    prepare_count: u64,

    ranges: FxHashMap<String, CurveRange>,
    /// Blending and loop overrides applied to every bone animation.
    pub animation_override: Option<AnimationPropertiesOverride>,
}

impl Skeleton {
    #[must_use]
    pub fn new(name: &str, id: &str) -> Self {
        Self {
            name: name.to_string(),
            id: id.to_string(),
            bones: Vec::new(),
            dirty: true,
            pose_matrix: None,
            transform_matrices: Vec::new(),
            use_texture_to_store_bone_matrices: false,
            texture_data: Vec::new(),
            prepare_count: 0,
            ranges: FxHashMap::default(),
            animation_override: None,
        }
    }

    // ========================================================================
    // Bones
    // ========================================================================

    pub fn add_bone(&mut self, name: &str, parent: Option<usize>, local: Mat4) -> Result<usize> {
        self.add_bone_with_poses(name, parent, local, None, None)
    }

    /// Adds a bone with explicit rest and base matrices (both default to
    /// `local`) and computes its bind-pose absolute transform.
    pub fn add_bone_with_poses(
        &mut self,
        name: &str,
        parent: Option<usize>,
        local: Mat4,
        rest: Option<Mat4>,
        base: Option<Mat4>,
    ) -> Result<usize> {
        let index = self.bones.len();
        if let Some(p) = parent
            && p >= index
        {
            return Err(KinemaError::UnknownBone(format!("parent index {p} of bone '{name}'")));
        }
        self.bones.push(Bone::new(name, index, parent, local, rest, base));
        if let Some(p) = parent {
            self.bones[p].children.push(index);
        }
        self.update_difference_matrix(index, false);
        self.dirty = true;
        Ok(index)
    }

    #[inline]
    #[must_use]
    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    #[inline]
    #[must_use]
    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    /// Mutable bone access. Flags the skeleton for the next prepare.
    pub fn bone_mut(&mut self, index: usize) -> Option<&mut Bone> {
        let bone = self.bones.get_mut(index)?;
        self.dirty = true;
        Some(bone)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    #[must_use]
    pub fn bone_index_by_name(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    #[must_use]
    pub fn pose_matrix(&self) -> Option<Mat4> {
        self.pose_matrix
    }

    /// Sets the matrix root bones are expressed relative to.
    pub fn set_pose_matrix(&mut self, pose: Option<Mat4>) {
        self.pose_matrix = pose;
        self.dirty = true;
    }

    /// Replaces a bone's base (and local) matrix and rebuilds the bind-pose
    /// transforms of its subtree.
    pub fn update_bone_base_matrix(&mut self, index: usize, matrix: Mat4) -> Result<()> {
        let bone = self
            .bones
            .get_mut(index)
            .ok_or_else(|| KinemaError::UnknownBone(index.to_string()))?;
        bone.set_base_matrix(matrix);
        bone.set_local_matrix(matrix);
        self.update_difference_matrix(index, true);
        Ok(())
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.bones.iter().any(Bone::is_dirty)
    }

    pub fn mark_as_dirty(&mut self) {
        self.dirty = true;
    }

    // ========================================================================
    // Transform passes
    // ========================================================================

    /// Rebuilds the bind-pose absolute transform of `index` (and of its
    /// descendants when `update_children` is set) from the base matrices.
    pub fn update_difference_matrix(&mut self, index: usize, update_children: bool) {
        let mut stack = vec![index];
        while let Some(i) = stack.pop() {
            let Some(bone) = self.bones.get(i) else { continue };
            let parent_bind = bone.parent.map(|p| self.bones[p].absolute_bind_transform);
            let absolute = parent_bind.map_or(bone.base_matrix(), |parent| parent * bone.base_matrix());
            let inverse = absolute.inverse();

            let bone = &mut self.bones[i];
            bone.absolute_bind_transform = absolute;
            if inverse.is_finite() {
                bone.inverted_absolute_bind_transform = inverse;
            } else {
                log::warn!("Bone '{}' has a singular bind pose; keeping previous inverse", bone.name);
            }
            bone.scaling_determinant = if absolute.determinant() < 0.0 { -1.0 } else { 1.0 };

            if update_children {
                stack.extend(bone.children.iter().rev().copied());
            }
        }
        self.dirty = true;
    }

    /// Recomputes every bone's current absolute transform and its inverse.
    ///
    /// `absolute = parent.absolute * local`, with roots relative to the pose
    /// matrix. Relies on the parents-before-children storage order.
    pub fn compute_absolute_transforms(&mut self) {
        for i in 0..self.bones.len() {
            self.bones[i].flush_local_matrix();
            let local = self.bones[i].local_matrix();
            let absolute = match self.bones[i].parent {
                Some(p) => self.bones[p].absolute_transform * local,
                None => self.pose_matrix.map_or(local, |pose| pose * local),
            };
            let bone = &mut self.bones[i];
            bone.absolute_transform = absolute;
            let inverse = absolute.inverse();
            if inverse.is_finite() {
                bone.inverted_absolute_transform = inverse;
            }
        }
    }

    /// Rebuilds the flattened buffer if anything changed since the last
    /// call. Returns whether it did.
    pub fn prepare(&mut self) -> bool {
        if !self.is_dirty() {
            return false;
        }

        self.compute_absolute_transforms();

        let len = (self.bones.len() + 1) * 16;
        if self.transform_matrices.len() != len {
            self.transform_matrices.resize(len, 0.0);
        }
        for (bone, slot) in self.bones.iter().zip(self.transform_matrices.chunks_exact_mut(16)) {
            let skin = bone.absolute_transform * bone.inverted_absolute_bind_transform;
            skin.write_cols_to_slice(slot);
        }
        let sentinel = self.bones.len() * 16;
        Mat4::IDENTITY.write_cols_to_slice(&mut self.transform_matrices[sentinel..]);

        if self.use_texture_to_store_bone_matrices {
            self.texture_data.clear();
            self.texture_data.extend_from_slice(&self.transform_matrices);
        }

        for bone in &mut self.bones {
            bone.clear_dirty();
        }
        self.dirty = false;
        self.prepare_count += 1;
        true
    }

    /// `(bone_count + 1) * 16` floats, valid after [`Skeleton::prepare`].
    #[must_use]
    pub fn transform_matrices(&self) -> &[f32] {
        &self.transform_matrices
    }

    /// The buffer as raw bytes, ready for a storage buffer upload.
    #[must_use]
    pub fn transform_matrices_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.transform_matrices)
    }

    /// RGBA32F texel data mirroring the buffer, when texture storage is on.
    #[must_use]
    pub fn bone_texture(&self) -> Option<&[f32]> {
        self.use_texture_to_store_bone_matrices
            .then_some(self.texture_data.as_slice())
    }

    /// Texture dimensions in texels: four texels per matrix, one row.
    #[must_use]
    pub fn texture_size(&self) -> (u32, u32) {
        (((self.bones.len() + 1) * 4) as u32, 1)
    }

    #[must_use]
    pub fn prepare_count(&self) -> u64 {
        self.prepare_count
    }

    // ========================================================================
    // World-space edits
    // ========================================================================

    /// Transform the bone's local space is expressed in: the parent's
    /// absolute transform, the pose matrix for roots, or identity.
    fn parent_space(&self, index: usize) -> Option<Mat4> {
        let bone = self.bones.get(index)?;
        Some(match bone.parent {
            Some(p) => self.bones[p].absolute_transform,
            None => self.pose_matrix.unwrap_or(Mat4::IDENTITY),
        })
    }

    /// Moves a bone. In world space the position is mapped through the
    /// inverse of the parent space; a singular parent aborts the edit and
    /// returns `false`.
    pub fn set_bone_position(&mut self, index: usize, position: Vec3, space: Space) -> bool {
        if index >= self.bones.len() {
            return false;
        }
        let local = match space {
            Space::Local => position,
            Space::World => {
                self.compute_absolute_transforms();
                let Some(parent) = self.parent_space(index) else { return false };
                let inverse = parent.inverse();
                if !inverse.is_finite() {
                    log::warn!("Bone '{}': parent space is singular, position edit skipped", self.bones[index].name);
                    return false;
                }
                inverse.transform_point3(position)
            }
        };
        self.bones[index].set_position(local);
        self.dirty = true;
        true
    }

    /// Rotates a bone so its orientation in `space` equals `rotation`.
    pub fn set_bone_rotation_quaternion(&mut self, index: usize, rotation: Quat, space: Space) -> bool {
        if index >= self.bones.len() {
            return false;
        }
        let local = match space {
            Space::Local => rotation,
            Space::World => {
                self.compute_absolute_transforms();
                let Some(parent) = self.parent_space(index) else { return false };
                let inverse = parent.inverse();
                if !inverse.is_finite() {
                    log::warn!("Bone '{}': parent space is singular, rotation edit skipped", self.bones[index].name);
                    return false;
                }
                let parent_rotation = rotation_of(&parent, parent.determinant());
                (parent_rotation.inverse() * rotation).normalize()
            }
        };
        self.bones[index].set_rotation_quaternion(local);
        self.dirty = true;
        true
    }

    /// Bone origin in skeleton space.
    pub fn bone_absolute_position(&mut self, index: usize) -> Option<Vec3> {
        self.bones.get(index)?;
        self.compute_absolute_transforms();
        Some(self.bones[index].absolute_transform.w_axis.truncate())
    }

    /// Bone orientation in `space`. World rotation accounts for mirrored
    /// scale through the bone's scaling determinant.
    pub fn bone_rotation_quaternion(&mut self, index: usize, space: Space) -> Option<Quat> {
        let bone = self.bones.get(index)?;
        if space == Space::Local {
            return Some(bone.rotation_quaternion());
        }
        self.compute_absolute_transforms();
        let bone = &self.bones[index];
        Some(rotation_of(&bone.absolute_transform, bone.scaling_determinant))
    }

    // ========================================================================
    // Rest pose
    // ========================================================================

    pub fn return_to_rest(&mut self) {
        for bone in &mut self.bones {
            bone.return_to_rest();
        }
        self.dirty = true;
    }

    pub fn set_current_pose_as_rest(&mut self) {
        for bone in &mut self.bones {
            bone.set_rest_pose(bone.local_matrix());
        }
    }

    // ========================================================================
    // Animation ranges
    // ========================================================================

    /// Declares a named frame range on the skeleton and on every bone's first
    /// curve. An existing range with that name is kept.
    pub fn create_animation_range(&mut self, name: &str, from: f32, to: f32) {
        if self.ranges.contains_key(name) {
            return;
        }
        self.ranges.insert(name.to_string(), CurveRange { from, to });
        for bone in &mut self.bones {
            if let Some(curve) = bone.animations.first_mut() {
                Arc::make_mut(curve).create_range(name, from, to);
            }
        }
    }

    /// Removes a range from the skeleton and its bones' first curves,
    /// optionally deleting the keys inside it.
    pub fn delete_animation_range(&mut self, name: &str, delete_frames: bool) -> Result<()> {
        for bone in &mut self.bones {
            if let Some(curve) = bone.animations.first_mut() {
                Arc::make_mut(curve).delete_range(name, delete_frames)?;
            }
        }
        self.ranges.remove(name);
        Ok(())
    }

    #[must_use]
    pub fn animation_range(&self, name: &str) -> Option<CurveRange> {
        self.ranges.get(name).copied()
    }

    /// Ranges sorted by name.
    #[must_use]
    pub fn animation_ranges(&self) -> Vec<(&str, CurveRange)> {
        let mut out: Vec<_> = self.ranges.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    // ========================================================================
    // Animation access
    // ========================================================================

    pub(crate) fn read_bone(&self, index: usize, property: BoneProperty) -> Option<AnimationValue> {
        let bone = self.bones.get(index)?;
        Some(match property {
            BoneProperty::Matrix => bone.local_matrix().into(),
            BoneProperty::Position => bone.position().into(),
            BoneProperty::RotationQuaternion => bone.rotation_quaternion().into(),
            BoneProperty::Scaling => bone.scaling().into(),
        })
    }

    pub(crate) fn write_bone(&mut self, index: usize, property: BoneProperty, value: &AnimationValue) {
        let Some(bone) = self.bones.get_mut(index) else {
            return;
        };
        match (property, *value) {
            (BoneProperty::Matrix, AnimationValue::Matrix(m)) => bone.set_local_matrix(m),
            (BoneProperty::Position, AnimationValue::Vector3(v)) => bone.set_position(v),
            (BoneProperty::RotationQuaternion, AnimationValue::Quaternion(q)) => bone.set_rotation_quaternion(q),
            (BoneProperty::Scaling, AnimationValue::Vector3(v)) => bone.set_scaling(v),
            (property, value) => {
                log::warn!(
                    "Bone '{}': {} value cannot be written to {property:?}",
                    bone.name,
                    value.data_type().name()
                );
                return;
            }
        }
        self.dirty = true;
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Serializes the skeleton. `node_id` maps linked node handles to the
    /// string ids stored in the document.
    #[must_use]
    pub fn to_document(&self, node_id: impl Fn(NodeHandle) -> Option<String>) -> SkeletonDocument {
        let bones = self
            .bones
            .iter()
            .map(|bone| BoneDocument {
                parent_bone_index: bone.parent.map_or(-1, |p| p as i32),
                index: bone.index as i32,
                name: bone.name.clone(),
                matrix: bone.base_matrix().to_cols_array().to_vec(),
                rest: Some(bone.rest_pose().to_cols_array().to_vec()),
                linked_transform_node_id: bone
                    .linked_transform_node
                    .and_then(&node_id)
                    .or_else(|| bone.pending_link_id.clone()),
                length: bone.length,
                animation: bone.animations.first().map(|c| c.to_document()),
            })
            .collect();

        let ranges = self
            .animation_ranges()
            .into_iter()
            .map(|(name, r)| RangeDocument {
                name: name.to_string(),
                from: r.from,
                to: r.to,
            })
            .collect();

        SkeletonDocument {
            name: self.name.clone(),
            id: self.id.clone(),
            bones,
            ranges,
        }
    }

    /// Rebuilds a skeleton. Bone links stay pending until the skeleton is
    /// added to a [`Scene`](crate::Scene).
    pub fn from_document(doc: &SkeletonDocument) -> Result<Self> {
        let mut skeleton = Skeleton::new(&doc.name, &doc.id);
        for (position, bone_doc) in doc.bones.iter().enumerate() {
            let parent = match bone_doc.parent_bone_index {
                i if i < 0 => None,
                i => Some(i as usize),
            };
            let local = matrix_from_slice(&bone_doc.matrix)
                .ok_or_else(|| KinemaError::InvalidData(format!("bone '{}' matrix", bone_doc.name)))?;
            let rest = match &bone_doc.rest {
                Some(values) => Some(
                    matrix_from_slice(values)
                        .ok_or_else(|| KinemaError::InvalidData(format!("bone '{}' rest pose", bone_doc.name)))?,
                ),
                None => None,
            };

            let index = skeleton.add_bone_with_poses(&bone_doc.name, parent, local, rest, None)?;
            debug_assert_eq!(index, position);
            let bone = &mut skeleton.bones[index];
            bone.length = bone_doc.length;
            bone.pending_link_id = bone_doc.linked_transform_node_id.clone();
            if let Some(animation) = &bone_doc.animation {
                bone.animations.push(Arc::new(Curve::from_document(animation)?));
            }
        }
        for range in &doc.ranges {
            skeleton.create_animation_range(&range.name, range.from, range.to);
        }
        Ok(skeleton)
    }

    pub fn to_json(&self, node_id: impl Fn(NodeHandle) -> Option<String>) -> Result<String> {
        Ok(serde_json::to_string(&self.to_document(node_id))?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let doc: SkeletonDocument = serde_json::from_str(json)?;
        Self::from_document(&doc)
    }
}

fn matrix_from_slice(values: &[f32]) -> Option<Mat4> {
    let cols: &[f32; 16] = values.get(..16)?.try_into().ok()?;
    Some(Mat4::from_cols_array(cols))
}

/// Rotation part of `m` with scale removed. A negative determinant flips the
/// axes so the result is a proper rotation.
fn rotation_of(m: &Mat4, determinant: f32) -> Quat {
    let sign = if determinant < 0.0 { -1.0 } else { 1.0 };
    let basis = Mat3::from_cols(
        m.x_axis.truncate().normalize_or_zero() * sign,
        m.y_axis.truncate().normalize_or_zero() * sign,
        m.z_axis.truncate().normalize_or_zero() * sign,
    );
    Quat::from_mat3(&basis).normalize()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoneDocument {
    pub parent_bone_index: i32,
    pub index: i32,
    pub name: String,
    pub matrix: Vec<f32>,
    #[serde(default)]
    pub rest: Option<Vec<f32>>,
    #[serde(default)]
    pub linked_transform_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animation: Option<CurveDocument>,
}

/// Serialized form of a [`Skeleton`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletonDocument {
    pub name: String,
    pub id: String,
    pub bones: Vec<BoneDocument>,
    #[serde(default)]
    pub ranges: Vec<RangeDocument>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arm() -> Skeleton {
        let mut skeleton = Skeleton::new("arm", "arm");
        let root = skeleton.add_bone("root", None, Mat4::IDENTITY).unwrap();
        let upper = skeleton
            .add_bone("upper", Some(root), Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)))
            .unwrap();
        skeleton
            .add_bone("lower", Some(upper), Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0)))
            .unwrap();
        skeleton
    }

    #[test]
    fn parent_must_precede_child() {
        let mut skeleton = Skeleton::new("s", "s");
        assert!(skeleton.add_bone("orphan", Some(0), Mat4::IDENTITY).is_err());
    }

    #[test]
    fn bind_pose_skins_to_identity() {
        let mut skeleton = arm();
        assert!(skeleton.prepare());
        let buffer = skeleton.transform_matrices();
        assert_eq!(buffer.len(), 4 * 16);
        for slot in buffer.chunks_exact(16) {
            assert!(Mat4::from_cols_slice(slot).abs_diff_eq(Mat4::IDENTITY, 1e-6));
        }
    }

    #[test]
    fn prepare_skips_clean_skeleton() {
        let mut skeleton = arm();
        assert!(skeleton.prepare());
        assert!(!skeleton.prepare());
        skeleton.bone_mut(1).unwrap().set_position(Vec3::X);
        assert!(skeleton.prepare());
        assert_eq!(skeleton.prepare_count(), 2);
    }

    #[test]
    fn absolute_transform_accumulates() {
        let mut skeleton = arm();
        assert_eq!(skeleton.bone_absolute_position(2), Some(Vec3::new(0.0, 2.0, 0.0)));
        let bone = &skeleton.bones()[2];
        assert!(
            (bone.absolute_transform() * bone.inverted_absolute_transform()).abs_diff_eq(Mat4::IDENTITY, 1e-6)
        );
    }

    #[test]
    fn world_position_edit_maps_through_parent() {
        let mut skeleton = arm();
        assert!(skeleton.set_bone_position(2, Vec3::new(1.0, 2.0, 0.0), Space::World));
        assert!(skeleton.bones()[2].position().abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));
    }

    #[test]
    fn singular_parent_aborts_world_edit() {
        let mut skeleton = arm();
        skeleton.bone_mut(1).unwrap().set_scaling(Vec3::ZERO);
        let before = skeleton.bones()[2].local_matrix();
        assert!(!skeleton.set_bone_position(2, Vec3::ONE, Space::World));
        assert_eq!(skeleton.bones()[2].local_matrix(), before);
    }

    #[test]
    fn world_rotation_edit_compensates_parent() {
        let mut skeleton = arm();
        let parent_rotation = Quat::from_rotation_z(0.5);
        skeleton.set_bone_rotation_quaternion(1, parent_rotation, Space::Local);
        let target = Quat::from_rotation_x(0.3);
        assert!(skeleton.set_bone_rotation_quaternion(2, target, Space::World));
        let world = skeleton.bone_rotation_quaternion(2, Space::World).unwrap();
        assert!(world.dot(target).abs() > 1.0 - 1e-5);
    }

    #[test]
    fn texture_mirrors_buffer() {
        let mut skeleton = arm();
        skeleton.use_texture_to_store_bone_matrices = true;
        skeleton.prepare();
        assert_eq!(skeleton.bone_texture(), Some(skeleton.transform_matrices()));
        assert_eq!(skeleton.texture_size(), (16, 1));
    }
}
