use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use kinema_animation::Curve;
use kinema_core::NodeHandle;

/// Coordinate space for bone edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Space {
    /// Relative to the parent bone.
    #[default]
    Local,
    /// Skeleton space: the accumulated transform of all ancestors.
    World,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Trs {
    scale: Vec3,
    rotation: Quat,
    position: Vec3,
}

impl Trs {
    fn from_matrix(m: &Mat4) -> Self {
        let (scale, rotation, position) = m.to_scale_rotation_translation();
        Self {
            scale,
            rotation,
            position,
        }
    }

    fn compose(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// A node in a skeleton's bone tree.
///
/// The local matrix is the source of truth. Position, rotation and scaling
/// are decomposed from it on demand and cached; editing one of them marks the
/// matrix for recomposition on the next read. Bones live inside a
/// [`Skeleton`](crate::Skeleton), which owns the hierarchy and computes the
/// absolute transforms.
#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    pub(crate) index: usize,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,

    local_matrix: Mat4,
    trs: Option<Trs>,
    needs_compose: bool,

    rest_pose: Mat4,
    base_matrix: Mat4,

    // Current pose, rebuilt by `Skeleton::compute_absolute_transforms`.
    pub(crate) absolute_transform: Mat4,
    pub(crate) inverted_absolute_transform: Mat4,
    // Bind pose, rebuilt by `Skeleton::update_difference_matrix`.
    pub(crate) absolute_bind_transform: Mat4,
    pub(crate) inverted_absolute_bind_transform: Mat4,
    pub(crate) scaling_determinant: f32,

    pub length: Option<f32>,
    pub(crate) linked_transform_node: Option<NodeHandle>,
    /// Serialized node id awaiting resolution by the scene.
    pub(crate) pending_link_id: Option<String>,
    pub animations: Vec<Arc<Curve>>,

    revision: u64,
    dirty: bool,
}

impl Bone {
    pub(crate) fn new(name: &str, index: usize, parent: Option<usize>, local: Mat4, rest: Option<Mat4>, base: Option<Mat4>) -> Self {
        Self {
            name: name.to_string(),
            index,
            parent,
            children: Vec::new(),
            local_matrix: local,
            trs: None,
            needs_compose: false,
            rest_pose: rest.unwrap_or(local),
            base_matrix: base.unwrap_or(local),
            absolute_transform: Mat4::IDENTITY,
            inverted_absolute_transform: Mat4::IDENTITY,
            absolute_bind_transform: Mat4::IDENTITY,
            inverted_absolute_bind_transform: Mat4::IDENTITY,
            scaling_determinant: 1.0,
            length: None,
            linked_transform_node: None,
            pending_link_id: None,
            animations: Vec::new(),
            revision: 0,
            dirty: true,
        }
    }

    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    #[inline]
    #[must_use]
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    // ========================================================================
    // Local transform
    // ========================================================================

    /// The local matrix, recomposed from TRS if a component was edited.
    #[must_use]
    pub fn local_matrix(&self) -> Mat4 {
        match self.trs {
            Some(trs) if self.needs_compose => trs.compose(),
            _ => self.local_matrix,
        }
    }

    pub fn set_local_matrix(&mut self, matrix: Mat4) {
        self.local_matrix = matrix;
        self.trs = None;
        self.needs_compose = false;
        self.mark_as_dirty();
    }

    /// Folds pending TRS edits back into the stored matrix.
    pub(crate) fn flush_local_matrix(&mut self) {
        if self.needs_compose
            && let Some(trs) = self.trs
        {
            self.local_matrix = trs.compose();
            self.needs_compose = false;
        }
    }

    fn decomposed(&self) -> Trs {
        self.trs.unwrap_or_else(|| Trs::from_matrix(&self.local_matrix))
    }

    fn decompose_mut(&mut self) -> &mut Trs {
        let trs = self.decomposed();
        self.trs.insert(trs)
    }

    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.decomposed().position
    }

    #[must_use]
    pub fn rotation_quaternion(&self) -> Quat {
        self.decomposed().rotation
    }

    #[must_use]
    pub fn scaling(&self) -> Vec3 {
        self.decomposed().scale
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.decompose_mut().position = position;
        self.needs_compose = true;
        self.mark_as_dirty();
    }

    pub fn set_rotation_quaternion(&mut self, rotation: Quat) {
        self.decompose_mut().rotation = rotation;
        self.needs_compose = true;
        self.mark_as_dirty();
    }

    pub fn set_scaling(&mut self, scaling: Vec3) {
        self.decompose_mut().scale = scaling;
        self.needs_compose = true;
        self.mark_as_dirty();
    }

    // ========================================================================
    // Reference poses
    // ========================================================================

    #[must_use]
    pub fn rest_pose(&self) -> Mat4 {
        self.rest_pose
    }

    pub fn set_rest_pose(&mut self, matrix: Mat4) {
        self.rest_pose = matrix;
    }

    /// The matrix the bind-pose absolute transform is built from.
    #[must_use]
    pub fn base_matrix(&self) -> Mat4 {
        self.base_matrix
    }

    pub(crate) fn set_base_matrix(&mut self, matrix: Mat4) {
        self.base_matrix = matrix;
    }

    pub fn return_to_rest(&mut self) {
        self.set_local_matrix(self.rest_pose);
    }

    // ========================================================================
    // Absolute transforms
    // ========================================================================

    /// Current pose in skeleton space, as of the last absolute-transform pass.
    #[must_use]
    pub fn absolute_transform(&self) -> Mat4 {
        self.absolute_transform
    }

    #[must_use]
    pub fn inverted_absolute_transform(&self) -> Mat4 {
        self.inverted_absolute_transform
    }

    #[must_use]
    pub fn absolute_bind_transform(&self) -> Mat4 {
        self.absolute_bind_transform
    }

    #[must_use]
    pub fn inverted_absolute_bind_transform(&self) -> Mat4 {
        self.inverted_absolute_bind_transform
    }

    /// `-1` when the bind-pose absolute transform mirrors, `1` otherwise.
    #[must_use]
    pub fn scaling_determinant(&self) -> f32 {
        self.scaling_determinant
    }

    // ========================================================================
    // Links & dirtiness
    // ========================================================================

    /// Makes the bone follow a scene node's local TRS each frame.
    pub fn link_transform_node(&mut self, node: Option<NodeHandle>) {
        self.linked_transform_node = node;
        self.pending_link_id = None;
        self.mark_as_dirty();
    }

    #[must_use]
    pub fn linked_transform_node(&self) -> Option<NodeHandle> {
        self.linked_transform_node
    }

    pub fn mark_as_dirty(&mut self) {
        self.revision = self.revision.wrapping_add(1);
        self.dirty = true;
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Incremented on every mutation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}
