//! Node hierarchy matrix update.
//!
//! Kept apart from [`Scene`](crate::Scene) so it only borrows the node map and
//! root list.

use glam::Affine3A;
use kinema_core::NodeHandle;
use slotmap::SlotMap;

use crate::node::TransformNode;

/// Updates local and world matrices below `roots`, depth first.
///
/// Uses an explicit stack instead of recursion. A world matrix is only
/// rebuilt when the node's local matrix or one of its ancestors changed.
pub fn update_hierarchy(nodes: &mut SlotMap<NodeHandle, TransformNode>, roots: &[NodeHandle]) {
    // (node, parent world matrix, parent changed)
    let mut stack: Vec<(NodeHandle, Affine3A, bool)> = Vec::with_capacity(64);
    for &root in roots.iter().rev() {
        stack.push((root, Affine3A::IDENTITY, false));
    }

    while let Some((handle, parent_world, parent_changed)) = stack.pop() {
        let Some(node) = nodes.get_mut(handle) else {
            continue;
        };

        let local_changed = node.transform.update_local_matrix();
        let world_changed = local_changed || parent_changed;
        if world_changed {
            let world = parent_world * *node.transform.local_matrix();
            node.transform.set_world_matrix(world);
        }

        let world = *node.transform.world_matrix();
        for &child in node.children.iter().rev() {
            stack.push((child, world, world_changed));
        }
    }
}
