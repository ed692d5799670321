//! Drawable hierarchy
//!
//! Nodes live in a slotmap arena and refer to their children by key, so a
//! removed subtree can never be reached through a stale handle.

use std::sync::Arc;

use cloudproj_math::mat4::{self, Mat4};
use slotmap::{new_key_type, SlotMap};

use crate::PointStore;

new_key_type! {
    /// Key to a node of a [`SceneTree`]
    pub struct NodeKey;
}

/// What a node draws
#[derive(Clone, Debug)]
pub enum Drawable {
    /// Pure transform node
    Group,
    /// A loaded point cloud
    PointCloud(Arc<PointStore>),
}

/// One node of the tree
#[derive(Clone, Debug)]
pub struct SceneNode {
    pub name: String,
    /// Transform relative to the parent
    pub transform: Mat4,
    pub drawable: Drawable,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
}

impl SceneNode {
    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }
}

/// A point cloud with its composed world transform
#[derive(Clone, Debug)]
pub struct PlacedCloud {
    pub key: NodeKey,
    pub name: String,
    pub world_transform: Mat4,
    pub store: Arc<PointStore>,
}

/// Arena of drawables rooted at a single group node
#[derive(Debug)]
pub struct SceneTree {
    nodes: SlotMap<NodeKey, SceneNode>,
    root: NodeKey,
}

impl Default for SceneTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneTree {
    /// Create a tree holding only the root group
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(SceneNode {
            name: "root".to_string(),
            transform: mat4::IDENTITY,
            drawable: Drawable::Group,
            parent: None,
            children: Vec::new(),
        });
        Self { nodes, root }
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    /// Number of nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn get(&self, key: NodeKey) -> Option<&SceneNode> {
        self.nodes.get(key)
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut SceneNode> {
        self.nodes.get_mut(key)
    }

    /// Attach a new node under `parent`; `None` if the parent is gone
    pub fn insert(
        &mut self,
        parent: NodeKey,
        name: impl Into<String>,
        transform: Mat4,
        drawable: Drawable,
    ) -> Option<NodeKey> {
        if !self.nodes.contains_key(parent) {
            return None;
        }
        let key = self.nodes.insert(SceneNode {
            name: name.into(),
            transform,
            drawable,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(key);
        Some(key)
    }

    pub fn add_group(&mut self, parent: NodeKey, name: impl Into<String>, transform: Mat4) -> Option<NodeKey> {
        self.insert(parent, name, transform, Drawable::Group)
    }

    pub fn add_point_cloud(
        &mut self,
        parent: NodeKey,
        name: impl Into<String>,
        transform: Mat4,
        store: Arc<PointStore>,
    ) -> Option<NodeKey> {
        self.insert(parent, name, transform, Drawable::PointCloud(store))
    }

    /// Remove a node and its whole subtree; the root cannot be removed
    pub fn remove(&mut self, key: NodeKey) -> bool {
        if key == self.root || !self.nodes.contains_key(key) {
            return false;
        }
        if let Some(parent) = self.nodes[key].parent {
            if let Some(p) = self.nodes.get_mut(parent) {
                p.children.retain(|&c| c != key);
            }
        }
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            if let Some(node) = self.nodes.remove(k) {
                stack.extend(node.children);
            }
        }
        true
    }

    /// Depth-first list of point clouds with composed transforms
    pub fn flatten(&self) -> Vec<PlacedCloud> {
        let mut out = Vec::new();
        let mut stack = vec![(self.root, mat4::IDENTITY)];
        while let Some((key, parent_transform)) = stack.pop() {
            let Some(node) = self.nodes.get(key) else { continue };
            let world = mat4::mul(parent_transform, node.transform);
            if let Drawable::PointCloud(store) = &node.drawable {
                out.push(PlacedCloud {
                    key,
                    name: node.name.clone(),
                    world_transform: world,
                    store: Arc::clone(store),
                });
            }
            // Reverse so children come out in insertion order
            for &child in node.children.iter().rev() {
                stack.push((child, world));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudproj_math::Vec3;

    fn cloud() -> Arc<PointStore> {
        Arc::new(PointStore::new())
    }

    #[test]
    fn test_new_tree() {
        let tree = SceneTree::new();
        assert_eq!(tree.len(), 1);
        assert!(tree.is_empty());
        assert!(tree.flatten().is_empty());
    }

    #[test]
    fn test_transforms_compose() {
        let mut tree = SceneTree::new();
        let group = tree
            .add_group(tree.root(), "offset", mat4::translation(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        tree.add_point_cloud(group, "street", mat4::translation(Vec3::new(0.0, 2.0, 0.0)), cloud())
            .unwrap();

        let placed = tree.flatten();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].name, "street");
        let origin = mat4::transform_point(&placed[0].world_transform, Vec3::ZERO);
        assert_eq!(origin, [1.0, 2.0, 0.0, 1.0]);
    }

    #[test]
    fn test_flatten_order() {
        let mut tree = SceneTree::new();
        let root = tree.root();
        tree.add_point_cloud(root, "a", mat4::IDENTITY, cloud());
        let g = tree.add_group(root, "g", mat4::IDENTITY).unwrap();
        tree.add_point_cloud(g, "b", mat4::IDENTITY, cloud());
        tree.add_point_cloud(root, "c", mat4::IDENTITY, cloud());

        let names: Vec<_> = tree.flatten().into_iter().map(|p| p.name).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_remove_subtree_invalidates_keys() {
        let mut tree = SceneTree::new();
        let g = tree.add_group(tree.root(), "g", mat4::IDENTITY).unwrap();
        let leaf = tree.add_point_cloud(g, "leaf", mat4::IDENTITY, cloud()).unwrap();

        assert!(tree.remove(g));
        assert!(tree.get(leaf).is_none());
        assert!(tree.get(tree.root()).unwrap().children().is_empty());
        assert!(tree.add_group(g, "orphan", mat4::IDENTITY).is_none());
        assert!(!tree.remove(tree.root()));
    }
}
