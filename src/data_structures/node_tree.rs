//! CPU-side node hierarchy of a loaded asset.
//!
//! The tree is stored flat: nodes are pushed parent-first, so a single forward
//! pass resolves every world transform. Meshes hang off nodes by index and only
//! their local bounding boxes are kept here; the GPU buffers live in
//! [`crate::data_structures::model::Model`].

use crate::data_structures::{bounds::Aabb, instance::Instance};

#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub parent: Option<usize>,
    pub local: Instance,
    pub meshes: Vec<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct NodeTree {
    /// Transform applied above every root node, e.g. the unit conversion scale.
    pub root: Instance,
    nodes: Vec<Node>,
    mesh_bounds: Vec<Aabb>,
    mesh_owner: Vec<usize>,
}

impl NodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node and returns its index.
    ///
    /// Parents must already be part of the tree; a dangling parent index is
    /// logged and the node becomes a root.
    pub fn add_node(&mut self, name: impl Into<String>, parent: Option<usize>, local: Instance) -> usize {
        let idx = self.nodes.len();
        let parent = match parent {
            Some(p) if p < idx => Some(p),
            Some(p) => {
                log::warn!("Node #{} references unknown parent #{}, attaching to root", idx, p);
                None
            }
            None => None,
        };
        self.nodes.push(Node {
            name: name.into(),
            parent,
            local,
            meshes: Vec::new(),
        });
        idx
    }

    /// Registers a mesh with the node that draws it and returns the mesh index.
    pub fn attach_mesh(&mut self, node: usize, local_bounds: Aabb) -> usize {
        let mesh = self.mesh_bounds.len();
        self.mesh_bounds.push(local_bounds);
        self.mesh_owner.push(node);
        if let Some(node) = self.nodes.get_mut(node) {
            node.meshes.push(mesh);
        }
        mesh
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn mesh_count(&self) -> usize {
        self.mesh_bounds.len()
    }

    /// The node that owns mesh `mesh`.
    pub fn mesh_owner(&self, mesh: usize) -> Option<usize> {
        self.mesh_owner.get(mesh).copied()
    }

    pub fn node(&self, idx: usize) -> Option<&Node> {
        self.nodes.get(idx)
    }

    pub fn node_mut(&mut self, idx: usize) -> Option<&mut Node> {
        self.nodes.get_mut(idx)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// World transforms of all nodes, including the root transform.
    pub fn world_transforms(&self) -> Vec<Instance> {
        let mut world: Vec<Instance> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let parent = match node.parent {
                Some(p) => &world[p],
                None => &self.root,
            };
            let transform = parent * &node.local;
            world.push(transform);
        }
        world
    }

    /// Bounding box of every mesh in world space, or `None` if the tree draws nothing.
    pub fn bounds(&self) -> Option<Aabb> {
        let world = self.world_transforms();
        let aabb = self
            .mesh_bounds
            .iter()
            .zip(self.mesh_owner.iter())
            .filter_map(|(local, owner)| {
                world.get(*owner).map(|w| local.transformed(&w.to_matrix()))
            })
            .fold(Aabb::empty(), |acc, b| acc.union(&b));
        if aabb.is_empty() { None } else { Some(aabb) }
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Point3, Vector3};

    use super::*;

    fn unit_cube() -> Aabb {
        Aabb::from_points([[-0.5, -0.5, -0.5], [0.5, 0.5, 0.5]])
    }

    #[test]
    fn child_inherits_parent_translation() {
        let mut tree = NodeTree::new();
        let hips = tree.add_node("hips", None, Vector3::new(0.0, 1.0, 0.0).into());
        let head = tree.add_node("head", Some(hips), Vector3::new(0.0, 0.5, 0.0).into());
        let world = tree.world_transforms();
        assert_eq!(world[head].position, Vector3::new(0.0, 1.5, 0.0));
    }

    #[test]
    fn bounds_follow_the_root_scale() {
        let mut tree = NodeTree::new();
        let body = tree.add_node("body", None, Vector3::new(0.0, 100.0, 0.0).into());
        tree.attach_mesh(body, unit_cube());
        tree.root = Instance::uniform_scale(0.01);

        let bounds = tree.bounds().expect("tree has a mesh");
        let center = bounds.center();
        assert!((center.y - 1.0).abs() < 1e-5);
        assert!((bounds.size().x - 0.01).abs() < 1e-6);
        assert_eq!(Point3::new(center.x, 0.0, center.z), Point3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn tree_without_meshes_has_no_bounds() {
        let mut tree = NodeTree::new();
        tree.add_node("empty", None, Instance::new());
        assert!(tree.bounds().is_none());
    }

    #[test]
    fn dangling_parent_becomes_root() {
        let mut tree = NodeTree::new();
        let idx = tree.add_node("orphan", Some(7), Instance::new());
        assert_eq!(tree.node(idx).and_then(|n| n.parent), None);
    }
}
