use std::{cell::Cell, rc::Rc};

use avatar_viewer::{
    data_structures::{bounds::Aabb, instance::Instance, node_tree::NodeTree},
    resources::animation::{AnimationClip, Channel, Keyframes},
    swapper::{Dispose, SceneAsset},
};

/// Counts how often the assets created from it were released.
#[derive(Debug, Default)]
pub(crate) struct State {
    dispose_invocations: Cell<u32>,
    created: Cell<u32>,
}

impl State {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn dispose(&self) {
        self.dispose_invocations.set(self.dispose_invocations.get() + 1);
    }

    pub fn dispose_invocations(&self) -> u32 {
        self.dispose_invocations.get()
    }

    pub fn created(&self) -> u32 {
        self.created.get()
    }
}

/// A GPU-free stand-in for a loaded model.
#[derive(Debug)]
pub(crate) struct MockAsset {
    pub name: String,
    pub tree: NodeTree,
    pub clips: Vec<AnimationClip>,
    pub disposed: bool,
    state: Rc<State>,
}

impl MockAsset {
    /// A 100 x 200 x 50 unit box standing on the origin, like a character
    /// exported in centimetres.
    pub fn character(name: &str, state: &Rc<State>) -> Self {
        state.created.set(state.created.get() + 1);
        let mut tree = NodeTree::new();
        let body = tree.add_node("body", None, Instance::new());
        tree.attach_mesh(
            body,
            Aabb::from_points([[-50.0, 0.0, -25.0], [50.0, 200.0, 25.0]]),
        );
        Self {
            name: name.to_string(),
            tree,
            clips: Vec::new(),
            disposed: false,
            state: state.clone(),
        }
    }

    /// Adds a clip moving the body from x = 0 to x = 10 over one second.
    pub fn with_walk(mut self, name: &str) -> Self {
        self.clips.push(AnimationClip::new(
            name.to_string(),
            vec![Channel {
                node: 0,
                timestamps: vec![0.0, 1.0],
                keyframes: Keyframes::Translation(vec![
                    cgmath::Vector3::new(0.0, 0.0, 0.0),
                    cgmath::Vector3::new(10.0, 0.0, 0.0),
                ]),
            }],
        ));
        self
    }
}

impl Dispose for MockAsset {
    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.state.dispose();
    }
}

impl SceneAsset for MockAsset {
    fn animations(&self) -> &[AnimationClip] {
        &self.clips
    }

    fn node_tree(&self) -> &NodeTree {
        &self.tree
    }

    fn node_tree_mut(&mut self) -> &mut NodeTree {
        &mut self.tree
    }
}
