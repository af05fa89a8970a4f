//! Skeletal skinning data.
//!
//! A [`Skin`] lists the nodes that act as joints of a mesh together with
//! their inverse bind matrices. All skins of a model share one joint palette
//! on the GPU; a vertex names up to four palette entries and blends them with
//! its weights. Vertices whose weights are all zero are not skinned and follow
//! the world transform of the node that owns their mesh.

use cgmath::{Matrix4, SquareMatrix};

use crate::data_structures::{instance::Instance, model::ModelVertex};

/// Joints the shader can address. 256 matrices fill the 16 KiB uniform
/// buffer WebGL2 guarantees.
pub const MAX_JOINTS: usize = 256;

#[derive(Clone, Debug, PartialEq)]
pub struct Skin {
    pub name: String,
    /// Node tree indices of the joints, in the order vertices refer to them.
    pub joints: Vec<usize>,
    /// Maps bind pose coordinates into the space of each joint.
    pub inverse_bind: Vec<Matrix4<f32>>,
}

/// Up to four joint weights of one vertex.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Influence {
    pub joints: [u32; 4],
    pub weights: [f32; 4],
}

impl Influence {
    /// Adds a joint weight, keeping only the four strongest.
    pub fn add(&mut self, joint: u32, weight: f32) {
        if weight <= 0.0 || !weight.is_finite() {
            return;
        }
        let (weakest, &min) = self
            .weights
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .unwrap_or((0, &0.0));
        if weight > min {
            self.joints[weakest] = joint;
            self.weights[weakest] = weight;
        }
    }

    /// Scales the weights to sum up to one.
    pub fn normalized(self) -> Self {
        let sum: f32 = self.weights.iter().sum();
        if sum <= 0.0 {
            return Self::default();
        }
        Self {
            joints: self.joints,
            weights: self.weights.map(|w| w / sum),
        }
    }
}

/// The skins of one model packed back to back.
#[derive(Clone, Debug, Default)]
pub struct JointPalette {
    skins: Vec<Skin>,
    /// Palette offset of each skin, `None` if it didn't fit.
    offsets: Vec<Option<u32>>,
    len: usize,
}

impl JointPalette {
    pub fn new(skins: Vec<Skin>) -> Self {
        let mut len = 0;
        let offsets = skins
            .iter()
            .map(|skin| {
                if len + skin.joints.len() > MAX_JOINTS {
                    log::warn!(
                        "Skin '{}' needs {} joints but only {} of {} are left, its meshes stay rigid",
                        skin.name,
                        skin.joints.len(),
                        MAX_JOINTS - len,
                        MAX_JOINTS
                    );
                    return None;
                }
                let offset = len as u32;
                len += skin.joints.len();
                Some(offset)
            })
            .collect();
        Self { skins, offsets, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn skins(&self) -> &[Skin] {
        &self.skins
    }

    pub fn offset(&self, skin: usize) -> Option<u32> {
        self.offsets.get(skin).copied().flatten()
    }

    /// Rewrites skin-relative joint indices of a mesh into palette indices.
    /// Meshes whose skin is unknown or didn't fit lose their weights.
    pub fn bind_vertices(&self, skin: Option<usize>, vertices: &mut [ModelVertex]) {
        let Some(skin) = skin else {
            return;
        };
        match self.offset(skin) {
            Some(offset) => {
                let count = self.skins[skin].joints.len() as u32;
                for vertex in vertices {
                    for (joint, weight) in vertex.joints.iter_mut().zip(vertex.weights.iter_mut()) {
                        if *joint >= count {
                            *weight = 0.0;
                            *joint = 0;
                        }
                        *joint += offset;
                    }
                }
            }
            None => {
                for vertex in vertices {
                    vertex.joints = [0; 4];
                    vertex.weights = [0.0; 4];
                }
            }
        }
    }

    /// Joint matrices for the current pose: world transform of each joint
    /// times its inverse bind matrix.
    pub fn matrices(&self, world: &[Instance]) -> Vec<Matrix4<f32>> {
        let mut out = Vec::with_capacity(self.len);
        for (skin, offset) in self.skins.iter().zip(&self.offsets) {
            if offset.is_none() {
                continue;
            }
            for (joint, inverse_bind) in skin.joints.iter().zip(&skin.inverse_bind) {
                let joint_world = world
                    .get(*joint)
                    .map(Instance::to_matrix)
                    .unwrap_or_else(Matrix4::identity);
                out.push(joint_world * inverse_bind);
            }
        }
        out
    }
}
