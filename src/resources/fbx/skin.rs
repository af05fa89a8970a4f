//! Skin deformers: a `Deformer` of class `Skin` hangs below a geometry and
//! owns one `Cluster` sub-deformer per bone. A cluster lists the control points
//! it moves with their weights, the bone's bind pose (`TransformLink`) and the
//! mesh's bind pose (`Transform`).

use std::collections::HashMap;

use cgmath::{Matrix4, SquareMatrix};

use super::{
    Scene, object_id, object_name,
    reader::{FbxNode, Property},
};
use crate::data_structures::skin::{Influence, Skin};

/// Reads a column-major 4x4 matrix stored as 16 doubles.
fn matrix(object: &FbxNode, name: &str) -> Option<Matrix4<f32>> {
    let m = object.child(name)?.prop(0)?.to_f64_vec()?;
    if m.len() < 16 {
        return None;
    }
    let m: Vec<f32> = m.iter().map(|&v| v as f32).collect();
    Some(Matrix4::new(
        m[0], m[1], m[2], m[3], m[4], m[5], m[6], m[7], m[8], m[9], m[10], m[11], m[12], m[13],
        m[14], m[15],
    ))
}

fn is_kind(object: &FbxNode, name: &str, class: &str) -> bool {
    object.name == name && object.prop(2).and_then(Property::as_str) == Some(class)
}

/// The skin bound to `geometry` and the joint weights of every control point.
/// `None` if the geometry isn't skinned or none of its clusters reach a bone.
pub(super) fn read_skin(
    scene: &Scene,
    geometry: &FbxNode,
    node_of_model: &HashMap<i64, usize>,
) -> Option<(Skin, Vec<Influence>)> {
    let geometry_id = object_id(geometry)?;
    let (skin_id, skin_object) = scene
        .children_of(geometry_id)
        .filter_map(|c| Some((c.child, scene.object(c.child)?)))
        .find(|(_, o)| is_kind(o, "Deformer", "Skin"))?;

    let control_points = geometry
        .child("Vertices")
        .and_then(|n| n.prop(0))
        .and_then(Property::to_f64_vec)
        .map_or(0, |v| v.len() / 3);
    let mut influences = vec![Influence::default(); control_points];
    let mut skin = Skin {
        name: object_name(skin_object),
        joints: Vec::new(),
        inverse_bind: Vec::new(),
    };

    let clusters: Vec<&FbxNode> = scene
        .children_of(skin_id)
        .filter_map(|c| scene.object(c.child))
        .filter(|o| is_kind(o, "Deformer", "Cluster"))
        .collect();
    for cluster in clusters {
        let cluster_name = object_name(cluster);
        let Some(joint) = object_id(cluster).and_then(|id| {
            scene
                .children_of(id)
                .find_map(|c| node_of_model.get(&c.child).copied())
        }) else {
            log::warn!("Cluster '{}' is not linked to a bone, skipping it", cluster_name);
            continue;
        };
        let link = matrix(cluster, "TransformLink").unwrap_or_else(Matrix4::identity);
        let Some(link_inverse) = link.invert() else {
            log::warn!("Bind pose of cluster '{}' is singular, skipping it", cluster_name);
            continue;
        };
        let transform = matrix(cluster, "Transform").unwrap_or_else(Matrix4::identity);

        let indexes = cluster
            .child("Indexes")
            .and_then(|n| n.prop(0))
            .and_then(Property::to_i64_vec)
            .unwrap_or_default();
        let weights = cluster
            .child("Weights")
            .and_then(|n| n.prop(0))
            .and_then(Property::to_f64_vec)
            .unwrap_or_default();
        let slot = skin.joints.len() as u32;
        for (&index, &weight) in indexes.iter().zip(&weights) {
            match usize::try_from(index).ok().and_then(|i| influences.get_mut(i)) {
                Some(influence) => influence.add(slot, weight as f32),
                None => log::debug!(
                    "Cluster '{}' weights control point {} of {}",
                    cluster_name,
                    index,
                    control_points
                ),
            }
        }
        skin.joints.push(joint);
        skin.inverse_bind.push(link_inverse * transform);
    }

    if skin.joints.is_empty() {
        return None;
    }
    Some((skin, influences.into_iter().map(Influence::normalized).collect()))
}
