//! glTF 2.0 (`.gltf` and `.glb`) support.
//!
//! Buffers come from the GLB blob, base64 `data:` URIs or side files that
//! the caller fetched beforehand.

use std::collections::HashMap;

use base64::Engine as _;
use gltf::Gltf;

use crate::{
    data_structures::{instance::Instance, model::ModelVertex, skin::Skin},
    resources::{
        AssetData, ImageSource, MaterialData, MeshData,
        animation::{AnimationClip, Channel, Keyframes},
    },
};

/// URIs of buffers that live in separate files.
pub fn external_buffer_uris(gltf: &Gltf) -> Vec<String> {
    gltf.buffers()
        .filter_map(|buffer| match buffer.source() {
            gltf::buffer::Source::Uri(uri) if !uri.starts_with("data:") => Some(uri.to_string()),
            _ => None,
        })
        .collect()
}

fn decode_data_uri(uri: &str) -> anyhow::Result<Vec<u8>> {
    let (_, payload) = uri
        .split_once(";base64,")
        .ok_or_else(|| anyhow::anyhow!("only base64 data URIs are supported"))?;
    Ok(base64::engine::general_purpose::STANDARD.decode(payload)?)
}

pub fn parse(
    gltf: Gltf,
    external: &HashMap<String, Vec<u8>>,
    name: &str,
) -> anyhow::Result<AssetData> {
    // Load buffers
    let mut buffer_data: Vec<Vec<u8>> = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = gltf
                    .blob
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("GLB buffer without binary chunk"))?;
                buffer_data.push(blob.into());
            }
            gltf::buffer::Source::Uri(uri) if uri.starts_with("data:") => {
                buffer_data.push(decode_data_uri(uri)?);
            }
            gltf::buffer::Source::Uri(uri) => {
                let bin = external
                    .get(uri)
                    .ok_or_else(|| anyhow::anyhow!("buffer {} was not loaded", uri))?;
                buffer_data.push(bin.clone());
            }
        }
    }

    let mut asset = AssetData::new(name);

    // Load materials
    for material in gltf.materials() {
        let pbr = material.pbr_metallic_roughness();
        let image = pbr
            .base_color_texture()
            .and_then(|info| image_source(info.texture().source().source(), &buffer_data));
        asset.materials.push(MaterialData {
            name: material.name().unwrap_or("material").to_string(),
            base_colour: pbr.base_color_factor(),
            image,
        });
    }
    let default_material = asset.materials.len();
    let mut needs_default_material = false;

    // Nodes, parents first
    let scene = gltf
        .default_scene()
        .or_else(|| gltf.scenes().next())
        .ok_or_else(|| anyhow::anyhow!("glTF file has no scene"))?;
    let mut node_index: HashMap<usize, usize> = HashMap::new();
    let mut stack: Vec<(gltf::Node, Option<usize>)> = scene.nodes().map(|node| (node, None)).collect();
    stack.reverse();
    while let Some((node, parent)) = stack.pop() {
        let (position, rotation, scale) = node.transform().decomposed();
        let local = Instance {
            position: position.into(),
            rotation: rotation.into(),
            scale: scale.into(),
        };
        let idx = asset.tree.add_node(
            node.name().unwrap_or("node").to_string(),
            parent,
            local,
        );
        node_index.insert(node.index(), idx);

        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    log::warn!(
                        "Skipping non-triangle primitive of mesh {:?}",
                        mesh.name()
                    );
                    continue;
                }
                let reader = primitive.reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice));

                let mut vertices = Vec::new();
                if let Some(vertex_attribute) = reader.read_positions() {
                    vertex_attribute.for_each(|vertex| {
                        vertices.push(ModelVertex {
                            position: vertex,
                            normal: [0.0, 1.0, 0.0],
                            ..Default::default()
                        })
                    });
                }
                if let Some(normal_attribute) = reader.read_normals() {
                    for (vertex, normal) in vertices.iter_mut().zip(normal_attribute) {
                        vertex.normal = normal;
                    }
                }
                if let Some(tex_coord_attribute) = reader.read_tex_coords(0).map(|v| v.into_f32()) {
                    for (vertex, tex_coord) in vertices.iter_mut().zip(tex_coord_attribute) {
                        vertex.tex_coords = tex_coord;
                    }
                }
                let skin = node.skin().map(|skin| skin.index());
                if skin.is_some() {
                    if let (Some(joints), Some(weights)) = (reader.read_joints(0), reader.read_weights(0)) {
                        for ((vertex, joints), weights) in vertices
                            .iter_mut()
                            .zip(joints.into_u16())
                            .zip(weights.into_f32())
                        {
                            vertex.joints = joints.map(u32::from);
                            vertex.weights = weights;
                        }
                    }
                }

                let indices: Vec<u32> = match reader.read_indices() {
                    Some(indices_raw) => indices_raw.into_u32().collect(),
                    None => (0..vertices.len() as u32).collect(),
                };
                if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
                    anyhow::bail!("mesh {:?} references vertex {} out of range", mesh.name(), bad);
                }

                let material = match primitive.material().index() {
                    Some(material) => material,
                    None => {
                        needs_default_material = true;
                        default_material
                    }
                };
                asset.push_mesh(MeshData {
                    name: mesh.name().unwrap_or("unknown_mesh").to_string(),
                    vertices,
                    indices,
                    material,
                    node: idx,
                    skin,
                });
            }
        }

        for child in node.children().collect::<Vec<_>>().into_iter().rev() {
            stack.push((child, Some(idx)));
        }
    }
    if needs_default_material {
        asset.materials.push(MaterialData::untextured("default"));
    }

    // Skins, keyed by their glTF index until every joint is known
    let mut skin_index: HashMap<usize, usize> = HashMap::new();
    for skin in gltf.skins() {
        let joints: Option<Vec<usize>> = skin
            .joints()
            .map(|joint| node_index.get(&joint.index()).copied())
            .collect();
        let Some(joints) = joints else {
            log::warn!(
                "Skin {:?} uses joints outside the scene, its meshes stay rigid",
                skin.name()
            );
            continue;
        };
        let reader = skin.reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice));
        let mut inverse_bind: Vec<cgmath::Matrix4<f32>> = reader
            .read_inverse_bind_matrices()
            .map(|matrices| matrices.map(Into::into).collect())
            .unwrap_or_default();
        inverse_bind.resize(joints.len(), cgmath::SquareMatrix::identity());
        skin_index.insert(skin.index(), asset.skins.len());
        asset.skins.push(Skin {
            name: skin.name().unwrap_or("skin").to_string(),
            joints,
            inverse_bind,
        });
    }
    for mesh in &mut asset.meshes {
        mesh.skin = mesh.skin.and_then(|skin| skin_index.get(&skin).copied());
        if mesh.skin.is_none() {
            for vertex in &mut mesh.vertices {
                vertex.joints = [0; 4];
                vertex.weights = [0.0; 4];
            }
        }
    }

    // Load animations
    for animation in gltf.animations() {
        let mut channels = Vec::new();
        for channel in animation.channels() {
            let Some(&node) = node_index.get(&channel.target().node().index()) else {
                continue;
            };
            let reader = channel.reader(|buffer| buffer_data.get(buffer.index()).map(Vec::as_slice));
            let timestamps: Vec<f32> = match reader.read_inputs() {
                Some(times) => times.collect(),
                None => {
                    log::warn!("No timestamps found in channel {}", channel.index());
                    continue;
                }
            };
            let keyframes = match reader.read_outputs() {
                Some(gltf::animation::util::ReadOutputs::Translations(translation)) => {
                    Keyframes::Translation(translation.map(Into::into).collect())
                }
                Some(gltf::animation::util::ReadOutputs::Rotations(rotation)) => {
                    Keyframes::Rotation(rotation.into_f32().map(Into::into).collect())
                }
                Some(gltf::animation::util::ReadOutputs::Scales(scales)) => {
                    Keyframes::Scale(scales.map(Into::into).collect())
                }
                Some(gltf::animation::util::ReadOutputs::MorphTargetWeights(_)) => Keyframes::Other,
                None => {
                    log::warn!("No keyframes found in channel {}", channel.index());
                    Keyframes::Other
                }
            };
            if let Keyframes::Other = keyframes {
                continue;
            }
            channels.push(Channel {
                node,
                timestamps,
                keyframes,
            });
        }
        let name = animation.name().unwrap_or("Default").to_string();
        asset.animations.push(AnimationClip::new(name, channels));
    }

    Ok(asset)
}

fn image_source(source: gltf::image::Source, buffers: &[Vec<u8>]) -> Option<ImageSource> {
    match source {
        gltf::image::Source::View { view, mime_type } => {
            let buffer = buffers.get(view.buffer().index())?;
            let bytes = buffer.get(view.offset()..view.offset() + view.length())?;
            Some(ImageSource::Embedded {
                name: format!("image.{}", mime_type.rsplit('/').next().unwrap_or("png")),
                bytes: bytes.to_vec(),
            })
        }
        gltf::image::Source::Uri { uri, .. } if uri.starts_with("data:") => {
            match decode_data_uri(uri) {
                Ok(bytes) => Some(ImageSource::Embedded {
                    name: "embedded image".to_string(),
                    bytes,
                }),
                Err(e) => {
                    log::warn!("Image data URI could not be decoded: {}", e);
                    None
                }
            }
        }
        gltf::image::Source::Uri { uri, .. } => Some(ImageSource::External(uri.to_string())),
    }
}
