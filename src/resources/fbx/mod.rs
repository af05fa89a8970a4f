//! Binary FBX support.
//!
//! Only what a rigged character export needs for display is read: the model
//! hierarchy with its local transforms, mesh geometry, diffuse materials and
//! textures, skin clusters, and node animation from the animation stacks.
//! Blend shapes are skipped.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use cgmath::Matrix4;

use crate::resources::{
    AssetData, ImageSource, MaterialData, MeshData,
    animation::AnimationClip,
};

pub mod animation;
pub mod geometry;
pub mod reader;
mod skin;
pub mod transform;

use self::{
    animation::{Curve, CurveNode, Target},
    reader::{Document, FbxNode, Property},
    transform::{EulerRotation, ModelTransform, property_vec3},
};

#[derive(Clone, Debug, PartialEq)]
pub enum FbxError {
    /// The file is an ASCII FBX export.
    Ascii,
    BadMagic,
    UnsupportedVersion(u32),
    UnexpectedEof { offset: usize },
    BadOffset { offset: usize, end: u64 },
    UnknownProperty { type_code: u8, offset: usize },
    UnknownEncoding { encoding: u32, offset: usize },
    Decompress { offset: usize, reason: String },
    TooDeep,
    MissingSection(&'static str),
    InvalidGeometry(String),
}

impl fmt::Display for FbxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FbxError::Ascii => write!(f, "ASCII FBX is not supported, re-export as binary"),
            FbxError::BadMagic => write!(f, "not a binary FBX file"),
            FbxError::UnsupportedVersion(v) => write!(f, "unsupported FBX version {}", v),
            FbxError::UnexpectedEof { offset } => {
                write!(f, "unexpected end of file while reading at byte {}", offset)
            }
            FbxError::BadOffset { offset, end } => {
                write!(f, "record at byte {} has an invalid end offset {}", offset, end)
            }
            FbxError::UnknownProperty { type_code, offset } => write!(
                f,
                "unknown property type {:?} at byte {}",
                *type_code as char, offset
            ),
            FbxError::UnknownEncoding { encoding, offset } => {
                write!(f, "unknown array encoding {} at byte {}", encoding, offset)
            }
            FbxError::Decompress { offset, reason } => {
                write!(f, "could not inflate array at byte {}: {}", offset, reason)
            }
            FbxError::TooDeep => write!(f, "records are nested too deeply"),
            FbxError::MissingSection(name) => write!(f, "missing {} section", name),
            FbxError::InvalidGeometry(reason) => write!(f, "invalid geometry: {}", reason),
        }
    }
}

impl std::error::Error for FbxError {}

pub fn is_binary_fbx(bytes: &[u8]) -> bool {
    bytes.starts_with(reader::MAGIC)
}

fn looks_like_ascii_fbx(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    let head = String::from_utf8_lossy(head);
    head.trim_start().starts_with("; FBX") || head.contains("FBXHeaderExtension:")
}

/// Parses a binary FBX file into an [`AssetData`] named `name`.
pub fn parse(bytes: &[u8], name: &str) -> Result<AssetData, FbxError> {
    if !is_binary_fbx(bytes) {
        return Err(if looks_like_ascii_fbx(bytes) {
            FbxError::Ascii
        } else {
            FbxError::BadMagic
        });
    }
    let document = reader::read_document(bytes)?;
    build_asset(&document, name)
}

/// Splits an object name of the form `Name\0\x01Class` and keeps the name.
fn object_name(object: &FbxNode) -> String {
    let raw = object.prop(1).and_then(Property::as_str).unwrap_or_default();
    raw.split("\u{0}\u{1}").next().unwrap_or_default().to_string()
}

fn object_id(object: &FbxNode) -> Option<i64> {
    object.prop(0).and_then(Property::as_i64)
}

#[derive(Clone, Debug)]
struct Connection {
    child: i64,
    parent: i64,
    property: Option<String>,
}

/// Objects by id plus the connection graph between them.
struct Scene<'a> {
    objects_node: &'a FbxNode,
    objects: HashMap<i64, &'a FbxNode>,
    connections: Vec<Connection>,
}

impl<'a> Scene<'a> {
    fn new(document: &'a Document) -> Result<Self, FbxError> {
        let objects_node = document
            .node("Objects")
            .ok_or(FbxError::MissingSection("Objects"))?;
        let objects = objects_node
            .children
            .iter()
            .filter_map(|o| object_id(o).map(|id| (id, o)))
            .collect();
        let connections = document
            .node("Connections")
            .map(|c| {
                c.children_named("C")
                    .filter_map(|c| {
                        Some(Connection {
                            child: c.prop(1)?.as_i64()?,
                            parent: c.prop(2)?.as_i64()?,
                            property: c.prop(3).and_then(Property::as_str).map(str::to_string),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            objects_node,
            objects,
            connections,
        })
    }

    fn object(&self, id: i64) -> Option<&'a FbxNode> {
        self.objects.get(&id).copied()
    }

    fn is(&self, id: i64, kind: &str) -> bool {
        self.object(id).is_some_and(|o| o.name == kind)
    }

    /// Ids connected below `parent`, in connection order.
    fn children_of<'s>(&'s self, parent: i64) -> impl Iterator<Item = &'s Connection> + 's {
        self.connections.iter().filter(move |c| c.parent == parent)
    }

    fn parents_of<'s>(&'s self, child: i64) -> impl Iterator<Item = &'s Connection> + 's {
        self.connections.iter().filter(move |c| c.child == child)
    }

    /// Objects of `kind` in file order.
    fn all(&self, kind: &str) -> Vec<&'a FbxNode> {
        self.objects_node
            .children
            .iter()
            .filter(|o| o.name == kind)
            .collect()
    }
}

fn build_asset(document: &Document, name: &str) -> Result<AssetData, FbxError> {
    let scene = Scene::new(document)?;
    let mut asset = AssetData::new(name);

    let (node_of_model, transforms) = build_hierarchy(&scene, &mut asset);
    let material_of = build_materials(&scene, &mut asset);
    build_meshes(&scene, &node_of_model, &transforms, &material_of, &mut asset)?;

    let rotations: HashMap<usize, &EulerRotation> = transforms
        .iter()
        .map(|(node, transform)| (*node, &transform.rotation))
        .collect();
    for stack in scene.all("AnimationStack") {
        if let Some(clip) = build_clip(&scene, stack, &node_of_model, &transforms, &rotations) {
            asset.animations.push(clip);
        }
    }
    Ok(asset)
}

/// Adds every `Model` to the node tree, parents first. Returns the tree index
/// of each model id and the static transform of each tree node.
fn build_hierarchy(
    scene: &Scene,
    asset: &mut AssetData,
) -> (HashMap<i64, usize>, HashMap<usize, ModelTransform>) {
    let models = scene.all("Model");
    let model_ids: HashSet<i64> = models.iter().filter_map(|m| object_id(m)).collect();

    let parent_model = |id: i64| -> Option<i64> {
        scene
            .parents_of(id)
            .find(|c| c.property.is_none() && model_ids.contains(&c.parent))
            .map(|c| c.parent)
    };

    let mut node_of_model: HashMap<i64, usize> = HashMap::new();
    let mut transforms: HashMap<usize, ModelTransform> = HashMap::new();
    let mut stack: Vec<(i64, Option<usize>)> = models
        .iter()
        .rev()
        .filter_map(|m| object_id(m))
        .filter(|id| parent_model(*id).is_none())
        .map(|id| (id, None))
        .collect();

    while let Some((id, parent)) = stack.pop() {
        if node_of_model.contains_key(&id) {
            log::warn!("FBX model {} is connected twice, keeping the first parent", id);
            continue;
        }
        let Some(model) = scene.object(id) else {
            continue;
        };
        let transform = ModelTransform::from_model(model);
        let idx = asset
            .tree
            .add_node(object_name(model), parent, transform.to_instance());
        node_of_model.insert(id, idx);
        transforms.insert(idx, transform);

        let children: Vec<i64> = scene
            .children_of(id)
            .filter(|c| c.property.is_none() && scene.is(c.child, "Model"))
            .map(|c| c.child)
            .collect();
        for child in children.into_iter().rev() {
            stack.push((child, Some(idx)));
        }
    }

    if node_of_model.len() < model_ids.len() {
        log::warn!(
            "{} FBX models are part of a connection cycle and were skipped",
            model_ids.len() - node_of_model.len()
        );
    }
    (node_of_model, transforms)
}

/// Reads every `Material` into the asset. Returns the asset material index of
/// each material id.
fn build_materials(
    scene: &Scene,
    asset: &mut AssetData,
) -> HashMap<i64, usize> {
    let mut material_of = HashMap::new();
    for material in scene.all("Material") {
        let Some(id) = object_id(material) else {
            continue;
        };
        let colour = property_vec3(material, "DiffuseColor")
            .or_else(|| property_vec3(material, "Diffuse"))
            .unwrap_or(cgmath::Vector3::new(0.8, 0.8, 0.8));
        let opacity = transform::property_f64(material, "Opacity").unwrap_or(1.0) as f32;
        let image = scene
            .children_of(id)
            .filter(|c| scene.is(c.child, "Texture"))
            .find(|c| {
                c.property
                    .as_deref()
                    .is_none_or(|p| p.contains("Diffuse") || p.contains("BaseColor"))
            })
            .and_then(|c| texture_image(scene, c.child));

        material_of.insert(id, asset.materials.len());
        asset.materials.push(MaterialData {
            name: object_name(material),
            base_colour: [colour.x, colour.y, colour.z, opacity.clamp(0.0, 1.0)],
            image,
        });
    }
    material_of
}

/// Embedded image data of a texture if present, its file name otherwise.
fn texture_image(scene: &Scene, texture_id: i64) -> Option<ImageSource> {
    let texture = scene.object(texture_id)?;
    let file_name = texture
        .child("RelativeFilename")
        .or_else(|| texture.child("FileName"))
        .and_then(|n| n.prop(0))
        .and_then(Property::as_str)
        .filter(|s| !s.is_empty())
        .map(normalize_file_name);

    let embedded = scene
        .children_of(texture_id)
        .filter(|c| scene.is(c.child, "Video"))
        .filter_map(|c| scene.object(c.child))
        .find_map(|video| {
            let bytes = video.child("Content")?.prop(0)?.as_bytes()?;
            if bytes.is_empty() {
                return None;
            }
            Some(bytes.to_vec())
        });

    match (embedded, file_name) {
        (Some(bytes), name) => Some(ImageSource::Embedded {
            name: name.unwrap_or_else(|| format!("texture {}", texture_id)),
            bytes,
        }),
        (None, Some(name)) => Some(ImageSource::External(name)),
        (None, None) => None,
    }
}

/// Exporters write Windows paths, sometimes absolute ones. Absolute paths are
/// reduced to the bare file name.
fn normalize_file_name(raw: &str) -> String {
    let path = raw.replace('\\', "/");
    let absolute = path.starts_with('/') || path.chars().nth(1) == Some(':');
    if absolute {
        path.rsplit('/').next().unwrap_or_default().to_string()
    } else {
        path.trim_start_matches("./").to_string()
    }
}

fn build_meshes(
    scene: &Scene,
    node_of_model: &HashMap<i64, usize>,
    transforms: &HashMap<usize, ModelTransform>,
    material_of: &HashMap<i64, usize>,
    asset: &mut AssetData,
) -> Result<(), FbxError> {
    let mut models: Vec<(&i64, &usize)> = node_of_model.iter().collect();
    models.sort_by_key(|(_, node)| **node);

    for (&model_id, &node) in models {
        // Material slots of a mesh are the materials connected to its model, in order.
        let slots: Vec<usize> = scene
            .children_of(model_id)
            .filter(|c| scene.is(c.child, "Material"))
            .filter_map(|c| material_of.get(&c.child).copied())
            .collect();
        let geometric = transforms
            .get(&node)
            .map(|t| t.geometric)
            .unwrap_or_else(|| Matrix4::from_scale(1.0));

        let geometries: Vec<&FbxNode> = scene
            .children_of(model_id)
            .filter(|c| scene.is(c.child, "Geometry"))
            .filter_map(|c| scene.object(c.child))
            .filter(|g| g.prop(2).and_then(Property::as_str) == Some("Mesh"))
            .collect();
        for geometry in geometries {
            let geometry_name = object_name(geometry);
            let (influences, skin) = match skin::read_skin(scene, geometry, node_of_model) {
                Some((skin, influences)) => {
                    asset.skins.push(skin);
                    (influences, Some(asset.skins.len() - 1))
                }
                None => (Vec::new(), None),
            };
            let submeshes = geometry::triangulate(geometry, &geometric, &influences)?;
            for submesh in submeshes {
                let material = slots.get(submesh.material_slot).copied().unwrap_or_else(|| {
                    if !slots.is_empty() {
                        log::warn!(
                            "Geometry '{}' uses material slot {} but its model only has {}",
                            geometry_name,
                            submesh.material_slot,
                            slots.len()
                        );
                    }
                    slots.first().copied().unwrap_or(usize::MAX)
                });
                asset.push_mesh(MeshData {
                    name: geometry_name.clone(),
                    vertices: submesh.vertices,
                    indices: submesh.indices,
                    material,
                    node,
                    skin,
                });
            }
        }
    }

    // Meshes without any material share one untextured material.
    if asset.meshes.iter().any(|m| m.material == usize::MAX) {
        let fallback = asset.materials.len();
        asset.materials.push(MaterialData::untextured("default"));
        for mesh in asset.meshes.iter_mut().filter(|m| m.material == usize::MAX) {
            mesh.material = fallback;
        }
    }
    Ok(())
}

fn build_clip(
    scene: &Scene,
    stack: &FbxNode,
    node_of_model: &HashMap<i64, usize>,
    transforms: &HashMap<usize, ModelTransform>,
    rotations: &HashMap<usize, &EulerRotation>,
) -> Option<AnimationClip> {
    let stack_id = object_id(stack)?;
    let layers: Vec<i64> = scene
        .children_of(stack_id)
        .filter(|c| scene.is(c.child, "AnimationLayer"))
        .map(|c| c.child)
        .collect();

    let mut curve_nodes = Vec::new();
    for layer in layers {
        let ids: Vec<i64> = scene
            .children_of(layer)
            .filter(|c| scene.is(c.child, "AnimationCurveNode"))
            .map(|c| c.child)
            .collect();
        for id in ids {
            if let Some(curve_node) = read_curve_node(scene, id, node_of_model, transforms) {
                curve_nodes.push(curve_node);
            }
        }
    }
    if curve_nodes.is_empty() {
        return None;
    }

    let channels = animation::resample(&curve_nodes, |node| rotations.get(&node).copied());
    Some(AnimationClip::new(object_name(stack), channels))
}

fn read_curve_node(
    scene: &Scene,
    id: i64,
    node_of_model: &HashMap<i64, usize>,
    transforms: &HashMap<usize, ModelTransform>,
) -> Option<CurveNode> {
    let (target, node) = scene.parents_of(id).find_map(|c| {
        let target = Target::from_property(c.property.as_deref()?)?;
        Some((target, *node_of_model.get(&c.parent)?))
    })?;

    let object = scene.object(id)?;
    let fallback = transforms.get(&node).map(|t| match target {
        Target::Translation => t.translation,
        Target::Rotation => t.rotation_degrees,
        Target::Scale => t.scale,
    });
    let defaults = [
        transform::property_f64(object, "d|X").map(|v| v as f32),
        transform::property_f64(object, "d|Y").map(|v| v as f32),
        transform::property_f64(object, "d|Z").map(|v| v as f32),
    ];
    let defaults = [
        defaults[0].or(fallback.map(|f| f.x)).unwrap_or(0.0),
        defaults[1].or(fallback.map(|f| f.y)).unwrap_or(0.0),
        defaults[2].or(fallback.map(|f| f.z)).unwrap_or(0.0),
    ];

    let mut axes: [Option<Curve>; 3] = [None, None, None];
    for connection in scene.children_of(id) {
        let axis = match connection.property.as_deref() {
            Some("d|X") => 0,
            Some("d|Y") => 1,
            Some("d|Z") => 2,
            _ => continue,
        };
        axes[axis] = scene
            .object(connection.child)
            .filter(|o| o.name == "AnimationCurve")
            .and_then(Curve::from_node);
    }
    if axes.iter().all(Option::is_none) {
        return None;
    }
    Some(CurveNode {
        target,
        node,
        axes,
        defaults,
    })
}
