//! Loading of character assets and their upload to the GPU.
//!
//! Loading is split in two halves. The format readers ([`fbx`] and
//! [`gltf_loader`]) turn file contents into a CPU-side [`AssetData`] without
//! touching the GPU, which keeps them testable headless. [`upload`] then turns
//! an [`AssetData`] into a drawable [`Model`].

use std::collections::HashMap;

use anyhow::Context as _;

use crate::{
    data_structures::{
        bounds::Aabb,
        model::{self, Model, ModelVertex},
        node_tree::NodeTree,
        skin::{JointPalette, Skin},
        texture::Texture,
    },
    resources::{
        animation::AnimationClip,
        texture::{load_binary, texture_from_bytes},
    },
};

pub mod animation;
pub mod fbx;
pub mod gltf_loader;
pub mod texture;

/// Bind group layouts every uploaded model is built against.
#[derive(Clone, Debug)]
pub struct ModelLayouts {
    pub material: wgpu::BindGroupLayout,
    pub skin: wgpu::BindGroupLayout,
}

impl ModelLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            material: texture::material_layout(device),
            skin: model::skin_layout(device),
        }
    }
}

/// Where the colour map of a material comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageSource {
    /// Image file contents that were stored inside the asset.
    Embedded { name: String, bytes: Vec<u8> },
    /// A file next to the asset, resolved by [`load_asset`].
    External(String),
}

#[derive(Clone, Debug)]
pub struct MaterialData {
    pub name: String,
    pub base_colour: [f32; 4],
    pub image: Option<ImageSource>,
}

impl MaterialData {
    pub fn untextured(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_colour: [0.8, 0.8, 0.8, 1.0],
            image: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    pub material: usize,
    /// The node whose world transform places this mesh. Ignored by skinned
    /// vertices, which follow their joints.
    pub node: usize,
    /// Index into [`AssetData::skins`].
    pub skin: Option<usize>,
}

/// A parsed asset: node hierarchy, geometry, materials and animation clips.
///
/// Meshes are stored in the same order the node tree knows them, so mesh `i`
/// here is mesh `i` of [`NodeTree::mesh_owner`].
#[derive(Clone, Debug, Default)]
pub struct AssetData {
    pub name: String,
    pub tree: NodeTree,
    pub meshes: Vec<MeshData>,
    pub materials: Vec<MaterialData>,
    pub animations: Vec<AnimationClip>,
    pub skins: Vec<Skin>,
}

impl AssetData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds a mesh and registers its bounds with the node tree. Meshes without
    /// triangles are dropped since they can't be drawn.
    pub fn push_mesh(&mut self, mesh: MeshData) -> Option<usize> {
        if mesh.indices.is_empty() || mesh.vertices.is_empty() {
            log::debug!("Skipping empty mesh '{}' in {}", mesh.name, self.name);
            return None;
        }
        let bounds = Aabb::from_points(mesh.vertices.iter().map(|v| v.position));
        let idx = self.tree.attach_mesh(mesh.node, bounds);
        self.meshes.push(mesh);
        Some(idx)
    }

    /// World-space bounds of all geometry, if there is any.
    pub fn bounds(&self) -> Option<Aabb> {
        self.tree.bounds()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AssetFormat {
    Fbx,
    Gltf,
}

/// Decides how to read `bytes`. File contents win over the extension.
pub fn detect_format(path: &str, bytes: &[u8]) -> anyhow::Result<AssetFormat> {
    if fbx::is_binary_fbx(bytes) {
        return Ok(AssetFormat::Fbx);
    }
    if bytes.starts_with(b"glTF") {
        return Ok(AssetFormat::Gltf);
    }
    let extension = std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("fbx") => Ok(AssetFormat::Fbx),
        Some("gltf") | Some("glb") => Ok(AssetFormat::Gltf),
        _ => anyhow::bail!("{} is neither an FBX nor a glTF file", path),
    }
}

/// Parses an asset that needs no further files. External glTF buffers are
/// not resolved here, use [`load_asset`] for those.
pub fn parse_asset(path: &str, bytes: &[u8]) -> anyhow::Result<AssetData> {
    match detect_format(path, bytes)? {
        AssetFormat::Fbx => Ok(fbx::parse(bytes, path)?),
        AssetFormat::Gltf => {
            let document = ::gltf::Gltf::from_slice(bytes)?;
            gltf_loader::parse(document, &HashMap::new(), path)
        }
    }
}

/// Resolves `uri` relative to the directory of `asset_path`.
pub fn sibling_path(asset_path: &str, uri: &str) -> String {
    if uri.starts_with('/') {
        return uri.to_string();
    }
    match asset_path.rfind('/') {
        Some(idx) => format!("{}{}", &asset_path[..=idx], uri),
        None => uri.to_string(),
    }
}

/// Fetches and parses the asset at `path`, including external buffers and images.
pub async fn load_asset(path: &str, asset_root: &str) -> anyhow::Result<AssetData> {
    let bytes = load_binary(path, asset_root)
        .await
        .with_context(|| format!("fetching {}", path))?;
    let mut asset = match detect_format(path, &bytes)? {
        AssetFormat::Fbx => fbx::parse(&bytes, path)?,
        AssetFormat::Gltf => {
            let document = ::gltf::Gltf::from_slice(&bytes)?;
            let mut external = HashMap::new();
            for uri in gltf_loader::external_buffer_uris(&document) {
                let data = load_binary(&sibling_path(path, &uri), asset_root)
                    .await
                    .with_context(|| format!("fetching buffer {} of {}", uri, path))?;
                external.insert(uri, data);
            }
            gltf_loader::parse(document, &external, path)?
        }
    };
    resolve_images(&mut asset, path, asset_root).await;
    Ok(asset)
}

/// Replaces external image references with their contents. Missing images
/// are not fatal; the material falls back to its base colour.
async fn resolve_images(asset: &mut AssetData, path: &str, asset_root: &str) {
    for material in &mut asset.materials {
        let Some(ImageSource::External(uri)) = &material.image else {
            continue;
        };
        let location = sibling_path(path, uri);
        match load_binary(&location, asset_root).await {
            Ok(bytes) => {
                material.image = Some(ImageSource::Embedded {
                    name: location,
                    bytes,
                })
            }
            Err(e) => {
                log::warn!(
                    "Texture {} of material '{}' could not be loaded: {:#}",
                    location,
                    material.name,
                    e
                );
                material.image = None;
            }
        }
    }
}

/// Creates the GPU resources for a parsed asset.
pub fn upload(
    asset: AssetData,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layouts: &ModelLayouts,
) -> Model {
    let AssetData {
        name,
        tree,
        meshes,
        mut materials,
        animations,
        skins,
    } = asset;
    let palette = JointPalette::new(skins);

    if materials.is_empty() {
        materials.push(MaterialData::untextured(format!("{} default", name)));
    }
    let materials: Vec<model::Material> = materials
        .iter()
        .map(|material| {
            let diffuse = match &material.image {
                Some(ImageSource::Embedded { name, bytes }) => {
                    match texture_from_bytes(device, queue, bytes, name) {
                        Ok(texture) => texture,
                        Err(e) => {
                            log::warn!("Texture {} could not be decoded: {}", name, e);
                            Texture::create_white(device, queue)
                        }
                    }
                }
                _ => Texture::create_white(device, queue),
            };
            model::Material::new(
                device,
                &material.name,
                diffuse,
                material.base_colour,
                &layouts.material,
            )
        })
        .collect();

    let meshes = meshes
        .into_iter()
        .map(|mut mesh| {
            use wgpu::util::DeviceExt;
            palette.bind_vertices(mesh.skin, &mut mesh.vertices);
            let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{} Vertex Buffer", mesh.name)),
                contents: bytemuck::cast_slice(&mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{} Index Buffer", mesh.name)),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            let material = if mesh.material < materials.len() {
                mesh.material
            } else {
                log::warn!(
                    "Mesh '{}' references missing material #{}, using #0",
                    mesh.name,
                    mesh.material
                );
                0
            };
            model::Mesh {
                name: mesh.name,
                vertex_buffer,
                index_buffer,
                num_elements: mesh.indices.len() as u32,
                material,
            }
        })
        .collect();

    Model::new(device, name, meshes, materials, tree, animations, palette, &layouts.skin)
}

/// Fetches, parses and uploads the asset at `path`.
pub async fn load_model(
    path: &str,
    asset_root: &str,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layouts: &ModelLayouts,
) -> anyhow::Result<Model> {
    let asset = load_asset(path, asset_root).await?;
    log::debug!(
        "Parsed {}: {} nodes, {} meshes, {} skins, {} clips",
        path,
        asset.tree.len(),
        asset.meshes.len(),
        asset.skins.len(),
        asset.animations.len()
    );
    Ok(upload(asset, device, queue, layouts))
}
