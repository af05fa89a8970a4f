//! GPU-side model: vertex layout, meshes, materials and drawing.
//!
//! A [`Model`] is what [`crate::resources::upload`] makes out of a parsed
//! asset. It keeps the CPU [`NodeTree`] around so animation can move nodes and
//! re-upload the per-mesh world transforms and joint matrices every frame.

use std::ops::Range;

use wgpu::util::DeviceExt;

use crate::{
    data_structures::{
        instance::InstanceRaw,
        node_tree::NodeTree,
        skin::{JointPalette, MAX_JOINTS},
        texture,
    },
    resources::animation::AnimationClip,
    swapper::{Dispose, SceneAsset},
};

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
    /// Joint palette entries, see [`crate::data_structures::skin`].
    pub joints: [u32; 4],
    /// All zero for rigid vertices.
    pub weights: [f32; 4],
}

impl ModelVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x2,
        2 => Float32x3,
        3 => Uint32x4,
        4 => Float32x4,
    ];
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Material constants as the fragment shader sees them.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    pub base_colour: [f32; 4],
}

#[derive(Debug)]
pub struct Material {
    pub name: String,
    pub diffuse_texture: texture::Texture,
    pub uniform_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl Material {
    pub fn new(
        device: &wgpu::Device,
        name: &str,
        diffuse_texture: texture::Texture,
        base_colour: [f32; 4],
        layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Material Buffer", name)),
            contents: bytemuck::cast_slice(&[MaterialUniform { base_colour }]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let fallback_sampler;
        let sampler = match &diffuse_texture.sampler {
            Some(sampler) => sampler,
            None => {
                fallback_sampler = texture::create_default_sampler(device);
                &fallback_sampler
            }
        };
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&diffuse_texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
            label: Some(name),
        });

        Self {
            name: String::from(name),
            diffuse_texture,
            uniform_buffer,
            bind_group,
        }
    }
}

/// Layout of group 3: the joint palette of the drawn model.
pub fn skin_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("skin_bind_group_layout"),
    })
}

#[derive(Debug)]
pub struct Mesh {
    pub name: String,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_elements: u32,
    pub material: usize,
}

#[derive(Debug)]
pub struct Model {
    pub name: String,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub tree: NodeTree,
    pub animations: Vec<AnimationClip>,
    /// One instance per mesh, holding the world transform of the owning node.
    pub instance_buffer: wgpu::Buffer,
    pub palette: JointPalette,
    /// Always sized for [`MAX_JOINTS`] matrices, the shader declares a fixed array.
    pub joint_buffer: wgpu::Buffer,
    pub skin_bind_group: wgpu::BindGroup,
    disposed: bool,
}

impl Model {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &wgpu::Device,
        name: impl Into<String>,
        meshes: Vec<Mesh>,
        materials: Vec<Material>,
        tree: NodeTree,
        animations: Vec<AnimationClip>,
        palette: JointPalette,
        skin_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let raw = Self::raw_instances(&tree);
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Instance Buffer"),
            contents: bytemuck::cast_slice(&raw),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        let mut joints = Self::joint_matrices(&tree, &palette);
        joints.resize(MAX_JOINTS, [[0.0; 4]; 4]);
        let joint_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Joint Buffer"),
            contents: bytemuck::cast_slice(&joints),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let skin_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: skin_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: joint_buffer.as_entire_binding(),
            }],
            label: Some("skin_bind_group"),
        });

        Self {
            name: name.into(),
            meshes,
            materials,
            tree,
            animations,
            instance_buffer,
            palette,
            joint_buffer,
            skin_bind_group,
            disposed: false,
        }
    }

    fn joint_matrices(tree: &NodeTree, palette: &JointPalette) -> Vec<[[f32; 4]; 4]> {
        if palette.is_empty() {
            return Vec::new();
        }
        palette
            .matrices(&tree.world_transforms())
            .into_iter()
            .map(Into::into)
            .collect()
    }

    fn raw_instances(tree: &NodeTree) -> Vec<InstanceRaw> {
        let world = tree.world_transforms();
        let mut raw: Vec<InstanceRaw> = (0..tree.mesh_count())
            .map(|mesh| {
                tree.mesh_owner(mesh)
                    .and_then(|owner| world.get(owner))
                    .map(|w| w.to_raw())
                    .unwrap_or_else(|| tree.root.to_raw())
            })
            .collect();
        // wgpu rejects zero sized vertex buffers.
        if raw.is_empty() {
            raw.push(tree.root.to_raw());
        }
        raw
    }

    /// Uploads the current world transform of every mesh and the current
    /// joint matrices.
    pub fn write_to_buffers(&self, queue: &wgpu::Queue) {
        if self.disposed {
            return;
        }
        let raw = Self::raw_instances(&self.tree);
        queue.write_buffer(&self.instance_buffer, 0, bytemuck::cast_slice(&raw));
        let joints = Self::joint_matrices(&self.tree, &self.palette);
        if !joints.is_empty() {
            queue.write_buffer(&self.joint_buffer, 0, bytemuck::cast_slice(&joints));
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Dispose for Model {
    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        for mesh in &self.meshes {
            mesh.vertex_buffer.destroy();
            mesh.index_buffer.destroy();
        }
        for material in &self.materials {
            material.diffuse_texture.destroy();
            material.uniform_buffer.destroy();
        }
        self.instance_buffer.destroy();
        self.joint_buffer.destroy();
        self.disposed = true;
        log::debug!(
            "Released {} meshes and {} materials of '{}'",
            self.meshes.len(),
            self.materials.len(),
            self.name
        );
    }
}

impl SceneAsset for Model {
    fn animations(&self) -> &[AnimationClip] {
        &self.animations
    }

    fn node_tree(&self) -> &NodeTree {
        &self.tree
    }

    fn node_tree_mut(&mut self) -> &mut NodeTree {
        &mut self.tree
    }
}

pub trait DrawModel<'a> {
    fn draw_mesh_instanced(
        &mut self,
        mesh: &'a Mesh,
        material: &'a Material,
        instances: Range<u32>,
        camera_bind_group: &'a wgpu::BindGroup,
        light_bind_group: &'a wgpu::BindGroup,
    );
    fn draw_model(
        &mut self,
        model: &'a Model,
        camera_bind_group: &'a wgpu::BindGroup,
        light_bind_group: &'a wgpu::BindGroup,
    );
}

impl<'a, 'b> DrawModel<'b> for wgpu::RenderPass<'a>
where
    'b: 'a,
{
    fn draw_mesh_instanced(
        &mut self,
        mesh: &'b Mesh,
        material: &'b Material,
        instances: Range<u32>,
        camera_bind_group: &'b wgpu::BindGroup,
        light_bind_group: &'b wgpu::BindGroup,
    ) {
        self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.set_bind_group(0, &material.bind_group, &[]);
        self.set_bind_group(1, camera_bind_group, &[]);
        self.set_bind_group(2, light_bind_group, &[]);
        self.draw_indexed(0..mesh.num_elements, 0, instances);
    }

    /// Draws every mesh with the instance slot of its owning node.
    fn draw_model(
        &mut self,
        model: &'b Model,
        camera_bind_group: &'b wgpu::BindGroup,
        light_bind_group: &'b wgpu::BindGroup,
    ) {
        if model.is_disposed() {
            return;
        }
        self.set_vertex_buffer(1, model.instance_buffer.slice(..));
        self.set_bind_group(3, &model.skin_bind_group, &[]);
        for (idx, mesh) in model.meshes.iter().enumerate() {
            let Some(material) = model.materials.get(mesh.material) else {
                continue;
            };
            let instance = idx as u32;
            self.draw_mesh_instanced(
                mesh,
                material,
                instance..instance + 1,
                camera_bind_group,
                light_bind_group,
            );
        }
    }
}
