//! Fixed lighting rig: ambient, a key light aimed at the origin and a fill
//! light that rides on the camera eye.

use cgmath::{EuclideanSpace, InnerSpace, Point3, Vector3};
use wgpu::util::DeviceExt;

use crate::config::{LightingConfig, hex_to_linear};

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    // Every field is a vec4 on the shader side to keep uniform alignment simple.
    pub ambient: [f32; 4],
    pub key_direction: [f32; 4],
    pub key_color: [f32; 4],
    pub fill_direction: [f32; 4],
    pub fill_color: [f32; 4],
}

#[derive(Clone, Debug, PartialEq)]
pub struct LightRig {
    pub ambient: [f32; 3],
    pub key_position: Point3<f32>,
    pub key_target: Point3<f32>,
    pub key_intensity: f32,
    pub fill_intensity: f32,
    /// Where the fill light points. Moved by framing, independent of the orbit target.
    pub fill_target: Point3<f32>,
}

impl LightRig {
    pub fn from_config(config: &LightingConfig) -> Self {
        Self {
            ambient: hex_to_linear(config.ambient),
            key_position: config.key_position.into(),
            key_target: Point3::origin(),
            key_intensity: config.key_intensity,
            fill_intensity: config.fill_intensity,
            fill_target: Point3::origin(),
        }
    }

    /// Direction the fill light shines in when it sits at `eye`.
    pub fn fill_direction(&self, eye: Point3<f32>) -> Vector3<f32> {
        direction(eye, self.fill_target)
    }

    pub fn key_direction(&self) -> Vector3<f32> {
        direction(self.key_position, self.key_target)
    }

    pub fn uniform(&self, eye: Point3<f32>) -> LightUniform {
        let [r, g, b] = self.ambient;
        let white = |intensity: f32| [intensity, intensity, intensity, 1.0];
        LightUniform {
            ambient: [r, g, b, 1.0],
            key_direction: self.key_direction().extend(0.0).into(),
            key_color: white(self.key_intensity),
            fill_direction: self.fill_direction(eye).extend(0.0).into(),
            fill_color: white(self.fill_intensity),
        }
    }
}

/// Unit vector from `from` to `to`, straight down if the points coincide.
fn direction(from: Point3<f32>, to: Point3<f32>) -> Vector3<f32> {
    let d = to - from;
    if d.magnitude2() > f32::EPSILON {
        d.normalize()
    } else {
        -Vector3::unit_y()
    }
}

#[derive(Debug)]
pub struct LightResources {
    pub rig: LightRig,
    pub uniform: LightUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

impl LightResources {
    pub fn new(device: &wgpu::Device, rig: LightRig, eye: Point3<f32>) -> Self {
        let uniform = rig.uniform(eye);
        let buffer = mk_buffer(device, uniform);
        let bind_group_layout = mk_bind_group_layout(device);
        let bind_group = mk_bind_group(device, &bind_group_layout, &buffer);
        Self {
            rig,
            uniform,
            buffer,
            bind_group,
            bind_group_layout,
        }
    }

    /// Re-aims the fill light from the current eye and uploads the rig.
    pub fn write_to_buffer(&mut self, queue: &wgpu::Queue, eye: Point3<f32>) {
        self.uniform = self.rig.uniform(eye);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

pub fn mk_buffer(device: &wgpu::Device, light_uniform: LightUniform) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Light Buffer"),
        contents: bytemuck::cast_slice(&[light_uniform]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

pub fn mk_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some("light_bind_group_layout"),
    })
}

pub fn mk_bind_group(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    light_buffer: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout: bind_group_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: light_buffer.as_entire_binding(),
        }],
        label: Some("light_bind_group"),
    })
}
