use std::sync::Arc;

use anyhow::Context as _;
use winit::window::Window;

use crate::{
    camera::{self, CameraResources, OrbitController, Projection},
    config::{ViewerConfig, hex_to_linear},
    data_structures::{model::{DrawModel, Model}, texture},
    pipelines::{
        basic::mk_basic_pipeline,
        light::{LightResources, LightRig},
    },
    resources::ModelLayouts,
    swapper::Framing,
};

/// A drawable surface size. Zero sized viewports (minimised windows, hidden
/// canvases) have no `SurfaceSize`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32) -> Option<Self> {
        (width > 0 && height > 0).then_some(Self { width, height })
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

#[derive(Debug)]
pub struct Context {
    pub(crate) window: Arc<Window>,
    pub(crate) depth_texture: texture::Texture,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub camera: CameraResources,
    pub projection: Projection,
    pub light: LightResources,
    pub layouts: ModelLayouts,
    pub render_pipeline: wgpu::RenderPipeline,
    pub clear_colour: wgpu::Color,
}

impl Context {
    pub async fn new(window: Arc<Window>, viewer: &ViewerConfig) -> anyhow::Result<Self> {
        let size = window.inner_size();

        // BackendBit::PRIMARY => Vulkan + Metal + DX12 + Browser WebGPU
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("creating the render surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable graphics adapter")?;
        log::info!("Using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features, so if
                // we're building for the web we'll have to disable some.
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("requesting the graphics device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        // The shader lights in linear space and relies on an sRGB target.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no texture formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let camera_config = &viewer.camera;
        let camera = camera::Camera::new(camera_config.initial_eye, (0.0, 0.0, 0.0));
        let projection = Projection::new(
            config.width,
            config.height,
            cgmath::Deg(camera_config.fov_y_degrees),
            camera_config.near,
            camera_config.far,
        );
        // Unbounded dolly, so framing a tiny model may put the eye closer than `near`.
        let controller = OrbitController::new(0.0, f32::INFINITY);
        let eye = camera.eye;
        let camera = CameraResources::new(&device, camera, controller, &projection);

        let light = LightResources::new(&device, LightRig::from_config(&viewer.lighting), eye);

        let depth_texture = texture::Texture::create_depth_texture(
            &device,
            [config.width, config.height],
            "depth_texture",
        );

        let layouts = ModelLayouts::new(&device);
        let render_pipeline = mk_basic_pipeline(
            &device,
            &config,
            &layouts.material,
            &camera.bind_group_layout,
            &light.bind_group_layout,
            &layouts.skin,
        );

        let [r, g, b] = hex_to_linear(viewer.clear_colour);
        let clear_colour = wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: 1.0,
        };

        Ok(Self {
            window,
            depth_texture,
            surface,
            device,
            queue,
            config,
            camera,
            projection,
            light,
            layouts,
            render_pipeline,
            clear_colour,
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Reconfigures the surface, the depth buffer and the projection. Zero
    /// sized viewports are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        let Some(size) = SurfaceSize::new(width, height) else {
            return;
        };
        self.config.width = size.width;
        self.config.height = size.height;
        self.projection.resize(size.width, size.height);
        self.surface.configure(&self.device, &self.config);
        self.depth_texture.destroy();
        self.depth_texture = texture::Texture::create_depth_texture(
            &self.device,
            [self.config.width, self.config.height],
            "depth_texture",
        );
    }

    /// Puts the camera, the orbit center and the fill light aim on a new frame.
    pub fn apply_framing(&mut self, framing: &Framing) {
        let CameraResources {
            camera, controller, ..
        } = &mut self.camera;
        camera.eye = framing.eye;
        controller.set_target(camera, framing.target);
        self.light.rig.fill_target = framing.target;
    }

    /// Applies pending orbit input and uploads camera, lights and model transforms.
    pub fn update(&mut self, model: Option<&Model>) {
        let CameraResources {
            camera, controller, ..
        } = &mut self.camera;
        controller.update(camera);
        self.camera.write_to_buffer(&self.queue, &self.projection);
        self.light.write_to_buffer(&self.queue, self.camera.camera.eye);
        if let Some(model) = model {
            model.write_to_buffers(&self.queue);
        }
    }

    pub fn render(&mut self, model: Option<&Model>) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if let Some(model) = model {
                render_pass.set_pipeline(&self.render_pipeline);
                render_pass.draw_model(model, &self.camera.bind_group, &self.light.bind_group);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.window.pre_present_notify();
        output.present();
        Ok(())
    }
}
