//! Application event loop.
//!
//! Everything that touches the scene runs on the winit event loop thread.
//! Model loads and the state channel run elsewhere (tokio natively,
//! `spawn_local` in the browser) and report back through
//! [`ViewerEvent`]s sent with the loop's proxy.
//!
//! Each redraw:
//! 1. advance the animation of the current model
//! 2. frame a freshly attached model
//! 3. apply orbit input and upload camera, lights and transforms
//! 4. draw and present

use std::sync::Arc;

use instant::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::Window,
};

use crate::{
    channel::{self, ChannelEvent, Dispatch},
    config::ViewerConfig,
    context::Context,
    data_structures::model::Model,
    resources,
    swapper::{LoadResolution, LoadTicket, ModelSwapper},
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Result of a model load started by the swapper.
#[derive(Debug)]
pub struct LoadOutcome {
    pub ticket: LoadTicket,
    pub path: String,
    pub result: anyhow::Result<Model>,
}

#[derive(Debug)]
pub enum ViewerEvent {
    /// The GPU context finished initialising (browser builds only).
    Initialized(Box<anyhow::Result<Context>>),
    ModelLoaded(LoadOutcome),
    Channel(ChannelEvent),
}

/// The GPU context together with what it displays.
#[derive(Debug)]
struct Scene {
    ctx: Context,
    swapper: ModelSwapper<Model>,
}

impl Scene {
    fn new(ctx: Context, config: &ViewerConfig) -> Self {
        Self {
            ctx,
            swapper: ModelSwapper::new(config.model_scale, config.framing.clone()),
        }
    }

    fn tick(&mut self, dt: instant::Duration) {
        let Scene { ctx, swapper } = self;
        swapper.advance(dt);
        if let Some(framing) = swapper.take_framing() {
            log::debug!("Framing model: target {:?}, eye {:?}", framing.target, framing.eye);
            ctx.apply_framing(&framing);
        }
        ctx.update(swapper.current_model());
        match ctx.render(swapper.current_model()) {
            Ok(()) => {}
            // Reconfigure the surface if it's lost or outdated
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = ctx.window().inner_size();
                ctx.resize(size.width, size.height);
            }
            Err(e) => {
                log::error!("Unable to render {}", e);
            }
        }
    }
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: EventLoopProxy<ViewerEvent>,
    config: ViewerConfig,
    scene: Option<Scene>,
    window_requested: bool,
    last_time: Instant,
    #[cfg(not(target_arch = "wasm32"))]
    channel_task: Option<tokio::task::JoinHandle<()>>,
    #[cfg(target_arch = "wasm32")]
    channel: Option<channel::web::WebChannel>,
}

impl App {
    fn new(event_loop: &EventLoop<ViewerEvent>, config: ViewerConfig) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        #[cfg(not(target_arch = "wasm32"))]
        let async_runtime = tokio::runtime::Runtime::new()?;
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime,
            proxy,
            config,
            scene: None,
            window_requested: false,
            last_time: Instant::now(),
            #[cfg(not(target_arch = "wasm32"))]
            channel_task: None,
            #[cfg(target_arch = "wasm32")]
            channel: None,
        })
    }

    fn initialized(&mut self, event_loop: &ActiveEventLoop, ctx: anyhow::Result<Context>) {
        let mut ctx = match ctx {
            Ok(ctx) => ctx,
            Err(e) => {
                log::error!("Cannot create the rendering context: {:#}", e);
                event_loop.exit();
                return;
            }
        };
        let size = ctx.window().inner_size();
        ctx.resize(size.width, size.height);
        ctx.window().request_redraw();
        self.scene = Some(Scene::new(ctx, &self.config));
        self.last_time = Instant::now();

        let initial = self.config.initial_asset().to_string();
        log::info!("Showing '{}' until told otherwise", self.config.initial_state);
        self.load(initial);
        self.connect_channel();
    }

    /// Releases the current model and loads `path` in the background.
    fn load(&mut self, path: String) {
        let Some(scene) = &mut self.scene else {
            return;
        };
        let ticket = scene.swapper.request(&path);

        let device = scene.ctx.device.clone();
        let queue = scene.ctx.queue.clone();
        let layouts = scene.ctx.layouts.clone();
        let asset_root = self.config.asset_root.clone();
        let proxy = self.proxy.clone();
        let load = async move {
            let result = resources::load_model(&path, &asset_root, &device, &queue, &layouts).await;
            let outcome = LoadOutcome {
                ticket,
                path,
                result,
            };
            if let Err(e) = proxy.send_event(ViewerEvent::ModelLoaded(outcome)) {
                log::debug!("Event loop closed before a load finished: {}", e);
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        self.async_runtime.spawn(load);
        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(load);
    }

    fn connect_channel(&mut self) {
        let settings = &self.config.channel;
        let url = channel::endpoint_url(&settings.host, settings.port);
        let proxy = self.proxy.clone();
        let sink = move |event: ChannelEvent| proxy.send_event(ViewerEvent::Channel(event)).is_ok();

        #[cfg(not(target_arch = "wasm32"))]
        {
            self.channel_task = Some(channel::native::spawn(
                self.async_runtime.handle(),
                url,
                settings.reconnect.clone(),
                sink,
            ));
        }
        #[cfg(target_arch = "wasm32")]
        {
            self.channel = Some(channel::web::WebChannel::connect(
                url,
                settings.reconnect.clone(),
                sink,
            ));
        }
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened { url } => log::info!("Connected to the state server at {}", url),
            ChannelEvent::Message(text) => match channel::interpret(&text, &self.config.assets) {
                Dispatch::Swap { state, path } => {
                    log::info!("State changed to '{}'", state);
                    self.load(path);
                }
                Dispatch::Unknown(Some(name)) => log::warn!("Unknown state '{}'", name),
                Dispatch::Unknown(None) => log::warn!("Message without a state: {}", text),
                Dispatch::Malformed(reason) => {
                    log::error!("Could not parse message {:?}: {}", text, reason)
                }
            },
            ChannelEvent::Closed { reason } => match reason {
                Some(reason) => log::info!("State server connection closed ({})", reason),
                None => log::info!("State server connection closed"),
            },
            ChannelEvent::Error(e) => log::error!("State server {}", e),
            ChannelEvent::Reconnecting { attempt, delay } => {
                log::debug!("Reconnecting in {:?} (attempt {})", delay, attempt)
            }
        }
    }
}

impl ApplicationHandler<ViewerEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window_requested {
            return;
        }
        self.window_requested = true;

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title("Avatar");

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            let window = web_sys::window().unwrap_throw();
            let document = window.document().unwrap_throw();
            let canvas = document
                .get_element_by_id(&self.config.canvas_id)
                .unwrap_throw();
            let html_canvas_element = canvas.unchecked_into();
            window_attributes = window_attributes.with_canvas(Some(html_canvas_element));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Cannot create a window: {}", e);
                event_loop.exit();
                return;
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        {
            let ctx = self
                .async_runtime
                .block_on(Context::new(window, &self.config));
            self.initialized(event_loop, ctx);
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            let config = self.config.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let ctx = Context::new(window, &config).await;
                if proxy
                    .send_event(ViewerEvent::Initialized(Box::new(ctx)))
                    .is_err()
                {
                    log::error!("Event loop closed during initialisation");
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            // This is the message from our wasm `spawn_local`
            ViewerEvent::Initialized(ctx) => self.initialized(event_loop, *ctx),
            ViewerEvent::ModelLoaded(LoadOutcome {
                ticket,
                path,
                result,
            }) => {
                let Some(scene) = &mut self.scene else {
                    return;
                };
                if scene.swapper.complete(ticket, result) == LoadResolution::Attached {
                    log::debug!("{} is on screen", path);
                }
            }
            ViewerEvent::Channel(event) => self.on_channel_event(event),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let scene = match &mut self.scene {
            Some(scene) => scene,
            None => return,
        };

        scene.ctx.camera.controller.handle_window_events(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => scene.ctx.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                let dt = self.last_time.elapsed();
                self.last_time = Instant::now();
                scene.tick(dt);
                scene.ctx.window().request_redraw();
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        #[cfg(not(target_arch = "wasm32"))]
        if let Some(task) = self.channel_task.take() {
            task.abort();
        }
        #[cfg(target_arch = "wasm32")]
        {
            self.channel = None;
        }
        if let Some(scene) = &mut self.scene {
            scene.swapper.clear();
        }
    }
}

pub fn run(config: ViewerConfig) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        std::panic::set_hook(Box::new(console_error_panic_hook::hook));
        console_log::init_with_level(log::Level::Info).unwrap_throw();
    }

    let event_loop: EventLoop<ViewerEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, config)?;
    event_loop.run_app(&mut app)?;

    Ok(())
}
