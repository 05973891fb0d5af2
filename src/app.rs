//! Windowed frame loop.
//!
//! [`run`] opens a window, prepares the scene of a [`SceneScript`] on tokio's
//! blocking pool and then loads, updates and renders it once per redraw.

use std::sync::Arc;

use anyhow::Context as _;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

use crate::{
    context::Context, gpu::GpuDevice, reflection::DEFAULT_CUBE_MAP_SIZE, resources::AssetRoot,
    scene::SceneComposer, scene::SceneScript, timer::GameTimer,
};

/// Start-up settings of [`run`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Overrides the clear colour of the scene when set.
    pub clear_colour: Option<[f32; 4]>,
    pub assets: AssetRoot,
    pub cube_map_size: u32,
    /// `env_logger` filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "mirror-ngin".into(),
            width: 1280,
            height: 720,
            clear_colour: None,
            assets: AssetRoot::from_env(),
            cube_map_size: DEFAULT_CUBE_MAP_SIZE,
            log_filter: "info".into(),
        }
    }
}

struct Running {
    context: Context,
    scene: SceneComposer,
    device_resources_requested: bool,
}

struct App {
    config: AppConfig,
    async_runtime: tokio::runtime::Runtime,
    script: Option<Box<dyn SceneScript>>,
    running: Option<Running>,
    timer: GameTimer,
    cursor: (f64, f64),
}

impl App {
    fn new(config: AppConfig, script: Box<dyn SceneScript>) -> anyhow::Result<Self> {
        Ok(Self {
            config,
            async_runtime: tokio::runtime::Runtime::new()?,
            script: Some(script),
            running: None,
            timer: GameTimer::new(),
            cursor: (0.0, 0.0),
        })
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let Some(script) = self.script.take() else {
            return Ok(());
        };
        let window_attributes = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(window_attributes)?);

        let mut context = self.async_runtime.block_on(Context::new(window.clone()))?;
        let size = window.inner_size();
        context.resize(size.width, size.height);

        let mut scene = SceneComposer::new(script, self.config.assets.clone(), size.width, size.height)
            .with_cube_map_size(self.config.cube_map_size);
        if let Some(colour) = self.config.clear_colour {
            scene = scene.with_clear_colour(colour);
        }
        {
            let _guard = self.async_runtime.enter();
            scene.initialize();
        }

        self.timer.reset();
        self.running = Some(Running {
            context,
            scene,
            device_resources_requested: false,
        });
        window.request_redraw();
        Ok(())
    }

    /// Releases the scene on the lost device, then loads it again from its
    /// logical data on a new one.
    fn recover_lost_device(&mut self) -> anyhow::Result<()> {
        let Some(Running {
            mut context,
            mut scene,
            device_resources_requested,
        }) = self.running.take()
        else {
            return Ok(());
        };
        let window = context.window().cloned().context("the lost device had no window")?;
        let (width, height) = context.size();
        scene.release(&mut context.gpu);
        // The old surface has to go before the window gets a new one.
        drop(context);

        let mut context = self.async_runtime.block_on(Context::new(window.clone()))?;
        context.resize(width, height);
        if device_resources_requested {
            scene.create_device_dependent_resources(&mut context.gpu);
        }
        log::info!("recovered from device loss");
        self.running = Some(Running {
            context,
            scene,
            device_resources_requested,
        });
        window.request_redraw();
        Ok(())
    }
}

impl Running {
    fn redraw(&mut self, timer: &mut GameTimer, event_loop: &ActiveEventLoop) {
        if !self.device_resources_requested && self.scene.poll_initialization() {
            self.scene.create_device_dependent_resources(&mut self.context.gpu);
            self.device_resources_requested = true;
        }

        let dt = timer.tick();
        self.scene.update(dt);

        match self.context.render(&mut self.scene) {
            Ok(()) => {}
            Err(wgpu::CurrentSurfaceTexture::Lost | wgpu::CurrentSurfaceTexture::Outdated) => {
                let (width, height) = self.context.size();
                self.context.resize(width, height);
            }
            Err(e) => log::warn!("skipped frame: {e:?}"),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.start(event_loop) {
            log::error!("cannot start: {e:#}");
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let Some(running) = &mut self.running else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => {
                running.scene.release(&mut running.context.gpu);
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                running.context.resize(size.width, size.height);
                running.scene.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested if running.context.gpu.is_lost() => {
                if let Err(e) = self.recover_lost_device() {
                    log::error!("cannot recover from device loss: {e:#}");
                    event_loop.exit();
                }
            }
            WindowEvent::RedrawRequested => running.redraw(&mut self.timer, event_loop),
            WindowEvent::Focused(focused) => {
                if focused {
                    self.timer.start();
                } else {
                    self.timer.stop();
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let Some(input) = running.scene.input() {
                    input.on_key_event(&event);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x, position.y);
                if let Some(input) = running.scene.input() {
                    input.on_pointer_moved(position.x, position.y);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let (x, y) = self.cursor;
                if let Some(input) = running.scene.input() {
                    match state {
                        ElementState::Pressed => input.on_pointer_pressed(button, x, y),
                        ElementState::Released => input.on_pointer_released(button, x, y),
                    }
                }
            }
            _ => {}
        }
    }
}

/// Opens a window and runs `script` until the window is closed.
pub fn run(config: AppConfig, script: Box<dyn SceneScript>) -> anyhow::Result<()> {
    let env = env_logger::Env::default().default_filter_or(config.log_filter.as_str());
    if let Err(e) = env_logger::Builder::from_env(env).try_init() {
        println!("Warning: Could not initialize logger: {}", e);
    }

    #[cfg(all(feature = "integration-tests", target_os = "linux"))]
    let event_loop: EventLoop<()> = {
        use winit::platform::wayland::EventLoopBuilderExtWayland;

        EventLoop::builder().with_any_thread(true).build()?
    };

    #[cfg(all(feature = "integration-tests", target_os = "windows"))]
    let event_loop: EventLoop<()> = {
        use winit::platform::windows::EventLoopBuilderExtWindows;

        EventLoop::builder().with_any_thread(true).build()?
    };

    #[cfg(not(all(feature = "integration-tests", any(target_os = "linux", target_os = "windows"))))]
    let event_loop: EventLoop<()> = EventLoop::new()?;

    let mut app = App::new(config, script)?;
    event_loop.run_app(&mut app)?;
    Ok(())
}
