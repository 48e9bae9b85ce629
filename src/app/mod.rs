mod egui_host;
mod input;
mod render_loop;
mod setup;
mod timing;
pub mod viewport;

use crate::assets::AssetLoader;
use crate::config::{self, DemoConfig, CONFIG_FILE};
use crate::render::camera::PerspectiveCamera;
use crate::render::{EguiFrameOutput, RenderContext, RenderError, RendererSettings};
use crate::scene::Scene;
use crate::ui::{default_bindings, BindingContext, DebugPanel};
use egui_host::EguiHost;
use input::{wheel_steps, PointerAction, PointerInput};
use render_loop::{FrameTarget, RenderLoop, TickOutcome};
use setup::DemoState;
use timing::FrameTiming;
use viewport::ResizeManager;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error("renderer error: {0}")]
    Render(#[from] RenderError),
}

/// Everything that only exists once the window does.
struct Running {
    window: Arc<Window>,
    render: RenderContext,
    egui: EguiHost,
}

/// One frame's destination: the renderer plus the data it draws.
struct WindowFrame<'a> {
    render: &'a mut RenderContext,
    window: &'a Window,
    scene: &'a Scene,
    settings: &'a RendererSettings,
    ui: &'a EguiFrameOutput,
}

impl FrameTarget for WindowFrame<'_> {
    type Error = RenderError;

    fn render_frame(&mut self, camera: &PerspectiveCamera) -> Result<(), RenderError> {
        self.render
            .render(self.scene, camera, self.settings, Some(self.ui))
    }

    fn schedule_next_frame(&mut self) {
        self.window.request_redraw();
    }
}

pub struct App {
    config: DemoConfig,
    loader: AssetLoader,
    state: DemoState,
    panel: DebugPanel,
    resize: ResizeManager,
    render_loop: RenderLoop,
    pointer: PointerInput,
    timing: FrameTiming,
    running: Option<Running>,
    error: Option<AppError>,
}

impl App {
    fn new(config: DemoConfig) -> Self {
        let mut loader = AssetLoader::new(config.asset_root.clone());
        let width = config.window.width.max(1);
        let height = config.window.height.max(1);
        let state = DemoState::new(&config, &mut loader, width as f32 / height as f32);
        log::info!(
            "Scene assembled: {} nodes, {} geometries, {} loads in flight from {}",
            state.scene.node_count(),
            state.scene.geometry_count(),
            loader.in_flight(),
            loader.root().display()
        );
        Self {
            panel: DebugPanel::new(default_bindings()),
            resize: ResizeManager::new(width, height, 1.0),
            render_loop: RenderLoop::new(),
            pointer: PointerInput::default(),
            timing: FrameTiming::new(config.window.title.clone(), Instant::now()),
            running: None,
            error: None,
            config,
            loader,
            state,
        }
    }

    fn init_window(&mut self, event_loop: &ActiveEventLoop) -> Result<(), AppError> {
        let window_attrs = WindowAttributes::default()
            .with_title(self.config.window.title.clone())
            .with_inner_size(LogicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(true);
        let window = Arc::new(event_loop.create_window(window_attrs)?);
        let render = RenderContext::new(Arc::clone(&window), &self.state.renderer)?;
        let egui = EguiHost::new(&window);
        self.running = Some(Running {
            window: Arc::clone(&window),
            render,
            egui,
        });
        self.handle_resize(window.inner_size(), window.scale_factor());
        window.request_redraw();
        Ok(())
    }

    fn handle_resize(&mut self, physical: PhysicalSize<u32>, scale_factor: f64) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        let logical = physical.to_logical::<f64>(scale_factor);
        let size = self.resize.handle_resize(
            logical.width.round() as u32,
            logical.height.round() as u32,
            scale_factor as f32,
            &mut self.state.camera,
            &mut running.render,
        );
        let (buffer_width, buffer_height) = size.buffer_size();
        log::debug!(
            "Viewport {}x{} at ratio {:.2}, drawing buffer {}x{}",
            size.width,
            size.height,
            size.pixel_ratio(),
            buffer_width,
            buffer_height
        );
    }

    fn apply_pointer(&mut self, action: PointerAction) {
        // Cursor deltas arrive in physical pixels.
        let size = self.resize.size();
        let height = size.height.max(1) as f32 * size.device_pixel_ratio;
        let controls = &mut self.state.controls;
        match action {
            PointerAction::Rotate { dx, dy } => controls.rotate(dx, dy, height),
            PointerAction::Pan { dx, dy } => controls.pan(dx, dy, height, &self.state.camera),
        }
    }

    fn stop(&mut self, event_loop: &ActiveEventLoop) {
        self.render_loop.stop();
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        for outcome in self.loader.poll() {
            if let Some(line) = self.state.apply_outcome(outcome) {
                self.panel.push_status(line);
            }
        }
        self.panel.set_pending_assets(self.loader.in_flight());

        let Some(running) = self.running.as_mut() else {
            return;
        };
        let state = &mut self.state;
        let panel = &mut self.panel;
        let ui = running.egui.run(&running.window, |ctx| {
            let mut bindings = BindingContext {
                params: &mut state.params,
                scene: &mut state.scene,
                renderer: &mut state.renderer,
            };
            panel.show(ctx, &mut bindings);
        });

        let started = Instant::now();
        let mut target = WindowFrame {
            render: &mut running.render,
            window: &running.window,
            scene: &state.scene,
            settings: &state.renderer,
            ui: &ui,
        };
        let outcome = self
            .render_loop
            .tick(&mut state.controls, &mut state.camera, &mut target);
        state.sync_camera_node();

        match outcome {
            Ok(TickOutcome::Rendered { .. }) => {
                let now = Instant::now();
                if let Some(title) = self.timing.record(now, now - started) {
                    running.window.set_title(&title);
                }
            }
            Ok(TickOutcome::Stopped) => event_loop.exit(),
            Err(err) => {
                log::error!("Rendering failed: {err}");
                self.error = Some(err.into());
                self.stop(event_loop);
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        if let Err(err) = self.init_window(event_loop) {
            log::error!("Startup failed: {err}");
            self.error = Some(err);
            self.stop(event_loop);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        let window = Arc::clone(&running.window);
        let consumed = running.egui.on_window_event(&window, &event);
        let ui_wants_pointer = running.egui.wants_pointer();

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.stop(event_loop);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if !consumed
                    && event.state == ElementState::Pressed
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("Escape pressed, shutting down...");
                    self.stop(event_loop);
                }
            }
            WindowEvent::Resized(new_size) => {
                self.handle_resize(new_size, window.scale_factor());
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.handle_resize(window.inner_size(), scale_factor);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let pressed = state == ElementState::Pressed;
                if !pressed || !(consumed || ui_wants_pointer) {
                    self.pointer.handle_button(button, pressed);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Some(action) = self
                    .pointer
                    .handle_cursor(position.x as f32, position.y as f32)
                {
                    self.apply_pointer(action);
                }
            }
            WindowEvent::CursorLeft { .. } => self.pointer.cursor_left(),
            WindowEvent::MouseWheel { delta, .. } => {
                if !(consumed || ui_wants_pointer) {
                    self.state.controls.dolly(wheel_steps(delta));
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }
}

pub fn run() -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config = config::load_or_default(Path::new(CONFIG_FILE));
    log::info!("envscene starting");
    log::info!("   Drag to orbit, right-drag to pan, scroll to zoom, ESC to exit");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    log::info!("Rendered {} frames", app.render_loop.frames());
    match app.error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
