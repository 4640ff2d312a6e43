//! Brickmap - streaming brick-map voxel renderer

use std::path::PathBuf;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Window, WindowId},
};

use brickmap::core::{
    camera::Camera,
    camera_controller::FpsCameraController,
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    error::Error,
    input::InputState,
    logging,
    telemetry::Telemetry,
    time::FrameTimer,
    Result,
};
use brickmap::render::{
    buffer::GpuWorldBuffers,
    context::GpuContext,
    pipeline::WavefrontTracer,
};
use brickmap::terrain::TerrainGenerator;
use brickmap::voxel::streaming::{HostBackend, RayProbe, StreamingManager, SyncPoints};
use brickmap::voxel::world::VoxelWorld;

/// Frames traced by `--headless` without an explicit count
const DEFAULT_HEADLESS_FRAMES: u32 = 32;
/// Probe grid used by headless runs
const HEADLESS_GRID: (u32, u32) = (64, 36);

/// Number of render modes cycled with M
const RENDER_MODE_COUNT: u32 = 3;
/// Focal distance factor per [ or ] press
const FOCUS_STEP: f32 = 1.25;
/// Lens radius change per - or = press
const LENS_RADIUS_STEP: f32 = 0.05;

struct RenderState {
    gpu: GpuContext,
    tracer: WavefrontTracer,
    world: StreamingManager<GpuWorldBuffers>,
    telemetry: Telemetry,
}

struct App {
    config: AppConfig,
    window: Option<Arc<Window>>,
    state: Option<RenderState>,
    camera: Camera,
    controller: FpsCameraController,
    input: InputState,
    timer: FrameTimer,
    render_mode: u32,
    cursor_grabbed: bool,
}

impl App {
    fn new(config: AppConfig) -> Self {
        Self {
            camera: Camera::from_config(&config.camera),
            controller: FpsCameraController::from_config(&config.camera),
            render_mode: config.render.render_mode,
            config,
            window: None,
            state: None,
            input: InputState::new(),
            timer: FrameTimer::new(),
            cursor_grabbed: false,
        }
    }

    fn init(&self, window: Arc<Window>) -> Result<RenderState> {
        let gpu = pollster::block_on(GpuContext::new(window, self.config.window.vsync))?;

        let world = generate_world(&self.config);
        let telemetry = Telemetry::new(world.filled_voxels());
        let buffers = GpuWorldBuffers::new(
            &gpu.device,
            &gpu.queue,
            *world.descriptor(),
            self.config.world.load_queue_capacity,
        )?;
        let world = StreamingManager::new(world, buffers, self.config.world.streaming(), SyncPoints::new())?;
        let tracer = WavefrontTracer::new(&gpu, world.backend(), self.config.render.ray_queue_capacity)?;
        log::info!("Wavefront ray queues: {} KB", tracer.ray_bytes() / 1024);

        Ok(RenderState {
            gpu,
            tracer,
            world,
            telemetry,
        })
    }

    fn toggle_cursor_grab(&mut self) {
        if let Some(window) = &self.window {
            self.cursor_grabbed = !self.cursor_grabbed;

            if self.cursor_grabbed {
                window.set_cursor_grab(CursorGrabMode::Confined)
                    .or_else(|_| window.set_cursor_grab(CursorGrabMode::Locked))
                    .ok();
                window.set_cursor_visible(false);
            } else {
                window.set_cursor_grab(CursorGrabMode::None).ok();
                window.set_cursor_visible(true);
            }

            self.input.set_mouse_captured(self.cursor_grabbed);
        }
    }

    fn adjust_lens(&mut self, change: impl FnOnce(&mut Camera)) {
        change(&mut self.camera);
        log::info!(
            "Focal distance {:.2}, lens radius {:.2}",
            self.camera.focal_distance, self.camera.lens_radius
        );
    }

    /// Trace, present, then run the world tick for this frame
    fn frame(&mut self) -> Result<()> {
        let Some(state) = &mut self.state else {
            return Ok(());
        };

        state.tracer.update(&state.gpu.queue, &self.camera, self.render_mode, self.config.render.sun_position);

        // Skip the frame (and its tick) while the surface is unavailable
        let output = match state.gpu.get_current_texture() {
            Ok(output) => output,
            Err(e) => {
                log::warn!("Skipping frame: {}", e);
                return Ok(());
            }
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        state.tracer.render(&state.gpu, &state.world, &view)?;
        output.present();

        let report = state.world.tick()?;
        if report.loaded > 0 {
            state.tracer.invalidate();
        }
        state.telemetry.record_frame(self.timer.delta_secs(), report.loaded, report.dropped);
        state.telemetry.maybe_log(self.config.render.telemetry_interval);
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(state) = self.state.take() {
            state.gpu.wait_idle();
            let stats = *state.world.stats();
            drop(state.world.destroy());
            log::info!(
                "Shutdown: {} ticks, {} bricks loaded, {} requests dropped",
                stats.ticks, stats.bricks_loaded, stats.dropped_requests
            );
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title(self.config.window.app_name.clone())
            .with_inner_size(PhysicalSize::new(self.config.window.width, self.config.window.height))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => logging::fatal("window creation", &Error::Window(e.to_string())),
        };

        match self.init(window.clone()) {
            Ok(state) => {
                let (width, height) = state.gpu.size();
                log::info!("Window created: {}x{}", width, height);
                self.state = Some(state);
            }
            Err(e) => logging::fatal("renderer initialization", &e),
        }
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        self.input.process_event(&event);

        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Escape) => {
                        if self.cursor_grabbed {
                            self.toggle_cursor_grab();
                        } else {
                            self.shutdown();
                            event_loop.exit();
                        }
                    }
                    PhysicalKey::Code(KeyCode::Tab) => self.toggle_cursor_grab(),
                    PhysicalKey::Code(KeyCode::KeyL) => {
                        self.camera.locked = !self.camera.locked;
                        log::info!("Camera {}", if self.camera.locked { "locked" } else { "unlocked" });
                    }
                    PhysicalKey::Code(KeyCode::KeyM) => {
                        self.render_mode = (self.render_mode + 1) % RENDER_MODE_COUNT;
                        log::info!("Render mode: {}", self.render_mode);
                    }
                    PhysicalKey::Code(KeyCode::KeyF) => {
                        self.camera.toggle_depth_of_field();
                        log::info!("Depth of field {}", if self.camera.enable_depth_of_field { "on" } else { "off" });
                    }
                    PhysicalKey::Code(KeyCode::BracketLeft) => self.adjust_lens(|c| c.scale_focal_distance(1.0 / FOCUS_STEP)),
                    PhysicalKey::Code(KeyCode::BracketRight) => self.adjust_lens(|c| c.scale_focal_distance(FOCUS_STEP)),
                    PhysicalKey::Code(KeyCode::Minus) => self.adjust_lens(|c| c.adjust_lens_radius(-LENS_RADIUS_STEP)),
                    PhysicalKey::Code(KeyCode::Equal) => self.adjust_lens(|c| c.adjust_lens_radius(LENS_RADIUS_STEP)),
                    _ => {}
                }
            }
            WindowEvent::RedrawRequested => {
                self.timer.tick();
                let dt = self.timer.step_secs();
                self.controller.update(&mut self.camera, &self.input, dt);

                if let Err(e) = self.frame() {
                    logging::fatal("frame", &e);
                }

                if let Some(window) = &self.window {
                    window.set_title(&format!(
                        "{} - {:.1} FPS | Tab=mouse, WASD=move, L=lock, M=mode, F=DOF, [ ]=focus, - ==lens",
                        self.config.window.app_name,
                        self.timer.fps()
                    ));
                }

                self.input.end_frame();
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.input.process_mouse_motion(delta);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn generate_world(config: &AppConfig) -> VoxelWorld {
    let terrain = TerrainGenerator::new(config.world.terrain.clone());
    VoxelWorld::generate(config.world.descriptor(), &terrain)
}

/// Drive the streaming protocol without a device: probe rays from the
/// camera through the host backend and tick the world after each frame.
fn run_headless(config: &AppConfig, frames: u32) -> Result<()> {
    let world = generate_world(config);
    let mut telemetry = Telemetry::new(world.filled_voxels());
    let backend = HostBackend::new(*world.descriptor(), config.world.load_queue_capacity);
    let mut streamer = StreamingManager::new(world, backend, config.world.streaming(), SyncPoints::new())?;

    let camera = Camera::from_config(&config.camera);
    let (grid_w, grid_h) = HEADLESS_GRID;
    let (right, up) = camera.basis(grid_w as f32 / grid_h as f32);
    let mut timer = FrameTimer::new();

    for frame in 0..frames {
        let mut hits = 0u32;
        for y in 0..grid_h {
            for x in 0..grid_w {
                let u = (x as f32 + 0.5) / grid_w as f32 * 2.0 - 1.0;
                let v = 1.0 - (y as f32 + 0.5) / grid_h as f32 * 2.0;
                let direction = (camera.direction + right * u + up * v).normalize();
                if let RayProbe::Hit { .. } = streamer.backend_mut().cast_ray(camera.position, direction) {
                    hits += 1;
                }
            }
        }

        let halt = streamer.halt_target();
        streamer.sync().halt.signal_host(halt);
        let report = streamer.tick()?;

        timer.tick();
        telemetry.record_frame(timer.delta_secs(), report.loaded, report.dropped);
        log::debug!("Headless frame {}: {} hits, {:?}", frame, hits, report);
        telemetry.maybe_log(config.render.telemetry_interval);
    }

    let summary = serde_json::to_string(&telemetry.summary())?;
    log::info!("Headless run finished: {}", summary);
    log::info!("Streaming totals: {}", serde_json::to_string(streamer.stats())?);
    Ok(())
}

/// Value following `flag` on the command line
fn parse_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn main() {
    logging::init();
    log::info!("Brickmap starting...");

    let args: Vec<String> = std::env::args().collect();
    let config_path = PathBuf::from(parse_arg(&args, "--config").unwrap_or(DEFAULT_CONFIG_PATH));
    let config = match AppConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => logging::fatal("settings", &e),
    };

    if args.iter().any(|a| a == "--headless") {
        let frames = parse_arg(&args, "--headless")
            .and_then(|n| n.parse().ok())
            .unwrap_or(DEFAULT_HEADLESS_FRAMES);
        if let Err(e) = run_headless(&config, frames) {
            logging::fatal("headless run", &e);
        }
        return;
    }

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => logging::fatal("event loop", &Error::Window(e.to_string())),
    };
    let mut app = App::new(config);
    if let Err(e) = event_loop.run_app(&mut app) {
        logging::fatal("event loop", &Error::Window(e.to_string()));
    }
}
