use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use log::{error, info, warn};
use winit::event::{DeviceEvent, ElementState};
use winit::keyboard::*;
use winit::{
  dpi::PhysicalSize,
  event::{Event, KeyEvent, WindowEvent},
  event_loop::{EventLoop, EventLoopWindowTarget},
  window::{CursorGrabMode, Fullscreen, Window},
};

use crate::camera::{Camera, CameraController, InputAction};
use crate::catalog::{solar_system, BodyKind};
use crate::gpu::headless::HeadlessBackend;
use crate::gpu::wgpu_backend::WgpuBackend;
use crate::gpu::{Gpu, GpuError, ResourceRegistry};
use crate::overlay::{window_title, world_to_screen, FrameTimer, InfoPanel};
use crate::picking::{pick_body, PickResult};
use crate::scene::{view_and_projection, Scene, SceneComposer};
use crate::AppConfig;

/// Everything one run of the simulation owns. Fields are torn down by
/// [`App::shutdown`] in the order scene, registry, backend.
pub struct App {
  config: AppConfig,
  camera: Camera,
  controller: CameraController,
  scene: Scene,
  composer: SceneComposer,
  registry: Option<ResourceRegistry>,
  timer: FrameTimer,
  elapsed: f32,
  selected: Option<BodyKind>,
  panel: Option<InfoPanel>,
  cleaned_up: bool,
}

impl App {
  pub fn new(config: AppConfig, gpu: Gpu) -> anyhow::Result<Self> {
    let registry = ResourceRegistry::new(gpu.clone());
    let bodies = solar_system(config.units_per_au, &config.asset_dir);
    let scene = Scene::build(
      &registry,
      &bodies,
      &config.skybox_face_paths(),
      &config.ring_texture_path(),
    )
    .context("failed to build the scene")?;
    registry.log_active_buffers();

    let params = config.camera;
    Ok(Self {
      camera: Camera::new(params.position, params.yaw, params.pitch, &params),
      controller: CameraController::init(&params),
      scene,
      composer: SceneComposer::new(gpu),
      registry: Some(registry),
      timer: FrameTimer::new(),
      elapsed: 0.0,
      selected: None,
      panel: None,
      cleaned_up: false,
      config,
    })
  }

  pub fn camera(&self) -> &Camera {
    &self.camera
  }

  pub fn camera_mut(&mut self) -> &mut Camera {
    &mut self.camera
  }

  pub fn scene(&self) -> &Scene {
    &self.scene
  }

  pub fn registry(&self) -> Option<&ResourceRegistry> {
    self.registry.as_ref()
  }

  pub fn selected(&self) -> Option<BodyKind> {
    self.selected
  }

  pub fn panel(&self) -> Option<&InfoPanel> {
    self.panel.as_ref()
  }

  pub fn is_cleaned_up(&self) -> bool {
    self.cleaned_up
  }

  pub fn input(&mut self, event: &WindowEvent) -> bool {
    self.controller.process_events(event)
  }

  /// Moves the camera and advances every renderable. Orbits run at
  /// `time_scale` times real time. Returns a new window title whenever the
  /// frame rate is refreshed.
  pub fn update(&mut self, delta_time: f32) -> Option<String> {
    self.controller.update_camera(&mut self.camera, delta_time);
    self.scene.update(delta_time * self.config.time_scale);
    self.elapsed += delta_time;
    self.timer.tick(delta_time).map(|_| self.title())
  }

  pub fn render(&self, width: u32, height: u32) -> Result<(), GpuError> {
    self.composer.compose(&self.scene, &self.camera, width, height, self.elapsed)
  }

  /// Selects the body under the centre of the screen, or clears the
  /// selection on a miss.
  pub fn pick(&mut self, width: u32, height: u32) -> PickResult {
    let result = pick_body(&self.camera, self.scene.bodies());
    let Some(body) = result.selected().and_then(|index| self.scene.body(index)) else {
      if self.selected.take().is_some() {
        info!("Selection cleared");
      }
      self.panel = None;
      return result;
    };

    let kind = body.kind();
    let (view, projection) = view_and_projection(&self.camera, width, height);
    let anchor = world_to_screen(body.position(), view, projection, width, height);
    let panel = InfoPanel::new(&kind.info(), anchor);
    info!("Selected {kind} at distance {:.2}", result.distance);
    for line in &panel.lines {
      info!("  {line}");
    }
    self.selected = Some(kind);
    self.panel = Some(panel);
    result
  }

  pub fn title(&self) -> String {
    window_title(
      &self.config.title,
      self.selected.map(BodyKind::name),
      self.timer.fps(),
    )
  }

  /// Releases every GPU resource. Safe to call more than once.
  pub fn shutdown(&mut self) {
    if self.cleaned_up {
      return;
    }
    info!("Shutting down");
    self.scene.clear();
    if let Some(registry) = self.registry.take() {
      registry.log_active_buffers();
    }
    self.panel = None;
    self.selected = None;
    self.cleaned_up = true;
  }
}

impl Drop for App {
  fn drop(&mut self) {
    if !self.cleaned_up {
      warn!("App dropped without an explicit shutdown, cleaning up");
      self.shutdown();
    }
  }
}

fn toggle_fullscreen(window: &Window) {
  if window.fullscreen().is_some() {
    window.set_fullscreen(None);
  } else {
    window.set_fullscreen(Some(Fullscreen::Borderless(None)));
  }
}

fn capture_cursor(window: &Window) {
  let grabbed = window
    .set_cursor_grab(CursorGrabMode::Confined)
    .or_else(|_| window.set_cursor_grab(CursorGrabMode::Locked));
  if let Err(e) = grabbed {
    warn!("Could not capture the cursor: {e}");
  }
  window.set_cursor_visible(false);
}

async fn start(config: AppConfig) -> anyhow::Result<()> {
  let event_loop = EventLoop::new()?;
  let window = Arc::new(
    winit::window::WindowBuilder::new()
      .with_title(&config.title)
      .with_inner_size(PhysicalSize::new(config.width, config.height))
      .build(&event_loop)?,
  );
  capture_cursor(&window);

  let backend = Rc::new(RefCell::new(
    WgpuBackend::new(window.clone())
      .await
      .context("failed to initialize the GPU")?,
  ));
  let mut app = App::new(config, backend.clone())?;
  let mut last_frame = Instant::now();

  let event_loop_function = EventLoop::run;
  (event_loop_function)(
    event_loop,
    move |event, target: &EventLoopWindowTarget<()>| match event {
      Event::DeviceEvent {
        event: DeviceEvent::MouseMotion { delta },
        ..
      } => app.controller.process_mouse_motion(delta.0, delta.1),
      Event::WindowEvent { event, window_id } if window_id == window.id() => {
        if app.input(&event) {
          return;
        }
        match event {
          WindowEvent::CloseRequested
          | WindowEvent::KeyboardInput {
            event:
              KeyEvent {
                state: ElementState::Pressed,
                physical_key: PhysicalKey::Code(KeyCode::Escape),
                ..
              },
            ..
          } => target.exit(),
          WindowEvent::Resized(size) => backend.borrow_mut().resize(size.width, size.height),
          WindowEvent::RedrawRequested => {
            let now = Instant::now();
            let delta_time = (now - last_frame).as_secs_f32();
            last_frame = now;

            let (width, height) = backend.borrow().size();
            for action in app.controller.take_actions() {
              match action {
                InputAction::Pick => {
                  app.pick(width, height);
                  window.set_title(&app.title());
                }
                InputAction::ToggleFullscreen => toggle_fullscreen(&window),
              }
            }
            if let Some(title) = app.update(delta_time) {
              window.set_title(&title);
            }
            match app.render(width, height) {
              Ok(()) => {}
              Err(e) if e.is_transient() => warn!("Skipping frame: {e}"),
              Err(e) => {
                error!("Rendering failed: {e}");
                target.exit();
              }
            }
          }
          _ => {}
        }
      }
      Event::AboutToWait => window.request_redraw(),
      Event::LoopExiting => app.shutdown(),
      _ => {}
    },
  )?;
  Ok(())
}

/// Fixed-step loop against the headless backend. Ctrl-C stops it at the
/// next frame boundary.
fn run_headless(config: AppConfig) -> anyhow::Result<()> {
  let running = Arc::new(AtomicBool::new(true));
  let handler_flag = running.clone();
  ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))
    .context("failed to install the Ctrl-C handler")?;

  let backend = Rc::new(RefCell::new(HeadlessBackend::new()));
  let (width, height, step) = (config.width, config.height, config.fixed_step);
  let (frames, pick_interval) = (config.frames, config.pick_interval);
  let mut app = App::new(config, backend.clone())?;

  for frame in 0..frames {
    if !running.load(Ordering::SeqCst) {
      info!("Interrupted after {frame} frames");
      break;
    }
    if pick_interval > 0 && frame % pick_interval == 0 {
      app.pick(width, height);
    }
    if let Some(title) = app.update(step) {
      info!("{title}");
    }
    app.render(width, height)?;
  }

  app.shutdown();
  let backend = backend.borrow();
  info!(
    "Headless run finished after {} frames, {} native objects freed",
    backend.frames_completed(),
    backend.freed()
  );
  Ok(())
}

pub fn run(config: AppConfig) -> anyhow::Result<()> {
  if config.headless {
    run_headless(config)
  } else {
    pollster::block_on(start(config))
  }
}
