//! The renderable contract, the scene that owns every renderable, and the
//! per-frame traversal that turns orbital state into draw calls.

use std::path::{Path, PathBuf};

use cgmath::{Deg, InnerSpace, Matrix4, SquareMatrix};
use log::{info, warn};

use crate::body::OrbitingBody;
use crate::camera::Camera;
use crate::catalog::{BodyConfig, BodyKind};
use crate::gpu::{Gpu, GpuError, ResourceRegistry};
use crate::ring::Ring;
use crate::skybox::Skybox;

pub trait Renderable {
  /// Short name used in logs.
  fn label(&self) -> &str;

  fn update(&mut self, _delta_time: f32) {}

  fn render(&self, model: Matrix4<f32>, view: Matrix4<f32>, projection: Matrix4<f32>);

  /// Bodies get a transform derived from their orbital state; everything
  /// else is drawn with the identity.
  fn as_body(&self) -> Option<&OrbitingBody> {
    None
  }
}

/// A decoration drawn with its host body's model matrix, right after it.
struct AttachedRing {
  host: BodyKind,
  ring: Box<dyn Renderable>,
}

/// Every renderable in insertion order. Bodies are indexed in the order they
/// were added, skipping non-body entries, which is the index picking reports.
#[derive(Default)]
pub struct Scene {
  renderables: Vec<Box<dyn Renderable>>,
  ring: Option<AttachedRing>,
}

impl Scene {
  pub fn new() -> Self {
    Self::default()
  }

  /// Skybox first, then one body per config row in table order. The ring is
  /// attached to the first row carrying the ring flag.
  pub fn build(
    registry: &ResourceRegistry,
    bodies: &[BodyConfig],
    skybox_faces: &[PathBuf],
    ring_texture: &Path,
  ) -> Result<Self, GpuError> {
    let mut scene = Scene::new();

    let mut skybox = Skybox::new();
    skybox.create(registry, skybox_faces)?;
    scene.push(Box::new(skybox));

    for config in bodies {
      let mut body = OrbitingBody::new(config);
      body.create(registry, &config.texture)?;
      scene.push(Box::new(body));

      if config.has_ring {
        if scene.ring.is_some() {
          warn!("{} also has a ring flag, only one ring is supported", config.kind);
          continue;
        }
        let ring = Ring::create(registry, ring_texture)?;
        scene.attach_ring(config.kind, Box::new(ring));
      }
    }

    info!(
      "Scene built with {} renderables ({} bodies)",
      scene.len(),
      scene.bodies().count()
    );
    Ok(scene)
  }

  pub fn push(&mut self, renderable: Box<dyn Renderable>) {
    self.renderables.push(renderable);
  }

  /// Replaces any ring attached earlier.
  pub fn attach_ring(&mut self, host: BodyKind, ring: Box<dyn Renderable>) {
    if let Some(previous) = &self.ring {
      warn!("Replacing ring attached to {}", previous.host);
    }
    self.ring = Some(AttachedRing { host, ring });
  }

  pub fn ring_host(&self) -> Option<BodyKind> {
    self.ring.as_ref().map(|attached| attached.host)
  }

  pub fn len(&self) -> usize {
    self.renderables.len()
  }

  pub fn is_empty(&self) -> bool {
    self.renderables.is_empty()
  }

  pub fn labels(&self) -> Vec<&str> {
    self.renderables.iter().map(|r| r.label()).collect()
  }

  pub fn bodies(&self) -> impl Iterator<Item = &OrbitingBody> + '_ {
    self.renderables.iter().filter_map(|r| r.as_body())
  }

  pub fn body(&self, index: usize) -> Option<&OrbitingBody> {
    self.bodies().nth(index)
  }

  pub fn update(&mut self, delta_time: f32) {
    for renderable in &mut self.renderables {
      renderable.update(delta_time);
    }
    if let Some(attached) = &mut self.ring {
      attached.ring.update(delta_time);
    }
  }

  /// Drops every renderable, releasing their buffer sets.
  pub fn clear(&mut self) {
    self.ring = None;
    self.renderables.clear();
  }
}

/// Translation, then self-rotation about the kind's axis, then the kind's
/// visual scale. `current_time` is seconds since start.
pub fn model_matrix(body: &OrbitingBody, current_time: f32) -> Matrix4<f32> {
  let kind = body.kind();
  Matrix4::from_translation(body.position())
    * Matrix4::from_axis_angle(
      kind.rotation_axis().normalize(),
      Deg(current_time * kind.rotation_speed()),
    )
    * Matrix4::from_scale(kind.visual_scale())
}

pub fn view_and_projection(camera: &Camera, width: u32, height: u32) -> (Matrix4<f32>, Matrix4<f32>) {
  let aspect = width.max(1) as f32 / height.max(1) as f32;
  (camera.view_matrix(), camera.projection_matrix(aspect))
}

pub struct SceneComposer {
  gpu: Gpu,
}

impl SceneComposer {
  pub fn new(gpu: Gpu) -> Self {
    Self { gpu }
  }

  /// Draws one frame. Updates must already have run for this frame.
  pub fn compose(
    &self,
    scene: &Scene,
    camera: &Camera,
    width: u32,
    height: u32,
    current_time: f32,
  ) -> Result<(), GpuError> {
    let (view, projection) = view_and_projection(camera, width, height);

    self.gpu.borrow_mut().begin_frame();
    for renderable in &scene.renderables {
      let Some(body) = renderable.as_body() else {
        renderable.render(Matrix4::identity(), view, projection);
        continue;
      };

      let model = model_matrix(body, current_time);
      renderable.render(model, view, projection);

      if let Some(attached) = &scene.ring {
        if attached.host == body.kind() {
          attached.ring.render(model, view, projection);
        }
      }
    }
    self.gpu.borrow_mut().end_frame()
  }
}
