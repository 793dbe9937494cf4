use std::f32::consts::TAU;
use std::path::Path;

use cgmath::{Matrix4, Vector3};
use log::{debug, info, warn};

use crate::catalog::{BodyConfig, BodyKind};
use crate::gpu::{
  BufferUsage, DrawCall, DrawUniforms, Gpu, GpuError, ResourceHandle, ResourceRegistry, ShaderProgram,
  TextureId,
};
use crate::mesh::{generate_sphere_mesh, TEXTURED_LAYOUT};
use crate::scene::Renderable;
use crate::texture;

const SPHERE_SECTORS: u32 = 36;
const SPHERE_STACKS: u32 = 18;

/// Kinematic description of one body.
///
/// Orbits are circles of radius `semi_major_axis` in the XZ plane traversed
/// at constant angular speed. `eccentricity` is carried for display but does
/// not shape the orbit.
#[derive(Clone, Debug, PartialEq)]
pub struct OrbitalState {
  pub kind: BodyKind,
  pub mass: f32,
  pub radius: f32,
  pub semi_major_axis: f32,
  pub eccentricity: f32,
  pub orbital_period: f32,
  /// Radians, kept in `[0, 2π)`.
  pub angle: f32,
  pub position: Vector3<f32>,
  pub velocity: Vector3<f32>,
}

impl OrbitalState {
  pub fn from_config(config: &BodyConfig) -> Self {
    Self {
      kind: config.kind,
      mass: config.mass,
      radius: config.radius,
      semi_major_axis: config.semi_major_axis,
      eccentricity: config.eccentricity,
      orbital_period: config.orbital_period,
      angle: wrap_angle(config.initial_angle),
      position: config.position,
      velocity: config.velocity,
    }
  }

  /// Radians per second, or `None` for the star and degenerate periods.
  pub fn angular_velocity(&self) -> Option<f32> {
    if self.kind.is_reference() || self.orbital_period <= 0.0 {
      return None;
    }
    Some(TAU / self.orbital_period)
  }

  pub fn advance(&mut self, delta_time: f32) {
    if !delta_time.is_finite() {
      return;
    }
    let Some(omega) = self.angular_velocity() else {
      return;
    };

    self.angle = wrap_angle(self.angle + omega * delta_time);

    let (sin, cos) = self.angle.sin_cos();
    let r = self.semi_major_axis;
    self.position = Vector3::new(r * cos, 0.0, r * sin);

    let speed = omega * r;
    self.velocity = Vector3::new(-speed * sin, 0.0, speed * cos);
  }
}

fn wrap_angle(angle: f32) -> f32 {
  let wrapped = angle.rem_euclid(TAU);
  // rem_euclid can round up to exactly TAU for tiny negative inputs.
  if wrapped >= TAU {
    0.0
  } else {
    wrapped
  }
}

struct GpuResources {
  gpu: Gpu,
  buffers: ResourceHandle,
  texture: TextureId,
  index_count: u32,
}

/// A star or planet: orbital state plus, once created, its sphere mesh and
/// texture on the GPU.
pub struct OrbitingBody {
  state: OrbitalState,
  has_ring: bool,
  resources: Option<GpuResources>,
}

impl OrbitingBody {
  pub fn new(config: &BodyConfig) -> Self {
    Self {
      state: OrbitalState::from_config(config),
      has_ring: config.has_ring,
      resources: None,
    }
  }

  /// Uploads the sphere mesh and texture. A body renders nothing until this
  /// has succeeded; calling it again is a no-op.
  pub fn create(&mut self, registry: &ResourceRegistry, texture_path: &Path) -> Result<(), GpuError> {
    if self.resources.is_some() {
      warn!("{} already created, ignoring", self.state.kind);
      return Ok(());
    }
    info!("Creating body: {}", self.state.kind);

    let mesh = generate_sphere_mesh(1.0, SPHERE_SECTORS, SPHERE_STACKS);
    debug!(
      "Generated mesh with {} vertices and {} indices",
      mesh.vertex_count(),
      mesh.indices.len()
    );

    let buffers = registry.create_buffer_set(
      &format!("Body_{}", self.state.kind),
      &mesh.vertices,
      &mesh.indices,
      &TEXTURED_LAYOUT,
      BufferUsage::Static,
    )?;

    let gpu = registry.gpu();
    let texture = texture::create_texture(&mut *gpu.borrow_mut(), texture_path)?;

    self.resources = Some(GpuResources {
      gpu,
      buffers,
      texture,
      index_count: mesh.index_count(),
    });
    info!("Body {} created", self.state.kind);
    Ok(())
  }

  pub fn is_created(&self) -> bool {
    self.resources.is_some()
  }

  pub fn kind(&self) -> BodyKind {
    self.state.kind
  }

  pub fn has_ring(&self) -> bool {
    self.has_ring
  }

  pub fn state(&self) -> &OrbitalState {
    &self.state
  }

  pub fn position(&self) -> Vector3<f32> {
    self.state.position
  }

  pub fn update_orbital_positions(&mut self, delta_time: f32) {
    self.state.advance(delta_time);
  }
}

impl Renderable for OrbitingBody {
  fn label(&self) -> &str {
    self.state.kind.name()
  }

  fn update(&mut self, delta_time: f32) {
    self.update_orbital_positions(delta_time);
  }

  fn render(&self, model: Matrix4<f32>, view: Matrix4<f32>, projection: Matrix4<f32>) {
    let Some(resources) = &self.resources else {
      warn!(
        "{} was not created, nothing to render. Call OrbitingBody::create first",
        self.state.kind
      );
      return;
    };
    let Some(array) = resources.buffers.array() else {
      return;
    };

    resources.gpu.borrow_mut().draw(DrawCall {
      program: ShaderProgram::Body,
      array,
      texture: Some(resources.texture),
      uniforms: DrawUniforms::new(model, view, projection),
      count: resources.index_count,
      indexed: true,
    });
  }

  fn as_body(&self) -> Option<&OrbitingBody> {
    Some(self)
  }
}
