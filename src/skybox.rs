use std::path::PathBuf;

use cgmath::{Matrix4, Vector4};
use log::{info, warn};

use crate::gpu::{
  draw_with_state, BufferUsage, DepthCompare, DrawCall, DrawUniforms, Gpu, GpuError, RasterState,
  ResourceHandle, ResourceRegistry, ShaderProgram, TextureId, VertexAttribute,
};
use crate::scene::Renderable;
use crate::texture;

#[rustfmt::skip]
const CUBE: [f32; 108] = [
  -1.0,  1.0, -1.0,  -1.0, -1.0, -1.0,   1.0, -1.0, -1.0,
   1.0, -1.0, -1.0,   1.0,  1.0, -1.0,  -1.0,  1.0, -1.0,

  -1.0, -1.0,  1.0,  -1.0, -1.0, -1.0,  -1.0,  1.0, -1.0,
  -1.0,  1.0, -1.0,  -1.0,  1.0,  1.0,  -1.0, -1.0,  1.0,

   1.0, -1.0, -1.0,   1.0, -1.0,  1.0,   1.0,  1.0,  1.0,
   1.0,  1.0,  1.0,   1.0,  1.0, -1.0,   1.0, -1.0, -1.0,

  -1.0, -1.0,  1.0,  -1.0,  1.0,  1.0,   1.0,  1.0,  1.0,
   1.0,  1.0,  1.0,   1.0, -1.0,  1.0,  -1.0, -1.0,  1.0,

  -1.0,  1.0, -1.0,   1.0,  1.0, -1.0,   1.0,  1.0,  1.0,
   1.0,  1.0,  1.0,  -1.0,  1.0,  1.0,  -1.0,  1.0, -1.0,

  -1.0, -1.0, -1.0,  -1.0, -1.0,  1.0,   1.0, -1.0, -1.0,
   1.0, -1.0, -1.0,  -1.0, -1.0,  1.0,   1.0, -1.0,  1.0,
];

const LAYOUT: [VertexAttribute; 1] = [VertexAttribute::float(0, 3, 3 * 4, 0)];

struct SkyResources {
  gpu: Gpu,
  buffers: ResourceHandle,
  cubemap: TextureId,
}

pub struct Skybox {
  resources: Option<SkyResources>,
}

impl Default for Skybox {
  fn default() -> Self {
    Self::new()
  }
}

impl Skybox {
  pub fn new() -> Self {
    Self { resources: None }
  }

  /// Loads the six faces (+X, -X, +Y, -Y, +Z, -Z) and uploads the cube.
  pub fn create(&mut self, registry: &ResourceRegistry, faces: &[PathBuf]) -> Result<(), GpuError> {
    if self.resources.is_some() {
      warn!("Skybox already initialized, check for a second call to Skybox::create");
      return Ok(());
    }

    let gpu = registry.gpu();
    let cubemap = texture::create_cubemap(&mut *gpu.borrow_mut(), faces)?;
    let buffers = registry.create_buffer_set("Skybox", &CUBE, &[], &LAYOUT, BufferUsage::Static)?;

    self.resources = Some(SkyResources {
      gpu,
      buffers,
      cubemap,
    });
    info!("Skybox initialized");
    Ok(())
  }

  pub fn is_created(&self) -> bool {
    self.resources.is_some()
  }
}

/// The view matrix with its translation dropped, so the sky stays centred on
/// the camera.
pub fn rotation_only(view: Matrix4<f32>) -> Matrix4<f32> {
  let mut rotation = view;
  rotation.w = Vector4::new(0.0, 0.0, 0.0, 1.0);
  rotation
}

impl Renderable for Skybox {
  fn label(&self) -> &str {
    "skybox"
  }

  fn render(&self, model: Matrix4<f32>, view: Matrix4<f32>, projection: Matrix4<f32>) {
    let Some(resources) = &self.resources else {
      return;
    };
    let Some(array) = resources.buffers.array() else {
      return;
    };

    let mut gpu = resources.gpu.borrow_mut();
    let prior = gpu.raster_state();
    let state = RasterState {
      depth_write: false,
      depth_compare: DepthCompare::LessEqual,
      ..prior
    };
    draw_with_state(
      &mut *gpu,
      state,
      DrawCall {
        program: ShaderProgram::Skybox,
        array,
        texture: Some(resources.cubemap),
        uniforms: DrawUniforms::new(model, rotation_only(view), projection),
        count: (CUBE.len() / 3) as u32,
        indexed: false,
      },
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gpu::headless::HeadlessBackend;
  use crate::gpu::GraphicsBackend;
  use cgmath::{Point3, SquareMatrix, Vector3};
  use std::cell::RefCell;
  use std::rc::Rc;

  fn faces() -> Vec<PathBuf> {
    (0..6).map(|i| PathBuf::from(format!("missing/sky{i}.png"))).collect()
  }

  #[test]
  fn translation_is_removed_from_the_view() {
    let view = Matrix4::look_at_rh(
      Point3::new(10.0, 4.0, -3.0),
      Point3::new(0.0, 0.0, 0.0),
      Vector3::unit_y(),
    );
    let rotation = rotation_only(view);
    assert_eq!(rotation.w, Vector4::new(0.0, 0.0, 0.0, 1.0));
    assert_eq!(rotation.x, view.x);
    assert_eq!(rotation.y, view.y);
    assert_eq!(rotation.z, view.z);
  }

  #[test]
  fn draws_behind_everything_and_restores_depth_state() {
    let backend = Rc::new(RefCell::new(HeadlessBackend::new()));
    let registry = ResourceRegistry::new(backend.clone());
    let mut skybox = Skybox::new();
    skybox.create(&registry, &faces()).unwrap();

    let identity = Matrix4::identity();
    skybox.render(identity, identity, identity);

    let backend = backend.borrow();
    let draw = backend.pending_draws()[0];
    assert!(!draw.call.indexed);
    assert_eq!(draw.call.count, 36);
    assert!(!draw.state.depth_write);
    assert_eq!(draw.state.depth_compare, DepthCompare::LessEqual);
    assert_eq!(backend.raster_state(), RasterState::default());
  }

  #[test]
  fn second_create_is_ignored() {
    let backend = Rc::new(RefCell::new(HeadlessBackend::new()));
    let registry = ResourceRegistry::new(backend.clone());
    let mut skybox = Skybox::new();
    skybox.create(&registry, &faces()).unwrap();
    skybox.create(&registry, &faces()).unwrap();

    assert_eq!(registry.list_active(), vec!["Skybox".to_owned()]);
    assert_eq!(backend.borrow().live_textures(), 1);
  }

  #[test]
  fn only_a_created_skybox_draws() {
    let backend = Rc::new(RefCell::new(HeadlessBackend::new()));
    let registry = ResourceRegistry::new(backend.clone());
    let identity = Matrix4::identity();

    let mut skybox = Skybox::new();
    assert!(!skybox.is_created());
    skybox.render(identity, identity, identity);
    assert!(backend.borrow().pending_draws().is_empty());

    skybox.create(&registry, &faces()).unwrap();
    skybox.render(identity, identity, identity);
    assert_eq!(backend.borrow().pending_draws().len(), 1);
  }
}
