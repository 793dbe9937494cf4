use std::path::Path;

use cgmath::Matrix4;
use log::info;

use crate::gpu::{
  draw_with_state, BufferUsage, DrawCall, DrawUniforms, Gpu, GpuError, RasterState, ResourceHandle,
  ResourceRegistry, ShaderProgram, TextureId,
};
use crate::mesh::TEXTURED_LAYOUT;
use crate::scene::Renderable;
use crate::texture;

const HALF_EXTENT: f32 = 3.0;

#[rustfmt::skip]
const VERTICES: [f32; 20] = [
  // x, y, z, u, v
  -HALF_EXTENT, 0.0, -HALF_EXTENT, 0.0, 0.0,
   HALF_EXTENT, 0.0, -HALF_EXTENT, 1.0, 0.0,
   HALF_EXTENT, 0.0,  HALF_EXTENT, 1.0, 1.0,
  -HALF_EXTENT, 0.0,  HALF_EXTENT, 0.0, 1.0,
];

const INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// A translucent textured quad in the XZ plane of whatever model matrix it is
/// drawn with; the scene draws it with its host body's transform.
pub struct Ring {
  gpu: Gpu,
  buffers: ResourceHandle,
  texture: TextureId,
}

impl Ring {
  pub fn create(registry: &ResourceRegistry, texture_path: &Path) -> Result<Self, GpuError> {
    let buffers = registry.create_buffer_set(
      "Saturn_Ring",
      &VERTICES,
      &INDICES,
      &TEXTURED_LAYOUT,
      BufferUsage::Static,
    )?;
    let gpu = registry.gpu();
    let texture = texture::create_texture(&mut *gpu.borrow_mut(), texture_path)?;
    info!("Ring created");
    Ok(Self {
      gpu,
      buffers,
      texture,
    })
  }
}

impl Renderable for Ring {
  fn label(&self) -> &str {
    "ring"
  }

  /// Visible from both sides and never writes depth, so bodies behind the
  /// ring still show through it. The previous raster state is restored.
  fn render(&self, model: Matrix4<f32>, view: Matrix4<f32>, projection: Matrix4<f32>) {
    let Some(array) = self.buffers.array() else {
      return;
    };
    let mut gpu = self.gpu.borrow_mut();
    let prior = gpu.raster_state();
    let state = RasterState {
      cull_back_faces: false,
      depth_write: false,
      blend: true,
      ..prior
    };
    draw_with_state(
      &mut *gpu,
      state,
      DrawCall {
        program: ShaderProgram::Ring,
        array,
        texture: Some(self.texture),
        uniforms: DrawUniforms::new(model, view, projection),
        count: INDICES.len() as u32,
        indexed: true,
      },
    );
  }
}
