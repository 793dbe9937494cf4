//! The graphics backend seam.
//!
//! Everything above this module talks to the GPU through [`GraphicsBackend`]:
//! buffer sets are created and freed through it, renderables push [`DrawCall`]s
//! into it, and the raster state (culling, depth, blending) is a piece of
//! backend state that callers must restore after changing it.

pub mod headless;
pub mod registry;
pub mod wgpu_backend;

use std::cell::RefCell;
use std::rc::Rc;

use cgmath::Matrix4;
use thiserror::Error;

pub use registry::{ResourceHandle, ResourceRecord, ResourceRegistry};

/// Native handle of a vertex array (a vertex buffer plus its attribute layout
/// and optional index buffer).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArrayId(pub u32);

/// Native handle of a vertex or index buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Native handle of a 2D texture or a cubemap.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ComponentType {
  Float32,
  Uint32,
}

impl ComponentType {
  pub const fn size(self) -> u32 {
    match self {
      ComponentType::Float32 | ComponentType::Uint32 => 4,
    }
  }
}

/// One entry of a vertex attribute layout.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
  pub slot: u32,
  pub components: u32,
  pub component_type: ComponentType,
  pub normalized: bool,
  /// Bytes between two consecutive vertices.
  pub stride: u32,
  /// Byte offset of this attribute inside a vertex.
  pub offset: u64,
}

impl VertexAttribute {
  pub const fn float(slot: u32, components: u32, stride: u32, offset: u64) -> Self {
    Self {
      slot,
      components,
      component_type: ComponentType::Float32,
      normalized: false,
      stride,
      offset,
    }
  }
}

/// How often the contents of a buffer are expected to change after upload.
/// Backends may use it to pick a memory placement; the wgpu backend makes
/// anything but `Static` writable from the queue.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum BufferUsage {
  /// Written once.
  #[default]
  Static,
  /// Rewritten now and then.
  Dynamic,
  /// Rewritten every frame.
  Stream,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BufferTarget {
  Vertex,
  Index,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum DepthCompare {
  #[default]
  Less,
  LessEqual,
}

/// Fixed-function state applied to every draw issued while it is current.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RasterState {
  pub cull_back_faces: bool,
  pub depth_write: bool,
  pub depth_compare: DepthCompare,
  pub blend: bool,
}

impl Default for RasterState {
  fn default() -> Self {
    Self {
      cull_back_faces: false,
      depth_write: true,
      depth_compare: DepthCompare::Less,
      blend: false,
    }
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShaderProgram {
  Body,
  Ring,
  Skybox,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniforms {
  pub model: [[f32; 4]; 4],
  pub view: [[f32; 4]; 4],
  pub projection: [[f32; 4]; 4],
}

impl DrawUniforms {
  pub fn new(model: Matrix4<f32>, view: Matrix4<f32>, projection: Matrix4<f32>) -> Self {
    Self {
      model: model.into(),
      view: view.into(),
      projection: projection.into(),
    }
  }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DrawCall {
  pub program: ShaderProgram,
  pub array: ArrayId,
  pub texture: Option<TextureId>,
  pub uniforms: DrawUniforms,
  /// Index count when `indexed`, vertex count otherwise.
  pub count: u32,
  pub indexed: bool,
}

/// Decoded RGBA8 pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureImage {
  pub width: u32,
  pub height: u32,
  pub pixels: Vec<u8>,
}

impl TextureImage {
  pub fn solid(rgba: [u8; 4]) -> Self {
    Self {
      width: 1,
      height: 1,
      pixels: rgba.to_vec(),
    }
  }
}

#[derive(Debug, Error)]
pub enum GpuError {
  #[error("failed to allocate {what} for `{label}`")]
  Allocation { what: &'static str, label: String },
  #[error("unknown vertex array {0:?}")]
  UnknownArray(ArrayId),
  #[error("unknown buffer {0:?}")]
  UnknownBuffer(BufferId),
  #[error("buffer `{label}` is {size} bytes, device limit is {limit}")]
  BufferTooLarge { label: String, size: u64, limit: u64 },
  #[error("a cubemap needs 6 faces of equal size, got {0}")]
  CubemapFaces(usize),
  #[error("no suitable GPU adapter found")]
  NoAdapter,
  #[error("surface is not supported by the adapter")]
  UnsupportedSurface,
  #[error(transparent)]
  CreateSurface(#[from] wgpu::CreateSurfaceError),
  #[error(transparent)]
  RequestDevice(#[from] wgpu::RequestDeviceError),
  #[error(transparent)]
  Surface(#[from] wgpu::SurfaceError),
}

impl GpuError {
  /// Errors that cost the current frame only; the next one may succeed.
  pub fn is_transient(&self) -> bool {
    matches!(
      self,
      GpuError::Surface(
        wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost
      )
    )
  }
}

pub trait GraphicsBackend {
  fn create_vertex_array(&mut self, label: &str) -> Result<ArrayId, GpuError>;

  fn create_buffer(
    &mut self,
    label: &str,
    target: BufferTarget,
    contents: &[u8],
    usage: BufferUsage,
  ) -> Result<BufferId, GpuError>;

  /// Attaches the buffers to the array and records how vertices are laid out.
  fn bind_vertex_layout(
    &mut self,
    array: ArrayId,
    vertex_buffer: BufferId,
    index_buffer: Option<BufferId>,
    attributes: &[VertexAttribute],
  ) -> Result<(), GpuError>;

  fn delete_vertex_array(&mut self, array: ArrayId);

  fn delete_buffer(&mut self, buffer: BufferId);

  fn create_texture(&mut self, label: &str, image: &TextureImage) -> Result<TextureId, GpuError>;

  /// Faces are ordered +X, -X, +Y, -Y, +Z, -Z.
  fn create_cubemap(&mut self, label: &str, faces: &[TextureImage]) -> Result<TextureId, GpuError>;

  fn raster_state(&self) -> RasterState;

  fn set_raster_state(&mut self, state: RasterState);

  fn begin_frame(&mut self);

  fn draw(&mut self, call: DrawCall);

  fn end_frame(&mut self) -> Result<(), GpuError>;
}

/// The backend shared by the registry and every renderable.
pub type Gpu = Rc<RefCell<dyn GraphicsBackend>>;

/// Issues `call` under `state`, then puts the previous raster state back.
pub fn draw_with_state(backend: &mut dyn GraphicsBackend, state: RasterState, call: DrawCall) {
  let prior = backend.raster_state();
  backend.set_raster_state(state);
  backend.draw(call);
  backend.set_raster_state(prior);
}
