//! A backend with no device behind it.
//!
//! Native ids are handed out from a counter and every allocation, free and
//! draw is recorded, which makes it the GPU double for `--headless` runs and
//! for tests that need to observe what the scene asked the GPU to do.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use super::{
  ArrayId, BufferId, BufferTarget, BufferUsage, DrawCall, GpuError, GraphicsBackend, RasterState,
  TextureId, TextureImage, VertexAttribute,
};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RecordedDraw {
  pub call: DrawCall,
  pub state: RasterState,
}

#[derive(Default)]
pub struct HeadlessBackend {
  next_id: u32,
  arrays: HashSet<ArrayId>,
  buffers: HashMap<BufferId, (BufferTarget, usize, BufferUsage)>,
  layouts: HashMap<ArrayId, Vec<VertexAttribute>>,
  textures: HashSet<TextureId>,
  state: RasterState,
  frame: Vec<RecordedDraw>,
  last_frame: Vec<RecordedDraw>,
  frames_completed: u64,
  freed: usize,
  double_frees: usize,
  failing: bool,
}

impl HeadlessBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Makes every following allocation fail, for exercising error paths.
  pub fn fail_allocations(&mut self, failing: bool) {
    self.failing = failing;
  }

  pub fn live_arrays(&self) -> usize {
    self.arrays.len()
  }

  pub fn live_buffers(&self) -> usize {
    self.buffers.len()
  }

  pub fn live_textures(&self) -> usize {
    self.textures.len()
  }

  pub fn live_bytes(&self) -> usize {
    self.buffers.values().map(|(_, size, _)| size).sum()
  }

  pub fn buffer_usage(&self, buffer: BufferId) -> Option<BufferUsage> {
    self.buffers.get(&buffer).map(|(_, _, usage)| *usage)
  }

  /// Number of native objects (arrays and buffers) freed so far.
  pub fn freed(&self) -> usize {
    self.freed
  }

  pub fn double_frees(&self) -> usize {
    self.double_frees
  }

  pub fn layout(&self, array: ArrayId) -> Option<&[VertexAttribute]> {
    self.layouts.get(&array).map(Vec::as_slice)
  }

  /// Draws of the frame currently being recorded.
  pub fn pending_draws(&self) -> &[RecordedDraw] {
    &self.frame
  }

  /// Draws of the most recently completed frame.
  pub fn last_frame(&self) -> &[RecordedDraw] {
    &self.last_frame
  }

  pub fn frames_completed(&self) -> u64 {
    self.frames_completed
  }

  fn allocate(&mut self, what: &'static str, label: &str) -> Result<u32, GpuError> {
    if self.failing {
      return Err(GpuError::Allocation {
        what,
        label: label.to_owned(),
      });
    }
    self.next_id += 1;
    Ok(self.next_id)
  }
}

impl GraphicsBackend for HeadlessBackend {
  fn create_vertex_array(&mut self, label: &str) -> Result<ArrayId, GpuError> {
    let array = ArrayId(self.allocate("vertex array", label)?);
    self.arrays.insert(array);
    Ok(array)
  }

  fn create_buffer(
    &mut self,
    label: &str,
    target: BufferTarget,
    contents: &[u8],
    usage: BufferUsage,
  ) -> Result<BufferId, GpuError> {
    let buffer = BufferId(self.allocate("buffer", label)?);
    self.buffers.insert(buffer, (target, contents.len(), usage));
    Ok(buffer)
  }

  fn bind_vertex_layout(
    &mut self,
    array: ArrayId,
    vertex_buffer: BufferId,
    index_buffer: Option<BufferId>,
    attributes: &[VertexAttribute],
  ) -> Result<(), GpuError> {
    if !self.arrays.contains(&array) {
      return Err(GpuError::UnknownArray(array));
    }
    for buffer in std::iter::once(vertex_buffer).chain(index_buffer) {
      if !self.buffers.contains_key(&buffer) {
        return Err(GpuError::UnknownBuffer(buffer));
      }
    }
    self.layouts.insert(array, attributes.to_vec());
    Ok(())
  }

  fn delete_vertex_array(&mut self, array: ArrayId) {
    if self.arrays.remove(&array) {
      self.layouts.remove(&array);
      self.freed += 1;
    } else {
      warn!("vertex array {array:?} freed twice");
      self.double_frees += 1;
    }
  }

  fn delete_buffer(&mut self, buffer: BufferId) {
    if self.buffers.remove(&buffer).is_some() {
      self.freed += 1;
    } else {
      warn!("buffer {buffer:?} freed twice");
      self.double_frees += 1;
    }
  }

  fn create_texture(&mut self, label: &str, image: &TextureImage) -> Result<TextureId, GpuError> {
    let texture = TextureId(self.allocate("texture", label)?);
    debug!("texture `{label}` {}x{}", image.width, image.height);
    self.textures.insert(texture);
    Ok(texture)
  }

  fn create_cubemap(&mut self, label: &str, faces: &[TextureImage]) -> Result<TextureId, GpuError> {
    if faces.len() != 6 {
      return Err(GpuError::CubemapFaces(faces.len()));
    }
    let texture = TextureId(self.allocate("cubemap", label)?);
    self.textures.insert(texture);
    Ok(texture)
  }

  fn raster_state(&self) -> RasterState {
    self.state
  }

  fn set_raster_state(&mut self, state: RasterState) {
    self.state = state;
  }

  fn begin_frame(&mut self) {
    self.frame.clear();
  }

  fn draw(&mut self, call: DrawCall) {
    self.frame.push(RecordedDraw {
      call,
      state: self.state,
    });
  }

  fn end_frame(&mut self) -> Result<(), GpuError> {
    self.last_frame = std::mem::take(&mut self.frame);
    self.frames_completed += 1;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn freeing_twice_is_counted_not_panicking() {
    let mut backend = HeadlessBackend::new();
    let buffer = backend
      .create_buffer("test", BufferTarget::Vertex, &[0; 16], BufferUsage::Static)
      .unwrap();
    assert_eq!(backend.live_bytes(), 16);

    backend.delete_buffer(buffer);
    backend.delete_buffer(buffer);
    assert_eq!(backend.live_buffers(), 0);
    assert_eq!(backend.freed(), 1);
    assert_eq!(backend.double_frees(), 1);
  }

  #[test]
  fn layout_requires_known_handles() {
    let mut backend = HeadlessBackend::new();
    let array = backend.create_vertex_array("test").unwrap();
    let result = backend.bind_vertex_layout(array, BufferId(999), None, &[]);
    assert!(matches!(result, Err(GpuError::UnknownBuffer(BufferId(999)))));
  }

  #[test]
  fn failing_backend_reports_allocation_errors() {
    let mut backend = HeadlessBackend::new();
    backend.fail_allocations(true);
    assert!(matches!(
      backend.create_vertex_array("doomed"),
      Err(GpuError::Allocation { what: "vertex array", .. })
    ));
  }

  #[test]
  fn cubemap_needs_six_faces() {
    let mut backend = HeadlessBackend::new();
    let faces = vec![TextureImage::solid([0, 0, 0, 255]); 5];
    assert!(matches!(
      backend.create_cubemap("sky", &faces),
      Err(GpuError::CubemapFaces(5))
    ));
  }
}
