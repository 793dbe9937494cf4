//! Lifetime management for GPU buffer sets.
//!
//! [`ResourceRegistry`] is the only place buffer sets are created and the
//! single source of truth for what is currently allocated. Every set it
//! creates is owned by exactly one [`ResourceHandle`]; dropping the handle
//! gives the set back to the registry, which frees the native objects.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use log::{debug, info, warn};

use super::{
  ArrayId, BufferId, BufferTarget, BufferUsage, Gpu, GpuError, GraphicsBackend, VertexAttribute,
};

/// Bookkeeping for one vertex array + vertex buffer + optional index buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
  pub array: ArrayId,
  pub vertex_buffer: BufferId,
  pub index_buffer: Option<BufferId>,
  pub owner: String,
  pub vertex_bytes: usize,
  pub index_bytes: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct BufferSet {
  array: ArrayId,
  vertex_buffer: BufferId,
  index_buffer: Option<BufferId>,
}

impl BufferSet {
  fn free(self, backend: &mut dyn GraphicsBackend) {
    backend.delete_vertex_array(self.array);
    backend.delete_buffer(self.vertex_buffer);
    if let Some(index_buffer) = self.index_buffer {
      backend.delete_buffer(index_buffer);
    }
  }
}

struct RecordTable {
  gpu: Gpu,
  records: HashMap<ArrayId, ResourceRecord>,
}

impl RecordTable {
  fn release(&mut self, set: BufferSet) {
    match self.records.remove(&set.array) {
      Some(record) => debug!("Releasing buffer set: {} ({:?})", record.owner, set.array),
      None => warn!(
        "Releasing buffer set {:?} the registry no longer tracks",
        set.array
      ),
    }
    set.free(&mut *self.gpu.borrow_mut());
  }
}

pub struct ResourceRegistry {
  table: Rc<RefCell<RecordTable>>,
}

impl ResourceRegistry {
  pub fn new(gpu: Gpu) -> Self {
    Self {
      table: Rc::new(RefCell::new(RecordTable {
        gpu,
        records: HashMap::new(),
      })),
    }
  }

  /// The backend this registry allocates from.
  pub fn gpu(&self) -> Gpu {
    self.table.borrow().gpu.clone()
  }

  /// Allocates a vertex array and vertex buffer (plus an index buffer when
  /// `indices` is non-empty), uploads the data, applies `attributes` and
  /// registers the set under `owner`.
  ///
  /// Anything allocated before a failing step is freed again before the
  /// error is returned, so a failure never leaves a partial set behind.
  pub fn create_buffer_set(
    &self,
    owner: &str,
    vertices: &[f32],
    indices: &[u32],
    attributes: &[VertexAttribute],
    usage: BufferUsage,
  ) -> Result<ResourceHandle, GpuError> {
    let mut table = self.table.borrow_mut();
    let set = {
      let mut backend = table.gpu.borrow_mut();
      allocate_set(&mut *backend, owner, vertices, indices, attributes, usage)?
    };

    let record = ResourceRecord {
      array: set.array,
      vertex_buffer: set.vertex_buffer,
      index_buffer: set.index_buffer,
      owner: owner.to_owned(),
      vertex_bytes: std::mem::size_of_val(vertices),
      index_bytes: std::mem::size_of_val(indices),
    };
    table.records.insert(set.array, record);
    debug!("Created buffer set for: {owner} ({:?})", set.array);

    Ok(ResourceHandle {
      set: Some(set),
      registry: Rc::downgrade(&self.table),
    })
  }

  pub fn active_count(&self) -> usize {
    self.table.borrow().records.len()
  }

  /// Sum of vertex and index bytes of every registered set.
  pub fn total_memory_usage(&self) -> usize {
    self
      .table
      .borrow()
      .records
      .values()
      .map(|record| record.vertex_bytes + record.index_bytes)
      .sum()
  }

  /// Owner labels of every registered set, sorted.
  pub fn list_active(&self) -> Vec<String> {
    let mut owners: Vec<String> = self
      .table
      .borrow()
      .records
      .values()
      .map(|record| record.owner.clone())
      .collect();
    owners.sort();
    owners
  }

  pub fn record(&self, array: ArrayId) -> Option<ResourceRecord> {
    self.table.borrow().records.get(&array).cloned()
  }

  pub fn log_active_buffers(&self) {
    let table = self.table.borrow();
    let mut records: Vec<&ResourceRecord> = table.records.values().collect();
    records.sort_by_key(|record| record.array);

    info!("=== Active Buffer Sets ===");
    for record in records {
      info!(
        "  {} - array: {:?}, vertex: {:?}, index: {:?} | {} KB",
        record.owner,
        record.array,
        record.vertex_buffer,
        record.index_buffer,
        (record.vertex_bytes + record.index_bytes) / 1024
      );
    }
    drop(table);
    info!("Total buffer sets: {}", self.active_count());
    info!("Total memory: {} KB", self.total_memory_usage() / 1024);
  }
}

impl Drop for ResourceRegistry {
  fn drop(&mut self) {
    let mut table = self.table.borrow_mut();
    let RecordTable { gpu, records } = &mut *table;
    if records.is_empty() {
      return;
    }

    warn!(
      "ResourceRegistry cleaning up {} remaining buffer sets:",
      records.len()
    );
    let mut backend = gpu.borrow_mut();
    for (_, record) in records.drain() {
      warn!("  - {}", record.owner);
      BufferSet {
        array: record.array,
        vertex_buffer: record.vertex_buffer,
        index_buffer: record.index_buffer,
      }
      .free(&mut *backend);
    }
  }
}

fn allocate_set(
  backend: &mut dyn GraphicsBackend,
  owner: &str,
  vertices: &[f32],
  indices: &[u32],
  attributes: &[VertexAttribute],
  usage: BufferUsage,
) -> Result<BufferSet, GpuError> {
  let array = backend.create_vertex_array(owner)?;

  let vertex_buffer = match backend.create_buffer(
    owner,
    BufferTarget::Vertex,
    bytemuck::cast_slice(vertices),
    usage,
  ) {
    Ok(buffer) => buffer,
    Err(err) => {
      backend.delete_vertex_array(array);
      return Err(err);
    }
  };

  let mut set = BufferSet {
    array,
    vertex_buffer,
    index_buffer: None,
  };

  if !indices.is_empty() {
    match backend.create_buffer(
      owner,
      BufferTarget::Index,
      bytemuck::cast_slice(indices),
      usage,
    ) {
      Ok(buffer) => set.index_buffer = Some(buffer),
      Err(err) => {
        set.free(backend);
        return Err(err);
      }
    }
  }

  if let Err(err) = backend.bind_vertex_layout(array, vertex_buffer, set.index_buffer, attributes) {
    set.free(backend);
    return Err(err);
  }

  Ok(set)
}

/// Owning token for one registered buffer set.
///
/// A handle is either valid (it owns a set) or null (default-constructed,
/// taken from, or released). Releasing a valid handle returns its set to the
/// registry exactly once; releasing a null handle does nothing. Handles are
/// move-only:
///
/// ```compile_fail
/// use solar_system::gpu::ResourceHandle;
///
/// let handle = ResourceHandle::default();
/// let copy = handle.clone();
/// ```
#[derive(Debug, Default)]
pub struct ResourceHandle {
  set: Option<BufferSet>,
  registry: Weak<RefCell<RecordTable>>,
}

impl ResourceHandle {
  pub fn is_valid(&self) -> bool {
    self.set.is_some()
  }

  pub fn array(&self) -> Option<ArrayId> {
    self.set.map(|set| set.array)
  }

  pub fn vertex_buffer(&self) -> Option<BufferId> {
    self.set.map(|set| set.vertex_buffer)
  }

  pub fn index_buffer(&self) -> Option<BufferId> {
    self.set.and_then(|set| set.index_buffer)
  }

  /// Moves the set out into a new handle, leaving this one null.
  pub fn take(&mut self) -> ResourceHandle {
    std::mem::take(self)
  }

  /// Gives the set back to the registry now instead of at drop.
  ///
  /// If the registry is already gone its teardown has freed the set, so
  /// there is nothing left to do.
  pub fn release(&mut self) {
    let Some(set) = self.set.take() else {
      return;
    };
    match self.registry.upgrade() {
      Some(table) => table.borrow_mut().release(set),
      None => debug!(
        "Buffer set {:?} outlived its registry; already reclaimed",
        set.array
      ),
    }
  }
}

impl Drop for ResourceHandle {
  fn drop(&mut self) {
    self.release();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gpu::headless::HeadlessBackend;

  const LAYOUT: [VertexAttribute; 2] = [
    VertexAttribute::float(0, 3, 20, 0),
    VertexAttribute::float(1, 2, 20, 12),
  ];

  fn setup() -> (Rc<RefCell<HeadlessBackend>>, ResourceRegistry) {
    let backend = Rc::new(RefCell::new(HeadlessBackend::new()));
    let registry = ResourceRegistry::new(backend.clone());
    (backend, registry)
  }

  fn quad(registry: &ResourceRegistry, owner: &str) -> ResourceHandle {
    let vertices = [0.0f32; 20];
    let indices = [0u32, 1, 2, 2, 3, 0];
    registry
      .create_buffer_set(owner, &vertices, &indices, &LAYOUT, BufferUsage::Static)
      .unwrap()
  }

  #[test]
  fn created_handles_are_distinct_and_valid() {
    let (_backend, registry) = setup();
    let a = quad(&registry, "a");
    let b = quad(&registry, "b");

    assert!(a.is_valid() && b.is_valid());
    assert_ne!(a.array(), b.array());
    assert_eq!(registry.active_count(), 2);
    assert_eq!(registry.list_active(), vec!["a".to_owned(), "b".to_owned()]);
  }

  #[test]
  fn memory_accounting_counts_vertex_and_index_bytes() {
    let (_backend, registry) = setup();
    let before = registry.total_memory_usage();

    let vertices = vec![0.5f32; 37];
    let indices = vec![1u32; 11];
    let _handle = registry
      .create_buffer_set("sized", &vertices, &indices, &LAYOUT, BufferUsage::Static)
      .unwrap();

    assert_eq!(registry.total_memory_usage() - before, 37 * 4 + 11 * 4);
  }

  #[test]
  fn empty_indices_skip_the_index_buffer() {
    let (backend, registry) = setup();
    let handle = registry
      .create_buffer_set("cube", &[0.0; 9], &[], &LAYOUT[..1], BufferUsage::Static)
      .unwrap();

    assert_eq!(handle.index_buffer(), None);
    assert_eq!(backend.borrow().live_buffers(), 1);
    let record = registry.record(handle.array().unwrap()).unwrap();
    assert_eq!(record.index_bytes, 0);
    assert_eq!(record.owner, "cube");
  }

  #[test]
  fn dropping_a_handle_releases_exactly_one_record() {
    let (backend, registry) = setup();
    let keep = quad(&registry, "keep");
    let gone = quad(&registry, "gone");

    drop(gone);

    assert_eq!(registry.active_count(), 1);
    assert_eq!(registry.list_active(), vec!["keep".to_owned()]);
    assert_eq!(backend.borrow().live_arrays(), 1);
    assert_eq!(backend.borrow().double_frees(), 0);
    drop(keep);
    assert_eq!(registry.active_count(), 0);
  }

  #[test]
  fn taking_leaves_a_null_handle_whose_release_is_a_noop() {
    let (backend, registry) = setup();
    let mut original = quad(&registry, "moved");
    let moved = original.take();

    assert!(!original.is_valid());
    assert!(moved.is_valid());
    original.release();
    drop(original);
    assert_eq!(registry.active_count(), 1);

    drop(moved);
    assert_eq!(registry.active_count(), 0);
    assert_eq!(backend.borrow().double_frees(), 0);
  }

  #[test]
  fn explicit_release_then_drop_frees_once() {
    let (backend, registry) = setup();
    let mut handle = quad(&registry, "once");
    handle.release();
    assert!(!handle.is_valid());
    drop(handle);

    assert_eq!(backend.borrow().freed(), 3);
    assert_eq!(backend.borrow().double_frees(), 0);
  }

  #[test]
  fn assigning_over_a_handle_releases_the_old_set() {
    let (_backend, registry) = setup();
    let mut slot = quad(&registry, "first");
    assert_eq!(registry.list_active(), vec!["first".to_owned()]);
    slot = quad(&registry, "second");

    assert_eq!(registry.list_active(), vec!["second".to_owned()]);
    assert!(slot.is_valid());
  }

  #[test]
  fn teardown_reclaims_leaked_sets_without_double_free() {
    let (backend, registry) = setup();
    let released = quad(&registry, "released");
    let leaked = quad(&registry, "leaked");
    drop(released);

    drop(registry);
    assert_eq!(backend.borrow().live_arrays(), 0);
    assert_eq!(backend.borrow().live_buffers(), 0);

    drop(leaked);
    assert_eq!(backend.borrow().double_frees(), 0);
  }

  #[test]
  fn usage_hint_reaches_every_buffer_of_the_set() {
    let (backend, registry) = setup();
    let handle = registry
      .create_buffer_set("trail", &[0.0; 20], &[0, 1, 2], &LAYOUT, BufferUsage::Stream)
      .unwrap();
    let still = quad(&registry, "still");

    let backend = backend.borrow();
    for buffer in [handle.vertex_buffer(), handle.index_buffer()] {
      assert_eq!(backend.buffer_usage(buffer.unwrap()), Some(BufferUsage::Stream));
    }
    assert_eq!(
      backend.buffer_usage(still.vertex_buffer().unwrap()),
      Some(BufferUsage::Static)
    );
  }

  #[test]
  fn failed_allocation_leaves_nothing_behind() {
    let (backend, registry) = setup();
    backend.borrow_mut().fail_allocations(true);

    let result = registry.create_buffer_set("doomed", &[0.0; 5], &[0], &LAYOUT, BufferUsage::Static);

    assert!(result.is_err());
    assert_eq!(registry.active_count(), 0);
    assert_eq!(backend.borrow().live_arrays(), 0);
    assert_eq!(backend.borrow().live_buffers(), 0);
  }

  #[test]
  fn default_handle_is_null() {
    let mut handle = ResourceHandle::default();
    assert!(!handle.is_valid());
    assert_eq!(handle.array(), None);
    handle.release();
  }
}
