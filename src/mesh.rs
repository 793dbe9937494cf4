use std::f32::consts::{FRAC_PI_2, PI};

use crate::gpu::VertexAttribute;

/// Floats per vertex: position (3) + uv (2).
pub const FLOATS_PER_VERTEX: usize = 5;

/// Position + uv, interleaved.
pub const TEXTURED_LAYOUT: [VertexAttribute; 2] = [
  VertexAttribute::float(0, 3, (FLOATS_PER_VERTEX * 4) as u32, 0),
  VertexAttribute::float(1, 2, (FLOATS_PER_VERTEX * 4) as u32, 3 * 4),
];

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SphereMesh {
  pub vertices: Vec<f32>,
  pub indices: Vec<u32>,
}

impl SphereMesh {
  pub fn vertex_count(&self) -> usize {
    self.vertices.len() / FLOATS_PER_VERTEX
  }

  pub fn index_count(&self) -> u32 {
    self.indices.len() as u32
  }
}

/// Builds a UV sphere. Stacks run from the north pole (`+Y`) to the south
/// pole, sectors go around the equator. The first and last stacks each emit
/// a single triangle per sector since the other one would be degenerate.
pub fn generate_sphere_mesh(radius: f32, sector_count: u32, stack_count: u32) -> SphereMesh {
  let sector_count = sector_count.max(3);
  let stack_count = stack_count.max(2);

  let sector_step = 2.0 * PI / sector_count as f32;
  let stack_step = PI / stack_count as f32;

  let vertex_total = ((sector_count + 1) * (stack_count + 1)) as usize;
  let mut vertices = Vec::with_capacity(vertex_total * FLOATS_PER_VERTEX);

  for i in 0..=stack_count {
    let stack_angle = FRAC_PI_2 - i as f32 * stack_step;
    let xz = radius * stack_angle.cos();
    let y = radius * stack_angle.sin();

    for j in 0..=sector_count {
      let sector_angle = j as f32 * sector_step;
      let u = j as f32 / sector_count as f32;
      let v = 1.0 - i as f32 / stack_count as f32;
      vertices.extend_from_slice(&[xz * sector_angle.cos(), y, xz * sector_angle.sin(), u, v]);
    }
  }

  let mut indices = Vec::with_capacity(((stack_count - 1) * sector_count * 6) as usize);
  for i in 0..stack_count {
    let mut k1 = i * (sector_count + 1);
    let mut k2 = k1 + sector_count + 1;

    for _ in 0..sector_count {
      if i != 0 {
        indices.extend_from_slice(&[k1, k2, k1 + 1]);
      }
      if i != stack_count - 1 {
        indices.extend_from_slice(&[k1 + 1, k2, k2 + 1]);
      }
      k1 += 1;
      k2 += 1;
    }
  }

  SphereMesh { vertices, indices }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  #[test]
  fn vertex_and_index_counts() {
    let mesh = generate_sphere_mesh(1.0, 36, 18);
    assert_eq!(mesh.vertex_count(), 37 * 19);
    // Two triangles per quad, minus one per sector at each pole.
    assert_eq!(mesh.indices.len(), (18 * 36 * 2 - 2 * 36) * 3);
    let max = *mesh.indices.iter().max().unwrap() as usize;
    assert!(max < mesh.vertex_count());
  }

  #[test]
  fn every_vertex_lies_on_the_sphere() {
    let radius = 2.5;
    let mesh = generate_sphere_mesh(radius, 12, 8);
    for vertex in mesh.vertices.chunks(FLOATS_PER_VERTEX) {
      let length = (vertex[0] * vertex[0] + vertex[1] * vertex[1] + vertex[2] * vertex[2]).sqrt();
      assert_relative_eq!(length, radius, epsilon = 1e-4);
      assert!((0.0..=1.0).contains(&vertex[3]));
      assert!((0.0..=1.0).contains(&vertex[4]));
    }
  }

  #[test]
  fn poles_have_no_degenerate_triangles() {
    let mesh = generate_sphere_mesh(1.0, 8, 4);
    for triangle in mesh.indices.chunks(3) {
      assert!(triangle[0] != triangle[1] && triangle[1] != triangle[2] && triangle[0] != triangle[2]);
    }
    // Vertex 0 is the north pole at +Y.
    assert_relative_eq!(mesh.vertices[1], 1.0, epsilon = 1e-6);
  }
}
