//! Centre-of-screen picking.
//!
//! A ray leaves the camera along its (unit) forward vector and is tested
//! against one sphere per body; the nearest hit along the ray wins. Distances
//! are in world units because the direction is always normalized.

use cgmath::{InnerSpace, Point3, Vector3};
use log::debug;

use crate::body::OrbitingBody;
use crate::camera::Camera;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ray {
  pub origin: Point3<f32>,
  pub direction: Vector3<f32>,
}

impl Ray {
  pub fn new(origin: Point3<f32>, direction: Vector3<f32>) -> Self {
    Self {
      origin,
      direction: direction.normalize(),
    }
  }

  pub fn from_camera(camera: &Camera) -> Self {
    Self::new(camera.position, camera.ray_direction())
  }

  /// Distance to the first intersection with the sphere in front of the
  /// origin. From inside the sphere that is the exit point.
  pub fn intersect_sphere(&self, center: Point3<f32>, radius: f32) -> Option<f32> {
    let oc = self.origin - center;
    let a = self.direction.dot(self.direction);
    let b = 2.0 * oc.dot(self.direction);
    let c = oc.dot(oc) - radius * radius;
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 || a == 0.0 {
      return None;
    }

    let root = discriminant.sqrt();
    let near = (-b - root) / (2.0 * a);
    if near >= 0.0 {
      return Some(near);
    }
    let far = (-b + root) / (2.0 * a);
    (far >= 0.0).then_some(far)
  }
}

/// Anything that can be selected by a ray.
pub trait Pickable {
  fn pick_center(&self) -> Point3<f32>;
  fn pick_radius(&self) -> f32;
}

impl Pickable for OrbitingBody {
  fn pick_center(&self) -> Point3<f32> {
    let position = self.position();
    Point3::new(position.x, position.y, position.z)
  }

  /// The rendered size, not the physical radius.
  fn pick_radius(&self) -> f32 {
    self.kind().visual_scale()
  }
}

/// A bare sphere, for picking against things that are not bodies.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sphere {
  pub center: Point3<f32>,
  pub radius: f32,
}

impl Pickable for Sphere {
  fn pick_center(&self) -> Point3<f32> {
    self.center
  }

  fn pick_radius(&self) -> f32 {
    self.radius
  }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PickResult {
  pub hit: bool,
  pub index: usize,
  pub distance: f32,
}

impl PickResult {
  pub const MISS: PickResult = PickResult {
    hit: false,
    index: 0,
    distance: f32::MAX,
  };

  pub fn selected(&self) -> Option<usize> {
    self.hit.then_some(self.index)
  }
}

pub fn pick_with_ray<'a, P, I>(ray: &Ray, candidates: I) -> PickResult
where
  P: Pickable + ?Sized + 'a,
  I: IntoIterator<Item = &'a P>,
{
  let mut result = PickResult::MISS;
  for (index, candidate) in candidates.into_iter().enumerate() {
    let radius = candidate.pick_radius();
    let Some(distance) = ray.intersect_sphere(candidate.pick_center(), radius) else {
      continue;
    };
    debug!("  hit candidate {index} at distance {distance} (radius {radius})");
    if distance < result.distance {
      result = PickResult {
        hit: true,
        index,
        distance,
      };
    }
  }
  result
}

pub fn pick_body<'a, P, I>(camera: &Camera, candidates: I) -> PickResult
where
  P: Pickable + ?Sized + 'a,
  I: IntoIterator<Item = &'a P>,
{
  let ray = Ray::from_camera(camera);
  debug!("Ray origin {:?}, direction {:?}", ray.origin, ray.direction);
  pick_with_ray(&ray, candidates)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::CameraParams;
  use approx::assert_relative_eq;

  fn sphere(x: f32, y: f32, z: f32, radius: f32) -> Sphere {
    Sphere {
      center: Point3::new(x, y, z),
      radius,
    }
  }

  fn camera_facing_x(x: f32) -> Camera {
    Camera::new(Point3::new(x, 0.0, 0.0), 0.0, 0.0, &CameraParams::default())
  }

  #[test]
  fn nearest_of_three_along_the_ray() {
    let bodies = [
      sphere(0.0, 0.0, 0.0, 3.0),
      sphere(10.0, 0.0, 0.0, 1.0),
      sphere(20.0, 0.0, 0.0, 1.0),
    ];
    let result = pick_body(&camera_facing_x(-5.0), &bodies);
    assert!(result.hit);
    assert_eq!(result.index, 0);
    assert_relative_eq!(result.distance, 2.0, epsilon = 1e-4);
  }

  #[test]
  fn nearer_sphere_wins_regardless_of_order() {
    let bodies = [sphere(30.0, 0.0, 0.0, 2.0), sphere(12.0, 0.0, 0.0, 2.0)];
    let result = pick_body(&camera_facing_x(0.0), &bodies);
    assert_eq!(result.selected(), Some(1));
    assert_relative_eq!(result.distance, 10.0, epsilon = 1e-4);
  }

  #[test]
  fn off_ray_body_is_missed() {
    let bodies = [sphere(0.0, 5.0, 0.0, 1.0)];
    let result = pick_body(&camera_facing_x(0.0), &bodies);
    assert!(!result.hit);
    assert_eq!(result.selected(), None);
  }

  #[test]
  fn bodies_behind_the_camera_are_missed() {
    let bodies = [sphere(-10.0, 0.0, 0.0, 1.0), sphere(-20.0, 0.0, 0.0, 5.0)];
    assert!(!pick_body(&camera_facing_x(0.0), &bodies).hit);
  }

  #[test]
  fn no_candidates_is_a_miss() {
    let bodies: [Sphere; 0] = [];
    assert_eq!(pick_body(&camera_facing_x(0.0), &bodies), PickResult::MISS);
  }

  #[test]
  fn inside_a_sphere_hits_the_exit_point() {
    let ray = Ray::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 1.0));
    let distance = ray.intersect_sphere(Point3::new(0.0, 0.0, 0.0), 4.0).unwrap();
    assert_relative_eq!(distance, 4.0, epsilon = 1e-5);
  }

  #[test]
  fn direction_is_normalized_so_distance_is_in_world_units() {
    let ray = Ray::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(5.0, 0.0, 0.0));
    let distance = ray.intersect_sphere(Point3::new(8.0, 0.0, 0.0), 1.0).unwrap();
    assert_relative_eq!(distance, 7.0, epsilon = 1e-5);
  }

  #[test]
  fn grazing_ray_counts_as_a_hit() {
    let ray = Ray::new(Point3::new(0.0, 1.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
    let distance = ray.intersect_sphere(Point3::new(5.0, 0.0, 0.0), 1.0).unwrap();
    assert_relative_eq!(distance, 5.0, epsilon = 1e-3);
  }
}
