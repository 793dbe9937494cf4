//! Information shown on top of the scene for the selected body.

use cgmath::{Matrix4, Vector3};

use crate::catalog::BodyInfo;

const FPS_REFRESH_SECONDS: f32 = 0.5;

/// Pixel coordinates with the origin at the top-left corner.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ScreenPosition {
  pub x: f32,
  pub y: f32,
}

/// Projects a world position onto the screen. `None` when the point is behind
/// the camera or outside the viewport.
pub fn world_to_screen(
  position: Vector3<f32>,
  view: Matrix4<f32>,
  projection: Matrix4<f32>,
  width: u32,
  height: u32,
) -> Option<ScreenPosition> {
  let clip = projection * view * position.extend(1.0);
  if clip.w <= 0.0 {
    return None;
  }
  let ndc = clip.truncate() / clip.w;
  if ndc.x.abs() > 1.0 || ndc.y.abs() > 1.0 {
    return None;
  }
  Some(ScreenPosition {
    x: (ndc.x + 1.0) * 0.5 * width as f32,
    y: (1.0 - ndc.y) * 0.5 * height as f32,
  })
}

/// The info panel for one body, anchored next to it on screen.
#[derive(Clone, Debug, PartialEq)]
pub struct InfoPanel {
  pub anchor: Option<ScreenPosition>,
  pub lines: Vec<String>,
}

impl InfoPanel {
  pub fn new(info: &BodyInfo, anchor: Option<ScreenPosition>) -> Self {
    Self {
      anchor,
      lines: info_lines(info),
    }
  }

  pub fn title(&self) -> &str {
    self.lines.first().map(String::as_str).unwrap_or_default()
  }
}

pub fn info_lines(info: &BodyInfo) -> Vec<String> {
  vec![
    info.name.to_owned(),
    format!("DISTANCE: {:.2} AU", info.distance_au),
    format!("TEMP: {:.0} C", info.temperature_c),
    format!("TYPE: {}", info.classification),
    format!("MASS: {} EARTH", info.earth_masses),
    format!("DIAMETER: {:.0} KM", info.diameter_km),
    format!("MOONS: {}", info.moons),
  ]
}

/// Frames-per-second averaged over half-second windows.
#[derive(Debug, Default)]
pub struct FrameTimer {
  frames: u32,
  elapsed: f32,
  fps: f32,
}

impl FrameTimer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Counts one frame. Returns the new rate whenever a window closes.
  pub fn tick(&mut self, delta_time: f32) -> Option<f32> {
    self.frames += 1;
    self.elapsed += delta_time;
    if self.elapsed < FPS_REFRESH_SECONDS {
      return None;
    }
    self.fps = self.frames as f32 / self.elapsed;
    self.frames = 0;
    self.elapsed = 0.0;
    Some(self.fps)
  }

  pub fn fps(&self) -> f32 {
    self.fps
  }
}

/// Title bar text: the selected body, if any, and the frame rate.
pub fn window_title(base: &str, selected: Option<&str>, fps: f32) -> String {
  match selected {
    Some(name) => format!("{base} | {name} | {fps:.0} FPS"),
    None => format!("{base} | {fps:.0} FPS"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::camera::Camera;
  use crate::catalog::BodyKind;
  use crate::CameraParams;
  use approx::assert_relative_eq;
  use cgmath::Point3;

  fn looking_down_minus_z() -> (Matrix4<f32>, Matrix4<f32>) {
    let camera = Camera::new(Point3::new(0.0, 0.0, 0.0), -90.0, 0.0, &CameraParams::default());
    (camera.view_matrix(), camera.projection_matrix(2.0))
  }

  #[test]
  fn point_ahead_lands_in_the_centre() {
    let (view, projection) = looking_down_minus_z();
    let screen = world_to_screen(Vector3::new(0.0, 0.0, -10.0), view, projection, 800, 400).unwrap();
    assert_relative_eq!(screen.x, 400.0, epsilon = 1e-2);
    assert_relative_eq!(screen.y, 200.0, epsilon = 1e-2);
  }

  #[test]
  fn up_is_towards_the_top_of_the_screen() {
    let (view, projection) = looking_down_minus_z();
    let screen = world_to_screen(Vector3::new(0.0, 1.0, -10.0), view, projection, 800, 400).unwrap();
    assert!(screen.y < 200.0);
  }

  #[test]
  fn behind_or_outside_is_not_projected() {
    let (view, projection) = looking_down_minus_z();
    assert_eq!(world_to_screen(Vector3::new(0.0, 0.0, 10.0), view, projection, 800, 400), None);
    assert_eq!(world_to_screen(Vector3::new(500.0, 0.0, -1.0), view, projection, 800, 400), None);
  }

  #[test]
  fn panel_lists_the_body_facts() {
    let panel = InfoPanel::new(&BodyKind::Saturn.info(), None);
    assert_eq!(panel.title(), "SATURN");
    assert_eq!(panel.lines.len(), 7);
    assert!(panel.lines.contains(&"MOONS: 82".to_owned()));
    assert!(panel.lines.contains(&"TYPE: GAS GIANT".to_owned()));
  }

  #[test]
  fn fps_refreshes_every_half_second() {
    let mut timer = FrameTimer::new();
    for _ in 0..3 {
      assert_eq!(timer.tick(0.125), None);
    }
    let fps = timer.tick(0.125).unwrap();
    assert_relative_eq!(fps, 8.0, epsilon = 1e-3);
    assert_relative_eq!(timer.fps(), 8.0, epsilon = 1e-3);
    assert_eq!(timer.tick(0.125), None);
  }

  #[test]
  fn title_includes_selection_when_present() {
    assert_eq!(window_title("Sim", Some("Mars"), 59.6), "Sim | Mars | 60 FPS");
    assert_eq!(window_title("Sim", None, 30.0), "Sim | 30 FPS");
  }
}
