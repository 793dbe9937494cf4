use std::path::PathBuf;

use cgmath::Point3;

pub mod body;
pub mod camera;
pub mod catalog;
pub mod gpu;
pub mod mesh;
pub mod overlay;
pub mod picking;
pub mod ring;
pub mod scene;
pub mod skybox;
pub mod state;
pub mod texture;

/// Skybox face files, ordered +X, -X, +Y, -Y, +Z, -Z.
pub const SKYBOX_FACES: [&str; 6] = [
  "right.jpg",
  "left.jpg",
  "top.jpg",
  "bottom.jpg",
  "front.jpg",
  "back.jpg",
];

#[derive(Clone, Debug)]
pub struct AppConfig {
  pub title: String,
  pub width: u32,
  pub height: u32,
  /// Simulated seconds per real second.
  pub time_scale: f32,
  pub units_per_au: f32,
  pub asset_dir: PathBuf,
  pub skybox_faces: [&'static str; 6],
  pub headless: bool,
  /// Frames to run in headless mode.
  pub frames: u64,
  /// Real seconds per headless frame.
  pub fixed_step: f32,
  /// Headless runs pick once every this many frames.
  pub pick_interval: u64,
  pub camera: CameraParams,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      title: "Solar System Simulation".to_owned(),
      width: 1920,
      height: 1080,
      time_scale: 1.5,
      units_per_au: 20.0,
      asset_dir: PathBuf::from("assets"),
      skybox_faces: SKYBOX_FACES,
      headless: false,
      frames: 600,
      fixed_step: 1.0 / 60.0,
      pick_interval: 60,
      camera: CameraParams::default(),
    }
  }
}

impl AppConfig {
  pub fn skybox_face_paths(&self) -> Vec<PathBuf> {
    let dir = self.asset_dir.join("skybox");
    self.skybox_faces.iter().map(|face| dir.join(face)).collect()
  }

  pub fn ring_texture_path(&self) -> PathBuf {
    self.asset_dir.join("textures").join("saturn_ring.png")
  }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CameraParams {
  pub speed: f32,
  pub sensitivity: f32,
  /// Field of view in degrees.
  pub zoom: f32,
  /// Applied to `speed` while Shift is held.
  pub fast_multiplier: f32,
  pub position: Point3<f32>,
  pub yaw: f32,
  pub pitch: f32,
}

impl Default for CameraParams {
  fn default() -> Self {
    Self {
      speed: 2.5,
      sensitivity: 0.1,
      zoom: 45.0,
      fast_multiplier: 5.0,
      position: Point3::new(0.0, 5.0, 20.0),
      yaw: -90.0,
      pitch: -15.0,
    }
  }
}
