//! Image decoding for body, ring and skybox textures.
//!
//! A texture that cannot be read or decoded is replaced by a 1x1 texture of
//! a fallback colour: one bad asset path degrades one body, it does not stop
//! the scene.

use std::path::{Path, PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::gpu::{GpuError, GraphicsBackend, TextureId, TextureImage};

pub const FALLBACK_COLOR: [u8; 4] = [255, 0, 255, 255];

#[derive(Debug, Error)]
pub enum TextureError {
  #[error("failed to load `{path}`: {source}")]
  Image {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
  #[error("`{path}` has no pixels")]
  Empty { path: PathBuf },
  #[error("cubemap face `{path}` is {got:?}, expected {expected:?}")]
  FaceSize {
    path: PathBuf,
    got: (u32, u32),
    expected: (u32, u32),
  },
}

pub fn load_image(path: &Path) -> Result<TextureImage, TextureError> {
  let decoded = image::open(path).map_err(|source| TextureError::Image {
    path: path.to_owned(),
    source,
  })?;
  let rgba = decoded.to_rgba8();
  let (width, height) = rgba.dimensions();
  if width == 0 || height == 0 {
    return Err(TextureError::Empty {
      path: path.to_owned(),
    });
  }
  Ok(TextureImage {
    width,
    height,
    pixels: rgba.into_raw(),
  })
}

pub fn load_image_or_fallback(path: &Path) -> TextureImage {
  match load_image(path) {
    Ok(image) => {
      info!(
        "Texture loaded: {} ({}x{})",
        path.display(),
        image.width,
        image.height
      );
      image
    }
    Err(err) => {
      warn!("{err} - using fallback color");
      TextureImage::solid(FALLBACK_COLOR)
    }
  }
}

/// Decodes every face; fails on the first unreadable or differently sized one.
pub fn load_cubemap_faces(paths: &[PathBuf]) -> Result<Vec<TextureImage>, TextureError> {
  let mut faces: Vec<TextureImage> = Vec::with_capacity(paths.len());
  for path in paths {
    let face = load_image(path)?;
    if let Some(first) = faces.first() {
      if (face.width, face.height) != (first.width, first.height) {
        return Err(TextureError::FaceSize {
          path: path.clone(),
          got: (face.width, face.height),
          expected: (first.width, first.height),
        });
      }
    }
    faces.push(face);
  }
  Ok(faces)
}

pub fn create_texture(backend: &mut dyn GraphicsBackend, path: &Path) -> Result<TextureId, GpuError> {
  let image = load_image_or_fallback(path);
  backend.create_texture(&path.display().to_string(), &image)
}

pub fn create_cubemap(backend: &mut dyn GraphicsBackend, paths: &[PathBuf]) -> Result<TextureId, GpuError> {
  for path in paths {
    info!("  cubemap face {}", path.display());
  }
  let faces = match load_cubemap_faces(paths) {
    Ok(faces) if faces.len() == 6 => faces,
    Ok(faces) => {
      warn!("cubemap has {} faces instead of 6 - using fallback color", faces.len());
      vec![TextureImage::solid(FALLBACK_COLOR); 6]
    }
    Err(err) => {
      warn!("{err} - using fallback color for the whole cubemap");
      vec![TextureImage::solid(FALLBACK_COLOR); 6]
    }
  };
  backend.create_cubemap("skybox", &faces)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::gpu::headless::HeadlessBackend;

  #[test]
  fn missing_file_is_an_error() {
    let err = load_image(Path::new("definitely/not/here.png")).unwrap_err();
    assert!(matches!(err, TextureError::Image { .. }));
  }

  #[test]
  fn missing_file_falls_back_to_one_pixel() {
    let image = load_image_or_fallback(Path::new("definitely/not/here.jpg"));
    assert_eq!((image.width, image.height), (1, 1));
    assert_eq!(image.pixels, FALLBACK_COLOR.to_vec());
  }

  #[test]
  fn roundtrip_through_a_png_on_disk() {
    let dir = std::env::temp_dir().join(format!("solar-system-texture-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("two_by_one.png");
    image::RgbaImage::from_raw(2, 1, vec![1, 2, 3, 255, 4, 5, 6, 255])
      .unwrap()
      .save(&path)
      .unwrap();

    let image = load_image(&path).unwrap();
    assert_eq!((image.width, image.height), (2, 1));
    assert_eq!(image.pixels, vec![1, 2, 3, 255, 4, 5, 6, 255]);
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn broken_cubemap_still_creates_a_texture() {
    let mut backend = HeadlessBackend::new();
    let paths: Vec<PathBuf> = (0..6).map(|i| PathBuf::from(format!("nope/face{i}.png"))).collect();
    create_cubemap(&mut backend, &paths).unwrap();
    assert_eq!(backend.live_textures(), 1);
  }
}
