//! Static description of the solar system.
//!
//! [`solar_system`] is the only seed for scene construction. The per-kind
//! lookups below are presentation tables: the visual scale in particular is
//! deliberately unrelated to the physical radius stored in each row.

use std::fmt;
use std::path::{Path, PathBuf};

use cgmath::{Vector3, Zero};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BodyKind {
  Sun,
  Mercury,
  Venus,
  Earth,
  Mars,
  Jupiter,
  Saturn,
  Uranus,
  Neptune,
}

impl BodyKind {
  pub const ALL: [BodyKind; 9] = [
    BodyKind::Sun,
    BodyKind::Mercury,
    BodyKind::Venus,
    BodyKind::Earth,
    BodyKind::Mars,
    BodyKind::Jupiter,
    BodyKind::Saturn,
    BodyKind::Uranus,
    BodyKind::Neptune,
  ];

  pub fn name(self) -> &'static str {
    match self {
      BodyKind::Sun => "Sun",
      BodyKind::Mercury => "Mercury",
      BodyKind::Venus => "Venus",
      BodyKind::Earth => "Earth",
      BodyKind::Mars => "Mars",
      BodyKind::Jupiter => "Jupiter",
      BodyKind::Saturn => "Saturn",
      BodyKind::Uranus => "Uranus",
      BodyKind::Neptune => "Neptune",
    }
  }

  /// The star everything orbits; it never moves.
  pub fn is_reference(self) -> bool {
    self == BodyKind::Sun
  }

  /// Self-rotation speed in degrees per second. Negative means retrograde.
  pub fn rotation_speed(self) -> f32 {
    match self {
      BodyKind::Sun => 2.0,
      BodyKind::Mercury => 10.0,
      BodyKind::Venus => -5.0,
      BodyKind::Earth => 15.0,
      BodyKind::Mars => 14.0,
      BodyKind::Jupiter => 45.0,
      BodyKind::Saturn => 38.0,
      BodyKind::Uranus => -20.0,
      BodyKind::Neptune => 25.0,
    }
  }

  /// Axis of self-rotation (not normalized).
  pub fn rotation_axis(self) -> Vector3<f32> {
    match self {
      BodyKind::Uranus => Vector3::new(0.8, 0.2, 0.1),
      _ => Vector3::new(0.0, 1.0, 0.1),
    }
  }

  /// Uniform render scale of the unit sphere, also used as the pick radius.
  pub fn visual_scale(self) -> f32 {
    match self {
      BodyKind::Sun => 3.0,
      BodyKind::Mercury => 0.4,
      BodyKind::Venus => 0.9,
      BodyKind::Earth => 1.0,
      BodyKind::Mars => 0.5,
      BodyKind::Jupiter => 2.5,
      BodyKind::Saturn => 2.2,
      BodyKind::Uranus => 1.8,
      BodyKind::Neptune => 1.7,
    }
  }

  pub fn info(self) -> BodyInfo {
    let (name, distance_au, temperature_c, classification, earth_masses, diameter_km, moons) =
      match self {
        BodyKind::Sun => ("SUN", 0.0, 5505.0, "STAR", 333000.0, 1392700.0, 0),
        BodyKind::Mercury => ("MERCURY", 0.39, 167.0, "TERRESTRIAL", 0.055, 4879.0, 0),
        BodyKind::Venus => ("VENUS", 0.72, 464.0, "TERRESTRIAL", 0.815, 12104.0, 0),
        BodyKind::Earth => ("EARTH", 1.0, 15.0, "TERRESTRIAL", 1.0, 12742.0, 1),
        BodyKind::Mars => ("MARS", 1.52, -65.0, "TERRESTRIAL", 0.107, 6779.0, 2),
        BodyKind::Jupiter => ("JUPITER", 5.20, -110.0, "GAS GIANT", 317.8, 139820.0, 79),
        BodyKind::Saturn => ("SATURN", 9.58, -140.0, "GAS GIANT", 95.2, 116460.0, 82),
        BodyKind::Uranus => ("URANUS", 19.22, -195.0, "ICE GIANT", 14.5, 50724.0, 27),
        BodyKind::Neptune => ("NEPTUNE", 30.05, -200.0, "ICE GIANT", 17.1, 49244.0, 14),
      };
    BodyInfo {
      name,
      distance_au,
      temperature_c,
      classification,
      earth_masses,
      diameter_km,
      moons,
    }
  }
}

impl fmt::Display for BodyKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Facts shown in the info panel for a selected body.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BodyInfo {
  pub name: &'static str,
  pub distance_au: f32,
  pub temperature_c: f32,
  pub classification: &'static str,
  pub earth_masses: f32,
  pub diameter_km: f32,
  pub moons: u32,
}

/// One row of the configuration table.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyConfig {
  pub kind: BodyKind,
  /// kg
  pub mass: f32,
  /// m
  pub radius: f32,
  /// Scene units.
  pub semi_major_axis: f32,
  pub eccentricity: f32,
  /// Seconds of simulated time per revolution.
  pub orbital_period: f32,
  /// Radians.
  pub initial_angle: f32,
  pub position: Vector3<f32>,
  pub velocity: Vector3<f32>,
  pub texture: PathBuf,
  pub has_ring: bool,
}

/// (kind, mass, radius, distance in AU, eccentricity, period, texture file)
const ROWS: [(BodyKind, f32, f32, f32, f32, f32, &str); 9] = [
  (BodyKind::Sun, 1.989e30, 696_340_000.0, 0.0, 0.0, 0.0, "sun.jpg"),
  (BodyKind::Mercury, 3.285e23, 2_439_700.0, 0.387, 0.206, 7.6, "mercury.jpg"),
  (BodyKind::Venus, 4.867e24, 6_051_800.0, 0.723, 0.007, 19.4, "venus.jpg"),
  (BodyKind::Earth, 5.972e24, 6_371_000.0, 1.0, 0.017, 31.5, "earth.jpg"),
  (BodyKind::Mars, 6.417e23, 3_389_500.0, 1.524, 0.094, 47.0, "mars.jpg"),
  (BodyKind::Jupiter, 1.898e27, 69_911_000.0, 5.203, 0.049, 120.0, "jupiter.jpg"),
  (BodyKind::Saturn, 5.683e26, 58_232_000.0, 9.537, 0.057, 180.0, "saturn.jpg"),
  (BodyKind::Uranus, 8.681e25, 25_362_000.0, 19.191, 0.046, 250.0, "uranus.jpg"),
  (BodyKind::Neptune, 1.024e26, 24_622_000.0, 30.07, 0.009, 350.0, "neptune.jpg"),
];

/// The configuration table, with orbital distances converted from AU to
/// scene units and texture paths resolved under `asset_dir`.
pub fn solar_system(units_per_au: f32, asset_dir: &Path) -> Vec<BodyConfig> {
  ROWS
    .iter()
    .map(
      |&(kind, mass, radius, distance_au, eccentricity, orbital_period, texture)| {
        let semi_major_axis = distance_au * units_per_au;
        BodyConfig {
          kind,
          mass,
          radius,
          semi_major_axis,
          eccentricity,
          orbital_period,
          initial_angle: 0.0,
          position: Vector3::new(semi_major_axis, 0.0, 0.0),
          velocity: Vector3::zero(),
          texture: asset_dir.join("textures").join(texture),
          has_ring: kind == BodyKind::Saturn,
        }
      },
    )
    .collect()
}
