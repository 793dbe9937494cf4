use cgmath::{Deg, InnerSpace, Matrix4, Point3, Vector3};
use winit::{
  event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
  keyboard::{KeyCode, PhysicalKey},
};

use crate::CameraParams;

pub const Z_NEAR: f32 = 0.1;
/// Large enough to contain the outermost orbit.
pub const Z_FAR: f32 = 10000.0;

const MAX_PITCH: f32 = 89.0;
const MIN_ZOOM: f32 = 1.0;
const MAX_ZOOM: f32 = 45.0;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.5,
    0.0, 0.0, 0.0, 1.0,
);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Movement {
  Forward,
  Backward,
  Left,
  Right,
  Up,
  Down,
}

/// Free-flying yaw/pitch camera. Angles are in degrees.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
  pub position: Point3<f32>,
  pub world_up: Vector3<f32>,
  pub yaw: f32,
  pub pitch: f32,
  /// Vertical field of view.
  pub zoom: f32,
  pub movement_speed: f32,
  pub sensitivity: f32,
  front: Vector3<f32>,
  right: Vector3<f32>,
  up: Vector3<f32>,
}

impl Camera {
  pub fn new(position: Point3<f32>, yaw: f32, pitch: f32, params: &CameraParams) -> Self {
    let mut camera = Self {
      position,
      world_up: Vector3::unit_y(),
      yaw,
      pitch,
      zoom: params.zoom.clamp(MIN_ZOOM, MAX_ZOOM),
      movement_speed: params.speed,
      sensitivity: params.sensitivity,
      front: -Vector3::unit_z(),
      right: Vector3::unit_x(),
      up: Vector3::unit_y(),
    };
    camera.update_vectors();
    camera
  }

  /// Unit forward vector.
  pub fn front(&self) -> Vector3<f32> {
    self.front
  }

  pub fn right(&self) -> Vector3<f32> {
    self.right
  }

  pub fn up(&self) -> Vector3<f32> {
    self.up
  }

  /// Direction of the screen-centre ray used for picking.
  pub fn ray_direction(&self) -> Vector3<f32> {
    self.front
  }

  pub fn view_matrix(&self) -> Matrix4<f32> {
    Matrix4::look_at_rh(self.position, self.position + self.front, self.up)
  }

  pub fn projection_matrix(&self, aspect: f32) -> Matrix4<f32> {
    cgmath::perspective(Deg(self.zoom), aspect, Z_NEAR, Z_FAR)
  }

  pub fn process_movement(&mut self, direction: Movement, delta_time: f32, multiplier: f32) {
    let velocity = self.movement_speed * delta_time * multiplier;
    match direction {
      Movement::Forward => self.position += self.front * velocity,
      Movement::Backward => self.position -= self.front * velocity,
      Movement::Left => self.position -= self.right * velocity,
      Movement::Right => self.position += self.right * velocity,
      Movement::Up => self.position += self.world_up * velocity,
      Movement::Down => self.position -= self.world_up * velocity,
    }
  }

  /// `dy` is positive when the pointer moves up.
  pub fn process_pointer_movement(&mut self, dx: f32, dy: f32) {
    self.yaw += dx * self.sensitivity;
    self.pitch = (self.pitch + dy * self.sensitivity).clamp(-MAX_PITCH, MAX_PITCH);
    self.update_vectors();
  }

  pub fn process_scroll(&mut self, amount: f32) {
    self.zoom = (self.zoom - amount).clamp(MIN_ZOOM, MAX_ZOOM);
  }

  fn update_vectors(&mut self) {
    let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
    let front = Vector3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos());
    self.front = front.normalize();
    self.right = self.front.cross(self.world_up).normalize();
    self.up = self.right.cross(self.front).normalize();
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InputAction {
  Pick,
  ToggleFullscreen,
}

/// Turns window events into camera motion and discrete actions.
pub struct CameraController {
  fast_multiplier: f32,
  is_forward_pressed: bool,
  is_backward_pressed: bool,
  is_left_pressed: bool,
  is_right_pressed: bool,
  is_up_pressed: bool,
  is_down_pressed: bool,
  is_shift_pressed: bool,
  pointer_delta: (f32, f32),
  scroll: f32,
  actions: Vec<InputAction>,
}

impl CameraController {
  pub fn init(params: &CameraParams) -> Self {
    Self {
      fast_multiplier: params.fast_multiplier,
      is_forward_pressed: false,
      is_backward_pressed: false,
      is_left_pressed: false,
      is_right_pressed: false,
      is_up_pressed: false,
      is_down_pressed: false,
      is_shift_pressed: false,
      pointer_delta: (0.0, 0.0),
      scroll: 0.0,
      actions: Vec::new(),
    }
  }

  pub fn process_events(&mut self, event: &WindowEvent) -> bool {
    match event {
      WindowEvent::KeyboardInput {
        event:
          KeyEvent {
            state,
            physical_key: PhysicalKey::Code(keycode),
            repeat,
            ..
          },
        ..
      } => self.process_key(*keycode, *state == ElementState::Pressed, *repeat),
      WindowEvent::MouseInput {
        state: ElementState::Pressed,
        button: MouseButton::Left,
        ..
      } => {
        self.actions.push(InputAction::Pick);
        true
      }
      WindowEvent::MouseWheel { delta, .. } => {
        self.scroll += match delta {
          MouseScrollDelta::LineDelta(_, y) => *y,
          MouseScrollDelta::PixelDelta(position) => position.y as f32 / 20.0,
        };
        true
      }
      _ => false,
    }
  }

  /// Updates held-key state or queues an action. Returns whether the key is
  /// bound. Enter only toggles fullscreen while Shift is held.
  pub fn process_key(&mut self, key: KeyCode, pressed: bool, repeat: bool) -> bool {
    match key {
      KeyCode::KeyW | KeyCode::ArrowUp => {
        self.is_forward_pressed = pressed;
        true
      }
      KeyCode::KeyA | KeyCode::ArrowLeft => {
        self.is_left_pressed = pressed;
        true
      }
      KeyCode::KeyS | KeyCode::ArrowDown => {
        self.is_backward_pressed = pressed;
        true
      }
      KeyCode::KeyD | KeyCode::ArrowRight => {
        self.is_right_pressed = pressed;
        true
      }
      KeyCode::KeyE => {
        self.is_up_pressed = pressed;
        true
      }
      KeyCode::KeyQ => {
        self.is_down_pressed = pressed;
        true
      }
      KeyCode::ShiftLeft | KeyCode::ShiftRight => {
        self.is_shift_pressed = pressed;
        true
      }
      KeyCode::Space if pressed && !repeat => {
        self.actions.push(InputAction::Pick);
        true
      }
      KeyCode::Enter if pressed && !repeat && self.is_shift_pressed => {
        self.actions.push(InputAction::ToggleFullscreen);
        true
      }
      _ => false,
    }
  }

  /// Raw pointer motion in device units, `dy` positive downwards.
  pub fn process_mouse_motion(&mut self, dx: f64, dy: f64) {
    self.pointer_delta.0 += dx as f32;
    self.pointer_delta.1 += dy as f32;
  }

  pub fn take_actions(&mut self) -> Vec<InputAction> {
    std::mem::take(&mut self.actions)
  }

  pub fn update_camera(&mut self, camera: &mut Camera, delta_time: f32) {
    let multiplier = if self.is_shift_pressed {
      self.fast_multiplier
    } else {
      1.0
    };

    let held = [
      (self.is_forward_pressed, Movement::Forward),
      (self.is_backward_pressed, Movement::Backward),
      (self.is_left_pressed, Movement::Left),
      (self.is_right_pressed, Movement::Right),
      (self.is_up_pressed, Movement::Up),
      (self.is_down_pressed, Movement::Down),
    ];
    for (pressed, direction) in held {
      if pressed {
        camera.process_movement(direction, delta_time, multiplier);
      }
    }

    let (dx, dy) = std::mem::take(&mut self.pointer_delta);
    if dx != 0.0 || dy != 0.0 {
      camera.process_pointer_movement(dx, -dy);
    }
    let scroll = std::mem::take(&mut self.scroll);
    if scroll != 0.0 {
      camera.process_scroll(scroll);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  fn camera(position: Point3<f32>, yaw: f32, pitch: f32) -> Camera {
    Camera::new(position, yaw, pitch, &CameraParams::default())
  }

  #[test]
  fn yaw_zero_faces_positive_x() {
    let camera = camera(Point3::new(0.0, 0.0, 0.0), 0.0, 0.0);
    assert_relative_eq!(camera.front().x, 1.0, epsilon = 1e-6);
    assert_relative_eq!(camera.front().y, 0.0, epsilon = 1e-6);
    assert_relative_eq!(camera.front().z, 0.0, epsilon = 1e-6);
    assert_relative_eq!(camera.up().y, 1.0, epsilon = 1e-6);
  }

  #[test]
  fn basis_is_orthonormal() {
    let camera = camera(Point3::new(0.0, 5.0, 20.0), -90.0, -15.0);
    assert_relative_eq!(camera.front().magnitude(), 1.0, epsilon = 1e-6);
    assert_relative_eq!(camera.right().magnitude(), 1.0, epsilon = 1e-6);
    assert_relative_eq!(camera.up().magnitude(), 1.0, epsilon = 1e-6);
    assert_relative_eq!(camera.front().dot(camera.right()), 0.0, epsilon = 1e-6);
    assert_relative_eq!(camera.front().dot(camera.up()), 0.0, epsilon = 1e-6);
  }

  #[test]
  fn view_maps_the_target_onto_negative_z() {
    let camera = camera(Point3::new(0.0, 5.0, 20.0), -90.0, 0.0);
    let ahead = camera.position + camera.front() * 10.0;
    let in_view = camera.view_matrix() * ahead.to_homogeneous();
    assert_relative_eq!(in_view.x, 0.0, epsilon = 1e-4);
    assert_relative_eq!(in_view.y, 0.0, epsilon = 1e-4);
    assert_relative_eq!(in_view.z, -10.0, epsilon = 1e-4);
  }

  #[test]
  fn pitch_is_clamped() {
    let mut camera = camera(Point3::new(0.0, 0.0, 0.0), 0.0, 0.0);
    camera.process_pointer_movement(0.0, 10_000.0);
    assert_eq!(camera.pitch, MAX_PITCH);
    camera.process_pointer_movement(0.0, -100_000.0);
    assert_eq!(camera.pitch, -MAX_PITCH);
  }

  #[test]
  fn zoom_is_clamped() {
    let mut camera = camera(Point3::new(0.0, 0.0, 0.0), 0.0, 0.0);
    camera.process_scroll(100.0);
    assert_eq!(camera.zoom, MIN_ZOOM);
    camera.process_scroll(-100.0);
    assert_eq!(camera.zoom, MAX_ZOOM);
  }

  #[test]
  fn movement_scales_with_time_and_multiplier() {
    let mut camera = camera(Point3::new(0.0, 0.0, 0.0), 0.0, 0.0);
    camera.movement_speed = 2.0;
    camera.process_movement(Movement::Forward, 0.5, 3.0);
    assert_relative_eq!(camera.position.x, 3.0, epsilon = 1e-5);
    camera.process_movement(Movement::Up, 1.0, 1.0);
    assert_relative_eq!(camera.position.y, 2.0, epsilon = 1e-5);
  }

  #[test]
  fn controller_applies_pointer_motion_once() {
    let mut camera = camera(Point3::new(0.0, 0.0, 0.0), 0.0, 0.0);
    let mut controller = CameraController::init(&CameraParams::default());
    controller.process_mouse_motion(100.0, 0.0);
    controller.update_camera(&mut camera, 0.016);
    let yaw = camera.yaw;
    assert!(yaw > 0.0);
    controller.update_camera(&mut camera, 0.016);
    assert_eq!(camera.yaw, yaw);
    assert!(controller.take_actions().is_empty());
  }

  fn controller() -> (Camera, CameraController) {
    let params = CameraParams::default();
    let camera = Camera::new(Point3::new(0.0, 0.0, 0.0), 0.0, 0.0, &params);
    (camera, CameraController::init(&params))
  }

  #[test]
  fn held_keys_move_along_the_camera_basis() {
    let (mut camera, mut controller) = controller();
    let speed = camera.movement_speed;

    assert!(controller.process_key(KeyCode::KeyW, true, false));
    controller.update_camera(&mut camera, 1.0);
    assert_relative_eq!(camera.position.x, speed, epsilon = 1e-5);

    // Still held until released.
    controller.update_camera(&mut camera, 1.0);
    assert_relative_eq!(camera.position.x, 2.0 * speed, epsilon = 1e-5);

    assert!(controller.process_key(KeyCode::KeyW, false, false));
    assert!(controller.process_key(KeyCode::KeyS, true, false));
    controller.update_camera(&mut camera, 1.0);
    assert_relative_eq!(camera.position.x, speed, epsilon = 1e-5);
    controller.process_key(KeyCode::KeyS, false, false);

    assert!(controller.process_key(KeyCode::KeyD, true, false));
    controller.update_camera(&mut camera, 1.0);
    assert_relative_eq!(camera.position.z, speed, epsilon = 1e-5);
    controller.process_key(KeyCode::KeyD, false, false);

    assert!(controller.process_key(KeyCode::KeyA, true, false));
    controller.update_camera(&mut camera, 1.0);
    assert_relative_eq!(camera.position.z, 0.0, epsilon = 1e-5);
    controller.process_key(KeyCode::KeyA, false, false);
    assert!(controller.take_actions().is_empty());
  }

  #[test]
  fn e_and_q_move_along_world_up() {
    let (mut camera, mut controller) = controller();
    let speed = camera.movement_speed;

    assert!(controller.process_key(KeyCode::KeyE, true, false));
    controller.update_camera(&mut camera, 1.0);
    assert_relative_eq!(camera.position.y, speed, epsilon = 1e-5);
    controller.process_key(KeyCode::KeyE, false, false);

    assert!(controller.process_key(KeyCode::KeyQ, true, false));
    controller.update_camera(&mut camera, 0.5);
    assert_relative_eq!(camera.position.y, 0.5 * speed, epsilon = 1e-5);
  }

  #[test]
  fn shift_applies_the_fast_multiplier() {
    let (mut camera, mut controller) = controller();
    let expected = camera.movement_speed * CameraParams::default().fast_multiplier;

    assert!(controller.process_key(KeyCode::ShiftLeft, true, false));
    controller.process_key(KeyCode::ArrowUp, true, false);
    controller.update_camera(&mut camera, 1.0);
    assert_relative_eq!(camera.position.x, expected, epsilon = 1e-4);

    controller.process_key(KeyCode::ShiftLeft, false, false);
    controller.update_camera(&mut camera, 1.0);
    assert_relative_eq!(camera.position.x, expected + camera.movement_speed, epsilon = 1e-4);
  }

  #[test]
  fn space_queues_one_pick_per_press() {
    let (_, mut controller) = controller();
    assert!(controller.process_key(KeyCode::Space, true, false));
    assert!(!controller.process_key(KeyCode::Space, true, true));
    assert!(!controller.process_key(KeyCode::Space, false, false));
    assert_eq!(controller.take_actions(), vec![InputAction::Pick]);
    assert!(controller.take_actions().is_empty());
  }

  #[test]
  fn fullscreen_needs_shift_with_enter() {
    let (_, mut controller) = controller();
    assert!(!controller.process_key(KeyCode::Enter, true, false));
    assert!(controller.take_actions().is_empty());

    controller.process_key(KeyCode::ShiftRight, true, false);
    assert!(controller.process_key(KeyCode::Enter, true, false));
    assert!(!controller.process_key(KeyCode::Enter, true, true));
    assert_eq!(controller.take_actions(), vec![InputAction::ToggleFullscreen]);
  }

  #[test]
  fn unbound_keys_are_not_consumed() {
    let (mut camera, mut controller) = controller();
    let start = camera.clone();
    assert!(!controller.process_key(KeyCode::KeyZ, true, false));
    assert!(!controller.process_key(KeyCode::Escape, true, false));
    controller.update_camera(&mut camera, 1.0);
    assert_eq!(camera, start);
    assert!(controller.take_actions().is_empty());
  }
}
