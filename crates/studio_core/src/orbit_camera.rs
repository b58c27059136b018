//! Orbit camera for looking at the simulation.
//!
//! - Left mouse drag: rotate around the target
//! - Scroll wheel: zoom
//! - W/S, A/D: move the target forward/back and sideways (camera-relative, on
//!   the ground plane)
//! - Q/E: move the target up/down
//!
//! The camera system must run before the physics step so the frame's input is
//! applied before the world advances; the physics plugin orders itself after
//! [`orbit_camera_system`].

use bevy::input::mouse::{AccumulatedMouseMotion, AccumulatedMouseScroll};
use bevy::prelude::*;

/// Orbit camera state.
#[derive(Component, Debug, Clone)]
pub struct OrbitCamera {
    /// Point the camera orbits around
    pub target: Vec3,
    /// Distance from target
    pub distance: f32,
    /// Horizontal angle (radians)
    pub azimuth: f32,
    /// Vertical angle (radians)
    pub elevation: f32,
    /// Radians per pixel of mouse drag
    pub sensitivity: f32,
    /// Distance per scroll line
    pub zoom_sensitivity: f32,
    /// Target pan speed in units per second
    pub pan_speed: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 10.0,
            azimuth: 0.0,
            elevation: 0.5,
            sensitivity: 0.002,
            zoom_sensitivity: 1.0,
            pan_speed: 6.0,
        }
    }
}

impl OrbitCamera {
    pub fn new(distance: f32) -> Self {
        Self {
            distance,
            ..default()
        }
    }

    pub fn with_target(mut self, target: Vec3) -> Self {
        self.target = target;
        self
    }

    /// Camera position for the current orbit parameters.
    pub fn calculate_position(&self) -> Vec3 {
        self.target + orbit_offset(self.distance, self.azimuth, self.elevation)
    }

    /// Horizontal forward direction (from camera towards target, y = 0).
    pub fn ground_forward(&self) -> Vec3 {
        let offset = orbit_offset(1.0, self.azimuth, 0.0);
        -offset.normalize_or_zero()
    }
}

/// Offset from the target to the camera.
pub fn orbit_offset(distance: f32, azimuth: f32, elevation: f32) -> Vec3 {
    Vec3::new(
        distance * elevation.cos() * azimuth.sin(),
        distance * elevation.sin(),
        distance * elevation.cos() * azimuth.cos(),
    )
}

/// Key-driven pan direction in camera-relative ground space.
fn pan_input(keys: &ButtonInput<KeyCode>) -> Vec3 {
    let axis = |pos: KeyCode, neg: KeyCode| -> f32 {
        (keys.pressed(pos) as i32 - keys.pressed(neg) as i32) as f32
    };
    Vec3::new(
        axis(KeyCode::KeyD, KeyCode::KeyA),
        axis(KeyCode::KeyQ, KeyCode::KeyE),
        axis(KeyCode::KeyW, KeyCode::KeyS),
    )
}

/// Applies mouse and keyboard input to every orbit camera.
pub fn orbit_camera_system(
    time: Res<Time>,
    keys: Res<ButtonInput<KeyCode>>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    mouse_motion: Res<AccumulatedMouseMotion>,
    mouse_scroll: Res<AccumulatedMouseScroll>,
    mut query: Query<(&mut OrbitCamera, &mut Transform)>,
) {
    let pan = pan_input(&keys);

    for (mut orbit, mut transform) in query.iter_mut() {
        if mouse_button.pressed(MouseButton::Left) {
            let delta = mouse_motion.delta;
            orbit.azimuth -= delta.x * orbit.sensitivity;
            orbit.elevation += delta.y * orbit.sensitivity;
            orbit.elevation = orbit.elevation.clamp(-1.4, 1.4);
        }

        let scroll = mouse_scroll.delta.y;
        if scroll != 0.0 {
            orbit.distance -= scroll * orbit.zoom_sensitivity;
            orbit.distance = orbit.distance.clamp(0.5, 200.0);
        }

        if pan != Vec3::ZERO {
            let forward = orbit.ground_forward();
            let right = forward.cross(Vec3::Y);
            let step = orbit.pan_speed * time.delta_secs();
            orbit.target += (right * pan.x + Vec3::Y * pan.y + forward * pan.z) * step;
        }

        transform.translation = orbit.calculate_position();
        transform.look_at(orbit.target, Vec3::Y);
    }
}

/// Adds [`orbit_camera_system`] to `Update`.
pub struct OrbitCameraPlugin;

impl Plugin for OrbitCameraPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, orbit_camera_system);
    }
}

/// Bundle for spawning an orbit camera.
#[derive(Bundle, Default)]
pub struct OrbitCameraBundle {
    pub camera: Camera3d,
    pub orbit: OrbitCamera,
    pub transform: Transform,
}

impl OrbitCameraBundle {
    pub fn new(distance: f32, target: Vec3) -> Self {
        let orbit = OrbitCamera::new(distance).with_target(target);
        let position = orbit.calculate_position();
        Self {
            camera: Camera3d::default(),
            orbit,
            transform: Transform::from_translation(position).looking_at(target, Vec3::Y),
        }
    }
}
