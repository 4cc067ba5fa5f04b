//! Damped orbit camera around the globe.
//!
//! Left-drag rotates, the scroll wheel zooms. Rotation input is queued and
//! eased in over several frames; zoom applies immediately.

use std::f32::consts::FRAC_PI_2;

use bevy::ecs::message::MessageReader;
use bevy::input::mouse::{MouseMotion, MouseScrollUnit, MouseWheel};
use bevy::prelude::*;
use bevy_egui::input::egui_wants_any_pointer_input;

/// Where the camera starts, looking at the globe centre.
pub const START_POSITION: Vec3 = Vec3::new(0.0, 15.0, 50.0);

/// Plugin for the orbit camera controls.
pub struct OrbitCameraPlugin;

impl Plugin for OrbitCameraPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<OrbitSettings>().add_systems(
            Update,
            (
                orbit_input.run_if(not(egui_wants_any_pointer_input)),
                apply_orbit,
            )
                .chain()
                .in_set(OrbitControls),
        );
    }
}

/// Systems that move the camera. Anything reading the camera distance runs
/// after this set.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrbitControls;

/// Settings for orbit movement.
#[derive(Resource, Debug, Clone)]
pub struct OrbitSettings {
    /// Fraction of the queued rotation applied each frame.
    pub damping: f32,
    /// Radians of rotation per pixel of drag.
    pub rotate_speed: f32,
    /// Distance multiplier per scroll line.
    pub zoom_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Largest pitch magnitude, short of the poles.
    pub max_pitch: f32,
}

impl Default for OrbitSettings {
    fn default() -> Self {
        Self {
            damping: 0.05,
            rotate_speed: 0.005,
            zoom_speed: 0.95,
            min_distance: 10.0,
            max_distance: 52.3,
            max_pitch: FRAC_PI_2 - 0.01,
        }
    }
}

/// Orbit state of the camera entity.
///
/// `yaw` is measured about world Y from +Z, `pitch` up from the XZ plane.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    pub target: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub distance: f32,
    pending_yaw: f32,
    pending_pitch: f32,
}

impl OrbitCamera {
    /// Orbit state that places the camera at `position`.
    pub fn from_position(position: Vec3, target: Vec3) -> Self {
        let offset = position - target;
        let distance = offset.length();
        let (yaw, pitch) = if distance > 0.0 {
            (
                offset.x.atan2(offset.z),
                (offset.y / distance).clamp(-1.0, 1.0).asin(),
            )
        } else {
            (0.0, 0.0)
        };
        Self {
            target,
            yaw,
            pitch,
            distance,
            pending_yaw: 0.0,
            pending_pitch: 0.0,
        }
    }

    pub fn position(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        self.target
            + self.distance * Vec3::new(cos_pitch * sin_yaw, sin_pitch, cos_pitch * cos_yaw)
    }

    /// Queue a rotation; it is applied gradually by [`Self::step`].
    pub fn rotate(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.pending_yaw += delta_yaw;
        self.pending_pitch += delta_pitch;
    }

    /// Zoom by `scroll` lines; positive values move closer.
    pub fn zoom(&mut self, scroll: f32, settings: &OrbitSettings) {
        self.distance = (self.distance * settings.zoom_speed.powf(scroll))
            .clamp(settings.min_distance, settings.max_distance);
    }

    /// Apply one frame of the queued rotation.
    pub fn step(&mut self, settings: &OrbitSettings) {
        let yaw = self.pending_yaw * settings.damping;
        let pitch = self.pending_pitch * settings.damping;
        self.yaw += yaw;
        self.pitch = (self.pitch + pitch).clamp(-settings.max_pitch, settings.max_pitch);
        self.pending_yaw -= yaw;
        self.pending_pitch -= pitch;
    }

    pub fn transform(&self) -> Transform {
        Transform::from_translation(self.position()).looking_at(self.target, Vec3::Y)
    }
}

/// Queue drag rotation and apply wheel zoom.
#[allow(clippy::needless_pass_by_value)]
fn orbit_input(
    mouse: Res<ButtonInput<MouseButton>>,
    mut mouse_motion: MessageReader<MouseMotion>,
    mut scroll_events: MessageReader<MouseWheel>,
    settings: Res<OrbitSettings>,
    mut camera: Single<&mut OrbitCamera>,
) {
    let mut delta = Vec2::ZERO;
    for event in mouse_motion.read() {
        delta += event.delta;
    }
    if mouse.pressed(MouseButton::Left) && delta != Vec2::ZERO {
        camera.rotate(
            -delta.x * settings.rotate_speed,
            delta.y * settings.rotate_speed,
        );
    }

    for event in scroll_events.read() {
        // Normalize scroll value: web reports pixels, native reports lines.
        let scroll = match event.unit {
            MouseScrollUnit::Line => event.y,
            MouseScrollUnit::Pixel => event.y / 120.0,
        };
        if scroll != 0.0 {
            camera.zoom(scroll, &settings);
        }
    }
}

/// Ease the orbit and write the camera transform.
#[allow(clippy::needless_pass_by_value)]
fn apply_orbit(
    settings: Res<OrbitSettings>,
    mut query: Query<(&mut OrbitCamera, &mut Transform)>,
) {
    for (mut orbit, mut transform) in &mut query {
        orbit.step(&settings);
        *transform = orbit.transform();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_position_round_trips() {
        let orbit = OrbitCamera::from_position(START_POSITION, Vec3::ZERO);
        assert!((orbit.position() - START_POSITION).length() < 1e-4);
        assert!((orbit.distance - 52.201_533).abs() < 1e-3);
    }

    #[test]
    fn test_damping_converges_on_queued_rotation() {
        let settings = OrbitSettings::default();
        let mut orbit = OrbitCamera::from_position(Vec3::new(0.0, 0.0, 30.0), Vec3::ZERO);
        orbit.rotate(1.0, 0.0);

        orbit.step(&settings);
        assert!((orbit.yaw - 0.05).abs() < 1e-6);

        for _ in 0..300 {
            orbit.step(&settings);
        }
        assert!((orbit.yaw - 1.0).abs() < 1e-4);
        assert!((orbit.position().length() - 30.0).abs() < 1e-3);
    }

    #[test]
    fn test_pitch_stops_short_of_the_poles() {
        let settings = OrbitSettings::default();
        let mut orbit = OrbitCamera::from_position(Vec3::new(0.0, 0.0, 30.0), Vec3::ZERO);
        orbit.rotate(0.0, 10.0);
        for _ in 0..500 {
            orbit.step(&settings);
        }
        assert!((orbit.pitch - settings.max_pitch).abs() < 1e-6);
        assert!(orbit.transform().translation.is_finite());
    }

    #[test]
    fn test_zoom_clamps_distance() {
        let settings = OrbitSettings::default();
        let mut orbit = OrbitCamera::from_position(START_POSITION, Vec3::ZERO);

        orbit.zoom(1.0, &settings);
        assert!((orbit.distance - 52.201_533 * 0.95).abs() < 1e-3);

        orbit.zoom(200.0, &settings);
        assert!((orbit.distance - settings.min_distance).abs() < 1e-6);

        orbit.zoom(-200.0, &settings);
        assert!((orbit.distance - settings.max_distance).abs() < 1e-6);
    }

    #[test]
    fn test_transform_looks_at_target() {
        let orbit = OrbitCamera::from_position(START_POSITION, Vec3::ZERO);
        let transform = orbit.transform();
        let forward = transform.forward();
        let to_target = (Vec3::ZERO - transform.translation).normalize();
        assert!(forward.dot(to_target) > 0.9999);
    }
}
