//! Static scene: camera, lights, continent mesh and ocean sphere.

use std::f32::consts::PI;

use bevy::core_pipeline::tonemapping::Tonemapping;
use bevy::light::light_consts::lux;
use bevy::prelude::*;

use crate::camera::{OrbitCamera, START_POSITION};
use crate::frame::{GlobeSpin, advance_spin};
use crate::loader::scene_ready;

/// Uniform scale of the continent model.
const CONTINENT_SCALE: f32 = 20.0;
/// Radius of the ocean sphere.
pub const OCEAN_RADIUS: f32 = 10.0;

/// Plugin for the globe scene.
pub struct GlobeScenePlugin;

impl Plugin for GlobeScenePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_scene).add_systems(
            Update,
            spin_continent.after(advance_spin).run_if(scene_ready),
        );
    }
}

/// The continent mesh, turned by the shared globe spin.
#[derive(Component)]
pub struct Continent;

/// The translucent ocean sphere.
#[derive(Component)]
pub struct Ocean;

/// Continent orientation after `spin` radians about world Y.
///
/// The resting tilt lines the model's texture up with the marker
/// longitudes; the spin is the same one applied to the markers.
pub fn continent_rotation(spin: f32) -> Quat {
    Quat::from_rotation_y(spin) * Quat::from_euler(EulerRot::XYZ, -0.01 * PI, -1.389 * PI, 0.0)
}

/// Spawn the camera and lights.
fn setup_scene(mut commands: Commands) {
    let orbit = OrbitCamera::from_position(START_POSITION, Vec3::ZERO);

    commands.spawn((
        Camera3d::default(),
        orbit.transform(),
        Projection::Perspective(PerspectiveProjection {
            fov: 45.0_f32.to_radians(),
            near: 0.1,
            far: 1000.0,
            ..Default::default()
        }),
        Tonemapping::AcesFitted,
        orbit,
    ));

    // Key light from the camera's side, dim fill from behind.
    commands.spawn((
        DirectionalLight {
            illuminance: lux::AMBIENT_DAYLIGHT,
            ..default()
        },
        Transform::from_xyz(30.0, 40.0, 50.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
    commands.spawn((
        DirectionalLight {
            illuminance: lux::AMBIENT_DAYLIGHT * 0.2,
            ..default()
        },
        Transform::from_xyz(-30.0, -10.0, -50.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    tracing::info!("Scene setup complete - drag to orbit, scroll to zoom");
}

/// Spawn the continent (one child per primitive) and the ocean sphere.
pub fn spawn_globe(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    continent_primitives: &[Handle<Mesh>],
    surface: Handle<Image>,
    spin: f32,
) {
    let continent_material = materials.add(StandardMaterial {
        base_color_texture: Some(surface),
        perceptual_roughness: 0.6,
        specular_transmission: 0.4,
        ..default()
    });

    commands
        .spawn((
            Continent,
            Transform::from_scale(Vec3::splat(CONTINENT_SCALE))
                .with_rotation(continent_rotation(spin)),
            Visibility::default(),
        ))
        .with_children(|parent| {
            for mesh in continent_primitives {
                parent.spawn((
                    Mesh3d(mesh.clone()),
                    MeshMaterial3d(continent_material.clone()),
                ));
            }
        });

    commands.spawn((
        Ocean,
        Mesh3d(meshes.add(Sphere::new(OCEAN_RADIUS).mesh().uv(70, 70))),
        MeshMaterial3d(materials.add(ocean_material())),
    ));
}

fn ocean_material() -> StandardMaterial {
    StandardMaterial {
        base_color: Color::srgb_u8(0x00, 0x6b, 0x6d).with_alpha(0.1),
        alpha_mode: AlphaMode::Blend,
        perceptual_roughness: 0.0,
        ..default()
    }
}

#[allow(clippy::needless_pass_by_value)]
fn spin_continent(spin: Res<GlobeSpin>, mut query: Query<&mut Transform, With<Continent>>) {
    for mut transform in &mut query {
        transform.rotation = continent_rotation(spin.angle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continent_spins_about_world_y() {
        let point = Vec3::new(3.0, 4.0, 5.0);
        let rest = continent_rotation(0.0) * point;
        for spin in [0.1, 1.0, 2.5] {
            let spun = continent_rotation(spin) * point;
            assert!((spun - Quat::from_rotation_y(spin) * rest).length() < 1e-4);
            assert!((spun.y - rest.y).abs() < 1e-4);
        }
    }

    #[test]
    fn test_ocean_is_translucent() {
        let material = ocean_material();
        assert!((material.base_color.alpha() - 0.1).abs() < 1e-6);
        assert!(matches!(material.alpha_mode, AlphaMode::Blend));
    }

    #[test]
    fn test_spawn_globe() {
        let mut world = World::new();
        let mut meshes = Assets::<Mesh>::default();
        let mut materials = Assets::<StandardMaterial>::default();

        let mut commands = world.commands();
        spawn_globe(
            &mut commands,
            &mut meshes,
            &mut materials,
            &[Handle::default(), Handle::default()],
            Handle::default(),
            0.0,
        );
        world.flush();

        let mut continents = world.query_filtered::<&Children, With<Continent>>();
        let children = continents.single(&world).unwrap();
        assert_eq!(children.len(), 2);

        let mut oceans = world.query_filtered::<Entity, With<Ocean>>();
        assert_eq!(oceans.iter(&world).count(), 1);
        assert_eq!(meshes.len(), 1);
        assert_eq!(materials.len(), 2);
    }
}
