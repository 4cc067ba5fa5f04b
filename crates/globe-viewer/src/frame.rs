//! Per-frame marker animation.
//!
//! Every frame the orbit distance is classified into a tier, the cross-fade
//! is advanced, and every marker of every tier gets a fresh transform,
//! bounding box, visibility and opacity. Markers that are all but
//! transparent keep an empty box so they cannot be hovered. Finally the shared globe spin is
//! advanced so the continent and the markers turn together.

use bevy::prelude::*;

use crate::bounds::BoundingBox;
use crate::camera::{OrbitCamera, OrbitControls};
use crate::loader::scene_ready;
use crate::marker::{MarkerBounds, MarkerMaterials, MarkerTemplate, UfoMarker};
use crate::tiers::TierTable;
use crate::transition::{Fade, ZoomTransition};
use crate::zoom::{Tier, ZoomClassifier};

/// Plugin for marker animation.
pub struct MarkerAnimationPlugin;

impl Plugin for MarkerAnimationPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<MarkerSettings>()
            .init_resource::<GlobeSpin>()
            .init_resource::<MarkerFrameStats>()
            .add_systems(
                Update,
                (update_markers, advance_spin)
                    .chain()
                    .after(OrbitControls)
                    .run_if(scene_ready),
            );
    }
}

/// Tuning for marker size and globe spin.
#[derive(Resource, Debug, Clone)]
pub struct MarkerSettings {
    /// Tier value at which markers shrink to nothing.
    pub reference_tier: f32,
    /// Size per tier below the reference.
    pub size_factor: f32,
    /// Scale per unit of camera distance, so markers keep their on-screen size.
    pub distance_scale: f32,
    /// Globe spin in radians per second.
    pub angular_rate: f32,
    /// Markers fainter than this get an empty box and cannot be hovered.
    pub min_hit_opacity: f32,
}

impl Default for MarkerSettings {
    fn default() -> Self {
        Self {
            reference_tier: 18.0,
            size_factor: 0.6,
            distance_scale: 0.1 / 50.0,
            angular_rate: 0.03,
            min_hit_opacity: 0.05,
        }
    }
}

impl MarkerSettings {
    /// Uniform scale of a visible marker of `tier` seen from `distance`.
    pub fn marker_scale(&self, tier: Tier, distance: f32) -> f32 {
        (self.reference_tier - f32::from(tier)) * self.size_factor * distance * self.distance_scale
    }
}

/// Accumulated rotation of the globe about world Y, in radians.
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct GlobeSpin {
    pub angle: f32,
}

/// What the last frame showed, for the debug overlay.
#[derive(Resource, Debug, Default, Clone)]
pub struct MarkerFrameStats {
    pub distance: f32,
    pub classified: Tier,
    pub fade: Option<Fade>,
    /// Markers in the current tier.
    pub current_markers: usize,
    /// Markers in the previous tier while it fades out.
    pub previous_markers: usize,
}

/// Classify the camera distance, advance the fade and pose every marker.
#[allow(clippy::needless_pass_by_value, clippy::too_many_arguments)]
pub fn update_markers(
    time: Res<Time>,
    settings: Res<MarkerSettings>,
    classifier: Res<ZoomClassifier>,
    mut transition: ResMut<ZoomTransition>,
    table: Res<TierTable>,
    template: Res<MarkerTemplate>,
    spin: Res<GlobeSpin>,
    camera: Single<&OrbitCamera>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut stats: ResMut<MarkerFrameStats>,
    mut markers: Query<(
        &UfoMarker,
        &MarkerMaterials,
        &mut Transform,
        &mut MarkerBounds,
        &mut Visibility,
    )>,
) {
    let distance = camera.position().distance(camera.target);
    let classified = classifier.classify(distance);
    let fade = transition.advance(classified, time.elapsed_secs_f64());

    stats.distance = distance;
    stats.classified = classified;
    stats.fade = Some(fade);
    stats.current_markers = table.markers(fade.current).len();
    stats.previous_markers = fade.previous.map_or(0, |tier| table.markers(tier).len());

    for (tier, entities) in table.iter() {
        let opacity = fade.opacity(tier);
        let scale = opacity.map_or(0.0, |_| settings.marker_scale(tier, distance));
        let hittable = opacity.is_some_and(|opacity| opacity >= settings.min_hit_opacity);

        for &entity in entities {
            let Ok((marker, marker_materials, mut transform, mut bounds, mut visibility)) =
                markers.get_mut(entity)
            else {
                continue;
            };

            *transform = marker.pose(scale, spin.angle);
            bounds.0 = if hittable {
                template.world_bounds(&transform)
            } else {
                BoundingBox::EMPTY
            };

            match opacity {
                Some(opacity) => {
                    visibility.set_if_neq(Visibility::Visible);
                    marker_materials.set_opacity(&mut materials, opacity);
                }
                None => {
                    visibility.set_if_neq(Visibility::Hidden);
                }
            }
        }
    }
}

/// Turn the globe by this frame's share of the angular rate.
#[allow(clippy::needless_pass_by_value)]
pub fn advance_spin(time: Res<Time>, settings: Res<MarkerSettings>, mut spin: ResMut<GlobeSpin>) {
    spin.angle += time.delta_secs() * settings.angular_rate;
}
