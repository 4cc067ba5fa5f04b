//! UFO marker instances and the factory that spawns them.
//!
//! A marker is a parent entity whose transform is rewritten every frame, with
//! one child per template mesh primitive. The children keep the template's
//! resting scale and never move; each one owns a private material so hover
//! highlighting and fading never leak into other markers.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_3, PI};

use bevy::prelude::*;
use glam::Affine3A;
use rand::Rng;

use crate::bounds::BoundingBox;
use crate::zoom::Tier;

/// Extra longitude rotation applied to every marker so that the markers line
/// up with the continent mesh's texture seam.
pub const LONGITUDE_BIAS: f32 = 0.2;
/// Self-spin of a marker, as a multiple of its longitude offset.
pub const SPIN_FACTOR: f32 = -20.0;
/// Height of a marker above the globe centre, before jitter.
pub const BASE_VERTICAL_OFFSET: f32 = 10.3;
/// Upper bound of the random height jitter.
pub const VERTICAL_JITTER: f32 = 0.2;
/// Resting scale of the template mesh inside each marker.
pub const RESTING_SCALE: Vec3 = Vec3::new(5.0, 2.0, 5.0);

/// Rotation about the marker's local Z axis that tilts it from the north pole
/// down to `lat_deg`.
pub fn latitude_offset(lat_deg: f32) -> f32 {
    -lat_deg / 90.0 * FRAC_PI_2 + FRAC_PI_2
}

/// Rotation about the world Y axis that swings a marker to `lng_deg`.
pub fn longitude_offset(lng_deg: f32) -> f32 {
    lng_deg * PI / 180.0 + FRAC_PI_3 + LONGITUDE_BIAS
}

/// One clustered location, shown while its tier is active.
#[derive(Component, Debug, Clone)]
pub struct UfoMarker {
    pub tier: Tier,
    pub latitude_offset: f32,
    pub longitude_offset: f32,
    pub vertical_offset: f32,
    pub label: Option<String>,
}

impl UfoMarker {
    pub fn new(
        tier: Tier,
        lat_deg: f32,
        lng_deg: f32,
        vertical_offset: f32,
        label: Option<String>,
    ) -> Self {
        Self {
            tier,
            latitude_offset: latitude_offset(lat_deg),
            longitude_offset: longitude_offset(lng_deg),
            vertical_offset,
            label,
        }
    }

    /// Transform for this marker at uniform `scale`, with the globe rotated by
    /// `spin` radians.
    ///
    /// Order: tilt about local Z, swing about world Y, self-spin about local
    /// Y, then lift along local Y. The lift ignores scale.
    pub fn pose(&self, scale: f32, spin: f32) -> Transform {
        let mut transform = Transform::from_scale(Vec3::splat(scale));
        transform.rotate_local_z(self.latitude_offset);
        transform.rotate_y(self.longitude_offset + spin);
        transform.rotate_local_y(SPIN_FACTOR * self.longitude_offset);
        transform.translation += transform.up() * self.vertical_offset;
        transform
    }
}

/// World-space box around a marker, refreshed every frame.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct MarkerBounds(pub BoundingBox);

/// The private materials of a marker's primitives, and their base colour.
#[derive(Component, Debug, Clone)]
pub struct MarkerMaterials {
    pub handles: Vec<Handle<StandardMaterial>>,
    pub original: Color,
}

impl MarkerMaterials {
    /// Set the colour of every primitive, keeping each material's alpha.
    /// Materials that already have the colour are left untouched.
    pub fn set_color(&self, materials: &mut Assets<StandardMaterial>, color: Color) {
        for handle in &self.handles {
            let unchanged = materials
                .get(handle)
                .is_some_and(|m| m.base_color == color.with_alpha(m.base_color.alpha()));
            if unchanged {
                continue;
            }
            if let Some(material) = materials.get_mut(handle) {
                let alpha = material.base_color.alpha();
                material.base_color = color.with_alpha(alpha);
            }
        }
    }

    /// Put back the colour the marker was created with.
    pub fn reset_color(&self, materials: &mut Assets<StandardMaterial>) {
        self.set_color(materials, self.original);
    }

    /// Set the alpha of every primitive. Materials already at `opacity` are
    /// left untouched so they are not re-uploaded.
    pub fn set_opacity(&self, materials: &mut Assets<StandardMaterial>, opacity: f32) {
        for handle in &self.handles {
            let unchanged = materials
                .get(handle)
                .is_some_and(|m| (m.base_color.alpha() - opacity).abs() <= f32::EPSILON);
            if unchanged {
                continue;
            }
            if let Some(material) = materials.get_mut(handle) {
                material.base_color.set_alpha(opacity);
            }
        }
    }
}

/// The mesh every marker is cloned from.
#[derive(Resource, Debug, Clone)]
pub struct MarkerTemplate {
    /// One mesh per primitive of the source model.
    pub primitives: Vec<Handle<Mesh>>,
    /// Union of the primitives' vertex bounds, in mesh space.
    pub local_bounds: BoundingBox,
    pub resting_scale: Vec3,
    pub color: Color,
}

impl MarkerTemplate {
    /// Build a template from loaded meshes.
    ///
    /// Returns `None` if no primitive has vertex positions.
    pub fn from_meshes(
        primitives: Vec<Handle<Mesh>>,
        meshes: &Assets<Mesh>,
        color: Color,
    ) -> Option<Self> {
        let local_bounds = primitives
            .iter()
            .filter_map(|handle| meshes.get(handle))
            .map(mesh_bounds)
            .fold(BoundingBox::EMPTY, |acc, b| acc.union(&b));

        if local_bounds.is_empty() {
            return None;
        }

        Some(Self {
            primitives,
            local_bounds,
            resting_scale: RESTING_SCALE,
            color,
        })
    }

    /// Box around a marker posed at `transform`. Zero-scale markers have an
    /// empty box.
    pub fn world_bounds(&self, transform: &Transform) -> BoundingBox {
        if transform.scale == Vec3::ZERO {
            return BoundingBox::EMPTY;
        }
        let world = transform.compute_affine() * Affine3A::from_scale(self.resting_scale);
        self.local_bounds.transformed(&world)
    }
}

/// Vertex bounds of a mesh; empty if it has no `f32x3` positions.
pub fn mesh_bounds(mesh: &Mesh) -> BoundingBox {
    mesh.attribute(Mesh::ATTRIBUTE_POSITION)
        .and_then(|positions| positions.as_float3())
        .map_or(BoundingBox::EMPTY, |positions| {
            BoundingBox::from_points(positions.iter().map(|p| Vec3::from_array(*p)))
        })
}

/// A clustered location to turn into a marker.
#[derive(Debug, Clone)]
pub struct MarkerRequest {
    pub tier: Tier,
    pub lat: f32,
    pub lng: f32,
    pub label: Option<String>,
}

/// Spawn a hidden marker for `request` and return its entity.
///
/// Every primitive gets a fresh material. The only randomness is the height
/// jitter drawn from `rng`.
pub fn spawn_marker(
    commands: &mut Commands,
    materials: &mut Assets<StandardMaterial>,
    template: &MarkerTemplate,
    request: MarkerRequest,
    rng: &mut impl Rng,
) -> Entity {
    let jitter = if VERTICAL_JITTER > 0.0 {
        rng.random_range(0.0..VERTICAL_JITTER)
    } else {
        0.0
    };
    let marker = UfoMarker::new(
        request.tier,
        request.lat,
        request.lng,
        BASE_VERTICAL_OFFSET + jitter,
        request.label,
    );

    let handles: Vec<Handle<StandardMaterial>> = template
        .primitives
        .iter()
        .map(|_| {
            materials.add(StandardMaterial {
                base_color: template.color,
                perceptual_roughness: 1.0,
                alpha_mode: AlphaMode::Blend,
                ..default()
            })
        })
        .collect();

    let resting = Transform::IDENTITY;
    let bounds = MarkerBounds(template.world_bounds(&resting));

    commands
        .spawn((
            marker,
            bounds,
            MarkerMaterials {
                handles: handles.clone(),
                original: template.color,
            },
            resting,
            Visibility::Hidden,
        ))
        .with_children(|parent| {
            for (mesh, material) in template.primitives.iter().zip(handles) {
                parent.spawn((
                    Mesh3d(mesh.clone()),
                    MeshMaterial3d(material),
                    Transform::from_scale(template.resting_scale),
                ));
            }
        })
        .id()
}
