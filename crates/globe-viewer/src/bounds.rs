//! Axis-aligned bounding boxes for marker hit-testing.

use bevy::prelude::*;
use glam::Affine3A;

/// An axis-aligned box in world or mesh space.
///
/// A box with `min > max` on any axis is empty and never intersects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub const EMPTY: Self = Self {
        min: Vec3::INFINITY,
        max: Vec3::NEG_INFINITY,
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point; empty for no points.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |b, p| Self {
            min: b.min.min(p),
            max: b.max.max(p),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Box enclosing this box after `transform`, computed from its eight
    /// corners.
    pub fn transformed(&self, transform: &Affine3A) -> Self {
        if self.is_empty() {
            return Self::EMPTY;
        }
        let corners = (0..8).map(|i| {
            Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        });
        Self::from_points(corners.map(|c| transform.transform_point3(c)))
    }

    /// Distance along a ray to the first point inside the box, using the slab
    /// method. Returns zero when the origin is inside, `None` on a miss.
    ///
    /// `direction` must be normalized for the result to be a distance.
    pub fn ray_distance(&self, origin: Vec3, direction: Vec3) -> Option<f32> {
        if self.is_empty() {
            return None;
        }

        let mut t_near = f32::NEG_INFINITY;
        let mut t_far = f32::INFINITY;

        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];

            // Parallel to this slab: either always inside it or never.
            if d.abs() < f32::EPSILON {
                if o < self.min[axis] || o > self.max[axis] {
                    return None;
                }
                continue;
            }

            let t0 = (self.min[axis] - o) / d;
            let t1 = (self.max[axis] - o) / d;
            t_near = t_near.max(t0.min(t1));
            t_far = t_far.min(t0.max(t1));

            if t_near > t_far {
                return None;
            }
        }

        if t_far < 0.0 {
            return None;
        }
        Some(t_near.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    fn unit() -> BoundingBox {
        BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0))
    }

    #[test]
    fn test_from_points() {
        let b = BoundingBox::from_points([Vec3::new(1.0, -2.0, 0.5), Vec3::new(-1.0, 3.0, 0.0)]);
        assert_eq!(b.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 3.0, 0.5));
        assert!(BoundingBox::from_points(std::iter::empty()).is_empty());
    }

    #[test]
    fn test_transformed_scales_rotates_and_translates() {
        let transform = Affine3A::from_scale_rotation_translation(
            Vec3::new(2.0, 1.0, 1.0),
            Quat::from_rotation_z(FRAC_PI_2),
            Vec3::new(0.0, 10.0, 0.0),
        );
        let b = unit().transformed(&transform);
        // Scaled to x in [-2, 2], then rotated so that extent lies along y.
        assert!((b.min - Vec3::new(-1.0, 8.0, -1.0)).length() < 1e-5);
        assert!((b.max - Vec3::new(1.0, 12.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_zero_scale_collapses_to_a_point() {
        let transform = Affine3A::from_scale_rotation_translation(
            Vec3::ZERO,
            Quat::IDENTITY,
            Vec3::new(3.0, 0.0, 0.0),
        );
        let b = unit().transformed(&transform);
        assert_eq!(b.min, b.max);
        assert_eq!(b.min, Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_ray_hits_box_in_front() {
        let distance = unit().ray_distance(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z);
        assert_eq!(distance, Some(9.0));
    }

    #[test]
    fn test_ray_misses() {
        let b = unit();
        assert_eq!(b.ray_distance(Vec3::new(0.0, 5.0, 10.0), Vec3::NEG_Z), None);
        // Box is behind the ray.
        assert_eq!(b.ray_distance(Vec3::new(0.0, 0.0, 10.0), Vec3::Z), None);
        assert_eq!(BoundingBox::EMPTY.ray_distance(Vec3::ZERO, Vec3::X), None);
    }

    #[test]
    fn test_ray_from_inside() {
        assert_eq!(unit().ray_distance(Vec3::ZERO, Vec3::X), Some(0.0));
    }

    #[test]
    fn test_diagonal_ray() {
        let direction = Vec3::new(-1.0, -1.0, 0.0).normalize();
        let distance = unit()
            .ray_distance(Vec3::new(5.0, 5.0, 0.0), direction)
            .unwrap();
        assert!((distance - 4.0 * std::f32::consts::SQRT_2).abs() < 1e-4);
    }
}
