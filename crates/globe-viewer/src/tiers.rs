//! Per-tier marker lists, built once from the cluster index.

use std::collections::BTreeMap;

use bevy::prelude::*;
use geocluster::{ClusterFeature, ClusterIndex};
use rand::Rng;

use crate::marker::{MarkerRequest, MarkerTemplate, spawn_marker};
use crate::zoom::{Tier, TierSet};

/// Query box covering the whole world.
pub const WORLD_BBOX: [f64; 4] = [-180.0, -90.0, 180.0, 90.0];

/// Marker entities for every configured tier.
///
/// Built once after the cluster index is ready and never resized. Every tier
/// of the configured set has an entry, which may be empty.
#[derive(Resource, Debug, Default)]
pub struct TierTable {
    tiers: BTreeMap<Tier, Vec<Entity>>,
}

impl TierTable {
    /// Markers of `tier`.
    ///
    /// # Panics
    ///
    /// Panics if `tier` is not part of the table. The classifier only emits
    /// configured tiers, so this means the table and classifier disagree.
    pub fn markers(&self, tier: Tier) -> &[Entity] {
        match self.tiers.get(&tier) {
            Some(markers) => markers,
            None => panic!("tier {tier} has no marker list"),
        }
    }

    /// Tiers in ascending order with their markers.
    pub fn iter(&self) -> impl Iterator<Item = (Tier, &[Entity])> {
        self.tiers.iter().map(|(tier, markers)| (*tier, markers.as_slice()))
    }

    /// Total markers across all tiers.
    pub fn marker_count(&self) -> usize {
        self.tiers.values().map(Vec::len).sum()
    }
}

/// Hover label for a cluster query result: the `name` of a single point, or
/// the size of a cluster.
pub fn feature_label(feature: &ClusterFeature) -> Option<String> {
    if feature.is_cluster() {
        Some(format!("{} places", feature.point_count()))
    } else {
        feature.name().map(str::to_string)
    }
}

/// One marker request per cluster feature of `tier`, over the whole world.
pub fn marker_requests(index: &ClusterIndex, tier: Tier) -> Vec<MarkerRequest> {
    index
        .get_clusters(WORLD_BBOX, tier)
        .iter()
        .map(|feature| MarkerRequest {
            tier,
            lat: feature.lat as f32,
            lng: feature.lng as f32,
            label: feature_label(feature),
        })
        .collect()
}

/// Spawn hidden markers for every tier in `tiers`.
pub fn build_tier_table(
    commands: &mut Commands,
    materials: &mut Assets<StandardMaterial>,
    template: &MarkerTemplate,
    index: &ClusterIndex,
    tiers: &TierSet,
    rng: &mut impl Rng,
) -> TierTable {
    let mut table = TierTable::default();
    for tier in tiers.iter() {
        let markers: Vec<Entity> = marker_requests(index, tier)
            .into_iter()
            .map(|request| spawn_marker(commands, materials, template, request, rng))
            .collect();
        tracing::debug!("Tier {tier}: {} markers", markers.len());
        table.tiers.insert(tier, markers);
    }

    tracing::info!(
        "Built {} markers across {} tiers",
        table.marker_count(),
        table.tiers.len()
    );
    table
}

#[cfg(test)]
mod tests {
    use geocluster::{ClusterOptions, PointFeature};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::bounds::BoundingBox;
    use crate::marker::{RESTING_SCALE, UfoMarker};

    fn index() -> ClusterIndex {
        let points = vec![
            PointFeature::named(2.35, 48.86, "Paris"),
            PointFeature::named(2.36, 48.85, "Paris (east)"),
            PointFeature::named(-74.0, 40.7, "New York"),
        ];
        ClusterIndex::load(points, ClusterOptions::default()).unwrap()
    }

    fn template() -> MarkerTemplate {
        MarkerTemplate {
            primitives: vec![Handle::default()],
            local_bounds: BoundingBox::new(Vec3::splat(-0.5), Vec3::splat(0.5)),
            resting_scale: RESTING_SCALE,
            color: Color::WHITE,
        }
    }

    #[test]
    fn test_labels_for_points_and_clusters() {
        let index = index();

        let mut coarse: Vec<_> = marker_requests(&index, 0)
            .into_iter()
            .filter_map(|r| r.label)
            .collect();
        coarse.sort();
        assert_eq!(coarse, vec!["2 places".to_string(), "New York".to_string()]);

        let mut fine: Vec<_> = marker_requests(&index, 17)
            .into_iter()
            .filter_map(|r| r.label)
            .collect();
        fine.sort();
        assert_eq!(fine, vec!["New York", "Paris", "Paris (east)"]);
    }

    #[test]
    fn test_requests_carry_tier_and_coordinates() {
        let requests = marker_requests(&index(), 17);
        let new_york = requests
            .iter()
            .find(|r| r.label.as_deref() == Some("New York"))
            .unwrap();
        assert_eq!(new_york.tier, 17);
        assert!((new_york.lat - 40.7).abs() < 1e-3);
        assert!((new_york.lng + 74.0).abs() < 1e-3);
    }

    #[test]
    fn test_table_has_an_entry_per_tier() {
        let mut world = World::new();
        let mut materials = Assets::<StandardMaterial>::default();
        let mut rng = StdRng::seed_from_u64(1);
        let tiers = TierSet::new([0, 17, 25]).unwrap();

        let mut commands = world.commands();
        let table = build_tier_table(
            &mut commands,
            &mut materials,
            &template(),
            &index(),
            &tiers,
            &mut rng,
        );
        world.flush();

        assert_eq!(table.markers(0).len(), 2);
        assert_eq!(table.markers(17).len(), 3);
        assert_eq!(table.markers(25).len(), 3);
        assert_eq!(table.marker_count(), 8);
        let tiers: Vec<Tier> = table.iter().map(|(tier, _)| tier).collect();
        assert_eq!(tiers, vec![0, 17, 25]);

        for (tier, markers) in table.iter() {
            for entity in markers {
                assert_eq!(world.get::<UfoMarker>(*entity).unwrap().tier, tier);
            }
        }
    }

    #[test]
    fn test_empty_index_gives_empty_tiers() {
        let index = ClusterIndex::load(Vec::new(), ClusterOptions::default()).unwrap();
        let mut world = World::new();
        let mut materials = Assets::<StandardMaterial>::default();
        let mut rng = StdRng::seed_from_u64(1);

        let mut commands = world.commands();
        let table = build_tier_table(
            &mut commands,
            &mut materials,
            &template(),
            &index,
            &TierSet::new([2, 4]).unwrap(),
            &mut rng,
        );
        assert_eq!(table.markers(2), &[] as &[Entity]);
        assert_eq!(table.marker_count(), 0);
        assert_eq!(table.iter().count(), 2);
    }

    #[test]
    #[should_panic(expected = "tier 5 has no marker list")]
    fn test_missing_tier_panics() {
        TierTable::default().markers(5);
    }
}
