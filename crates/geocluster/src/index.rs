//! Hierarchical greedy point clustering.
//!
//! Points are projected to unit Web-Mercator space. Starting from the raw
//! points at `max_zoom + 1`, each zoom level is produced from the one above
//! it: every unvisited node absorbs all unvisited neighbours within
//! `radius / (extent * 2^zoom)` into a weighted-centroid cluster. Each level
//! keeps its own [`KdBush`] so queries at any zoom are a single range search.

use std::f64::consts::PI;

use serde_json::Value;
use web_time::Instant;

use crate::error::{Error, Result};
use crate::geojson::{ClusterFeature, ClusterInfo, PointFeature, Properties, abbreviate_count};
use crate::kdbush::KdBush;

/// Cluster ids store the origin zoom in their low 5 bits.
const ZOOM_BITS: usize = 5;
/// Largest supported `max_zoom`, so that `max_zoom + 1` fits in [`ZOOM_BITS`].
pub const MAX_SUPPORTED_ZOOM: u8 = 30;

/// Parameters controlling how points are clustered.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterOptions {
    /// Lowest zoom level at which clusters are generated.
    pub min_zoom: u8,
    /// Highest zoom level at which clusters are generated. Queries above it
    /// return the raw points.
    pub max_zoom: u8,
    /// Minimum number of points required to form a cluster.
    pub min_points: usize,
    /// Cluster radius in pixels.
    pub radius: f64,
    /// Tile extent in pixels; the radius is relative to it.
    pub extent: f64,
    /// KD index leaf size.
    pub node_size: usize,
    /// Log timing information while building.
    pub log: bool,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 16,
            min_points: 2,
            radius: 40.0,
            extent: 512.0,
            node_size: 64,
            log: false,
        }
    }
}

impl ClusterOptions {
    fn validate(&self) -> Result<()> {
        let invalid = |detail: String| Error::InvalidData {
            context: "cluster options",
            detail,
        };
        if self.max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(invalid(format!(
                "max_zoom {} exceeds {MAX_SUPPORTED_ZOOM}",
                self.max_zoom
            )));
        }
        if self.min_zoom > self.max_zoom {
            return Err(invalid(format!(
                "min_zoom {} is above max_zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if !(self.radius > 0.0 && self.extent > 0.0) {
            return Err(invalid(format!(
                "radius ({}) and extent ({}) must be positive",
                self.radius, self.extent
            )));
        }
        Ok(())
    }

    /// Clustering radius in projected units at `zoom`.
    fn radius_at(&self, zoom: u8) -> f64 {
        self.radius / (self.extent * 2f64.powi(i32::from(zoom)))
    }
}

/// A point or cluster in one zoom level.
#[derive(Debug, Clone, Copy)]
struct Node {
    x: f64,
    y: f64,
    /// Zoom at which this node was absorbed or visited; `None` while untouched.
    zoom: Option<u8>,
    /// Input index for points, cluster id for clusters.
    index: usize,
    parent: Option<usize>,
    num_points: usize,
    is_cluster: bool,
}

impl Node {
    fn visited_at(&self, zoom: u8) -> bool {
        self.zoom.is_some_and(|z| z <= zoom)
    }
}

#[derive(Debug)]
struct Level {
    nodes: Vec<Node>,
    tree: KdBush,
}

impl Level {
    fn new(nodes: Vec<Node>, node_size: usize) -> Self {
        let tree = KdBush::new(nodes.iter().map(|n| [n.x, n.y]), node_size);
        Self { nodes, tree }
    }

    fn empty() -> Self {
        Self::new(Vec::new(), 1)
    }
}

/// A clustered point index, queryable at any zoom level.
#[derive(Debug)]
pub struct ClusterIndex {
    options: ClusterOptions,
    points: Vec<PointFeature>,
    /// One level per zoom, `0..=max_zoom + 1`. Levels below `min_zoom` are
    /// empty and never queried.
    levels: Vec<Level>,
}

impl ClusterIndex {
    /// Build the index over `points`.
    ///
    /// # Errors
    ///
    /// Returns an error if `options` is inconsistent.
    pub fn load(points: Vec<PointFeature>, options: ClusterOptions) -> Result<Self> {
        options.validate()?;

        let total_start = Instant::now();
        let points_len = points.len();
        let top = usize::from(options.max_zoom) + 1;

        let mut levels: Vec<Level> = (0..=top).map(|_| Level::empty()).collect();
        let nodes = points
            .iter()
            .enumerate()
            .map(|(i, p)| Node {
                x: lng_x(p.lng),
                y: lat_y(p.lat),
                zoom: None,
                index: i,
                parent: None,
                num_points: 1,
                is_cluster: false,
            })
            .collect();
        levels[top] = Level::new(nodes, options.node_size);

        if options.log {
            tracing::info!("prepare {points_len} points");
        }

        for zoom in (options.min_zoom..=options.max_zoom).rev() {
            let start = Instant::now();
            let z = usize::from(zoom);
            let next = cluster_level(&mut levels[z + 1], zoom, &options, points_len);
            let count = next.len();
            levels[z] = Level::new(next, options.node_size);

            if options.log {
                tracing::info!(
                    "z{zoom}: {count} clusters in {:.2}ms",
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
        }

        if options.log {
            tracing::info!(
                "total time: {:.2}ms",
                total_start.elapsed().as_secs_f64() * 1000.0
            );
        }

        Ok(Self {
            options,
            points,
            levels,
        })
    }

    /// The options the index was built with.
    pub fn options(&self) -> &ClusterOptions {
        &self.options
    }

    /// Number of input points.
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Clusters and points inside `bbox = [west, south, east, north]` at `zoom`.
    ///
    /// Longitudes wrap: a box whose west edge is east of its east edge spans
    /// the antimeridian, and a span of 360° or more covers the whole world.
    /// `zoom` is clamped to `[min_zoom, max_zoom + 1]`.
    #[allow(clippy::float_cmp)]
    pub fn get_clusters(&self, bbox: [f64; 4], zoom: u8) -> Vec<ClusterFeature> {
        let mut min_lng = wrap_lng(bbox[0]);
        let min_lat = bbox[1].clamp(-90.0, 90.0);
        let mut max_lng = if bbox[2] == 180.0 {
            180.0
        } else {
            wrap_lng(bbox[2])
        };
        let max_lat = bbox[3].clamp(-90.0, 90.0);

        if bbox[2] - bbox[0] >= 360.0 {
            min_lng = -180.0;
            max_lng = 180.0;
        } else if min_lng > max_lng {
            let mut eastern = self.get_clusters([min_lng, min_lat, 180.0, max_lat], zoom);
            let western = self.get_clusters([-180.0, min_lat, max_lng, max_lat], zoom);
            eastern.extend(western);
            return eastern;
        }

        let level = &self.levels[self.limit_zoom(zoom)];
        level
            .tree
            .range(lng_x(min_lng), lat_y(max_lat), lng_x(max_lng), lat_y(min_lat))
            .into_iter()
            .map(|id| self.feature(&level.nodes[id]))
            .collect()
    }

    /// The direct children of a cluster, one zoom level deeper.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClusterNotFound`] if `cluster_id` is not a cluster of
    /// this index.
    pub fn get_children(&self, cluster_id: usize) -> Result<Vec<ClusterFeature>> {
        let not_found = || Error::ClusterNotFound { cluster_id };

        let (origin_index, origin_zoom) = self.decode_id(cluster_id).ok_or_else(not_found)?;
        let level = self.levels.get(origin_zoom).ok_or_else(not_found)?;
        let origin = level.nodes.get(origin_index).ok_or_else(not_found)?;

        let zoom = origin_zoom
            .checked_sub(1)
            .and_then(|z| u8::try_from(z).ok())
            .ok_or_else(not_found)?;
        let radius = self.options.radius_at(zoom);

        let children: Vec<ClusterFeature> = level
            .tree
            .within(origin.x, origin.y, radius)
            .into_iter()
            .map(|id| &level.nodes[id])
            .filter(|node| node.parent == Some(cluster_id))
            .map(|node| self.feature(node))
            .collect();

        if children.is_empty() {
            return Err(not_found());
        }
        Ok(children)
    }

    /// The original points inside a cluster, paginated by `limit` and
    /// `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClusterNotFound`] if `cluster_id` is not a cluster of
    /// this index.
    pub fn get_leaves(
        &self,
        cluster_id: usize,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ClusterFeature>> {
        let mut leaves = Vec::new();
        if limit > 0 {
            self.append_leaves(&mut leaves, cluster_id, limit, offset, 0)?;
        }
        Ok(leaves)
    }

    /// The zoom at which a cluster splits into more than one child.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClusterNotFound`] if `cluster_id` is not a cluster of
    /// this index.
    pub fn get_cluster_expansion_zoom(&self, cluster_id: usize) -> Result<u8> {
        let (_, origin_zoom) = self
            .decode_id(cluster_id)
            .ok_or(Error::ClusterNotFound { cluster_id })?;

        let mut expansion_zoom = origin_zoom.saturating_sub(1);
        let mut id = cluster_id;
        while expansion_zoom <= usize::from(self.options.max_zoom) {
            let children = self.get_children(id)?;
            expansion_zoom += 1;

            match children.as_slice() {
                [only] => match only.cluster {
                    Some(info) => id = info.id,
                    None => break,
                },
                _ => break,
            }
        }

        Ok(u8::try_from(expansion_zoom).unwrap_or(u8::MAX))
    }

    fn append_leaves(
        &self,
        result: &mut Vec<ClusterFeature>,
        cluster_id: usize,
        limit: usize,
        offset: usize,
        mut skipped: usize,
    ) -> Result<usize> {
        for child in self.get_children(cluster_id)? {
            match child.cluster {
                Some(info) if skipped + info.point_count <= offset => {
                    // Skip the whole cluster.
                    skipped += info.point_count;
                }
                Some(info) => {
                    skipped = self.append_leaves(result, info.id, limit, offset, skipped)?;
                }
                None if skipped < offset => skipped += 1,
                None => result.push(child),
            }

            if result.len() == limit {
                break;
            }
        }
        Ok(skipped)
    }

    fn limit_zoom(&self, zoom: u8) -> usize {
        usize::from(zoom.clamp(self.options.min_zoom, self.options.max_zoom + 1))
    }

    /// Split a cluster id into the node index and the level it was seeded in.
    fn decode_id(&self, cluster_id: usize) -> Option<(usize, usize)> {
        let local = cluster_id.checked_sub(self.points.len())?;
        Some((local >> ZOOM_BITS, local % (1 << ZOOM_BITS)))
    }

    fn feature(&self, node: &Node) -> ClusterFeature {
        if node.is_cluster {
            ClusterFeature {
                lng: x_lng(node.x),
                lat: y_lat(node.y),
                cluster: Some(ClusterInfo {
                    id: node.index,
                    point_count: node.num_points,
                }),
                properties: cluster_properties(node.index, node.num_points),
            }
        } else {
            let point = &self.points[node.index];
            ClusterFeature {
                lng: point.lng,
                lat: point.lat,
                cluster: None,
                properties: point.properties.clone(),
            }
        }
    }
}

/// Produce the nodes of level `zoom` from the level above it.
fn cluster_level(
    above: &mut Level,
    zoom: u8,
    options: &ClusterOptions,
    points_len: usize,
) -> Vec<Node> {
    let radius = options.radius_at(zoom);
    let mut next = Vec::new();

    for i in 0..above.nodes.len() {
        if above.nodes[i].visited_at(zoom) {
            continue;
        }
        above.nodes[i].zoom = Some(zoom);

        let Node { x, y, .. } = above.nodes[i];
        let neighbors = above.tree.within(x, y, radius);

        let origin_points = above.nodes[i].num_points;
        let num_points = origin_points
            + neighbors
                .iter()
                .map(|&k| &above.nodes[k])
                .filter(|n| !n.visited_at(zoom))
                .map(|n| n.num_points)
                .sum::<usize>();

        if num_points > origin_points && num_points >= options.min_points {
            let mut wx = x * origin_points as f64;
            let mut wy = y * origin_points as f64;
            let id = (i << ZOOM_BITS) + (usize::from(zoom) + 1) + points_len;

            for &k in &neighbors {
                let neighbor = &mut above.nodes[k];
                if neighbor.visited_at(zoom) {
                    continue;
                }
                neighbor.zoom = Some(zoom);
                wx += neighbor.x * neighbor.num_points as f64;
                wy += neighbor.y * neighbor.num_points as f64;
                neighbor.parent = Some(id);
            }

            above.nodes[i].parent = Some(id);
            next.push(Node {
                x: wx / num_points as f64,
                y: wy / num_points as f64,
                zoom: None,
                index: id,
                parent: None,
                num_points,
                is_cluster: true,
            });
        } else {
            next.push(Node {
                zoom: None,
                ..above.nodes[i]
            });

            // Too few points to cluster: carry the neighbours down individually.
            if num_points > 1 {
                for &k in &neighbors {
                    let neighbor = &mut above.nodes[k];
                    if neighbor.visited_at(zoom) {
                        continue;
                    }
                    neighbor.zoom = Some(zoom);
                    next.push(Node {
                        zoom: None,
                        ..*neighbor
                    });
                }
            }
        }
    }

    next
}

fn cluster_properties(cluster_id: usize, point_count: usize) -> Properties {
    let mut properties = Properties::new();
    properties.insert("cluster".to_string(), Value::Bool(true));
    properties.insert("cluster_id".to_string(), Value::from(cluster_id));
    properties.insert("point_count".to_string(), Value::from(point_count));
    properties.insert(
        "point_count_abbreviated".to_string(),
        Value::String(abbreviate_count(point_count)),
    );
    properties
}

fn wrap_lng(lng: f64) -> f64 {
    ((lng + 180.0) % 360.0 + 360.0) % 360.0 - 180.0
}

/// Longitude to unit Mercator x.
fn lng_x(lng: f64) -> f64 {
    lng / 360.0 + 0.5
}

/// Latitude to unit Mercator y (0 at the north edge).
fn lat_y(lat: f64) -> f64 {
    let sin = (lat * PI / 180.0).sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    y.clamp(0.0, 1.0)
}

fn x_lng(x: f64) -> f64 {
    (x - 0.5) * 360.0
}

fn y_lat(y: f64) -> f64 {
    let y2 = (180.0 - y * 360.0) * PI / 180.0;
    360.0 * y2.exp().atan() / PI - 90.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORLD: [f64; 4] = [-180.0, -90.0, 180.0, 90.0];

    fn scatter(count: usize) -> Vec<PointFeature> {
        let mut state: u64 = 42;
        let mut next = || {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        (0..count)
            .map(|i| PointFeature::named(next() * 360.0 - 180.0, next() * 160.0 - 80.0, format!("p{i}")))
            .collect()
    }

    fn total(features: &[ClusterFeature]) -> usize {
        features.iter().map(ClusterFeature::point_count).sum()
    }

    #[test]
    fn test_point_count_is_conserved_at_every_zoom() {
        let index = ClusterIndex::load(scatter(300), ClusterOptions::default()).unwrap();
        for zoom in 0..=17 {
            let features = index.get_clusters(WORLD, zoom);
            assert_eq!(total(&features), 300, "zoom {zoom}");
        }
    }

    #[test]
    fn test_low_zoom_aggregates_more_than_high_zoom() {
        let index = ClusterIndex::load(scatter(300), ClusterOptions::default()).unwrap();
        let coarse = index.get_clusters(WORLD, 0).len();
        let fine = index.get_clusters(WORLD, 17).len();
        assert!(coarse < fine);
        assert_eq!(fine, 300);
    }

    #[test]
    fn test_above_max_zoom_returns_original_points() {
        let points = vec![
            PointFeature::named(10.0, 10.0, "a"),
            PointFeature::named(10.0001, 10.0, "b"),
        ];
        let index = ClusterIndex::load(points, ClusterOptions::default()).unwrap();

        let features = index.get_clusters(WORLD, 200);
        assert_eq!(features.len(), 2);
        assert!(features.iter().all(|f| !f.is_cluster()));
        let mut names: Vec<&str> = features.iter().filter_map(ClusterFeature::name).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_two_points_split_at_expected_zoom() {
        // One degree of longitude apart: inside the radius up to zoom 4.
        let points = vec![PointFeature::new(0.0, 0.0), PointFeature::new(1.0, 0.0)];
        let index = ClusterIndex::load(points, ClusterOptions::default()).unwrap();

        let at_four = index.get_clusters(WORLD, 4);
        assert_eq!(at_four.len(), 1);
        let cluster = at_four[0].cluster.unwrap();
        assert_eq!(cluster.point_count, 2);
        assert_eq!(at_four[0].properties["cluster"], Value::Bool(true));
        assert!((at_four[0].lng - 0.5).abs() < 1e-9);
        assert!(at_four[0].lat.abs() < 1e-9);

        assert_eq!(index.get_clusters(WORLD, 5).len(), 2);
        assert_eq!(index.get_cluster_expansion_zoom(cluster.id).unwrap(), 5);

        // The same cluster id is reported at every lower zoom.
        let at_zero = index.get_clusters(WORLD, 0);
        assert_eq!(at_zero[0].cluster.unwrap().id, cluster.id);
    }

    #[test]
    fn test_min_points_prevents_small_clusters() {
        let points = vec![PointFeature::new(0.0, 0.0), PointFeature::new(0.5, 0.0)];
        let options = ClusterOptions {
            min_points: 3,
            ..ClusterOptions::default()
        };
        let index = ClusterIndex::load(points, options).unwrap();
        let features = index.get_clusters(WORLD, 0);
        assert_eq!(features.len(), 2);
        assert!(features.iter().all(|f| !f.is_cluster()));
    }

    #[test]
    fn test_children_and_leaves() {
        let points = vec![
            PointFeature::named(20.0, 20.0, "a"),
            PointFeature::named(20.5, 20.0, "b"),
            PointFeature::named(20.0, 20.5, "c"),
        ];
        let index = ClusterIndex::load(points, ClusterOptions::default()).unwrap();

        let top = index.get_clusters(WORLD, 0);
        assert_eq!(top.len(), 1);
        let id = top[0].cluster.unwrap().id;

        let children = index.get_children(id).unwrap();
        assert_eq!(total(&children), 3);

        let leaves = index.get_leaves(id, 10, 0).unwrap();
        let mut names: Vec<&str> = leaves.iter().filter_map(ClusterFeature::name).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["a", "b", "c"]);

        assert_eq!(index.get_leaves(id, 2, 0).unwrap().len(), 2);
        assert_eq!(index.get_leaves(id, 10, 2).unwrap().len(), 1);
        assert!(index.get_leaves(id, 0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_cluster_ids_are_errors() {
        let index = ClusterIndex::load(scatter(20), ClusterOptions::default()).unwrap();
        assert!(matches!(
            index.get_children(3),
            Err(Error::ClusterNotFound { cluster_id: 3 })
        ));
        assert!(index.get_children(1_000_000).is_err());
        assert!(index.get_cluster_expansion_zoom(0).is_err());
    }

    #[test]
    fn test_bbox_across_antimeridian() {
        let points = vec![
            PointFeature::named(179.5, 0.0, "east"),
            PointFeature::named(-179.5, 0.0, "west"),
            PointFeature::named(0.0, 0.0, "middle"),
        ];
        let index = ClusterIndex::load(points, ClusterOptions::default()).unwrap();

        let across = index.get_clusters([170.0, -10.0, -170.0, 10.0], 17);
        let mut names: Vec<&str> = across.iter().filter_map(ClusterFeature::name).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["east", "west"]);

        let centre = index.get_clusters([-10.0, -10.0, 10.0, 10.0], 17);
        assert_eq!(centre.len(), 1);
        assert_eq!(centre[0].name(), Some("middle"));

        let wrapped_world = index.get_clusters([-200.0, -90.0, 200.0, 90.0], 17);
        assert_eq!(wrapped_world.len(), 3);
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let bad_zoom = ClusterOptions {
            max_zoom: 31,
            ..ClusterOptions::default()
        };
        assert!(ClusterIndex::load(Vec::new(), bad_zoom).is_err());

        let bad_radius = ClusterOptions {
            radius: 0.0,
            ..ClusterOptions::default()
        };
        assert!(ClusterIndex::load(Vec::new(), bad_radius).is_err());
    }

    #[test]
    fn test_empty_index() {
        let index = ClusterIndex::load(Vec::new(), ClusterOptions::default()).unwrap();
        assert_eq!(index.point_count(), 0);
        assert!(index.get_clusters(WORLD, 3).is_empty());
    }

    #[test]
    fn test_projection_round_trip() {
        for (lng, lat) in [(0.0, 0.0), (-120.0, 45.0), (179.0, -60.0)] {
            assert!((x_lng(lng_x(lng)) - lng).abs() < 1e-9);
            assert!((y_lat(lat_y(lat)) - lat).abs() < 1e-9);
        }
    }
}
