//! Zoom-dependent clustering of geographic points.
//!
//! This crate turns a GeoJSON point collection into a hierarchy of clusters,
//! one level per zoom, and answers "what should be drawn at zoom `z` inside
//! this bounding box" queries.
//!
//! # Example
//!
//! ```
//! use geocluster::{ClusterIndex, ClusterOptions, PointFeature};
//!
//! let points = vec![
//!     PointFeature::named(2.35, 48.86, "Paris"),
//!     PointFeature::named(2.36, 48.85, "Paris (east)"),
//!     PointFeature::named(-74.0, 40.7, "New York"),
//! ];
//! let index = ClusterIndex::load(points, ClusterOptions::default())?;
//!
//! let world = index.get_clusters([-180.0, -90.0, 180.0, 90.0], 2);
//! assert_eq!(world.len(), 2);
//! # Ok::<(), geocluster::Error>(())
//! ```

mod error;
mod geojson;
mod index;
mod kdbush;

pub use error::{Error, Result};
pub use geojson::{
    ClusterFeature, ClusterInfo, PointFeature, Properties, abbreviate_count,
    parse_feature_collection,
};
pub use index::{ClusterIndex, ClusterOptions, MAX_SUPPORTED_ZOOM};
pub use kdbush::KdBush;
