//! Launch parameter parsing for the viewer.
//!
//! On native, parameters are parsed from command-line arguments using clap.
//! On WASM, defaults are used (CLI argument parsing is not available).

use bevy::prelude::*;
use geocluster::ClusterOptions;

use crate::transition::ZoomTransition;
use crate::zoom::{Tier, TierSet, ZoomClassifier};

/// Default point data, relative to the asset folder.
const DEFAULT_DATA: &str = "places.geojson";
/// Default cross-fade length in seconds.
const DEFAULT_TRANSITION_SECS: f64 = 1.0;
/// Default cluster radius in pixels.
const DEFAULT_RADIUS: f64 = 100.0;
/// Default tile extent in pixels.
const DEFAULT_EXTENT: f64 = 256.0;
/// Default maximum cluster zoom.
const DEFAULT_MAX_ZOOM: u8 = 17;
/// Default seed for marker height jitter.
const DEFAULT_SEED: u64 = 42;

/// Where the point data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// A GeoJSON file loaded through the asset server.
    Asset(String),
    /// A GeoJSON document fetched over HTTP.
    Url(String),
}

impl DataSource {
    /// `http(s)://` arguments are URLs, anything else is an asset path.
    pub fn from_arg(arg: &str) -> Self {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            Self::Url(arg.to_string())
        } else {
            Self::Asset(arg.to_string())
        }
    }
}

/// Tier layout and classifier ramp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(not(target_family = "wasm"), derive(clap::ValueEnum))]
pub enum Preset {
    /// Every tier from 0 to 7.
    #[default]
    Dense,
    /// Tiers 2, 4 and 8.
    Sparse,
}

impl Preset {
    pub fn tiers(self) -> &'static [Tier] {
        match self {
            Self::Dense => &[0, 1, 2, 3, 4, 5, 6, 7],
            Self::Sparse => &[2, 4, 8],
        }
    }

    /// `(intercept, slope)` of the classifier ramp. Both presets reach the
    /// coarsest tier at the maximum orbit distance and the finest at the
    /// minimum.
    pub fn ramp(self) -> (f32, f32) {
        match self {
            Self::Dense => (10.0, 0.2),
            Self::Sparse => (2.5, 0.05),
        }
    }

    pub fn tier_set(self) -> TierSet {
        TierSet::new(self.tiers().iter().copied()).unwrap_or_else(|| TierSet::single(0))
    }
}

/// Launch parameters for the viewer.
#[derive(Resource, Debug, Clone)]
pub struct LaunchParams {
    pub data: DataSource,
    pub preset: Preset,
    /// Tiers to build markers for; the preset's unless overridden.
    pub tiers: TierSet,
    /// Cross-fade length in seconds.
    pub transition_secs: f64,
    pub cluster: ClusterOptions,
    /// Seed for the marker height jitter.
    pub seed: u64,
}

impl Default for LaunchParams {
    fn default() -> Self {
        let preset = Preset::default();
        Self {
            data: DataSource::from_arg(DEFAULT_DATA),
            preset,
            tiers: preset.tier_set(),
            transition_secs: DEFAULT_TRANSITION_SECS,
            cluster: cluster_options(DEFAULT_RADIUS, DEFAULT_EXTENT, DEFAULT_MAX_ZOOM),
            seed: DEFAULT_SEED,
        }
    }
}

impl LaunchParams {
    pub fn classifier(&self) -> ZoomClassifier {
        let (intercept, slope) = self.preset.ramp();
        ZoomClassifier::new(self.tiers.clone(), intercept, slope)
    }

    /// Transition state starting steady on the coarsest tier, which is what
    /// the camera sees from its starting distance.
    pub fn transition(&self) -> ZoomTransition {
        ZoomTransition::new(self.tiers.coarsest(), self.transition_secs)
    }
}

fn cluster_options(radius: f64, extent: f64, max_zoom: u8) -> ClusterOptions {
    ClusterOptions {
        radius,
        extent,
        max_zoom,
        log: true,
        ..ClusterOptions::default()
    }
}

#[cfg(not(target_family = "wasm"))]
mod native {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    #[command(about = "Interactive globe with zoom-clustered location markers")]
    struct CliArgs {
        /// GeoJSON point data: an asset path or an http(s) URL.
        #[arg(long, default_value = DEFAULT_DATA)]
        data: String,

        /// Tier layout and zoom ramp.
        #[arg(long, value_enum, default_value_t = Preset::default())]
        preset: Preset,

        /// Comma-separated tiers overriding the preset's.
        #[arg(long, value_delimiter = ',')]
        tiers: Vec<Tier>,

        /// Cross-fade length in seconds.
        #[arg(long, default_value_t = DEFAULT_TRANSITION_SECS)]
        transition_secs: f64,

        /// Cluster radius in pixels.
        #[arg(long, default_value_t = DEFAULT_RADIUS)]
        radius: f64,

        /// Tile extent in pixels.
        #[arg(long, default_value_t = DEFAULT_EXTENT)]
        extent: f64,

        /// Maximum cluster zoom.
        #[arg(long, default_value_t = DEFAULT_MAX_ZOOM)]
        max_zoom: u8,

        /// Seed for marker height jitter.
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    }

    pub fn parse() -> LaunchParams {
        let args = CliArgs::parse();
        LaunchParams {
            data: DataSource::from_arg(&args.data),
            preset: args.preset,
            tiers: TierSet::new(args.tiers).unwrap_or_else(|| args.preset.tier_set()),
            transition_secs: args.transition_secs,
            cluster: cluster_options(args.radius, args.extent, args.max_zoom),
            seed: args.seed,
        }
    }
}

/// Parse launch parameters from CLI args (native) or use defaults (WASM).
pub fn parse() -> LaunchParams {
    #[cfg(not(target_family = "wasm"))]
    {
        native::parse()
    }
    #[cfg(target_family = "wasm")]
    {
        LaunchParams::default()
    }
}
