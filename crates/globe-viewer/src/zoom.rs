//! Camera distance to cluster tier classification.
//!
//! Markers are precomputed for a handful of cluster zoom levels ("tiers").
//! The classifier picks one of them from the orbit distance with a clamped
//! linear ramp, so nearer cameras see finer clusters.

use bevy::prelude::*;

/// A cluster zoom level that has its own set of markers.
pub type Tier = u8;

/// Non-empty, strictly ascending set of tiers. Index 0 is the coarsest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierSet {
    tiers: Vec<Tier>,
}

impl TierSet {
    /// Build a tier set, sorting and removing duplicates.
    ///
    /// Returns `None` if no tiers are given.
    pub fn new(tiers: impl IntoIterator<Item = Tier>) -> Option<Self> {
        let mut tiers: Vec<Tier> = tiers.into_iter().collect();
        tiers.sort_unstable();
        tiers.dedup();
        (!tiers.is_empty()).then_some(Self { tiers })
    }

    pub fn single(tier: Tier) -> Self {
        Self { tiers: vec![tier] }
    }

    /// The least detailed tier.
    pub fn coarsest(&self) -> Tier {
        self.tiers[0]
    }

    /// The most detailed tier.
    pub fn finest(&self) -> Tier {
        self.tiers[self.max_index()]
    }

    /// Largest valid index.
    pub fn max_index(&self) -> usize {
        self.tiers.len() - 1
    }

    /// Tier at `index`, clamped into range.
    pub fn at(&self, index: usize) -> Tier {
        self.tiers[index.min(self.max_index())]
    }

    pub fn contains(&self, tier: Tier) -> bool {
        self.tiers.binary_search(&tier).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = Tier> + '_ {
        self.tiers.iter().copied()
    }
}

/// Maps orbit distance to a tier.
///
/// `index = clamp(round(intercept - slope * distance), 0, max_index)`.
#[derive(Resource, Debug, Clone)]
pub struct ZoomClassifier {
    pub tiers: TierSet,
    pub intercept: f32,
    pub slope: f32,
}

impl ZoomClassifier {
    pub fn new(tiers: TierSet, intercept: f32, slope: f32) -> Self {
        Self {
            tiers,
            intercept,
            slope,
        }
    }

    /// Pick the tier for a camera at `distance` from the orbit target.
    ///
    /// Always returns a member of the tier set. NaN maps to the coarsest tier
    /// and negative distances are treated as zero.
    #[allow(clippy::cast_sign_loss)]
    pub fn classify(&self, distance: f32) -> Tier {
        if distance.is_nan() {
            return self.tiers.coarsest();
        }
        let raw = (self.intercept - self.slope * distance.max(0.0)).round();
        let index = raw.clamp(0.0, self.tiers.max_index() as f32) as usize;
        self.tiers.at(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense() -> ZoomClassifier {
        ZoomClassifier::new(TierSet::new(0..=7).unwrap(), 10.0, 0.2)
    }

    fn sparse() -> ZoomClassifier {
        ZoomClassifier::new(TierSet::new([8, 2, 4, 4]).unwrap(), 2.5, 0.05)
    }

    #[test]
    fn test_tier_set_sorts_and_dedups() {
        let set = TierSet::new([8, 2, 4, 4]).unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![2, 4, 8]);
        assert_eq!(set.coarsest(), 2);
        assert_eq!(set.finest(), 8);
        assert_eq!(set.at(99), 8);
        assert!(set.contains(4));
        assert!(!set.contains(3));
        assert!(TierSet::new(std::iter::empty()).is_none());
    }

    #[test]
    fn test_classify_always_returns_a_member() {
        for classifier in [dense(), sparse()] {
            let mut distance = 0.0_f32;
            while distance <= 60.0 {
                let tier = classifier.classify(distance);
                assert!(
                    classifier.tiers.contains(tier),
                    "distance {distance} gave {tier}"
                );
                distance += 0.1;
            }
        }
    }

    #[test]
    fn test_classify_is_monotonic() {
        for classifier in [dense(), sparse()] {
            let mut previous = classifier.classify(0.0);
            let mut distance = 0.0_f32;
            while distance <= 200.0 {
                let tier = classifier.classify(distance);
                assert!(tier <= previous, "tier grew at distance {distance}");
                previous = tier;
                distance += 0.25;
            }
        }
    }

    #[test]
    fn test_far_camera_selects_coarsest_tier() {
        assert_eq!(dense().classify(50.0), 0);
        assert_eq!(dense().classify(52.3), 0);
        assert_eq!(sparse().classify(50.0), 2);
        assert_eq!(dense().classify(f32::INFINITY), 0);
        assert_eq!(dense().classify(f32::NAN), 0);
    }

    #[test]
    fn test_near_camera_clamps_to_finest_tier() {
        assert_eq!(dense().classify(10.0), 7);
        assert_eq!(dense().classify(0.0), 7);
        assert_eq!(dense().classify(-5.0), 7);
        assert_eq!(sparse().classify(10.0), 8);
        assert_eq!(sparse().classify(30.0), 4);
    }

    #[test]
    fn test_intermediate_distances() {
        // round(10 - 0.2 * 35) = 3.
        assert_eq!(dense().classify(35.0), 3);
        // round(10 - 0.2 * 40) = 2.
        assert_eq!(dense().classify(40.0), 2);
    }
}
