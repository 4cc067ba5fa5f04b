//! Cross-fade between marker tiers.
//!
//! ## State machine
//!
//! ```text
//! Steady(tier) --classifier changes--> Fading(previous, current, start)
//! Fading       --classifier changes--> Fading(current, new, now)
//! Fading       --elapsed >= duration--> Steady(current)
//! ```
//!
//! At most two tiers are visible at once: the one fading in and the one
//! fading out.

use bevy::prelude::*;

use crate::zoom::Tier;

/// Quintic ease-in-out on `[0, 1]`. Inputs outside the range are clamped.
pub fn ease_in_out_quint(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        16.0 * t.powi(5)
    } else {
        1.0 - (-2.0 * t + 2.0).powi(5) / 2.0
    }
}

/// Which tiers are shown and how far the fade has progressed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransitionPhase {
    /// Exactly one tier is visible.
    Steady { tier: Tier },
    /// `current` is fading in while `previous` fades out.
    Fading {
        previous: Tier,
        current: Tier,
        /// Timestamp in seconds at which the fade began.
        started_at: f64,
    },
}

/// Visibility of tiers for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fade {
    pub current: Tier,
    pub previous: Option<Tier>,
    /// Eased progress in `[0, 1]`; the opacity of `current`.
    pub progress: f32,
}

impl Fade {
    /// Opacity for markers of `tier`, or `None` if the tier is hidden.
    pub fn opacity(&self, tier: Tier) -> Option<f32> {
        if tier == self.current {
            Some(self.progress)
        } else if self.previous == Some(tier) {
            Some(1.0 - self.progress)
        } else {
            None
        }
    }
}

/// The tier cross-fade state, advanced once per frame.
#[derive(Resource, Debug, Clone)]
pub struct ZoomTransition {
    phase: TransitionPhase,
    /// Fade length in seconds. Zero or less switches tiers instantly.
    duration: f64,
}

impl ZoomTransition {
    /// Start steady on `tier`.
    pub fn new(tier: Tier, duration: f64) -> Self {
        Self {
            phase: TransitionPhase::Steady { tier },
            duration,
        }
    }

    pub fn phase(&self) -> TransitionPhase {
        self.phase
    }

    pub fn current(&self) -> Tier {
        match self.phase {
            TransitionPhase::Steady { tier } => tier,
            TransitionPhase::Fading { current, .. } => current,
        }
    }

    pub fn previous(&self) -> Option<Tier> {
        match self.phase {
            TransitionPhase::Steady { .. } => None,
            TransitionPhase::Fading { previous, .. } => Some(previous),
        }
    }

    /// Feed this frame's classified tier at time `now` and get the resulting
    /// tier visibility.
    ///
    /// A tier change starts a new fade from the tier that was current. A fade
    /// that has run for at least the configured duration settles, hiding the
    /// previous tier in the same frame.
    pub fn advance(&mut self, classified: Tier, now: f64) -> Fade {
        let current = self.current();
        if classified != current {
            tracing::debug!("Zoom tier {current} -> {classified}");
            self.phase = TransitionPhase::Fading {
                previous: current,
                current: classified,
                started_at: now,
            };
        }

        match self.phase {
            TransitionPhase::Steady { tier } => Fade {
                current: tier,
                previous: None,
                progress: 1.0,
            },
            TransitionPhase::Fading {
                previous,
                current,
                started_at,
            } => {
                let elapsed = now - started_at;
                if self.duration <= 0.0 || elapsed >= self.duration {
                    self.phase = TransitionPhase::Steady { tier: current };
                    return Fade {
                        current,
                        previous: None,
                        progress: 1.0,
                    };
                }

                let linear = (elapsed / self.duration).clamp(0.0, 1.0) as f32;
                Fade {
                    current,
                    previous: Some(previous),
                    progress: ease_in_out_quint(linear),
                }
            }
        }
    }
}
