//! Adaptive gain scheduling.
//!
//! Each frame the scheduler reads two signals:
//!
//! - **motion**: mean |φ_t − φ_{t−1}| from the estimator's own history, which
//!   picks one of four operating [`Region`]s;
//! - **phase coherence**: how well wavelet phases rotate between adjacent
//!   scales as the [`PhaseSignature`] predicts, in [0, 1].
//!
//! The region supplies a base gain triple, coherence modulates it within the
//! region's range, the result is clamped to absolute bounds and blended into
//! the live gains by an exponential moving average.
//!
//! Coherence is self-calibrating: the raw magnitude-weighted phase error is
//! normalised against the min/max of the last `coherence_window` frames. Until
//! that window has seen some spread (cold start) the score sits at 0.5 and
//! early values should not be read as meaningful. The window also lets the
//! range re-widen after an early outlier ages out.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SchedulerConfig;
use crate::constants::{COHERENCE_MAGNITUDE_FLOOR, EPSILON};
use crate::evidence::EvidenceSet;
use crate::field::{FieldEstimator, Gains};
use crate::phase::PhaseSignature;

/// Coherence reported when nothing can be said (no phase maps, no strong pixels,
/// or an uncalibrated range).
pub const NEUTRAL_COHERENCE: f64 = 0.5;

/// Coherence above this raises gains toward `base + modulation`.
pub const COHERENCE_HIGH: f64 = 0.8;
/// Coherence below this lowers gains toward `base − modulation`.
pub const COHERENCE_LOW: f64 = 0.4;

/// Absolute clamp bounds, (min, max).
pub const C_BOUNDS: (f64, f64) = (0.1, 3.0);
pub const ALPHA_BOUNDS: (f64, f64) = (0.1, 2.0);
pub const BETA_BOUNDS: (f64, f64) = (0.1, 1.0);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Static,
    Slow,
    Moderate,
    Fast,
}

impl Region {
    pub fn name(self) -> &'static str {
        match self {
            Region::Static => "static",
            Region::Slow => "slow",
            Region::Moderate => "moderate",
            Region::Fast => "fast",
        }
    }

    /// Base gains and modulation range for this region.
    pub fn profile(self) -> RegionProfile {
        match self {
            Region::Static => RegionProfile {
                base: Gains::new(1.0, 1.0, 0.5),
                modulation: Gains::new(0.3, 0.2, 0.1),
            },
            Region::Slow => RegionProfile {
                base: Gains::new(1.2, 1.1, 0.55),
                modulation: Gains::new(0.3, 0.2, 0.1),
            },
            Region::Moderate => RegionProfile {
                base: Gains::new(1.5, 1.2, 0.6),
                modulation: Gains::new(0.4, 0.3, 0.15),
            },
            Region::Fast => RegionProfile {
                base: Gains::new(2.0, 1.5, 0.8),
                modulation: Gains::new(0.5, 0.3, 0.2),
            },
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegionProfile {
    pub base: Gains,
    pub modulation: Gains,
}

impl RegionProfile {
    /// Target gains for a coherence score, before clamping.
    pub fn modulate(&self, coherence: f64) -> Gains {
        let shift = if coherence > COHERENCE_HIGH {
            ((coherence - COHERENCE_HIGH) / (1.0 - COHERENCE_HIGH)).min(1.0)
        } else if coherence < COHERENCE_LOW {
            -((COHERENCE_LOW - coherence) / COHERENCE_LOW).min(1.0)
        } else {
            0.0
        };
        Gains::new(
            self.base.c + shift * self.modulation.c,
            self.base.alpha + shift * self.modulation.alpha,
            self.base.beta + shift * self.modulation.beta,
        )
    }
}

pub fn clamp_gains(g: Gains) -> Gains {
    Gains::new(
        g.c.clamp(C_BOUNDS.0, C_BOUNDS.1),
        g.alpha.clamp(ALPHA_BOUNDS.0, ALPHA_BOUNDS.1),
        g.beta.clamp(BETA_BOUNDS.0, BETA_BOUNDS.1),
    )
}

/// Map a motion metric to its region. First matching predicate wins.
///
/// With increasing thresholds the four predicates partition [0, ∞) (and
/// everything below 0), so only a NaN motion reaches the fallback.
pub fn classify_region(motion: f64, thresholds: &[f64; 3]) -> Region {
    let [t_slow, t_moderate, t_fast] = *thresholds;
    let table = [
        (Region::Static, motion < t_slow),
        (Region::Slow, motion >= t_slow && motion < t_moderate),
        (Region::Moderate, motion >= t_moderate && motion < t_fast),
        (Region::Fast, motion >= t_fast),
    ];
    match table.iter().find(|(_, hit)| *hit) {
        Some((region, _)) => *region,
        None => {
            warn!(motion, ?thresholds, "no region matched motion, falling back to moderate");
            Region::Moderate
        }
    }
}

/// Magnitude-weighted mean phase error between adjacent wavelet scales.
///
/// `None` when the evidence has no phase maps or no pixel clears the
/// magnitude floor at the finer scale of any pair.
pub fn raw_phase_error(evidence: &EvidenceSet, signature: &PhaseSignature) -> Option<f64> {
    let layers = evidence.phase_layers()?;
    let mut weighted = 0.0;
    let mut weight = 0.0;
    for pair in layers.windows(2) {
        let (fine, coarse) = (&pair[0], &pair[1]);
        for j in 0..fine.magnitude.len() {
            let m = fine.magnitude[j];
            if m > COHERENCE_MAGNITUDE_FLOOR {
                let err =
                    signature.phase_error(fine.angle[j], coarse.angle[j], fine.sigma, coarse.sigma);
                weighted += m * err;
                weight += m;
            }
        }
    }
    (weight > EPSILON).then(|| weighted / weight)
}

/// Sliding min/max over recent raw phase errors.
#[derive(Clone, Debug)]
pub struct CoherenceRange {
    window: usize,
    samples: VecDeque<f64>,
}

impl CoherenceRange {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
        }
    }

    pub fn observe(&mut self, error: f64) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(error);
    }

    pub fn bounds(&self) -> Option<(f64, f64)> {
        if self.samples.is_empty() {
            return None;
        }
        let min = self.samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some((min, max))
    }

    /// Low error maps to high coherence. Degenerate range → neutral.
    pub fn normalize(&self, error: f64) -> f64 {
        match self.bounds() {
            Some((min, max)) if max - min > EPSILON => {
                (1.0 - (error - min) / (max - min)).clamp(0.0, 1.0)
            }
            _ => NEUTRAL_COHERENCE,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// Outcome of one scheduling step.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScheduleReport {
    pub region: Region,
    pub motion: f64,
    pub coherence: f64,
    /// Clamped per-frame target.
    pub target: Gains,
    /// Live gains after smoothing.
    pub gains: Gains,
}

/// Owns the live [`Gains`]. One per pipeline; instances share nothing.
#[derive(Clone, Debug)]
pub struct GainScheduler {
    config: SchedulerConfig,
    signature: PhaseSignature,
    initial: Gains,
    gains: Gains,
    region: Option<Region>,
    range: CoherenceRange,
}

impl GainScheduler {
    pub fn new(config: SchedulerConfig, initial: Gains, signature: PhaseSignature) -> Self {
        let initial = clamp_gains(initial);
        let range = CoherenceRange::new(config.coherence_window);
        Self {
            config,
            signature,
            initial,
            gains: initial,
            region: None,
            range,
        }
    }

    pub fn gains(&self) -> Gains {
        self.gains
    }

    /// Region chosen on the most recent step, if any.
    pub fn region(&self) -> Option<Region> {
        self.region
    }

    pub fn coherence_range(&self) -> &CoherenceRange {
        &self.range
    }

    /// Explicit restart: gains back to their initial values, calibration forgotten.
    pub fn reset(&mut self) {
        self.gains = self.initial;
        self.region = None;
        self.range.clear();
    }

    /// Phase coherence for this frame's evidence, recording the raw error.
    pub fn phase_coherence(&mut self, evidence: &EvidenceSet) -> f64 {
        match raw_phase_error(evidence, &self.signature) {
            Some(err) => {
                self.range.observe(err);
                self.range.normalize(err)
            }
            None => NEUTRAL_COHERENCE,
        }
    }

    /// Read the estimator's motion and the evidence's coherence, retune gains.
    pub fn schedule(
        &mut self,
        estimator: &FieldEstimator,
        evidence: &EvidenceSet,
    ) -> ScheduleReport {
        let motion = estimator.motion();
        let coherence = self.phase_coherence(evidence);
        self.step(motion, coherence)
    }

    /// The scheduling rule on already-measured inputs.
    pub fn step(&mut self, motion: f64, coherence: f64) -> ScheduleReport {
        let region = classify_region(motion, &self.config.region_thresholds);
        if self.region != Some(region) {
            debug!(from = ?self.region, to = %region, motion, "region change");
        }
        self.region = Some(region);

        let coherence = if coherence.is_finite() {
            coherence.clamp(0.0, 1.0)
        } else {
            NEUTRAL_COHERENCE
        };
        let target = clamp_gains(region.profile().modulate(coherence));
        let k = self.config.smoothing;
        let g = self.gains;
        self.gains = clamp_gains(Gains::new(
            g.c + k * (target.c - g.c),
            g.alpha + k * (target.alpha - g.alpha),
            g.beta + k * (target.beta - g.beta),
        ));

        debug!(
            %region,
            motion,
            coherence,
            c = self.gains.c,
            alpha = self.gains.alpha,
            beta = self.gains.beta,
            "gains scheduled"
        );
        ScheduleReport {
            region,
            motion,
            coherence,
            target,
            gains: self.gains,
        }
    }
}
