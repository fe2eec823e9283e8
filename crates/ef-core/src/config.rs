//! Parameter structs for a pipeline instance.
//!
//! Every field has a default, so a partial document (or none) deserialises
//! into a working configuration. The core never touches the filesystem;
//! loading is the caller's business.

use serde::{Deserialize, Serialize};

use crate::constants::FINE_COARSE_THRESHOLD;
use crate::error::{FieldError, Result};
use crate::evidence::EvidenceStrategy;
use crate::ladder::{ScaleLadder, Spacing};
use crate::phase::PhaseSignature;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ladder: LadderConfig,
    pub estimator: EstimatorConfig,
    pub scheduler: SchedulerConfig,
    pub evidence: EvidenceConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LadderConfig {
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub spacing: Spacing,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            min: 0.5,
            max: 4.0,
            count: 5,
            spacing: Spacing::Dyadic,
        }
    }
}

impl LadderConfig {
    pub fn build(&self) -> Result<ScaleLadder> {
        ScaleLadder::generate(self.min, self.max, self.count, self.spacing)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Initial spatial coupling c.
    pub spatial_coupling: f64,
    /// Initial scale coupling α.
    pub scale_coupling: f64,
    /// Initial data fidelity β.
    pub data_fidelity: f64,
    pub learning_rate: f64,
    /// ζ in w(σ) = σ^(−1−ζ).
    pub scale_weight_exponent: f64,
    pub extract_threshold: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            spatial_coupling: 1.0,
            scale_coupling: 1.0,
            data_fidelity: 0.5,
            learning_rate: 0.1,
            scale_weight_exponent: 0.0,
            extract_threshold: 0.3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// EMA factor applied when moving live gains toward the frame target.
    pub smoothing: f64,
    /// Upper motion bounds of static, slow and moderate. Fast is everything above.
    pub region_thresholds: [f64; 3],
    /// Frames of raw phase error kept for coherence normalisation.
    pub coherence_window: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.1,
            region_thresholds: [0.1, 0.3, 0.6],
            coherence_window: 64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    pub strategy: EvidenceStrategy,
    /// Wavelet orientation, radians.
    pub orientation: f64,
    /// Envelope width per unit scale.
    pub sigma0: f64,
    /// Scale below which θ1⋆ applies instead of θ2⋆.
    pub fine_coarse_threshold: f64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            strategy: EvidenceStrategy::Sobel,
            orientation: 0.0,
            sigma0: 1.0,
            fine_coarse_threshold: FINE_COARSE_THRESHOLD,
        }
    }
}

impl EvidenceConfig {
    /// Default θ1⋆/θ2⋆ with this configuration's switch-over scale.
    pub fn signature(&self) -> PhaseSignature {
        PhaseSignature {
            fine_coarse_threshold: self.fine_coarse_threshold,
            ..PhaseSignature::default()
        }
    }
}

fn positive(name: &str, v: f64) -> Result<()> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(FieldError::InvalidConfig(format!(
            "{name} must be positive and finite, got {v}"
        )))
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        positive("ladder.min", self.ladder.min)?;
        if self.ladder.count == 0 {
            return Err(FieldError::InvalidConfig("ladder.count must be at least 1".into()));
        }
        if self.ladder.max.is_nan() {
            return Err(FieldError::InvalidConfig("ladder.max is NaN".into()));
        }

        let e = &self.estimator;
        positive("estimator.spatial_coupling", e.spatial_coupling)?;
        positive("estimator.scale_coupling", e.scale_coupling)?;
        positive("estimator.data_fidelity", e.data_fidelity)?;
        positive("estimator.learning_rate", e.learning_rate)?;
        if !e.scale_weight_exponent.is_finite() {
            return Err(FieldError::InvalidConfig(
                "estimator.scale_weight_exponent must be finite".into(),
            ));
        }
        if !(0.0..1.0).contains(&e.extract_threshold) {
            return Err(FieldError::InvalidConfig(format!(
                "estimator.extract_threshold must be in [0, 1), got {}",
                e.extract_threshold
            )));
        }

        let s = &self.scheduler;
        if !(s.smoothing > 0.0 && s.smoothing <= 1.0) {
            return Err(FieldError::InvalidConfig(format!(
                "scheduler.smoothing must be in (0, 1], got {}",
                s.smoothing
            )));
        }
        let t = s.region_thresholds;
        if !(t.iter().all(|v| v.is_finite()) && 0.0 < t[0] && t[0] < t[1] && t[1] < t[2]) {
            return Err(FieldError::InvalidConfig(format!(
                "scheduler.region_thresholds must be positive and strictly increasing, got {t:?}"
            )));
        }
        if s.coherence_window == 0 {
            return Err(FieldError::InvalidConfig(
                "scheduler.coherence_window must be at least 1".into(),
            ));
        }

        positive("evidence.sigma0", self.evidence.sigma0)?;
        positive("evidence.fine_coarse_threshold", self.evidence.fine_coarse_threshold)?;
        if !self.evidence.orientation.is_finite() {
            return Err(FieldError::InvalidConfig("evidence.orientation must be finite".into()));
        }
        Ok(())
    }
}
