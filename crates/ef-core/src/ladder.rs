//! Scale ladders: the ordered zoom levels every other component works on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{FEIGENBAUM_DELTA, PHI};
use crate::error::{FieldError, Result};

/// Spacing rule between adjacent ladder rungs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spacing {
    /// σ_{i+1} = 2σ_i, exactly `count` rungs, `max` ignored.
    #[default]
    Dyadic,
    /// σ_{i+1} = δσ_i, capped by `max`.
    Feigenbaum,
    /// σ_{i+1} = φσ_i, capped by `max`.
    Golden,
}

impl Spacing {
    pub fn ratio(self) -> f64 {
        match self {
            Spacing::Dyadic => 2.0,
            Spacing::Feigenbaum => FEIGENBAUM_DELTA,
            Spacing::Golden => PHI,
        }
    }
}

impl fmt::Display for Spacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Spacing::Dyadic => "dyadic",
            Spacing::Feigenbaum => "feigenbaum",
            Spacing::Golden => "golden",
        };
        f.write_str(name)
    }
}

impl FromStr for Spacing {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dyadic" => Ok(Spacing::Dyadic),
            "feigenbaum" => Ok(Spacing::Feigenbaum),
            "golden" => Ok(Spacing::Golden),
            other => Err(FieldError::InvalidConfig(format!(
                "unknown spacing '{other}' (expected dyadic, feigenbaum or golden)"
            ))),
        }
    }
}

/// Generate ladder values. Never fails; validation happens in [`ScaleLadder::new`].
///
/// Dyadic ladders always have `count` rungs. Feigenbaum and golden ladders stop
/// at whichever comes first: `count` rungs, or the next rung exceeding `max`.
pub fn generate(min: f64, max: f64, count: usize, spacing: Spacing) -> Vec<f64> {
    let mut values = Vec::with_capacity(count);
    let ratio = spacing.ratio();
    let mut sigma = min;
    while values.len() < count {
        if spacing != Spacing::Dyadic && sigma > max {
            break;
        }
        values.push(sigma);
        sigma *= ratio;
    }
    values
}

/// Validated, strictly increasing sequence of positive scales.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScaleLadder {
    scales: Vec<f64>,
}

impl ScaleLadder {
    pub fn new(scales: Vec<f64>) -> Result<Self> {
        if scales.is_empty() {
            return Err(FieldError::InvalidLadder("ladder has no scales".into()));
        }
        if let Some(bad) = scales.iter().find(|s| !s.is_finite() || **s <= 0.0) {
            return Err(FieldError::InvalidLadder(format!(
                "scale {bad} is not a positive finite value"
            )));
        }
        if let Some(w) = scales.windows(2).find(|w| w[1] <= w[0]) {
            return Err(FieldError::InvalidLadder(format!(
                "scales must be strictly increasing ({} then {})",
                w[0], w[1]
            )));
        }
        Ok(Self { scales })
    }

    pub fn generate(min: f64, max: f64, count: usize, spacing: Spacing) -> Result<Self> {
        Self::new(generate(min, max, count, spacing))
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    pub fn len(&self) -> usize {
        self.scales.len()
    }

    /// Always false for a constructed ladder; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.scales.is_empty()
    }

    /// Index of the rung matching `sigma` within a relative tolerance.
    pub fn index_of(&self, sigma: f64) -> Option<usize> {
        self.scales.iter().position(|s| scales_match(*s, sigma))
    }

    pub fn weights(&self, zeta: f64) -> ScaleWeights {
        ScaleWeights::new(&self.scales, zeta)
    }
}

/// Relative equality for scale values that went through float arithmetic.
pub(crate) fn scales_match(a: f64, b: f64) -> bool {
    (a - b).abs() <= crate::constants::SCALE_MATCH_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

/// Per-scale aggregation weights w(σ) = σ^(−1−ζ).
#[derive(Clone, Debug, PartialEq)]
pub struct ScaleWeights {
    weights: Vec<f64>,
    total: f64,
}

impl ScaleWeights {
    pub fn new(scales: &[f64], zeta: f64) -> Self {
        let weights: Vec<f64> = scales.iter().map(|s| s.powf(-1.0 - zeta)).collect();
        let total = weights.iter().sum();
        Self { weights, total }
    }

    pub fn get(&self, index: usize) -> f64 {
        self.weights.get(index).copied().unwrap_or(0.0)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }

    pub fn total(&self) -> f64 {
        self.total
    }
}
