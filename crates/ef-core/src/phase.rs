//! Phase signature θ⋆: how a persistent edge's wavelet phase rotates between scales.
//!
//! The wavelet bank bakes `theta(σ)` into its kernels and the gain scheduler
//! checks observed phases against `evolve_phase`. Both go through the same
//! [`PhaseSignature`] so the two sides cannot drift apart.

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::constants::{COHERENCE_TOLERANCE, FINE_COARSE_THRESHOLD, THETA_COARSE, THETA_FINE};

/// Wrap an angle into (−π, π].
pub fn wrap_phase(theta: f64) -> f64 {
    let wrapped = (theta + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI { wrapped + TAU } else { wrapped }
}

/// Shortest angular distance between two phases, in [0, π].
pub fn circular_distance(a: f64, b: f64) -> f64 {
    wrap_phase(a - b).abs()
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseSignature {
    /// θ1⋆, applied below the threshold.
    pub theta_fine: f64,
    /// θ2⋆, applied at or above the threshold.
    pub theta_coarse: f64,
    pub fine_coarse_threshold: f64,
}

impl Default for PhaseSignature {
    fn default() -> Self {
        Self {
            theta_fine: THETA_FINE,
            theta_coarse: THETA_COARSE,
            fine_coarse_threshold: FINE_COARSE_THRESHOLD,
        }
    }
}

impl PhaseSignature {
    pub fn theta(&self, sigma: f64) -> f64 {
        if sigma < self.fine_coarse_threshold {
            self.theta_fine
        } else {
            self.theta_coarse
        }
    }

    /// Rotation number Δθ⋆.
    pub fn rotation(&self) -> f64 {
        self.theta_fine - self.theta_coarse
    }

    /// Advance `phase` from scale `sigma` by `delta_sigma`, result in [0, 2π).
    pub fn evolve_phase(&self, phase: f64, sigma: f64, delta_sigma: f64) -> f64 {
        (phase + self.theta(sigma) * delta_sigma / sigma).rem_euclid(TAU)
    }

    /// Circular error between the observed phase at `sigma_b` and the phase
    /// predicted by evolving `phase_a` from `sigma_a`.
    pub fn phase_error(&self, phase_a: f64, phase_b: f64, sigma_a: f64, sigma_b: f64) -> f64 {
        let predicted = self.evolve_phase(phase_a, sigma_a, sigma_b - sigma_a);
        circular_distance(phase_b, predicted)
    }

    pub fn is_coherent_within(
        &self,
        phase_a: f64,
        phase_b: f64,
        sigma_a: f64,
        sigma_b: f64,
        tolerance: f64,
    ) -> bool {
        self.phase_error(phase_a, phase_b, sigma_a, sigma_b) <= tolerance
    }

    /// [`Self::is_coherent_within`] at the default tolerance.
    pub fn is_coherent(&self, phase_a: f64, phase_b: f64, sigma_a: f64, sigma_b: f64) -> bool {
        self.is_coherent_within(phase_a, phase_b, sigma_a, sigma_b, COHERENCE_TOLERANCE)
    }
}
