//! Per-frame edge evidence: one (magnitude, phase-or-direction) pair per scale.
//!
//! Two strategies share one output shape so the estimator never needs to know
//! which produced its input:
//!
//! - [`sobel`]: real 3×3 gradient, direction as the angle channel, identical
//!   at every scale.
//! - [`wavelet`]: complex phase-modulated kernels, one per scale, whose phase
//!   feeds the scheduler's coherence score.

pub mod sobel;
pub mod wavelet;

use serde::{Deserialize, Serialize};

use crate::constants::EPSILON;
use crate::error::{FieldError, Result};
use crate::ladder::{ScaleLadder, scales_match};
use crate::lattice::Lattice;
use crate::phase::PhaseSignature;

pub use wavelet::{WaveletBank, WaveletKernel};

/// Which evidence strategy a pipeline runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceStrategy {
    #[default]
    Sobel,
    Wavelet,
}

impl std::str::FromStr for EvidenceStrategy {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sobel" => Ok(EvidenceStrategy::Sobel),
            "wavelet" => Ok(EvidenceStrategy::Wavelet),
            other => Err(FieldError::InvalidConfig(format!(
                "unknown evidence strategy '{other}' (expected sobel or wavelet)"
            ))),
        }
    }
}

/// What the angle channel of a layer means.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EvidenceKind {
    /// Gradient direction from a real operator. Carries no cross-scale phase.
    Gradient,
    /// Complex response phase, comparable across scales.
    Phase,
}

/// Evidence at one scale. Both arrays are `size × size`, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct EvidenceLayer {
    pub sigma: f64,
    /// Normalised to [0, 1].
    pub magnitude: Vec<f64>,
    /// In (−π, π].
    pub angle: Vec<f64>,
}

/// All evidence for one frame. Not retained past the frame that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct EvidenceSet {
    size: usize,
    kind: EvidenceKind,
    layers: Vec<EvidenceLayer>,
}

impl EvidenceSet {
    pub fn from_layers(
        size: usize,
        kind: EvidenceKind,
        layers: Vec<EvidenceLayer>,
    ) -> Result<Self> {
        let cells = size * size;
        for layer in &layers {
            if layer.magnitude.len() != cells || layer.angle.len() != cells {
                return Err(FieldError::InvalidLattice(format!(
                    "evidence layer at sigma={} does not cover a {size}x{size} grid",
                    layer.sigma
                )));
            }
        }
        Ok(Self { size, kind, layers })
    }

    /// Same magnitude everywhere at every listed scale, zero angle.
    pub fn constant(size: usize, scales: &[f64], magnitude: f64) -> Self {
        let layers = scales
            .iter()
            .map(|&sigma| EvidenceLayer {
                sigma,
                magnitude: vec![magnitude; size * size],
                angle: vec![0.0; size * size],
            })
            .collect();
        Self {
            size,
            kind: EvidenceKind::Gradient,
            layers,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn kind(&self) -> EvidenceKind {
        self.kind
    }

    pub fn layers(&self) -> &[EvidenceLayer] {
        &self.layers
    }

    pub fn layer_for(&self, sigma: f64) -> Option<&EvidenceLayer> {
        self.layers.iter().find(|l| scales_match(l.sigma, sigma))
    }

    /// Per-scale phase maps, only when the angle channel is a true phase.
    pub fn phase_layers(&self) -> Option<&[EvidenceLayer]> {
        match self.kind {
            EvidenceKind::Phase => Some(&self.layers),
            EvidenceKind::Gradient => None,
        }
    }
}

/// Evidence strategy, built once per pipeline and reused every frame.
#[derive(Clone, Debug)]
pub enum EvidenceGenerator {
    Sobel { scales: Vec<f64> },
    Wavelet(WaveletBank),
}

impl EvidenceGenerator {
    pub fn new(
        strategy: EvidenceStrategy,
        ladder: &ScaleLadder,
        signature: PhaseSignature,
        orientation: f64,
        sigma0: f64,
    ) -> Result<Self> {
        match strategy {
            EvidenceStrategy::Sobel => Ok(EvidenceGenerator::Sobel {
                scales: ladder.scales().to_vec(),
            }),
            EvidenceStrategy::Wavelet => Ok(EvidenceGenerator::Wavelet(WaveletBank::new(
                ladder,
                signature,
                orientation,
                sigma0,
            )?)),
        }
    }

    pub fn strategy(&self) -> EvidenceStrategy {
        match self {
            EvidenceGenerator::Sobel { .. } => EvidenceStrategy::Sobel,
            EvidenceGenerator::Wavelet(_) => EvidenceStrategy::Wavelet,
        }
    }

    pub fn generate(&self, lattice: &Lattice) -> EvidenceSet {
        match self {
            EvidenceGenerator::Sobel { scales } => {
                let (magnitude, direction) = sobel::sobel(lattice);
                let layers = scales
                    .iter()
                    .map(|&sigma| EvidenceLayer {
                        sigma,
                        magnitude: magnitude.clone(),
                        angle: direction.clone(),
                    })
                    .collect();
                EvidenceSet {
                    size: lattice.size(),
                    kind: EvidenceKind::Gradient,
                    layers,
                }
            }
            EvidenceGenerator::Wavelet(bank) => bank.generate(lattice),
        }
    }
}

/// Divide by the frame maximum. All-zero input stays zero.
pub(crate) fn normalize_by_max(values: &mut [f64]) {
    let max = values.iter().copied().fold(0.0f64, f64::max);
    if max <= EPSILON {
        values.iter_mut().for_each(|v| *v = 0.0);
        return;
    }
    for v in values.iter_mut() {
        *v /= max;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ladder::Spacing;

    fn step(size: usize) -> Lattice {
        Lattice::from_fn(size, |x, _| if x >= size / 2 { 1.0 } else { 0.0 }).unwrap()
    }

    #[test]
    fn test_normalize_guards_zero() {
        let mut v = vec![0.0, 0.0, 1e-12];
        normalize_by_max(&mut v);
        assert!(v.iter().all(|x| *x == 0.0));

        let mut v = vec![1.0, 4.0, 2.0];
        normalize_by_max(&mut v);
        assert_eq!(v, vec![0.25, 1.0, 0.5]);
    }

    #[test]
    fn test_sobel_strategy_repeats_per_scale_without_phase() {
        let ladder = ScaleLadder::generate(0.5, 4.0, 3, Spacing::Dyadic).unwrap();
        let generator = EvidenceGenerator::new(
            EvidenceStrategy::Sobel,
            &ladder,
            PhaseSignature::default(),
            0.0,
            1.0,
        )
        .unwrap();
        let ev = generator.generate(&step(16));
        assert_eq!(ev.layers().len(), 3);
        assert_eq!(ev.layers()[0].magnitude, ev.layers()[2].magnitude);
        assert!(ev.phase_layers().is_none());
        assert!(ev.layer_for(2.0).is_some());
        assert!(ev.layer_for(3.0).is_none());
    }

    #[test]
    fn test_wavelet_strategy_exposes_phase() {
        let ladder = ScaleLadder::generate(0.5, 4.0, 2, Spacing::Dyadic).unwrap();
        let generator = EvidenceGenerator::new(
            EvidenceStrategy::Wavelet,
            &ladder,
            PhaseSignature::default(),
            0.0,
            1.0,
        )
        .unwrap();
        assert_eq!(generator.strategy(), EvidenceStrategy::Wavelet);
        let ev = generator.generate(&step(16));
        let phases = ev.phase_layers().expect("wavelet evidence carries phase");
        assert_eq!(phases.len(), 2);
    }

    #[test]
    fn test_from_layers_checks_shape() {
        let bad = EvidenceLayer {
            sigma: 1.0,
            magnitude: vec![0.0; 3],
            angle: vec![0.0; 4],
        };
        assert!(EvidenceSet::from_layers(2, EvidenceKind::Gradient, vec![bad]).is_err());
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("Wavelet".parse::<EvidenceStrategy>().unwrap(), EvidenceStrategy::Wavelet);
        assert!("canny".parse::<EvidenceStrategy>().is_err());
    }
}
