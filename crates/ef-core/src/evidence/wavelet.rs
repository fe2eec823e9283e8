//! Complex phase-modulated wavelet bank.
//!
//! ψ(x, y; σ) = G(r; w) · exp(i·Φ), with w = sigma0·σ and
//! Φ = atan2(dy, dx) − orientation + θ(σ)·r/σ.
//!
//! A persistent edge advances its response phase by θ(σ) per unit relative
//! scale step, which is what makes [`PhaseSignature::is_coherent`] a real
//! check on this evidence rather than a tautology.

use tracing::trace;

use crate::error::{FieldError, Result};
use crate::ladder::ScaleLadder;
use crate::lattice::Lattice;
use crate::phase::{PhaseSignature, wrap_phase};

use super::{EvidenceKind, EvidenceLayer, EvidenceSet, normalize_by_max};

/// Envelope cut-off, in envelope widths.
const SUPPORT_WIDTHS: f64 = 3.0;

/// L²-normalised complex kernel for one scale.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveletKernel {
    pub sigma: f64,
    pub radius: usize,
    re: Vec<f64>,
    im: Vec<f64>,
}

impl WaveletKernel {
    pub fn build(
        sigma: f64,
        signature: &PhaseSignature,
        orientation: f64,
        sigma0: f64,
    ) -> Result<Self> {
        if !(sigma > 0.0 && sigma.is_finite()) || !(sigma0 > 0.0 && sigma0.is_finite()) {
            return Err(FieldError::InvalidConfig(format!(
                "wavelet scale {sigma} and sigma0 {sigma0} must be positive"
            )));
        }
        let width = sigma0 * sigma;
        let radius = ((SUPPORT_WIDTHS * width).ceil() as usize).max(1);
        let side = 2 * radius + 1;
        let theta = signature.theta(sigma);

        let mut re = Vec::with_capacity(side * side);
        let mut im = Vec::with_capacity(side * side);
        for ky in 0..side {
            let dy = ky as f64 - radius as f64;
            for kx in 0..side {
                let dx = kx as f64 - radius as f64;
                let r = (dx * dx + dy * dy).sqrt();
                let envelope = (-(r * r) / (2.0 * width * width)).exp();
                let phi = dy.atan2(dx) - orientation + theta * (r / sigma);
                re.push(envelope * phi.cos());
                im.push(envelope * phi.sin());
            }
        }

        let energy: f64 = re.iter().zip(&im).map(|(a, b)| a * a + b * b).sum();
        if !(energy > 0.0 && energy.is_finite()) {
            return Err(FieldError::DegenerateKernel { sigma });
        }
        let norm = energy.sqrt();
        re.iter_mut().for_each(|v| *v /= norm);
        im.iter_mut().for_each(|v| *v /= norm);

        Ok(Self {
            sigma,
            radius,
            re,
            im,
        })
    }

    pub fn side(&self) -> usize {
        2 * self.radius + 1
    }

    /// Σ|ψ|², 1 up to rounding.
    pub fn energy(&self) -> f64 {
        self.re.iter().zip(&self.im).map(|(a, b)| a * a + b * b).sum()
    }

    /// Complex correlation with the lattice at every pixel, mirrored borders.
    pub fn correlate(&self, lattice: &Lattice) -> (Vec<f64>, Vec<f64>) {
        let n = lattice.size();
        let side = self.side();
        let r = self.radius as isize;
        let mut out_re = vec![0.0; n * n];
        let mut out_im = vec![0.0; n * n];

        for y in 0..n {
            for x in 0..n {
                let mut acc_re = 0.0;
                let mut acc_im = 0.0;
                for ky in 0..side {
                    let sy = y as isize + ky as isize - r;
                    let row = ky * side;
                    for kx in 0..side {
                        let v = lattice.get_reflect(x as isize + kx as isize - r, sy);
                        acc_re += self.re[row + kx] * v;
                        acc_im += self.im[row + kx] * v;
                    }
                }
                out_re[y * n + x] = acc_re;
                out_im[y * n + x] = acc_im;
            }
        }
        (out_re, out_im)
    }
}

/// One kernel per ladder scale, built once and read every frame.
#[derive(Clone, Debug)]
pub struct WaveletBank {
    signature: PhaseSignature,
    orientation: f64,
    kernels: Vec<WaveletKernel>,
}

impl WaveletBank {
    pub fn new(
        ladder: &ScaleLadder,
        signature: PhaseSignature,
        orientation: f64,
        sigma0: f64,
    ) -> Result<Self> {
        let kernels = ladder
            .scales()
            .iter()
            .map(|&sigma| WaveletKernel::build(sigma, &signature, orientation, sigma0))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            signature,
            orientation,
            kernels,
        })
    }

    pub fn signature(&self) -> &PhaseSignature {
        &self.signature
    }

    pub fn orientation(&self) -> f64 {
        self.orientation
    }

    pub fn kernels(&self) -> &[WaveletKernel] {
        &self.kernels
    }

    pub fn generate(&self, lattice: &Lattice) -> EvidenceSet {
        let layers = self
            .kernels
            .iter()
            .map(|kernel| {
                let (re, im) = kernel.correlate(lattice);
                let mut magnitude: Vec<f64> =
                    re.iter().zip(&im).map(|(a, b)| (a * a + b * b).sqrt()).collect();
                let angle = re.iter().zip(&im).map(|(a, b)| wrap_phase(b.atan2(*a))).collect();
                normalize_by_max(&mut magnitude);
                trace!(sigma = kernel.sigma, radius = kernel.radius, "wavelet layer");
                EvidenceLayer {
                    sigma: kernel.sigma,
                    magnitude,
                    angle,
                }
            })
            .collect();
        EvidenceSet {
            size: lattice.size(),
            kind: EvidenceKind::Phase,
            layers,
        }
    }
}
