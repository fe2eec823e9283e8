//! The persistent edge field φ(t, x, y, σ) and its action-functional update.
//!
//! Each frame takes one gradient-descent step on
//!
//! ```text
//! S[φ] = temporal + c²·spatial + α²·scale + β·‖φ − evidence‖²
//! ```
//!
//! starting from the previous frame's slice (warm start), then aggregates
//! across scales into a 2-D edge map.
//!
//! The temporal term ½‖φ_t − φ_{t−1}‖² is taken semi-implicitly (a proximal
//! step), so with a retained previous slice the update is
//!
//! ```text
//! φ_t = (φ_{t−1} − lr·∇(spatial + scale + data) + lr·φ_{t−1}) / (1 + lr)
//! ```
//!
//! which resists any change away from the previous frame. On the first frame
//! there is nothing to anchor to and the step is fully explicit.
//!
//! Storage is dense: one `scales × size × size` buffer per retained frame,
//! indexed `(scale, y, x)`, in a ring of at most [`HISTORY_DEPTH`] slices.
//! Evicted buffers are recycled for the next frame.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{EPSILON, HISTORY_DEPTH};
use crate::error::{FieldError, Result};
use crate::evidence::EvidenceSet;
use crate::ladder::{ScaleLadder, ScaleWeights};

/// Coupling constants read by [`FieldEstimator::update`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gains {
    /// Spatial coupling c.
    pub c: f64,
    /// Scale coupling α.
    pub alpha: f64,
    /// Data fidelity β.
    pub beta: f64,
}

impl Gains {
    pub fn new(c: f64, alpha: f64, beta: f64) -> Self {
        Self { c, alpha, beta }
    }

    fn validate(&self) -> Result<()> {
        for (name, v) in [("c", self.c), ("alpha", self.alpha), ("beta", self.beta)] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(FieldError::InvalidConfig(format!(
                    "gain {name} must be finite and non-negative, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Summary of one `update` call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UpdateStats {
    pub t: u64,
    /// Mean |φ_t − φ_{t−1}| over the whole slice.
    pub mean_change: f64,
    /// Mean |data-term gradient|.
    pub data_gradient_mean: f64,
    pub max_gradient: f64,
    /// Ladder scales the evidence did not cover (treated as zero evidence).
    pub missing_scales: usize,
}

/// Scale-aggregated, thresholded edge confidence for one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EdgeMap {
    pub t: u64,
    pub size: usize,
    pub values: Vec<f64>,
}

impl EdgeMap {
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.values[y * self.size + x]
    }

    pub fn edge_pixels(&self) -> usize {
        self.values.iter().filter(|v| **v > 0.0).count()
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }
}

#[derive(Clone, Debug)]
struct Slice {
    t: u64,
    values: Vec<f64>,
}

#[derive(Clone, Debug)]
pub struct FieldEstimator {
    size: usize,
    ladder: ScaleLadder,
    weights: ScaleWeights,
    history: VecDeque<Slice>,
}

impl FieldEstimator {
    pub fn new(size: usize, ladder: ScaleLadder, scale_weight_exponent: f64) -> Result<Self> {
        if size == 0 {
            return Err(FieldError::InvalidLattice("field size must be positive".into()));
        }
        if !scale_weight_exponent.is_finite() {
            return Err(FieldError::InvalidConfig(format!(
                "scale weight exponent must be finite, got {scale_weight_exponent}"
            )));
        }
        let weights = ladder.weights(scale_weight_exponent);
        let total = weights.total();
        let overflowed = weights.as_slice().iter().any(|w| !w.is_finite());
        if overflowed || !(total.is_finite() && total > EPSILON) {
            return Err(FieldError::InvalidConfig(format!(
                "scale weight exponent {scale_weight_exponent} gives unusable weights \
                 (total {total}) for ladder {:?}",
                ladder.scales()
            )));
        }
        Ok(Self {
            size,
            ladder,
            weights,
            history: VecDeque::with_capacity(HISTORY_DEPTH),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn ladder(&self) -> &ScaleLadder {
        &self.ladder
    }

    pub fn weights(&self) -> &ScaleWeights {
        &self.weights
    }

    fn slice_len(&self) -> usize {
        self.ladder.len() * self.size * self.size
    }

    fn index(&self, s: usize, x: usize, y: usize) -> usize {
        (s * self.size + y) * self.size + x
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Retained frame indices, oldest first.
    pub fn retained_frames(&self) -> Vec<u64> {
        self.history.iter().map(|s| s.t).collect()
    }

    pub fn latest_frame(&self) -> Option<u64> {
        self.history.back().map(|s| s.t)
    }

    fn find(&self, t: u64) -> Option<&Slice> {
        self.history.iter().find(|s| s.t == t)
    }

    /// Whole `(scale, y, x)` slice for frame `t`.
    pub fn slice(&self, t: u64) -> Option<&[f64]> {
        self.find(t).map(|s| s.values.as_slice())
    }

    pub fn value(&self, t: u64, x: usize, y: usize, scale_index: usize) -> Option<f64> {
        if x >= self.size || y >= self.size || scale_index >= self.ladder.len() {
            return None;
        }
        let i = self.index(scale_index, x, y);
        self.find(t).map(|s| s.values[i])
    }

    /// Drop all history. Gains live elsewhere and are unaffected.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Mean |φ_t − φ_{t−1}| between the two newest slices; 0 with fewer than two.
    pub fn motion(&self) -> f64 {
        let n = self.history.len();
        if n < 2 {
            return 0.0;
        }
        let newest = &self.history[n - 1].values;
        let previous = &self.history[n - 2].values;
        let total: f64 = newest.iter().zip(previous).map(|(a, b)| (a - b).abs()).sum();
        total / newest.len() as f64
    }

    /// One warm-started gradient-descent step for frame `t`.
    ///
    /// Everything is validated before history is touched, so a rejected frame
    /// leaves φ exactly as it was.
    pub fn update(
        &mut self,
        t: u64,
        evidence: &EvidenceSet,
        gains: &Gains,
        learning_rate: f64,
    ) -> Result<UpdateStats> {
        if evidence.size() != self.size {
            return Err(FieldError::SizeMismatch {
                expected: self.size,
                actual: evidence.size(),
            });
        }
        if let Some(last) = self.latest_frame()
            && t <= last
        {
            return Err(FieldError::FrameOrder { last, got: t });
        }
        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return Err(FieldError::InvalidConfig(format!(
                "learning rate must be positive and finite, got {learning_rate}"
            )));
        }
        gains.validate()?;

        let n = self.size;
        let scales = self.ladder.len();
        let observed: Vec<Option<&[f64]>> = self
            .ladder
            .scales()
            .iter()
            .map(|&sigma| evidence.layer_for(sigma).map(|l| l.magnitude.as_slice()))
            .collect();
        let missing_scales = observed.iter().filter(|o| o.is_none()).count();
        if missing_scales > 0 {
            debug!(t, missing_scales, "evidence missing at some scales, treating as zero");
        }

        // Proximal temporal term: the new value is tied to φ_{t−1} whenever a
        // previous slice exists.
        let anchored = !self.history.is_empty();
        let mut next = self.recycle_buffer();

        let zeros;
        let prev: &[f64] = match self.history.back() {
            Some(s) => &s.values,
            None => {
                zeros = vec![0.0; self.slice_len()];
                &zeros
            }
        };

        let c2 = gains.c * gains.c;
        let a2 = gains.alpha * gains.alpha;
        let two_beta = 2.0 * gains.beta;
        let inertia = 1.0 + learning_rate;

        let mut change_sum = 0.0;
        let mut data_sum = 0.0;
        let mut max_gradient = 0.0f64;

        for s in 0..scales {
            let ev = observed[s];
            for y in 0..n {
                let up = y.saturating_sub(1);
                let down = (y + 1).min(n - 1);
                for x in 0..n {
                    let left = x.saturating_sub(1);
                    let right = (x + 1).min(n - 1);
                    let i = self.index(s, x, y);
                    let phi = prev[i];

                    let neighbours = prev[self.index(s, left, y)]
                        + prev[self.index(s, right, y)]
                        + prev[self.index(s, x, up)]
                        + prev[self.index(s, x, down)];
                    let spatial = -c2 * (neighbours / 4.0 - phi);

                    let scale = if scales > 1 {
                        let mut sum = 0.0;
                        let mut count = 0.0;
                        if s > 0 {
                            sum += prev[self.index(s - 1, x, y)];
                            count += 1.0;
                        }
                        if s + 1 < scales {
                            sum += prev[self.index(s + 1, x, y)];
                            count += 1.0;
                        }
                        -a2 * (sum / count - phi)
                    } else {
                        0.0
                    };

                    let e = ev.map_or(0.0, |m| sanitize(m[y * n + x]));
                    let data = two_beta * (phi - e);

                    let gradient = spatial + scale + data;
                    let stepped = if anchored {
                        (phi - learning_rate * gradient + learning_rate * phi) / inertia
                    } else {
                        phi - learning_rate * gradient
                    };
                    let updated = stepped.clamp(0.0, 1.0);
                    next[i] = updated;

                    change_sum += (updated - phi).abs();
                    data_sum += data.abs();
                    max_gradient = max_gradient.max(gradient.abs());
                }
            }
        }

        let cells = self.slice_len() as f64;
        let stats = UpdateStats {
            t,
            mean_change: change_sum / cells,
            data_gradient_mean: data_sum / cells,
            max_gradient,
            missing_scales,
        };
        self.history.push_back(Slice { t, values: next });
        debug!(
            t,
            mean_change = stats.mean_change,
            max_gradient = stats.max_gradient,
            retained = self.history.len(),
            "field updated"
        );
        Ok(stats)
    }

    /// Take the oldest slice's buffer once the ring is full, else allocate.
    fn recycle_buffer(&mut self) -> Vec<f64> {
        if self.history.len() >= HISTORY_DEPTH
            && let Some(old) = self.history.pop_front()
        {
            return old.values;
        }
        vec![0.0; self.slice_len()]
    }

    /// Scale-weighted mean of φ at frame `t`, zeroed at or below `threshold`.
    pub fn extract_edges(&self, t: u64, threshold: f64) -> Result<EdgeMap> {
        let slice = self.find(t).ok_or(FieldError::FrameNotRetained(t))?;
        let n = self.size;
        let total = self.weights.total();
        let mut values = vec![0.0; n * n];
        if total <= EPSILON {
            return Ok(EdgeMap { t, size: n, values });
        }
        for y in 0..n {
            for x in 0..n {
                let weighted: f64 = (0..self.ladder.len())
                    .map(|s| self.weights.get(s) * slice.values[self.index(s, x, y)])
                    .sum();
                let v = weighted / total;
                values[y * n + x] = if v > threshold { v } else { 0.0 };
            }
        }
        Ok(EdgeMap { t, size: n, values })
    }

    pub fn latest_edges(&self, threshold: f64) -> Result<EdgeMap> {
        let t = self.latest_frame().ok_or(FieldError::NoFrames)?;
        self.extract_edges(t, threshold)
    }
}

/// Non-finite evidence is "no signal"; the rest is clamped into [0, 1].
fn sanitize(e: f64) -> f64 {
    if e.is_finite() { e.clamp(0.0, 1.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    use crate::evidence::{EvidenceKind, EvidenceLayer};
    use crate::ladder::Spacing;

    fn ladder(count: usize) -> ScaleLadder {
        ScaleLadder::generate(0.5, 4.0, count, Spacing::Dyadic).unwrap()
    }

    fn defaults() -> Gains {
        Gains::new(1.0, 1.0, 0.5)
    }

    #[test]
    fn test_first_frame_moves_toward_evidence() {
        let mut est = FieldEstimator::new(4, ladder(2), 0.0).unwrap();
        let ev = EvidenceSet::constant(4, est.ladder().scales(), 1.0);
        let stats = est.update(0, &ev, &defaults(), 0.1).unwrap();
        // zero field, flat evidence: only the data term acts, 2β·(0 − 1) = −1
        for v in est.slice(0).unwrap() {
            assert_relative_eq!(*v, 0.1, epsilon = 1e-12);
        }
        assert_relative_eq!(stats.mean_change, 0.1, epsilon = 1e-12);
        assert_eq!(stats.missing_scales, 0);
    }

    #[test]
    fn test_missing_scale_pulls_to_zero() {
        let mut est = FieldEstimator::new(3, ladder(2), 0.0).unwrap();
        let full = EvidenceSet::constant(3, est.ladder().scales(), 1.0);
        let gains = Gains::new(0.0, 0.0, 5.0);
        est.update(0, &full, &gains, 0.1).unwrap();

        let partial = EvidenceSet::constant(3, &[0.5], 1.0);
        let stats = est.update(1, &partial, &gains, 0.1).unwrap();
        assert_eq!(stats.missing_scales, 1);
        assert!(est.value(1, 1, 1, 1).unwrap() < est.value(1, 1, 1, 0).unwrap());
    }

    #[test]
    fn test_temporal_term_damps_alternating_evidence() {
        let mut est = FieldEstimator::new(2, ladder(1), 0.0).unwrap();
        let on = EvidenceSet::constant(2, est.ladder().scales(), 1.0);
        let off = EvidenceSet::constant(2, est.ladder().scales(), 0.0);
        let lr = 0.1;

        // same uniform field stepped on the data term alone
        let mut explicit = Vec::new();
        let mut phi = 0.0f64;
        for t in 0..200u64 {
            let e = if t % 2 == 0 { 1.0 } else { 0.0 };
            phi = (phi - lr * 2.0 * 0.5 * (phi - e)).clamp(0.0, 1.0);
            explicit.push(phi);
            let ev = if t % 2 == 0 { &on } else { &off };
            est.update(t, ev, &defaults(), lr).unwrap();
        }

        let swing = (est.value(199, 0, 0, 0).unwrap() - est.value(198, 0, 0, 0).unwrap()).abs();
        let undamped = (explicit[199] - explicit[198]).abs();
        assert!(swing < undamped, "swing {swing} vs {undamped} without the temporal term");
        assert_relative_eq!(est.motion(), swing, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_overflowing_scale_weights() {
        let err = FieldEstimator::new(4, ladder(5), 1100.0).unwrap_err();
        assert!(matches!(err, FieldError::InvalidConfig(_)), "{err}");

        let est = FieldEstimator::new(4, ladder(5), 1.0).unwrap();
        assert!(est.weights().total().is_finite());
        assert_relative_eq!(est.weights().get(0), 4.0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut est = FieldEstimator::new(2, ladder(1), 0.0).unwrap();
        let ev = EvidenceSet::constant(2, est.ladder().scales(), 0.5);
        for t in 0..25 {
            est.update(t, &ev, &defaults(), 0.1).unwrap();
        }
        assert_eq!(est.history_len(), HISTORY_DEPTH);
        assert_eq!(est.retained_frames().first(), Some(&15));
        assert!(matches!(
            est.extract_edges(3, 0.3),
            Err(FieldError::FrameNotRetained(3))
        ));
    }

    #[test]
    fn test_rejected_frame_leaves_field_untouched() {
        let mut est = FieldEstimator::new(4, ladder(2), 0.0).unwrap();
        let ev = EvidenceSet::constant(4, est.ladder().scales(), 0.8);
        est.update(5, &ev, &defaults(), 0.1).unwrap();
        let before = est.slice(5).unwrap().to_vec();

        assert!(matches!(
            est.update(5, &ev, &defaults(), 0.1),
            Err(FieldError::FrameOrder { last: 5, got: 5 })
        ));
        let wrong = EvidenceSet::constant(8, est.ladder().scales(), 0.8);
        assert!(matches!(
            est.update(6, &wrong, &defaults(), 0.1),
            Err(FieldError::SizeMismatch { expected: 4, actual: 8 })
        ));
        assert!(est.update(6, &ev, &defaults(), f64::NAN).is_err());
        assert!(est.update(6, &ev, &Gains::new(-1.0, 1.0, 1.0), 0.1).is_err());

        assert_eq!(est.history_len(), 1);
        assert_eq!(est.slice(5).unwrap(), before.as_slice());
    }

    #[test]
    fn test_evidence_at_fixed_point_has_no_data_gradient() {
        let mut est = FieldEstimator::new(5, ladder(3), 0.0).unwrap();
        let ev = EvidenceSet::constant(5, est.ladder().scales(), 0.6);
        est.update(0, &ev, &defaults(), 0.1).unwrap();

        let slice = est.slice(0).unwrap();
        let cells = 25;
        let layers = est
            .ladder()
            .scales()
            .iter()
            .enumerate()
            .map(|(s, &sigma)| EvidenceLayer {
                sigma,
                magnitude: slice[s * cells..(s + 1) * cells].to_vec(),
                angle: vec![0.0; cells],
            })
            .collect();
        let same = EvidenceSet::from_layers(5, EvidenceKind::Gradient, layers).unwrap();
        let stats = est.update(1, &same, &defaults(), 0.1).unwrap();
        assert!(stats.data_gradient_mean.abs() < 1e-12);
    }

    #[test]
    fn test_large_beta_tracks_evidence() {
        let mut est = FieldEstimator::new(6, ladder(3), 0.0).unwrap();
        let ev = EvidenceSet::constant(6, est.ladder().scales(), 0.7);
        let gains = Gains::new(1.0, 1.0, 5.0);
        est.update(0, &ev, &gains, 0.1).unwrap();
        assert!(est.slice(0).unwrap().iter().all(|v| (v - 0.7).abs() < 1e-9));
        est.update(1, &ev, &gains, 0.1).unwrap();
        assert!(est.slice(1).unwrap().iter().all(|v| (v - 0.7).abs() < 0.1));
    }

    #[test]
    fn test_zero_beta_flattens_instead_of_tracking() {
        let n = 8;
        let mut est = FieldEstimator::new(n, ladder(1), 0.0).unwrap();
        // seed a jagged checkerboard with a brief high-fidelity frame
        let board: Vec<f64> = (0..n * n).map(|i| ((i / n + i % n) % 2) as f64).collect();
        let seed = EvidenceSet::from_layers(
            n,
            EvidenceKind::Gradient,
            vec![EvidenceLayer {
                sigma: 0.5,
                magnitude: board,
                angle: vec![0.0; n * n],
            }],
        )
        .unwrap();
        est.update(0, &seed, &Gains::new(0.0, 0.0, 5.0), 0.1).unwrap();

        let spread = |v: &[f64]| {
            let max = v.iter().copied().fold(f64::MIN, f64::max);
            let min = v.iter().copied().fold(f64::MAX, f64::min);
            max - min
        };
        assert_relative_eq!(spread(est.slice(0).unwrap()), 1.0, epsilon = 1e-9);

        let constant = EvidenceSet::constant(n, &[0.5], 1.0);
        for t in 1..40 {
            est.update(t, &constant, &Gains::new(1.0, 1.0, 0.0), 0.1).unwrap();
        }
        let last = est.slice(39).unwrap();
        assert!(spread(last) < 0.2, "field should flatten, spread = {}", spread(last));
        let mean = last.iter().sum::<f64>() / last.len() as f64;
        assert!((mean - 0.5).abs() < 0.1, "mean should stay near 0.5, got {mean}");
    }

    #[test]
    fn test_zero_field_extracts_zero_map() {
        let mut est = FieldEstimator::new(6, ladder(3), 0.0).unwrap();
        let ev = EvidenceSet::constant(6, est.ladder().scales(), 0.0);
        est.update(0, &ev, &defaults(), 0.1).unwrap();
        for threshold in [0.0, 0.3, 0.99] {
            let map = est.extract_edges(0, threshold).unwrap();
            assert!(map.values.iter().all(|v| *v == 0.0));
            assert_eq!(map.edge_pixels(), 0);
        }
    }

    #[test]
    fn test_extract_weights_fine_scales_more() {
        let n = 2;
        let l = ladder(2);
        let mut est = FieldEstimator::new(n, l, 0.0).unwrap();
        let layers = vec![
            EvidenceLayer {
                sigma: 0.5,
                magnitude: vec![1.0; 4],
                angle: vec![0.0; 4],
            },
            EvidenceLayer {
                sigma: 1.0,
                magnitude: vec![0.0; 4],
                angle: vec![0.0; 4],
            },
        ];
        let ev = EvidenceSet::from_layers(n, EvidenceKind::Gradient, layers).unwrap();
        est.update(0, &ev, &Gains::new(0.0, 0.0, 5.0), 0.1).unwrap();
        // φ = (1, 0) per scale, w = (2, 1) → 2/3
        let map = est.extract_edges(0, 0.3).unwrap();
        assert_relative_eq!(map.get(1, 1), 2.0 / 3.0, epsilon = 1e-9);
        let strict = est.extract_edges(0, 0.7).unwrap();
        assert_eq!(strict.max(), 0.0);
    }

    #[test]
    fn test_motion_measures_latest_change() {
        let mut est = FieldEstimator::new(3, ladder(1), 0.0).unwrap();
        assert_eq!(est.motion(), 0.0);
        let ev = EvidenceSet::constant(3, est.ladder().scales(), 1.0);
        est.update(0, &ev, &defaults(), 0.1).unwrap();
        assert_eq!(est.motion(), 0.0);
        est.update(1, &ev, &defaults(), 0.1).unwrap();
        let expected = est.value(1, 0, 0, 0).unwrap() - est.value(0, 0, 0, 0).unwrap();
        assert_relative_eq!(est.motion(), expected.abs(), epsilon = 1e-12);
        est.reset();
        assert_eq!(est.history_len(), 0);
        assert_eq!(est.latest_edges(0.3), Err(FieldError::NoFrames));
    }

    proptest! {
        #[test]
        fn prop_field_stays_in_unit_interval(
            frames in proptest::collection::vec(proptest::collection::vec(-5.0f64..5.0, 16), 1..12),
            c in 0.0f64..3.0,
            alpha in 0.0f64..2.0,
            beta in 0.0f64..1.0,
        ) {
            let mut est = FieldEstimator::new(4, ladder(2), 0.0).unwrap();
            for (t, magnitudes) in frames.iter().enumerate() {
                let layers = est
                    .ladder()
                    .scales()
                    .iter()
                    .map(|&sigma| EvidenceLayer {
                        sigma,
                        magnitude: magnitudes.clone(),
                        angle: vec![0.0; 16],
                    })
                    .collect();
                let ev = EvidenceSet::from_layers(4, EvidenceKind::Gradient, layers).unwrap();
                est.update(t as u64, &ev, &Gains::new(c, alpha, beta), 0.1).unwrap();
                let slice = est.slice(t as u64).unwrap();
                prop_assert!(slice.iter().all(|v| (0.0..=1.0).contains(v)));
            }
        }
    }
}
