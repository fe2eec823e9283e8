//! Multi-scale edge field estimator.
//!
//! Turns noisy per-frame gradient evidence into an edge map that is stable
//! across time, space and zoom level. Evidence comes from a Sobel operator or
//! a phase-modulated complex wavelet bank; a persistent field φ(t, x, y, σ) is
//! regularised by one gradient-descent step per frame on an action functional
//! (temporal, spatial, scale and data terms); a gain scheduler retunes the
//! coupling constants from observed motion and cross-scale phase coherence.
//!
//! Zero I/O. Pure math engine with no opinions about frame sources or rendering.

pub mod config;
pub mod constants;
pub mod error;
pub mod evidence;
pub mod field;
pub mod ladder;
pub mod lattice;
pub mod phase;
pub mod pipeline;
pub mod scheduler;

pub use config::{EstimatorConfig, EvidenceConfig, LadderConfig, PipelineConfig, SchedulerConfig};
pub use constants::{
    COHERENCE_TOLERANCE, DELTA_THETA, FEIGENBAUM_DELTA, HISTORY_DEPTH, PHI, THETA_COARSE,
    THETA_FINE,
};
pub use error::{FieldError, Result};
pub use evidence::{
    EvidenceGenerator, EvidenceKind, EvidenceLayer, EvidenceSet, EvidenceStrategy, WaveletBank,
};
pub use field::{EdgeMap, FieldEstimator, Gains, UpdateStats};
pub use ladder::{ScaleLadder, ScaleWeights, Spacing};
pub use lattice::Lattice;
pub use phase::PhaseSignature;
pub use pipeline::{EdgePipeline, FrameOutput, FrameSlot};
pub use scheduler::{GainScheduler, Region, ScheduleReport, classify_region};
