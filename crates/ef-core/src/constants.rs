/// Golden ratio: (1 + √5) / 2
pub const PHI: f64 = 1.618_033_988_749_895;

/// Feigenbaum's first constant δ
pub const FEIGENBAUM_DELTA: f64 = 4.669_201_609_102_99;

/// Fine-scale phase signature θ1⋆ (radians per unit relative scale step)
pub const THETA_FINE: f64 = 4.710_818_049_8;

/// Coarse-scale phase signature θ2⋆
pub const THETA_COARSE: f64 = 2.332_444_834_4;

/// Rotation number Δθ⋆ = θ1⋆ − θ2⋆
pub const DELTA_THETA: f64 = THETA_FINE - THETA_COARSE;

/// Scale below which the fine signature applies. Tunable, not physical.
pub const FINE_COARSE_THRESHOLD: f64 = 1.0;

/// Circular tolerance (radians) for cross-scale phase coherence
pub const COHERENCE_TOLERANCE: f64 = 0.1;

/// Evidence magnitude a pixel needs before its phase counts toward coherence
pub const COHERENCE_MAGNITUDE_FLOOR: f64 = 0.2;

/// Number of φ slices retained by the estimator
pub const HISTORY_DEPTH: usize = 10;

/// Numerical epsilon for near-zero comparisons
pub const EPSILON: f64 = 1e-10;

/// Relative tolerance used when matching an evidence layer to a ladder scale
pub const SCALE_MATCH_TOLERANCE: f64 = 1e-9;
