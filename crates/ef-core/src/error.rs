use std::fmt;

/// Precondition violations raised by the core.
///
/// Degenerate evidence (all-zero frames, missing scales) is never an error;
/// it flows through as "no signal".
#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    /// Lattice is not square, empty, mis-sized, or holds non-finite samples.
    InvalidLattice(String),
    /// Scale ladder is empty, non-positive, or not strictly increasing.
    InvalidLadder(String),
    /// Two grids that must share a side length do not.
    SizeMismatch { expected: usize, actual: usize },
    /// A configuration value is out of range.
    InvalidConfig(String),
    /// A frame index did not advance past the newest retained frame.
    FrameOrder { last: u64, got: u64 },
    /// The requested frame has been pruned or never existed.
    FrameNotRetained(u64),
    /// Nothing has been processed yet.
    NoFrames,
    /// A wavelet kernel has no energy to normalise.
    DegenerateKernel { sigma: f64 },
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::InvalidLattice(msg) => write!(f, "invalid lattice: {msg}"),
            FieldError::InvalidLadder(msg) => write!(f, "invalid scale ladder: {msg}"),
            FieldError::SizeMismatch { expected, actual } => {
                write!(f, "size mismatch: expected {expected}x{expected}, got {actual}x{actual}")
            }
            FieldError::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            FieldError::FrameOrder { last, got } => {
                write!(f, "frame {got} does not follow retained frame {last}")
            }
            FieldError::FrameNotRetained(t) => {
                write!(f, "frame {t} is not in the retained history")
            }
            FieldError::NoFrames => write!(f, "no frame has been processed yet"),
            FieldError::DegenerateKernel { sigma } => {
                write!(f, "wavelet kernel at sigma={sigma} has zero energy")
            }
        }
    }
}

impl std::error::Error for FieldError {}

pub type Result<T> = std::result::Result<T, FieldError>;
