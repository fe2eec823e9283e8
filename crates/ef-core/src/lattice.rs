use crate::error::{FieldError, Result};

/// Square frame of luminance samples, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Lattice {
    size: usize,
    data: Vec<f64>,
}

impl Lattice {
    /// Build from a `width × height` buffer. Only square, finite frames are accepted.
    pub fn new(width: usize, height: usize, data: Vec<f64>) -> Result<Self> {
        if width != height {
            return Err(FieldError::InvalidLattice(format!(
                "lattice must be square, got {width}x{height}"
            )));
        }
        Self::square(width, data)
    }

    pub fn square(size: usize, data: Vec<f64>) -> Result<Self> {
        if size == 0 {
            return Err(FieldError::InvalidLattice("size must be positive".into()));
        }
        if data.len() != size * size {
            return Err(FieldError::InvalidLattice(format!(
                "expected {} samples for a {size}x{size} lattice, got {}",
                size * size,
                data.len()
            )));
        }
        if let Some(i) = data.iter().position(|v| !v.is_finite()) {
            return Err(FieldError::InvalidLattice(format!(
                "non-finite sample at ({}, {})",
                i % size,
                i / size
            )));
        }
        Ok(Self { size, data })
    }

    pub fn from_fn(size: usize, mut f: impl FnMut(usize, usize) -> f64) -> Result<Self> {
        let mut data = Vec::with_capacity(size * size);
        for y in 0..size {
            for x in 0..size {
                data.push(f(x, y));
            }
        }
        Self::square(size, data)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.size + x]
    }

    /// Sample with mirrored borders: (d c b a | a b c d | d c b a).
    pub fn get_reflect(&self, x: isize, y: isize) -> f64 {
        let rx = reflect_index(x, self.size);
        let ry = reflect_index(y, self.size);
        self.data[ry * self.size + rx]
    }
}

/// Reflect an out-of-range index back into `0..size`.
pub(crate) fn reflect_index(i: isize, size: usize) -> usize {
    let s = size as isize;
    let period = 2 * s;
    let m = i.rem_euclid(period);
    if m < s { m as usize } else { (period - 1 - m) as usize }
}
