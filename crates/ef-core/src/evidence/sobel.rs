//! Real 3×3 Sobel gradient with mirrored borders.

use crate::lattice::Lattice;
use crate::phase::wrap_phase;

use super::normalize_by_max;

const KX: [[f64; 3]; 3] = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const KY: [[f64; 3]; 3] = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];

/// Returns `(magnitude, direction)`. Magnitude is divided by the frame
/// maximum; direction is `atan2(gy, gx)` in (−π, π].
pub fn sobel(lattice: &Lattice) -> (Vec<f64>, Vec<f64>) {
    let n = lattice.size();
    let mut magnitude = vec![0.0; n * n];
    let mut direction = vec![0.0; n * n];

    for y in 0..n {
        for x in 0..n {
            let mut gx = 0.0;
            let mut gy = 0.0;
            for (ky, (row_x, row_y)) in KX.iter().zip(KY.iter()).enumerate() {
                for kx in 0..3 {
                    let v = lattice
                        .get_reflect(x as isize + kx as isize - 1, y as isize + ky as isize - 1);
                    gx += row_x[kx] * v;
                    gy += row_y[kx] * v;
                }
            }
            let i = y * n + x;
            magnitude[i] = (gx * gx + gy * gy).sqrt();
            direction[i] = wrap_phase(gy.atan2(gx));
        }
    }

    normalize_by_max(&mut magnitude);
    (magnitude, direction)
}
