//! Separable Gaussian blur over the density grid.
//!
//! The kernel is sampled at integer offsets, truncated at four standard
//! deviations (`radius = floor(4 * sigma + 0.5)`) and normalized to sum to
//! one, then applied along each axis in turn. With `BoundaryMode::Reflect`
//! the input is mirrored about the outer cell edge, which keeps the total
//! mass of the grid unchanged.

use ndarray::{Array2, Axis, Zip};
use tracing::{span, trace, Level};

use crate::config::BoundaryMode;
use crate::error::{HeatmapError, Result};

/// Number of standard deviations covered on each side of the kernel centre.
const TRUNCATE: f64 = 4.0;

pub fn kernel_radius(sigma: f64) -> usize {
    (TRUNCATE * sigma + 0.5) as usize
}

/// Normalized 1-D Gaussian weights for offsets `-radius..=radius`.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = kernel_radius(sigma) as isize;
    let mut weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x * x) as f64 / (sigma * sigma)).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= sum);
    weights
}

/// Map an out-of-range index back into `0..n` by repeated mirroring.
fn reflect_index(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize { m as usize } else { (period - 1 - m) as usize }
}

fn convolve_line(input: &[f64], kernel: &[f64], mode: BoundaryMode, out: &mut [f64]) {
    let n = input.len();
    let radius = (kernel.len() / 2) as isize;
    for (i, o) in out.iter_mut().enumerate() {
        let mut acc = 0.0;
        for (k, w) in kernel.iter().enumerate() {
            let j = i as isize + k as isize - radius;
            let value = if j >= 0 && (j as usize) < n {
                input[j as usize]
            } else {
                match mode {
                    BoundaryMode::Reflect => input[reflect_index(j, n)],
                    BoundaryMode::Constant => 0.0,
                }
            };
            acc += w * value;
        }
        *o = acc;
    }
}

fn convolve_axis(
    input: &Array2<f64>,
    kernel: &[f64],
    mode: BoundaryMode,
    axis: Axis,
) -> Array2<f64> {
    let mut output = Array2::zeros(input.dim());
    let mut line = Vec::with_capacity(input.len_of(axis));
    let mut result = vec![0.0; input.len_of(axis)];
    Zip::from(input.lanes(axis))
        .and(output.lanes_mut(axis))
        .for_each(|lane_in, mut lane_out| {
            line.clear();
            line.extend(lane_in.iter().copied());
            convolve_line(&line, kernel, mode, &mut result);
            lane_out.iter_mut().zip(&result).for_each(|(o, r)| *o = *r);
        });
    output
}

/// Blur `cells` with a Gaussian of standard deviation `sigma` (in cells).
/// Every cell must be finite on entry.
pub fn gaussian_blur(cells: &Array2<f64>, sigma: f64, mode: BoundaryMode) -> Result<Array2<f64>> {
    let _span = span!(Level::DEBUG, "gaussian_blur", sigma, ?mode).entered();

    if let Some(((row, col), value)) = cells.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(HeatmapError::NonFiniteCell { row, col, value: *value });
    }
    if cells.is_empty() {
        return Ok(cells.clone());
    }

    let kernel = gaussian_kernel(sigma);
    trace!("Kernel radius {}: {:?}", kernel.len() / 2, kernel);
    let blurred = convolve_axis(cells, &kernel, mode, Axis(0));
    Ok(convolve_axis(&blurred, &kernel, mode, Axis(1)))
}
