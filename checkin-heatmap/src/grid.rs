use ndarray::Array2;
use tracing::{trace, warn};

use crate::config::GridShape;
use crate::geometry::GeoPoint;

/// Row-major density grid. Rows run along longitude starting at the west
/// bound, columns along latitude starting at the north bound.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    shape: GridShape,
    cells: Array2<f64>,
}

impl DensityGrid {
    pub fn new(shape: GridShape) -> Self {
        Self {
            shape,
            cells: Array2::zeros((shape.rows, shape.cols)),
        }
    }

    pub fn rows(&self) -> usize {
        self.shape.rows
    }

    pub fn cols(&self) -> usize {
        self.shape.cols
    }

    pub fn cells(&self) -> &Array2<f64> {
        &self.cells
    }

    pub(crate) fn replace_cells(&mut self, cells: Array2<f64>) {
        debug_assert_eq!(cells.dim(), self.cells.dim());
        self.cells = cells;
    }

    /// Cell for `point` after rounding to whole millidegrees, or `None` if it
    /// falls outside the grid.
    pub fn cell_for(&self, point: &GeoPoint) -> Option<(usize, usize)> {
        let (lat, lon) = point.to_millidegrees();
        let row = self.shape.west_millideg - lon;
        let col = self.shape.north_millideg - lat;
        if row < 0 || col < 0 {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        (row < self.shape.rows && col < self.shape.cols).then_some((row, col))
    }

    /// Count `point` in its cell. Returns false if the point was dropped.
    pub fn add(&mut self, point: &GeoPoint) -> bool {
        match self.cell_for(point) {
            Some((row, col)) => {
                self.cells[[row, col]] += 1.0;
                true
            }
            None => {
                trace!(
                    "Dropping {}: outside the {}x{} grid",
                    point,
                    self.shape.rows,
                    self.shape.cols
                );
                false
            }
        }
    }

    pub fn max_value(&self) -> f64 {
        self.cells.iter().copied().fold(0.0, f64::max)
    }

    pub fn min_value(&self) -> f64 {
        self.cells.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn total(&self) -> f64 {
        self.cells.sum()
    }

    /// Rescale so the largest cell equals `range_factor`. An all-zero grid is
    /// left untouched. Returns the maximum seen before rescaling.
    pub fn normalize(&mut self, range_factor: f64) -> f64 {
        let largest = self.max_value();
        if largest == 0.0 {
            warn!("No check-ins fell inside the grid; skipping normalization");
            return largest;
        }
        let scale = range_factor / largest;
        self.cells.mapv_inplace(|v| v * scale);
        largest
    }
}

/// Result of binning a stream of points.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BinCounts {
    pub binned: usize,
    pub out_of_grid: usize,
}

pub fn bin_points<'a, I>(grid: &mut DensityGrid, points: I) -> BinCounts
where
    I: IntoIterator<Item = &'a GeoPoint>,
{
    let mut counts = BinCounts::default();
    for point in points {
        if grid.add(point) {
            counts.binned += 1;
        } else {
            counts.out_of_grid += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeatmapConfig;
    use approx::assert_relative_eq;

    fn reference_grid() -> DensityGrid {
        DensityGrid::new(HeatmapConfig::default().grid_shape().unwrap())
    }

    #[test]
    fn starts_zeroed_with_reference_dimensions() {
        let grid = reference_grid();
        assert_eq!(grid.cells().dim(), (132, 96));
        assert_eq!(grid.max_value(), 0.0);
        assert_eq!(grid.total(), 0.0);
    }

    #[test]
    fn maps_like_fractional_offset_from_corner() {
        let grid = reference_grid();
        // 974 - 900 and 425 - 370
        let point = GeoPoint { latitude: 52.37, longitude: 4.9 };
        assert_eq!(grid.cell_for(&point), Some((74, 55)));
        let corner = GeoPoint { latitude: 52.4249, longitude: 4.9739 };
        assert_eq!(grid.cell_for(&corner), Some((0, 0)));
    }

    #[test]
    fn points_rounding_together_share_a_cell() {
        let mut grid = reference_grid();
        let a = GeoPoint { latitude: 52.37012, longitude: 4.90004 };
        let b = GeoPoint { latitude: 52.36951, longitude: 4.89960 };
        assert_eq!(grid.cell_for(&a), grid.cell_for(&b));
        let counts = bin_points(&mut grid, [a, b].iter());
        assert_eq!(counts, BinCounts { binned: 2, out_of_grid: 0 });
        assert_eq!(grid.cells()[[74, 55]], 2.0);
    }

    #[test]
    fn rounding_onto_the_far_edge_is_dropped() {
        let mut grid = reference_grid();
        // inside the box, but rounds to 52.328 -> column 97
        let south = GeoPoint { latitude: 52.3281, longitude: 4.9 };
        // rounds to 52.329 -> column 96, one past the last column
        let near_south = GeoPoint { latitude: 52.329, longitude: 4.9 };
        assert_eq!(grid.cell_for(&south), None);
        assert_eq!(grid.cell_for(&near_south), None);
        let counts = bin_points(&mut grid, [south, near_south].iter());
        assert_eq!(counts, BinCounts { binned: 0, out_of_grid: 2 });
        assert_eq!(grid.total(), 0.0);
    }

    #[test]
    fn points_from_another_degree_are_dropped() {
        let grid = reference_grid();
        assert_eq!(grid.cell_for(&GeoPoint { latitude: 53.37, longitude: 4.9 }), None);
        assert_eq!(grid.cell_for(&GeoPoint { latitude: 52.37, longitude: 3.9 }), None);
    }

    #[test]
    fn normalize_scales_peak_to_range_factor() {
        let mut grid = reference_grid();
        let points = [
            GeoPoint { latitude: 52.37, longitude: 4.9 },
            GeoPoint { latitude: 52.37, longitude: 4.9 },
            GeoPoint { latitude: 52.40, longitude: 4.95 },
        ];
        bin_points(&mut grid, points.iter());
        let largest = grid.normalize(500.0);
        assert_eq!(largest, 2.0);
        assert_relative_eq!(grid.max_value(), 500.0, epsilon = 1e-9);
        assert_relative_eq!(grid.cells()[[24, 25]], 250.0, epsilon = 1e-9);
        assert!(grid.min_value() >= 0.0);
    }

    #[test]
    fn normalize_leaves_empty_grid_at_zero() {
        let mut grid = reference_grid();
        assert_eq!(grid.normalize(15.0), 0.0);
        assert!(grid.cells().iter().all(|v| *v == 0.0));
    }
}
