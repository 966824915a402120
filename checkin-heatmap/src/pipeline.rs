use std::io::BufRead;
use std::path::Path;

use tracing::{debug, info, span, Level};

use crate::config::HeatmapConfig;
use crate::error::Result;
use crate::extract::GeoRecords;
use crate::geometry::GeoPoint;
use crate::grid::{bin_points, DensityGrid};
use crate::{input, output, smoothing};

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub lines_read: usize,
    pub geo_records: usize,
    pub malformed_skipped: usize,
    pub points_kept: usize,
    pub out_of_grid: usize,
    /// Largest cell count before normalization.
    pub max_count: f64,
    pub rows: usize,
    pub cols: usize,
}

/// Extract and filter: every geo-tagged point strictly inside the box.
pub fn collect_points<R: BufRead>(
    reader: R,
    config: &HeatmapConfig,
    summary: &mut RunSummary,
) -> Result<Vec<GeoPoint>> {
    let _span = span!(Level::DEBUG, "collect_points").entered();

    let mut records = GeoRecords::new(reader, &config.extract);
    let mut kept = Vec::new();
    for point in records.by_ref() {
        let point = point?;
        if config.bounds.contains(&point) {
            kept.push(point);
        }
    }
    summary.lines_read = records.lines_read();
    summary.geo_records = records.geo_records();
    summary.malformed_skipped = records.malformed_skipped();
    summary.points_kept = kept.len();
    info!("There have been {} check-ins inside {}", kept.len(), config.bounds);
    Ok(kept)
}

/// Run every stage on an already opened reader and return the smoothed grid.
pub fn build_grid<R: BufRead>(
    reader: R,
    config: &HeatmapConfig,
) -> Result<(DensityGrid, RunSummary)> {
    config.validate()?;
    let mut summary = RunSummary::default();
    let points = collect_points(reader, config, &mut summary)?;

    let mut grid = DensityGrid::new(config.grid_shape()?);
    summary.rows = grid.rows();
    summary.cols = grid.cols();
    {
        let _span = span!(Level::DEBUG, "bin_points", points = points.len()).entered();
        let counts = bin_points(&mut grid, &points);
        debug!(
            "Binned {} points, {} outside the grid",
            counts.binned, counts.out_of_grid
        );
        summary.out_of_grid = counts.out_of_grid;
    }

    summary.max_count = grid.normalize(config.grid.range_factor);
    info!("Largest value is {}", summary.max_count);

    let smoothed =
        smoothing::gaussian_blur(grid.cells(), config.grid.sigma, config.grid.boundary)?;
    grid.replace_cells(smoothed);
    debug!(
        "Smoothed grid: min {:.6}, max {:.6}, total {:.6}",
        grid.min_value(),
        grid.max_value(),
        grid.total()
    );
    Ok((grid, summary))
}

/// Read `input_path`, build the heatmap and write it to `output_path`.
pub fn run(config: &HeatmapConfig, input_path: &Path, output_path: &Path) -> Result<RunSummary> {
    let _span = span!(Level::INFO, "run", input = %input_path.display()).entered();

    let reader = input::open(input_path)?;
    let (grid, summary) = build_grid(reader, config)?;
    output::save_matrix(grid.cells(), output_path)?;
    info!(
        "Wrote {}x{} grid to {} ({} lines, {} of {} geo records kept, \
         {} outside the grid, {} malformed skipped)",
        summary.rows,
        summary.cols,
        output_path.display(),
        summary.lines_read,
        summary.points_kept,
        summary.geo_records,
        summary.out_of_grid,
        summary.malformed_skipped,
    );
    Ok(summary)
}
