//! Run configuration: bounding box, grid and extraction settings.
//!
//! Values come from the built-in defaults, optionally overridden by a TOML
//! file, and finally by command-line flags (see `main.rs`).

use std::path::Path;

use serde::Deserialize;

use crate::error::{HeatmapError, Result};
use crate::geometry::{round_to_millidegrees, BoundingBox};

/// Edge handling for the Gaussian convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryMode {
    /// Mirror about the outer cell edge: `d c b a | a b c d | d c b a`.
    #[default]
    Reflect,
    /// Treat everything outside the grid as zero.
    Constant,
}

/// What to do with a geo-tagged line that cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    #[default]
    Fail,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    /// The grid maximum is rescaled to this value before smoothing.
    pub range_factor: f64,
    /// Standard deviation of the blur, in cells.
    pub sigma: f64,
    pub boundary: BoundaryMode,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            range_factor: 15.0,
            sigma: 1.5,
            boundary: BoundaryMode::Reflect,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExtractSettings {
    pub tag: String,
    /// Number of characters skipped before the coordinate fields start.
    pub offset: usize,
    pub malformed: MalformedPolicy,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            tag: "GEO".to_string(),
            offset: 4,
            malformed: MalformedPolicy::Fail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct HeatmapConfig {
    pub bounds: BoundingBox,
    pub grid: GridSettings,
    pub extract: ExtractSettings,
}

/// Upper bound on rows x cols. A city-sized box needs a few tens of thousands.
pub const MAX_GRID_CELLS: usize = 4_000_000;

/// Upper bound on the blur sigma, in cells.
pub const MAX_SIGMA: f64 = 1000.0;

/// Grid dimensions and the millidegree anchor of its north-west corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
    pub north_millideg: i64,
    pub west_millideg: i64,
}

impl HeatmapConfig {
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| HeatmapError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HeatmapError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content, path)
    }

    pub fn validate(&self) -> Result<()> {
        let b = &self.bounds;
        if ![b.north, b.south, b.east, b.west].iter().all(|v| v.is_finite()) {
            return Err(HeatmapError::InvalidConfig(format!(
                "bounding box must be finite: {}",
                b
            )));
        }
        if b.south >= b.north {
            return Err(HeatmapError::InvalidConfig(format!(
                "south must be below north: {}",
                b
            )));
        }
        if b.east >= b.west {
            return Err(HeatmapError::InvalidConfig(format!(
                "east must be below west: {}",
                b
            )));
        }
        let shape = self.grid_shape()?;
        if shape.rows == 0 || shape.cols == 0 {
            return Err(HeatmapError::InvalidConfig(format!(
                "bounding box {} is too small for a millidegree grid",
                b
            )));
        }
        match shape.rows.checked_mul(shape.cols) {
            Some(cells) if cells <= MAX_GRID_CELLS => {}
            _ => {
                return Err(HeatmapError::InvalidConfig(format!(
                    "bounding box {} needs a {}x{} grid, more than {} cells",
                    b, shape.rows, shape.cols, MAX_GRID_CELLS
                )));
            }
        }
        let grid = &self.grid;
        if !(grid.range_factor.is_finite() && grid.range_factor > 0.0) {
            return Err(HeatmapError::InvalidConfig(format!(
                "range factor must be positive, got {}",
                grid.range_factor
            )));
        }
        if !(grid.sigma.is_finite() && grid.sigma > 0.0 && grid.sigma <= MAX_SIGMA) {
            return Err(HeatmapError::InvalidConfig(format!(
                "sigma must be in (0, {}], got {}",
                MAX_SIGMA, grid.sigma
            )));
        }
        if self.extract.tag.is_empty() {
            return Err(HeatmapError::InvalidConfig(
                "record tag must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// One cell per millidegree, minus one on each axis. Rows run along
    /// longitude (from west), columns along latitude (from north).
    pub fn grid_shape(&self) -> Result<GridShape> {
        let b = &self.bounds;
        let north = round_to_millidegrees(b.north);
        let south = round_to_millidegrees(b.south);
        let east = round_to_millidegrees(b.east);
        let west = round_to_millidegrees(b.west);
        let span = |high: i64, low: i64| -> Result<usize> {
            high.checked_sub(low)
                .and_then(|d| d.checked_sub(1))
                .map(|d| d.max(0) as usize)
                .ok_or_else(|| {
                    HeatmapError::InvalidConfig(format!("bounding box {} is too large", b))
                })
        };
        Ok(GridShape {
            rows: span(west, east)?,
            cols: span(north, south)?,
            north_millideg: north,
            west_millideg: west,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_shape_matches_reference_grid() {
        let shape = HeatmapConfig::default().grid_shape().unwrap();
        assert_eq!(shape.rows, 132);
        assert_eq!(shape.cols, 96);
        assert_eq!(shape.north_millideg, 52425);
        assert_eq!(shape.west_millideg, 4974);
    }

    #[test]
    fn defaults_are_valid() {
        HeatmapConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = HeatmapConfig::from_toml_str(
            "[grid]\nrange_factor = 500.0\nboundary = \"constant\"\n",
            Path::new("test.toml"),
        )
        .unwrap();
        assert_eq!(config.grid.range_factor, 500.0);
        assert_eq!(config.grid.sigma, 1.5);
        assert_eq!(config.grid.boundary, BoundaryMode::Constant);
        assert_eq!(config.bounds, BoundingBox::default());
        assert_eq!(config.extract.malformed, MalformedPolicy::Fail);
    }

    #[test]
    fn toml_can_override_bounds_and_policy() {
        let config = HeatmapConfig::from_toml_str(
            "[bounds]\nnorth = 52.5\n\n[extract]\nmalformed = \"skip\"\n",
            Path::new("test.toml"),
        )
        .unwrap();
        assert_eq!(config.bounds.north, 52.5);
        assert_eq!(config.bounds.south, 52.328);
        assert_eq!(config.extract.malformed, MalformedPolicy::Skip);
        assert_eq!(config.grid_shape().unwrap().cols, 171);
    }

    #[test]
    fn bad_toml_is_reported() {
        let err = HeatmapConfig::from_toml_str("[grid\n", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, HeatmapError::ConfigParse { .. }));
    }

    #[test]
    fn inverted_box_is_rejected() {
        let mut config = HeatmapConfig::default();
        config.bounds.south = 52.5;
        assert!(matches!(config.validate(), Err(HeatmapError::InvalidConfig(_))));

        let mut config = HeatmapConfig::default();
        config.bounds.east = 5.0;
        assert!(matches!(config.validate(), Err(HeatmapError::InvalidConfig(_))));
    }

    #[test]
    fn degenerate_box_is_rejected() {
        let mut config = HeatmapConfig::default();
        config.bounds.south = 52.424;
        assert!(matches!(config.validate(), Err(HeatmapError::InvalidConfig(_))));
    }

    #[test]
    fn non_positive_parameters_are_rejected() {
        let mut config = HeatmapConfig::default();
        config.grid.range_factor = 0.0;
        assert!(config.validate().is_err());

        let mut config = HeatmapConfig::default();
        config.grid.sigma = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = HeatmapConfig::default();
        config.grid.sigma = 1e300;
        assert!(matches!(config.validate(), Err(HeatmapError::InvalidConfig(_))));
    }

    #[test]
    fn huge_bounds_are_rejected_without_overflow() {
        let mut config = HeatmapConfig::default();
        config.bounds.east = -1e300;
        config.bounds.west = 1e300;
        assert!(matches!(config.grid_shape(), Err(HeatmapError::InvalidConfig(_))));
        assert!(matches!(config.validate(), Err(HeatmapError::InvalidConfig(_))));
    }

    #[test]
    fn world_sized_box_exceeds_cell_limit() {
        let mut config = HeatmapConfig::default();
        config.bounds = BoundingBox {
            north: 90.0,
            south: -90.0,
            east: -180.0,
            west: 180.0,
        };
        let shape = config.grid_shape().unwrap();
        assert_eq!((shape.rows, shape.cols), (359_999, 179_999));
        assert!(matches!(config.validate(), Err(HeatmapError::InvalidConfig(_))));
    }

    #[test]
    fn box_at_the_cell_limit_is_accepted() {
        let mut config = HeatmapConfig::default();
        // 2001 x 1999 cells
        config.bounds = BoundingBox {
            north: 53.0,
            south: 51.0,
            east: 4.0,
            west: 6.002,
        };
        let shape = config.grid_shape().unwrap();
        assert!(shape.rows * shape.cols <= MAX_GRID_CELLS);
        config.validate().unwrap();
    }
}
