mod config;
mod error;
mod extract;
mod geometry;
mod grid;
mod input;
mod output;
mod pipeline;
mod smoothing;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::{BoundaryMode, HeatmapConfig, MalformedPolicy};

/// Turn geo-tagged check-ins from an ICS export into a smoothed density grid.
#[derive(clap::Parser)]
struct ClArgs {
    /// Check-in export in ICS format (optionally gzip-compressed)
    #[arg()]
    input: PathBuf,

    /// Output matrix file path
    #[arg(short = 'o', long = "output", default_value = output::DEFAULT_OUTPUT)]
    output: PathBuf,

    /// TOML file with [bounds], [grid] and [extract] sections
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    #[arg(long, allow_hyphen_values = true)]
    north: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    south: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    east: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    west: Option<f64>,

    /// Value the busiest cell is scaled to before smoothing
    #[arg(long)]
    range_factor: Option<f64>,

    /// Standard deviation of the Gaussian blur, in cells
    #[arg(long)]
    sigma: Option<f64>,

    /// Edge handling for the blur
    #[arg(long, value_enum)]
    boundary: Option<BoundaryMode>,

    /// Warn about unparsable GEO lines instead of aborting
    #[arg(long)]
    skip_malformed: bool,

    /// Verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbosity: u8,
}

impl ClArgs {
    fn resolve_config(&self) -> error::Result<HeatmapConfig> {
        let mut config = match &self.config {
            Some(path) => HeatmapConfig::load(path)?,
            None => HeatmapConfig::default(),
        };
        let bounds = &mut config.bounds;
        if let Some(v) = self.north {
            bounds.north = v;
        }
        if let Some(v) = self.south {
            bounds.south = v;
        }
        if let Some(v) = self.east {
            bounds.east = v;
        }
        if let Some(v) = self.west {
            bounds.west = v;
        }
        if let Some(v) = self.range_factor {
            config.grid.range_factor = v;
        }
        if let Some(v) = self.sigma {
            config.grid.sigma = v;
        }
        if let Some(v) = self.boundary {
            config.grid.boundary = v;
        }
        if self.skip_malformed {
            config.extract.malformed = MalformedPolicy::Skip;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ClArgs::parse();
    init_logging(args.verbosity);

    let config = args.resolve_config()?;
    tracing::debug!("Using configuration {:?}", config);

    let summary = pipeline::run(&config, &args.input, &args.output)?;
    println!(
        "{} check-ins inside the bounding box, largest cell count {}, grid written to {}",
        summary.points_kept,
        summary.max_count,
        args.output.display()
    );
    Ok(())
}
