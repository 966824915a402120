use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum HeatmapError {
    #[error("Cannot open input file {}: {source}", path.display())]
    InputOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A geo-tagged line carried a separator but not two finite numbers.
    #[error("Malformed record on line {line} ({reason}): {content:?}")]
    MalformedRecord {
        line: usize,
        content: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Cannot load config file {}: {message}", path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("Non-finite value {value} in grid cell ({row}, {col})")]
    NonFiniteCell { row: usize, col: usize, value: f64 },

    #[error("Cannot write output file {}: {source}", path.display())]
    OutputWrite {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, HeatmapError>;
