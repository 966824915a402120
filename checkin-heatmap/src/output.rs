use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::Array2;
use tempfile::{Builder, NamedTempFile};
use tracing::debug;

use crate::error::{HeatmapError, Result};

pub const DEFAULT_OUTPUT: &str = "foursquare.dat";

/// One line per grid row, every value with six decimals followed by a space.
pub fn write_matrix<W: Write>(cells: &Array2<f64>, out: &mut W) -> std::io::Result<()> {
    for row in cells.rows() {
        for value in row.iter() {
            write!(out, "{:.6} ", value)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Temp files default to owner-only; ask for 0666 so the process umask
/// decides the final mode, as it would for a plain `File::create`.
fn temp_file_in(dir: &Path) -> std::io::Result<NamedTempFile> {
    let mut builder = Builder::new();
    builder.prefix(".foursquare").suffix(".tmp");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder.tempfile_in(dir)
}

/// Write the matrix next to `path` and rename it into place once complete,
/// so a failed run never leaves a truncated file under the output name.
pub fn save_matrix(cells: &Array2<f64>, path: &Path) -> Result<()> {
    let to_err = |source| HeatmapError::OutputWrite {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let tmp = temp_file_in(dir).map_err(to_err)?;
    debug!(
        "Writing {}x{} matrix via {}",
        cells.nrows(),
        cells.ncols(),
        tmp.path().display()
    );
    {
        let mut writer = BufWriter::new(tmp.as_file());
        write_matrix(cells, &mut writer).map_err(to_err)?;
        writer.flush().map_err(to_err)?;
    }
    tmp.as_file().sync_all().map_err(to_err)?;
    tmp.persist(path).map_err(|e| to_err(e.error))?;
    Ok(())
}
