use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use flate2::bufread::MultiGzDecoder;
use tracing::debug;

use crate::error::{HeatmapError, Result};

/// Progress is logged each time another 10% of the file has been read.
pub const DEFAULT_STEP_PERCENT: u8 = 10;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];


// --------------------------------------------------------------------------
// ReadProgress
// --------------------------------------------------------------------------

/// Counts the bytes pulled from the export on disk and logs whenever another
/// `step_percent` of the file size has been consumed. For gzip input this is
/// the compressed size, which is what the file length refers to.
#[derive(Debug)]
pub struct ReadProgress<R: Read> {
    inner: R,
    file_len: u64,
    bytes_read: u64,
    step_percent: u8,
    next_percent: u8,
}

impl<R: Read> ReadProgress<R> {
    /// If `step_percent` is 0, the default is used.
    pub fn new(inner: R, file_len: u64, step_percent: u8) -> Self {
        let step_percent = match step_percent {
            0 => DEFAULT_STEP_PERCENT,
            step => step.min(100),
        };
        Self {
            inner,
            file_len,
            bytes_read: 0,
            step_percent,
            next_percent: step_percent,
        }
    }

    /// Share of the file read so far, capped at 100 if the file grew.
    pub fn percent(&self) -> u8 {
        if self.file_len == 0 {
            return 100;
        }
        (self.bytes_read.saturating_mul(100) / self.file_len).min(100) as u8
    }

    /// Account for `n` more bytes and return the milestone just reached, if any.
    fn advance(&mut self, n: usize) -> Option<u8> {
        self.bytes_read = self.bytes_read.saturating_add(n as u64);
        let percent = self.percent();
        if percent < self.next_percent {
            return None;
        }
        let reached = percent - percent % self.step_percent;
        self.next_percent = reached.saturating_add(self.step_percent);
        Some(reached)
    }
}

impl<R: Read> Read for ReadProgress<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            if let Some(percent) = self.advance(n) {
                debug!(
                    "Read {}% of the export ({} of {} bytes)",
                    percent, self.bytes_read, self.file_len
                );
            }
        }
        Ok(n)
    }
}


// --------------------------------------------------------------------------
// InputStream
// --------------------------------------------------------------------------

/// Plain text or gzip-compressed text, decided by sniffing the first bytes.
pub enum InputStream<R: BufRead> {
    Plain(R),
    Gzip(BufReader<MultiGzDecoder<R>>),
}

impl<R: BufRead> InputStream<R> {
    pub fn sniff(mut reader: R) -> io::Result<Self> {
        let compressed = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
        if compressed {
            debug!("Input is gzip-compressed");
            Ok(InputStream::Gzip(BufReader::new(MultiGzDecoder::new(reader))))
        } else {
            Ok(InputStream::Plain(reader))
        }
    }
}

impl<R: BufRead> Read for InputStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            InputStream::Plain(reader) => reader.read(buf),
            InputStream::Gzip(decoder) => decoder.read(buf),
        }
    }
}

impl<R: BufRead> BufRead for InputStream<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            InputStream::Plain(reader) => reader.fill_buf(),
            InputStream::Gzip(decoder) => decoder.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            InputStream::Plain(reader) => reader.consume(amt),
            InputStream::Gzip(decoder) => decoder.consume(amt),
        }
    }
}

/// Open the check-in export at `path` for line-by-line reading. Fails before
/// anything is read if the file cannot be opened.
pub fn open(path: &Path) -> Result<InputStream<BufReader<ReadProgress<File>>>> {
    let to_err = |source| HeatmapError::InputOpen {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(to_err)?;
    let file_len = file.metadata().map_err(to_err)?.len();
    debug!("Opened {} ({} bytes)", path.display(), file_len);
    // The BufReader sits outside the progress counter so that progress counts
    // raw bytes from disk, before any decompression.
    let reader = BufReader::new(ReadProgress::new(file, file_len, DEFAULT_STEP_PERCENT));
    Ok(InputStream::sniff(reader)?)
}
