use std::io::BufRead;

use tracing::{debug, trace, warn};

use crate::config::{ExtractSettings, MalformedPolicy};
use crate::error::{HeatmapError, Result};
use crate::geometry::GeoPoint;

#[derive(Debug, PartialEq)]
enum LineKind {
    Untagged,
    /// Tagged, but truncated or without a field separator.
    Ignored(&'static str),
    Malformed(String),
    Point(GeoPoint),
}

fn classify(line: &str, settings: &ExtractSettings) -> LineKind {
    if !line.starts_with(settings.tag.as_str()) {
        return LineKind::Untagged;
    }
    let payload = match line.get(settings.offset..) {
        Some(rest) => rest.trim_end(),
        None => return LineKind::Ignored("truncated"),
    };
    if !payload.contains(';') {
        return LineKind::Ignored("no field separator");
    }

    let fields: Vec<&str> = payload.split(';').collect();
    if fields.len() != 2 {
        return LineKind::Malformed(format!("expected 2 fields, found {}", fields.len()));
    }
    let parse = |field: &str, name: &str| -> std::result::Result<f64, String> {
        match field.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            Ok(v) => Err(format!("{} is not finite: {}", name, v)),
            Err(e) => Err(format!("{} {:?}: {}", name, field, e)),
        }
    };
    match (parse(fields[0], "latitude"), parse(fields[1], "longitude")) {
        (Ok(latitude), Ok(longitude)) => LineKind::Point(GeoPoint { latitude, longitude }),
        (Err(reason), _) | (_, Err(reason)) => LineKind::Malformed(reason),
    }
}

/// Lazily yields the coordinates of every geo-tagged line, in input order.
pub struct GeoRecords<'a, R: BufRead> {
    reader: R,
    settings: &'a ExtractSettings,
    buf: Vec<u8>,
    line_number: usize,
    geo_records: usize,
    malformed_skipped: usize,
    failed: bool,
}

impl<'a, R: BufRead> GeoRecords<'a, R> {
    pub fn new(reader: R, settings: &'a ExtractSettings) -> Self {
        Self {
            reader,
            settings,
            buf: Vec::new(),
            line_number: 0,
            geo_records: 0,
            malformed_skipped: 0,
            failed: false,
        }
    }

    /// Number of lines consumed so far.
    pub fn lines_read(&self) -> usize {
        self.line_number
    }

    /// Number of tagged lines that produced a point.
    pub fn geo_records(&self) -> usize {
        self.geo_records
    }

    pub fn malformed_skipped(&self) -> usize {
        self.malformed_skipped
    }
}

impl<'a, R: BufRead> Iterator for GeoRecords<'a, R> {
    type Item = Result<GeoPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e.into()));
                }
            }
            self.line_number += 1;
            let line = String::from_utf8_lossy(&self.buf);

            match classify(&line, self.settings) {
                LineKind::Untagged => continue,
                LineKind::Ignored(reason) => {
                    debug!(
                        "Ignoring line {} ({}): {:?}",
                        self.line_number,
                        reason,
                        line.trim_end()
                    );
                }
                LineKind::Point(point) => {
                    trace!("Line {}: {}", self.line_number, point);
                    self.geo_records += 1;
                    return Some(Ok(point));
                }
                LineKind::Malformed(reason) => match self.settings.malformed {
                    MalformedPolicy::Skip => {
                        warn!(
                            "Skipping malformed line {} ({}): {:?}",
                            self.line_number,
                            reason,
                            line.trim_end()
                        );
                        self.malformed_skipped += 1;
                    }
                    MalformedPolicy::Fail => {
                        self.failed = true;
                        return Some(Err(HeatmapError::MalformedRecord {
                            line: self.line_number,
                            content: line.trim_end().to_string(),
                            reason,
                        }));
                    }
                },
            }
        }
    }
}
