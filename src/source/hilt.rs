use chrono::{Duration, NaiveDate};
use log::{debug, info};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::TelemetryError;
use crate::types::{Sample, SampleStream};
use crate::util::seconds_of_day;

pub const STATE4_RESOLUTION: f64 = 20e-3;

/// The first four rates are consecutive 20 ms SSD sums; Rate6 holds the
/// fifth 20 ms slot (Rate5 is a 100 ms SSD4 rate and is not used).
const STATE4_COLUMNS: [&str; 5] = ["Rate1", "Rate2", "Rate3", "Rate4", "Rate6"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HiltRow {
    pub seconds: f64,
    pub rates: [f64; 5],
}

fn column(header: &[&str], name: &str, path: &Path) -> Result<usize, TelemetryError> {
    header
        .iter()
        .position(|h| *h == name)
        .ok_or_else(|| TelemetryError::malformed(path, 1, format!("missing column {}", name)))
}

/// Parses a whitespace-separated HILT file. `path` is only used in errors.
///
/// Rows must be in non-decreasing time order; the first row that goes back
/// in time rejects the whole file.
pub fn parse_hilt<R: BufRead>(reader: R, date: NaiveDate, path: &Path) -> Result<Vec<HiltRow>, TelemetryError> {
    let mut lines = reader.lines();
    let header_line = match lines.next() {
        Some(line) => line?,
        None => return Err(TelemetryError::MissingInput { kind: "HILT", date }),
    };
    let header: Vec<&str> = header_line.split_whitespace().collect();
    let time_col = column(&header, "Time", path)?;
    let mut rate_cols = [0usize; 5];
    for (slot, name) in rate_cols.iter_mut().zip(STATE4_COLUMNS) {
        *slot = column(&header, name, path)?;
    }

    let mut rows: Vec<HiltRow> = Vec::new();
    for (i, line) in lines.enumerate() {
        let line = line?;
        let line_no = i + 2;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }

        let field = |col: usize| -> Result<f64, TelemetryError> {
            let raw = fields
                .get(col)
                .ok_or_else(|| TelemetryError::malformed(path, line_no, "row is too short"))?;
            raw.parse::<f64>()
                .map_err(|e| TelemetryError::malformed(path, line_no, format!("'{}': {}", raw, e)))
        };

        let seconds = field(time_col)?;
        let mut rates = [0.0; 5];
        for (rate, &col) in rates.iter_mut().zip(rate_cols.iter()) {
            *rate = field(col)?;
        }

        if let Some(previous) = rows.last() {
            if seconds < previous.seconds {
                return Err(TelemetryError::OutOfOrder {
                    index: rows.len(),
                    previous: seconds_of_day(date, previous.seconds),
                    current: seconds_of_day(date, seconds),
                });
            }
        }
        rows.push(HiltRow { seconds, rates });
    }

    if rows.is_empty() {
        return Err(TelemetryError::MissingInput { kind: "HILT", date });
    }
    Ok(rows)
}

pub fn resolve_state4(rows: &[HiltRow], date: NaiveDate) -> Vec<Sample> {
    let step = Duration::milliseconds((STATE4_RESOLUTION * 1e3) as i64);
    let mut samples = Vec::with_capacity(rows.len() * STATE4_COLUMNS.len());
    for row in rows {
        let start = seconds_of_day(date, row.seconds);
        for (slot, &value) in row.rates.iter().enumerate() {
            samples.push(Sample {
                time: start + step * slot as i32,
                value,
            });
        }
    }
    samples
}

fn state4_stream(rows: &[HiltRow], date: NaiveDate) -> Result<SampleStream, TelemetryError> {
    let samples = resolve_state4(rows, date);
    debug!("Resolved {} rows into {} samples", rows.len(), samples.len());
    SampleStream::new(samples, STATE4_RESOLUTION)
}

/// A truncated archive is a bad file, not a failing disk.
fn zip_error(path: &Path, err: ZipError) -> TelemetryError {
    match err {
        ZipError::Io(e) if e.kind() != std::io::ErrorKind::UnexpectedEof => TelemetryError::Io(e),
        other => TelemetryError::malformed(path, 0, other.to_string()),
    }
}

pub fn load_hilt<P: AsRef<Path>>(path: P, date: NaiveDate) -> Result<SampleStream, TelemetryError> {
    let path = path.as_ref();
    info!("Loading HILT data for {} from {}", date, path.display());
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "zip") {
        let mut archive = ZipArchive::new(file).map_err(|e| zip_error(path, e))?;
        if archive.is_empty() {
            return Err(TelemetryError::MissingInput { kind: "HILT", date });
        }
        let entry = archive.by_index(0).map_err(|e| zip_error(path, e))?;
        let rows = parse_hilt(BufReader::new(entry), date, path)?;
        return state4_stream(&rows, date);
    }
    let rows = parse_hilt(BufReader::new(file), date, path)?;
    state4_stream(&rows, date)
}
