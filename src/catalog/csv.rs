use chrono::NaiveDateTime;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::TelemetryError;
use crate::merge::PassActivity;
use crate::types::{Detection, Pass};

pub const DETECTION_HEADER: &str = "dateTime,burst_param";
pub const PASS_HEADER: &str = "start_time,end_time,duration_s,mean_mlt,min_mlt,max_mlt,max_att_flag";
pub const ACTIVITY_HEADER: &str =
    "start_time,end_time,duration_s,mean_mlt,min_mlt,max_mlt,max_att_flag,n_microbursts,microburst_rate_per_min";

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

fn format_time(time: &NaiveDateTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

fn pass_fields(pass: &Pass) -> String {
    format!(
        "{},{},{:.3},{},{},{},{}",
        format_time(&pass.start_time),
        format_time(&pass.end_time),
        pass.duration_seconds,
        pass.mean_auxiliary,
        pass.min_auxiliary,
        pass.max_auxiliary,
        pass.max_quality_flag
    )
}

pub fn write_detections<W: Write>(out: W, detections: &[Detection]) -> io::Result<()> {
    let mut out = BufWriter::new(out);
    writeln!(out, "{}", DETECTION_HEADER)?;
    for d in detections {
        writeln!(out, "{},{:.1}", format_time(&d.time), d.score)?;
    }
    out.flush()
}

pub fn write_passes<W: Write>(out: W, passes: &[Pass]) -> io::Result<()> {
    let mut out = BufWriter::new(out);
    writeln!(out, "{}", PASS_HEADER)?;
    for pass in passes {
        writeln!(out, "{}", pass_fields(pass))?;
    }
    out.flush()
}

pub fn write_annotated_passes<W: Write>(out: W, activity: &[PassActivity]) -> io::Result<()> {
    let mut out = BufWriter::new(out);
    writeln!(out, "{}", ACTIVITY_HEADER)?;
    for a in activity {
        writeln!(
            out,
            "{},{},{:.3}",
            pass_fields(&a.pass),
            a.microburst_count,
            a.rate_per_minute
        )?;
    }
    out.flush()
}

/// Data rows of a catalog after checking its header. Yields
/// `(line number, fields)`; blank lines are skipped.
fn data_rows<R: BufRead>(
    reader: R,
    header: &str,
    path: &Path,
) -> Result<Vec<(usize, Vec<String>)>, TelemetryError> {
    let mut lines = reader.lines();
    let first = match lines.next() {
        Some(line) => line?,
        None => return Err(TelemetryError::malformed(path, 1, "empty catalog")),
    };
    // Only the leading columns are required, so annotated pass catalogs
    // read back as plain pass catalogs.
    if !first.trim().starts_with(header) {
        return Err(TelemetryError::malformed(
            path,
            1,
            format!("expected header '{}'", header),
        ));
    }

    let mut rows = Vec::new();
    for (i, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push((i + 2, line.split(',').map(|f| f.trim().to_string()).collect()));
    }
    Ok(rows)
}

fn parse_time(raw: &str, path: &Path, line: usize) -> Result<NaiveDateTime, TelemetryError> {
    NaiveDateTime::parse_from_str(raw, TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|e| TelemetryError::malformed(path, line, format!("time '{}': {}", raw, e)))
}

fn parse_number(raw: &str, path: &Path, line: usize) -> Result<f64, TelemetryError> {
    raw.parse::<f64>()
        .map_err(|e| TelemetryError::malformed(path, line, format!("'{}': {}", raw, e)))
}

fn expect_columns(fields: &[String], n: usize, path: &Path, line: usize) -> Result<(), TelemetryError> {
    if fields.len() < n {
        return Err(TelemetryError::malformed(
            path,
            line,
            format!("expected {} columns, found {}", n, fields.len()),
        ));
    }
    Ok(())
}

pub fn read_detections<R: BufRead>(reader: R, path: &Path) -> Result<Vec<(NaiveDateTime, f64)>, TelemetryError> {
    data_rows(reader, DETECTION_HEADER, path)?
        .into_iter()
        .map(|(line, fields)| {
            expect_columns(&fields, 2, path, line)?;
            Ok((parse_time(&fields[0], path, line)?, parse_number(&fields[1], path, line)?))
        })
        .collect()
}

pub fn read_passes<R: BufRead>(reader: R, path: &Path) -> Result<Vec<Pass>, TelemetryError> {
    data_rows(reader, PASS_HEADER, path)?
        .into_iter()
        .map(|(line, fields)| {
            expect_columns(&fields, 7, path, line)?;
            Ok(Pass {
                start_time: parse_time(&fields[0], path, line)?,
                end_time: parse_time(&fields[1], path, line)?,
                duration_seconds: parse_number(&fields[2], path, line)?,
                mean_auxiliary: parse_number(&fields[3], path, line)?,
                min_auxiliary: parse_number(&fields[4], path, line)?,
                max_auxiliary: parse_number(&fields[5], path, line)?,
                max_quality_flag: parse_number(&fields[6], path, line)?,
            })
        })
        .collect()
}

pub fn load_detections(path: &Path) -> Result<Vec<(NaiveDateTime, f64)>, TelemetryError> {
    read_detections(BufReader::new(File::open(path)?), path)
}

pub fn load_passes(path: &Path) -> Result<Vec<Pass>, TelemetryError> {
    read_passes(BufReader::new(File::open(path)?), path)
}
