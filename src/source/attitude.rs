use chrono::NaiveDate;
use log::info;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::error::TelemetryError;
use crate::types::CoordinateSample;
use crate::util::{digit_groups, seconds_of_day, yeardoy_to_date};

const YEAR_COL: usize = 0;
const DOY_COL: usize = 1;
const SECONDS_COL: usize = 2;
const L_SHELL_COL: usize = 20;
const MLT_COL: usize = 22;
const ATT_FLAG_COL: usize = 71;

/// Date span `[start, end]` covered by an attitude file named like
/// `PSSet_6sec_1998100_1998130.txt`.
pub fn attitude_span(name: &str) -> Option<(NaiveDate, NaiveDate)> {
    let dates: Vec<NaiveDate> = digit_groups(name)
        .into_iter()
        .filter(|group| group.len() == 7)
        .filter_map(yeardoy_to_date)
        .collect();
    match dates.as_slice() {
        [.., start, end] => Some((*start, *end)),
        _ => None,
    }
}

pub fn find_attitude_file(files: &[PathBuf], date: NaiveDate) -> Option<&PathBuf> {
    files.iter().rev().find(|path| {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(attitude_span)
            .is_some_and(|(start, end)| start <= date && date <= end)
    })
}

/// Parses the data section of an attitude file into L-shell samples
/// (coordinate = L, auxiliary = MLT, quality = attitude flag).
///
/// Everything up to the `BEGIN DATA` marker is header. The row right after
/// the marker has an extra column and is skipped.
pub fn parse_attitude<R: BufRead>(reader: R, path: &Path) -> Result<Vec<CoordinateSample>, TelemetryError> {
    let mut lines = reader.lines().enumerate();
    let mut found_marker = false;
    for (_, line) in lines.by_ref() {
        if line?.contains("BEGIN DATA") {
            found_marker = true;
            break;
        }
    }
    if !found_marker {
        return Err(TelemetryError::malformed(path, 0, "no BEGIN DATA marker"));
    }
    lines.next();

    let mut samples = Vec::new();
    for (i, line) in lines {
        let line = line?;
        let line_no = i + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() <= ATT_FLAG_COL {
            return Err(TelemetryError::malformed(
                path,
                line_no,
                format!("expected at least {} columns, found {}", ATT_FLAG_COL + 1, fields.len()),
            ));
        }

        let number = |col: usize| -> Result<f64, TelemetryError> {
            fields[col]
                .parse::<f64>()
                .map_err(|e| TelemetryError::malformed(path, line_no, format!("column {}: {}", col, e)))
        };

        let year = number(YEAR_COL)? as i32;
        let doy = number(DOY_COL)? as u32;
        let date = NaiveDate::from_yo_opt(year, doy).ok_or_else(|| {
            TelemetryError::malformed(path, line_no, format!("invalid year/day {}/{}", year, doy))
        })?;

        samples.push(CoordinateSample {
            time: seconds_of_day(date, number(SECONDS_COL)?),
            coordinate: number(L_SHELL_COL)?,
            auxiliary: number(MLT_COL)?,
            quality_flag: number(ATT_FLAG_COL)?,
        });
    }
    Ok(samples)
}

pub fn load_attitude(path: &Path) -> Result<Vec<CoordinateSample>, TelemetryError> {
    info!("Loading attitude data from {}", path.display());
    let file = File::open(path)?;
    parse_attitude(BufReader::new(file), path)
}

pub fn samples_on(all: &[CoordinateSample], date: NaiveDate) -> Vec<CoordinateSample> {
    all.iter().filter(|s| s.time.date() == date).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn row(year: i32, doy: u32, seconds: f64, l: f64, mlt: f64, flag: f64) -> String {
        let mut fields = vec!["0".to_string(); ATT_FLAG_COL + 3];
        fields[YEAR_COL] = year.to_string();
        fields[DOY_COL] = doy.to_string();
        fields[SECONDS_COL] = seconds.to_string();
        fields[L_SHELL_COL] = l.to_string();
        fields[MLT_COL] = mlt.to_string();
        fields[ATT_FLAG_COL] = flag.to_string();
        fields.join(" ")
    }

    #[test]
    fn test_attitude_span() {
        let (start, end) = attitude_span("PSSet_6sec_1998100_1998130.txt").unwrap();
        assert_eq!(start, NaiveDate::from_yo_opt(1998, 100).unwrap());
        assert_eq!(end, NaiveDate::from_yo_opt(1998, 130).unwrap());
        assert_eq!(attitude_span("PSSet_6sec.txt"), None);
    }

    #[test]
    fn test_find_attitude_file() {
        let files = vec![
            PathBuf::from("a/PSSet_6sec_1998001_1998030.txt"),
            PathBuf::from("a/PSSet_6sec_1998031_1998060.txt"),
        ];
        let date = NaiveDate::from_yo_opt(1998, 45).unwrap();
        assert_eq!(find_attitude_file(&files, date), Some(&files[1]));
        assert_eq!(find_attitude_file(&files, NaiveDate::from_yo_opt(1999, 1).unwrap()), None);
    }

    #[test]
    fn test_parse_attitude() {
        let text = format!(
            "header line\nmore header\nBEGIN DATA\n{} extra\n{}\n{}\n",
            row(1998, 100, 0.0, 1.0, 1.0, 0.0),
            row(1998, 100, 6.0, 4.5, 12.0, 1.0),
            row(1998, 101, 12.0, 5.5, 13.0, 128.0),
        );
        let samples = parse_attitude(Cursor::new(text), Path::new("att.txt")).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].coordinate, 4.5);
        assert_eq!(samples[0].auxiliary, 12.0);
        assert_eq!(samples[1].quality_flag, 128.0);

        let day = NaiveDate::from_yo_opt(1998, 101).unwrap();
        let on_day = samples_on(&samples, day);
        assert_eq!(on_day.len(), 1);
        assert_eq!(on_day[0].time, seconds_of_day(day, 12.0));
    }

    #[test]
    fn test_missing_marker() {
        let result = parse_attitude(Cursor::new("no marker here\n"), Path::new("att.txt"));
        assert!(matches!(result, Err(TelemetryError::Malformed { .. })));
    }
}
