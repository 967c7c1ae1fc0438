use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::io;
use std::path::{Path, PathBuf};

/// Accepts `YYYY-MM-DD` or the SAMPEX `YYYYDOY` form.
pub fn date_parser(s: &str) -> Result<NaiveDate, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Date string cannot be empty".to_string());
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }

    if s.len() == 7 && s.chars().all(|c| c.is_ascii_digit()) {
        return yeardoy_to_date(s).ok_or_else(|| format!("Invalid day of year: {}", s));
    }

    Err(format!("Invalid date '{}': expected YYYY-MM-DD or YYYYDOY", s))
}

pub fn date_to_yeardoy(date: NaiveDate) -> String {
    format!("{}{:03}", date.year(), date.ordinal())
}

pub fn yeardoy_to_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 7 {
        return None;
    }
    let year: i32 = s[..4].parse().ok()?;
    let doy: u32 = s[4..].parse().ok()?;
    NaiveDate::from_yo_opt(year, doy)
}

pub fn digit_groups(name: &str) -> Vec<&str> {
    name.split(|c: char| !c.is_ascii_digit())
        .filter(|group| !group.is_empty())
        .collect()
}

/// Date of a SAMPEX file from the first `YYYYDOY` group of its name,
/// e.g. `hhrr1998123.txt`.
pub fn filename_date(name: &str) -> Option<NaiveDate> {
    digit_groups(name)
        .into_iter()
        .find(|group| group.len() == 7)
        .and_then(yeardoy_to_date)
}

pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

pub fn seconds_of_day(date: NaiveDate, seconds: f64) -> NaiveDateTime {
    start_of_day(date) + Duration::microseconds((seconds * 1e6).round() as i64)
}

pub fn find_files<F>(dir: &Path, keep: F) -> io::Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.file_name().and_then(|n| n.to_str()).is_some_and(&keep) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}
