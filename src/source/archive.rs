use chrono::NaiveDate;
use log::debug;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use crate::error::TelemetryError;
use crate::source::attitude::{find_attitude_file, load_attitude, samples_on};
use crate::source::hilt::load_hilt;
use crate::source::UnitSource;
use crate::types::{CoordinateSample, CoordinateStream, SampleStream};
use crate::util::{date_to_yeardoy, filename_date, find_files};

/// Attitude files cover about a month each; a few slots cover concurrent
/// workers on neighbouring dates.
const ATTITUDE_CACHE_SLOTS: usize = 4;

type AttitudeCache = VecDeque<(PathBuf, Arc<Vec<CoordinateSample>>)>;

/// SAMPEX data laid out as `<root>/hilt/**/hhrrYYYYDOY*.txt[.zip]` and
/// `<root>/attitude/**/PSSet_6sec_<start>_<end>*.txt`.
pub struct SampexArchive {
    root: PathBuf,
    attitude_cache: Mutex<AttitudeCache>,
}

impl SampexArchive {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            attitude_cache: Mutex::new(VecDeque::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn hilt_dir(&self) -> PathBuf {
        self.root.join("hilt")
    }

    fn attitude_dir(&self) -> PathBuf {
        self.root.join("attitude")
    }

    fn hilt_files(&self) -> Result<Vec<PathBuf>, TelemetryError> {
        Ok(find_files(&self.hilt_dir(), |name| name.starts_with("hhrr"))?)
    }

    fn files_in<F>(dir: &Path, keep: F) -> Result<Vec<PathBuf>, TelemetryError>
    where
        F: Fn(&str) -> bool,
    {
        match find_files(dir, keep) {
            Ok(files) => Ok(files),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn hilt_path(&self, date: NaiveDate) -> Result<PathBuf, TelemetryError> {
        let prefix = format!("hhrr{}", date_to_yeardoy(date));
        let matches = Self::files_in(&self.hilt_dir(), |name| name.starts_with(&prefix))?;
        let is_zip = |path: &PathBuf| path.extension().is_some_and(|ext| ext == "zip");
        matches
            .iter()
            .find(|path| !is_zip(path))
            .or_else(|| matches.iter().find(|path| is_zip(path)))
            .cloned()
            .ok_or(TelemetryError::MissingInput { kind: "HILT", date })
    }

    fn attitude_for(&self, path: &Path) -> Result<Arc<Vec<CoordinateSample>>, TelemetryError> {
        {
            let cache = self.attitude_cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((_, samples)) = cache.iter().find(|(cached, _)| cached == path) {
                debug!("Attitude cache hit for {}", path.display());
                return Ok(Arc::clone(samples));
            }
        }

        // Parse outside the lock; two workers may load the same file once each.
        let samples = Arc::new(load_attitude(path)?);
        let mut cache = self.attitude_cache.lock().unwrap_or_else(|e| e.into_inner());
        if !cache.iter().any(|(cached, _)| cached == path) {
            if cache.len() >= ATTITUDE_CACHE_SLOTS {
                cache.pop_front();
            }
            cache.push_back((path.to_path_buf(), Arc::clone(&samples)));
        }
        Ok(samples)
    }
}

impl UnitSource for SampexArchive {
    fn units(&self) -> Result<Vec<NaiveDate>, TelemetryError> {
        let mut dates: Vec<NaiveDate> = self
            .hilt_files()?
            .iter()
            .filter_map(|path| path.file_name()?.to_str().and_then(filename_date))
            .collect();
        dates.sort();
        dates.dedup();
        Ok(dates)
    }

    fn counts(&self, date: NaiveDate) -> Result<SampleStream, TelemetryError> {
        load_hilt(self.hilt_path(date)?, date)
    }

    fn counts_identity(&self, date: NaiveDate) -> Result<Option<String>, TelemetryError> {
        let path = self.hilt_path(date)?;
        let meta = std::fs::metadata(&path)?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_nanos());
        let path = path.canonicalize().unwrap_or(path);
        Ok(Some(format!("{}|{}|{}", path.display(), meta.len(), modified)))
    }

    fn coordinates(&self, date: NaiveDate) -> Result<CoordinateStream, TelemetryError> {
        let files = Self::files_in(&self.attitude_dir(), |name| name.starts_with("PSSet_6sec"))?;
        let path = find_attitude_file(&files, date)
            .ok_or(TelemetryError::MissingInput { kind: "attitude", date })?;
        let all = self.attitude_for(path)?;
        let day = samples_on(&all, date);
        if day.is_empty() {
            return Err(TelemetryError::MissingInput { kind: "attitude", date });
        }
        CoordinateStream::new(day)
    }
}
