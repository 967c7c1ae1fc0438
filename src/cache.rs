use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::detect::DetectionParams;
use crate::types::Detection;
use crate::util::date_to_yeardoy;

#[derive(Serialize, Deserialize)]
struct CachedUnit {
    input: String,
    params: DetectionParams,
    detections: Vec<Detection>,
}

/// Per-unit detection results kept between runs, so a rerun over the same
/// input files with the same parameters only processes new or failed days.
#[derive(Debug, Clone)]
pub struct UnitCache {
    dir: PathBuf,
}

impl UnitCache {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.mbc", date_to_yeardoy(date)))
    }

    /// Cached detections for `date`, only if they were produced from `input`
    /// with `params`. Unreadable or stale entries count as misses.
    pub fn load(&self, date: NaiveDate, input: &str, params: &DetectionParams) -> Option<Vec<Detection>> {
        let path = self.path(date);
        let mut buf = Vec::new();
        File::open(&path).ok()?.read_to_end(&mut buf).ok()?;
        let cached: CachedUnit = match bincode::deserialize(&buf) {
            Ok(cached) => cached,
            Err(e) => {
                debug!("Ignoring unreadable cache entry {}: {}", path.display(), e);
                return None;
            }
        };
        if cached.input != input {
            debug!("Cache entry for {} was built from {}", date, cached.input);
            return None;
        }
        if cached.params != *params {
            debug!("Cache entry for {} was built with other parameters", date);
            return None;
        }
        Some(cached.detections)
    }

    pub fn store(
        &self,
        date: NaiveDate,
        input: &str,
        params: &DetectionParams,
        detections: &[Detection],
    ) -> Result<()> {
        let entry = CachedUnit {
            input: input.to_string(),
            params: *params,
            detections: detections.to_vec(),
        };
        let bin = bincode::serialize(&entry)?;
        let path = self.path(date);
        let mut f = File::create(&path)
            .with_context(|| format!("Failed to write cache entry {}", path.display()))?;
        f.write_all(&bin)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::start_of_day;

    #[test]
    fn test_cache_hit_requires_same_input_and_params() {
        let dir = tempfile::tempdir().unwrap();
        let cache = UnitCache::open(dir.path().join("units")).unwrap();
        let date = NaiveDate::from_ymd_opt(1999, 7, 1).unwrap();
        let params = DetectionParams::default();
        let input = "/data/a/hhrr1999182.txt|1024|7";
        let detections = vec![Detection {
            sample_index: 42,
            time: start_of_day(date),
            score: 12.25,
        }];

        assert!(cache.load(date, input, &params).is_none());
        cache.store(date, input, &params, &detections).unwrap();
        assert_eq!(cache.load(date, input, &params), Some(detections));

        let other = DetectionParams { threshold: 7.0, ..params };
        assert!(cache.load(date, input, &other).is_none());
        assert!(cache.load(date, "/data/b/hhrr1999182.txt|1024|7", &params).is_none());
        assert!(cache.load(date, "/data/a/hhrr1999182.txt|2048|9", &params).is_none());

        fs::write(cache.path(date), b"garbage").unwrap();
        assert!(cache.load(date, input, &params).is_none());
    }
}
