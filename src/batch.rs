//! Runs the per-unit pipelines over many days and reduces their results.
//!
//! Units share nothing. Each one runs as a blocking task on a tokio runtime,
//! at most `threads` at a time, and the reduction sorts by date so the
//! report never depends on completion order.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cache::UnitCache;
use crate::detect::{detect_microbursts, DetectionParams};
use crate::error::TelemetryError;
use crate::passes::{segment_passes, PassParams};
use crate::source::UnitSource;
use crate::types::{Detection, Pass};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("year is configured to be skipped")]
    SkippedYear,
    #[error("out of order: {0}")]
    OutOfOrder(String),
    #[error("missing input: {0}")]
    MissingInput(String),
    #[error("malformed input: {0}")]
    Malformed(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("i/o error: {0}")]
    Io(String),
    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl From<TelemetryError> for SkipReason {
    fn from(err: TelemetryError) -> Self {
        let detail = err.to_string();
        match err {
            TelemetryError::OutOfOrder { .. } => SkipReason::OutOfOrder(detail),
            TelemetryError::MissingInput { .. } => SkipReason::MissingInput(detail),
            TelemetryError::Malformed { .. } => SkipReason::Malformed(detail),
            TelemetryError::InvalidParameters(_) => SkipReason::InvalidParameters(detail),
            TelemetryError::Io(_) => SkipReason::Io(detail),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub threads: usize,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub skip_years: Vec<i32>,
}

impl BatchOptions {
    fn in_range(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date <= end)
    }
}

#[derive(Debug, Clone)]
pub struct BatchReport<T> {
    pub processed: Vec<(NaiveDate, T)>,
    pub skipped: Vec<(NaiveDate, SkipReason)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub quiet: usize,
    pub skipped: usize,
    pub records: usize,
}

impl<U> BatchReport<Vec<U>> {
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            processed: self.processed.len(),
            quiet: self.processed.iter().filter(|(_, r)| r.is_empty()).count(),
            skipped: self.skipped.len(),
            records: self.processed.iter().map(|(_, r)| r.len()).sum(),
        }
    }

    pub fn records(self) -> Vec<U> {
        self.processed.into_iter().flat_map(|(_, r)| r).collect()
    }
}

/// Splits the available units into those to schedule and those skipped by
/// year. Units outside the date range are dropped silently.
pub fn select_units(units: &[NaiveDate], options: &BatchOptions) -> (Vec<NaiveDate>, Vec<(NaiveDate, SkipReason)>) {
    let mut scheduled = Vec::new();
    let mut skipped = Vec::new();
    for &date in units.iter().filter(|d| options.in_range(**d)) {
        if options.skip_years.contains(&date.year()) {
            skipped.push((date, SkipReason::SkippedYear));
        } else {
            scheduled.push(date);
        }
    }
    (scheduled, skipped)
}

/// Runs `job` for every date, at most `threads` at once. Results come back in
/// completion order.
pub async fn run_units<T, F>(
    source: Arc<dyn UnitSource>,
    dates: Vec<NaiveDate>,
    threads: usize,
    job: Arc<F>,
) -> Vec<(NaiveDate, Result<T, SkipReason>)>
where
    T: Send + 'static,
    F: Fn(&dyn UnitSource, NaiveDate) -> Result<T, TelemetryError> + Send + Sync + 'static,
{
    let permits = Arc::new(Semaphore::new(threads.max(1)));
    let mut tasks = JoinSet::new();

    for date in dates {
        let permits = Arc::clone(&permits);
        let source = Arc::clone(&source);
        let job = Arc::clone(&job);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            debug!("Processing unit {}", date);
            let joined = tokio::task::spawn_blocking(move || job(source.as_ref(), date)).await;
            let outcome = match joined {
                Ok(result) => result.map_err(SkipReason::from),
                Err(e) => Err(SkipReason::Panicked(e.to_string())),
            };
            (date, outcome)
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => warn!("Unit task failed to complete: {}", e),
        }
    }
    outcomes
}

pub fn reduce<T>(
    mut outcomes: Vec<(NaiveDate, Result<T, SkipReason>)>,
    mut skipped: Vec<(NaiveDate, SkipReason)>,
) -> BatchReport<T> {
    outcomes.sort_by_key(|(date, _)| *date);
    let mut processed = Vec::new();
    for (date, outcome) in outcomes {
        match outcome {
            Ok(result) => processed.push((date, result)),
            Err(reason) => {
                warn!("Skipping {}: {}", date, reason);
                skipped.push((date, reason));
            }
        }
    }
    skipped.sort_by_key(|(date, _)| *date);
    BatchReport { processed, skipped }
}

pub fn run_batch<T, F>(source: Arc<dyn UnitSource>, options: &BatchOptions, job: F) -> Result<BatchReport<T>>
where
    T: Send + 'static,
    F: Fn(&dyn UnitSource, NaiveDate) -> Result<T, TelemetryError> + Send + Sync + 'static,
{
    let units = source.units().context("Failed to list available units")?;
    let (dates, skipped) = select_units(&units, options);
    let threads = options.threads.max(1);
    info!(
        "Scheduling {} units on {} workers ({} skipped by year)",
        dates.len(),
        threads,
        skipped.len()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .enable_all()
        .build()
        .context("Failed to start worker runtime")?;
    let outcomes = runtime.block_on(run_units(source, dates, threads, Arc::new(job)));
    Ok(reduce(outcomes, skipped))
}

/// Per-unit microburst search. Cached results are reused only for the same
/// input file and parameters.
pub fn detection_job(
    params: DetectionParams,
    cache: Option<UnitCache>,
) -> Result<impl Fn(&dyn UnitSource, NaiveDate) -> Result<Vec<Detection>, TelemetryError> + Send + Sync + 'static, TelemetryError>
{
    params.validate()?;
    Ok(move |source: &dyn UnitSource, date: NaiveDate| {
        let cached = match &cache {
            Some(cache) => source.counts_identity(date)?.map(|input| (cache, input)),
            None => None,
        };
        if let Some(hit) = cached.as_ref().and_then(|(c, input)| c.load(date, input, &params)) {
            debug!("Using cached detections for {}", date);
            return Ok(hit);
        }
        let stream = source.counts(date)?;
        let detections = detect_microbursts(&stream, &params)?;
        info!("{}: {} microbursts in {} samples", date, detections.len(), stream.len());
        if let Some((cache, input)) = &cached {
            if let Err(e) = cache.store(date, input, &params, &detections) {
                warn!("Could not cache {}: {:#}", date, e);
            }
        }
        Ok(detections)
    })
}

pub fn pass_job(
    params: PassParams,
) -> Result<impl Fn(&dyn UnitSource, NaiveDate) -> Result<Vec<Pass>, TelemetryError> + Send + Sync + 'static, TelemetryError> {
    params.validate()?;
    Ok(move |source: &dyn UnitSource, date: NaiveDate| {
        let stream = source.coordinates(date)?;
        let passes = segment_passes(&stream, &params)?;
        info!("{}: {} passes from {} attitude rows", date, passes.len(), stream.len());
        Ok(passes)
    })
}

pub fn dedup_by_timestamp(detections: Vec<Detection>) -> Vec<Detection> {
    let mut seen: HashSet<NaiveDateTime> = HashSet::with_capacity(detections.len());
    detections.into_iter().filter(|d| seen.insert(d.time)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use crate::synthetic::{flat_counts, orbit_trace};
    use crate::types::Sample;
    use crate::util::start_of_day;
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2000, 3, n).unwrap()
    }

    fn counts(date: NaiveDate, seed: u64, spike_at: Option<usize>) -> Vec<Sample> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut samples = flat_counts(&mut rng, start_of_day(date), 4000, 0.02, 100.0, 3.0);
        if let Some(k) = spike_at {
            for s in &mut samples[k..k + 5] {
                s.value = 400.0;
            }
        }
        samples
    }

    fn source() -> MemorySource {
        let mut unordered = counts(day(4), 4, None);
        unordered.swap(100, 101);
        let old = NaiveDate::from_ymd_opt(1996, 8, 1).unwrap();

        MemorySource::new()
            .with_counts(day(1), counts(day(1), 1, Some(1500)), 0.02)
            .with_counts(day(2), counts(day(2), 2, None), 0.02)
            .with_counts(day(3), counts(day(3), 3, Some(3000)), 0.02)
            .with_counts(day(4), unordered, 0.02)
            .with_coordinates(day(5), orbit_trace(start_of_day(day(5)), 100, 6.0, 600.0, 1.0, 9.0))
            .with_counts(old, counts(old, 6, Some(2000)), 0.02)
    }

    fn options(threads: usize) -> BatchOptions {
        BatchOptions {
            threads,
            skip_years: vec![1996],
            ..BatchOptions::default()
        }
    }

    #[test]
    fn test_batch_skips_bad_units_and_keeps_going() {
        let source: Arc<dyn UnitSource> = Arc::new(source());
        let job = detection_job(DetectionParams::default(), None).unwrap();
        let report = run_batch(source, &options(2), job).unwrap();

        let processed: Vec<NaiveDate> = report.processed.iter().map(|(d, _)| *d).collect();
        assert_eq!(processed, vec![day(1), day(2), day(3)]);

        let skipped: Vec<(NaiveDate, &SkipReason)> = report.skipped.iter().map(|(d, r)| (*d, r)).collect();
        assert_eq!(skipped.len(), 3);
        assert_eq!(skipped[0], (NaiveDate::from_ymd_opt(1996, 8, 1).unwrap(), &SkipReason::SkippedYear));
        assert!(matches!(skipped[1], (d, SkipReason::OutOfOrder(_)) if d == day(4)));
        assert!(matches!(skipped[2], (d, SkipReason::MissingInput(_)) if d == day(5)));

        let summary = report.summary();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.quiet, 1);
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.records, 2);
    }

    #[test]
    fn test_result_independent_of_thread_count() {
        let run = |threads: usize| {
            let source: Arc<dyn UnitSource> = Arc::new(source());
            let job = detection_job(DetectionParams::default(), None).unwrap();
            run_batch(source, &options(threads), job).unwrap().records()
        };
        let serial = run(1);
        assert_eq!(serial.len(), 2);
        assert!(serial[0].time < serial[1].time);
        assert_eq!(serial, run(4));
    }

    #[test]
    fn test_date_range_and_passes() {
        let source: Arc<dyn UnitSource> = Arc::new(source());
        let opts = BatchOptions {
            threads: 2,
            start: Some(day(5)),
            end: Some(day(5)),
            ..BatchOptions::default()
        };
        let params = PassParams { min_duration_s: 0.0, ..PassParams::default() };
        let report = run_batch(source, &opts, pass_job(params).unwrap()).unwrap();
        assert!(report.skipped.is_empty());
        assert_eq!(report.processed.len(), 1);
        assert!(!report.processed[0].1.is_empty());
    }

    #[test]
    fn test_invalid_parameters_fail_before_scheduling() {
        let params = DetectionParams { threshold: f64::NAN, ..DetectionParams::default() };
        assert!(matches!(
            detection_job(params, None),
            Err(TelemetryError::InvalidParameters(_))
        ));
        let params = DetectionParams {
            baseline_width_s: 0.1,
            foreground_width_s: 0.5,
            ..DetectionParams::default()
        };
        assert!(matches!(
            detection_job(params, None),
            Err(TelemetryError::InvalidParameters(_))
        ));
        let params = PassParams { lo: 8.0, hi: 4.0, ..PassParams::default() };
        assert!(pass_job(params).is_err());
    }

    #[test]
    fn test_shared_cache_keeps_archives_apart() {
        use crate::cache::UnitCache;
        use crate::source::SampexArchive;
        use crate::synthetic::HiltDay;
        use std::io::BufWriter;

        let date = NaiveDate::from_yo_opt(1998, 123).unwrap();
        let write_archive = |root: &std::path::Path, spikes: usize| {
            let dir = root.join("hilt").join("State4");
            std::fs::create_dir_all(&dir).unwrap();
            let file = std::fs::File::create(dir.join("hhrr1998123.txt")).unwrap();
            let day = HiltDay { spikes, rows: 6_000, ..HiltDay::new(date) };
            day.write(&mut BufWriter::new(file), &mut StdRng::seed_from_u64(11)).unwrap();
        };
        let tmp = tempfile::tempdir().unwrap();
        write_archive(&tmp.path().join("a"), 3);
        write_archive(&tmp.path().join("b"), 0);

        let cache_dir = tmp.path().join("cache");
        let run = |root: &str| {
            let source: Arc<dyn UnitSource> = Arc::new(SampexArchive::new(tmp.path().join(root)));
            let cache = UnitCache::open(&cache_dir).unwrap();
            let job = detection_job(DetectionParams::default(), Some(cache)).unwrap();
            run_batch(source, &options(1), job).unwrap().records()
        };

        let first = run("a");
        assert!(!first.is_empty());
        assert!(run("b").is_empty());
        assert_eq!(run("a"), first);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let t = start_of_day(day(1));
        let d = |index: usize, offset_ms: i64, score: f64| Detection {
            sample_index: index,
            time: t + Duration::milliseconds(offset_ms),
            score,
        };
        let detections = vec![d(0, 0, 6.0), d(1, 20, 7.0), d(2, 0, 9.0), d(3, 40, 8.0), d(4, 20, 5.0)];
        let once = dedup_by_timestamp(detections);
        assert_eq!(once, vec![d(0, 0, 6.0), d(1, 20, 7.0), d(3, 40, 8.0)]);
        assert_eq!(dedup_by_timestamp(once.clone()), once);
    }

    #[test]
    fn test_panicking_unit_is_skipped() {
        let source: Arc<dyn UnitSource> = Arc::new(source());
        let job = |_: &dyn UnitSource, date: NaiveDate| -> Result<usize, TelemetryError> {
            if date == day(2) {
                panic!("boom");
            }
            Ok(date.day() as usize)
        };
        let report = run_batch(source, &options(2), job).unwrap();
        assert!(report
            .skipped
            .iter()
            .any(|(d, r)| *d == day(2) && matches!(r, SkipReason::Panicked(_))));
        assert!(report.processed.iter().any(|(d, _)| *d == day(4)));
    }
}
