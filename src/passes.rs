use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;
use crate::types::{seconds_between, CoordinateSample, CoordinateStream, Pass};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PassParams {
    pub lo: f64,
    pub hi: f64,
    pub min_duration_s: f64,
    pub gap_s: f64,
}

impl Default for PassParams {
    fn default() -> Self {
        Self {
            lo: 4.0,
            hi: 8.0,
            min_duration_s: 60.0,
            gap_s: 300.0,
        }
    }
}

impl PassParams {
    pub fn validate(&self) -> Result<(), TelemetryError> {
        if !self.lo.is_finite() || !self.hi.is_finite() || self.lo > self.hi {
            return Err(TelemetryError::InvalidParameters(format!(
                "coordinate range [{}, {}] is empty or not finite",
                self.lo, self.hi
            )));
        }
        if !self.min_duration_s.is_finite() || self.min_duration_s < 0.0 {
            return Err(TelemetryError::InvalidParameters(format!(
                "minimum pass duration must be non-negative, got {}",
                self.min_duration_s
            )));
        }
        if !self.gap_s.is_finite() || self.gap_s < 0.0 {
            return Err(TelemetryError::InvalidParameters(format!(
                "pass gap threshold must be non-negative, got {}",
                self.gap_s
            )));
        }
        Ok(())
    }

    pub fn contains(&self, coordinate: f64) -> bool {
        self.lo <= coordinate && coordinate <= self.hi
    }
}

fn summarize(run: &[&CoordinateSample]) -> Option<Pass> {
    let first = run.first()?;
    let last = run.last()?;

    let mut sum = 0.0;
    let mut min_auxiliary = f64::INFINITY;
    let mut max_auxiliary = f64::NEG_INFINITY;
    let mut max_quality_flag = f64::NEG_INFINITY;
    for sample in run {
        sum += sample.auxiliary;
        min_auxiliary = min_auxiliary.min(sample.auxiliary);
        max_auxiliary = max_auxiliary.max(sample.auxiliary);
        max_quality_flag = max_quality_flag.max(sample.quality_flag);
    }

    Some(Pass {
        start_time: first.time,
        end_time: last.time,
        duration_seconds: seconds_between(first.time, last.time),
        mean_auxiliary: sum / run.len() as f64,
        min_auxiliary,
        max_auxiliary,
        max_quality_flag,
    })
}

/// Splits the in-range samples of `stream` into gap-separated runs and
/// summarizes every run lasting at least `min_duration_s`.
pub fn segment_passes(
    stream: &CoordinateStream,
    params: &PassParams,
) -> Result<Vec<Pass>, TelemetryError> {
    params.validate()?;

    let mut runs: Vec<Vec<&CoordinateSample>> = Vec::new();
    let mut current: Vec<&CoordinateSample> = Vec::new();
    for sample in stream.samples().iter().filter(|s| params.contains(s.coordinate)) {
        if let Some(previous) = current.last() {
            if seconds_between(previous.time, sample.time) > params.gap_s {
                runs.push(std::mem::take(&mut current));
            }
        }
        current.push(sample);
    }
    if !current.is_empty() {
        runs.push(current);
    }

    let run_count = runs.len();
    let passes: Vec<Pass> = runs
        .iter()
        .filter_map(|run| summarize(run))
        .filter(|pass| pass.duration_seconds >= params.min_duration_s)
        .collect();

    debug!(
        "{} runs in [{}, {}], {} kept as passes",
        run_count,
        params.lo,
        params.hi,
        passes.len()
    );
    Ok(passes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn stream(points: &[(i64, f64)]) -> CoordinateStream {
        let samples = points
            .iter()
            .enumerate()
            .map(|(i, &(s, coordinate))| CoordinateSample {
                time: t0() + Duration::seconds(s),
                coordinate,
                auxiliary: s as f64,
                quality_flag: (i % 3) as f64,
            })
            .collect();
        CoordinateStream::new(samples).unwrap()
    }

    #[test]
    fn test_gap_splits_runs() {
        let coords = stream(&[(0, 5.0), (1, 5.0), (2, 5.0), (400, 5.0), (401, 5.0)]);
        let params = PassParams::default();
        assert!(segment_passes(&coords, &params).unwrap().is_empty());

        let params = PassParams { min_duration_s: 0.0, ..params };
        let passes = segment_passes(&coords, &params).unwrap();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes[0].start_time, t0());
        assert_eq!(passes[0].end_time, t0() + Duration::seconds(2));
        assert_eq!(passes[0].duration_seconds, 2.0);
        assert_eq!(passes[1].start_time, t0() + Duration::seconds(400));
        assert_eq!(passes[1].end_time, t0() + Duration::seconds(401));
        assert_eq!(passes[1].duration_seconds, 1.0);
    }

    #[test]
    fn test_range_is_closed() {
        let coords = stream(&[(0, 4.0), (6, 3.99), (12, 8.0), (18, 8.01)]);
        let params = PassParams { min_duration_s: 0.0, ..PassParams::default() };
        let passes = segment_passes(&coords, &params).unwrap();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].start_time, t0());
        assert_eq!(passes[0].end_time, t0() + Duration::seconds(12));
    }

    #[test]
    fn test_summary_statistics() {
        let points: Vec<(i64, f64)> = (0..=20).map(|i| (i * 6, 6.0)).collect();
        let coords = stream(&points);
        let passes = segment_passes(&coords, &PassParams::default()).unwrap();
        assert_eq!(passes.len(), 1);
        let pass = passes[0];
        assert_eq!(pass.duration_seconds, 120.0);
        assert_eq!(pass.mean_auxiliary, 60.0);
        assert_eq!(pass.min_auxiliary, 0.0);
        assert_eq!(pass.max_auxiliary, 120.0);
        assert_eq!(pass.max_quality_flag, 2.0);

        let coords = stream(&points[..2]);
        let params = PassParams { min_duration_s: 0.0, ..PassParams::default() };
        let passes = segment_passes(&coords, &params).unwrap();
        assert_eq!(passes[0].max_quality_flag, 1.0);
    }

    #[test]
    fn test_segmentation_is_deterministic() {
        let points: Vec<(i64, f64)> = (0..2_000i64)
            .map(|k| (k * 6, 6.0 + 3.0 * ((k as f64) * 0.05).sin()))
            .collect();
        let coords = stream(&points);
        let params = PassParams { min_duration_s: 30.0, ..PassParams::default() };
        let first = segment_passes(&coords, &params).unwrap();
        assert!(!first.is_empty());
        for _ in 0..3 {
            assert_eq!(segment_passes(&coords, &params).unwrap(), first);
        }
    }

    #[test]
    fn test_out_of_range_samples_do_not_break_runs() {
        // Samples outside the range are dropped before gap splitting, so a
        // short excursion does not end the run by itself.
        let coords = stream(&[(0, 5.0), (60, 9.0), (120, 5.0)]);
        let passes = segment_passes(&coords, &PassParams::default()).unwrap();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].duration_seconds, 120.0);
    }

    #[test]
    fn test_empty_and_single_sample() {
        let params = PassParams::default();
        assert!(segment_passes(&stream(&[]), &params).unwrap().is_empty());
        assert!(segment_passes(&stream(&[(0, 1.0), (6, 2.0)]), &params).unwrap().is_empty());
        assert!(segment_passes(&stream(&[(0, 5.0)]), &params).unwrap().is_empty());
    }

    #[test]
    fn test_nan_coordinate_never_matches() {
        let coords = stream(&[(0, 5.0), (30, f64::NAN), (90, 5.0)]);
        let params = PassParams { gap_s: 60.0, min_duration_s: 0.0, ..PassParams::default() };
        let passes = segment_passes(&coords, &params).unwrap();
        assert_eq!(passes.len(), 2);
    }

    #[test]
    fn test_passes_ordered_and_disjoint() {
        let mut points = Vec::new();
        for orbit in 0..5i64 {
            for k in 0..40 {
                let s = orbit * 5_400 + k * 6;
                points.push((s, 4.5 + (k % 7) as f64 * 0.5));
            }
        }
        let coords = stream(&points);
        let passes = segment_passes(&coords, &PassParams::default()).unwrap();
        assert_eq!(passes.len(), 5);
        for pair in passes.windows(2) {
            assert!(pair[0].end_time < pair[1].start_time);
        }
    }

    #[test]
    fn test_invalid_range_rejected() {
        let params = PassParams { lo: 8.0, hi: 4.0, ..PassParams::default() };
        assert!(matches!(
            segment_passes(&stream(&[]), &params),
            Err(TelemetryError::InvalidParameters(_))
        ));
    }
}
