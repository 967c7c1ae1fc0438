use crate::types::{Detection, Sample, Score};

/// Indices of local maxima among scores strictly above `threshold`.
///
/// Each run of consecutive above-threshold scores yields one index, the
/// position of its largest score (the earliest one on ties). Unscored
/// samples end a run.
pub fn find_peaks(scores: &[Score], threshold: f64) -> Vec<usize> {
    let mut peaks = Vec::new();
    let mut run_best: Option<(usize, f64)> = None;

    for (i, score) in scores.iter().enumerate() {
        match score.n_std.filter(|&n_std| n_std > threshold) {
            Some(n_std) => match run_best {
                Some((_, best)) if best >= n_std => {}
                _ => run_best = Some((i, n_std)),
            },
            None => {
                if let Some((index, _)) = run_best.take() {
                    peaks.push(index);
                }
            }
        }
    }
    if let Some((index, _)) = run_best {
        peaks.push(index);
    }

    peaks
}

pub fn detections_at(samples: &[Sample], scores: &[Score], peaks: &[usize]) -> Vec<Detection> {
    peaks
        .iter()
        .filter_map(|&i| {
            let n_std = scores.get(i)?.n_std?;
            let sample = samples.get(i)?;
            Some(Detection {
                sample_index: i,
                time: sample.time,
                score: n_std,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn scores_from(values: &[Option<f64>]) -> Vec<Score> {
        let t0: NaiveDateTime = NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &n_std)| Score {
                time: t0 + Duration::milliseconds(20 * i as i64),
                n_std,
            })
            .collect()
    }

    #[test]
    fn test_plateau_collapses_to_maximum() {
        let scores = scores_from(&[
            Some(0.1),
            Some(11.0),
            Some(12.5),
            Some(14.0),
            Some(13.0),
            Some(10.5),
            Some(0.3),
        ]);
        assert_eq!(find_peaks(&scores, 10.0), vec![3]);
    }

    #[test]
    fn test_separate_runs_and_ties() {
        let scores = scores_from(&[
            Some(12.0),
            Some(12.0),
            Some(1.0),
            Some(15.0),
            None,
            Some(16.0),
        ]);
        assert_eq!(find_peaks(&scores, 10.0), vec![0, 3, 5]);
    }

    #[test]
    fn test_threshold_is_strict() {
        let scores = scores_from(&[Some(10.0), Some(9.9), None]);
        assert!(find_peaks(&scores, 10.0).is_empty());
    }

    #[test]
    fn test_repeated_runs_agree() {
        let values: Vec<Option<f64>> = (0..5000)
            .map(|k| match k % 97 {
                0 => None,
                r => Some(12.0 * (k as f64 * 0.037).sin().abs() + (r % 5) as f64),
            })
            .collect();
        let scores = scores_from(&values);
        let first = find_peaks(&scores, 10.0);
        assert!(first.len() > 10);
        assert!(first.windows(2).all(|w| w[0] < w[1]));
        for _ in 0..3 {
            assert_eq!(find_peaks(&scores, 10.0), first);
        }
    }

    #[test]
    fn test_detections_reference_samples() {
        let scores = scores_from(&[Some(0.0), Some(20.0), Some(0.0)]);
        let samples: Vec<Sample> = scores
            .iter()
            .map(|s| Sample { time: s.time, value: 1.0 })
            .collect();
        let detections = detections_at(&samples, &scores, &find_peaks(&scores, 10.0));
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].sample_index, 1);
        assert_eq!(detections[0].time, samples[1].time);
        assert_eq!(detections[0].score, 20.0);
    }
}
