use crate::types::{seconds_between, Detection, Sample};

pub fn gap_radius(resolution: f64, gap_window_s: f64) -> usize {
    (gap_window_s / (2.0 * resolution)).round().max(0.0) as usize
}

/// Drops detections whose `[i - radius, i + radius]` neighbourhood contains
/// an inter-sample delta longer than `tolerance_s`.
pub fn remove_near_gaps(
    detections: Vec<Detection>,
    samples: &[Sample],
    radius: usize,
    tolerance_s: f64,
) -> Vec<Detection> {
    if samples.len() < 2 {
        return detections;
    }

    // gaps_before[j] counts the long deltas among the first j deltas, where
    // delta j spans samples j and j + 1.
    let mut gaps_before = Vec::with_capacity(samples.len());
    gaps_before.push(0usize);
    for pair in samples.windows(2) {
        let long = seconds_between(pair[0].time, pair[1].time) > tolerance_s;
        let last = gaps_before.last().copied().unwrap_or(0);
        gaps_before.push(last + usize::from(long));
    }

    let last_index = samples.len() - 1;
    detections
        .into_iter()
        .filter(|detection| {
            let i = detection.sample_index.min(last_index);
            let lo = i.saturating_sub(radius);
            let hi = (i + radius).min(last_index);
            gaps_before[hi] == gaps_before[lo]
        })
        .collect()
}
